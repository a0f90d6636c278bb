// Copyright (C) 2019-2026 The Nodelink Authors
// This file is part of the nodelink-tcp crate.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
// http://www.apache.org/licenses/LICENSE-2.0

// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The membership-view seam this crate consults and reports into.
//!
//! The transport never runs failure detection itself; it asks this trait
//! whether a member is still considered alive, and tells it when a
//! connection under its watch looks suspect. A real cluster wires this to
//! its gossip/failure-detector component. Tests wire it to a fake.

use async_trait::async_trait;

use crate::member::MemberId;

/// Outcome of a liveness check against the cluster's view of `member`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Alive,
    Shunned,
    Left,
    Unknown,
}

#[async_trait]
pub trait MembershipView: Send + Sync {
    async fn status(&self, member: &MemberId) -> MemberStatus;

    /// Called when a connection has missed enough ack-wait deadlines to be
    /// considered suspect, ahead of any local decision to disconnect it.
    async fn suspect(&self, member: &MemberId, consecutive_ack_timeouts: u32);

    /// Called when the transport gives up on a member after forcing it
    /// closed, so the membership view can evict it without waiting on its
    /// own failure detector round.
    async fn force_remove(&self, member: &MemberId);

    /// Called when a handshake arrives from a member the table didn't yet
    /// know about (a "surprise member"), so the view can register it before
    /// the handshake reply is sent.
    async fn register_surprise_member(&self, member: &MemberId);
}

#[cfg(test)]
pub mod test_support {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct FakeMembershipView {
        pub statuses: Mutex<HashMap<MemberId, MemberStatus>>,
        pub suspected: Mutex<Vec<MemberId>>,
        pub removed: Mutex<Vec<MemberId>>,
        pub registered: Mutex<Vec<MemberId>>,
    }

    #[async_trait]
    impl MembershipView for FakeMembershipView {
        async fn status(&self, member: &MemberId) -> MemberStatus {
            self.statuses.lock().get(member).copied().unwrap_or(MemberStatus::Alive)
        }

        async fn suspect(&self, member: &MemberId, _consecutive_ack_timeouts: u32) {
            self.suspected.lock().push(member.clone());
        }

        async fn force_remove(&self, member: &MemberId) {
            self.removed.lock().push(member.clone());
        }

        async fn register_surprise_member(&self, member: &MemberId) {
            self.registered.lock().push(member.clone());
        }
    }
}
