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

//! The preamble exchange that turns a raw, just-connected socket into a
//! `Connection` the rest of this crate is willing to frame traffic over.

mod receiver;
mod sender;

pub use receiver::respond_handshake;
pub use sender::initiate_handshake;

use std::sync::atomic::{AtomicI64, Ordering};

use crate::member::{MemberId, MemberVersion};

/// Caps how many times a reconnect attempt may itself trigger a further
/// reconnect before giving up, so a down member can't cause an unbounded
/// pile-up of handshake attempts (the "domino effect").
pub const MAX_DOMINO_COUNT: u8 = 5;

static NEXT_UNIQUE_ID: AtomicI64 = AtomicI64::new(1);

/// Monotonic id a sender stamps into its preamble and the receiver echoes
/// back in logs/metrics to correlate the two sides of one handshake.
pub fn next_unique_id() -> i64 {
    NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Parameters the local side brings to a handshake, either role.
#[derive(Debug, Clone)]
pub struct HandshakeContext {
    pub local: MemberId,
    pub local_incarnation: MemberVersion,
    pub shared: bool,
    pub preserve_order: bool,
    pub domino_count: u8,
}

impl HandshakeContext {
    pub fn new(local: MemberId, local_incarnation: MemberVersion) -> Self {
        Self { local, local_incarnation, shared: false, preserve_order: false, domino_count: 0 }
    }

    pub fn next_domino(&self) -> Self {
        Self { domino_count: self.domino_count + 1, ..self.clone() }
    }

    pub fn domino_limit_exceeded(&self) -> bool {
        self.domino_count >= MAX_DOMINO_COUNT
    }
}

/// What a completed handshake yields: the peer's identity plus whether the
/// responder already knew about us (vs. registering us as a surprise
/// member).
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    pub remote: MemberId,
    pub remote_incarnation: MemberVersion,
    pub shared: bool,
    pub preserve_order: bool,
    /// Negotiated per §4.6: a `preserveOrder` sender whose peer published
    /// non-zero async parameters sends through the queue instead of writing
    /// straight to the socket.
    pub async_mode: bool,
}
