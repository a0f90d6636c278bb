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

//! The set of connections that share severe-alert suppression. When one
//! member's transmission trips the severe-alert threshold, every other
//! member gets its clock pushed forward by the same margin so a single slow
//! transmission doesn't page once per connection sharing the stall.
//!
//! Membership is table-scoped: every connection a `DefaultConnectionTable`
//! opens or accepts joins the same group, since that table is the unit this
//! crate has a well-defined "set of peers participating in the current
//! transmission" for.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::Connection;

pub struct AckConnectionGroup {
    members: Mutex<HashMap<u64, Weak<Connection>>>,
}

impl AckConnectionGroup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { members: Mutex::new(HashMap::new()) })
    }

    pub(crate) fn register(&self, conn: &Arc<Connection>) {
        self.members.lock().insert(conn.id, Arc::downgrade(conn));
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.members.lock().remove(&id);
    }

    /// Pushes every other live member's transmission clock forward by
    /// `bump`, so a severe alert that just fired for `triggering_id` doesn't
    /// immediately re-fire for siblings stalled on the same slow receiver.
    pub(crate) fn suppress_others(&self, triggering_id: u64, bump: Duration) {
        let mut dead = Vec::new();
        let members = self.members.lock();
        for (&id, weak) in members.iter() {
            if id == triggering_id {
                continue;
            }
            match weak.upgrade() {
                Some(conn) => conn.bump_transmission_start(bump),
                None => dead.push(id),
            }
        }
        drop(members);
        if !dead.is_empty() {
            let mut members = self.members.lock();
            for id in dead {
                members.remove(&id);
            }
        }
    }
}
