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

//! Identity types carried through the handshake and connection table.

use std::fmt;
use std::net::SocketAddr;

/// Stable identity of a cluster member, independent of the socket address it
/// happens to be reachable at right now.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberId {
    pub name: String,
    pub addr: SocketAddr,
}

impl MemberId {
    pub fn new(name: impl Into<String>, addr: SocketAddr) -> Self {
        Self { name: name.into(), addr }
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.addr)
    }
}

/// Monotonically increasing per-member incarnation, used to tell a rejoined
/// member apart from its earlier, now-stale, incarnation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberVersion(pub u64);
