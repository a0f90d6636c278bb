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

//! The small state machine a connection's writer side walks through for
//! each outbound message. Tracked separately from the reader, which only
//! ever moves between `Reading` and "blocked in the kernel waiting for more
//! bytes" (not a state of its own).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing in flight; the writer may pick up the next send.
    Idle,
    /// A frame's header/payload is being written to the socket.
    Sending,
    /// The frame write completed; deciding whether to wait on a direct ack.
    PostSending,
    /// Blocked reading the direct-ack reply for the message just sent.
    ReadingAck,
    /// The direct-ack reply arrived; about to return control to the caller.
    ReceivedAck,
    /// The reader task is parked on the socket waiting for the next frame.
    Reading,
}

impl ConnectionState {
    pub fn can_send(self) -> bool {
        matches!(self, ConnectionState::Idle | ConnectionState::Reading)
    }
}
