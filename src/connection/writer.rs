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

//! The synchronous write path: every frame, whether a caller's message, an
//! ack reply, or the async-queue pusher's next batch item, funnels through
//! here so writes never interleave on the socket.

use std::time::Instant;

use crate::codec::MessageType;
use crate::error::Result;
use crate::metrics;

use super::state::ConnectionState;
use super::Connection;

impl Connection {
    /// Writes one frame under the connection's write lock, updating the
    /// idle clock and send counter on success. Marks the transmission clock
    /// the ack-wait watchdog (`timers::run_ack_watchdog`) polls, so a write
    /// that blocks indefinitely on a stalled peer is still visible to
    /// suspicion even when no caller is waiting on a direct ack.
    pub(crate) async fn write_frame_locked(&self, payload: &[u8], message_type: MessageType, direct_ack: bool, message_id: u16) -> Result<()> {
        self.begin_transmission();
        *self.state.lock() = ConnectionState::Sending;
        let result = self.write_frame_raw(payload, message_type, direct_ack, message_id).await;
        *self.state.lock() = ConnectionState::PostSending;
        *self.last_activity.lock() = Instant::now();
        if result.is_ok() {
            self.messages_sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            metrics::increment(metrics::names::messages::SENT);
        }
        *self.state.lock() = ConnectionState::Idle;
        // A successful direct-ack send leaves the transmission clock running
        // for `ack.rs::await_ack`, which owns clearing it once the reply
        // arrives or the wait gives up.
        if !(direct_ack && result.is_ok()) {
            self.end_transmission();
        }
        result
    }

    async fn write_frame_raw(&self, payload: &[u8], message_type: MessageType, direct_ack: bool, message_id: u16) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let mut filter = self.filter.lock();
        let wrapped = filter.wrap(payload)?;
        drop(filter);
        let header = crate::codec::FrameHeader::new(wrapped.len() as u32, message_type, direct_ack, message_id)?;
        use tokio::io::AsyncWriteExt;
        writer.write_all(&header.pack()?).await?;
        writer.write_all(&wrapped).await?;
        Ok(())
    }

    /// Sends a zero-length reply frame acknowledging `message_id`, used to
    /// satisfy a peer's direct-ack request.
    pub(crate) async fn write_ack_reply(&self, message_id: u16) -> Result<()> {
        self.write_frame_locked(&[], MessageType::Normal, false, message_id).await
    }
}
