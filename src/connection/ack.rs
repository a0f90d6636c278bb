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

//! Direct-ack request/reply path: the caller asks for a reply to a specific
//! message, the reader task completes it out of band when the reply frame
//! comes back, and waiting here escalates from a suspicion-worthy timeout
//! to a severe alert rather than failing immediately.

use std::sync::atomic::Ordering;

use tokio::sync::oneshot;
use tracing::warn;

use crate::codec::MessageType;
use crate::error::{Result, TransportError};
use crate::metrics;

use super::state::ConnectionState;
use super::Connection;

impl Connection {
    /// Allocates a fresh message id, wrapping before it reaches the
    /// `NO_MESSAGE_ID` sentinel reserved for frames outside any stream.
    pub fn allocate_message_id(&self) -> u16 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed) % crate::constants::NO_MESSAGE_ID
    }

    /// Sends a single, unchunked message, optionally waiting for the peer's
    /// direct-ack reply.
    pub async fn send(&self, payload: &[u8], message_type: MessageType, want_ack: bool) -> Result<()> {
        if !want_ack {
            return self.write_frame_locked(payload, message_type, false, crate::constants::NO_MESSAGE_ID).await;
        }

        let message_id = self.allocate_message_id();
        let (tx, rx) = oneshot::channel();
        self.pending_acks.lock().insert(message_id, tx);

        if let Err(e) = self.write_frame_locked(payload, message_type, true, message_id).await {
            self.pending_acks.lock().remove(&message_id);
            return Err(e);
        }

        self.await_ack(message_id, rx).await
    }

    /// Sends one frame of a chunked message under `message_id` (shared
    /// across the whole stream). `direct_ack` is only meaningful -- and
    /// only takes effect -- on the final chunk, mirroring the fact that the
    /// reassembled message is what the peer acks.
    pub async fn send_chunk(&self, message_id: u16, payload: &[u8], final_chunk: bool, direct_ack: bool) -> Result<()> {
        let message_type = if final_chunk { MessageType::EndChunk } else { MessageType::Chunk };
        if !final_chunk || !direct_ack {
            return self.write_frame_locked(payload, message_type, false, message_id).await;
        }

        let (tx, rx) = oneshot::channel();
        self.pending_acks.lock().insert(message_id, tx);
        if let Err(e) = self.write_frame_locked(payload, message_type, true, message_id).await {
            self.pending_acks.lock().remove(&message_id);
            return Err(e);
        }
        self.await_ack(message_id, rx).await
    }

    async fn await_ack(&self, message_id: u16, rx: oneshot::Receiver<()>) -> Result<()> {
        *self.state.lock() = ConnectionState::ReadingAck;
        let result = self.await_ack_inner(message_id, rx).await;
        *self.state.lock() = ConnectionState::Idle;
        self.end_transmission();
        result
    }

    async fn await_ack_inner(&self, message_id: u16, rx: oneshot::Receiver<()>) -> Result<()> {
        match tokio::time::timeout(self.config.ack_wait_threshold, rx).await {
            Ok(Ok(())) => {
                self.consecutive_ack_timeouts.store(0, Ordering::Relaxed);
                Ok(())
            }
            Ok(Err(_)) => Err(TransportError::Cancelled),
            Err(_) => {
                let count = self.consecutive_ack_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(remote = %self.remote, message_id, "ack wait threshold elapsed, escalating to severe alert window");
                metrics::increment(metrics::names::ack::TIMEOUTS);
                self.membership.suspect(&self.remote, count).await;

                // ackSATimeout is the *additional* time allowed past
                // ackWaitTimeout, not an absolute deadline from the start of
                // the wait -- see `TransportConfig::ack_severe_alert_threshold`.
                let remaining = self.config.ack_severe_alert_threshold;
                if !self.has_pending_ack(message_id) {
                    // A reply raced in between the timeout firing and us
                    // taking the lock; nothing further to wait for.
                    return Ok(());
                }
                let (tx, rx2) = oneshot::channel();
                self.pending_acks.lock().insert(message_id, tx);

                match tokio::time::timeout(remaining, rx2).await {
                    Ok(Ok(())) => {
                        self.consecutive_ack_timeouts.store(0, Ordering::Relaxed);
                        Ok(())
                    }
                    Ok(Err(_)) => Err(TransportError::Cancelled),
                    Err(_) => {
                        metrics::increment(metrics::names::ack::SEVERE_ALERTS);
                        self.pending_acks.lock().remove(&message_id);
                        self.membership.suspect(&self.remote, count + 1).await;
                        self.ack_group.suppress_others(self.id, self.config.ack_severe_alert_threshold);
                        Err(TransportError::AckTimeout(self.remote.to_string()))
                    }
                }
            }
        }
    }

    /// Called by the reader task when a frame with a direct-ack reply
    /// matching a pending wait arrives.
    pub(crate) fn complete_ack(&self, message_id: u16) {
        if let Some(tx) = self.pending_acks.lock().remove(&message_id) {
            let _ = tx.send(());
        }
    }

    pub(crate) fn has_pending_ack(&self, message_id: u16) -> bool {
        self.pending_acks.lock().contains_key(&message_id)
    }
}
