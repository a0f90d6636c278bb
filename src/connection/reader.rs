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

//! The per-connection reader task: one frame at a time, forever, until the
//! socket closes or the connection is cancelled.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::codec::{FrameHeader, MessageType};
use crate::constants::{FRAME_HEADER_SIZE, NO_MESSAGE_ID};
use crate::dispatch::MessageDispatcher;
use crate::error::Result;
use crate::metrics;
use crate::reassembly::ReassemblerPool;

use super::state::ConnectionState;
use super::Connection;

impl Connection {
    /// Drives the reader loop to completion. Returns once the socket is
    /// closed, a fatal protocol error occurs, or the connection is
    /// cancelled. Never returns an error: failures are logged, and the loop
    /// ending at all is itself the signal that something went wrong.
    pub(crate) async fn run_reader(
        self: &Arc<Self>,
        mut reader: Box<dyn AsyncRead + Unpin + Send>,
        dispatcher: Arc<dyn MessageDispatcher>,
        reassembly: Arc<ReassemblerPool>,
    ) {
        *self.state.lock() = ConnectionState::Reading;
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = read_one_frame(&mut reader, &self.filter, &self.buffer_vendor) => result,
            };

            let (header, payload) = match next {
                Ok(frame) => frame,
                Err(e) => {
                    if e.is_trivial() {
                        debug!(remote = %self.remote, error = %e, "reader loop ending");
                    } else {
                        warn!(remote = %self.remote, error = %e, "reader loop ending on error");
                    }
                    break;
                }
            };

            *self.last_activity.lock() = Instant::now();
            self.messages_received.fetch_add(1, Ordering::Relaxed);
            metrics::increment(metrics::names::messages::RECEIVED);

            if header.message_type == MessageType::Normal && header.length == 0 && header.message_id != NO_MESSAGE_ID && self.has_pending_ack(header.message_id)
            {
                self.complete_ack(header.message_id);
                continue;
            }

            let complete_payload = match header.message_type {
                MessageType::Normal => Some(payload),
                MessageType::Chunk => {
                    if let Err(e) = reassembly.on_chunk(header.message_id, &payload) {
                        warn!(remote = %self.remote, error = %e, "dropping connection after chunk reassembly failure");
                        break;
                    }
                    None
                }
                MessageType::EndChunk => match reassembly.on_end_chunk(header.message_id, &payload) {
                    Ok(full) => Some(full),
                    Err(e) => {
                        warn!(remote = %self.remote, error = %e, "dropping connection after chunk reassembly failure");
                        break;
                    }
                },
            };

            if let Some(payload) = complete_payload {
                if header.direct_ack {
                    if let Err(e) = self.write_ack_reply(header.message_id).await {
                        debug!(remote = %self.remote, error = %e, "failed to send ack reply");
                    }
                }
                dispatcher.dispatch(&self.remote, payload, header.direct_ack).await;
            }
        }

        self.on_reader_exit().await;
    }
}

async fn read_one_frame(
    reader: &mut (dyn AsyncRead + Unpin + Send),
    filter: &parking_lot::Mutex<Box<dyn crate::iofilter::IoFilter>>,
    buffer_vendor: &Arc<crate::buffer::BufferVendor>,
) -> Result<(FrameHeader, Vec<u8>)> {
    let mut header_buf = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header_buf).await?;
    let header = FrameHeader::unpack(&header_buf)?;

    // Leased for the duration of this single read; released back to the
    // vendor the moment the frame is decoded and copied out.
    let mut lease = buffer_vendor.lease();
    lease.ensure_capacity(header.length as usize);
    let buf = lease.get_mut();
    buf.resize(header.length as usize, 0);
    reader.read_exact(&mut buf[..]).await?;

    let mut filter = filter.lock();
    let plaintext = filter.unwrap(&buf[..])?.to_vec();
    filter.done_reading();
    Ok((header, plaintext))
}
