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

use std::time::Duration;

/// Largest payload a single frame may carry (24-bit length field).
pub const MAX_MSG_SIZE: u32 = 0x00ff_ffff;

/// Fixed handshake/wire version carried in the top byte of every frame header.
pub const HANDSHAKE_VERSION: u8 = 7;

pub const NORMAL_MSG_TYPE: u8 = 0x4c;
pub const CHUNKED_MSG_TYPE: u8 = 0x4d;
pub const END_CHUNKED_MSG_TYPE: u8 = 0x4e;

/// Set within the message-type byte to request a direct-ack reply.
pub const DIRECT_ACK_BIT: u8 = 0x20;
/// Mask to recover the bare message type once the direct-ack bit is stripped.
pub const MSG_TYPE_MASK: u8 = !DIRECT_ACK_BIT;

pub const REPLY_CODE_OK: u8 = 0x45;
pub const REPLY_CODE_OK_WITH_ASYNC_INFO: u8 = 0x46;

/// Message-id sentinel for frames that don't belong to a chunked stream.
pub const NO_MESSAGE_ID: u16 = 0xffff;

pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(59_000);
pub const RECONNECT_WAIT_TIME: Duration = Duration::from_millis(2_000);
pub const SMALL_BUFFER_SIZE: usize = 4096;
/// Upper bound of the doubling backoff used while polling a non-blocking write.
pub const MAX_WAIT_TIME: Duration = Duration::from_millis(32);

/// Grace period given to a forced-disconnect before giving up on it propagating.
pub const FORCE_DISCONNECT_GRACE: Duration = Duration::from_secs(3);

/// Bound on how long `close()` waits to join the reader task.
pub const READER_JOIN_TIMEOUT: Duration = Duration::from_millis(500 + 1500);

/// 7-byte frame header: 4-byte length+version word, 1-byte type, 2-byte id.
pub const FRAME_HEADER_SIZE: usize = 7;
