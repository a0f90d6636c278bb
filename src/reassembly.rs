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

//! Reassembles CHUNK/END-CHUNK frames that arrived interleaved on the wire,
//! keyed by message id.
//!
//! One destreamer is kept warm (the `idle` slot) so the common case of a
//! single chunked message in flight never allocates a `HashMap` entry; a
//! second or later chunked message concurrent with it spills into `active`.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{Result, TransportError};

struct MsgDestreamer {
    message_id: u16,
    buf: Vec<u8>,
}

impl MsgDestreamer {
    fn new(message_id: u16) -> Self {
        Self { message_id, buf: Vec::new() }
    }

    fn reset(&mut self, message_id: u16) {
        self.message_id = message_id;
        self.buf.clear();
    }
}

pub struct ReassemblerPool {
    idle: Mutex<Option<MsgDestreamer>>,
    active: Mutex<HashMap<u16, MsgDestreamer>>,
    max_buffered_bytes: usize,
}

impl ReassemblerPool {
    pub fn new(max_buffered_bytes: usize) -> Self {
        Self { idle: Mutex::new(None), active: Mutex::new(HashMap::new()), max_buffered_bytes }
    }

    fn take_or_create(&self, message_id: u16) -> MsgDestreamer {
        if let Some(mut d) = self.idle.lock().take() {
            d.reset(message_id);
            return d;
        }
        MsgDestreamer::new(message_id)
    }

    fn recycle(&self, mut d: MsgDestreamer) {
        let mut idle = self.idle.lock();
        if idle.is_none() {
            d.buf.clear();
            *idle = Some(d);
        }
    }

    /// Appends a CHUNK frame's payload to the in-progress reassembly for
    /// `message_id`, starting a new one if none is active.
    pub fn on_chunk(&self, message_id: u16, bytes: &[u8]) -> Result<()> {
        let mut active = self.active.lock();
        let destreamer = active.entry(message_id).or_insert_with(|| self.take_or_create(message_id));
        if destreamer.buf.len() + bytes.len() > self.max_buffered_bytes {
            active.remove(&message_id);
            return Err(TransportError::ReassemblyOom(message_id));
        }
        destreamer.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Appends an END-CHUNK frame's payload and returns the fully reassembled
    /// message. An END-CHUNK with no prior CHUNK is tolerated as a
    /// single-frame message rather than treated as a protocol error.
    pub fn on_end_chunk(&self, message_id: u16, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut active = self.active.lock();
        match active.remove(&message_id) {
            Some(mut destreamer) => {
                if destreamer.buf.len() + bytes.len() > self.max_buffered_bytes {
                    return Err(TransportError::ReassemblyOom(message_id));
                }
                destreamer.buf.extend_from_slice(bytes);
                let out = std::mem::take(&mut destreamer.buf);
                drop(active);
                self.recycle(destreamer);
                Ok(out)
            }
            None => Ok(bytes.to_vec()),
        }
    }
}
