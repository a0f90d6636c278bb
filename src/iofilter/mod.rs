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

//! Pluggable I/O filter sitting between the framed codec and the raw socket.
//!
//! A connection owns exactly one `IoFilter`. The plain variant is a
//! pass-through; the TLS variant delegates to a caller-supplied engine so
//! this crate never has to pick (or vendor) a concrete TLS stack.

mod plain;
mod tls;

pub use plain::PlainFilter;
pub use tls::{TlsEngine, TlsFilter};

use crate::constants::SMALL_BUFFER_SIZE;
use crate::error::Result;

/// Transforms bytes between the wire and the framed codec above it.
///
/// Both directions are synchronous: the caller has already done the actual
/// socket read/write and hands the filter a slice to transform in memory.
pub trait IoFilter: Send + Sync {
    /// Turns a plaintext frame into the bytes that should be written to the
    /// socket.
    fn wrap(&mut self, src: &[u8]) -> Result<Vec<u8>>;

    /// Turns freshly read socket bytes into plaintext, returning a slice
    /// borrowed from the filter's own buffer.
    fn unwrap<'a>(&'a mut self, src: &'a [u8]) -> Result<&'a [u8]>;

    /// Called once the caller is finished with the slice `unwrap` returned,
    /// so the filter may reuse its internal buffer for the next call.
    fn done_reading(&mut self) {}

    /// Size hint for the receive buffer the caller should lease for this
    /// filter's decoded records.
    fn receive_buffer_hint(&self) -> usize {
        SMALL_BUFFER_SIZE
    }
}
