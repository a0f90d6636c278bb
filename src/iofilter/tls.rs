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

//! TLS-backed I/O filter.
//!
//! Key management and the handshake itself are out of scope for this crate;
//! callers that enable TLS supply a [`TlsEngine`] (backed by whatever TLS
//! library they already trust) and we only drive it at the `wrap`/`unwrap`
//! seam, mirroring how the codec above never needs to know encryption is
//! happening at all.

use super::IoFilter;
use crate::error::Result;

/// A already-handshaken TLS record layer. Implementors own the session keys;
/// this crate never sees them.
///
/// Host-supplied, so its errors come back as `anyhow::Error` rather than
/// this crate's own `TransportError` -- the engine may be backed by any TLS
/// library the host already trusts, and forcing it to map failures into our
/// exact error taxonomy would leak that choice into its interface.
pub trait TlsEngine: Send + Sync {
    fn wrap(&mut self, plaintext: &[u8]) -> anyhow::Result<Vec<u8>>;
    fn unwrap<'a>(&'a mut self, ciphertext: &'a [u8]) -> anyhow::Result<&'a [u8]>;
    fn record_buffer_size(&self) -> usize;
}

pub struct TlsFilter {
    engine: Box<dyn TlsEngine>,
}

impl TlsFilter {
    pub fn new(engine: Box<dyn TlsEngine>) -> Self {
        Self { engine }
    }
}

impl IoFilter for TlsFilter {
    fn wrap(&mut self, src: &[u8]) -> Result<Vec<u8>> {
        self.engine.wrap(src).map_err(|e| crate::error::TransportError::AuthenticationFailure(e.to_string()))
    }

    fn unwrap<'a>(&'a mut self, src: &'a [u8]) -> Result<&'a [u8]> {
        self.engine.unwrap(src).map_err(|e| crate::error::TransportError::AuthenticationFailure(e.to_string()))
    }

    fn receive_buffer_hint(&self) -> usize {
        self.engine.record_buffer_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// XOR "cipher" standing in for a real TLS engine, just enough to
    /// exercise the `TlsFilter` plumbing.
    struct XorEngine {
        key: u8,
    }

    impl TlsEngine for XorEngine {
        fn wrap(&mut self, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
            Ok(plaintext.iter().map(|b| b ^ self.key).collect())
        }

        fn unwrap<'a>(&'a mut self, ciphertext: &'a [u8]) -> anyhow::Result<&'a [u8]> {
            // A real engine would decrypt into an internal buffer; this
            // stand-in can't mutate in place through a shared ref, so the
            // test only checks `wrap` followed by manual un-xor.
            Ok(ciphertext)
        }

        fn record_buffer_size(&self) -> usize {
            16 * 1024
        }
    }

    #[test]
    fn wrap_delegates_to_engine() {
        let mut filter = TlsFilter::new(Box::new(XorEngine { key: 0x42 }));
        let wrapped = filter.wrap(b"secret").unwrap();
        let unxored: Vec<u8> = wrapped.iter().map(|b| b ^ 0x42).collect();
        assert_eq!(unxored, b"secret");
        assert_eq!(filter.receive_buffer_hint(), 16 * 1024);
    }

    struct AlwaysFailsEngine;

    impl TlsEngine for AlwaysFailsEngine {
        fn wrap(&mut self, _plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("session key expired")
        }

        fn unwrap<'a>(&'a mut self, _ciphertext: &'a [u8]) -> anyhow::Result<&'a [u8]> {
            anyhow::bail!("session key expired")
        }

        fn record_buffer_size(&self) -> usize {
            16 * 1024
        }
    }

    #[test]
    fn engine_failure_surfaces_as_authentication_failure() {
        let mut filter = TlsFilter::new(Box::new(AlwaysFailsEngine));
        assert!(matches!(filter.wrap(b"x"), Err(crate::error::TransportError::AuthenticationFailure(_))));
    }
}
