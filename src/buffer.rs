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

//! Lends a single direct receive buffer per connection.
//!
//! Rust's ownership model already gives us "at most one handle open at a
//! time" for free: a `BufferLease` is a unique, movable value, so there is no
//! way to observe two live leases on the same buffer. `Drop` plays the role
//! an explicit destruct call would in a language without it.

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

pub struct BufferVendor {
    pool: Mutex<Vec<BytesMut>>,
    initial_capacity: usize,
}

impl BufferVendor {
    pub fn new(initial_capacity: usize) -> Arc<Self> {
        Arc::new(Self { pool: Mutex::new(Vec::new()), initial_capacity })
    }

    /// Leases a buffer, recycling a returned one from the pool if available.
    pub fn lease(self: &Arc<Self>) -> BufferLease {
        let buf = self.pool.lock().pop().unwrap_or_else(|| BytesMut::with_capacity(self.initial_capacity));
        BufferLease { buf: Some(buf), vendor: self.clone() }
    }
}

pub struct BufferLease {
    buf: Option<BytesMut>,
    vendor: Arc<BufferVendor>,
}

impl BufferLease {
    pub fn get_mut(&mut self) -> &mut BytesMut {
        self.buf.as_mut().expect("buffer already released")
    }

    /// Grows the buffer in place to hold at least `min_capacity` more bytes.
    /// The old allocation is dropped (returned to the allocator, not the
    /// pool) once `BytesMut::reserve` reallocates.
    pub fn ensure_capacity(&mut self, min_capacity: usize) {
        let buf = self.get_mut();
        if buf.capacity() - buf.len() < min_capacity {
            buf.reserve(min_capacity);
        }
    }

    /// Explicit release, for call sites that read better naming the moment
    /// a lease ends. Equivalent to dropping the lease.
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        if let Some(mut buf) = self.buf.take() {
            buf.clear();
            self.vendor.pool.lock().push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_is_recycled_on_drop() {
        let vendor = BufferVendor::new(64);
        {
            let mut lease = vendor.lease();
            lease.get_mut().extend_from_slice(b"hello");
        }
        assert_eq!(vendor.pool.lock().len(), 1);
        let lease = vendor.lease();
        assert_eq!(vendor.pool.lock().len(), 0);
        drop(lease);
    }

    #[test]
    fn ensure_capacity_grows_buffer() {
        let vendor = BufferVendor::new(4);
        let mut lease = vendor.lease();
        assert!(lease.get_mut().capacity() < 1000);
        lease.ensure_capacity(1000);
        assert!(lease.get_mut().capacity() >= 1000);
    }
}
