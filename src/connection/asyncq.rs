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

//! Backpressure queue for asynchronous (fire-and-forget) sends. Items
//! sharing a conflation key collapse into the most recent one while still
//! queued, crediting the old buffer's bytes back to `queued_bytes`; a pusher
//! task drains the queue against the connection's write lock and forces the
//! connection closed if the peer can't keep up.
//!
//! The cap is a byte total (`queuedBytes`), not an item count -- a handful
//! of large buffers can exhaust backpressure long before the queue "looks"
//! full by item count.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use crate::codec::MessageType;
use crate::error::{Result, TransportError};
use crate::metrics;

use super::Connection;

struct QueueItem {
    payload: Vec<u8>,
    message_type: MessageType,
}

pub struct AsyncQueue {
    items: Mutex<LinkedHashMap<u64, QueueItem>>,
    queued_bytes: AtomicU64,
    notify: Notify,
    closed: std::sync::atomic::AtomicBool,
    unkeyed_counter: AtomicU64,
    max_bytes: usize,
}

impl AsyncQueue {
    pub fn new(max_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(LinkedHashMap::new()),
            queued_bytes: AtomicU64::new(0),
            notify: Notify::new(),
            closed: std::sync::atomic::AtomicBool::new(false),
            unkeyed_counter: AtomicU64::new(1),
            max_bytes,
        })
    }

    pub fn queued_bytes(&self) -> u64 {
        self.queued_bytes.load(Ordering::Acquire)
    }

    /// Enqueues a payload. `conflation_key`, when given, lets a later call
    /// with the same key replace this one in place while it's still queued
    /// instead of piling up duplicates (e.g. repeated state updates for the
    /// same entry); the old entry's bytes are credited back to
    /// `queued_bytes` before the new size is added, so the cap check (and
    /// the final byte total) sees only the net effect.
    pub fn enqueue(&self, conflation_key: Option<u64>, payload: Vec<u8>, message_type: MessageType, remote: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closing);
        }
        let mut items = self.items.lock();
        let key = match conflation_key {
            Some(k) => k,
            None => self.unkeyed_counter.fetch_add(1, Ordering::Relaxed) | (1 << 63),
        };
        let old_len = items.get(&key).map(|item| item.payload.len() as u64);
        let conflated = old_len.is_some();
        let new_len = payload.len() as u64;
        let projected = self.queued_bytes.load(Ordering::Acquire) - old_len.unwrap_or(0) + new_len;
        if projected > self.max_bytes as u64 {
            return Err(TransportError::AsyncQueueFull(remote.to_string()));
        }
        if conflated {
            metrics::increment(metrics::names::messages::CONFLATED);
        }
        items.insert(key, QueueItem { payload, message_type });
        self.queued_bytes.store(projected, Ordering::Release);
        metrics::gauge(metrics::names::queue::DEPTH, items.len() as f64);
        metrics::gauge(metrics::names::queue::BYTES, projected as f64);
        drop(items);
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> Option<QueueItem> {
        loop {
            {
                let mut items = self.items.lock();
                if let Some(key) = items.keys().next().copied() {
                    let item = items.remove(&key).expect("key came from items.keys()");
                    self.queued_bytes.fetch_sub(item.payload.len() as u64, Ordering::AcqRel);
                    metrics::gauge(metrics::names::queue::DEPTH, items.len() as f64);
                    return Some(item);
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub fn shut_down(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

impl Connection {
    /// Sends a fire-and-forget message. A connection that didn't negotiate
    /// `asyncMode` in its handshake writes straight to the socket; one that
    /// did first tries a bounded direct write (the "trip-over" window,
    /// `asyncDistributionTimeout`) and only falls back to the backpressured
    /// queue once that window elapses without completing, coalescing with
    /// any still-queued item sharing `conflation_key`.
    ///
    /// Crossing the queue's byte cap, or the pusher stalling on a blocked
    /// socket past `asyncQueueTimeout`, is not a retryable condition: the
    /// remote is force-disconnected and this returns `ForcedDisconnect`.
    pub async fn send_async(self: &Arc<Self>, conflation_key: Option<u64>, payload: Vec<u8>) -> Result<()> {
        if !self.async_mode {
            return self.write_frame_locked(&payload, MessageType::Normal, false, crate::constants::NO_MESSAGE_ID).await;
        }

        let direct = tokio::time::timeout(
            self.config.async_distribution_timeout,
            self.write_frame_locked(&payload, MessageType::Normal, false, crate::constants::NO_MESSAGE_ID),
        )
        .await;
        if let Ok(result) = direct {
            return result;
        }

        match self.async_queue.enqueue(conflation_key, payload, MessageType::Normal, &self.remote.to_string()) {
            Ok(()) => Ok(()),
            Err(TransportError::AsyncQueueFull(remote)) => {
                metrics::increment(metrics::names::queue::SIZE_EXCEEDED);
                self.disconnect_slow_receiver("async queue byte cap exceeded").await;
                Err(TransportError::ForcedDisconnect(remote))
            }
            Err(e) => Err(e),
        }
    }

    /// Drains the async queue against this connection's write path until the
    /// queue is shut down or an item blocks the socket past
    /// `asyncQueueTimeout`, in which case the slow receiver is disconnected.
    pub(crate) async fn run_async_pusher(self: Arc<Self>) {
        let queue = self.async_queue.clone();
        loop {
            let Some(item) = queue.pop().await else { break };
            let started = Instant::now();
            let result = tokio::time::timeout(
                self.config.async_queue_timeout,
                self.write_frame_locked(&item.payload, item.message_type, false, crate::constants::NO_MESSAGE_ID),
            )
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(remote = %self.remote, error = %e, "async pusher write failed");
                    break;
                }
                Err(_) => {
                    warn!(
                        remote = %self.remote,
                        waited = ?started.elapsed(),
                        "async queue timeout exceeded, forcing connection closed"
                    );
                    metrics::increment(metrics::names::queue::DISCONNECTS);
                    self.disconnect_slow_receiver("slow receiver exceeded async queue timeout").await;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conflation_keeps_only_the_latest_value_for_a_key() {
        let queue = AsyncQueue::new(16);
        queue.enqueue(Some(1), b"v1".to_vec(), MessageType::Normal, "peer").unwrap();
        queue.enqueue(Some(1), b"v2".to_vec(), MessageType::Normal, "peer").unwrap();
        let item = queue.pop().await.unwrap();
        assert_eq!(item.payload, b"v2");
        assert!(tokio::time::timeout(std::time::Duration::from_millis(10), queue.pop()).await.is_err());
    }

    #[tokio::test]
    async fn full_queue_without_conflation_key_is_rejected() {
        let queue = AsyncQueue::new(1);
        queue.enqueue(None, b"a".to_vec(), MessageType::Normal, "peer").unwrap();
        let err = queue.enqueue(None, b"b".to_vec(), MessageType::Normal, "peer").unwrap_err();
        assert!(matches!(err, TransportError::AsyncQueueFull(_)));
    }

    #[tokio::test]
    async fn conflating_replace_accounts_bytes_as_old_minus_new() {
        let queue = AsyncQueue::new(100);
        queue.enqueue(Some(1), vec![0u8; 10], MessageType::Normal, "peer").unwrap();
        assert_eq!(queue.queued_bytes(), 10);
        queue.enqueue(Some(1), vec![0u8; 4], MessageType::Normal, "peer").unwrap();
        assert_eq!(queue.queued_bytes(), 4);
    }

    #[tokio::test]
    async fn byte_cap_rejects_a_single_oversized_item_even_when_queue_is_empty() {
        let queue = AsyncQueue::new(8);
        let err = queue.enqueue(None, vec![0u8; 9], MessageType::Normal, "peer").unwrap_err();
        assert!(matches!(err, TransportError::AsyncQueueFull(_)));
        assert_eq!(queue.queued_bytes(), 0);
    }

    #[tokio::test]
    async fn popping_an_item_credits_its_bytes_back() {
        let queue = AsyncQueue::new(16);
        queue.enqueue(None, vec![0u8; 10], MessageType::Normal, "peer").unwrap();
        assert_eq!(queue.queued_bytes(), 10);
        queue.pop().await.unwrap();
        assert_eq!(queue.queued_bytes(), 0);
    }
}
