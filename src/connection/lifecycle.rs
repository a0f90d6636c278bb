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

//! Open/close lifecycle. A "residual reader" -- a reader task still
//! draining bytes after the rest of the connection has been told to close
//! -- needs no special bookkeeping here: its `BufferLease` (see
//! `crate::buffer`) keeps the receive buffer alive via ordinary `Drop` for
//! exactly as long as the reader task is still running.

use std::sync::atomic::Ordering;

use tracing::{info, warn};

use crate::constants::READER_JOIN_TIMEOUT;

use super::state::ConnectionState;
use super::Connection;

impl Connection {
    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
        *self.state.lock() = ConnectionState::Idle;
        self.async_queue.shut_down();
        self.cancel.cancel();
        self.ack_group.unregister(self.id);
        for (_, tx) in self.pending_acks.lock().drain() {
            let _ = tx.send(());
        }
    }

    /// Force-closes this connection because a slow receiver crossed the
    /// async queue's byte cap or stalled it past `asyncQueueTimeout`,
    /// bounded by `FORCE_DISCONNECT_GRACE` so a peer that never reacts can't
    /// hold the caller up indefinitely.
    pub(crate) async fn disconnect_slow_receiver(self: &std::sync::Arc<Self>, reason: &str) {
        let _ = tokio::time::timeout(crate::constants::FORCE_DISCONNECT_GRACE, self.force_close(reason)).await;
    }

    /// Graceful shutdown requested by the owning table. Waits a bounded
    /// amount of time for background tasks to notice the cancellation and
    /// finish, without blocking indefinitely on a peer that never responds.
    pub async fn close(self: &std::sync::Arc<Self>) {
        if self.is_closed() {
            return;
        }
        info!(remote = %self.remote, "closing connection");
        self.mark_closed();

        let handles = std::mem::take(&mut *self.tasks.lock());
        let _ = tokio::time::timeout(READER_JOIN_TIMEOUT, futures_util::future::join_all(handles)).await;
    }

    /// Abrupt shutdown triggered by a protocol violation, a slow receiver,
    /// or an idle timeout. Unlike `close`, this also tells the membership
    /// view to stop waiting on this member's liveness through us.
    pub(crate) async fn force_close(self: &std::sync::Arc<Self>, reason: &str) {
        if self.is_closed() {
            return;
        }
        warn!(remote = %self.remote, reason, "force-closing connection");
        self.mark_closed();
        self.membership.force_remove(&self.remote).await;
    }

    /// Invoked by the reader task itself once its loop exits, whether from
    /// a clean EOF, a protocol error, or cancellation. Ensures a peer
    /// dropping the socket out from under us still tears the rest of the
    /// connection down.
    pub(crate) async fn on_reader_exit(self: &std::sync::Arc<Self>) {
        if !self.is_closed() {
            self.force_close("reader loop exited").await;
        }
    }
}
