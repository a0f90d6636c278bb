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

//! An established, handshaken connection to one remote member.

mod ack;
mod ack_group;
mod asyncq;
mod lifecycle;
mod reader;
pub mod state;
mod timers;
mod writer;

pub use ack_group::AckConnectionGroup;
pub use asyncq::AsyncQueue;
pub use state::ConnectionState;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::config::TransportConfig;
use crate::dispatch::MessageDispatcher;
use crate::iofilter::IoFilter;
use crate::member::{MemberId, MemberVersion};
use crate::membership::MembershipView;
use crate::reassembly::ReassemblerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

pub struct Connection {
    pub id: u64,
    pub remote: MemberId,
    pub remote_incarnation: MemberVersion,
    pub role: Role,
    pub shared: bool,
    pub preserve_order: bool,
    /// Negotiated during the handshake (§4.6): a `preserveOrder` sender whose
    /// peer published non-zero async parameters sends through the async
    /// queue instead of writing straight to the socket.
    pub async_mode: bool,

    pub(crate) state: Mutex<ConnectionState>,
    closed: std::sync::atomic::AtomicBool,

    pub(crate) writer: AsyncMutex<Box<dyn AsyncWrite + Unpin + Send>>,
    pub(crate) filter: Arc<Mutex<Box<dyn IoFilter>>>,

    pub(crate) next_message_id: AtomicU16,
    pub(crate) pending_acks: Mutex<HashMap<u16, oneshot::Sender<()>>>,

    messages_sent: AtomicU64,
    messages_received: AtomicU64,

    pub(crate) last_activity: Mutex<Instant>,
    pub(crate) consecutive_ack_timeouts: AtomicU32,

    /// Set while a send (and any direct-ack wait chained onto it) is in
    /// flight; read by `timers::run_ack_watchdog` off the connection's own
    /// `state` to detect a stalled `Sending` write with no caller-side
    /// timeout of its own.
    pub(crate) transmission_start: Mutex<Option<Instant>>,
    pub(crate) ack_wait_fired: AtomicBool,
    pub(crate) severe_alert_fired: AtomicBool,
    pub(crate) ack_group: Arc<AckConnectionGroup>,

    pub(crate) config: TransportConfig,
    pub(crate) async_queue: Arc<AsyncQueue>,
    pub(crate) membership: Arc<dyn MembershipView>,
    pub(crate) buffer_vendor: Arc<crate::buffer::BufferVendor>,
    pub(crate) cancel: CancellationToken,

    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Connection {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        remote: MemberId,
        remote_incarnation: MemberVersion,
        role: Role,
        shared: bool,
        preserve_order: bool,
        async_mode: bool,
        writer: Box<dyn AsyncWrite + Unpin + Send>,
        filter: Arc<Mutex<Box<dyn IoFilter>>>,
        config: TransportConfig,
        membership: Arc<dyn MembershipView>,
        ack_group: Arc<AckConnectionGroup>,
    ) -> Arc<Self> {
        let async_queue = AsyncQueue::new(config.async_max_queue_size);
        let buffer_vendor = crate::buffer::BufferVendor::new(filter.lock().receive_buffer_hint());
        Arc::new(Self {
            id,
            remote,
            remote_incarnation,
            role,
            shared,
            preserve_order,
            async_mode,
            state: Mutex::new(ConnectionState::Idle),
            closed: std::sync::atomic::AtomicBool::new(false),
            writer: AsyncMutex::new(writer),
            filter,
            next_message_id: AtomicU16::new(0),
            pending_acks: Mutex::new(HashMap::new()),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            last_activity: Mutex::new(Instant::now()),
            consecutive_ack_timeouts: AtomicU32::new(0),
            transmission_start: Mutex::new(None),
            ack_wait_fired: AtomicBool::new(false),
            severe_alert_fired: AtomicBool::new(false),
            ack_group,
            config,
            async_queue,
            membership,
            buffer_vendor,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawns the reader loop, the async-queue pusher, and the idle-timeout
    /// and ack-watchdog timers. Splitting construction from spawning lets
    /// callers finish wiring (e.g. registering in a `ConnectionTable`)
    /// before any background task can observe a half-built connection.
    pub fn spawn(
        self: &Arc<Self>,
        reader: Box<dyn AsyncRead + Unpin + Send>,
        dispatcher: Arc<dyn MessageDispatcher>,
        reassembly: Arc<ReassemblerPool>,
    ) {
        self.ack_group.register(self);

        let reader_conn = self.clone();
        let reader_handle = tokio::spawn(async move { reader_conn.run_reader(reader, dispatcher, reassembly).await });

        let pusher_conn = self.clone();
        let pusher_handle = tokio::spawn(async move { pusher_conn.run_async_pusher().await });

        let idle_timer_conn = self.clone();
        let idle_timer_handle = tokio::spawn(async move { idle_timer_conn.run_idle_timer().await });

        let ack_watchdog_conn = self.clone();
        let ack_watchdog_handle = tokio::spawn(async move { ack_watchdog_conn.run_ack_watchdog().await });

        *self.state.lock() = ConnectionState::Reading;
        self.tasks.lock().extend([reader_handle, pusher_handle, idle_timer_handle, ack_watchdog_handle]);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(std::sync::atomic::Ordering::Relaxed)
    }
}
