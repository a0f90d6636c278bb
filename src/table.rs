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

//! Indexes live connections by remote member, sharing mode, and ordering
//! requirement, and owns the get-or-connect path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tracing::warn;

use crate::config::TransportConfig;
use crate::connection::{AckConnectionGroup, Connection, Role};
use crate::dispatch::MessageDispatcher;
use crate::error::{Result, TransportError};
use crate::handshake::{initiate_handshake, respond_handshake, HandshakeContext};
use crate::iofilter::{IoFilter, PlainFilter};
use crate::member::{MemberId, MemberVersion};
use crate::membership::{MemberStatus, MembershipView};
use crate::reassembly::ReassemblerPool;

/// A connection is keyed by remote identity plus the two mode flags: a
/// shared, order-preserving connection to a member is a different slot from
/// an unshared or unordered one to the same member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TableKey {
    member: MemberId,
    shared: bool,
    preserve_order: bool,
}

#[async_trait]
pub trait ConnectionTable: Send + Sync {
    async fn get_or_connect(&self, member: &MemberId, shared: bool, preserve_order: bool) -> Result<Arc<Connection>>;
    fn remove(&self, member: &MemberId, shared: bool, preserve_order: bool);
    fn snapshot(&self) -> Vec<MemberId>;
}

pub struct DefaultConnectionTable {
    local: MemberId,
    local_incarnation: MemberVersion,
    config: TransportConfig,
    membership: Arc<dyn MembershipView>,
    dispatcher: Arc<dyn MessageDispatcher>,
    reassembly: Arc<ReassemblerPool>,
    connections: RwLock<HashMap<TableKey, Arc<Connection>>>,
    next_id: AtomicU64,
    ack_group: Arc<AckConnectionGroup>,
}

impl DefaultConnectionTable {
    pub fn new(
        local: MemberId,
        local_incarnation: MemberVersion,
        config: TransportConfig,
        membership: Arc<dyn MembershipView>,
        dispatcher: Arc<dyn MessageDispatcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            local,
            local_incarnation,
            config,
            membership,
            dispatcher,
            reassembly: Arc::new(ReassemblerPool::new(64 * 1024 * 1024)),
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            ack_group: AckConnectionGroup::new(),
        })
    }

    /// One bare TCP-connect-then-handshake attempt. Callers retry through
    /// `connect`; this never loops itself.
    async fn try_connect_once(&self, member: &MemberId, shared: bool, preserve_order: bool) -> Result<Arc<Connection>> {
        let mut domino = HandshakeContext::new(self.local.clone(), self.local_incarnation);
        domino.shared = shared;
        domino.preserve_order = preserve_order;

        let mut stream = TcpStream::connect(member.addr).await?;
        stream.set_nodelay(true).ok();

        let mut filter: Box<dyn IoFilter> = if self.config.use_ssl {
            return Err(TransportError::AuthenticationFailure("TLS engine must be supplied by the host application".into()));
        } else {
            Box::new(PlainFilter)
        };

        // This table doesn't itself track a remote's last-known incarnation
        // (that's the membership view's job); `MemberVersion(0)` is the
        // fallback used only when the responder's reply is a plain OK with
        // no version-ordinal of its own to report.
        let outcome = initiate_handshake(&mut stream, filter.as_mut(), &domino, member, MemberVersion(0), self.config.handshake_timeout).await?;

        let (read_half, write_half) = tokio::io::split(stream);
        let shared_filter = Arc::new(parking_lot::Mutex::new(filter));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let conn = Connection::new(
            id,
            outcome.remote,
            outcome.remote_incarnation,
            Role::Initiator,
            outcome.shared,
            outcome.preserve_order,
            outcome.async_mode,
            Box::new(write_half),
            shared_filter,
            self.config.clone(),
            self.membership.clone(),
            self.ack_group.clone(),
        );
        conn.spawn(Box::new(read_half), self.dispatcher.clone(), self.reassembly.clone());
        Ok(conn)
    }

    /// Sender-side connect with the retry loop from the handshake spec: a
    /// non-fatal failure (TLS auth rejection is fatal and returns
    /// immediately) is retried every `reconnect_wait_time` for as long as
    /// membership still considers the remote alive, escalating to suspect
    /// and then a severe alert the longer the remote stays unreachable, and
    /// giving up only once membership reports the remote gone or shunned.
    async fn connect(&self, member: &MemberId, shared: bool, preserve_order: bool) -> Result<Arc<Connection>> {
        let started = Instant::now();
        let mut suspected = false;
        let mut severe_alerted = false;

        loop {
            match self.try_connect_once(member, shared, preserve_order).await {
                Ok(conn) => return Ok(conn),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    match self.membership.status(member).await {
                        MemberStatus::Left | MemberStatus::Shunned => {
                            warn!(remote = %member, "giving up on connect: remote left or is shunned");
                            return Err(TransportError::MemberLeft);
                        }
                        MemberStatus::Alive | MemberStatus::Unknown => {}
                    }

                    let elapsed = started.elapsed();
                    if !suspected && elapsed >= self.config.ack_wait_threshold {
                        suspected = true;
                        self.membership.suspect(member, 1).await;
                    }
                    if !severe_alerted && elapsed >= self.config.ack_wait_threshold + self.config.ack_severe_alert_threshold {
                        severe_alerted = true;
                        warn!(remote = %member, waited = ?elapsed, "severe alert: still unable to connect to remote");
                    }

                    warn!(remote = %member, error = %e, wait = ?self.config.reconnect_wait_time, "connect attempt failed, retrying");
                    tokio::time::sleep(self.config.reconnect_wait_time).await;
                }
            }
        }
    }

    /// Accepts and handshakes a connection initiated by a remote peer,
    /// registering it in the table under the mode the handshake negotiated.
    pub async fn accept(self: &Arc<Self>, mut stream: TcpStream) -> Result<Arc<Connection>> {
        stream.set_nodelay(true).ok();
        let ctx = HandshakeContext::new(self.local.clone(), self.local_incarnation);

        let mut filter: Box<dyn IoFilter> = Box::new(PlainFilter);
        let outcome = respond_handshake(&mut stream, filter.as_mut(), &ctx, self.membership.as_ref(), &self.config).await?;

        let (read_half, write_half) = tokio::io::split(stream);
        let shared_filter = Arc::new(parking_lot::Mutex::new(filter));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let conn = Connection::new(
            id,
            outcome.remote.clone(),
            outcome.remote_incarnation,
            Role::Responder,
            outcome.shared,
            outcome.preserve_order,
            outcome.async_mode,
            Box::new(write_half),
            shared_filter,
            self.config.clone(),
            self.membership.clone(),
            self.ack_group.clone(),
        );
        conn.spawn(Box::new(read_half), self.dispatcher.clone(), self.reassembly.clone());

        let key = TableKey { member: outcome.remote, shared: outcome.shared, preserve_order: outcome.preserve_order };
        self.connections.write().insert(key, conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl ConnectionTable for DefaultConnectionTable {
    async fn get_or_connect(&self, member: &MemberId, shared: bool, preserve_order: bool) -> Result<Arc<Connection>> {
        let key = TableKey { member: member.clone(), shared, preserve_order };
        if let Some(existing) = self.connections.read().get(&key) {
            if !existing.is_closed() {
                return Ok(existing.clone());
            }
        }
        let conn = self.connect(member, shared, preserve_order).await?;
        self.connections.write().insert(key, conn.clone());
        Ok(conn)
    }

    fn remove(&self, member: &MemberId, shared: bool, preserve_order: bool) {
        let key = TableKey { member: member.clone(), shared, preserve_order };
        self.connections.write().remove(&key);
    }

    fn snapshot(&self) -> Vec<MemberId> {
        self.connections.read().keys().map(|k| k.member.clone()).collect()
    }
}
