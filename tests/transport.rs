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

//! End-to-end coverage over real loopback sockets: handshake, a plain
//! message, a chunked one, conflation, slow-receiver disconnect, and a
//! rejected handshake.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use nodelink_tcp::codec::MessageType;
use nodelink_tcp::config::TransportConfig;
use nodelink_tcp::connection::{AckConnectionGroup, Connection, Role};
use nodelink_tcp::dispatch::MessageDispatcher;
use nodelink_tcp::iofilter::PlainFilter;
use nodelink_tcp::member::{MemberId, MemberVersion};
use nodelink_tcp::membership::{MemberStatus, MembershipView};
use nodelink_tcp::table::{ConnectionTable, DefaultConnectionTable};

struct OpenMembership;

#[async_trait]
impl MembershipView for OpenMembership {
    async fn status(&self, _member: &MemberId) -> MemberStatus {
        MemberStatus::Alive
    }
    async fn suspect(&self, _member: &MemberId, _consecutive_ack_timeouts: u32) {}
    async fn force_remove(&self, _member: &MemberId) {}
    async fn register_surprise_member(&self, _member: &MemberId) {}
}

#[derive(Default)]
struct RecordingMembership {
    removed: Mutex<Vec<MemberId>>,
    registered: Mutex<Vec<MemberId>>,
}

#[async_trait]
impl MembershipView for RecordingMembership {
    async fn status(&self, _member: &MemberId) -> MemberStatus {
        MemberStatus::Alive
    }
    async fn suspect(&self, _member: &MemberId, _consecutive_ack_timeouts: u32) {}
    async fn force_remove(&self, member: &MemberId) {
        self.removed.lock().push(member.clone());
    }
    async fn register_surprise_member(&self, member: &MemberId) {
        self.registered.lock().push(member.clone());
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    received: Mutex<Vec<(MemberId, Vec<u8>, bool)>>,
}

#[async_trait]
impl MessageDispatcher for RecordingDispatcher {
    async fn dispatch(&self, from: &MemberId, payload: Vec<u8>, direct_ack: bool) {
        self.received.lock().push((from.clone(), payload, direct_ack));
    }
}

async fn wait_for<F: Fn() -> bool>(predicate: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

#[tokio::test(flavor = "multi_thread")]
async fn handshake_then_plain_message_reaches_the_dispatcher() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();

    let server_dispatcher = Arc::new(RecordingDispatcher::default());
    let server_table = DefaultConnectionTable::new(
        MemberId::new("server", server_addr),
        MemberVersion(1),
        TransportConfig::default(),
        Arc::new(OpenMembership),
        server_dispatcher.clone(),
    );

    let accept_table = server_table.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        accept_table.accept(stream).await.unwrap();
    });

    let client_dispatcher = Arc::new(RecordingDispatcher::default());
    let client_table = DefaultConnectionTable::new(
        MemberId::new("client", "127.0.0.1:0".parse().unwrap()),
        MemberVersion(1),
        TransportConfig::default(),
        Arc::new(OpenMembership),
        client_dispatcher,
    );

    let server_member = MemberId::new("server", server_addr);
    let conn = client_table.get_or_connect(&server_member, false, false).await.unwrap();
    conn.send(b"hello world", MessageType::Normal, false).await.unwrap();

    wait_for(|| !server_dispatcher.received.lock().is_empty()).await;

    let received = server_dispatcher.received.lock();
    assert_eq!(received[0].1, b"hello world");
    assert!(!received[0].2);
}

#[tokio::test(flavor = "multi_thread")]
async fn chunked_message_reassembles_before_dispatch() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();

    let server_dispatcher = Arc::new(RecordingDispatcher::default());
    let server_table = DefaultConnectionTable::new(
        MemberId::new("server", server_addr),
        MemberVersion(1),
        TransportConfig::default(),
        Arc::new(OpenMembership),
        server_dispatcher.clone(),
    );

    let accept_table = server_table.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        accept_table.accept(stream).await.unwrap();
    });

    let client_table = DefaultConnectionTable::new(
        MemberId::new("client", "127.0.0.1:0".parse().unwrap()),
        MemberVersion(1),
        TransportConfig::default(),
        Arc::new(OpenMembership),
        Arc::new(RecordingDispatcher::default()),
    );

    let server_member = MemberId::new("server", server_addr);
    let conn = client_table.get_or_connect(&server_member, false, false).await.unwrap();

    let message_id = conn.allocate_message_id();
    conn.send_chunk(message_id, b"Hello, ", false, false).await.unwrap();
    conn.send_chunk(message_id, b"chunked ", false, false).await.unwrap();
    conn.send_chunk(message_id, b"world!", true, false).await.unwrap();

    wait_for(|| !server_dispatcher.received.lock().is_empty()).await;

    let received = server_dispatcher.received.lock();
    assert_eq!(received[0].1, b"Hello, chunked world!");
}

/// S3: repeated async sends sharing a conflation key collapse to the last
/// value instead of piling up, and the receiver only ever sees that final
/// value once the queue drains.
#[tokio::test(flavor = "multi_thread")]
async fn conflated_async_sends_deliver_only_the_latest_value() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();

    let server_dispatcher = Arc::new(RecordingDispatcher::default());
    let server_table = DefaultConnectionTable::new(
        MemberId::new("server", server_addr),
        MemberVersion(1),
        TransportConfig::default(),
        Arc::new(OpenMembership),
        server_dispatcher.clone(),
    );

    let accept_table = server_table.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        accept_table.accept(stream).await.unwrap();
    });

    // A near-zero distribution timeout forces every async send to trip over
    // into the queue instead of writing straight through, matching S3's
    // "asyncDistributionTimeout=1 forcing queuing" setup.
    let mut client_config = TransportConfig::default();
    client_config.async_distribution_timeout = Duration::from_nanos(1);
    let client_table = DefaultConnectionTable::new(
        MemberId::new("client", "127.0.0.1:0".parse().unwrap()),
        MemberVersion(1),
        client_config,
        Arc::new(OpenMembership),
        Arc::new(RecordingDispatcher::default()),
    );

    let server_member = MemberId::new("server", server_addr);
    // preserveOrder=true negotiates asyncMode against the server's default
    // (non-zero) asyncDistributionTimeout offer.
    let conn = client_table.get_or_connect(&server_member, false, true).await.unwrap();
    assert!(conn.async_mode);

    conn.send_async(Some(7), vec![10, 20]).await.unwrap();
    conn.send_async(Some(7), vec![11, 22, 33]).await.unwrap();
    conn.send_async(Some(7), vec![12]).await.unwrap();

    wait_for(|| !server_dispatcher.received.lock().is_empty()).await;
    // Give any (unlikely) un-conflated extra deliveries a moment to land
    // before asserting on the final state.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let received = server_dispatcher.received.lock();
    assert_eq!(received.last().unwrap().1, vec![12]);
}

/// S4: crossing the async queue's byte cap forces the remote out instead of
/// blocking or silently dropping data, and tells membership to forget it.
///
/// The connection is built with `Connection::new` directly and deliberately
/// never `spawn`-ed: the async pusher task runs concurrently with producer
/// calls in the real path, and it credits a popped item's bytes back to
/// `queued_bytes` the instant it dequeues it (before the write even
/// finishes) -- racing that against this test's own cap-crossing assertion
/// would make the outcome depend on scheduling. Leaving the pusher
/// unspawned keeps the byte accounting this test cares about deterministic;
/// S4's force-disconnect path (`disconnect_slow_receiver`) doesn't need a
/// running reader or pusher to fire.
#[tokio::test(flavor = "multi_thread")]
async fn slow_receiver_crossing_the_byte_cap_is_force_disconnected() {
    // A tiny duplex buffer that nobody on the other end ever reads gives
    // genuine, deterministic backpressure: every write past its capacity
    // blocks forever rather than completing, so each send_async's bounded
    // direct-write attempt reliably times out and falls through to enqueue.
    let (writer_half, _unread_peer_writes) = tokio::io::duplex(16);

    let membership = Arc::new(RecordingMembership::default());
    let remote = MemberId::new("slow-peer", "127.0.0.1:9100".parse().unwrap());

    let mut config = TransportConfig::default();
    config.async_max_queue_size = 64;
    config.async_distribution_timeout = Duration::from_millis(20);
    config.async_queue_timeout = Duration::from_millis(50);

    let conn = Connection::new(
        1,
        remote.clone(),
        MemberVersion(1),
        Role::Initiator,
        false,
        true,
        true,
        Box::new(writer_half),
        Arc::new(parking_lot::Mutex::new(Box::new(PlainFilter) as Box<dyn nodelink_tcp::iofilter::IoFilter>)),
        config,
        membership.clone(),
        AckConnectionGroup::new(),
    );

    // Two 32-byte messages exactly fill the 64-byte cap; the third must be
    // rejected rather than silently queued or blocked on.
    conn.send_async(None, vec![0u8; 32]).await.unwrap();
    conn.send_async(None, vec![0u8; 32]).await.unwrap();
    let result = conn.send_async(None, vec![0u8; 32]).await;

    assert!(matches!(result, Err(nodelink_tcp::TransportError::ForcedDisconnect(_))));
    assert!(conn.is_closed());
    assert_eq!(membership.removed.lock()[0], remote);
}

/// S6: a handshake that fails version validation must not register the
/// connecting peer as a surprise member, and nothing should ever reach the
/// dispatcher for it.
#[tokio::test(flavor = "multi_thread")]
async fn bad_handshake_version_does_not_register_a_surprise_member() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();

    let server_dispatcher = Arc::new(RecordingDispatcher::default());
    let membership = Arc::new(RecordingMembership::default());
    let server_table = DefaultConnectionTable::new(
        MemberId::new("server", server_addr),
        MemberVersion(1),
        TransportConfig::default(),
        membership.clone(),
        server_dispatcher.clone(),
    );

    let client_stream = tokio::net::TcpStream::connect(server_addr).await.unwrap();
    let (server_stream, _) = listener.accept().await.unwrap();

    let mut bad_preamble =
        nodelink_tcp::serialization::Preamble::new(&MemberId::new("intruder", "127.0.0.1:1".parse().unwrap()), MemberVersion(1), false, false, 1, 0)
            .encode();
    // Corrupt the handshake-version byte (offset 1, right after the
    // mandatory leading zero byte) so it no longer matches HANDSHAKE_VERSION.
    bad_preamble[1] = 6;

    use tokio::io::AsyncWriteExt;
    let mut client_stream = client_stream;
    let header = nodelink_tcp::codec::FrameHeader::new(bad_preamble.len() as u32, MessageType::Normal, false, nodelink_tcp::constants::NO_MESSAGE_ID).unwrap();
    client_stream.write_all(&header.pack().unwrap()).await.unwrap();
    client_stream.write_all(&bad_preamble).await.unwrap();

    let result = server_table.accept(server_stream).await;
    assert!(result.is_err());
    assert!(membership.registered.lock().is_empty());
    assert!(server_dispatcher.received.lock().is_empty());
}
