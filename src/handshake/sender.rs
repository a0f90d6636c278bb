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

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::{next_unique_id, HandshakeContext, HandshakeOutcome};
use crate::codec::MessageType;
use crate::constants::NO_MESSAGE_ID;
use crate::error::{Result, TransportError};
use crate::iofilter::IoFilter;
use crate::member::{MemberId, MemberVersion};
use crate::metrics;
use crate::serialization::{HandshakeReply, Preamble};
use crate::wire::{read_frame, write_frame};

/// Initiator side: write our preamble, then block for the responder's
/// reply-code frame, bounded by `timeout`. The reply never repeats the
/// target's own identity -- the initiator already dialed a specific
/// `target`, so that's the identity `HandshakeOutcome::remote` carries;
/// `target_incarnation` is the fallback used whenever the reply is a plain
/// OK with no version-ordinal of its own to report.
pub async fn initiate_handshake<S>(
    stream: &mut S,
    filter: &mut dyn IoFilter,
    ctx: &HandshakeContext,
    target: &MemberId,
    target_incarnation: MemberVersion,
    timeout: Duration,
) -> Result<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if ctx.domino_limit_exceeded() {
        warn!(member = %ctx.local, "refusing to initiate handshake past the domino limit");
        return Err(TransportError::InvalidHandshake);
    }

    let unique_id = next_unique_id();
    let preamble = Preamble::new(&ctx.local, ctx.local_incarnation, ctx.shared, ctx.preserve_order, unique_id, ctx.domino_count);

    let result = tokio::time::timeout(timeout, async {
        write_frame(stream, filter, &preamble.encode(), MessageType::Normal, false, NO_MESSAGE_ID).await?;
        let (_, reply_bytes) = read_frame(stream, filter).await?;
        HandshakeReply::decode(&reply_bytes)
    })
    .await;

    match result {
        Ok(Ok(reply)) => {
            let async_mode = reply.negotiates_async_mode(ctx.preserve_order);
            let remote_incarnation = reply.version_ordinal().map(MemberVersion).unwrap_or(target_incarnation);
            debug!(remote = %target, unique_id, async_mode, "handshake completed as initiator");
            Ok(HandshakeOutcome {
                remote: target.clone(),
                remote_incarnation,
                shared: ctx.shared,
                preserve_order: ctx.preserve_order,
                async_mode,
            })
        }
        Ok(Err(e)) => {
            metrics::increment(metrics::names::connections::HANDSHAKE_FAILURES);
            Err(e)
        }
        Err(_) => {
            metrics::increment(metrics::names::connections::HANDSHAKE_FAILURES);
            Err(TransportError::HandshakeTimeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::handshake::respond_handshake;
    use crate::iofilter::PlainFilter;
    use crate::member::MemberId;
    use crate::membership::test_support::FakeMembershipView;

    #[tokio::test(flavor = "multi_thread")]
    async fn initiator_and_responder_agree_on_identity() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let mut filter_a = PlainFilter;
        let mut filter_b = PlainFilter;

        let initiator = HandshakeContext::new(
            MemberId::new("node-a", "127.0.0.1:4000".parse().unwrap()),
            MemberVersion(1),
        );
        let target = MemberId::new("node-b", "127.0.0.1:4001".parse().unwrap());
        let responder_ctx = HandshakeContext::new(target.clone(), MemberVersion(1));
        let responder_membership = FakeMembershipView::default();
        let responder_config = TransportConfig::default();

        let responder = tokio::spawn(async move {
            respond_handshake(&mut b, &mut filter_b, &responder_ctx, &responder_membership, &responder_config).await
        });

        let outcome = initiate_handshake(&mut a, &mut filter_a, &initiator, &target, MemberVersion(1), Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome.remote.name, "node-b");
        assert!(!outcome.async_mode);

        let responder_outcome = responder.await.unwrap().unwrap();
        assert_eq!(responder_outcome.remote.name, "node-a");
    }

    #[tokio::test]
    async fn initiator_times_out_if_no_reply_arrives() {
        let (mut a, _b) = tokio::io::duplex(4096);
        let mut filter_a = PlainFilter;
        let ctx = HandshakeContext::new(MemberId::new("node-a", "127.0.0.1:4000".parse().unwrap()), MemberVersion(1));
        let target = MemberId::new("node-b", "127.0.0.1:4001".parse().unwrap());
        let result = initiate_handshake(&mut a, &mut filter_a, &ctx, &target, MemberVersion(1), Duration::from_millis(50)).await;
        assert!(matches!(result, Err(TransportError::HandshakeTimeout(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn async_info_reply_negotiates_async_mode_for_preserve_order_sender() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let mut filter_a = PlainFilter;
        let mut filter_b = PlainFilter;

        let mut initiator = HandshakeContext::new(MemberId::new("node-a", "127.0.0.1:4000".parse().unwrap()), MemberVersion(1));
        initiator.preserve_order = true;
        let target = MemberId::new("node-b", "127.0.0.1:4001".parse().unwrap());
        let responder_ctx = HandshakeContext::new(target.clone(), MemberVersion(1));
        let responder_membership = FakeMembershipView::default();
        let mut responder_config = TransportConfig::default();
        responder_config.async_distribution_timeout = Duration::from_secs(30);

        let responder = tokio::spawn(async move {
            respond_handshake(&mut b, &mut filter_b, &responder_ctx, &responder_membership, &responder_config).await
        });
        let outcome = initiate_handshake(&mut a, &mut filter_a, &initiator, &target, MemberVersion(1), Duration::from_secs(5)).await.unwrap();
        responder.await.unwrap().unwrap();

        assert!(outcome.async_mode);
    }
}
