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

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::{HandshakeContext, HandshakeOutcome, MAX_DOMINO_COUNT};
use crate::codec::MessageType;
use crate::config::TransportConfig;
use crate::constants::{HANDSHAKE_TIMEOUT, NO_MESSAGE_ID};
use crate::error::{Result, TransportError};
use crate::iofilter::IoFilter;
use crate::member::MemberVersion;
use crate::membership::{MemberStatus, MembershipView};
use crate::serialization::{HandshakeReply, Preamble};
use crate::wire::{read_frame, write_frame};

/// Responder side: wait for the initiator's preamble, then reply with a
/// reply-code frame, offering async parameters whenever `config` has a
/// non-zero `asyncDistributionTimeout` to publish. Bounded by the fixed
/// handshake timeout; callers on an accept loop should run this inside its
/// own task so a slow/hostile initiator can't stall other accepts.
///
/// A peer `membership` has never heard of is registered as a surprise member
/// before the reply goes out, so anything that queries membership after
/// seeing a successful handshake is guaranteed to already find the peer.
pub async fn respond_handshake<S>(
    stream: &mut S,
    filter: &mut dyn IoFilter,
    ctx: &HandshakeContext,
    membership: &dyn MembershipView,
    config: &TransportConfig,
) -> Result<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let outcome = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        let (_, request_bytes) = read_frame(stream, filter).await?;
        let request = Preamble::decode(&request_bytes)?;

        if request.domino_count >= MAX_DOMINO_COUNT {
            warn!(remote = %request.member(), domino_count = request.domino_count, "rejecting handshake past the domino limit");
            return Err(TransportError::InvalidHandshake);
        }

        let known = !matches!(membership.status(&request.member()).await, MemberStatus::Unknown);
        if !known {
            membership.register_surprise_member(&request.member()).await;
        }

        let preserve_order = ctx.preserve_order || request.preserve_order;
        let reply = HandshakeReply::for_config(config, ctx.local_incarnation);
        write_frame(stream, filter, &reply.encode(), MessageType::Normal, false, NO_MESSAGE_ID).await?;

        Ok(HandshakeOutcome {
            remote: request.member(),
            remote_incarnation: MemberVersion(request.incarnation),
            shared: ctx.shared || request.shared,
            preserve_order,
            async_mode: reply.negotiates_async_mode(preserve_order),
        })
    })
    .await
    .map_err(|_| crate::error::TransportError::HandshakeTimeout(HANDSHAKE_TIMEOUT))??;

    debug!(remote = %outcome.remote, async_mode = outcome.async_mode, "handshake completed as responder");
    Ok(outcome)
}
