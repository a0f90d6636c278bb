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

use std::io::ErrorKind;

/// Every error the transport surfaces to its caller.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol version mismatch: expected {expected}, got {got}")]
    ProtocolVersionMismatch { expected: u8, got: u8 },

    #[error("unknown message type {0:#x}")]
    UnknownMessageType(u8),

    #[error("message of {0} bytes exceeds the maximum frame size")]
    MessageTooLarge(usize),

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    #[error("peer sent an invalid handshake preamble")]
    InvalidHandshake,

    #[error("peer is shunned")]
    MemberShunned,

    #[error("peer left the membership view")]
    MemberLeft,

    #[error("tls handshake/authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("chunk protocol violation: {0}")]
    ChunkProtocolError(&'static str),

    #[error("out of memory while reassembling chunked message {0}")]
    ReassemblyOom(u16),

    #[error("not connected to {0}")]
    NotConnected(String),

    #[error("forced disconnect sent to {0}")]
    ForcedDisconnect(String),

    #[error("ack wait timeout elapsed while waiting on {0}")]
    AckTimeout(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("connection is closing")]
    Closing,

    #[error("async queue to {0} is full")]
    AsyncQueueFull(String),
}

impl TransportError {
    /// True for errors that are an expected consequence of a peer going
    /// away, worth a `debug!`/`trace!` rather than a `warn!`.
    pub fn is_trivial(&self) -> bool {
        match self {
            TransportError::Io(e) => matches!(
                e.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::TimedOut
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionRefused
            ),
            TransportError::MemberLeft | TransportError::Cancelled | TransportError::Closing => true,
            _ => false,
        }
    }

    /// Errors that must never trigger a retry (protocol-level or auth failures).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::ProtocolVersionMismatch { .. }
                | TransportError::UnknownMessageType(_)
                | TransportError::MessageTooLarge(_)
                | TransportError::InvalidHandshake
                | TransportError::AuthenticationFailure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
