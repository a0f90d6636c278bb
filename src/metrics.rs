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

//! Metric name constants, gated behind the `metrics` feature.

pub mod names {
    pub mod connections {
        pub const OPENED: &str = "nodelink_connections_opened_total";
        pub const CLOSED: &str = "nodelink_connections_closed_total";
        pub const ACTIVE: &str = "nodelink_connections_active";
        pub const HANDSHAKE_FAILURES: &str = "nodelink_handshake_failures_total";
    }

    pub mod messages {
        pub const SENT: &str = "nodelink_messages_sent_total";
        pub const RECEIVED: &str = "nodelink_messages_received_total";
        pub const CONFLATED: &str = "nodelink_messages_conflated_total";
        pub const CHUNKED_SENT: &str = "nodelink_chunked_messages_sent_total";
    }

    pub mod queue {
        pub const DEPTH: &str = "nodelink_async_queue_depth";
        pub const BYTES: &str = "nodelink_async_queue_bytes";
        pub const DISCONNECTS: &str = "nodelink_async_queue_disconnects_total";
        pub const SIZE_EXCEEDED: &str = "nodelink_async_queue_size_exceeded_total";
    }

    pub mod ack {
        pub const TIMEOUTS: &str = "nodelink_ack_timeouts_total";
        pub const SEVERE_ALERTS: &str = "nodelink_ack_severe_alerts_total";
    }
}

#[cfg(feature = "metrics")]
pub fn increment(name: &'static str) {
    metrics::counter!(name).increment(1);
}

#[cfg(not(feature = "metrics"))]
pub fn increment(_name: &'static str) {}

#[cfg(feature = "metrics")]
pub fn gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}

#[cfg(not(feature = "metrics"))]
pub fn gauge(_name: &'static str, _value: f64) {}
