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

//! Tunables every connection is built from. Plain struct, validated at
//! construction; no external config-file crate needed for this layer.

use std::time::Duration;

use crate::constants::{HANDSHAKE_TIMEOUT, RECONNECT_WAIT_TIME};

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// How long a connection may sit idle before its idle timer fires.
    pub member_timeout: Duration,
    /// A fire-and-forget send's bounded direct-write attempt before it trips
    /// over into the async queue (§4.9). Also published to peers during the
    /// handshake; a value of zero means "don't offer async mode at all".
    pub async_distribution_timeout: Duration,
    /// How long the async queue pusher may block on a single item before the
    /// receiver is considered too slow and force-disconnected.
    pub async_queue_timeout: Duration,
    /// Async queue capacity before conflation/backpressure kicks in.
    pub async_max_queue_size: usize,
    /// Consecutive missed direct-ack replies before the peer is suspected.
    pub ack_wait_threshold: Duration,
    /// Further missed direct-ack replies past `ack_wait_threshold` before a
    /// severe alert is raised.
    pub ack_severe_alert_threshold: Duration,
    /// Enables the TLS I/O filter for new connections.
    pub use_ssl: bool,
    /// Enables proactive disconnects on suspected network partitions.
    pub enable_network_partition_detection: bool,
    pub handshake_timeout: Duration,
    pub reconnect_wait_time: Duration,
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.ack_severe_alert_threshold < self.ack_wait_threshold {
            return Err("ack_severe_alert_threshold must be >= ack_wait_threshold".into());
        }
        if self.async_max_queue_size == 0 {
            return Err("async_max_queue_size must be > 0".into());
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            member_timeout: Duration::from_secs(5),
            async_distribution_timeout: Duration::from_secs(60),
            async_queue_timeout: Duration::from_secs(60),
            async_max_queue_size: 4096,
            ack_wait_threshold: Duration::from_secs(15),
            ack_severe_alert_threshold: Duration::from_secs(30),
            use_ssl: false,
            enable_network_partition_detection: false,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            reconnect_wait_time: RECONNECT_WAIT_TIME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(TransportConfig::default().validate().is_ok());
    }

    #[test]
    fn severe_alert_below_wait_threshold_is_rejected() {
        let mut config = TransportConfig::default();
        config.ack_severe_alert_threshold = Duration::from_secs(1);
        config.ack_wait_threshold = Duration::from_secs(5);
        assert!(config.validate().is_err());
    }
}
