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

//! Idle-timeout watchdog, plus the ack-wait/severe-alert watchdog that
//! covers plain sends the direct-ack path in `ack.rs` never sees on its own.
//! `ack.rs` already escalates suspicion around its own explicit `await_ack`
//! timeout, so this watchdog only has to catch a write stuck in `Sending` --
//! a send with no caller-side timeout wrapped around it at all.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, warn};

use super::state::ConnectionState;
use super::Connection;

impl Connection {
    pub(crate) async fn run_idle_timer(self: Arc<Self>) {
        let poll_interval = (self.config.member_timeout / 4).max(Duration::from_millis(100));
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let idle_for = self.last_activity.lock().elapsed();
                    if idle_for >= self.config.member_timeout {
                        warn!(remote = %self.remote, idle_for = ?idle_for, "idle timeout elapsed");
                        self.force_close("idle timeout").await;
                        break;
                    }
                }
            }
        }
    }

    /// Marks the start of a transmission, resetting the escalation flags so
    /// a fresh send gets its own ack-wait/severe-alert window.
    pub(crate) fn begin_transmission(&self) {
        *self.transmission_start.lock() = Some(Instant::now());
        self.ack_wait_fired.store(false, Ordering::Release);
        self.severe_alert_fired.store(false, Ordering::Release);
    }

    /// Clears the in-flight transmission clock once a send (and any ack
    /// wait chained onto it) is fully resolved.
    pub(crate) fn end_transmission(&self) {
        *self.transmission_start.lock() = None;
    }

    /// Pushes this connection's transmission clock forward, called by a
    /// sibling in the same `AckConnectionGroup` when its own severe alert
    /// just fired, so this connection doesn't immediately re-trip the same
    /// alert for what is likely the same slow receiver.
    pub(crate) fn bump_transmission_start(&self, bump: Duration) {
        if let Some(started) = self.transmission_start.lock().as_mut() {
            *started += bump;
        }
    }

    #[cfg(test)]
    pub(crate) fn transmission_start_for_test(&self) -> Option<Instant> {
        *self.transmission_start.lock()
    }

    pub(crate) async fn run_ack_watchdog(self: Arc<Self>) {
        let poll_interval = (self.config.ack_wait_threshold / 4).max(Duration::from_millis(20));
        let mut ticker = tokio::time::interval(poll_interval);
        let severe_at = self.config.ack_wait_threshold + self.config.ack_severe_alert_threshold;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let started = *self.transmission_start.lock();
                    let Some(started) = started else { continue };
                    if *self.state.lock() != ConnectionState::Sending {
                        continue;
                    }
                    let elapsed = started.elapsed();

                    if elapsed >= self.config.ack_wait_threshold && !self.ack_wait_fired.swap(true, Ordering::AcqRel) {
                        let count = self.consecutive_ack_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(remote = %self.remote, waited = ?elapsed, "ack wait threshold elapsed on an in-flight send, suspecting remote");
                        self.membership.suspect(&self.remote, count).await;
                    }

                    if elapsed >= severe_at && !self.severe_alert_fired.swap(true, Ordering::AcqRel) {
                        error!(remote = %self.remote, waited = ?elapsed, "severe alert: send has been stuck past ackWaitTimeout + ackSATimeout");
                        crate::metrics::increment(crate::metrics::names::ack::SEVERE_ALERTS);
                        self.ack_group.suppress_others(self.id, self.config.ack_severe_alert_threshold);
                    }
                }
            }
        }
    }
}
