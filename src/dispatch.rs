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

//! The receiving side's hand-off point: once a frame (or reassembled
//! chunked message) has been decoded, it is handed to a `MessageDispatcher`
//! rather than interpreted here. This transport only moves bytes.

use async_trait::async_trait;

use crate::member::MemberId;

#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    /// A complete payload arrived from `from`. `direct_ack` is true if the
    /// sender asked for a direct-ack reply once this call returns.
    async fn dispatch(&self, from: &MemberId, payload: Vec<u8>, direct_ack: bool);
}

#[cfg(test)]
pub mod test_support {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct RecordingDispatcher {
        pub received: Mutex<Vec<(MemberId, Vec<u8>, bool)>>,
    }

    #[async_trait]
    impl MessageDispatcher for RecordingDispatcher {
        async fn dispatch(&self, from: &MemberId, payload: Vec<u8>, direct_ack: bool) {
            self.received.lock().push((from.clone(), payload, direct_ack));
        }
    }
}
