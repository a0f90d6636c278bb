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

//! A peer-to-peer TCP transport for a distributed cluster.
//!
//! Each connection is framed (see [`codec`]), optionally encrypted by a
//! pluggable [`iofilter`], and driven by three cooperating tasks once
//! [`connection::Connection::spawn`] is called: a reader loop, an
//! async-queue pusher, and an idle-timeout watchdog. Membership and message
//! dispatch are deliberately out of scope -- this crate only moves bytes
//! between members and asks its [`membership`]/[`dispatch`] collaborators
//! what to do with them.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod connection;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod iofilter;
pub mod member;
pub mod membership;
pub mod metrics;
pub mod reassembly;
pub mod serialization;
pub mod table;
mod wire;

pub use config::TransportConfig;
pub use connection::{Connection, Role};
pub use error::{Result, TransportError};
pub use member::{MemberId, MemberVersion};
pub use table::{ConnectionTable, DefaultConnectionTable};
