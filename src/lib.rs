// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A pre-forked TCP echo service with three interchangeable worker concurrency strategies, and
//! a load-generating client to drive it.
//!
//! - [`worker::forked::ForkedWorker`]: one blocking worker process per connection.
//! - [`worker::multiplex_epoll::EdgeTriggeredWorker`]: a fixed pool of workers, each multiplexing
//!   many connections with `mio`'s edge-triggered readiness API.
//! - [`worker::multiplex_scan::ScanWorker`]: a fixed pool of workers, each multiplexing many
//!   connections by re-scanning the full client table with `select(2)`.
//!
//! [`supervisor::Supervisor`] is generic over [`worker::EchoWorker`] and owns forking, IPC event
//! bookkeeping, and signal-driven shutdown; the three binaries in `src/bin/` differ only in
//! which worker type they instantiate it with.

pub mod client;
pub mod config;
pub mod error;
pub mod ipc;
pub mod net;
pub mod supervisor;
pub mod worker;
