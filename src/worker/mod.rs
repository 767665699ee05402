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

//! Worker variants (C3): the part of the design that differs between the three server flavors.
//!
//! Each variant is a zero-sized marker type implementing [`EchoWorker`]. The supervisor is
//! generic over this trait and otherwise agnostic to which flavor it is running.

pub mod forked;
pub mod multiplex_epoll;
pub mod multiplex_scan;

use std::io;
use std::net::TcpListener;

use crate::ipc::IpcSender;

/// The behavior a forked child process runs after closing the IPC channel's read end.
pub trait EchoWorker {
    /// Whether the supervisor should track `free_workers` and run variant (a)'s grow-only
    /// top-up policy. Only the per-connection-process variant needs this; the multiplexing
    /// variants keep a fixed pool.
    const TRACKS_FREE_WORKERS: bool;

    /// Runs the worker body. `listener` is the shared listening socket inherited across
    /// `fork(2)`; `events` is this worker's handle to the IPC channel's write end.
    ///
    /// Variant (a) returns `Ok(())` after serving exactly one connection; the caller is
    /// expected to exit the process immediately afterward. Variants (b)/(c) loop until a fatal
    /// local error (they are not expected to return during normal operation).
    fn run(listener: &TcpListener, events: IpcSender) -> io::Result<()>;
}
