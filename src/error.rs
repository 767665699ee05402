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

//! Error types for the supervisor, workers, and client.
//!
//! `PeerClosed` and `WouldBlock` are deliberately absent: they're represented as
//! [`crate::net::RecvOutcome`] values rather than errors, since both are routine outcomes of
//! reading a socket, not failures.

use std::io;

/// Errors that can arise while running the supervisor or a worker.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding or listening on the configured port failed. Fatal at startup.
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),

    /// `accept(2)` failed for a reason other than would-block.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// Forking or otherwise spawning a worker failed.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] io::Error),

    /// The IPC channel between a worker and the supervisor failed.
    #[error("ipc channel error: {0}")]
    Ipc(#[source] io::Error),

    /// Any other I/O failure not covered above.
    #[error("io error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for ServerError {
    fn from(value: io::Error) -> Self {
        ServerError::Io(value)
    }
}

/// Errors surfaced by the load-generating client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connecting to the server failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// The address that failed to connect.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A send or receive on an established connection failed.
    #[error("io error on connection: {0}")]
    Io(#[source] io::Error),

    /// The echoed bytes did not match what was sent.
    #[error("echo mismatch: expected {expected} bytes, got {actual} bytes")]
    EchoMismatch {
        /// Bytes expected back from the server.
        expected: usize,
        /// Bytes actually received.
        actual: usize,
    },

    /// A CLI argument failed validation (must be > 0, or payload size > 1024).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<io::Error> for ClientError {
    fn from(value: io::Error) -> Self {
        ClientError::Io(value)
    }
}
