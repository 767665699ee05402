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

//! The load-generating client: a thin collaborator that opens `client_count` connections to a
//! server and drives `message_count` request/response round-trips on each, reporting aggregate
//! timing. This is deliberately the simplest piece of the workspace — a convenience wrapper, not
//! core design — so it fans connections out across threads rather than forking processes the
//! way the original tool did.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};

use crate::config::BUFFER_SIZE;
use crate::error::ClientError;

/// Command-line arguments for the load client.
#[derive(Debug, Parser)]
#[command(name = "echo-client", about = "Load-generating client for the echo service")]
pub struct Args {
    /// Server host to connect to.
    #[arg(short = 'h', long = "host", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to connect to.
    #[arg(short, long, default_value_t = 9000)]
    pub port: u16,

    /// Number of concurrent client connections to open.
    #[arg(short, long)]
    pub clients: u32,

    /// Payload size in bytes per message, at most `BUFFER_SIZE`.
    #[arg(short, long)]
    pub size: usize,

    /// Number of messages each client sends before closing.
    #[arg(short, long)]
    pub messages: u32,
}

impl Args {
    /// Validates the CLI surface: `clients`, `size`, and `messages` must all be positive, and
    /// `size` must not exceed the transport buffer size.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.clients == 0 {
            return Err(ClientError::InvalidArgument(
                "client count must be > 0".into(),
            ));
        }
        if self.size == 0 {
            return Err(ClientError::InvalidArgument(
                "payload size must be > 0".into(),
            ));
        }
        if self.size > BUFFER_SIZE {
            return Err(ClientError::InvalidArgument(format!(
                "payload size must be <= {BUFFER_SIZE}"
            )));
        }
        if self.messages == 0 {
            return Err(ClientError::InvalidArgument(
                "message count must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Aggregate results of a load run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    /// Total round-trips completed across all clients.
    pub completed: u64,
    /// Total round-trips that failed (connection error or echo mismatch).
    pub failed: u64,
    /// Wall-clock time for the whole run.
    pub elapsed: Duration,
}

/// Builds the deterministic payload pattern: `'A' + (i % 24)`, truncated to `size` bytes.
pub fn build_payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| b'A' + (i % 24) as u8).collect()
}

/// Runs the full load: `args.clients` threads, each performing `args.messages` round-trips of a
/// `args.size`-byte payload against `args.host:args.port`.
pub fn run(args: &Args) -> Result<RunSummary, ClientError> {
    args.validate()?;

    let payload = build_payload(args.size);
    let addr = format!("{}:{}", args.host, args.port);
    let start = Instant::now();

    let handles: Vec<_> = (0..args.clients)
        .map(|id| {
            let addr = addr.clone();
            let payload = payload.clone();
            let messages = args.messages;
            std::thread::spawn(move || run_one_client(id, &addr, &payload, messages))
        })
        .collect();

    let mut completed = 0u64;
    let mut failed = 0u64;
    for handle in handles {
        match handle.join() {
            Ok(Ok(n)) => completed += n as u64,
            Ok(Err(e)) => {
                warn!(error = %e, "client failed");
                failed += 1;
            }
            Err(_) => failed += 1,
        }
    }

    let elapsed = start.elapsed();
    info!(completed, failed, ?elapsed, "load run finished");
    Ok(RunSummary {
        completed,
        failed,
        elapsed,
    })
}

/// Opens one connection and performs `messages` request/response round-trips, returning the
/// number of round-trips that succeeded.
fn run_one_client(
    id: u32,
    addr: &str,
    payload: &[u8],
    messages: u32,
) -> Result<u32, ClientError> {
    let mut stream = TcpStream::connect(addr).map_err(|source| ClientError::Connect {
        addr: addr.to_string(),
        source,
    })?;

    let mut buf = vec![0u8; payload.len()];
    let mut succeeded = 0;
    for _ in 0..messages {
        stream.write_all(payload)?;
        stream.read_exact(&mut buf)?;
        if buf != payload {
            return Err(ClientError::EchoMismatch {
                expected: payload.len(),
                actual: buf.len(),
            });
        }
        succeeded += 1;
    }
    info!(id, succeeded, "client finished");
    Ok(succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_args() -> Args {
        Args {
            host: "127.0.0.1".into(),
            port: 9000,
            clients: 1,
            size: 1024,
            messages: 1,
        }
    }

    #[test]
    fn validate_accepts_sane_defaults() {
        assert!(valid_args().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_clients() {
        let mut args = valid_args();
        args.clients = 0;
        assert!(args.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_payload() {
        let mut args = valid_args();
        args.size = BUFFER_SIZE + 1;
        assert!(args.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_messages() {
        let mut args = valid_args();
        args.messages = 0;
        assert!(args.validate().is_err());
    }

    #[test]
    fn build_payload_follows_rotating_letter_pattern() {
        let payload = build_payload(26);
        assert_eq!(payload[0], b'A');
        assert_eq!(payload[23], b'A' + 23);
        assert_eq!(payload[24], b'A');
    }

    #[test]
    fn build_payload_truncates_to_requested_size() {
        assert_eq!(build_payload(5).len(), 5);
    }

    #[test]
    fn single_client_single_message_round_trips_successfully() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = [0u8; 11];
            conn.read_exact(&mut buf).unwrap();
            conn.write_all(&buf).unwrap();
        });

        let result = run_one_client(0, &addr.to_string(), b"hello world", 1).unwrap();
        assert_eq!(result, 1);
        server.join().unwrap();
    }
}
