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

//! Variant (a): one blocking worker process per connection.

use std::io;
use std::net::TcpListener;

use tracing::debug;

use crate::config::BUFFER_SIZE;
use crate::ipc::{EventKind, IpcSender};
use crate::net;
use crate::net::RecvOutcome;

use super::EchoWorker;

/// A worker that blocks on `accept` once, serves that one connection to completion, then
/// returns so the caller can exit the process.
#[derive(Debug, Clone, Copy)]
pub struct ForkedWorker;

impl EchoWorker for ForkedWorker {
    const TRACKS_FREE_WORKERS: bool = true;

    fn run(listener: &TcpListener, mut events: IpcSender) -> io::Result<()> {
        let (mut stream, peer) = listener.accept()?;
        debug!(%peer, "accepted connection");
        events.send(EventKind::Connected)?;

        echo_until_closed(&mut stream)?;

        events.send(EventKind::Done)?;
        debug!(%peer, "connection done");
        Ok(())
    }
}

/// Reads and echoes verbatim until the peer performs an orderly close.
fn echo_until_closed(stream: &mut std::net::TcpStream) -> io::Result<()> {
    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        match net::recv(stream, &mut buf)? {
            RecvOutcome::Closed => return Ok(()),
            RecvOutcome::Data(n) => {
                net::send(stream, &buf[..n])?;
            }
            // `stream` is a blocking std socket here, so WouldBlock cannot occur; handled for
            // exhaustiveness and in case a caller swaps in a non-blocking stream in tests.
            RecvOutcome::WouldBlock => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    fn loopback_pair() -> (TcpListener, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        (listener, client)
    }

    #[test]
    fn echoes_single_message_byte_for_byte() {
        let (listener, mut client) = loopback_pair();
        let (mut server_side, _) = listener.accept().unwrap();

        client.write_all(b"hello world").unwrap();
        let mut buf = [0u8; BUFFER_SIZE];
        let n = server_side.read(&mut buf).unwrap();
        net::send(&mut server_side, &buf[..n]).unwrap();

        let mut echoed = [0u8; 11];
        client.read_exact(&mut echoed).unwrap();
        assert_eq!(&echoed, b"hello world");
    }

    #[test]
    fn echo_loop_terminates_on_peer_close() {
        let (listener, client) = loopback_pair();
        let (mut server_side, _) = listener.accept().unwrap();
        drop(client);

        let result = echo_until_closed(&mut server_side);
        assert!(result.is_ok());
    }

    #[test]
    fn echo_loop_preserves_short_messages_without_padding() {
        let (listener, mut client) = loopback_pair();
        let (mut server_side, _) = listener.accept().unwrap();

        let payload = b"ABCDEFGHIJKLMNOPQRSTUVWX01234567";
        client.write_all(payload).unwrap();
        drop(client.try_clone().unwrap());

        let mut buf = [0u8; BUFFER_SIZE];
        let n = server_side.read(&mut buf).unwrap();
        assert_eq!(n, payload.len());
        net::send(&mut server_side, &buf[..n]).unwrap();

        let mut echoed = vec![0u8; payload.len()];
        client.read_exact(&mut echoed).unwrap();
        assert_eq!(echoed, payload);
    }
}
