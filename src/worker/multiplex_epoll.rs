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

//! Variant (b): a single process multiplexing many connections with `mio`'s edge-triggered
//! readiness API.
//!
//! One worker owns the shared listener for its whole lifetime. Accepted connections are stored
//! in a [`slab::Slab`] keyed by the `mio::Token` they're registered under, mirroring the way
//! `mio` examples typically track per-connection state.

use std::io::{self, ErrorKind};
use std::net::TcpListener as StdTcpListener;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use tracing::{debug, warn};

use crate::config::BUFFER_SIZE;
use crate::ipc::{EventKind, IpcSender};
use crate::net;
use crate::net::RecvOutcome;

use super::EchoWorker;

const LISTENER_TOKEN: Token = Token(usize::MAX);
const EVENTS_CAPACITY: usize = 1024;

pub struct EdgeTriggeredWorker;

impl EchoWorker for EdgeTriggeredWorker {
    const TRACKS_FREE_WORKERS: bool = false;

    fn run(listener: &StdTcpListener, events_tx: IpcSender) -> io::Result<()> {
        listener.set_nonblocking(true)?;
        let mut listener = TcpListener::from_std(listener.try_clone()?);

        let mut poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        let mut connections: Slab<TcpStream> = Slab::new();
        let mut events_tx = events_tx;

        loop {
            poll.poll(&mut events, None)?;

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => {
                        accept_all(&listener, &poll, &mut connections, &mut events_tx)?;
                    }
                    token => {
                        let done = service_connection(token, &mut connections, &poll);
                        if done {
                            connections.remove(token.0);
                            events_tx.send(EventKind::Done)?;
                        }
                    }
                }
            }
        }
    }
}

/// Drains the accept queue (edge-triggered readiness requires looping until `WouldBlock`).
fn accept_all(
    listener: &TcpListener,
    poll: &Poll,
    connections: &mut Slab<TcpStream>,
    events_tx: &mut IpcSender,
) -> io::Result<()> {
    loop {
        match listener.accept() {
            Ok((mut conn, peer)) => {
                let entry = connections.vacant_entry();
                let token = Token(entry.key());
                poll.registry()
                    .register(&mut conn, token, Interest::READABLE)?;
                entry.insert(conn);
                events_tx.send(EventKind::Connected)?;
                debug!(%peer, token = token.0, "accepted connection");
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Drains readable data on one connection, echoing as it goes. Returns `true` if the
/// connection should be removed (peer closed or a local I/O error occurred).
fn service_connection(token: Token, connections: &mut Slab<TcpStream>, poll: &Poll) -> bool {
    let conn = match connections.get_mut(token.0) {
        Some(conn) => conn,
        None => return false,
    };

    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        match net::recv(conn, &mut buf) {
            Ok(RecvOutcome::Data(n)) => {
                if let Err(e) = net::send(conn, &buf[..n]) {
                    warn!(token = token.0, error = %e, "write failed, closing connection");
                    let _ = poll.registry().deregister(conn);
                    return true;
                }
            }
            Ok(RecvOutcome::Closed) => {
                let _ = poll.registry().deregister(conn);
                return true;
            }
            Ok(RecvOutcome::WouldBlock) => return false,
            Err(e) => {
                warn!(token = token.0, error = %e, "read failed, closing connection");
                let _ = poll.registry().deregister(conn);
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn slab_reuses_keys_after_removal() {
        let mut slab: Slab<u32> = Slab::new();
        let a = slab.insert(1);
        let b = slab.insert(2);
        slab.remove(a);
        let c = slab.insert(3);
        assert_eq!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn service_connection_echoes_and_reports_close() {
        let std_listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();
        let mut mio_listener = TcpListener::from_std(std_listener);

        let mut client = std::net::TcpStream::connect(addr).unwrap();

        let poll = Poll::new().unwrap();
        poll.registry()
            .register(&mut mio_listener, LISTENER_TOKEN, Interest::READABLE)
            .unwrap();

        let mut connections: Slab<TcpStream> = Slab::new();
        let (mut conn, _) = loop {
            match mio_listener.accept() {
                Ok(pair) => break pair,
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) => panic!("{e}"),
            }
        };
        poll.registry()
            .register(&mut conn, Token(0), Interest::READABLE)
            .unwrap();
        connections.insert(conn);

        client.write_all(b"ping").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let done = service_connection(Token(0), &mut connections, &poll);
        assert!(!done);

        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        drop(client);
        std::thread::sleep(std::time::Duration::from_millis(20));
        let done = service_connection(Token(0), &mut connections, &poll);
        assert!(done);
    }
}
