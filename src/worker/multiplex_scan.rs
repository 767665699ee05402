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

//! Variant (c): a single process multiplexing many connections by re-scanning the full client
//! table with `select(2)` on every iteration.
//!
//! Unlike variant (b)'s `slab::Slab` keyed by `mio::Token`, readiness here is reported per raw
//! file descriptor, so the client table is a [`HashMap`] keyed directly by [`RawFd`]. `select`
//! is level-triggered: a connection with unread data is reported ready on every scan until it's
//! fully drained, so there's no need to loop-until-`WouldBlock` the way edge-triggered variant
//! (b) does.

use std::collections::HashMap;
use std::io;
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

use nix::sys::select::{select, FdSet};
use tracing::{debug, warn};

use crate::config::BUFFER_SIZE;
use crate::ipc::{EventKind, IpcSender};
use crate::net;
use crate::net::RecvOutcome;

use super::EchoWorker;

pub struct ScanWorker;

impl EchoWorker for ScanWorker {
    const TRACKS_FREE_WORKERS: bool = false;

    fn run(listener: &TcpListener, events_tx: IpcSender) -> io::Result<()> {
        listener.set_nonblocking(true)?;
        let mut clients: HashMap<RawFd, TcpStream> = HashMap::new();
        let mut events_tx = events_tx;

        loop {
            let mut read_fds = FdSet::new();
            read_fds.insert(listener.as_raw_fd());
            for fd in clients.keys() {
                read_fds.insert(*fd);
            }

            let highest = clients
                .keys()
                .copied()
                .chain(std::iter::once(listener.as_raw_fd()))
                .max();

            select(
                highest.map(|fd| fd + 1),
                Some(&mut read_fds),
                None,
                None,
                None,
            )
            .map_err(io::Error::from)?;

            if read_fds.contains(listener.as_raw_fd()) {
                accept_all(listener, &mut clients, &mut events_tx)?;
            }

            let ready: Vec<RawFd> = clients
                .keys()
                .copied()
                .filter(|fd| read_fds.contains(*fd))
                .collect();

            for fd in ready {
                if service_connection(fd, &mut clients) {
                    clients.remove(&fd);
                    events_tx.send(EventKind::Done)?;
                }
            }
        }
    }
}

fn accept_all(
    listener: &TcpListener,
    clients: &mut HashMap<RawFd, TcpStream>,
    events_tx: &mut IpcSender,
) -> io::Result<()> {
    loop {
        match listener.accept() {
            Ok((conn, peer)) => {
                conn.set_nonblocking(true)?;
                let fd = conn.as_raw_fd();
                clients.insert(fd, conn);
                events_tx.send(EventKind::Connected)?;
                debug!(%peer, fd, "accepted connection");
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Drains one readable connection, echoing as it goes. Returns `true` if the connection should
/// be removed from the table (peer closed or a local I/O error occurred).
fn service_connection(fd: RawFd, clients: &mut HashMap<RawFd, TcpStream>) -> bool {
    let conn = match clients.get_mut(&fd) {
        Some(conn) => conn,
        None => return false,
    };

    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        match net::recv(conn, &mut buf) {
            Ok(RecvOutcome::Data(n)) => {
                if let Err(e) = net::send(conn, &buf[..n]) {
                    warn!(fd, error = %e, "write failed, closing connection");
                    return true;
                }
            }
            Ok(RecvOutcome::Closed) => return true,
            Ok(RecvOutcome::WouldBlock) => return false,
            Err(e) => {
                warn!(fd, error = %e, "read failed, closing connection");
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
    fn service_connection_echoes_and_reports_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).unwrap();
        let (conn, _) = listener.accept().unwrap();
        conn.set_nonblocking(true).unwrap();
        let fd = conn.as_raw_fd();

        let mut clients = HashMap::new();
        clients.insert(fd, conn);

        client.write_all(b"ping").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!service_connection(fd, &mut clients));

        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        drop(client);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(service_connection(fd, &mut clients));
    }

    #[test]
    fn service_connection_on_unknown_fd_is_a_no_op() {
        let mut clients: HashMap<RawFd, TcpStream> = HashMap::new();
        assert!(!service_connection(999, &mut clients));
    }
}
