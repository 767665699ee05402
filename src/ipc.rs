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

//! The worker-to-supervisor IPC channel (C2): a `pipe(2)` carrying fixed-size, zero-padded
//! text records.
//!
//! Created once by the supervisor before any worker is forked. After the fork, each worker
//! drops [`IpcReceiver`] (keeping only [`IpcSender`]) and the supervisor drops [`IpcSender`]
//! (keeping only [`IpcReceiver`]), giving the many-writer/one-reader topology the protocol
//! relies on. Each record is written in a single `write(2)` call and is well under `PIPE_BUF`,
//! so writes from concurrent workers never interleave mid-record.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};

use crate::config::IPC_RECORD_SIZE;

const CONNECTED_TAG: &[u8] = b"Process Connected";
const DONE_TAG: &[u8] = b"Process Done";

/// The two lifecycle transitions a worker can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A connection was accepted.
    Connected,
    /// A connection was closed (peer FIN or local error).
    Done,
}

impl EventKind {
    fn tag(self) -> &'static [u8] {
        match self {
            EventKind::Connected => CONNECTED_TAG,
            EventKind::Done => DONE_TAG,
        }
    }

    /// Encodes this event as a zero-padded, fixed-size record.
    fn encode(self) -> [u8; IPC_RECORD_SIZE] {
        let mut record = [0u8; IPC_RECORD_SIZE];
        let tag = self.tag();
        record[..tag.len()].copy_from_slice(tag);
        record
    }

    /// Decodes a record, matching only on the leading tag bytes. Any bytes after the tag
    /// (including the padding, or a future producer's trailing worker id) are ignored. Records
    /// that match neither known tag decode to `None` and must be treated as no-ops by the
    /// caller.
    fn decode(record: &[u8; IPC_RECORD_SIZE]) -> Option<EventKind> {
        if record.starts_with(CONNECTED_TAG) {
            Some(EventKind::Connected)
        } else if record.starts_with(DONE_TAG) {
            Some(EventKind::Done)
        } else {
            None
        }
    }
}

/// The write half of the IPC channel, held by a worker.
#[derive(Debug)]
pub struct IpcSender {
    write_end: File,
}

impl IpcSender {
    /// Sends a single event record. Blocking, and atomic with respect to other writers because
    /// the record size is well under `PIPE_BUF`.
    pub fn send(&mut self, event: EventKind) -> io::Result<()> {
        self.write_end.write_all(&event.encode())
    }
}

impl AsRawFd for IpcSender {
    fn as_raw_fd(&self) -> RawFd {
        self.write_end.as_raw_fd()
    }
}

/// The read half of the IPC channel, held by the supervisor.
#[derive(Debug)]
pub struct IpcReceiver {
    read_end: File,
}

impl IpcReceiver {
    /// Blocks for exactly one record and decodes it.
    ///
    /// Returns `Ok(None)` either when the record doesn't match a known tag (a no-op per the
    /// protocol) or when every writer has closed its end (EOF) and there is nothing left to
    /// read.
    pub fn recv(&mut self) -> io::Result<Option<EventKind>> {
        let mut record = [0u8; IPC_RECORD_SIZE];
        match self.read_end.read_exact(&mut record) {
            Ok(()) => Ok(EventKind::decode(&record)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl AsRawFd for IpcReceiver {
    fn as_raw_fd(&self) -> RawFd {
        self.read_end.as_raw_fd()
    }
}

/// Creates a fresh IPC channel. Call this before forking any workers.
pub fn channel() -> io::Result<(IpcSender, IpcReceiver)> {
    let (read_fd, write_fd) = nix::unistd::pipe().map_err(io::Error::from)?;
    Ok((
        IpcSender {
            write_end: File::from(write_fd),
        },
        IpcReceiver {
            read_end: File::from(read_fd),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_connected_and_done() {
        let (mut tx, mut rx) = channel().unwrap();
        tx.send(EventKind::Connected).unwrap();
        tx.send(EventKind::Done).unwrap();

        assert_eq!(rx.recv().unwrap(), Some(EventKind::Connected));
        assert_eq!(rx.recv().unwrap(), Some(EventKind::Done));
    }

    #[test]
    fn unrecognized_record_decodes_to_none() {
        assert_eq!(EventKind::decode(&[0u8; IPC_RECORD_SIZE]), None);
    }

    #[test]
    fn trailing_bytes_after_tag_are_ignored() {
        let mut record = [0u8; IPC_RECORD_SIZE];
        record[..CONNECTED_TAG.len()].copy_from_slice(CONNECTED_TAG);
        // Simulate a producer appending a worker id after the tag.
        record[CONNECTED_TAG.len()..CONNECTED_TAG.len() + 4].copy_from_slice(b"#123");
        assert_eq!(EventKind::decode(&record), Some(EventKind::Connected));
    }

    #[test]
    fn eof_after_all_senders_drop_yields_none() {
        let (tx, mut rx) = channel().unwrap();
        drop(tx);
        assert_eq!(rx.recv().unwrap(), None);
    }
}
