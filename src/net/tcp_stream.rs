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

//! Fixed-buffer send/recv primitives shared by every worker variant and the client.
//!
//! Both `std::net::TcpStream` and `mio::net::TcpStream` implement `Read`/`Write`, so these
//! functions are generic over any stream type rather than repeating the same logic per variant.

use std::io::{self, ErrorKind, Read, Write};

use crate::config::BUFFER_SIZE;

/// The result of a single `recv` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// `n` bytes of data were read (`1..=BUFFER_SIZE`).
    Data(usize),
    /// The peer performed an orderly close (a zero-length read).
    Closed,
    /// No data is available right now on a non-blocking stream; not an error.
    WouldBlock,
}

/// Reads into `buf` (which must be exactly [`BUFFER_SIZE`] bytes), normalizing `WouldBlock`/`Again`
/// into [`RecvOutcome::WouldBlock`] rather than surfacing it as an `io::Error`.
pub fn recv<R: Read>(stream: &mut R, buf: &mut [u8; BUFFER_SIZE]) -> io::Result<RecvOutcome> {
    match stream.read(buf) {
        Ok(0) => Ok(RecvOutcome::Closed),
        Ok(n) => Ok(RecvOutcome::Data(n)),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(RecvOutcome::WouldBlock),
        Err(e) => Err(e),
    }
}

/// Writes exactly `min(bytes.len(), BUFFER_SIZE)` bytes of `bytes` to `stream` and returns the
/// number of bytes written.
///
/// The source this design is derived from always transmits a full `BUFFER_SIZE`-byte buffer
/// (including trailing uninitialized bytes when the payload is shorter); that behavior is
/// rejected here in favor of sending exactly the bytes the caller has, truncated to the buffer
/// size.
pub fn send<W: Write>(stream: &mut W, bytes: &[u8]) -> io::Result<usize> {
    let n = bytes.len().min(BUFFER_SIZE);
    stream.write_all(&bytes[..n])?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn send_truncates_to_buffer_size() {
        let payload = vec![b'x'; BUFFER_SIZE * 2];
        let mut sink = Vec::new();
        let n = send(&mut sink, &payload).unwrap();
        assert_eq!(n, BUFFER_SIZE);
        assert_eq!(sink.len(), BUFFER_SIZE);
    }

    #[test]
    fn send_writes_exact_short_payload_without_padding() {
        let payload = b"hello";
        let mut sink = Vec::new();
        let n = send(&mut sink, payload).unwrap();
        assert_eq!(n, payload.len());
        assert_eq!(sink, payload);
    }

    #[test]
    fn recv_reports_closed_on_zero_length_read() {
        let mut cursor = Cursor::new(Vec::new());
        let mut buf = [0u8; BUFFER_SIZE];
        assert_eq!(recv(&mut cursor, &mut buf).unwrap(), RecvOutcome::Closed);
    }

    #[test]
    fn recv_reports_data_len() {
        let mut cursor = Cursor::new(b"hi".to_vec());
        let mut buf = [0u8; BUFFER_SIZE];
        assert_eq!(recv(&mut cursor, &mut buf).unwrap(), RecvOutcome::Data(2));
    }
}
