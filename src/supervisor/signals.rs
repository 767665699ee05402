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

//! The self-pipe pattern: signal handlers only write one byte to a dedicated pipe and return
//! immediately. All real work (reaping children, transitioning to shutdown) happens on the main
//! supervisor loop, which polls this pipe's read end alongside the IPC channel's read end.
//!
//! This keeps the handlers themselves async-signal-safe: `nix::unistd::write` on a raw fd is one
//! of the few operations POSIX guarantees is safe to call from a signal handler.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};

use nix::fcntl::{self, FcntlArg, OFlag};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd;

static SELF_PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

/// Which signal woke the supervisor's poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// `SIGINT` arrived; begin graceful shutdown.
    Interrupt,
    /// `SIGCHLD` arrived; reap any exited children.
    ChildExited,
}

/// Owns the self-pipe's read end and installs the `SIGINT`/`SIGCHLD` handlers.
///
/// Dropping this restores the handlers to `SIG_DFL` is intentionally NOT done: the supervisor
/// holds exactly one of these for its entire process lifetime.
pub struct SelfPipe {
    read_end: OwnedFd,
}

impl SelfPipe {
    /// Creates the self-pipe and installs the signal handlers. Must be called before any worker
    /// is forked, since the handlers remain installed across `fork(2)`.
    pub fn install() -> io::Result<Self> {
        let (read_end, write_end) = unistd::pipe().map_err(io::Error::from)?;
        fcntl::fcntl(&write_end, FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
            .map_err(io::Error::from)?;

        SELF_PIPE_WRITE_FD.store(write_end.as_raw_fd(), Ordering::SeqCst);
        // The write end is kept alive for the process lifetime via the static fd; leaking the
        // OwnedFd here is deliberate so the fd stays valid for the handler to use.
        std::mem::forget(write_end);

        unsafe {
            signal::signal(Signal::SIGINT, SigHandler::Handler(handle_sigint))
                .map_err(io::Error::from)?;
            signal::signal(Signal::SIGCHLD, SigHandler::Handler(handle_sigchld))
                .map_err(io::Error::from)?;
        }

        Ok(SelfPipe { read_end })
    }

    /// Drains every pending wake byte and returns the distinct reasons observed.
    pub fn drain(&self) -> io::Result<Vec<WakeReason>> {
        let mut reasons = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match unistd::read(self.read_end.as_raw_fd(), &mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    for &byte in &buf[..n] {
                        reasons.push(if byte == SIGINT_BYTE {
                            WakeReason::Interrupt
                        } else {
                            WakeReason::ChildExited
                        });
                    }
                }
                Err(nix::errno::Errno::EWOULDBLOCK) => break,
                Err(e) => return Err(io::Error::from(e)),
            }
        }
        Ok(reasons)
    }
}

impl AsRawFd for SelfPipe {
    fn as_raw_fd(&self) -> RawFd {
        self.read_end.as_raw_fd()
    }
}

const SIGINT_BYTE: u8 = 1;
const SIGCHLD_BYTE: u8 = 2;

extern "C" fn handle_sigint(_: i32) {
    write_byte(SIGINT_BYTE);
}

extern "C" fn handle_sigchld(_: i32) {
    write_byte(SIGCHLD_BYTE);
}

fn write_byte(byte: u8) {
    let fd = SELF_PIPE_WRITE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let _ = unistd::write(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) }, &[byte]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_reports_both_wake_reasons() {
        let pipe = SelfPipe::install().unwrap();
        write_byte(SIGINT_BYTE);
        write_byte(SIGCHLD_BYTE);
        let reasons = pipe.drain().unwrap();
        assert_eq!(reasons, vec![WakeReason::Interrupt, WakeReason::ChildExited]);
    }

    #[test]
    fn drain_on_empty_pipe_is_empty() {
        let pipe = SelfPipe::install().unwrap();
        assert!(pipe.drain().unwrap().is_empty());
    }
}
