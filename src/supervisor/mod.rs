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

//! The pre-forking supervisor (C4/C5): owns the listening socket, forks the worker cohort,
//! tracks connection counters from IPC events, and tears everything down on `SIGINT`.

pub mod signals;

use std::net::TcpListener;
use std::os::fd::AsRawFd;

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::sys::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::{ForkResult, Pid};
use tracing::{info, warn};

use crate::config::{MIN_FREE_PROCESSES, NEW_ADDITION_INCREMENT};
use crate::error::ServerError;
use crate::ipc::{self, EventKind, IpcReceiver, IpcSender};
use crate::worker::EchoWorker;

use signals::{SelfPipe, WakeReason};

/// Lifecycle states of the supervisor, per the design's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Init,
    Running,
    ShuttingDown,
    Exited,
}

/// A forked worker the supervisor is tracking for reaping purposes.
#[derive(Debug, Clone, Copy)]
struct WorkerRecord {
    pid: Pid,
}

/// Connection bookkeeping driven entirely by decoded IPC events.
#[derive(Debug, Default)]
pub struct Counters {
    /// Monotonically increasing count of connections ever accepted.
    pub total_connections: u64,
    /// Connections currently open (accepted but not yet done).
    pub current_connections: i64,
    /// Variant (a) only: an estimate of idle worker processes available to accept the next
    /// connection. Intentionally never incremented back up on `Done` — this mirrors an
    /// as-observed characteristic of the source design, not a bug introduced here, and the
    /// invariant `free_workers <= MIN_FREE_PROCESSES` still holds as a one-directional bound.
    pub free_workers: Option<i64>,
}

impl Counters {
    fn on_connected(&mut self, tracks_free_workers: bool) {
        self.total_connections += 1;
        self.current_connections += 1;
        if tracks_free_workers {
            let workers = self.free_workers.get_or_insert(MIN_FREE_PROCESSES as i64);
            *workers -= 1;
        }
    }

    fn on_done(&mut self) {
        self.current_connections -= 1;
        // Deliberately not incrementing `free_workers` here; see the field's doc comment.
    }

    /// Variant (a) only: whether the supervisor should fork another cohort of workers.
    fn needs_replenish(&self) -> bool {
        match self.free_workers {
            Some(free) => free < (MIN_FREE_PROCESSES - NEW_ADDITION_INCREMENT) as i64,
            None => false,
        }
    }

    fn record_spawn_cohort(&mut self, tracks_free_workers: bool, count: i64) {
        if tracks_free_workers {
            let workers = self.free_workers.get_or_insert(0);
            *workers += count;
        }
    }
}

/// Runs the full supervisor lifecycle for worker variant `W`: binds nothing itself (the
/// listener is passed in already bound), forks an initial cohort, then services IPC events and
/// signals until `SIGINT` triggers a graceful shutdown.
pub struct Supervisor {
    listener: TcpListener,
    ipc_tx: Option<IpcSender>,
    ipc_rx: Option<IpcReceiver>,
    self_pipe: SelfPipe,
    workers: Vec<WorkerRecord>,
    counters: Counters,
    state: SupervisorState,
}

impl Supervisor {
    /// Creates a supervisor around an already-bound listener. Call [`Supervisor::run`] to start
    /// the worker cohort and enter the event loop.
    pub fn new(listener: TcpListener) -> Result<Self, ServerError> {
        let (ipc_tx, ipc_rx) = ipc::channel().map_err(ServerError::Ipc)?;
        let self_pipe = SelfPipe::install().map_err(ServerError::Io)?;
        Ok(Supervisor {
            listener,
            ipc_tx: Some(ipc_tx),
            ipc_rx: Some(ipc_rx),
            self_pipe,
            workers: Vec::new(),
            counters: Counters::default(),
            state: SupervisorState::Init,
        })
    }

    /// Forks `MIN_FREE_PROCESSES` workers of variant `W` and runs the supervisor loop until
    /// shutdown. Returns once every worker has been reaped.
    pub fn run<W: EchoWorker>(mut self) -> Result<(), ServerError> {
        self.spawn_cohort::<W>(MIN_FREE_PROCESSES)?;

        if !W::TRACKS_FREE_WORKERS {
            // Variants (b)/(c) never fork again; the supervisor's own write end would otherwise
            // keep the pipe open forever since it's never used to send events itself.
            self.ipc_tx = None;
        }

        self.state = SupervisorState::Running;
        info!(state = ?self.state, "supervisor running");

        while self.state != SupervisorState::Exited {
            self.poll_once::<W>()?;
        }

        Ok(())
    }

    fn spawn_cohort<W: EchoWorker>(&mut self, count: usize) -> Result<(), ServerError> {
        for _ in 0..count {
            self.spawn_one::<W>()?;
        }
        self.counters
            .record_spawn_cohort(W::TRACKS_FREE_WORKERS, count as i64);
        Ok(())
    }

    fn spawn_one<W: EchoWorker>(&mut self) -> Result<(), ServerError> {
        // Safety: single-threaded at the point workers are forked (no worker thread has been
        // spawned in this process), satisfying `fork`'s async-signal-safety requirement between
        // fork and exec/exit.
        match unsafe { nix::unistd::fork() }.map_err(|e| ServerError::Spawn(e.into()))? {
            ForkResult::Parent { child } => {
                self.workers.push(WorkerRecord { pid: child });
                Ok(())
            }
            ForkResult::Child => {
                // Drop our copy of the read end; only the supervisor process reads events.
                let ipc_tx = self.ipc_tx.take();
                self.ipc_rx = None;
                let ipc_tx = ipc_tx.expect("worker forked without an IPC sender");

                let exit_code = match W::run(&self.listener, ipc_tx) {
                    Ok(()) => 0,
                    Err(_) => 1,
                };
                std::process::exit(exit_code);
            }
        }
    }

    fn poll_once<W: EchoWorker>(&mut self) -> Result<(), ServerError> {
        let ipc_fd = self.ipc_rx.as_ref().map(|rx| rx.as_raw_fd());
        let self_pipe_fd = self.self_pipe.as_raw_fd();

        let mut fds = Vec::with_capacity(2);
        if let Some(fd) = ipc_fd {
            fds.push(PollFd::new(
                unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) },
                PollFlags::POLLIN,
            ));
        }
        fds.push(PollFd::new(
            unsafe { std::os::fd::BorrowedFd::borrow_raw(self_pipe_fd) },
            PollFlags::POLLIN,
        ));

        poll(&mut fds, PollTimeout::NONE).map_err(|e| ServerError::Io(e.into()))?;

        let reasons = self.self_pipe.drain().map_err(ServerError::Io)?;
        for reason in reasons {
            match reason {
                WakeReason::Interrupt => self.begin_shutdown(),
                WakeReason::ChildExited => self.reap_exited()?,
            }
        }

        if self.state == SupervisorState::ShuttingDown {
            if self.workers.is_empty() {
                self.state = SupervisorState::Exited;
                info!("supervisor exited");
            }
            return Ok(());
        }

        if let Some(rx) = self.ipc_rx.as_mut() {
            if let Some(event) = rx.recv().map_err(ServerError::Ipc)? {
                self.handle_event::<W>(event)?;
            }
        }

        Ok(())
    }

    fn handle_event<W: EchoWorker>(&mut self, event: EventKind) -> Result<(), ServerError> {
        match event {
            EventKind::Connected => {
                self.counters.on_connected(W::TRACKS_FREE_WORKERS);
                info!(total = self.counters.total_connections, "connection accepted");
            }
            EventKind::Done => {
                self.counters.on_done();
                info!(current = self.counters.current_connections, "connection done");
            }
        }

        if W::TRACKS_FREE_WORKERS && self.counters.needs_replenish() {
            info!(cohort = MIN_FREE_PROCESSES, "topping up worker cohort");
            self.spawn_cohort::<W>(MIN_FREE_PROCESSES)?;
        }

        Ok(())
    }

    fn begin_shutdown(&mut self) {
        if self.state == SupervisorState::ShuttingDown {
            return;
        }
        info!("received SIGINT, shutting down");
        self.state = SupervisorState::ShuttingDown;
        self.ipc_tx = None;
        for worker in &self.workers {
            let _ = nix::sys::signal::kill(worker.pid, nix::sys::signal::Signal::SIGTERM);
        }
    }

    fn reap_exited(&mut self) -> Result<(), ServerError> {
        loop {
            match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(WaitStatus::Exited(pid, _)) | Ok(WaitStatus::Signaled(pid, _, _)) => {
                    self.workers.retain(|w| w.pid != pid);
                }
                Ok(_) => continue,
                Err(nix::errno::Errno::ECHILD) => break,
                Err(e) => {
                    warn!(error = %e, "waitpid failed");
                    return Err(ServerError::Io(e.into()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_connected_increments_total_and_current() {
        let mut counters = Counters::default();
        counters.on_connected(true);
        assert_eq!(counters.total_connections, 1);
        assert_eq!(counters.current_connections, 1);
        assert_eq!(counters.free_workers, Some(MIN_FREE_PROCESSES as i64 - 1));
    }

    #[test]
    fn on_done_decrements_current_but_not_free_workers() {
        let mut counters = Counters::default();
        counters.on_connected(true);
        let free_before = counters.free_workers;
        counters.on_done();
        assert_eq!(counters.current_connections, 0);
        assert_eq!(counters.free_workers, free_before);
    }

    #[test]
    fn needs_replenish_crosses_threshold() {
        let mut counters = Counters::default();
        counters.free_workers = Some((MIN_FREE_PROCESSES - NEW_ADDITION_INCREMENT) as i64);
        assert!(!counters.needs_replenish());
        counters.free_workers = Some((MIN_FREE_PROCESSES - NEW_ADDITION_INCREMENT) as i64 - 1);
        assert!(counters.needs_replenish());
    }

    #[test]
    fn multiplexing_variants_never_report_replenish() {
        let mut counters = Counters::default();
        counters.on_connected(false);
        assert_eq!(counters.free_workers, None);
        assert!(!counters.needs_replenish());
    }

    #[test]
    fn total_connections_is_monotonic_across_many_events() {
        let mut counters = Counters::default();
        for _ in 0..50 {
            counters.on_connected(true);
            counters.on_done();
        }
        assert_eq!(counters.total_connections, 50);
        assert_eq!(counters.current_connections, 0);
    }
}
