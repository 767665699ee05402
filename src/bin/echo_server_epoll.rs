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

//! Variant (b): a fixed pool of workers, each multiplexing many connections with `mio`'s
//! edge-triggered readiness API.

use std::net::SocketAddr;
use std::process::ExitCode;

use tenk_echo::config::{BACKLOG, LISTEN_PORT};
use tenk_echo::net;
use tenk_echo::supervisor::Supervisor;
use tenk_echo::worker::multiplex_epoll::EdgeTriggeredWorker;
use tracing::error;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let addr = SocketAddr::from(([0, 0, 0, 0], LISTEN_PORT));
    let listener = match net::bind_and_listen(addr, BACKLOG) {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    let supervisor = match Supervisor::new(listener) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!(error = %e, "failed to initialize supervisor");
            return ExitCode::FAILURE;
        }
    };

    match supervisor.run::<EdgeTriggeredWorker>() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "supervisor exited with error");
            ExitCode::FAILURE
        }
    }
}
