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

//! Load-generating client CLI.

use std::process::ExitCode;

use clap::Parser;
use tenk_echo::client::{self, Args};
use tracing::{error, info};

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    if let Err(e) = args.validate() {
        error!(error = %e, "invalid arguments");
        return ExitCode::FAILURE;
    }

    match client::run(&args) {
        Ok(summary) => {
            info!(
                completed = summary.completed,
                failed = summary.failed,
                elapsed = ?summary.elapsed,
                "run complete"
            );
            if summary.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = %e, "client run failed");
            ExitCode::FAILURE
        }
    }
}
