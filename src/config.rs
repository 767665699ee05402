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

//! Compile-time constants shared by every server variant and the client.

/// Default TCP port the servers listen on.
pub const LISTEN_PORT: u16 = 9000;

/// Accept backlog passed to `listen(2)`.
pub const BACKLOG: i32 = 1024;

/// Number of workers spawned at startup, and the cohort size of each top-up.
pub const MIN_FREE_PROCESSES: usize = 30;

/// Variant (a) tops up once `free_workers` falls below `MIN_FREE_PROCESSES - NEW_ADDITION_INCREMENT`.
pub const NEW_ADDITION_INCREMENT: usize = 10;

/// Size, in bytes, of a single IPC event record.
pub const IPC_RECORD_SIZE: usize = 128;

/// Size, in bytes, of the fixed send/recv buffer used by the transport primitive.
pub const BUFFER_SIZE: usize = 1024;
