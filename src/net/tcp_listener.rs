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

//! Binds and configures the listening socket shared by every worker.

use std::io;
use std::net::{SocketAddr, TcpListener};

use socket2::{Domain, Socket, Type};

use crate::config::BACKLOG;

/// Binds and listens on `addr`, setting `SO_REUSEADDR` before bind and a backlog of `backlog`.
///
/// The returned listener is created once by the supervisor, before any worker is forked; every
/// worker process ends up sharing the same open file description across the `fork(2)` call, so no
/// further hand-off is required.
pub fn bind_and_listen(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket.into())
}

/// Convenience wrapper around [`bind_and_listen`] using the crate's default backlog.
pub fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    bind_and_listen(addr, BACKLOG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_with_reuseaddr_and_rebinds_immediately() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = bind(addr).expect("first bind should succeed");
        let bound_addr = listener.local_addr().unwrap();
        drop(listener);

        // SO_REUSEADDR means a prompt rebind to the same ephemeral port should succeed rather
        // than fail with "address already in use" while the kernel holds the old socket in
        // TIME_WAIT.
        let rebound = bind(bound_addr);
        assert!(rebound.is_ok());
    }
}
