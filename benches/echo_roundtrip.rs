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

//! Benchmarks the fixed-buffer send/recv round trip over a loopback socket, in isolation from
//! any forking or readiness-multiplexing overhead.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tenk_echo::net;

fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}

fn bench_roundtrip(c: &mut Criterion) {
    let (mut client, mut server) = loopback_pair();
    let payload = vec![b'A'; 1024];

    c.bench_function("echo_roundtrip_1024b", |b| {
        b.iter(|| {
            client.write_all(black_box(&payload)).unwrap();
            let mut buf = [0u8; 1024];
            let n = server.read(&mut buf).unwrap();
            net::send(&mut server, &buf[..n]).unwrap();
            let mut echoed = vec![0u8; n];
            client.read_exact(&mut echoed).unwrap();
            black_box(echoed);
        });
    });
}

criterion_group!(benches, bench_roundtrip);
criterion_main!(benches);
