/*
 * Created on Sun Jun 08 2025
 *
 * This file is a part of ArborDB
 * ArborDB is a free and open-source in-memory key/value database written
 * by Sayan Nandan ("the Author") that serves a line-oriented command
 * protocol over a concurrently locked binary search tree
 *
 * Copyright (c) 2025, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! This module contains automated tests that run full scenarios against a
//! real listener bound to an ephemeral port

use {
    crate::{
        arbiter::{self, ServerContext},
        dbnet, services,
    },
    std::{net::SocketAddr, sync::Arc},
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
        net::{
            tcp::{OwnedReadHalf, OwnedWriteHalf},
            TcpStream,
        },
        sync::mpsc,
        task::JoinHandle,
        time::{self, Duration},
    },
};

struct TestServer {
    ctx: Arc<ServerContext>,
    drain_rx: mpsc::Receiver<()>,
    addr: SocketAddr,
    listener_handle: JoinHandle<()>,
}

async fn boot() -> TestServer {
    let (ctx, drain_rx) = ServerContext::new();
    let mut listener = dbnet::connect("127.0.0.1".parse().unwrap(), 0, 64, Arc::clone(&ctx))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let listener_handle = tokio::spawn(async move {
        let _ = listener.run().await;
    });
    TestServer {
        ctx,
        drain_rx,
        addr,
        listener_handle,
    }
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    wr: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (rd, wr) = stream.into_split();
        Self {
            lines: BufReader::new(rd).lines(),
            wr,
        }
    }
    async fn send(&mut self, command: &str) {
        self.wr.write_all(command.as_bytes()).await.unwrap();
        self.wr.write_all(b"\n").await.unwrap();
    }
    async fn recv(&mut self) -> String {
        time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }
    async fn run(&mut self, command: &str) -> String {
        self.send(command).await;
        self.recv().await
    }
    /// Wait for the server to close this connection
    async fn expect_eof(&mut self) {
        let read = time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .unwrap();
        assert!(matches!(read, Ok(None)));
    }
}

/// Admission is asynchronous: give the accept loop a moment to register
async fn wait_for_clients(ctx: &ServerContext, count: usize) {
    for _ in 0..500 {
        if ctx.roster.active_count() == count {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "roster never reached {count} clients (at {})",
        ctx.roster.active_count()
    );
}

#[tokio::test]
async fn test_basic_roundtrip() {
    let server = boot().await;
    let mut client = TestClient::connect(server.addr).await;
    assert_eq!(client.run("a foo 1").await, "added");
    assert_eq!(client.run("q foo").await, "1");
    assert_eq!(client.run("d foo").await, "removed");
    assert_eq!(client.run("q foo").await, "not found");
    server.listener_handle.abort();
}

#[tokio::test]
async fn test_duplicate_insert() {
    let server = boot().await;
    let mut client = TestClient::connect(server.addr).await;
    assert_eq!(client.run("a x 1").await, "added");
    assert_eq!(client.run("a x 2").await, "already in database");
    assert_eq!(client.run("q x").await, "1");
    server.listener_handle.abort();
}

#[tokio::test]
async fn test_two_child_removal() {
    let server = boot().await;
    let mut client = TestClient::connect(server.addr).await;
    for name in ["m", "c", "t", "a", "f", "p", "w"] {
        assert_eq!(client.run(&format!("a {name} 0")).await, "added");
    }
    assert_eq!(client.run("d m").await, "removed");
    assert_eq!(client.run("q m").await, "not found");
    assert_eq!(client.run("q p").await, "0");
    assert_eq!(client.run("q f").await, "0");
    assert_eq!(client.run("q t").await, "0");
    server.listener_handle.abort();
}

#[tokio::test]
async fn test_stop_and_go() {
    let server = boot().await;
    let mut first = TestClient::connect(server.addr).await;
    let mut second = TestClient::connect(server.addr).await;
    wait_for_clients(&server.ctx, 2).await;
    server.ctx.gate.stop();
    first.send("a k1 v").await;
    second.send("a k2 v").await;
    // barred at the gate: neither client hears back within the settle window
    assert!(time::timeout(Duration::from_millis(150), first.recv())
        .await
        .is_err());
    server.ctx.gate.release();
    assert_eq!(first.recv().await, "added");
    assert_eq!(second.recv().await, "added");
    assert!(server.ctx.tree.query(b"k1").is_some());
    assert!(server.ctx.tree.query(b"k2").is_some());
    server.listener_handle.abort();
}

#[tokio::test]
async fn test_cancel_all_kicks_clients_but_keeps_serving() {
    let server = boot().await;
    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(TestClient::connect(server.addr).await);
    }
    wait_for_clients(&server.ctx, 3).await;
    // what the signal monitor does on an interrupt
    server.ctx.roster.cancel_all();
    for client in &mut clients {
        client.expect_eof().await;
    }
    wait_for_clients(&server.ctx, 0).await;
    // the server is still open: a fresh client is served as usual
    assert!(server.ctx.roster.is_open());
    let mut fresh = TestClient::connect(server.addr).await;
    assert_eq!(fresh.run("a y 1").await, "added");
    server.listener_handle.abort();
}

#[tokio::test]
async fn test_orderly_shutdown() {
    let server = boot().await;
    let monitor_handle = tokio::spawn(services::sigmon::signal_monitor(Arc::clone(
        &server.ctx.roster,
    )));
    let mut busy = TestClient::connect(server.addr).await;
    assert_eq!(busy.run("a persists 1").await, "added");
    let mut idle = TestClient::connect(server.addr).await;
    wait_for_clients(&server.ctx, 2).await;
    assert!(!server.ctx.tree.is_empty());
    arbiter::shutdown(
        &server.ctx,
        server.drain_rx,
        monitor_handle,
        server.listener_handle,
    )
    .await;
    // every worker is gone, admission is refused and the tree is bare
    assert_eq!(server.ctx.roster.active_count(), 0);
    assert!(!server.ctx.roster.is_open());
    assert!(server.ctx.tree.is_empty());
    busy.expect_eof().await;
    idle.expect_eof().await;
}
