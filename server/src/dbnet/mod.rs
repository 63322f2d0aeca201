/*
 * Created on Sun Mar 02 2025
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

//! # Database networking
//!
//! Everything between an accepted stream and the tree lives here: the
//! line-framed [`Connection`], the per-worker [`ConnectionHandler`] serve
//! loop, the [`Gate`] the workers consult between commands, the [`Roster`] of
//! live workers, and the TCP listener that admits new connections.
//!
//! A worker's life: the listener accepts a stream and tries to register it in
//! the roster (admission fails once the server is closed, in which case the
//! stream is simply dropped). The serve loop then reads one command, waits at
//! the gate, runs the command against the tree and writes the response.
//! Cancellation is cooperative and can only land at the read, at the gate
//! wait, or between the lines of a batch file; the worker never holds a tree
//! lock at any of those points, so a cancelled worker leaves nothing locked.

use {
    self::connection::Connection,
    crate::{arbiter::ServerContext, queryengine, IoResult},
    std::sync::Arc,
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        sync::{watch, Semaphore},
    },
};

pub use self::{
    gate::{Gate, GatePass},
    listener::{BaseListener, Listener},
    roster::{ClientGuard, Registration, Roster},
};

pub mod connection;
mod gate;
mod listener;
mod roster;

/// The ceiling on the configurable connection limit
pub const MAXIMUM_CONNECTION_LIMIT: usize = 50000;

/// The stream types a [`Connection`] is allowed to wrap: anything
/// bidirectional and unpinned. Real traffic runs over TCP; tests substitute
/// in-memory duplex pipes
pub trait BufferedSocketStream: AsyncWriteExt + AsyncReadExt + Unpin {}

impl BufferedSocketStream for tokio::net::TcpStream {}
#[cfg(test)]
impl BufferedSocketStream for tokio::io::DuplexStream {}

/// A worker's view of its own cancellation signal. The signal is delivered
/// through the roster (interrupt or shutdown) and is latched: once observed,
/// it stays observed
pub struct Terminator {
    terminate: bool,
    signal: watch::Receiver<bool>,
}

impl Terminator {
    pub const fn new(signal: watch::Receiver<bool>) -> Self {
        Self {
            terminate: false,
            signal,
        }
    }
    /// Check if the signal has already been observed
    pub const fn is_termination_signal(&self) -> bool {
        self.terminate
    }
    /// Wait for the cancellation signal
    pub async fn receive_signal(&mut self) {
        if self.terminate {
            return;
        }
        while !*self.signal.borrow_and_update() {
            if self.signal.changed().await.is_err() {
                // the roster record is gone; that only happens on the way out
                break;
            }
        }
        self.terminate = true;
    }
    /// Synchronously poll for the cancellation signal. This is the
    /// cancellation point used between the lines of a batch file
    pub fn check_termination_signal(&mut self) -> bool {
        if !self.terminate && *self.signal.borrow_and_update() {
            self.terminate = true;
        }
        self.terminate
    }
}

/// The per-connection worker: owns the stream, its roster registration and
/// its gate pass for as long as the connection lives
pub struct ConnectionHandler<C> {
    /// a shared reference to the server context (tree, gate, roster)
    ctx: Arc<ServerContext>,
    /// the connection
    con: Connection<C>,
    /// this worker's gate subscription
    gate: GatePass,
    /// this worker's cancel signal
    terminator: Terminator,
    /// the semaphore used to impose limits on the number of connections
    climit: Arc<Semaphore>,
    /// unregisters this worker from the roster on any exit path
    _guard: ClientGuard,
}

impl<C> ConnectionHandler<C>
where
    C: BufferedSocketStream,
{
    /// Create a new connection handler from a successful admission
    pub fn new(
        ctx: Arc<ServerContext>,
        con: Connection<C>,
        registration: Registration,
        climit: Arc<Semaphore>,
    ) -> Self {
        let Registration { terminator, guard } = registration;
        let gate = ctx.gate.subscribe();
        Self {
            ctx,
            con,
            gate,
            terminator,
            climit,
            _guard: guard,
        }
    }
    /// The serve loop. Returns `Ok(())` on EOF or cancellation; I/O errors
    /// terminate this worker only and are reported by the spawner
    pub async fn run(&mut self) -> IoResult<()> {
        loop {
            let read = tokio::select! {
                ret = self.con.read_command() => ret?,
                _ = self.terminator.receive_signal() => {
                    return Ok(());
                }
            };
            let line = match read {
                Some(line) => line,
                // clean EOF: the client hung up
                None => return Ok(()),
            };
            tokio::select! {
                _ = self.gate.wait() => {}
                _ = self.terminator.receive_signal() => {
                    return Ok(());
                }
            }
            let response =
                queryengine::execute_simple(&self.ctx.tree, &line, &mut self.terminator);
            self.con.write_response(&response).await?;
        }
    }
}

impl<C> Drop for ConnectionHandler<C> {
    fn drop(&mut self) {
        // the connection slot comes back however the worker exits, a panic
        // mid-serve included
        self.climit.add_permits(1);
    }
}

/// Bind the listener for the given endpoint. The admission path and the
/// serve loops all operate on the shared context
pub async fn connect(
    host: std::net::IpAddr,
    port: u16,
    maxcon: usize,
    ctx: Arc<ServerContext>,
) -> crate::util::error::ArborResult<Listener> {
    let base = BaseListener::init(&ctx, host, port, maxcon).await?;
    log::info!("Server started on arbor://{host}:{port}");
    Ok(Listener::new(base))
}

#[cfg(test)]
mod tests {
    use {
        super::{Connection, ConnectionHandler},
        crate::arbiter::ServerContext,
        std::sync::Arc,
        tokio::{
            io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
            sync::Semaphore,
            time::{self, Duration},
        },
    };

    /// Boot a worker over an in-memory duplex stream and hand back the
    /// client-side halves
    fn spawn_worker(
        ctx: &Arc<ServerContext>,
        climit: &Arc<Semaphore>,
    ) -> (
        tokio::task::JoinHandle<crate::IoResult<()>>,
        tokio::io::ReadHalf<tokio::io::DuplexStream>,
        tokio::io::WriteHalf<tokio::io::DuplexStream>,
    ) {
        let (client, server) = tokio::io::duplex(1024);
        let registration = ctx.roster.register().unwrap();
        let mut chandle = ConnectionHandler::new(
            Arc::clone(ctx),
            Connection::new(server),
            registration,
            Arc::clone(climit),
        );
        let worker = tokio::spawn(async move { chandle.run().await });
        let (rd, wr) = tokio::io::split(client);
        (worker, rd, wr)
    }

    #[tokio::test]
    async fn test_worker_serves_and_drains_on_eof() {
        let (ctx, _drain_rx) = ServerContext::new();
        let climit = Arc::new(Semaphore::new(8));
        climit.acquire().await.unwrap().forget();
        let (worker, rd, mut wr) = spawn_worker(&ctx, &climit);
        let mut lines = BufReader::new(rd).lines();
        wr.write_all(b"a foo 1\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "added");
        wr.write_all(b"q foo\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "1");
        wr.shutdown().await.unwrap();
        time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        // the roster record is gone and the connection permit came back
        assert_eq!(ctx.roster.active_count(), 0);
        assert_eq!(climit.available_permits(), 8);
    }

    #[tokio::test]
    async fn test_cancel_all_kicks_suspended_worker() {
        let (ctx, _drain_rx) = ServerContext::new();
        let climit = Arc::new(Semaphore::new(8));
        climit.acquire().await.unwrap().forget();
        let (worker, _rd, _wr) = spawn_worker(&ctx, &climit);
        // the worker is suspended in its read; let it get there
        time::sleep(Duration::from_millis(50)).await;
        ctx.roster.cancel_all();
        time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(ctx.roster.active_count(), 0);
    }

    #[tokio::test]
    async fn test_stopped_gate_defers_commands_until_release() {
        let (ctx, _drain_rx) = ServerContext::new();
        let climit = Arc::new(Semaphore::new(8));
        climit.acquire().await.unwrap().forget();
        let (worker, rd, mut wr) = spawn_worker(&ctx, &climit);
        let mut lines = BufReader::new(rd).lines();
        ctx.gate.stop();
        wr.write_all(b"a gated 1\n").await.unwrap();
        // barred at the gate: no response within the settle window
        assert!(
            time::timeout(Duration::from_millis(100), lines.next_line())
                .await
                .is_err()
        );
        ctx.gate.release();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "added");
        assert!(ctx
            .tree
            .query(b"gated")
            .is_some_and(|v| &*v == b"1".as_slice()));
        wr.shutdown().await.unwrap();
        time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_worker_cancelled_at_the_gate_exits_cleanly() {
        let (ctx, _drain_rx) = ServerContext::new();
        let climit = Arc::new(Semaphore::new(8));
        climit.acquire().await.unwrap().forget();
        let (worker, _rd, mut wr) = spawn_worker(&ctx, &climit);
        ctx.gate.stop();
        wr.write_all(b"a blocked 1\n").await.unwrap();
        // give the worker time to reach the gate, then kick it
        time::sleep(Duration::from_millis(50)).await;
        ctx.roster.cancel_all();
        time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        // the command never ran
        assert!(ctx.tree.query(b"blocked").is_none());
        assert_eq!(ctx.roster.active_count(), 0);
    }
}
