/*
 * Created on Sat Mar 15 2025
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

use {
    super::{connection::Connection, ConnectionHandler},
    crate::{
        arbiter::ServerContext,
        util::error::{ArborResult, Error},
        IoResult,
    },
    std::{
        net::{IpAddr, SocketAddr},
        sync::{atomic::{AtomicU64, Ordering}, Arc},
        time::Duration,
    },
    tokio::{
        net::{TcpListener, TcpStream},
        sync::Semaphore,
        time,
    },
};

/// A growing delay between failed accepts, so a transient shortage (fd
/// exhaustion, a flood of half-open peers) cannot spin the accept loop hot.
/// A failure that outlives the whole ramp is handed back to the run loop,
/// which gives the slot back and starts over on a fresh ramp
struct AcceptBackoff {
    delay_secs: AtomicU64,
}

impl AcceptBackoff {
    /// Once the next delay would cross this, the listener gives up
    const CEILING_SECS: u64 = 64;
    const fn new() -> Self {
        Self {
            delay_secs: AtomicU64::new(1),
        }
    }
    /// Sit out the current delay and double it for the next failure
    async fn penalize(&self) {
        let delay = self.delay_secs.load(Ordering::Relaxed);
        time::sleep(Duration::from_secs(delay)).await;
        self.delay_secs.store(delay * 2, Ordering::Relaxed);
    }
    fn exhausted(&self) -> bool {
        self.delay_secs.load(Ordering::Relaxed) > Self::CEILING_SECS
    }
}

/// Everything admission needs, bundled around the bound socket: the shared
/// server state and the connection-slot semaphore
pub struct BaseListener {
    pub ctx: Arc<ServerContext>,
    pub listener: TcpListener,
    pub climit: Arc<Semaphore>,
}

impl BaseListener {
    pub async fn init(
        ctx: &Arc<ServerContext>,
        host: IpAddr,
        port: u16,
        maxcon: usize,
    ) -> ArborResult<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| Error::ioerror_extra(e, format!("binding to port {port}")))?;
        Ok(Self {
            ctx: Arc::clone(ctx),
            listener,
            climit: Arc::new(Semaphore::new(maxcon)),
        })
    }
}

/// The accept loop. Admission registers the new worker in the roster; a
/// closed roster (terminal shutdown underway) means the stream is dropped
/// unserved
pub struct Listener {
    pub base: BaseListener,
}

impl Listener {
    pub fn new(base: BaseListener) -> Self {
        Self { base }
    }
    /// The endpoint we actually bound to (the configured port may be 0)
    pub fn local_addr(&self) -> IoResult<SocketAddr> {
        self.base.listener.local_addr()
    }
    /// Accept one connection, riding out failures on a fresh backoff ramp.
    /// An error escapes only once the ramp is exhausted
    async fn accept(&mut self) -> IoResult<TcpStream> {
        let backoff = AcceptBackoff::new();
        loop {
            match self.base.listener.accept().await {
                Ok((stream, _peer)) => return Ok(stream),
                Err(e) if backoff.exhausted() => return Err(e),
                Err(_) => backoff.penalize().await,
            }
        }
    }
    /// Run the accept loop until the supervisor cancels this task
    pub async fn run(&mut self) -> IoResult<()> {
        loop {
            // reserve a connection slot before accepting, so maxcon bounds
            // the live workers; the handler's drop hands the slot back
            self.base.climit.acquire().await.unwrap().forget();
            let stream = match self.accept().await {
                Ok(stream) => stream,
                Err(_) => {
                    // one connection's worth of trouble is not a reason to
                    // stop listening; return the slot and move on, quietly
                    // (a peer flood would otherwise drown the log)
                    self.base.climit.add_permits(1);
                    continue;
                }
            };
            let registration = match self.base.ctx.roster.register() {
                Some(registration) => registration,
                None => {
                    // the server is closed: drop the stream unserved
                    self.base.climit.add_permits(1);
                    continue;
                }
            };
            let mut chandle = ConnectionHandler::<TcpStream>::new(
                Arc::clone(&self.base.ctx),
                Connection::new(stream),
                registration,
                Arc::clone(&self.base.climit),
            );
            tokio::spawn(async move {
                if let Err(e) = chandle.run().await {
                    log::info!("Closing connection with error: {}", e);
                }
            });
        }
    }
}
