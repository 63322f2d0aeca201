/*
 * Created on Sun May 04 2025
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

//! # The supervisor
//!
//! Process orchestration: build the shared context, start the signal monitor
//! and the listener, drive the admin terminal, and on end-of-input walk the
//! shutdown sequence in its one safe order: close the roster, cancel every
//! worker, wait for the worker count to reach zero, retire the signal
//! monitor, tear down the tree, and finally retire the listener. The tree
//! may only be destroyed after the drain wait: that is the first moment at
//! which no worker can hold a node lock.

use {
    crate::{
        config::ConfigurationSet,
        coretree::Tree,
        dbnet::{self, Gate, Roster},
        services,
        util::error::ArborResult,
    },
    std::{fs, io::Write, sync::Arc},
    tokio::{
        io::{AsyncBufRead, AsyncBufReadExt, BufReader},
        sync::mpsc,
        task::JoinHandle,
    },
};

/// The process-lifetime singletons, constructed once at startup and passed
/// explicitly to every task that needs them
pub struct ServerContext {
    pub tree: Tree,
    pub gate: Gate,
    pub roster: Arc<Roster>,
}

impl ServerContext {
    /// Build the context along with the drain receiver used by [`shutdown`]
    pub fn new() -> (Arc<Self>, mpsc::Receiver<()>) {
        let (roster, drain_rx) = Roster::new();
        (
            Arc::new(Self {
                tree: Tree::new(),
                gate: Gate::new(),
                roster,
            }),
            drain_rx,
        )
    }
}

/// Start the server and block until the admin terminal reaches end-of-input
/// and the shutdown sequence completes
pub async fn run(config: ConfigurationSet) -> ArborResult<()> {
    mask_pipe_signal();
    let (ctx, drain_rx) = ServerContext::new();

    // the monitor is the only consumer of the interrupt signal
    let monitor_handle = tokio::spawn(services::sigmon::signal_monitor(Arc::clone(&ctx.roster)));

    let mut listener = dbnet::connect(config.host, config.port, config.maxcon, Arc::clone(&ctx)).await?;
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener.run().await {
            log::error!("Listener failed with: {}", e);
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    admin_loop(&ctx, stdin).await;

    shutdown(&ctx, drain_rx, monitor_handle, listener_handle).await;
    Ok(())
}

/// Writes to a disconnected client must surface as plain I/O errors on that
/// worker's stream, never as a process-wide signal
#[cfg(unix)]
fn mask_pipe_signal() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn mask_pipe_signal() {}

/// The admin terminal. `s` bars the gate, `g` releases it, `p [file]` prints
/// the tree, end-of-input requests shutdown
async fn admin_loop<R>(ctx: &ServerContext, admin: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = admin.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                log::error!("Failed to read from the admin terminal: {}", e);
                return;
            }
        };
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("s") => {
                ctx.gate.stop();
                log::info!("Stopping all clients at the gate");
            }
            Some("g") => {
                ctx.gate.release();
                log::info!("Releasing all clients");
            }
            Some("p") => print_tree(ctx, tokens.next()),
            Some(other) => {
                log::warn!("Unknown admin command {:?}. Available: s, g, p [file]", other)
            }
            // a blank line is not a command
            None => {}
        }
    }
}

fn print_tree(ctx: &ServerContext, target: Option<&str>) {
    let outcome = match target {
        Some(path) => match fs::File::create(path) {
            Ok(mut file) => ctx.tree.print(&mut file).and_then(|_| file.flush()),
            Err(e) => {
                log::error!("Failed to open {:?} for writing: {}", path, e);
                return;
            }
        },
        None => ctx.tree.print(&mut std::io::stdout().lock()),
    };
    if let Err(e) = outcome {
        log::error!("Failed to print the tree: {}", e);
    }
}

/// The terminal shutdown sequence. The order is load-bearing; see the module
/// docs
pub async fn shutdown(
    ctx: &ServerContext,
    mut drain_rx: mpsc::Receiver<()>,
    monitor_handle: JoinHandle<()>,
    listener_handle: JoinHandle<()>,
) {
    log::info!("Signalling all workers to shut down");
    // 1. no new registrations; 2. every live worker is told to go
    ctx.roster.close();
    ctx.roster.cancel_all();
    // 3. wait for the last worker to unregister; from here the tree has no
    // lock holders
    let _ = drain_rx.recv().await;
    // 4. the signal monitor has nothing left to protect
    monitor_handle.abort();
    let _ = monitor_handle.await;
    // 5. destroy the tree's nodes
    ctx.tree.cleanup();
    // 6. stop accepting
    listener_handle.abort();
    let _ = listener_handle.await;
    log::info!("Stopped accepting incoming connections");
}
