/*
 * Created on Sun Apr 06 2025
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

//! # The client roster
//!
//! The set of live workers, guarded by a single mutex. The same mutex
//! serializes three things that must never interleave: the open/closed check
//! a worker performs at admission, the insertion of its record, and a
//! cancel-all sweep. That is what makes the supervisor's final cancel
//! airtight: once the roster is closed, no worker can register behind it.
//!
//! A registration hands the worker two objects: a [`Terminator`] carrying its
//! personal cancel signal, and a [`ClientGuard`] whose drop unregisters the
//! record. Cancellation therefore never empties the roster; every worker
//! removes itself on its own way out, whatever the exit path.
//!
//! The roster also owns the sending half of the drain channel. Each
//! registration carries a clone; the supervisor holds the receiver. When the
//! roster is closed and the last worker unregisters, the last sender drops
//! and the supervisor's `recv()` resolves: that is the "worker count reached
//! zero" broadcast.

use {
    crate::dbnet::Terminator,
    parking_lot::Mutex,
    std::{collections::HashMap, sync::Arc},
    tokio::sync::{mpsc, watch},
};

/// One registered worker, as the roster sees it
struct ClientHandle {
    cancel: watch::Sender<bool>,
}

struct RosterInner {
    open: bool,
    next_id: u64,
    clients: HashMap<u64, ClientHandle>,
    drain_tx: Option<mpsc::Sender<()>>,
}

/// The live-worker set shared by the listener (admission), the workers
/// themselves (self-removal), the signal monitor and the supervisor
/// (cancel-all, close)
pub struct Roster {
    inner: Mutex<RosterInner>,
}

/// What a worker gets back from a successful registration
pub struct Registration {
    pub terminator: Terminator,
    pub guard: ClientGuard,
}

/// Unregisters the worker when dropped. Every exit path of a worker runs
/// this exactly once
pub struct ClientGuard {
    roster: Arc<Roster>,
    id: u64,
    _drain: Option<mpsc::Sender<()>>,
}

impl Roster {
    /// Create the roster along with the drain receiver the supervisor will
    /// block on during shutdown
    pub fn new() -> (Arc<Self>, mpsc::Receiver<()>) {
        let (drain_tx, drain_rx) = mpsc::channel(1);
        let roster = Arc::new(Self {
            inner: Mutex::new(RosterInner {
                open: true,
                next_id: 0,
                clients: HashMap::new(),
                drain_tx: Some(drain_tx),
            }),
        });
        (roster, drain_rx)
    }
    /// Admit the calling worker, or refuse it if the server has been closed.
    /// The check and the insertion happen under the one roster mutex
    pub fn register(self: &Arc<Self>) -> Option<Registration> {
        let mut inner = self.inner.lock();
        if !inner.open {
            return None;
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        inner.clients.insert(id, ClientHandle { cancel: cancel_tx });
        let drain = inner.drain_tx.clone();
        Some(Registration {
            terminator: Terminator::new(cancel_rx),
            guard: ClientGuard {
                roster: Arc::clone(self),
                id,
                _drain: drain,
            },
        })
    }
    fn unregister(&self, id: u64) {
        self.inner.lock().clients.remove(&id);
    }
    /// Signal every currently registered worker to wind down. Records stay
    /// put: each worker unregisters itself through its guard
    pub fn cancel_all(&self) {
        let inner = self.inner.lock();
        for client in inner.clients.values() {
            client.cancel.send_replace(true);
        }
    }
    /// Refuse all future registrations and release the roster's own drain
    /// sender, arming the zero-workers broadcast
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.open = false;
        inner.drain_tx = None;
    }
    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }
    pub fn active_count(&self) -> usize {
        self.inner.lock().clients.len()
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.roster.unregister(self.id);
    }
}
