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

//! # The gate
//!
//! A process-wide pause/resume barrier. Every worker waits at the gate once
//! per serve-loop iteration, after reading a command and before running it,
//! and must hold no tree lock while doing so. The admin `s` command stops the
//! gate; `g` releases it and wakes every waiter. A stop never interrupts a
//! command already past the gate: in-flight tree operations complete normally.

use tokio::sync::watch;

/// The setter half, driven by the supervisor
pub struct Gate {
    stopped: watch::Sender<bool>,
}

/// A worker's handle on the gate
pub struct GatePass {
    stopped: watch::Receiver<bool>,
}

impl Gate {
    pub fn new() -> Self {
        let (stopped, _) = watch::channel(false);
        Self { stopped }
    }
    /// Bar the gate. Nobody is woken: workers notice at their next wait
    pub fn stop(&self) {
        self.stopped.send_replace(true);
    }
    /// Open the gate and wake every waiter
    pub fn release(&self) {
        self.stopped.send_replace(false);
    }
    pub fn subscribe(&self) -> GatePass {
        GatePass {
            stopped: self.stopped.subscribe(),
        }
    }
}

impl GatePass {
    /// Wait until the gate is open. Dropping this future at a cancellation
    /// point leaves nothing held
    pub async fn wait(&mut self) {
        while *self.stopped.borrow_and_update() {
            if self.stopped.changed().await.is_err() {
                // the supervisor half is gone; treat the gate as open
                return;
            }
        }
    }
}
