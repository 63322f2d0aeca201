/*
 * Created on Mon Apr 21 2025
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

//! # The signal monitor
//!
//! The one task in the process that consumes the interrupt signal. An
//! interrupt disconnects every currently connected client and nothing more:
//! the listener keeps accepting, so an interrupt is "kick all clients", not
//! shutdown. The supervisor cancels and joins this task as part of the
//! terminal shutdown sequence.

use crate::dbnet::Roster;
use std::sync::Arc;
use tokio::signal;

pub async fn signal_monitor(roster: Arc<Roster>) {
    loop {
        match signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Received an interrupt. Disconnecting all connected clients");
                roster.cancel_all();
            }
            Err(e) => {
                log::error!("Failed to listen for interrupts: {}. Signal monitor has exited", e);
                return;
            }
        }
    }
}
