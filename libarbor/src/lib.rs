/*
 * Created on Sun Jan 12 2025
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

//! The core library for ArborDB
//!
//! This contains the bits that are shared by the `server` binary and any
//! tooling built around it

pub mod util;

/// The current version of the ArborDB suite
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// The URL of the project
pub const URL: &str = "https://github.com/arbordb/arbordb";
/// The size of the per-connection read buffer in bytes
pub const BUF_CAP: usize = 8 * 1024; // 8 KB per-connection
