/*
 * Created on Mon Jan 06 2025
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

//! # ArborDB
//!
//! The `arbord` crate is ArborDB's database server: a line-oriented key/value
//! protocol over TCP, backed by a binary search tree with one reader/writer
//! lock per node. See the individual modules for their documentation; the
//! interesting parts are `coretree` (the locked tree) and `dbnet` (the worker
//! lifecycle around it).

use env_logger::*;
use libarbor::util::terminal;
use libarbor::URL;
use libarbor::VERSION;
use std::env;
use std::process;

mod arbiter;
mod config;
mod coretree;
mod dbnet;
mod queryengine;
mod services;
mod util;
#[cfg(test)]
mod tests;

/// A generic I/O result
pub type IoResult<T> = std::io::Result<T>;

#[cfg(all(not(target_env = "msvc"), not(miri)))]
use jemallocator::Jemalloc;

#[cfg(all(not(target_env = "msvc"), not(miri)))]
#[global_allocator]
/// jemalloc backs every allocation on targets that can carry it (everywhere
/// but msvc)
static GLOBAL: Jemalloc = Jemalloc;

/// The terminal art for `!noart` configurations
static TEXT: &str = "\n █████  ██████  ██████   ██████  ██████  ██████  ██████ \n██   ██ ██   ██ ██   ██ ██    ██ ██   ██ ██   ██ ██   ██\n███████ ██████  ██████  ██    ██ ██████  ██   ██ ██████ \n██   ██ ██   ██ ██   ██ ██    ██ ██   ██ ██   ██ ██   ██\n██   ██ ██   ██ ██████   ██████  ██   ██ ██████  ██████ \n";

fn main() {
    Builder::new()
        .parse_filters(&env::var("ARBOR_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();
    let cfg = match config::get_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("{}", e);
            process::exit(0x100);
        }
    };
    if cfg.noart {
        println!("ArborDB v{} | {}", VERSION, URL);
    } else {
        println!("ArborDB v{} | {}\n{}", VERSION, URL, TEXT);
    }
    // Start the server, which runs until the admin terminal reaches
    // end-of-input and the shutdown sequence has quiesced every worker
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("server")
        .enable_all()
        .build()
        .unwrap();
    let outcome = runtime.block_on(arbiter::run(cfg));
    // Make sure all spawned tasks are gone before we report
    drop(runtime);
    if let Err(e) = outcome {
        log::error!("Server failed with: {}", e);
        process::exit(0x100);
    }
    terminal::write_info("Goodbye :)\n").unwrap();
}
