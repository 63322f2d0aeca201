/*
 * Created on Fri Feb 14 2025
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

//! # The Query Engine
//!
//! One command per line: the first byte selects the operation and the rest of
//! the line is whitespace-tokenized. Every command produces exactly one
//! response string; anything unparseable produces `ill-formed command`. The
//! engine is purely synchronous (tree operations never suspend), which is
//! what lets the serve loop guarantee that no lock is ever held across an
//! await point.

use {
    crate::{
        coretree::{AddStatus, RemoveStatus, Tree, MAX_DATA_LEN},
        dbnet::Terminator,
    },
    std::{
        fs,
        io::{BufRead, BufReader},
    },
};


pub mod responses {
    //! Response strings for the line protocol
    /// The name was inserted
    pub const R_ADDED: &[u8] = b"added";
    /// Insert refused: the name is already present
    pub const R_ALREADY_IN_DATABASE: &[u8] = b"already in database";
    /// The name was removed
    pub const R_REMOVED: &[u8] = b"removed";
    /// Remove refused: no such name
    pub const R_NOT_IN_DATABASE: &[u8] = b"not in database";
    /// Query miss
    pub const R_NOT_FOUND: &[u8] = b"not found";
    /// A batch file ran to completion (or was cut short by cancellation)
    pub const R_FILE_PROCESSED: &[u8] = b"file processed";
    /// A batch file could not be opened
    pub const R_BAD_FILE_NAME: &[u8] = b"bad file name";
    /// The command did not parse
    pub const R_ILL_FORMED_COMMAND: &[u8] = b"ill-formed command";
}

/// Execute a single command line against the tree and return the response
/// (without its line terminator).
///
/// The terminator is only consulted by the batch-file path, which polls it
/// after every line read so that a cancelled worker abandons the batch.
pub fn execute_simple(tree: &Tree, line: &[u8], terminator: &mut Terminator) -> Vec<u8> {
    if line.len() < 2 {
        return responses::R_ILL_FORMED_COMMAND.to_owned();
    }
    let mut tokens = line[1..]
        .split(|b: &u8| b.is_ascii_whitespace())
        .filter(|token| !token.is_empty());
    match line[0] {
        b'q' => query(tree, tokens.next()),
        b'a' => add(tree, tokens.next(), tokens.next()),
        b'd' => del(tree, tokens.next()),
        b'f' => runfile(tree, tokens.next(), terminator),
        _ => responses::R_ILL_FORMED_COMMAND.to_owned(),
    }
}

/// A name, value or path token is usable if it is nonempty and within the
/// length bound
fn usable(token: Option<&[u8]>) -> Option<&[u8]> {
    token.filter(|token| !token.is_empty() && token.len() <= MAX_DATA_LEN)
}

fn query(tree: &Tree, name: Option<&[u8]>) -> Vec<u8> {
    match usable(name) {
        Some(name) => match tree.query(name) {
            Some(value) => value.into_vec(),
            None => responses::R_NOT_FOUND.to_owned(),
        },
        None => responses::R_ILL_FORMED_COMMAND.to_owned(),
    }
}

fn add(tree: &Tree, name: Option<&[u8]>, value: Option<&[u8]>) -> Vec<u8> {
    match (usable(name), usable(value)) {
        (Some(name), Some(value)) => match tree.add(name, value) {
            Ok(AddStatus::Inserted) => responses::R_ADDED.to_owned(),
            Ok(AddStatus::Duplicate) => responses::R_ALREADY_IN_DATABASE.to_owned(),
            // the scan above bounds both tokens, but the tree enforces the
            // bound independently
            Err(_) => responses::R_ILL_FORMED_COMMAND.to_owned(),
        },
        _ => responses::R_ILL_FORMED_COMMAND.to_owned(),
    }
}

fn del(tree: &Tree, name: Option<&[u8]>) -> Vec<u8> {
    match usable(name) {
        Some(name) => match tree.remove(name) {
            RemoveStatus::Removed => responses::R_REMOVED.to_owned(),
            RemoveStatus::Absent => responses::R_NOT_IN_DATABASE.to_owned(),
        },
        None => responses::R_ILL_FORMED_COMMAND.to_owned(),
    }
}

/// Run every line of the named file as a command, discarding the per-line
/// responses. The terminator is polled after each read: a worker cancelled
/// mid-batch stops where it is
fn runfile(tree: &Tree, path: Option<&[u8]>, terminator: &mut Terminator) -> Vec<u8> {
    let path = match usable(path).map(String::from_utf8_lossy) {
        Some(path) => path.into_owned(),
        None => return responses::R_ILL_FORMED_COMMAND.to_owned(),
    };
    let file = match fs::File::open(&path) {
        Ok(file) => file,
        Err(_) => return responses::R_BAD_FILE_NAME.to_owned(),
    };
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if terminator.check_termination_signal() {
            break;
        }
        while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
            line.pop();
        }
        let _ = execute_simple(tree, &line, terminator);
    }
    responses::R_FILE_PROCESSED.to_owned()
}
