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

//! # Line-framed connections
//!
//! The wire protocol is one command per newline-terminated line and one
//! response per command. [`Connection`] owns both halves of a client stream:
//! reads accumulate into a [`BytesMut`] buffer that is scanned for the line
//! terminator, writes go through a [`BufWriter`] and are flushed per response.

use {
    crate::{dbnet::BufferedSocketStream, IoResult},
    bytes::BytesMut,
    libarbor::BUF_CAP,
    std::io::{Error as IoError, ErrorKind},
    tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter},
};

/// The maximum length of a single command line (terminator included). A well
/// formed command never comes close: one opcode byte plus two 255-byte tokens
pub const MAX_LINE_LEN: usize = 1024;

/// A buffered, line-capable client stream. The connection owns the stream and
/// closes it on drop
pub struct Connection<C> {
    stream: BufWriter<C>,
    buffer: BytesMut,
}

impl<C: BufferedSocketStream> Connection<C> {
    pub fn new(stream: C) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(BUF_CAP),
        }
    }
    /// Read exactly one command line, without its terminator (a trailing CR
    /// is trimmed too). Returns `Ok(None)` on a clean end-of-stream. A peer
    /// that disconnects mid-line or sends [`MAX_LINE_LEN`] bytes without a
    /// newline is treated as broken
    pub async fn read_command(&mut self) -> IoResult<Option<Vec<u8>>> {
        loop {
            if let Some(at) = self.buffer.iter().position(|b| *b == b'\n') {
                let mut line = self.buffer.split_to(at + 1);
                line.truncate(at);
                if line.last() == Some(&b'\r') {
                    line.truncate(at - 1);
                }
                return Ok(Some(line.to_vec()));
            }
            if self.buffer.len() > MAX_LINE_LEN {
                return Err(IoError::new(
                    ErrorKind::InvalidData,
                    "command line exceeds the protocol limit",
                ));
            }
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(IoError::from(ErrorKind::ConnectionReset))
                };
            }
        }
    }
    /// Write one response line: the payload followed by the terminator,
    /// flushed so the client sees it immediately
    pub async fn write_response(&mut self, response: &[u8]) -> IoResult<()> {
        self.stream.write_all(response).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await
    }
}
