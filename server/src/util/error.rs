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

use std::{fmt, io::Error as IoError};

pub type ArborResult<T> = Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    IoError(IoError),
    IoErrorExtra(IoError, String),
    OtherError(String),
}

impl Error {
    pub fn ioerror_extra(ioe: IoError, extra: impl ToString) -> Self {
        Self::IoErrorExtra(ioe, extra.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(nerr) => write!(f, "I/O error: {}", nerr),
            Self::IoErrorExtra(ioe, extra) => write!(f, "I/O error while {extra}: {ioe}"),
            Self::OtherError(oerr) => write!(f, "Error: {}", oerr),
        }
    }
}

impl From<IoError> for Error {
    fn from(ioe: IoError) -> Self {
        Self::IoError(ioe)
    }
}
