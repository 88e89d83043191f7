/* This file is part of DarkFi (https://dark.fi)
 *
 * Copyright (C) 2020-2026 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds produced by the protocol engine. Every variant here maps to
/// one row of the error table: an exit code for CLI callers, an HTTP status
/// for the wire binding.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("required crypto backend unavailable: {0}")]
    CryptoLibraryMissing(String),

    #[error("invalid ristretto255 point or scalar")]
    InvalidPoint,

    #[error("AEAD authentication failed")]
    AuthFailure,

    #[error("protocol mismatch: server described an unexpected suite")]
    ProtocolMismatch,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Exit code for CLI entry points, per the error-kind table.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidInput(_) => 2,
            Error::NotFound(_) => 1,
            Error::AlreadyExists(_) => 1,
            Error::UnsupportedAlgorithm(_) => 2,
            Error::CryptoLibraryMissing(_) => 3,
            Error::InvalidPoint => 1,
            Error::AuthFailure => 1,
            Error::ProtocolMismatch => 1,
            Error::Io(_) => 1,
            Error::Json(_) => 1,
        }
    }
}
