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

//! Fixed-size byte quantities that flow through the OPRF/AEAD protocol.
//! Each type validates its length at construction so a malformed wire value
//! never silently becomes a valid scalar, point, or digest.

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// A 32-byte scalar: the server's OPRF key, or a client blinding factor.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Scalar32(pub [u8; 32]);

impl Scalar32 {
    pub fn from_slice(b: &[u8]) -> Result<Self> {
        if b.len() != 32 {
            return Err(Error::InvalidInput(format!("expected 32 bytes, got {}", b.len())));
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(b);
        Ok(Self(buf))
    }
}

/// A 32-byte ristretto255-encoded group element.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Point32(pub [u8; 32]);

impl Point32 {
    pub fn from_slice(b: &[u8]) -> Result<Self> {
        if b.len() != 32 {
            return Err(Error::InvalidInput(format!("expected 32 bytes, got {}", b.len())));
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(b);
        Ok(Self(buf))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidInput(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// A 64-byte SHA-512 OPRF finalize output.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Prf64(pub [u8; 64]);

impl Prf64 {
    pub fn from_slice(b: &[u8]) -> Result<Self> {
        if b.len() != 64 {
            return Err(Error::InvalidInput(format!("expected 64 bytes, got {}", b.len())));
        }
        let mut buf = [0u8; 64];
        buf.copy_from_slice(b);
        Ok(Self(buf))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidInput(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// A 24-byte XChaCha20 nonce.
#[derive(Clone, Copy)]
pub struct Nonce24(pub [u8; 24]);

impl Nonce24 {
    pub fn from_slice(b: &[u8]) -> Result<Self> {
        if b.len() != 24 {
            return Err(Error::InvalidInput(format!("expected 24 bytes, got {}", b.len())));
        }
        let mut buf = [0u8; 24];
        buf.copy_from_slice(b);
        Ok(Self(buf))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidInput(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}
