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

//! The query responder (C4): the three read-side operations a server
//! exposes to clients, kept deliberately transport-free. `serverd` wraps
//! these in tide routes; tests can call them directly.

use std::path::{Path, PathBuf};

use crate::{
    changelog::Tail,
    crypto::{Point32, ENCRYPTION, SUITE},
    dataset::Dataset,
    error::Result,
};

/// Response to a `describe` request: the suite and encryption scheme a
/// dataset runs, so a client can refuse to proceed on a mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Describe {
    pub data_name: String,
    pub suite: String,
    pub encryption: String,
}

pub struct QueryResponder {
    base_dir: PathBuf,
}

impl QueryResponder {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn dataset(&self, data_name: &str) -> Result<Dataset> {
        Dataset::open_fs(&self.base_dir, data_name)
    }

    /// Describe a dataset's crypto suite. Fails with `NotFound` if the
    /// dataset's schema doesn't exist.
    pub fn describe(&self, data_name: &str) -> Result<Describe> {
        let ds = self.dataset(data_name)?;
        ds.schema()?;
        Ok(Describe { data_name: data_name.to_string(), suite: SUITE.to_string(), encryption: ENCRYPTION.to_string() })
    }

    /// Return the change-log tail after `anchor_hash` (or the full log when
    /// absent or not found). Fails with `NotFound` if the dataset is unknown
    /// or has no change log on disk yet (`spec.md` §6).
    pub fn sync(&self, data_name: &str, anchor_hash: Option<&str>) -> Result<Tail> {
        let ds = self.dataset(data_name)?;
        ds.tail(anchor_hash)
    }

    /// Evaluate a client's blinded point under the dataset's current server
    /// key. Never sees the plaintext IOC.
    pub fn evaluate(&self, data_name: &str, blinded: &Point32) -> Result<Point32> {
        let ds = self.dataset(data_name)?;
        ds.evaluate_blinded(blinded)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
