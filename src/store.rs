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

//! Storage abstractions over the filesystem layout in `spec.md` §6. Callers
//! depend on these traits, not on `std::fs` directly, so the protocol logic
//! in `dataset.rs`/`server.rs`/`client.rs` is testable with in-memory state.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::error::{Error, Result};

/// Append-only byte log, keyed by dataset. Readers may race with a single
/// writer (`spec.md` §5); this trait makes no promises beyond "read returns
/// some prefix-consistent snapshot".
pub trait LogStore: Send + Sync {
    fn read(&self) -> Result<Vec<u8>>;
    fn write_all(&self, bytes: &[u8]) -> Result<()>;
    fn exists(&self) -> bool;
}

/// Raw key-value byte storage for the private key and index/schema files.
pub trait KeyStore: Send + Sync {
    fn read(&self) -> Result<Vec<u8>>;
    fn write(&self, bytes: &[u8]) -> Result<()>;
    fn exists(&self) -> bool;
    fn delete(&self) -> Result<()>;
}

pub struct FsLogStore {
    pub path: PathBuf,
}

impl FsLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LogStore for FsLogStore {
    fn read(&self) -> Result<Vec<u8>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Ok(fs::read(&self.path)?)
    }

    fn write_all(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, bytes)?;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}

pub struct FsKeyStore {
    pub path: PathBuf,
}

impl FsKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Best-effort owner-only permissions, mirroring the reference server's
    /// `os.chmod(key_path, 0o600)`.
    #[cfg(unix)]
    fn restrict_permissions(&self) {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = fs::metadata(&self.path) {
            let mut perms = meta.permissions();
            perms.set_mode(0o600);
            let _ = fs::set_permissions(&self.path, perms);
        }
    }

    #[cfg(not(unix))]
    fn restrict_permissions(&self) {}
}

impl KeyStore for FsKeyStore {
    fn read(&self) -> Result<Vec<u8>> {
        if !self.path.exists() {
            return Err(Error::NotFound(self.path.display().to_string()));
        }
        Ok(fs::read(&self.path)?)
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, bytes)?;
        self.restrict_permissions();
        Ok(())
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn delete(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            if let Some(parent) = self.path.parent() {
                let _ = fs::remove_dir(parent);
            }
        }
        Ok(())
    }
}

/// In-memory stand-in used by tests, keyed by an arbitrary string so a
/// single instance can back several files (schema/key/index/log) for a
/// dataset without touching disk.
#[derive(Default)]
pub struct MemStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(self: &std::sync::Arc<Self>, key: &str) -> MemSlot {
        MemSlot { store: self.clone(), key: key.to_string() }
    }
}

pub struct MemSlot {
    store: std::sync::Arc<MemStore>,
    key: String,
}

impl LogStore for MemSlot {
    fn read(&self) -> Result<Vec<u8>> {
        Ok(self.store.entries.lock().unwrap().get(&self.key).cloned().unwrap_or_default())
    }

    fn write_all(&self, bytes: &[u8]) -> Result<()> {
        self.store.entries.lock().unwrap().insert(self.key.clone(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self) -> bool {
        self.store.entries.lock().unwrap().contains_key(&self.key)
    }
}

impl KeyStore for MemSlot {
    fn read(&self) -> Result<Vec<u8>> {
        self.store
            .entries
            .lock()
            .unwrap()
            .get(&self.key)
            .cloned()
            .ok_or_else(|| crate::error::Error::NotFound(self.key.clone()))
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        self.store.entries.lock().unwrap().insert(self.key.clone(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self) -> bool {
        self.store.entries.lock().unwrap().contains_key(&self.key)
    }

    fn delete(&self) -> Result<()> {
        self.store.entries.lock().unwrap().remove(&self.key);
        Ok(())
    }
}

/// Validate a dataset name against `[A-Za-z0-9]+`, per `spec.md` §3/§6.
pub fn validate_data_name(name: &str) -> Result<()> {
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(crate::error::Error::InvalidInput(format!(
            "data_name must match [A-Za-z0-9]+, got {name:?}"
        )))
    }
}

/// Layout of one dataset's on-disk paths, rooted at a server base directory.
pub struct DatasetPaths {
    pub schema: PathBuf,
    pub key: PathBuf,
    pub index: PathBuf,
    pub log: PathBuf,
}

impl DatasetPaths {
    pub fn new(base_dir: &Path, data_name: &str) -> Self {
        Self {
            schema: base_dir.join("schemas").join(data_name).join("schema.json"),
            key: base_dir.join("secrets").join(data_name).join("private.key"),
            index: base_dir.join("data").join(data_name).join("index.csv"),
            log: base_dir.join("data").join(data_name).join("changes.log"),
        }
    }
}
