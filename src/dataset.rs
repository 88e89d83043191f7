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

//! The dataset reconciler (C3): create/remove a dataset, diff a source file
//! against the current index, recompute OPRF + encrypted metadata for new
//! or under-upgraded IOCs, and append the resulting events to the hash
//! chain. Also owns full key rotation (`rekey`) and dataset deletion
//! (`purge`).

use std::path::Path;

use curve25519_dalek::Scalar;
use rand_core::{CryptoRng, RngCore};

use crate::{
    changelog::{self, ChangeEvent},
    crypto::{
        oprf,
        types::{Point32, Scalar32},
        aead,
    },
    error::{Error, Result},
    index::{self, IndexRecord},
    schema::{Algorithm, RekeyInterval, Schema},
    store::{validate_data_name, DatasetPaths, FsKeyStore, FsLogStore, KeyStore, LogStore},
};

/// A parsed source line: `<ioc>,{...metadata...}`. Malformed lines (no
/// comma, or an empty IOC) are skipped, matching the reference reader.
pub fn parse_source(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let text = String::from_utf8_lossy(bytes);
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((ioc_part, meta_part)) = line.split_once(',') else { continue };
        let ioc = ioc_part.trim().to_string();
        if ioc.is_empty() {
            continue;
        }
        out.push((ioc, meta_part.trim().as_bytes().to_vec()));
    }
    out
}

/// Summary of a `reconcile` or `rekey` run, for CLI/log reporting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub removed: usize,
    pub upgraded: usize,
}

/// A dataset's storage handles and validated schema/key material, ready for
/// reconcile/rekey/purge operations.
pub struct Dataset {
    pub data_name: String,
    schema_store: Box<dyn KeyStore>,
    key_store: Box<dyn KeyStore>,
    index_store: Box<dyn LogStore>,
    log_store: Box<dyn LogStore>,
}

impl Dataset {
    pub fn from_stores(
        data_name: impl Into<String>,
        schema_store: Box<dyn KeyStore>,
        key_store: Box<dyn KeyStore>,
        index_store: Box<dyn LogStore>,
        log_store: Box<dyn LogStore>,
    ) -> Result<Self> {
        let data_name = data_name.into();
        validate_data_name(&data_name)?;
        Ok(Self { data_name, schema_store, key_store, index_store, log_store })
    }

    pub fn open_fs(base_dir: &Path, data_name: &str) -> Result<Self> {
        validate_data_name(data_name)?;
        let paths = DatasetPaths::new(base_dir, data_name);
        Self::from_stores(
            data_name,
            Box::new(FsKeyStore::new(paths.schema)),
            Box::new(FsKeyStore::new(paths.key)),
            Box::new(FsLogStore::new(paths.index)),
            Box::new(FsLogStore::new(paths.log)),
        )
    }

    /// Create a new dataset: write its schema and generate a fresh private
    /// key. Refuses to overwrite an existing schema or key (`spec.md` §5.1).
    pub fn create<R: RngCore + CryptoRng>(
        rng: &mut R,
        data_name: &str,
        algorithm: Algorithm,
        rekey_interval: RekeyInterval,
        schema_store: Box<dyn KeyStore>,
        key_store: Box<dyn KeyStore>,
    ) -> Result<()> {
        if schema_store.exists() || key_store.exists() {
            return Err(Error::AlreadyExists(data_name.to_string()));
        }
        let schema = Schema::new(data_name, algorithm, rekey_interval)?;
        schema_store.write(&schema.to_json_bytes()?)?;

        let key_bytes = match algorithm {
            Algorithm::Classic => Scalar::random(rng).to_bytes().to_vec(),
            Algorithm::Ot => b"ot-placeholder-key\n".to_vec(),
        };
        key_store.write(&key_bytes)?;
        Ok(())
    }

    /// Remove a dataset's schema and key (not its data directory — see
    /// [`purge`] for that). A no-op if neither file exists.
    pub fn remove(schema_store: &dyn KeyStore, key_store: &dyn KeyStore) -> Result<bool> {
        let mut removed_any = false;
        if schema_store.exists() {
            schema_store.delete()?;
            removed_any = true;
        }
        if key_store.exists() {
            key_store.delete()?;
            removed_any = true;
        }
        Ok(removed_any)
    }

    fn load_schema(&self) -> Result<Schema> {
        let schema = Schema::from_json_bytes(&self.schema_store.read()?)?;
        schema.require_classic()?;
        Ok(schema)
    }

    fn load_key(&self) -> Result<Scalar32> {
        Scalar32::from_slice(&self.key_store.read()?)
    }

    /// Diff `source` against the current index and recompute OPRF +
    /// encrypted metadata for additions and upgrades. Appends ADDED events
    /// for new IOCs and REMOVED events for dropped ones; upgraded records
    /// are silently backfilled with no log event (`spec.md` §9, decision 2).
    pub fn reconcile<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        source: &[(String, Vec<u8>)],
    ) -> Result<ReconcileReport> {
        self.load_schema()?; // side effect: refuses non-classic algorithms
        let server_key = self.load_key()?;

        let current_order: Vec<&str> = source.iter().map(|(ioc, _)| ioc.as_str()).collect();
        let current_set: std::collections::HashSet<&str> = current_order.iter().copied().collect();
        let current_meta: std::collections::HashMap<&str, &[u8]> =
            source.iter().map(|(ioc, meta)| (ioc.as_str(), meta.as_slice())).collect();

        let mut existing: Vec<IndexRecord> = index::parse(&self.index_store.read()?)?;
        let existing_order: Vec<String> = existing.iter().map(|r| r.ioc.clone()).collect();

        let to_remove: Vec<String> =
            existing_order.iter().filter(|ioc| !current_set.contains(ioc.as_str())).cloned().collect();
        let to_add: Vec<String> = current_order
            .iter()
            .filter(|ioc| !existing_order.iter().any(|e| e == *ioc))
            .map(|s| s.to_string())
            .collect();
        let to_upgrade: Vec<String> = existing
            .iter()
            .filter(|r| current_set.contains(r.ioc.as_str()) && !r.has_metadata())
            .map(|r| r.ioc.clone())
            .collect();

        let mut prev_by_ioc: std::collections::HashMap<String, IndexRecord> =
            existing.iter().map(|r| (r.ioc.clone(), r.clone())).collect();

        for ioc in to_add.iter().chain(to_upgrade.iter()) {
            let meta = current_meta.get(ioc.as_str()).copied().unwrap_or(b"");
            let (prf, q) = oprf::server_evaluate_plaintext(&server_key, &self.data_name, ioc.as_bytes())?;
            let (nonce, ct) =
                aead::encrypt_metadata(rng, &self.data_name, ioc.as_bytes(), &prf, &q, meta)?;
            let record = IndexRecord {
                ioc: ioc.clone(),
                oprf_hex: prf.to_hex(),
                nonce_hex: Some(nonce.to_hex()),
                ciphertext_hex: Some(hex::encode(&ct)),
            };
            prev_by_ioc.insert(ioc.clone(), record);
        }

        let remove_set: std::collections::HashSet<&str> = to_remove.iter().map(String::as_str).collect();
        let mut new_order: Vec<String> =
            existing_order.iter().filter(|ioc| !remove_set.contains(ioc.as_str())).cloned().collect();
        for ioc in &current_order {
            if !new_order.iter().any(|e| e == ioc) {
                new_order.push(ioc.to_string());
            }
        }

        let mut events = Vec::new();
        for ioc in &to_add {
            let r = &prev_by_ioc[ioc];
            events.push(ChangeEvent::Added { oprf: Some(r.oprf_hex.clone()), enc_meta: r.enc_meta() });
        }
        for ioc in &to_remove {
            if let Some(old) = existing.iter().find(|r| &r.ioc == ioc) {
                events.push(ChangeEvent::Removed { oprf: Some(old.oprf_hex.clone()), enc_meta: old.enc_meta() });
            }
        }

        existing = new_order.iter().map(|ioc| prev_by_ioc[ioc].clone()).collect();
        self.index_store.write_all(&index::write(&existing))?;

        let log = self.log_store.read()?;
        let new_log = changelog::append(&log, &events);
        self.log_store.write_all(&new_log)?;

        Ok(ReconcileReport { added: to_add.len(), removed: to_remove.len(), upgraded: to_upgrade.len() })
    }

    /// Rotate the private key and recompute OPRF + encrypted metadata for
    /// every IOC currently in `source`, overwriting the index and
    /// truncating the change log to a fresh set of ADDED events
    /// (`spec.md` §5.4). Non-atomic by design: a crash mid-rekey can leave
    /// the key rotated but the index/log only partially rewritten.
    pub fn rekey<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        source: &[(String, Vec<u8>)],
    ) -> Result<ReconcileReport> {
        self.load_schema()?; // side effect: refuses non-classic algorithms

        let new_key = Scalar32(Scalar::random(rng).to_bytes());
        self.key_store.write(&new_key.0)?;

        let mut records = Vec::with_capacity(source.len());
        let mut events = Vec::with_capacity(source.len());
        for (ioc, meta) in source {
            let (prf, q) = oprf::server_evaluate_plaintext(&new_key, &self.data_name, ioc.as_bytes())?;
            let (nonce, ct) = aead::encrypt_metadata(rng, &self.data_name, ioc.as_bytes(), &prf, &q, meta)?;
            let record = IndexRecord {
                ioc: ioc.clone(),
                oprf_hex: prf.to_hex(),
                nonce_hex: Some(nonce.to_hex()),
                ciphertext_hex: Some(hex::encode(&ct)),
            };
            events.push(ChangeEvent::Added { oprf: Some(record.oprf_hex.clone()), enc_meta: record.enc_meta() });
            records.push(record);
        }

        self.index_store.write_all(&index::write(&records))?;
        let fresh_log = changelog::append(b"", &events);
        self.log_store.write_all(&fresh_log)?;

        Ok(ReconcileReport { added: records.len(), removed: 0, upgraded: 0 })
    }

    /// Evaluate a client's blinded point for an online query. Never sees
    /// the plaintext IOC.
    pub fn evaluate_blinded(&self, blinded: &Point32) -> Result<Point32> {
        self.load_schema()?; // side effect: refuses non-classic algorithms
        let key = self.load_key()?;
        oprf::server_evaluate_blinded(&key, blinded)
    }

    pub fn schema(&self) -> Result<Schema> {
        self.load_schema()
    }

    pub fn tail(&self, anchor_hash: Option<&str>) -> Result<changelog::Tail> {
        if !self.log_store.exists() {
            return Err(Error::NotFound(format!("no change log for dataset {:?}", self.data_name)));
        }
        let log = self.log_store.read()?;
        Ok(changelog::tail(&log, anchor_hash))
    }
}

/// Delete a dataset's data directory (index + log), leaving its schema and
/// key untouched (`spec.md` §5.5's `purge_data`).
pub fn purge(base_dir: &Path, data_name: &str) -> Result<()> {
    validate_data_name(data_name)?;
    let paths = DatasetPaths::new(base_dir, data_name);
    if let Some(dir) = paths.index.parent() {
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use rand::rngs::OsRng;
    use std::{str::FromStr, sync::Arc};

    fn dataset(mem: &Arc<MemStore>, name: &str) -> Dataset {
        Dataset::from_stores(
            name,
            Box::new(mem.slot(&format!("{name}/schema"))),
            Box::new(mem.slot(&format!("{name}/key"))),
            Box::new(mem.slot(&format!("{name}/index"))),
            Box::new(mem.slot(&format!("{name}/log"))),
        )
        .unwrap()
    }

    fn create(mem: &Arc<MemStore>, name: &str) {
        let mut rng = OsRng;
        Dataset::create(
            &mut rng,
            name,
            Algorithm::Classic,
            RekeyInterval::from_str("7d").unwrap(),
            Box::new(mem.slot(&format!("{name}/schema"))),
            Box::new(mem.slot(&format!("{name}/key"))),
        )
        .unwrap();
    }

    #[test]
    fn reconcile_adds_and_removes() {
        let mem = Arc::new(MemStore::new());
        create(&mem, "iocs");
        let ds = dataset(&mem, "iocs");
        let mut rng = OsRng;

        let source = parse_source(b"evil.com,{\"sev\":5}\nsafe.org,{\"sev\":1}\n");
        let report = ds.reconcile(&mut rng, &source).unwrap();
        assert_eq!(report, ReconcileReport { added: 2, removed: 0, upgraded: 0 });

        let source2 = parse_source(b"evil.com,{\"sev\":5}\nnew.biz,{\"sev\":2}\n");
        let report2 = ds.reconcile(&mut rng, &source2).unwrap();
        assert_eq!(report2, ReconcileReport { added: 1, removed: 1, upgraded: 0 });

        let log = ds.tail(None).unwrap().into_body();
        let lines = changelog::parse(&log);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn reconcile_upgrades_are_silent() {
        let mem = Arc::new(MemStore::new());
        create(&mem, "iocs");
        let ds = dataset(&mem, "iocs");
        let mut rng = OsRng;

        // Seed the index with a metadata-less record directly, bypassing
        // reconcile, to simulate a partially-synced prior run.
        let (prf, _) = oprf::server_evaluate_plaintext(&ds.load_key().unwrap(), "iocs", b"evil.com").unwrap();
        let seed = vec![IndexRecord {
            ioc: "evil.com".to_string(),
            oprf_hex: prf.to_hex(),
            nonce_hex: None,
            ciphertext_hex: None,
        }];
        ds.index_store.write_all(&index::write(&seed)).unwrap();

        let source = parse_source(b"evil.com,{\"sev\":5}\n");
        let report = ds.reconcile(&mut rng, &source).unwrap();
        assert_eq!(report, ReconcileReport { added: 0, removed: 0, upgraded: 1 });

        let log = ds.tail(None).unwrap().into_body();
        assert!(changelog::parse(&log).is_empty(), "upgrade must not emit a log event");
    }

    #[test]
    fn rekey_truncates_log_and_reissues_all() {
        let mem = Arc::new(MemStore::new());
        create(&mem, "iocs");
        let ds = dataset(&mem, "iocs");
        let mut rng = OsRng;

        let source = parse_source(b"evil.com,{}\nsafe.org,{}\n");
        ds.reconcile(&mut rng, &source).unwrap();
        let before_key = ds.load_key().unwrap();

        let report = ds.rekey(&mut rng, &source).unwrap();
        assert_eq!(report, ReconcileReport { added: 2, removed: 0, upgraded: 0 });

        let after_key = ds.load_key().unwrap();
        assert_ne!(before_key.0, after_key.0);

        let log = ds.tail(None).unwrap().into_body();
        assert_eq!(changelog::parse(&log).len(), 2);
    }
}
