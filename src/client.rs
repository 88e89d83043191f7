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

//! The client protocol engine (C5): replaying a dataset's change log into
//! an active set, querying it against a server, and reconstructing state
//! from scratch on a full replay. [`ServerApi`] is the transport seam —
//! `client`'s binary implements it over `surf`; tests implement it in
//! memory.

use std::collections::HashMap;

use rand_core::{CryptoRng, RngCore};

use crate::{
    changelog::{self, ChangeEvent},
    crypto::{
        aead,
        oprf,
        types::{Nonce24, Point32},
        ENCRYPTION, SUITE,
    },
    error::{Error, Result},
};

/// What a server's `describe` returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Describe {
    pub suite: String,
    pub encryption: String,
}

/// What a server's `sync` returned: a delta (`is_full = false`) to append,
/// or a full log (`is_full = true`) that replaces local state entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTail {
    pub is_full: bool,
    pub body: Vec<u8>,
}

/// The three server operations a client needs, independent of transport.
pub trait ServerApi {
    fn describe(&self, data_name: &str) -> Result<Describe>;
    fn sync_tail(&self, data_name: &str, anchor_hash: Option<&str>) -> Result<SyncTail>;
    fn evaluate(&self, data_name: &str, blinded: &Point32) -> Result<Point32>;
}

/// Local replica of one dataset's change log, plus the active-set index
/// derived from replaying it.
#[derive(Default, Clone)]
pub struct ClientReplica {
    log: Vec<u8>,
}

impl ClientReplica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_log(log: Vec<u8>) -> Self {
        Self { log }
    }

    pub fn log_bytes(&self) -> &[u8] {
        &self.log
    }

    fn last_hash(&self) -> Option<String> {
        changelog::parse(&self.log).last().map(|l| l.hash.clone())
    }

    /// Reconstruct the active set (OPRF hex -> encrypted metadata) by
    /// replaying ADDED/REMOVED events in log order.
    pub fn active_set(&self) -> HashMap<String, (Nonce24, Vec<u8>)> {
        let mut active = HashMap::new();
        apply_active_set_delta(&mut active, &self.log);
        active
    }

    /// Fetch the tail after our last known hash and fold it into local
    /// state: append on a delta, replace wholesale on a full reply (which
    /// also covers the anchor-not-found fallback, `spec.md` §4.4). Returns
    /// the raw tail payload, for callers that keep an audit trail of each
    /// sync response (`spec.md` §6's `delta-*.log`/`full-*.log` files).
    pub fn sync_fetch(&mut self, api: &dyn ServerApi, data_name: &str) -> Result<SyncTail> {
        let anchor = self.last_hash();
        let tail = api.sync_tail(data_name, anchor.as_deref())?;
        if tail.is_full {
            self.log = tail.body.clone();
        } else {
            self.log = changelog_concat(&self.log, &tail.body);
        }
        Ok(tail)
    }

    /// Like [`sync_fetch`](Self::sync_fetch), discarding the raw payload.
    pub fn sync(&mut self, api: &dyn ServerApi, data_name: &str) -> Result<bool> {
        Ok(self.sync_fetch(api, data_name)?.is_full)
    }

    /// Discard all local state for this dataset, forcing the next `sync`
    /// to request (and fully trust) a fresh full replay.
    pub fn reset(&mut self) {
        self.log.clear();
    }

    /// Blind `ioc`, have the server evaluate it, and unblind/finalize.
    /// Split out from [`query`](Self::query) so a caller that maintains its
    /// own persisted active-set index (`spec.md` §6's `active_index.csv`)
    /// can look the result up there instead of always replaying the full
    /// log — see `client`'s binary for that fallback.
    pub fn evaluate_ioc<R: RngCore + CryptoRng>(
        &self,
        api: &dyn ServerApi,
        rng: &mut R,
        data_name: &str,
        ioc: &[u8],
    ) -> Result<(crate::crypto::types::Prf64, Point32)> {
        let info = api.describe(data_name)?;
        if info.suite != SUITE || info.encryption != ENCRYPTION {
            return Err(Error::ProtocolMismatch);
        }

        let (r, b) = oprf::client_blind(rng, data_name, ioc);
        let e = api.evaluate(data_name, &b)?;
        oprf::client_finalize(&r, data_name, ioc, &e)
    }

    /// Sync, then query a single IOC against the active set replayed from
    /// the local log. Always syncs first so a query never answers against
    /// stale state. Callers that maintain a persisted active-set index
    /// instead of replaying on every query should use [`sync`](Self::sync)
    /// and [`evaluate_ioc`](Self::evaluate_ioc) directly.
    pub fn query<R: RngCore + CryptoRng>(
        &mut self,
        api: &dyn ServerApi,
        rng: &mut R,
        data_name: &str,
        ioc: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        self.sync(api, data_name)?;
        let (prf, q) = self.evaluate_ioc(api, rng, data_name, ioc)?;

        let active = self.active_set();
        let Some((nonce, ct)) = active.get(&prf.to_hex()) else { return Ok(None) };
        let pt = aead::decrypt_metadata(data_name, ioc, &prf, &q, nonce, ct)?;
        Ok(Some(pt))
    }
}

fn changelog_concat(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut out = prefix.to_vec();
    out.extend_from_slice(suffix);
    out
}

/// Apply ADDED/REMOVED events parsed from `delta_bytes` onto an existing
/// active-set map. This is [`ClientReplica::active_set`]'s per-line step,
/// exposed standalone so a caller that persists an active-set index
/// (`spec.md` §6's `active_index.csv`) can update it incrementally from a
/// sync's delta body instead of replaying the whole log every time.
pub fn apply_active_set_delta(active: &mut HashMap<String, (Nonce24, Vec<u8>)>, delta_bytes: &[u8]) {
    for line in changelog::parse(delta_bytes) {
        match line.event {
            ChangeEvent::Added { oprf: Some(oprf), enc_meta: Some(enc_meta) } => {
                if let Some((nonce_hex, ct_hex)) = enc_meta.split_once(':') {
                    if let (Ok(nonce), Ok(ct)) = (Nonce24::from_hex(nonce_hex), hex::decode(ct_hex)) {
                        active.insert(oprf.to_lowercase(), (nonce, ct));
                    }
                }
            }
            ChangeEvent::Added { .. } => {}
            ChangeEvent::Removed { oprf: Some(oprf), .. } => {
                active.remove(&oprf.to_lowercase());
            }
            ChangeEvent::Removed { .. } => {}
        }
    }
}
