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

//! Private set intersection over OPRF(ristretto255-SHA512), with
//! per-record metadata sealed under XChaCha20-Poly1305-IETF and a
//! hash-chained change log for tail/delta sync between one server and many
//! clients.
//!
//! - [`crypto`] — the OPRF and AEAD primitives (C1)
//! - [`changelog`] — the hash-chained log format and tail-retrieval contract (C2)
//! - [`dataset`] — the reconciler: create/reconcile/rekey/purge a dataset (C3)
//! - [`server`] — the transport-free query responder (C4)
//! - [`client`] — the transport-free client replica + sync/query engine (C5)

pub mod changelog;
pub mod client;
pub mod crypto;
pub mod dataset;
pub mod error;
pub mod index;
pub mod schema;
pub mod server;
pub mod store;

pub use error::{Error, Result};
