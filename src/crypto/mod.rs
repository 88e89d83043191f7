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

pub mod aead;
pub mod oprf;
pub mod types;

pub use types::{Nonce24, Point32, Prf64, Scalar32};

/// Wire-level names the `describe` endpoint must return for a healthy
/// classic-algorithm dataset. A client refuses to proceed if these don't
/// match exactly (`spec.md` §4.5 step 2, `Error::ProtocolMismatch`).
pub const SUITE: &str = "oprf-ristretto255-sha512";
pub const ENCRYPTION: &str = "xchacha20poly1305-ietf";
