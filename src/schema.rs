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

//! The per-dataset schema: which OPRF suite it runs and how often it rekeys.
//! Only [`Algorithm::Classic`] is implemented end-to-end; `Ot` is accepted by
//! `create` so schema files from a mixed deployment round-trip, but any
//! attempt to actually run it fails with [`Error::UnsupportedAlgorithm`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Classic,
    Ot,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Classic => "classic",
            Algorithm::Ot => "ot",
        }
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "classic" => Ok(Algorithm::Classic),
            "ot" => Ok(Algorithm::Ot),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A rekey interval of the form `<N>d`, `N >= 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RekeyInterval(pub u32);

impl RekeyInterval {
    pub fn days(&self) -> u32 {
        self.0
    }
}

impl FromStr for RekeyInterval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_suffix('d').ok_or_else(|| {
            Error::InvalidInput(format!("rekey_interval must match ^\\d+d$, got {s:?}"))
        })?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidInput(format!(
                "rekey_interval must match ^\\d+d$, got {s:?}"
            )));
        }
        let n: u32 =
            digits.parse().map_err(|_| Error::InvalidInput(format!("rekey_interval out of range: {s:?}")))?;
        if n < 1 {
            return Err(Error::InvalidInput("rekey_interval must be >= 1d".to_string()));
        }
        Ok(RekeyInterval(n))
    }
}

impl fmt::Display for RekeyInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.0)
    }
}

impl Serialize for RekeyInterval {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RekeyInterval {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        RekeyInterval::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// `schema.json` contents, per `spec.md` §6.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub data_name: String,
    pub supported_algorithm: Algorithm,
    pub rekey_interval: RekeyInterval,
}

impl Schema {
    pub fn new(data_name: impl Into<String>, algorithm: Algorithm, rekey_interval: RekeyInterval) -> Result<Self> {
        let data_name = data_name.into();
        crate::store::validate_data_name(&data_name)?;
        Ok(Self { data_name, supported_algorithm: algorithm, rekey_interval })
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Ensure this dataset's algorithm is one the engine can actually run.
    pub fn require_classic(&self) -> Result<()> {
        match self.supported_algorithm {
            Algorithm::Classic => Ok(()),
            Algorithm::Ot => Err(Error::UnsupportedAlgorithm(self.supported_algorithm.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rekey_interval_parses() {
        assert_eq!(RekeyInterval::from_str("30d").unwrap().days(), 30);
        assert_eq!(RekeyInterval::from_str("1d").unwrap().days(), 1);
    }

    #[test]
    fn rekey_interval_rejects_malformed() {
        assert!(RekeyInterval::from_str("0d").is_err());
        assert!(RekeyInterval::from_str("30").is_err());
        assert!(RekeyInterval::from_str("d30").is_err());
        assert!(RekeyInterval::from_str("-3d").is_err());
    }

    #[test]
    fn schema_round_trips_through_json() {
        let schema =
            Schema::new("iocs", Algorithm::Classic, RekeyInterval::from_str("7d").unwrap()).unwrap();
        let bytes = schema.to_json_bytes().unwrap();
        let back = Schema::from_json_bytes(&bytes).unwrap();
        assert_eq!(schema, back);
    }

    #[test]
    fn ot_algorithm_rejected_at_runtime() {
        let schema =
            Schema::new("iocs", Algorithm::Ot, RekeyInterval::from_str("7d").unwrap()).unwrap();
        assert!(schema.require_classic().is_err());
    }

    #[test]
    fn invalid_data_name_rejected() {
        assert!(Schema::new("bad name!", Algorithm::Classic, RekeyInterval::from_str("7d").unwrap())
            .is_err());
    }
}
