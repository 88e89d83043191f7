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

//! `index.csv`: the server-side map from plaintext IOC to its OPRF output
//! and encrypted metadata. This file never leaves the server — only the
//! change log (keyed by OPRF output, never the plaintext) is shipped to
//! clients. A record missing its encrypted metadata is a reconcile-time
//! `to_upgrade` candidate (`spec.md` §5.3): the IOC is still current, but
//! the server has no encrypted metadata on file for it yet.

use crate::error::{Error, Result};

/// One row, in source order (order is preserved across reconciles so a
/// diff against the previous run is stable).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexRecord {
    pub ioc: String,
    pub oprf_hex: String,
    pub nonce_hex: Option<String>,
    pub ciphertext_hex: Option<String>,
}

impl IndexRecord {
    pub fn has_metadata(&self) -> bool {
        self.nonce_hex.is_some() && self.ciphertext_hex.is_some()
    }

    pub fn enc_meta(&self) -> Option<String> {
        match (&self.nonce_hex, &self.ciphertext_hex) {
            (Some(n), Some(c)) => Some(format!("{n}:{c}")),
            _ => None,
        }
    }
}

/// Serialize records to `index.csv` bytes, one record per line:
/// `ioc,oprf_hex[,nonce_hex,ciphertext_hex]`. The metadata fields are
/// omitted (not placeholder-filled) when absent, matching the reference
/// server's writer so a partially-upgraded index stays visually obvious.
pub fn write(records: &[IndexRecord]) -> Vec<u8> {
    let mut out = String::new();
    for r in records {
        match (&r.nonce_hex, &r.ciphertext_hex) {
            (Some(n), Some(c)) => out.push_str(&format!("{},{},{},{}\n", r.ioc, r.oprf_hex, n, c)),
            _ => out.push_str(&format!("{},{}\n", r.ioc, r.oprf_hex)),
        }
    }
    out.into_bytes()
}

/// Parse `index.csv` bytes. Accepts both the 2-field legacy form
/// (`ioc,oprf_hex`, no metadata yet) and the 4-field form
/// (`ioc,oprf_hex,nonce_hex,ciphertext_hex`).
pub fn parse(bytes: &[u8]) -> Result<Vec<IndexRecord>> {
    let text = String::from_utf8_lossy(bytes);
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let record = match parts.as_slice() {
            [ioc, oprf_hex] => {
                IndexRecord { ioc: ioc.to_string(), oprf_hex: oprf_hex.to_string(), nonce_hex: None, ciphertext_hex: None }
            }
            [ioc, oprf_hex, nonce, ciphertext] => IndexRecord {
                ioc: ioc.to_string(),
                oprf_hex: oprf_hex.to_string(),
                nonce_hex: Some(nonce.to_string()),
                ciphertext_hex: Some(ciphertext.to_string()),
            },
            _ => {
                return Err(Error::InvalidInput(format!("index.csv line {lineno}: wrong field count")))
            }
        };
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_four_field_form() {
        let records = vec![IndexRecord {
            ioc: "evil.com".to_string(),
            oprf_hex: "aa".repeat(64),
            nonce_hex: Some("bb".repeat(24)),
            ciphertext_hex: Some("cc".repeat(10)),
        }];
        let bytes = write(&records);
        assert_eq!(parse(&bytes).unwrap(), records);
    }

    #[test]
    fn writes_two_field_form_when_metadata_absent() {
        let records = vec![IndexRecord {
            ioc: "evil.com".to_string(),
            oprf_hex: "aa".repeat(64),
            nonce_hex: None,
            ciphertext_hex: None,
        }];
        let bytes = write(&records);
        assert_eq!(String::from_utf8(bytes).unwrap(), format!("evil.com,{}\n", "aa".repeat(64)));
    }

    #[test]
    fn to_upgrade_detection_via_missing_metadata() {
        let bytes = b"evil.com,aaaa\nsafe.com,bbbb,cccc,dddd\n".to_vec();
        let records = parse(&bytes).unwrap();
        assert!(!records[0].has_metadata());
        assert!(records[1].has_metadata());
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(parse(b"a,b,c\n").is_err());
    }
}
