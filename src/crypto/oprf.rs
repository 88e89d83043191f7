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

//! OPRF(ristretto255, SHA-512), following RFC 9497's VOPRF base-mode math
//! without the proof-of-correctness extension (the suite name in the wire
//! protocol is `oprf-ristretto255-sha512`, matching the reference server).

use curve25519_dalek::{ristretto::CompressedRistretto, RistrettoPoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};

use crate::{
    crypto::types::{Point32, Prf64, Scalar32},
    error::{Error, Result},
};

fn hash_to_group(data_name: &str, input: &[u8]) -> RistrettoPoint {
    let mut hasher = Sha512::new();
    hasher.update(data_name.as_bytes());
    hasher.update(input);
    let wide: [u8; 64] = hasher.finalize().into();
    RistrettoPoint::from_uniform_bytes(&wide)
}

fn finalize(data_name: &str, input: &[u8], q_encoded: &[u8; 32]) -> Prf64 {
    let mut hasher = Sha512::new();
    hasher.update(data_name.as_bytes());
    hasher.update(b"-FINALIZE");
    hasher.update(input);
    hasher.update(q_encoded);
    let digest: [u8; 64] = hasher.finalize().into();
    Prf64(digest)
}

fn decode_point(bytes: &[u8; 32]) -> Result<RistrettoPoint> {
    CompressedRistretto(*bytes).decompress().ok_or(Error::InvalidPoint)
}

fn decode_scalar(bytes: &[u8; 32]) -> Result<Scalar> {
    Option::<Scalar>::from(Scalar::from_canonical_bytes(*bytes)).ok_or(Error::InvalidPoint)
}

/// Server-side offline evaluation over a known plaintext IOC: used by the
/// reconciler to populate the index. Returns `(prf, Q_encoded)`.
pub fn server_evaluate_plaintext(
    server_key: &Scalar32,
    data_name: &str,
    ioc: &[u8],
) -> Result<(Prf64, Point32)> {
    let k = decode_scalar(&server_key.0)?;
    let p = hash_to_group(data_name, ioc);
    let q = k * p;
    let q_encoded = q.compress().to_bytes();
    let prf = finalize(data_name, ioc, &q_encoded);
    Ok((prf, Point32(q_encoded)))
}

/// Server-side online blinded evaluation: `k * B`. This is what the query
/// responder's `evaluate` handler does; it never sees the plaintext IOC.
pub fn server_evaluate_blinded(server_key: &Scalar32, blinded: &Point32) -> Result<Point32> {
    let k = decode_scalar(&server_key.0)?;
    let b = decode_point(&blinded.0)?;
    let e = k * b;
    Ok(Point32(e.compress().to_bytes()))
}

/// Client blinding: sample a random non-zero scalar `r` and compute
/// `B = r * H1(data_name, ioc)`. Returns `(r, B)`.
pub fn client_blind<R: RngCore + CryptoRng>(
    rng: &mut R,
    data_name: &str,
    ioc: &[u8],
) -> (Scalar32, Point32) {
    let p = hash_to_group(data_name, ioc);
    let mut r = Scalar::random(rng);
    while r == Scalar::ZERO {
        r = Scalar::random(rng);
    }
    let b = r * p;
    (Scalar32(r.to_bytes()), Point32(b.compress().to_bytes()))
}

/// Client unblinding + finalize: given the server's evaluation `E` and the
/// blinding scalar `r` used to produce the request, recover `Q = r^-1 * E`
/// and derive the PRF output. Returns `(prf, Q_encoded)` — `Q` is needed
/// again for metadata-key derivation.
pub fn client_finalize(
    r: &Scalar32,
    data_name: &str,
    ioc: &[u8],
    evaluated: &Point32,
) -> Result<(Prf64, Point32)> {
    let r_scalar = decode_scalar(&r.0)?;
    let e = decode_point(&evaluated.0)?;
    let r_inv = r_scalar.invert();
    let q = r_inv * e;
    let q_encoded = q.compress().to_bytes();
    let prf = finalize(data_name, ioc, &q_encoded);
    Ok((prf, Point32(q_encoded)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn key() -> Scalar32 {
        let mut rng = OsRng;
        Scalar32(Scalar::random(&mut rng).to_bytes())
    }

    #[test]
    fn commutativity_client_equals_server() {
        let k = key();
        let data_name = "iocs";
        let ioc = b"evil.com";

        let (server_prf, _) = server_evaluate_plaintext(&k, data_name, ioc).unwrap();

        let mut rng = OsRng;
        let (r, b) = client_blind(&mut rng, data_name, ioc);
        let e = server_evaluate_blinded(&k, &b).unwrap();
        let (client_prf, _) = client_finalize(&r, data_name, ioc, &e).unwrap();

        assert_eq!(server_prf.0, client_prf.0);
    }

    #[test]
    fn different_iocs_give_different_prfs() {
        let k = key();
        let (p1, _) = server_evaluate_plaintext(&k, "iocs", b"evil.com").unwrap();
        let (p2, _) = server_evaluate_plaintext(&k, "iocs", b"safe.com").unwrap();
        assert_ne!(p1.0, p2.0);
    }

    #[test]
    fn invalid_point_rejected() {
        let k = key();
        // All-0xFF is not a valid canonical ristretto255 encoding.
        let bogus = Point32([0xffu8; 32]);
        assert!(server_evaluate_blinded(&k, &bogus).is_err());
    }

    #[test]
    fn rekey_unlinkability() {
        let k1 = key();
        let k2 = key();
        let (p1, _) = server_evaluate_plaintext(&k1, "iocs", b"evil.com").unwrap();
        let (p2, _) = server_evaluate_plaintext(&k2, "iocs", b"evil.com").unwrap();
        assert_ne!(p1.0, p2.0);
    }
}
