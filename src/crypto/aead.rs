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

//! Per-record metadata encryption: HKDF-SHA512 key derivation from the OPRF
//! output, then XChaCha20-Poly1305-IETF with the IOC itself as AAD.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand_core::{CryptoRng, RngCore};
use sha2::Sha512;

use crate::{
    crypto::types::{Nonce24, Point32, Prf64},
    error::{Error, Result},
};

const HKDF_SALT: [u8; 64] = [0u8; 64];

fn derive_key(data_name: &str, prf: &Prf64, q: &Point32) -> [u8; 32] {
    let mut ikm = Vec::with_capacity(64 + 32);
    ikm.extend_from_slice(&prf.0);
    ikm.extend_from_slice(&q.0);

    let info = format!("meta|{data_name}");
    let hk = Hkdf::<Sha512>::new(Some(&HKDF_SALT), &ikm);
    let mut key = [0u8; 32];
    hk.expand(info.as_bytes(), &mut key).expect("32 is a valid HKDF-SHA512 output length");
    key
}

/// Encrypt `metadata` under a key derived from `(prf, q)`, with `ioc` as AAD.
/// Returns `(nonce, ciphertext || tag)`.
pub fn encrypt_metadata<R: RngCore + CryptoRng>(
    rng: &mut R,
    data_name: &str,
    ioc: &[u8],
    prf: &Prf64,
    q: &Point32,
    metadata: &[u8],
) -> Result<(Nonce24, Vec<u8>)> {
    let key = derive_key(data_name, prf, q);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));

    let mut nonce_bytes = [0u8; 24];
    rng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ct = cipher
        .encrypt(nonce, Payload { msg: metadata, aad: ioc })
        .map_err(|_| Error::AuthFailure)?;
    Ok((Nonce24(nonce_bytes), ct))
}

/// Decrypt metadata previously produced by [`encrypt_metadata`]. Fails with
/// [`Error::AuthFailure`] on any tag mismatch (wrong key, wrong AAD, or
/// corrupted ciphertext).
pub fn decrypt_metadata(
    data_name: &str,
    ioc: &[u8],
    prf: &Prf64,
    q: &Point32,
    nonce: &Nonce24,
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let key = derive_key(data_name, prf, q);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    let nonce = XNonce::from_slice(&nonce.0);

    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad: ioc })
        .map_err(|_| Error::AuthFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::oprf;
    use rand::rngs::OsRng;

    #[test]
    fn round_trip() {
        let mut rng = OsRng;
        let prf = Prf64([7u8; 64]);
        let q = Point32([9u8; 32]);
        let (nonce, ct) =
            encrypt_metadata(&mut rng, "iocs", b"evil.com", &prf, &q, br#"{"desc":"bad"}"#).unwrap();
        let pt = decrypt_metadata("iocs", b"evil.com", &prf, &q, &nonce, &ct).unwrap();
        assert_eq!(pt, br#"{"desc":"bad"}"#);
    }

    #[test]
    fn aad_binding_rejects_tampered_ioc() {
        let mut rng = OsRng;
        let prf = Prf64([1u8; 64]);
        let q = Point32([2u8; 32]);
        let (nonce, ct) = encrypt_metadata(&mut rng, "iocs", b"evil.com", &prf, &q, b"secret").unwrap();
        let err = decrypt_metadata("iocs", b"evjl.com", &prf, &q, &nonce, &ct).unwrap_err();
        assert!(matches!(err, Error::AuthFailure));
    }

    #[test]
    fn key_matches_server_and_client_paths() {
        let mut rng = OsRng;
        let server_key = {
            use curve25519_dalek::Scalar;
            crate::crypto::types::Scalar32(Scalar::random(&mut rng).to_bytes())
        };
        let data_name = "iocs";
        let ioc = b"evil.com";

        let (server_prf, server_q) = oprf::server_evaluate_plaintext(&server_key, data_name, ioc).unwrap();
        let (r, b) = oprf::client_blind(&mut rng, data_name, ioc);
        let e = oprf::server_evaluate_blinded(&server_key, &b).unwrap();
        let (client_prf, client_q) = oprf::client_finalize(&r, data_name, ioc, &e).unwrap();

        let (nonce, ct) =
            encrypt_metadata(&mut rng, data_name, ioc, &server_prf, &server_q, b"payload").unwrap();
        let pt = decrypt_metadata(data_name, ioc, &client_prf, &client_q, &nonce, &ct).unwrap();
        assert_eq!(pt, b"payload");
    }
}
