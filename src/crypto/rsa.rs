// Copyright 2024, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! RSASSA-PKCS1-v1_5 verification against pre-encoded public keys.
//!
//! Keys arrive in the vbmeta wire format
//! `[key_num_bits: u32][n0inv: u32][n: BE bytes][rr: BE bytes]` where
//! `n0inv = -1/n[0] mod 2^32` and `rr = R^2 mod n` with
//! `R = 2^key_num_bits`. Having the Montgomery parameters precomputed lets
//! the verifier run with nothing but fixed-size limb buffers and a single
//! modular exponentiation with exponent 65537.

use crate::crypto::sha::HashAlgorithm;
use alloc::vec;
use alloc::vec::Vec;

/// Supported key sizes in bits.
const SUPPORTED_KEY_BITS: [u32; 3] = [2048, 4096, 8192];

/// PKCS#1 v1.5 DigestInfo prefixes, keyed by hash algorithm.
const DIGEST_INFO: [(HashAlgorithm, &[u8]); 2] = [
    (
        HashAlgorithm::Sha256,
        &[
            0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x01, 0x05, 0x00, 0x04, 0x20,
        ],
    ),
    (
        HashAlgorithm::Sha512,
        &[
            0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x03, 0x05, 0x00, 0x04, 0x40,
        ],
    ),
];

/// An RSA public key decoded from the pre-encoded vbmeta layout.
///
/// Limbs are stored least-significant first; every buffer is
/// `key_num_bits / 32` limbs long.
pub struct RsaPublicKey {
    num_bits: u32,
    n0inv: u32,
    n: Vec<u32>,
    rr: Vec<u32>,
}

impl RsaPublicKey {
    /// Decodes a pre-encoded public key blob.
    ///
    /// Returns `None` if the blob is truncated, the key size is not one of
    /// 2048/4096/8192 bits, or the Montgomery parameters are inconsistent
    /// with the modulus.
    pub fn parse(blob: &[u8]) -> Option<Self> {
        let num_bits = u32::from_be_bytes(blob.get(0..4)?.try_into().ok()?);
        let n0inv = u32::from_be_bytes(blob.get(4..8)?.try_into().ok()?);
        if !SUPPORTED_KEY_BITS.contains(&num_bits) {
            return None;
        }
        let num_bytes = num_bits as usize / 8;
        if blob.len() != 8 + 2 * num_bytes {
            return None;
        }
        let n = limbs_from_be(&blob[8..8 + num_bytes]);
        let rr = limbs_from_be(&blob[8 + num_bytes..]);
        // The modulus must be odd and n0inv must really be -1/n[0] mod 2^32.
        if n[0] & 1 == 0 || n0inv.wrapping_mul(n[0]) != u32::MAX {
            return None;
        }
        Some(Self { num_bits, n0inv, n, rr })
    }

    /// Key size in bits.
    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    /// Size in bytes of a signature made with this key.
    pub fn signature_size(&self) -> usize {
        self.num_bits as usize / 8
    }

    /// Verifies a PKCS#1 v1.5 signature over a message digest.
    ///
    /// `digest` must be the raw hash of the signed data, computed with
    /// `algorithm`. All inputs are public; the comparison need not be
    /// constant-time.
    pub fn verify_pkcs1(
        &self,
        algorithm: HashAlgorithm,
        digest: &[u8],
        signature: &[u8],
    ) -> bool {
        if digest.len() != algorithm.digest_size() || signature.len() != self.signature_size() {
            return false;
        }
        let Some(expected) = self.pkcs1_encode(algorithm, digest) else {
            return false;
        };
        let decrypted = self.mod_pow_65537(&limbs_from_be(signature));
        limbs_to_be(&decrypted) == expected
    }

    /// Builds the expected EMSA-PKCS1-v1_5 encoded message
    /// `00 01 FF..FF 00 DigestInfo digest`.
    fn pkcs1_encode(&self, algorithm: HashAlgorithm, digest: &[u8]) -> Option<Vec<u8>> {
        let digest_info = DIGEST_INFO.iter().find(|(a, _)| *a == algorithm).map(|(_, p)| *p)?;
        let em_len = self.signature_size();
        let ps_len = em_len.checked_sub(3 + digest_info.len() + digest.len())?;
        if ps_len < 8 {
            return None;
        }
        let mut em = Vec::with_capacity(em_len);
        em.push(0x00);
        em.push(0x01);
        em.resize(2 + ps_len, 0xff);
        em.push(0x00);
        em.extend_from_slice(digest_info);
        em.extend_from_slice(digest);
        Some(em)
    }

    /// Computes `input^65537 mod n` via 16 Montgomery squarings and one
    /// final multiplication.
    fn mod_pow_65537(&self, input: &[u32]) -> Vec<u32> {
        let len = self.n.len();
        let mut a_r = vec![0u32; len];
        let mut aa_r = vec![0u32; len];
        // a_r = input * R mod n
        self.mont_mul(&mut a_r, input, &self.rr);
        for _ in 0..8 {
            self.mont_mul(&mut aa_r, &a_r, &a_r);
            self.mont_mul(&mut a_r, &aa_r, &aa_r);
        }
        // result = a_r * input / R mod n = input^65537 mod n
        let mut result = vec![0u32; len];
        self.mont_mul(&mut result, &a_r, input);
        if ge_mod(&result, &self.n) {
            sub_mod(&mut result, &self.n);
        }
        result
    }

    /// Montgomery multiplication: `c = a * b / R mod n`.
    fn mont_mul(&self, c: &mut [u32], a: &[u32], b: &[u32]) {
        c.fill(0);
        for &a_limb in a {
            self.mont_mul_add(c, a_limb, b);
        }
    }

    /// One row of Montgomery multiplication: `c = (c + a*b) / 2^32 mod n`.
    fn mont_mul_add(&self, c: &mut [u32], a: u32, b: &[u32]) {
        let n = &self.n;
        let len = n.len();
        let mut acc = u64::from(a) * u64::from(b[0]) + u64::from(c[0]);
        let d0 = (acc as u32).wrapping_mul(self.n0inv);
        let mut red = u64::from(d0) * u64::from(n[0]) + u64::from(acc as u32);
        for i in 1..len {
            acc = (acc >> 32) + u64::from(a) * u64::from(b[i]) + u64::from(c[i]);
            red = (red >> 32) + u64::from(d0) * u64::from(n[i]) + u64::from(acc as u32);
            c[i - 1] = red as u32;
        }
        acc = (acc >> 32) + (red >> 32);
        c[len - 1] = acc as u32;
        if acc >> 32 != 0 {
            sub_mod(c, n);
        }
    }
}

/// Big-endian bytes to least-significant-first limbs.
fn limbs_from_be(bytes: &[u8]) -> Vec<u32> {
    bytes.chunks_exact(4).rev().map(|c| u32::from_be_bytes(c.try_into().unwrap())).collect()
}

/// Least-significant-first limbs back to big-endian bytes.
fn limbs_to_be(limbs: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(limbs.len() * 4);
    for limb in limbs.iter().rev() {
        out.extend_from_slice(&limb.to_be_bytes());
    }
    out
}

/// `a -= n`, ignoring the final borrow.
fn sub_mod(a: &mut [u32], n: &[u32]) {
    let mut borrow: i64 = 0;
    for (a_limb, n_limb) in a.iter_mut().zip(n) {
        borrow += i64::from(*a_limb) - i64::from(*n_limb);
        *a_limb = borrow as u32;
        borrow >>= 32;
    }
}

/// Whether `a >= n`.
fn ge_mod(a: &[u32], n: &[u32]) -> bool {
    for (a_limb, n_limb) in a.iter().zip(n).rev() {
        if a_limb != n_limb {
            return a_limb > n_limb;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha::digest_parts;
    use openssl::bn::{BigNum, BigNumContext};
    use openssl::hash::MessageDigest;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::sign::Signer;

    /// Pre-encodes an OpenSSL RSA public key into the vbmeta key layout.
    fn encode_public_key(rsa: &Rsa<openssl::pkey::Private>) -> Vec<u8> {
        let mut ctx = BigNumContext::new().unwrap();
        let n = rsa.n();
        let num_bits = n.num_bits() as u32;
        let num_bytes = num_bits as usize / 8;

        // n0inv = -1/n mod 2^32
        let mut shift = BigNum::new().unwrap();
        shift.lshift(&BigNum::from_u32(1).unwrap(), 32).unwrap();
        let mut inv = BigNum::new().unwrap();
        inv.mod_inverse(n, &shift, &mut ctx).unwrap();
        let mut neg = BigNum::new().unwrap();
        neg.checked_sub(&shift, &inv).unwrap();
        let n0inv = u32::from_be_bytes(neg.to_vec_padded(4).unwrap().try_into().unwrap());

        // rr = (2^num_bits)^2 mod n
        let mut r = BigNum::new().unwrap();
        r.lshift(&BigNum::from_u32(1).unwrap(), num_bits as i32).unwrap();
        let mut rr = BigNum::new().unwrap();
        rr.mod_sqr(&r, n, &mut ctx).unwrap();

        let mut blob = Vec::new();
        blob.extend_from_slice(&num_bits.to_be_bytes());
        blob.extend_from_slice(&n0inv.to_be_bytes());
        blob.extend_from_slice(&n.to_vec_padded(num_bytes as i32).unwrap());
        blob.extend_from_slice(&rr.to_vec_padded(num_bytes as i32).unwrap());
        blob
    }

    fn sign(rsa: &Rsa<openssl::pkey::Private>, digest: MessageDigest, data: &[u8]) -> Vec<u8> {
        let pkey = PKey::from_rsa(rsa.clone()).unwrap();
        let mut signer = Signer::new(digest, &pkey).unwrap();
        signer.update(data).unwrap();
        signer.sign_to_vec().unwrap()
    }

    #[test]
    fn verify_sha256_rsa2048_signature() {
        let rsa = Rsa::generate(2048).unwrap();
        let key = RsaPublicKey::parse(&encode_public_key(&rsa)).unwrap();
        let message = b"vbmeta signed region";
        let signature = sign(&rsa, MessageDigest::sha256(), message);
        let digest = digest_parts(HashAlgorithm::Sha256, &[message]);
        assert!(key.verify_pkcs1(HashAlgorithm::Sha256, digest.as_bytes(), &signature));
    }

    #[test]
    fn verify_sha512_rsa4096_signature() {
        let rsa = Rsa::generate(4096).unwrap();
        let key = RsaPublicKey::parse(&encode_public_key(&rsa)).unwrap();
        let message = b"another signed region";
        let signature = sign(&rsa, MessageDigest::sha512(), message);
        let digest = digest_parts(HashAlgorithm::Sha512, &[message]);
        assert!(key.verify_pkcs1(HashAlgorithm::Sha512, digest.as_bytes(), &signature));
    }

    #[test]
    fn corrupted_signature_is_rejected() {
        let rsa = Rsa::generate(2048).unwrap();
        let key = RsaPublicKey::parse(&encode_public_key(&rsa)).unwrap();
        let message = b"corrupt me";
        let mut signature = sign(&rsa, MessageDigest::sha256(), message);
        signature[17] ^= 0x01;
        let digest = digest_parts(HashAlgorithm::Sha256, &[message]);
        assert!(!key.verify_pkcs1(HashAlgorithm::Sha256, digest.as_bytes(), &signature));
    }

    #[test]
    fn wrong_hash_algorithm_is_rejected() {
        let rsa = Rsa::generate(2048).unwrap();
        let key = RsaPublicKey::parse(&encode_public_key(&rsa)).unwrap();
        let message = b"mismatched algorithms";
        let signature = sign(&rsa, MessageDigest::sha256(), message);
        let digest = digest_parts(HashAlgorithm::Sha512, &[message]);
        assert!(!key.verify_pkcs1(HashAlgorithm::Sha512, digest.as_bytes(), &signature));
    }

    #[test]
    fn truncated_or_inconsistent_key_is_rejected() {
        let rsa = Rsa::generate(2048).unwrap();
        let blob = encode_public_key(&rsa);
        assert!(RsaPublicKey::parse(&blob[..blob.len() - 1]).is_none());

        let mut bad_n0inv = blob.clone();
        bad_n0inv[5] ^= 0xff;
        assert!(RsaPublicKey::parse(&bad_n0inv).is_none());

        let mut bad_bits = blob;
        bad_bits[3] = 0x37;
        assert!(RsaPublicKey::parse(&bad_bits).is_none());
    }
}
