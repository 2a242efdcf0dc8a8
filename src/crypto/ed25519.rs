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

//! Ed25519 signatures (RFC 8032).
//!
//! Signing is deterministic from a 32-byte seed; transparency-log root
//! signatures are verified with [`verify`]. The group arithmetic runs in
//! constant time for all secret-dependent operations.

use ring::signature::{self, KeyPair};

/// Ed25519 seed size in bytes.
pub const ED25519_SEED_SIZE: usize = 32;
/// Ed25519 public key size in bytes.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;
/// Ed25519 signature size in bytes.
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// Derives the public key for a seed.
pub fn public_key(seed: &[u8; ED25519_SEED_SIZE]) -> Option<[u8; ED25519_PUBLIC_KEY_SIZE]> {
    let key_pair = signature::Ed25519KeyPair::from_seed_unchecked(seed).ok()?;
    key_pair.public_key().as_ref().try_into().ok()
}

/// Signs `message` with the key derived from `seed`.
pub fn sign(seed: &[u8; ED25519_SEED_SIZE], message: &[u8]) -> Option<[u8; ED25519_SIGNATURE_SIZE]> {
    let key_pair = signature::Ed25519KeyPair::from_seed_unchecked(seed).ok()?;
    key_pair.sign(message).as_ref().try_into().ok()
}

/// Verifies an Ed25519 signature. Accepts slices so on-wire fields can be
/// passed directly; wrong-sized inputs simply fail.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    if public_key.len() != ED25519_PUBLIC_KEY_SIZE || signature.len() != ED25519_SIGNATURE_SIZE {
        return false;
    }
    signature::UnparsedPublicKey::new(&signature::ED25519, public_key)
        .verify(message, signature)
        .is_ok()
}
