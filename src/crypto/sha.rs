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

//! SHA-256 and SHA-512 streaming digests.

use ring::digest;

/// SHA-256 digest size in bytes.
pub const SHA256_DIGEST_SIZE: usize = 32;
/// SHA-512 digest size in bytes.
pub const SHA512_DIGEST_SIZE: usize = 64;

/// Digest algorithms used by vbmeta images and descriptors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Digest size in bytes.
    pub const fn digest_size(self) -> usize {
        match self {
            Self::Sha256 => SHA256_DIGEST_SIZE,
            Self::Sha512 => SHA512_DIGEST_SIZE,
        }
    }

    /// The on-wire algorithm name, as carried in descriptors.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Maps an on-wire algorithm name to the algorithm.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    fn ring_algorithm(self) -> &'static digest::Algorithm {
        match self {
            Self::Sha256 => &digest::SHA256,
            Self::Sha512 => &digest::SHA512,
        }
    }
}

/// A finished digest. Holds the bytes inline; no allocation.
#[derive(Clone, Copy, Debug)]
pub struct Digest {
    bytes: [u8; SHA512_DIGEST_SIZE],
    size: usize,
}

impl Digest {
    /// The digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.size]
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Digest {}

/// Streaming digest context.
///
/// Feed data with [`HashContext::update`] and consume the context with
/// [`HashContext::finish`]; a finished context cannot be reused.
pub struct HashContext {
    inner: digest::Context,
    algorithm: HashAlgorithm,
}

impl HashContext {
    /// Starts a new digest computation.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { inner: digest::Context::new(algorithm.ring_algorithm()), algorithm }
    }

    /// Adds `data` to the running digest.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalizes and returns the digest.
    pub fn finish(self) -> Digest {
        let value = self.inner.finish();
        let mut bytes = [0u8; SHA512_DIGEST_SIZE];
        let size = self.algorithm.digest_size();
        bytes[..size].copy_from_slice(value.as_ref());
        Digest { bytes, size }
    }
}

/// One-shot digest over the concatenation of `parts`.
pub fn digest_parts(algorithm: HashAlgorithm, parts: &[&[u8]]) -> Digest {
    let mut ctx = HashContext::new(algorithm);
    for part in parts {
        ctx.update(part);
    }
    ctx.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty_input() {
        let digest = digest_parts(HashAlgorithm::Sha256, &[]);
        assert_eq!(
            hex::encode(digest.as_bytes()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_abc() {
        let digest = digest_parts(HashAlgorithm::Sha256, &[b"abc"]);
        assert_eq!(
            hex::encode(digest.as_bytes()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha512_abc() {
        let digest = digest_parts(HashAlgorithm::Sha512, &[b"abc"]);
        assert_eq!(
            hex::encode(digest.as_bytes()),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut ctx = HashContext::new(HashAlgorithm::Sha256);
        ctx.update(b"hello ");
        ctx.update(b"world");
        assert_eq!(ctx.finish(), digest_parts(HashAlgorithm::Sha256, &[b"hello world"]));
    }

    #[test]
    fn algorithm_names_round_trip() {
        for alg in [HashAlgorithm::Sha256, HashAlgorithm::Sha512] {
            assert_eq!(HashAlgorithm::from_name(alg.name()), Some(alg));
        }
        assert_eq!(HashAlgorithm::from_name("sha1"), None);
    }
}
