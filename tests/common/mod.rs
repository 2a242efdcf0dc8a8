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

//! Utility functions used by API tests: an in-memory ops double and
//! builders producing signed vbmeta images.

#![allow(dead_code)]

use avbverify::crypto::sha::{digest_parts, HashAlgorithm};
use avbverify::{
    Algorithm, IoError, IoResult, Ops, PublicKeyTrust, PublicKeyValidation, VbmetaImageHeader,
    VBMETA_HEADER_SIZE, VBMETA_MAGIC, VBMETA_VERSION_MAJOR,
};
use openssl::bn::{BigNum, BigNumContext};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use std::collections::HashMap;
use zerocopy::byteorder::{U32, U64};
use zerocopy::{FromZeros, IntoBytes};

/// In-memory ops double backing slot verification tests.
pub struct TestOps<'a> {
    pub partitions: HashMap<String, Vec<u8>>,
    pub preloaded: HashMap<String, &'a [u8]>,
    pub rollback_indexes: HashMap<u32, u64>,
    pub rollback_writes: Vec<(u32, u64)>,
    pub unlocked: bool,
    /// The pre-encoded key blob the root-of-trust oracle accepts.
    pub trusted_key: Option<Vec<u8>>,
    /// Classification the oracle reports for the trusted key.
    pub key_trust: PublicKeyTrust,
    pub oracle_rollback_location: u32,
    pub guids: HashMap<String, String>,
}

impl Default for TestOps<'_> {
    fn default() -> Self {
        Self {
            partitions: HashMap::new(),
            preloaded: HashMap::new(),
            rollback_indexes: HashMap::new(),
            rollback_writes: Vec::new(),
            unlocked: false,
            trusted_key: None,
            key_trust: PublicKeyTrust::DeviceKey,
            oracle_rollback_location: 0,
            guids: HashMap::new(),
        }
    }
}

impl TestOps<'_> {
    pub fn add_partition(&mut self, name: &str, data: Vec<u8>) {
        self.partitions.insert(name.to_string(), data);
    }

    pub fn trust_key(&mut self, key: &SigningKey) {
        self.trusted_key = Some(key.public_key_blob());
    }
}

impl<'a> Ops<'a> for TestOps<'a> {
    fn read_from_partition(
        &mut self,
        partition: &str,
        offset: i64,
        buffer: &mut [u8],
    ) -> IoResult<usize> {
        let data = self.partitions.get(partition).ok_or(IoError::NoSuchPartition)?;
        let len = data.len() as i64;
        let start = if offset < 0 { len + offset } else { offset };
        if start < 0 || start > len {
            return Err(IoError::RangeOutsidePartition);
        }
        let start = start as usize;
        let count = buffer.len().min(data.len() - start);
        buffer[..count].copy_from_slice(&data[start..start + count]);
        Ok(count)
    }

    fn get_preloaded_partition(&mut self, partition: &str) -> IoResult<&'a [u8]> {
        self.preloaded.get(partition).copied().ok_or(IoError::NotImplemented)
    }

    fn validate_vbmeta_public_key(
        &mut self,
        _partition: &str,
        public_key: &[u8],
        _public_key_metadata: Option<&[u8]>,
    ) -> IoResult<PublicKeyValidation> {
        let trust = match &self.trusted_key {
            Some(trusted) if trusted == public_key => self.key_trust,
            _ => PublicKeyTrust::Untrusted,
        };
        Ok(PublicKeyValidation {
            trust,
            rollback_index_location: self.oracle_rollback_location,
        })
    }

    fn read_rollback_index(&mut self, rollback_index_location: u32) -> IoResult<u64> {
        Ok(*self.rollback_indexes.get(&rollback_index_location).unwrap_or(&0))
    }

    fn write_rollback_index(&mut self, rollback_index_location: u32, index: u64) -> IoResult<()> {
        self.rollback_writes.push((rollback_index_location, index));
        self.rollback_indexes.insert(rollback_index_location, index);
        Ok(())
    }

    fn read_is_device_unlocked(&mut self) -> IoResult<bool> {
        Ok(self.unlocked)
    }

    fn get_unique_guid_for_partition(&mut self, partition: &str) -> IoResult<String> {
        Ok(self
            .guids
            .get(partition)
            .cloned()
            .unwrap_or_else(|| format!("0000-guid-{partition}")))
    }

    fn get_size_of_partition(&mut self, partition: &str) -> IoResult<u64> {
        if let Some(data) = self.preloaded.get(partition) {
            return Ok(data.len() as u64);
        }
        self.partitions
            .get(partition)
            .map(|d| d.len() as u64)
            .ok_or(IoError::NoSuchPartition)
    }
}

/// An RSA signing key plus the vbmeta algorithm it signs for.
#[derive(Clone)]
pub struct SigningKey {
    pub algorithm: Algorithm,
    rsa: Rsa<Private>,
}

impl SigningKey {
    pub fn generate(algorithm: Algorithm) -> Self {
        let bits = match algorithm.signature_size() {
            256 => 2048,
            512 => 4096,
            1024 => 8192,
            _ => panic!("algorithm {algorithm:?} cannot sign"),
        };
        Self { algorithm, rsa: Rsa::generate(bits).unwrap() }
    }

    /// Pre-encodes the public half as
    /// `[key_num_bits][n0inv][n: BE][rr: BE]`.
    pub fn public_key_blob(&self) -> Vec<u8> {
        let mut ctx = BigNumContext::new().unwrap();
        let n = self.rsa.n();
        let num_bits = n.num_bits() as u32;
        let num_bytes = num_bits as usize / 8;

        let mut shift = BigNum::new().unwrap();
        shift.lshift(&BigNum::from_u32(1).unwrap(), 32).unwrap();
        let mut inv = BigNum::new().unwrap();
        inv.mod_inverse(n, &shift, &mut ctx).unwrap();
        let mut neg = BigNum::new().unwrap();
        neg.checked_sub(&shift, &inv).unwrap();
        let n0inv = u32::from_be_bytes(neg.to_vec_padded(4).unwrap().try_into().unwrap());

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

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let digest = match self.algorithm.hash_algorithm().unwrap() {
            HashAlgorithm::Sha256 => MessageDigest::sha256(),
            HashAlgorithm::Sha512 => MessageDigest::sha512(),
        };
        let pkey = PKey::from_rsa(self.rsa.clone()).unwrap();
        let mut signer = Signer::new(digest, &pkey).unwrap();
        signer.update(data).unwrap();
        signer.sign_to_vec().unwrap()
    }
}

fn round_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Builds vbmeta images the way the host-side packing tool lays them out:
/// descriptors, then the public key, inside a 64-byte aligned auxiliary
/// block; hash and signature in the authentication block.
pub struct VbmetaBuilder {
    algorithm: Algorithm,
    key: Option<SigningKey>,
    rollback_index: u64,
    rollback_index_location: u32,
    flags: u32,
    descriptors: Vec<u8>,
}

impl VbmetaBuilder {
    pub fn new(key: SigningKey) -> Self {
        Self {
            algorithm: key.algorithm,
            key: Some(key),
            rollback_index: 0,
            rollback_index_location: 0,
            flags: 0,
            descriptors: Vec::new(),
        }
    }

    pub fn unsigned() -> Self {
        Self {
            algorithm: Algorithm::None,
            key: None,
            rollback_index: 0,
            rollback_index_location: 0,
            flags: 0,
            descriptors: Vec::new(),
        }
    }

    pub fn rollback_index(mut self, index: u64) -> Self {
        self.rollback_index = index;
        self
    }

    pub fn rollback_index_location(mut self, location: u32) -> Self {
        self.rollback_index_location = location;
        self
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn descriptor(mut self, descriptor: Vec<u8>) -> Self {
        self.descriptors.extend_from_slice(&descriptor);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut header = VbmetaImageHeader::new_zeroed();
        header.magic = VBMETA_MAGIC;
        header.required_libavb_version_major = U32::new(VBMETA_VERSION_MAJOR);
        header.algorithm_type = U32::new(self.algorithm.to_wire());
        header.rollback_index = U64::new(self.rollback_index);
        header.rollback_index_location = U32::new(self.rollback_index_location);
        header.flags = U32::new(self.flags);
        header.release_string[..13].copy_from_slice(b"avbtool 1.3.0");

        // Auxiliary block: descriptors, then the public key.
        let mut aux = self.descriptors.clone();
        header.descriptors_offset = U64::new(0);
        header.descriptors_size = U64::new(aux.len() as u64);
        if let Some(key) = &self.key {
            let blob = key.public_key_blob();
            header.public_key_offset = U64::new(aux.len() as u64);
            header.public_key_size = U64::new(blob.len() as u64);
            aux.extend_from_slice(&blob);
        }
        aux.resize(round_up(aux.len(), 64), 0);
        header.auxiliary_data_block_size = U64::new(aux.len() as u64);

        // Authentication block: hash then signature.
        let mut auth = Vec::new();
        if let Some(key) = &self.key {
            let hash_algorithm = self.algorithm.hash_algorithm().unwrap();
            let hash_size = hash_algorithm.digest_size();
            let signature_size = self.algorithm.signature_size();
            header.hash_offset = U64::new(0);
            header.hash_size = U64::new(hash_size as u64);
            header.signature_offset = U64::new(hash_size as u64);
            header.signature_size = U64::new(signature_size as u64);
            header.authentication_data_block_size =
                U64::new(round_up(hash_size + signature_size, 64) as u64);

            let mut signed_region = Vec::with_capacity(VBMETA_HEADER_SIZE + aux.len());
            signed_region.extend_from_slice(header.as_bytes());
            signed_region.extend_from_slice(&aux);

            let digest = digest_parts(hash_algorithm, &[&signed_region]);
            auth.extend_from_slice(digest.as_bytes());
            auth.extend_from_slice(&key.sign(&signed_region));
            auth.resize(round_up(auth.len(), 64), 0);
        }

        let mut image = Vec::with_capacity(VBMETA_HEADER_SIZE + auth.len() + aux.len());
        image.extend_from_slice(header.as_bytes());
        image.extend_from_slice(&auth);
        image.extend_from_slice(&aux);
        image
    }
}

pub const HASH_DESCRIPTOR_TAG: u64 = 2;
pub const CHAIN_DESCRIPTOR_TAG: u64 = 4;

/// Encodes a hash descriptor covering `image` salted with `salt`.
pub fn hash_descriptor(partition: &str, image: &[u8], salt: &[u8], flags: u32) -> Vec<u8> {
    let digest = digest_parts(HashAlgorithm::Sha256, &[salt, image]);
    encode_hash_descriptor(
        partition,
        "sha256",
        image.len() as u64,
        salt,
        digest.as_bytes(),
        flags,
    )
}

pub fn encode_hash_descriptor(
    partition: &str,
    hash_algorithm: &str,
    image_size: u64,
    salt: &[u8],
    digest: &[u8],
    flags: u32,
) -> Vec<u8> {
    let mut algorithm = [0u8; 32];
    algorithm[..hash_algorithm.len()].copy_from_slice(hash_algorithm.as_bytes());
    let variable = partition.len() + salt.len() + digest.len();
    let num_bytes_following = round_up(116 + variable, 8);

    let mut out = Vec::new();
    out.extend_from_slice(&HASH_DESCRIPTOR_TAG.to_be_bytes());
    out.extend_from_slice(&(num_bytes_following as u64).to_be_bytes());
    out.extend_from_slice(&image_size.to_be_bytes());
    out.extend_from_slice(&algorithm);
    out.extend_from_slice(&(partition.len() as u32).to_be_bytes());
    out.extend_from_slice(&(salt.len() as u32).to_be_bytes());
    out.extend_from_slice(&(digest.len() as u32).to_be_bytes());
    out.extend_from_slice(&flags.to_be_bytes());
    out.extend_from_slice(&[0u8; 60]);
    out.extend_from_slice(partition.as_bytes());
    out.extend_from_slice(salt);
    out.extend_from_slice(digest);
    out.resize(16 + num_bytes_following, 0);
    out
}

/// Encodes a chain partition descriptor pinning `public_key`.
pub fn chain_descriptor(
    partition: &str,
    rollback_index_location: u32,
    public_key: &[u8],
    flags: u32,
) -> Vec<u8> {
    let variable = partition.len() + public_key.len();
    let num_bytes_following = round_up(76 + variable, 8);

    let mut out = Vec::new();
    out.extend_from_slice(&CHAIN_DESCRIPTOR_TAG.to_be_bytes());
    out.extend_from_slice(&(num_bytes_following as u64).to_be_bytes());
    out.extend_from_slice(&rollback_index_location.to_be_bytes());
    out.extend_from_slice(&(partition.len() as u32).to_be_bytes());
    out.extend_from_slice(&(public_key.len() as u32).to_be_bytes());
    out.extend_from_slice(&flags.to_be_bytes());
    out.extend_from_slice(&[0u8; 60]);
    out.extend_from_slice(partition.as_bytes());
    out.extend_from_slice(public_key);
    out.resize(16 + num_bytes_following, 0);
    out
}

/// Encodes a kernel command line descriptor.
pub fn kernel_cmdline_descriptor(cmdline: &str, flags: u32) -> Vec<u8> {
    let num_bytes_following = round_up(8 + cmdline.len(), 8);
    let mut out = Vec::new();
    out.extend_from_slice(&3u64.to_be_bytes());
    out.extend_from_slice(&(num_bytes_following as u64).to_be_bytes());
    out.extend_from_slice(&flags.to_be_bytes());
    out.extend_from_slice(&(cmdline.len() as u32).to_be_bytes());
    out.extend_from_slice(cmdline.as_bytes());
    out.resize(16 + num_bytes_following, 0);
    out
}

/// Encodes a property descriptor.
pub fn property_descriptor(key: &str, value: &[u8]) -> Vec<u8> {
    let num_bytes_following = round_up(16 + key.len() + value.len() + 2, 8);
    let mut out = Vec::new();
    out.extend_from_slice(&0u64.to_be_bytes());
    out.extend_from_slice(&(num_bytes_following as u64).to_be_bytes());
    out.extend_from_slice(&(key.len() as u64).to_be_bytes());
    out.extend_from_slice(&(value.len() as u64).to_be_bytes());
    out.extend_from_slice(key.as_bytes());
    out.push(0);
    out.extend_from_slice(value);
    out.push(0);
    out.resize(16 + num_bytes_following, 0);
    out
}

/// Parameters for a hashtree descriptor; only what the tests vary.
pub struct HashtreeParams<'a> {
    pub partition: &'a str,
    pub image_size: u64,
    pub tree_offset: u64,
    pub tree_size: u64,
    pub data_block_size: u32,
    pub hash_block_size: u32,
    pub fec_num_roots: u32,
    pub fec_offset: u64,
    pub fec_size: u64,
    pub salt: &'a [u8],
    pub root_digest: &'a [u8],
    pub flags: u32,
}

impl Default for HashtreeParams<'_> {
    fn default() -> Self {
        Self {
            partition: "system",
            image_size: 1 << 20,
            tree_offset: 1 << 20,
            tree_size: 4096,
            data_block_size: 4096,
            hash_block_size: 4096,
            fec_num_roots: 0,
            fec_offset: 0,
            fec_size: 0,
            salt: &[0xaa; 32],
            root_digest: &[0xbb; 32],
            flags: 0,
        }
    }
}

/// Encodes a hashtree descriptor.
pub fn hashtree_descriptor(params: &HashtreeParams) -> Vec<u8> {
    let mut algorithm = [0u8; 32];
    algorithm[..6].copy_from_slice(b"sha256");
    let variable = params.partition.len() + params.salt.len() + params.root_digest.len();
    let num_bytes_following = round_up(164 + variable, 8);

    let mut out = Vec::new();
    out.extend_from_slice(&1u64.to_be_bytes());
    out.extend_from_slice(&(num_bytes_following as u64).to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(&params.image_size.to_be_bytes());
    out.extend_from_slice(&params.tree_offset.to_be_bytes());
    out.extend_from_slice(&params.tree_size.to_be_bytes());
    out.extend_from_slice(&params.data_block_size.to_be_bytes());
    out.extend_from_slice(&params.hash_block_size.to_be_bytes());
    out.extend_from_slice(&params.fec_num_roots.to_be_bytes());
    out.extend_from_slice(&params.fec_offset.to_be_bytes());
    out.extend_from_slice(&params.fec_size.to_be_bytes());
    out.extend_from_slice(&algorithm);
    out.extend_from_slice(&(params.partition.len() as u32).to_be_bytes());
    out.extend_from_slice(&(params.salt.len() as u32).to_be_bytes());
    out.extend_from_slice(&(params.root_digest.len() as u32).to_be_bytes());
    out.extend_from_slice(&params.flags.to_be_bytes());
    out.extend_from_slice(&[0u8; 60]);
    out.extend_from_slice(params.partition.as_bytes());
    out.extend_from_slice(params.salt);
    out.extend_from_slice(params.root_digest);
    out.resize(16 + num_bytes_following, 0);
    out
}
