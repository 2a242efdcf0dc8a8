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

//! Firmware transparency log (AFTL) inclusion proof verification.
//!
//! An AFTL image is appended to a vbmeta image and carries one entry per
//! transparency log: the log URL, the firmware-info leaf, an RFC 6962
//! inclusion proof, and the log's signed root descriptor. Verifying an
//! entry is independent of slot verification; callers opt into
//! transparency enforcement.

use crate::crypto::ed25519;
use crate::crypto::rsa::RsaPublicKey;
use crate::crypto::sha::{digest_parts, HashAlgorithm};
use alloc::vec::Vec;
use core::fmt;
use zerocopy::byteorder::{BigEndian, U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Magic bytes at the start of an AFTL image.
pub const AFTL_MAGIC: [u8; 4] = *b"AFTL";

/// AFTL format major version this library implements.
pub const AFTL_VERSION_MAJOR: u32 = 1;

/// AFTL format minor version this library implements.
pub const AFTL_VERSION_MINOR: u32 = 1;

/// Size in bytes of every hash in an inclusion proof.
pub const AFTL_HASH_SIZE: usize = 32;

const RFC6962_LEAF_PREFIX: u8 = 0x00;
const RFC6962_NODE_PREFIX: u8 = 0x01;

/// AFTL verification error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AftlError {
    /// Malformed image, or an inclusion proof that does not reproduce the
    /// claimed root.
    InvalidMetadata,
    /// A signature or leaf binding check failed.
    Verification,
}

impl fmt::Display for AftlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidMetadata => write!(f, "invalid transparency log metadata"),
            Self::Verification => write!(f, "transparency log verification failure"),
        }
    }
}

/// Result type for AFTL operations.
pub type AftlResult<T> = Result<T, AftlError>;

/// The public key of a transparency log.
///
/// Logs historically signed with RSA-4096; Ed25519 is the modern variant.
/// Both are accepted.
#[derive(Clone, Copy, Debug)]
pub enum LogKey<'a> {
    /// 32-byte Ed25519 public key.
    Ed25519(&'a [u8; 32]),
    /// Pre-encoded RSA-4096 public key; signatures are SHA-256 PKCS#1 v1.5.
    Rsa4096(&'a [u8]),
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct AftlImageHeaderRaw {
    magic: [u8; 4],
    required_icp_version_major: U32<BigEndian>,
    required_icp_version_minor: U32<BigEndian>,
    image_size: U32<BigEndian>,
    num_icp_entries: U16<BigEndian>,
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct IcpEntryHeaderRaw {
    log_url_size: U32<BigEndian>,
    leaf_index: U64<BigEndian>,
    log_root_descriptor_size: U32<BigEndian>,
    fw_info_leaf_size: U32<BigEndian>,
    log_root_sig_size: U32<BigEndian>,
    proof_hash_count: u8,
    inc_proof_size: U32<BigEndian>,
}

/// The signed root descriptor of a transparency log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrillianLogRootDescriptor<'a> {
    /// Log root format version.
    pub version: u16,
    /// Number of leaves in the log at this root.
    pub tree_size: u64,
    /// The Merkle root hash.
    pub root_hash: &'a [u8],
    /// Root timestamp in nanoseconds since the epoch.
    pub timestamp: u64,
    /// Log revision.
    pub revision: u64,
    /// Opaque log metadata.
    pub metadata: &'a [u8],
}

impl TrillianLogRootDescriptor<'_> {
    /// Re-encodes the byte sequence the log signed: big-endian, fixed field
    /// order, variable-length root hash and metadata.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(29 + self.root_hash.len() + self.metadata.len());
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.tree_size.to_be_bytes());
        out.push(self.root_hash.len() as u8);
        out.extend_from_slice(self.root_hash);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.revision.to_be_bytes());
        out.extend_from_slice(&(self.metadata.len() as u16).to_be_bytes());
        out.extend_from_slice(self.metadata);
        out
    }
}

/// One inclusion proof entry of an AFTL image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AftlIcpEntry<'a> {
    /// URL of the transparency log.
    pub log_url: &'a [u8],
    /// Index of the firmware-info leaf in the log.
    pub leaf_index: u64,
    /// The log's signed root descriptor.
    pub log_root_descriptor: TrillianLogRootDescriptor<'a>,
    /// The opaque leaf bytes hashed into the log.
    pub fw_info_leaf: &'a [u8],
    /// Signature over the serialized log root descriptor.
    pub log_root_signature: &'a [u8],
    /// Sibling hashes of the inclusion path, 32 bytes each.
    pub proof_hashes: &'a [u8],
}

impl AftlIcpEntry<'_> {
    /// Verifies this entry: recomputes the Merkle root from the leaf and
    /// the inclusion path, checks it against the log root descriptor,
    /// verifies the log's signature over the root descriptor, and, when
    /// `expected_leaf_hash` is given, confirms the firmware-info leaf
    /// hashes to it (binding the entry to the vbmeta it accompanies).
    pub fn verify(
        &self,
        log_key: &LogKey,
        expected_leaf_hash: Option<&[u8; AFTL_HASH_SIZE]>,
    ) -> AftlResult<()> {
        let leaf = leaf_hash(self.fw_info_leaf);
        let root = root_from_inclusion_proof(
            &leaf,
            self.leaf_index,
            self.log_root_descriptor.tree_size,
            self.proof_hashes.chunks_exact(AFTL_HASH_SIZE),
        )
        .ok_or(AftlError::InvalidMetadata)?;
        if root.as_slice() != self.log_root_descriptor.root_hash {
            return Err(AftlError::InvalidMetadata);
        }

        let signed = self.log_root_descriptor.signed_bytes();
        let signature_good = match log_key {
            LogKey::Ed25519(public_key) => {
                ed25519::verify(*public_key, &signed, self.log_root_signature)
            }
            LogKey::Rsa4096(blob) => match RsaPublicKey::parse(blob) {
                Some(key) => {
                    let digest = digest_parts(HashAlgorithm::Sha256, &[&signed]);
                    key.verify_pkcs1(
                        HashAlgorithm::Sha256,
                        digest.as_bytes(),
                        self.log_root_signature,
                    )
                }
                None => false,
            },
        };
        if !signature_good {
            return Err(AftlError::Verification);
        }

        if let Some(expected) = expected_leaf_hash {
            let actual = digest_parts(HashAlgorithm::Sha256, &[self.fw_info_leaf]);
            if actual.as_bytes() != expected {
                return Err(AftlError::Verification);
            }
        }
        Ok(())
    }
}

/// A parsed AFTL image.
#[derive(Debug, PartialEq, Eq)]
pub struct AftlImage<'a> {
    /// Inclusion proof entries, one per log.
    pub entries: Vec<AftlIcpEntry<'a>>,
}

impl<'a> AftlImage<'a> {
    /// Parses the AFTL image at the start of `data` (typically the bytes
    /// following a vbmeta image). Trailing partition padding is ignored.
    pub fn parse(data: &'a [u8]) -> AftlResult<Self> {
        let (header, _) =
            AftlImageHeaderRaw::ref_from_prefix(data).map_err(|_| AftlError::InvalidMetadata)?;
        if header.magic != AFTL_MAGIC {
            return Err(AftlError::InvalidMetadata);
        }
        if header.required_icp_version_major.get() != AFTL_VERSION_MAJOR {
            return Err(AftlError::InvalidMetadata);
        }
        let image_size = header.image_size.get() as usize;
        let image = data.get(..image_size).ok_or(AftlError::InvalidMetadata)?;
        let mut cursor = Cursor { data: image, pos: core::mem::size_of::<AftlImageHeaderRaw>() };

        let mut entries = Vec::new();
        for _ in 0..header.num_icp_entries.get() {
            entries.push(Self::parse_entry(&mut cursor)?);
        }
        if cursor.pos != image_size {
            return Err(AftlError::InvalidMetadata);
        }
        Ok(Self { entries })
    }

    fn parse_entry(cursor: &mut Cursor<'a>) -> AftlResult<AftlIcpEntry<'a>> {
        let raw = cursor.take(core::mem::size_of::<IcpEntryHeaderRaw>())?;
        let header =
            IcpEntryHeaderRaw::ref_from_bytes(raw).map_err(|_| AftlError::InvalidMetadata)?;
        if header.proof_hash_count as usize * AFTL_HASH_SIZE
            != header.inc_proof_size.get() as usize
        {
            return Err(AftlError::InvalidMetadata);
        }

        let log_url = cursor.take(header.log_url_size.get() as usize)?;
        let log_root_raw = cursor.take(header.log_root_descriptor_size.get() as usize)?;
        let fw_info_leaf = cursor.take(header.fw_info_leaf_size.get() as usize)?;
        let log_root_signature = cursor.take(header.log_root_sig_size.get() as usize)?;
        let proof_hashes = cursor.take(header.inc_proof_size.get() as usize)?;

        Ok(AftlIcpEntry {
            log_url,
            leaf_index: header.leaf_index.get(),
            log_root_descriptor: parse_log_root_descriptor(log_root_raw)?,
            fw_info_leaf,
            log_root_signature,
            proof_hashes,
        })
    }
}

fn parse_log_root_descriptor(data: &[u8]) -> AftlResult<TrillianLogRootDescriptor> {
    let mut cursor = Cursor { data, pos: 0 };
    let version = u16::from_be_bytes(cursor.take(2)?.try_into().unwrap());
    let tree_size = u64::from_be_bytes(cursor.take(8)?.try_into().unwrap());
    let root_hash_size = cursor.take(1)?[0] as usize;
    if root_hash_size != AFTL_HASH_SIZE {
        return Err(AftlError::InvalidMetadata);
    }
    let root_hash = cursor.take(root_hash_size)?;
    let timestamp = u64::from_be_bytes(cursor.take(8)?.try_into().unwrap());
    let revision = u64::from_be_bytes(cursor.take(8)?.try_into().unwrap());
    let metadata_size = u16::from_be_bytes(cursor.take(2)?.try_into().unwrap()) as usize;
    let metadata = cursor.take(metadata_size)?;
    if cursor.pos != data.len() {
        return Err(AftlError::InvalidMetadata);
    }
    Ok(TrillianLogRootDescriptor { version, tree_size, root_hash, timestamp, revision, metadata })
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> AftlResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(AftlError::InvalidMetadata)?;
        let slice = self.data.get(self.pos..end).ok_or(AftlError::InvalidMetadata)?;
        self.pos = end;
        Ok(slice)
    }
}

/// RFC 6962 leaf hash: `SHA-256(0x00 || leaf)`.
pub fn leaf_hash(leaf: &[u8]) -> [u8; AFTL_HASH_SIZE] {
    let digest = digest_parts(HashAlgorithm::Sha256, &[&[RFC6962_LEAF_PREFIX], leaf]);
    digest.as_bytes().try_into().unwrap()
}

/// RFC 6962 interior node hash: `SHA-256(0x01 || left || right)`.
fn node_hash(left: &[u8], right: &[u8]) -> [u8; AFTL_HASH_SIZE] {
    let digest = digest_parts(HashAlgorithm::Sha256, &[&[RFC6962_NODE_PREFIX], left, right]);
    digest.as_bytes().try_into().unwrap()
}

/// Recomputes the Merkle root for `leaf_hash` at `leaf_index` in a tree of
/// `tree_size` leaves, combining sibling hashes per RFC 6962. Returns
/// `None` when the proof length does not fit the tree shape.
pub fn root_from_inclusion_proof<'p>(
    leaf_hash: &[u8; AFTL_HASH_SIZE],
    leaf_index: u64,
    tree_size: u64,
    proof: impl Iterator<Item = &'p [u8]>,
) -> Option<[u8; AFTL_HASH_SIZE]> {
    if leaf_index >= tree_size {
        return None;
    }
    let mut node_index = leaf_index;
    let mut last_node = tree_size - 1;
    let mut hash = *leaf_hash;

    for sibling in proof {
        if last_node == 0 {
            return None;
        }
        if node_index & 1 == 1 || node_index == last_node {
            hash = node_hash(sibling, &hash);
            while node_index & 1 == 0 && node_index != 0 {
                node_index >>= 1;
                last_node >>= 1;
            }
        } else {
            hash = node_hash(&hash, sibling);
        }
        node_index >>= 1;
        last_node >>= 1;
    }

    if last_node == 0 {
        Some(hash)
    } else {
        None
    }
}
