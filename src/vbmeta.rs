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

//! VBMeta image parsing and authentication.
//!
//! A vbmeta image is laid out as a 256-byte header, an authentication block
//! (hash + signature), an auxiliary block (descriptors + public key), and
//! trailing padding. The signed region is `header || auxiliary block`; the
//! authentication block itself is not covered by the signature.

use crate::crypto::rsa::RsaPublicKey;
use crate::crypto::sha::{HashAlgorithm, HashContext};
use crate::descriptor::{find_property_value, parse_descriptors, Descriptor};
use crate::error::{DescriptorResult, SlotVerifyError};
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::mem::size_of;
use zerocopy::byteorder::{BigEndian, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Magic bytes at the start of every vbmeta image.
pub const VBMETA_MAGIC: [u8; 4] = *b"AVB0";

/// Size of [`VbmetaImageHeader`] on the wire.
pub const VBMETA_HEADER_SIZE: usize = size_of::<VbmetaImageHeader>();

/// Largest vbmeta image the verifier will load.
pub const VBMETA_MAX_SIZE: usize = 64 * 1024;

/// Metadata format major version this library implements.
pub const VBMETA_VERSION_MAJOR: u32 = 1;

/// Metadata format minor version this library implements.
pub const VBMETA_VERSION_MINOR: u32 = 3;

const _: () = assert!(VBMETA_HEADER_SIZE == 256);

/// Flags in the vbmeta image header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VbmetaImageFlags(pub u32);

impl VbmetaImageFlags {
    /// dm-verity is disabled for all hashtree descriptors.
    pub const HASHTREE_DISABLED: u32 = 1 << 0;
    /// Verification is disabled; only the header itself is inspected.
    pub const VERIFICATION_DISABLED: u32 = 1 << 1;

    /// Whether hashtree validation is disabled.
    pub fn hashtree_disabled(self) -> bool {
        self.0 & Self::HASHTREE_DISABLED != 0
    }

    /// Whether verification is disabled altogether.
    pub fn verification_disabled(self) -> bool {
        self.0 & Self::VERIFICATION_DISABLED != 0
    }
}

/// The 256-byte vbmeta image header. All integers are big-endian.
#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct VbmetaImageHeader {
    /// Must be [`VBMETA_MAGIC`].
    pub magic: [u8; 4],
    /// Metadata format major version required to parse this image.
    pub required_libavb_version_major: U32<BigEndian>,
    /// Metadata format minor version required to parse this image.
    pub required_libavb_version_minor: U32<BigEndian>,
    /// Size of the authentication block.
    pub authentication_data_block_size: U64<BigEndian>,
    /// Size of the auxiliary block.
    pub auxiliary_data_block_size: U64<BigEndian>,
    /// Algorithm identifier; see [`Algorithm`].
    pub algorithm_type: U32<BigEndian>,
    /// Offset of the hash inside the authentication block.
    pub hash_offset: U64<BigEndian>,
    /// Size of the hash.
    pub hash_size: U64<BigEndian>,
    /// Offset of the signature inside the authentication block.
    pub signature_offset: U64<BigEndian>,
    /// Size of the signature.
    pub signature_size: U64<BigEndian>,
    /// Offset of the public key inside the auxiliary block.
    pub public_key_offset: U64<BigEndian>,
    /// Size of the public key.
    pub public_key_size: U64<BigEndian>,
    /// Offset of the public key metadata inside the auxiliary block.
    pub public_key_metadata_offset: U64<BigEndian>,
    /// Size of the public key metadata.
    pub public_key_metadata_size: U64<BigEndian>,
    /// Offset of the descriptor region inside the auxiliary block.
    pub descriptors_offset: U64<BigEndian>,
    /// Size of the descriptor region.
    pub descriptors_size: U64<BigEndian>,
    /// Rollback index of this image.
    pub rollback_index: U64<BigEndian>,
    /// Image flags; see [`VbmetaImageFlags`].
    pub flags: U32<BigEndian>,
    /// Rollback index location, 0 meaning unset.
    pub rollback_index_location: U32<BigEndian>,
    /// Nul-terminated release string of the tool that made the image.
    pub release_string: [u8; 48],
    /// Reserved, must be zero.
    pub reserved: [u8; 80],
}

/// The (hash, signature) pair used to sign a vbmeta image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    /// Unsigned; callers must refuse to boot unless device policy allows.
    None,
    /// SHA-256 and RSA-2048.
    Sha256Rsa2048,
    /// SHA-256 and RSA-4096.
    Sha256Rsa4096,
    /// SHA-256 and RSA-8192.
    Sha256Rsa8192,
    /// SHA-512 and RSA-2048.
    Sha512Rsa2048,
    /// SHA-512 and RSA-4096.
    Sha512Rsa4096,
    /// SHA-512 and RSA-8192.
    Sha512Rsa8192,
}

impl Algorithm {
    /// Decodes the wire identifier.
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Sha256Rsa2048),
            2 => Some(Self::Sha256Rsa4096),
            3 => Some(Self::Sha256Rsa8192),
            4 => Some(Self::Sha512Rsa2048),
            5 => Some(Self::Sha512Rsa4096),
            6 => Some(Self::Sha512Rsa8192),
            _ => None,
        }
    }

    /// The wire identifier.
    pub const fn to_wire(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Sha256Rsa2048 => 1,
            Self::Sha256Rsa4096 => 2,
            Self::Sha256Rsa8192 => 3,
            Self::Sha512Rsa2048 => 4,
            Self::Sha512Rsa4096 => 5,
            Self::Sha512Rsa8192 => 6,
        }
    }

    /// The hash half of the pair, `None` for unsigned images.
    pub const fn hash_algorithm(self) -> Option<HashAlgorithm> {
        match self {
            Self::None => None,
            Self::Sha256Rsa2048 | Self::Sha256Rsa4096 | Self::Sha256Rsa8192 => {
                Some(HashAlgorithm::Sha256)
            }
            Self::Sha512Rsa2048 | Self::Sha512Rsa4096 | Self::Sha512Rsa8192 => {
                Some(HashAlgorithm::Sha512)
            }
        }
    }

    /// Signature size in bytes, 0 for unsigned images.
    pub const fn signature_size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Sha256Rsa2048 | Self::Sha512Rsa2048 => 256,
            Self::Sha256Rsa4096 | Self::Sha512Rsa4096 => 512,
            Self::Sha256Rsa8192 | Self::Sha512Rsa8192 => 1024,
        }
    }
}

/// Outcome of authenticating a single vbmeta image whose structure was
/// valid. Crypto failures still yield a parseable view so that degraded
/// boot flows can read the metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VbmetaVerifyResult {
    /// The signature was checked against the embedded public key.
    Ok,
    /// The image declares algorithm NONE; parsed but not authenticated.
    OkNotSigned,
    /// The stored hash does not match the computed digest.
    HashMismatch,
    /// The signature does not verify under the embedded public key.
    SignatureMismatch,
}

/// Structural error parsing a vbmeta image; no view can be produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VbmetaVerifyError {
    /// Bad magic, overrunning offsets, or inconsistent sizes.
    InvalidMetadata,
    /// The image requires a newer metadata format than this library speaks.
    UnsupportedVersion,
}

impl fmt::Display for VbmetaVerifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidMetadata => write!(f, "invalid vbmeta image"),
            Self::UnsupportedVersion => write!(f, "unsupported vbmeta version"),
        }
    }
}

impl From<VbmetaVerifyError> for SlotVerifyError {
    fn from(e: VbmetaVerifyError) -> Self {
        match e {
            VbmetaVerifyError::InvalidMetadata => Self::InvalidMetadata,
            VbmetaVerifyError::UnsupportedVersion => Self::UnsupportedVersion,
        }
    }
}

/// A parsed, authenticated view of a vbmeta image borrowed from the caller.
#[derive(Debug)]
pub struct Vbmeta<'a> {
    data: &'a [u8],
    header: &'a VbmetaImageHeader,
    verify_result: VbmetaVerifyResult,
}

impl<'a> Vbmeta<'a> {
    /// Parses and authenticates the vbmeta image at the start of `data`.
    ///
    /// Checks the magic and version, every offset/size invariant, then the
    /// stored hash and the signature over `header || auxiliary block`. With
    /// algorithm NONE the signature steps are skipped and the result is
    /// [`VbmetaVerifyResult::OkNotSigned`]. Hash and signature mismatches
    /// still return a view, flagged through [`Vbmeta::verify_result`];
    /// structural problems return an error.
    pub fn verify(data: &'a [u8]) -> Result<Self, VbmetaVerifyError> {
        let (header, _) = VbmetaImageHeader::ref_from_prefix(data)
            .map_err(|_| VbmetaVerifyError::InvalidMetadata)?;
        if header.magic != VBMETA_MAGIC {
            return Err(VbmetaVerifyError::InvalidMetadata);
        }
        if header.required_libavb_version_major.get() != VBMETA_VERSION_MAJOR
            || header.required_libavb_version_minor.get() > VBMETA_VERSION_MINOR
        {
            return Err(VbmetaVerifyError::UnsupportedVersion);
        }

        let auth_size = checked_usize(header.authentication_data_block_size.get())?;
        let aux_size = checked_usize(header.auxiliary_data_block_size.get())?;
        if auth_size % 64 != 0 || aux_size % 64 != 0 {
            return Err(VbmetaVerifyError::InvalidMetadata);
        }
        let total = VBMETA_HEADER_SIZE
            .checked_add(auth_size)
            .and_then(|t| t.checked_add(aux_size))
            .ok_or(VbmetaVerifyError::InvalidMetadata)?;
        if total > data.len() {
            return Err(VbmetaVerifyError::InvalidMetadata);
        }
        let data = &data[..total];

        check_region(header.hash_offset.get(), header.hash_size.get(), auth_size)?;
        check_region(header.signature_offset.get(), header.signature_size.get(), auth_size)?;
        check_region(header.public_key_offset.get(), header.public_key_size.get(), aux_size)?;
        check_region(
            header.public_key_metadata_offset.get(),
            header.public_key_metadata_size.get(),
            aux_size,
        )?;
        check_region(header.descriptors_offset.get(), header.descriptors_size.get(), aux_size)?;

        let algorithm = Algorithm::from_wire(header.algorithm_type.get())
            .ok_or(VbmetaVerifyError::InvalidMetadata)?;
        let mut vbmeta = Self { data, header, verify_result: VbmetaVerifyResult::Ok };

        let Some(hash_algorithm) = algorithm.hash_algorithm() else {
            vbmeta.verify_result = VbmetaVerifyResult::OkNotSigned;
            return Ok(vbmeta);
        };

        if header.hash_size.get() != hash_algorithm.digest_size() as u64
            || header.signature_size.get() != algorithm.signature_size() as u64
        {
            return Err(VbmetaVerifyError::InvalidMetadata);
        }
        let key = vbmeta
            .public_key()
            .and_then(RsaPublicKey::parse)
            .ok_or(VbmetaVerifyError::InvalidMetadata)?;

        // The signed region is the header plus the auxiliary block; the
        // authentication block holding hash and signature is excluded.
        let mut ctx = HashContext::new(hash_algorithm);
        ctx.update(&data[..VBMETA_HEADER_SIZE]);
        ctx.update(vbmeta.aux_block());
        let digest = ctx.finish();

        let auth = vbmeta.auth_block();
        let hash_offset = header.hash_offset.get() as usize;
        let hash_size = header.hash_size.get() as usize;
        let stored_hash = &auth[hash_offset..hash_offset + hash_size];
        if stored_hash != digest.as_bytes() {
            vbmeta.verify_result = VbmetaVerifyResult::HashMismatch;
            return Ok(vbmeta);
        }

        let sig_offset = header.signature_offset.get() as usize;
        let sig_size = header.signature_size.get() as usize;
        let signature = &auth[sig_offset..sig_offset + sig_size];
        if !key.verify_pkcs1(hash_algorithm, digest.as_bytes(), signature) {
            vbmeta.verify_result = VbmetaVerifyResult::SignatureMismatch;
            return Ok(vbmeta);
        }

        Ok(vbmeta)
    }

    /// The image header.
    pub fn header(&self) -> &'a VbmetaImageHeader {
        self.header
    }

    /// The image bytes, trimmed to `header || auth || aux`.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Whether the image was authenticated or merely parsed.
    pub fn verify_result(&self) -> VbmetaVerifyResult {
        self.verify_result
    }

    /// The declared algorithm. Infallible after [`Vbmeta::verify`].
    pub fn algorithm(&self) -> Algorithm {
        Algorithm::from_wire(self.header.algorithm_type.get()).unwrap_or(Algorithm::None)
    }

    /// Image flags.
    pub fn flags(&self) -> VbmetaImageFlags {
        VbmetaImageFlags(self.header.flags.get())
    }

    fn auth_block(&self) -> &'a [u8] {
        let auth_size = self.header.authentication_data_block_size.get() as usize;
        &self.data[VBMETA_HEADER_SIZE..VBMETA_HEADER_SIZE + auth_size]
    }

    fn aux_block(&self) -> &'a [u8] {
        let auth_size = self.header.authentication_data_block_size.get() as usize;
        &self.data[VBMETA_HEADER_SIZE + auth_size..]
    }

    /// The embedded public key, or `None` if the image carries none.
    pub fn public_key(&self) -> Option<&'a [u8]> {
        let offset = self.header.public_key_offset.get() as usize;
        let size = self.header.public_key_size.get() as usize;
        if size == 0 {
            return None;
        }
        Some(&self.aux_block()[offset..offset + size])
    }

    /// The opaque public key metadata, or `None` if absent.
    pub fn public_key_metadata(&self) -> Option<&'a [u8]> {
        let offset = self.header.public_key_metadata_offset.get() as usize;
        let size = self.header.public_key_metadata_size.get() as usize;
        if size == 0 {
            return None;
        }
        Some(&self.aux_block()[offset..offset + size])
    }

    /// The raw descriptor region.
    pub fn descriptors_region(&self) -> &'a [u8] {
        let offset = self.header.descriptors_offset.get() as usize;
        let size = self.header.descriptors_size.get() as usize;
        &self.aux_block()[offset..offset + size]
    }
}

fn checked_usize(value: u64) -> Result<usize, VbmetaVerifyError> {
    usize::try_from(value).map_err(|_| VbmetaVerifyError::InvalidMetadata)
}

fn check_region(offset: u64, size: u64, block_size: usize) -> Result<(), VbmetaVerifyError> {
    let end = offset.checked_add(size).ok_or(VbmetaVerifyError::InvalidMetadata)?;
    if end > block_size as u64 {
        return Err(VbmetaVerifyError::InvalidMetadata);
    }
    Ok(())
}

/// An owned, verified vbmeta image held in a verification result.
#[derive(Debug, PartialEq, Eq)]
pub struct VbmetaData {
    partition_name: String,
    data: Vec<u8>,
    verify_result: VbmetaVerifyResult,
}

impl VbmetaData {
    pub(crate) fn new(
        partition_name: String,
        data: Vec<u8>,
        verify_result: VbmetaVerifyResult,
    ) -> Self {
        Self { partition_name, data, verify_result }
    }

    /// Name of the partition this image was loaded from, suffix included.
    pub fn partition_name(&self) -> &str {
        &self.partition_name
    }

    /// The raw image bytes (`header || auth || aux`).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the image was authenticated or merely parsed.
    pub fn verify_result(&self) -> VbmetaVerifyResult {
        self.verify_result
    }

    /// The image header.
    pub fn header(&self) -> &VbmetaImageHeader {
        // Infallible: the bytes were validated before this object was built.
        let (header, _) = VbmetaImageHeader::ref_from_prefix(&self.data).unwrap();
        header
    }

    /// The raw descriptor region.
    pub fn descriptors_region(&self) -> &[u8] {
        let header = self.header();
        let auth_size = header.authentication_data_block_size.get() as usize;
        let offset = header.descriptors_offset.get() as usize;
        let size = header.descriptors_size.get() as usize;
        let aux = &self.data[VBMETA_HEADER_SIZE + auth_size..];
        &aux[offset..offset + size]
    }

    /// Parses the descriptors embedded in this image.
    pub fn descriptors(&self) -> DescriptorResult<Vec<Descriptor>> {
        parse_descriptors(self.descriptors_region())
    }

    /// Looks up the value of a property descriptor by key.
    pub fn get_property_value(&self, key: &str) -> Option<&[u8]> {
        find_property_value(self.descriptors_region(), key)
    }
}
