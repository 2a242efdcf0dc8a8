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

//! Hashtree descriptors.

use super::util::{
    check_trailing_padding, fixed_str, parse_descriptor, partition_name_str, split_slice,
    HasDescriptorHeader,
};
use crate::error::DescriptorResult;
use zerocopy::byteorder::{BigEndian, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Flags carried by a hashtree descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HashtreeDescriptorFlags(pub u32);

impl HashtreeDescriptorFlags {
    /// Do not apply the A/B slot suffix to this partition.
    pub const DO_NOT_USE_AB: u32 = 1 << 0;
    /// Ask dm-verity to check each block at most once.
    pub const CHECK_AT_MOST_ONCE: u32 = 1 << 1;

    /// Whether the A/B slot suffix applies to this partition.
    pub fn use_ab(self) -> bool {
        self.0 & Self::DO_NOT_USE_AB == 0
    }

    /// Whether blocks should only be checked on first use.
    pub fn check_at_most_once(self) -> bool {
        self.0 & Self::CHECK_AT_MOST_ONCE != 0
    }
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct HashtreeDescriptorHeader {
    tag: U64<BigEndian>,
    num_bytes_following: U64<BigEndian>,
    dm_verity_version: U32<BigEndian>,
    image_size: U64<BigEndian>,
    tree_offset: U64<BigEndian>,
    tree_size: U64<BigEndian>,
    data_block_size: U32<BigEndian>,
    hash_block_size: U32<BigEndian>,
    fec_num_roots: U32<BigEndian>,
    fec_offset: U64<BigEndian>,
    fec_size: U64<BigEndian>,
    hash_algorithm: [u8; 32],
    partition_name_len: U32<BigEndian>,
    salt_len: U32<BigEndian>,
    root_digest_len: U32<BigEndian>,
    flags: U32<BigEndian>,
    reserved: [u8; 60],
}

impl HasDescriptorHeader for HashtreeDescriptorHeader {
    fn num_bytes_following(&self) -> u64 {
        self.num_bytes_following.get()
    }
}

/// Wraps a hashtree descriptor stored in a vbmeta image.
///
/// The partition is not read during slot verification; the descriptor is
/// translated into dm-verity parameters for the kernel to enforce on
/// demand.
#[derive(Debug, PartialEq, Eq)]
pub struct HashtreeDescriptor<'a> {
    /// DM-Verity version.
    pub dm_verity_version: u32,

    /// Hashed image size.
    pub image_size: u64,

    /// Offset to the root block of the hash tree.
    pub tree_offset: u64,

    /// Hash tree size.
    pub tree_size: u64,

    /// Data block size in bytes.
    pub data_block_size: u32,

    /// Hash block size in bytes.
    pub hash_block_size: u32,

    /// Number of forward error correction roots.
    pub fec_num_roots: u32,

    /// Offset to the forward error correction data.
    pub fec_offset: u64,

    /// Forward error correction data size.
    pub fec_size: u64,

    /// Hash algorithm name.
    pub hash_algorithm: &'a str,

    /// Flags.
    pub flags: HashtreeDescriptorFlags,

    /// Partition name.
    pub partition_name: &'a str,

    /// Salt used to hash the image.
    pub salt: &'a [u8],

    /// Image root hash digest.
    pub root_digest: &'a [u8],
}

impl<'a> HashtreeDescriptor<'a> {
    /// Extracts a `HashtreeDescriptor` from raw big-endian descriptor
    /// contents (including the tag/length prefix).
    pub(super) fn new(contents: &'a [u8]) -> DescriptorResult<Self> {
        // Descriptor contains: header + name + salt + digest.
        let (header, payload) = parse_descriptor::<HashtreeDescriptorHeader>(contents)?;
        let (partition_name, remainder) = split_slice(payload, header.partition_name_len.get())?;
        let (salt, remainder) = split_slice(remainder, header.salt_len.get())?;
        let (root_digest, remainder) = split_slice(remainder, header.root_digest_len.get())?;
        check_trailing_padding(remainder)?;

        Ok(Self {
            dm_verity_version: header.dm_verity_version.get(),
            image_size: header.image_size.get(),
            tree_offset: header.tree_offset.get(),
            tree_size: header.tree_size.get(),
            data_block_size: header.data_block_size.get(),
            hash_block_size: header.hash_block_size.get(),
            fec_num_roots: header.fec_num_roots.get(),
            fec_offset: header.fec_offset.get(),
            fec_size: header.fec_size.get(),
            hash_algorithm: fixed_str(&header.hash_algorithm)?,
            flags: HashtreeDescriptorFlags(header.flags.get()),
            partition_name: partition_name_str(partition_name)?,
            salt,
            root_digest,
        })
    }
}
