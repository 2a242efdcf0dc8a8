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

//! Hash descriptors.

use super::util::{
    check_trailing_padding, fixed_str, parse_descriptor, partition_name_str, split_slice,
    HasDescriptorHeader,
};
use crate::error::DescriptorResult;
use zerocopy::byteorder::{BigEndian, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Flags carried by a hash descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HashDescriptorFlags(pub u32);

impl HashDescriptorFlags {
    /// Do not apply the A/B slot suffix to this partition.
    pub const DO_NOT_USE_AB: u32 = 1 << 0;

    /// Whether the A/B slot suffix applies to this partition.
    pub fn use_ab(self) -> bool {
        self.0 & Self::DO_NOT_USE_AB == 0
    }
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct HashDescriptorHeader {
    tag: U64<BigEndian>,
    num_bytes_following: U64<BigEndian>,
    image_size: U64<BigEndian>,
    hash_algorithm: [u8; 32],
    partition_name_len: U32<BigEndian>,
    salt_len: U32<BigEndian>,
    digest_len: U32<BigEndian>,
    flags: U32<BigEndian>,
    reserved: [u8; 60],
}

impl HasDescriptorHeader for HashDescriptorHeader {
    fn num_bytes_following(&self) -> u64 {
        self.num_bytes_following.get()
    }
}

/// Wraps a hash descriptor stored in a vbmeta image.
///
/// The named partition is read in full and digested eagerly during slot
/// verification.
#[derive(Debug, PartialEq, Eq)]
pub struct HashDescriptor<'a> {
    /// Number of image bytes covered by the digest.
    pub image_size: u64,

    /// Hash algorithm name.
    pub hash_algorithm: &'a str,

    /// Flags.
    pub flags: HashDescriptorFlags,

    /// Partition name.
    pub partition_name: &'a str,

    /// Salt prepended to the image when hashing.
    pub salt: &'a [u8],

    /// Expected digest.
    pub digest: &'a [u8],
}

impl<'a> HashDescriptor<'a> {
    /// Extracts a `HashDescriptor` from raw big-endian descriptor contents
    /// (including the tag/length prefix).
    pub(super) fn new(contents: &'a [u8]) -> DescriptorResult<Self> {
        let (header, payload) = parse_descriptor::<HashDescriptorHeader>(contents)?;
        let (partition_name, remainder) = split_slice(payload, header.partition_name_len.get())?;
        let (salt, remainder) = split_slice(remainder, header.salt_len.get())?;
        let (digest, remainder) = split_slice(remainder, header.digest_len.get())?;
        check_trailing_padding(remainder)?;

        Ok(Self {
            image_size: header.image_size.get(),
            hash_algorithm: fixed_str(&header.hash_algorithm)?,
            flags: HashDescriptorFlags(header.flags.get()),
            partition_name: partition_name_str(partition_name)?,
            salt,
            digest,
        })
    }
}
