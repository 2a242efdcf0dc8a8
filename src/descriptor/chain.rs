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

//! Chain partition descriptors.

use super::util::{
    check_trailing_padding, parse_descriptor, partition_name_str, split_slice, HasDescriptorHeader,
};
use crate::error::{DescriptorError, DescriptorResult};
use zerocopy::byteorder::{BigEndian, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Flags carried by a chain partition descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChainPartitionDescriptorFlags(pub u32);

impl ChainPartitionDescriptorFlags {
    /// Do not apply the A/B slot suffix to the chained partition.
    pub const DO_NOT_USE_AB: u32 = 1 << 0;

    /// Whether the A/B slot suffix applies to the chained partition.
    pub fn use_ab(self) -> bool {
        self.0 & Self::DO_NOT_USE_AB == 0
    }
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct ChainPartitionDescriptorHeader {
    tag: U64<BigEndian>,
    num_bytes_following: U64<BigEndian>,
    rollback_index_location: U32<BigEndian>,
    partition_name_len: U32<BigEndian>,
    public_key_len: U32<BigEndian>,
    flags: U32<BigEndian>,
    reserved: [u8; 60],
}

impl HasDescriptorHeader for ChainPartitionDescriptorHeader {
    fn num_bytes_following(&self) -> u64 {
        self.num_bytes_following.get()
    }
}

/// Wraps a chain partition descriptor stored in a vbmeta image.
///
/// Points at a child vbmeta partition and pins the exact public key that
/// must sign it.
#[derive(Debug, PartialEq, Eq)]
pub struct ChainPartitionDescriptor<'a> {
    /// Rollback index location the chained vbmeta must use.
    pub rollback_index_location: u32,

    /// Flags.
    pub flags: ChainPartitionDescriptorFlags,

    /// Chained partition name.
    pub partition_name: &'a str,

    /// Pre-encoded public key that must sign the chained vbmeta.
    pub public_key: &'a [u8],
}

impl<'a> ChainPartitionDescriptor<'a> {
    /// Extracts a `ChainPartitionDescriptor` from raw big-endian descriptor
    /// contents (including the tag/length prefix).
    pub(super) fn new(contents: &'a [u8]) -> DescriptorResult<Self> {
        let (header, payload) = parse_descriptor::<ChainPartitionDescriptorHeader>(contents)?;
        let (partition_name, remainder) = split_slice(payload, header.partition_name_len.get())?;
        let (public_key, remainder) = split_slice(remainder, header.public_key_len.get())?;
        check_trailing_padding(remainder)?;

        if public_key.is_empty() {
            return Err(DescriptorError::InvalidContents);
        }

        Ok(Self {
            rollback_index_location: header.rollback_index_location.get(),
            flags: ChainPartitionDescriptorFlags(header.flags.get()),
            partition_name: partition_name_str(partition_name)?,
            public_key,
        })
    }
}
