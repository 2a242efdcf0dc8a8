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

//! Typed descriptors embedded in the vbmeta auxiliary block.
//!
//! A descriptor region is a sequence of length-prefixed records: an 8-byte
//! tag, an 8-byte count of the bytes that follow, then tag-specific fixed
//! fields and variable payloads. The decoder is lazy and borrows; strings
//! and byte payloads are views into the caller's buffer.

mod chain;
mod hash;
mod hashtree;
mod kernel_cmdline;
mod property;
mod util;

pub use chain::{ChainPartitionDescriptor, ChainPartitionDescriptorFlags};
pub use hash::{HashDescriptor, HashDescriptorFlags};
pub use hashtree::{HashtreeDescriptor, HashtreeDescriptorFlags};
pub use kernel_cmdline::{KernelCommandlineDescriptor, KernelCommandlineDescriptorFlags};
pub use property::PropertyDescriptor;

use crate::error::{DescriptorError, DescriptorResult};
use alloc::vec::Vec;
use zerocopy::byteorder::{BigEndian, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Size of the tag/length prefix common to all descriptors.
pub(crate) const DESCRIPTOR_PREFIX_SIZE: usize = 16;

/// Longest partition name a descriptor may carry, in bytes.
pub(crate) const MAX_PARTITION_NAME_LEN: usize = 32;

const TAG_PROPERTY: u64 = 0;
const TAG_HASHTREE: u64 = 1;
const TAG_HASH: u64 = 2;
const TAG_KERNEL_CMDLINE: u64 = 3;
const TAG_CHAIN_PARTITION: u64 = 4;

/// The tag/length prefix shared by every descriptor.
#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub(crate) struct DescriptorHeader {
    pub tag: U64<BigEndian>,
    pub num_bytes_following: U64<BigEndian>,
}

/// A descriptor extracted from a vbmeta image.
#[derive(Debug, PartialEq, Eq)]
pub enum Descriptor<'a> {
    /// Key/value pair exposed to callers.
    Property(PropertyDescriptor<'a>),
    /// dm-verity parameters for a partition verified on demand.
    Hashtree(HashtreeDescriptor<'a>),
    /// Whole-image hash for a partition verified eagerly.
    Hash(HashDescriptor<'a>),
    /// Kernel command line fragment with application conditions.
    KernelCommandline(KernelCommandlineDescriptor<'a>),
    /// Pointer to a chained vbmeta with its pinned signing key.
    ChainPartition(ChainPartitionDescriptor<'a>),
    /// A descriptor with an unrecognized tag, skipped by length.
    Unknown(&'a [u8]),
}

/// A descriptor region; the factory for (restartable) iteration.
#[derive(Clone, Copy)]
pub struct Descriptors<'a> {
    region: &'a [u8],
}

impl<'a> Descriptors<'a> {
    /// Wraps the raw descriptor region of an auxiliary block.
    pub fn from_region(region: &'a [u8]) -> Self {
        Self { region }
    }

    /// Starts a fresh iteration over the region.
    pub fn iter(&self) -> DescriptorIter<'a> {
        DescriptorIter { remaining: self.region, failed: false }
    }
}

impl<'a> IntoIterator for Descriptors<'a> {
    type Item = DescriptorResult<Descriptor<'a>>;
    type IntoIter = DescriptorIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a descriptor region. Stops at the first malformed
/// record after yielding the error.
pub struct DescriptorIter<'a> {
    remaining: &'a [u8],
    failed: bool,
}

impl<'a> Iterator for DescriptorIter<'a> {
    type Item = DescriptorResult<Descriptor<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining.is_empty() {
            return None;
        }
        match next_descriptor(self.remaining) {
            Ok((descriptor, rest)) => {
                self.remaining = rest;
                Some(Ok(descriptor))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn next_descriptor(data: &[u8]) -> DescriptorResult<(Descriptor, &[u8])> {
    let (header, _) =
        DescriptorHeader::ref_from_prefix(data).map_err(|_| DescriptorError::InvalidHeader)?;
    let num_bytes_following = header.num_bytes_following.get();
    // Records are padded so that prefix + payload is a multiple of 8.
    if num_bytes_following % 8 != 0 {
        return Err(DescriptorError::InvalidSize);
    }
    let total = usize::try_from(num_bytes_following)
        .ok()
        .and_then(|n| n.checked_add(DESCRIPTOR_PREFIX_SIZE))
        .ok_or(DescriptorError::InvalidSize)?;
    if total > data.len() {
        return Err(DescriptorError::InvalidSize);
    }
    let (contents, rest) = data.split_at(total);
    let descriptor = match header.tag.get() {
        TAG_PROPERTY => Descriptor::Property(PropertyDescriptor::new(contents)?),
        TAG_HASHTREE => Descriptor::Hashtree(HashtreeDescriptor::new(contents)?),
        TAG_HASH => Descriptor::Hash(HashDescriptor::new(contents)?),
        TAG_KERNEL_CMDLINE => {
            Descriptor::KernelCommandline(KernelCommandlineDescriptor::new(contents)?)
        }
        TAG_CHAIN_PARTITION => {
            Descriptor::ChainPartition(ChainPartitionDescriptor::new(contents)?)
        }
        _ => Descriptor::Unknown(contents),
    };
    Ok((descriptor, rest))
}

/// Parses a whole region eagerly. Any malformed record fails the parse.
pub fn parse_descriptors(region: &[u8]) -> DescriptorResult<Vec<Descriptor>> {
    Descriptors::from_region(region).iter().collect()
}

/// Looks up the value of the property descriptor with the given key.
pub fn find_property_value<'a>(region: &'a [u8], key: &str) -> Option<&'a [u8]> {
    Descriptors::from_region(region).iter().find_map(|d| match d {
        Ok(Descriptor::Property(p)) if p.key == key => Some(p.value),
        _ => None,
    })
}
