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

//! Property descriptors.

use super::util::{check_trailing_padding, parse_descriptor, split_slice, HasDescriptorHeader};
use crate::error::{DescriptorError, DescriptorResult};
use core::str::from_utf8;
use zerocopy::byteorder::{BigEndian, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct PropertyDescriptorHeader {
    tag: U64<BigEndian>,
    num_bytes_following: U64<BigEndian>,
    key_len: U64<BigEndian>,
    value_len: U64<BigEndian>,
}

impl HasDescriptorHeader for PropertyDescriptorHeader {
    fn num_bytes_following(&self) -> u64 {
        self.num_bytes_following.get()
    }
}

/// Wraps a property descriptor stored in a vbmeta image.
///
/// Keys are UTF-8; values are opaque bytes. Both are nul-terminated on the
/// wire, with the terminators excluded from the recorded lengths.
#[derive(Debug, PartialEq, Eq)]
pub struct PropertyDescriptor<'a> {
    /// Property key.
    pub key: &'a str,

    /// Property value.
    pub value: &'a [u8],
}

impl<'a> PropertyDescriptor<'a> {
    /// Extracts a `PropertyDescriptor` from raw big-endian descriptor
    /// contents (including the tag/length prefix).
    pub(super) fn new(contents: &'a [u8]) -> DescriptorResult<Self> {
        let (header, payload) = parse_descriptor::<PropertyDescriptorHeader>(contents)?;
        let key_len = u32::try_from(header.key_len.get())
            .map_err(|_| DescriptorError::InvalidSize)?;
        let value_len = u32::try_from(header.value_len.get())
            .map_err(|_| DescriptorError::InvalidSize)?;

        let (key, remainder) = split_slice(payload, key_len)?;
        let (key_nul, remainder) = split_slice(remainder, 1)?;
        let (value, remainder) = split_slice(remainder, value_len)?;
        let (value_nul, remainder) = split_slice(remainder, 1)?;
        check_trailing_padding(remainder)?;

        if key_nul != [0] || value_nul != [0] {
            return Err(DescriptorError::InvalidContents);
        }

        Ok(Self {
            key: from_utf8(key).map_err(|_| DescriptorError::InvalidUtf8)?,
            value,
        })
    }
}
