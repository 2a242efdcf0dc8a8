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

//! Shared helpers for decoding descriptor payloads.

use super::DESCRIPTOR_PREFIX_SIZE;
use crate::error::{DescriptorError, DescriptorResult};
use core::mem::size_of;
use core::str::from_utf8;
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

/// Splits `size` bytes off the front of `data`, or errors if it overruns.
pub(super) fn split_slice(data: &[u8], size: u32) -> DescriptorResult<(&[u8], &[u8])> {
    let size = size as usize;
    if size > data.len() {
        Err(DescriptorError::InvalidSize)
    } else {
        Ok(data.split_at(size))
    }
}

/// Decodes the fixed part of a descriptor from `contents` (which must start
/// at the tag/length prefix) and returns it with the variable payload.
///
/// Checks that `contents` is exactly as long as the length prefix claims,
/// so direct calls and iterator-sliced records behave identically.
pub(super) fn parse_descriptor<T>(contents: &[u8]) -> DescriptorResult<(&T, &[u8])>
where
    T: FromBytes + KnownLayout + Immutable + Unaligned + HasDescriptorHeader,
{
    let (header, payload) =
        T::ref_from_prefix(contents).map_err(|_| DescriptorError::InvalidHeader)?;
    let declared = usize::try_from(header.num_bytes_following())
        .ok()
        .and_then(|n| n.checked_add(DESCRIPTOR_PREFIX_SIZE))
        .ok_or(DescriptorError::InvalidSize)?;
    if declared != contents.len() || declared < size_of::<T>() {
        return Err(DescriptorError::InvalidSize);
    }
    Ok((header, payload))
}

/// Verifies that `payload` holds nothing but the up-to-7 padding bytes left
/// after the variable fields, catching miscounted length prefixes.
pub(super) fn check_trailing_padding(payload: &[u8]) -> DescriptorResult<()> {
    if payload.len() < 8 && payload.iter().all(|b| *b == 0) {
        Ok(())
    } else {
        Err(DescriptorError::InvalidSize)
    }
}

/// Extracts the nul-terminated string from a fixed-size algorithm field.
pub(super) fn fixed_str(field: &[u8]) -> DescriptorResult<&str> {
    let nul = field.iter().position(|b| *b == 0).ok_or(DescriptorError::InvalidValue)?;
    from_utf8(&field[..nul]).map_err(|_| DescriptorError::InvalidUtf8)
}

/// Validates and converts a partition name payload.
pub(super) fn partition_name_str(name: &[u8]) -> DescriptorResult<&str> {
    if name.len() > super::MAX_PARTITION_NAME_LEN {
        return Err(DescriptorError::InvalidValue);
    }
    from_utf8(name).map_err(|_| DescriptorError::InvalidUtf8)
}

/// Access to the common prefix embedded in each typed descriptor header.
pub(super) trait HasDescriptorHeader {
    fn num_bytes_following(&self) -> u64;
}
