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

//! Kernel command line descriptors.

use super::util::{check_trailing_padding, parse_descriptor, split_slice, HasDescriptorHeader};
use crate::error::{DescriptorError, DescriptorResult};
use core::str::from_utf8;
use zerocopy::byteorder::{BigEndian, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Conditions under which a kernel command line fragment applies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KernelCommandlineDescriptorFlags(pub u32);

impl KernelCommandlineDescriptorFlags {
    /// Use the fragment only when the hashtree is enabled.
    pub const USE_ONLY_IF_HASHTREE_NOT_DISABLED: u32 = 1 << 0;
    /// Use the fragment only when the hashtree is disabled.
    pub const USE_ONLY_IF_HASHTREE_DISABLED: u32 = 1 << 1;

    /// Whether the fragment applies given the hashtree state.
    pub fn applies(self, hashtree_disabled: bool) -> bool {
        if self.0 & Self::USE_ONLY_IF_HASHTREE_NOT_DISABLED != 0 {
            !hashtree_disabled
        } else if self.0 & Self::USE_ONLY_IF_HASHTREE_DISABLED != 0 {
            hashtree_disabled
        } else {
            true
        }
    }
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct KernelCommandlineDescriptorHeader {
    tag: U64<BigEndian>,
    num_bytes_following: U64<BigEndian>,
    flags: U32<BigEndian>,
    kernel_cmdline_len: U32<BigEndian>,
}

impl HasDescriptorHeader for KernelCommandlineDescriptorHeader {
    fn num_bytes_following(&self) -> u64 {
        self.num_bytes_following.get()
    }
}

/// Wraps a kernel command line descriptor stored in a vbmeta image.
#[derive(Debug, PartialEq, Eq)]
pub struct KernelCommandlineDescriptor<'a> {
    /// Flags.
    pub flags: KernelCommandlineDescriptorFlags,

    /// Command line fragment.
    pub kernel_cmdline: &'a str,
}

impl<'a> KernelCommandlineDescriptor<'a> {
    /// Extracts a `KernelCommandlineDescriptor` from raw big-endian
    /// descriptor contents (including the tag/length prefix).
    pub(super) fn new(contents: &'a [u8]) -> DescriptorResult<Self> {
        let (header, payload) = parse_descriptor::<KernelCommandlineDescriptorHeader>(contents)?;
        let (cmdline, remainder) = split_slice(payload, header.kernel_cmdline_len.get())?;
        check_trailing_padding(remainder)?;

        Ok(Self {
            flags: KernelCommandlineDescriptorFlags(header.flags.get()),
            kernel_cmdline: from_utf8(cmdline).map_err(|_| DescriptorError::InvalidUtf8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(cmdline: &[u8], flags: u32) -> Vec<u8> {
        let num_bytes_following = (8 + cmdline.len() + 7) & !7;
        let mut out = Vec::new();
        out.extend_from_slice(&3u64.to_be_bytes());
        out.extend_from_slice(&(num_bytes_following as u64).to_be_bytes());
        out.extend_from_slice(&flags.to_be_bytes());
        out.extend_from_slice(&(cmdline.len() as u32).to_be_bytes());
        out.extend_from_slice(cmdline);
        out.resize(16 + num_bytes_following, 0);
        out
    }

    #[test]
    fn parses_valid_descriptor() {
        let contents = encode(b"console=ttyS0", 0);
        let descriptor = KernelCommandlineDescriptor::new(&contents).unwrap();
        assert_eq!(descriptor.kernel_cmdline, "console=ttyS0");
        assert!(descriptor.flags.applies(false));
        assert!(descriptor.flags.applies(true));
    }

    #[test]
    fn hashtree_condition_flags() {
        let enabled_only = KernelCommandlineDescriptorFlags(
            KernelCommandlineDescriptorFlags::USE_ONLY_IF_HASHTREE_NOT_DISABLED,
        );
        assert!(enabled_only.applies(false));
        assert!(!enabled_only.applies(true));

        let disabled_only = KernelCommandlineDescriptorFlags(
            KernelCommandlineDescriptorFlags::USE_ONLY_IF_HASHTREE_DISABLED,
        );
        assert!(!disabled_only.applies(false));
        assert!(disabled_only.applies(true));
    }

    #[test]
    fn non_utf8_cmdline_fails() {
        let contents = encode(&[0xff, 0xfe], 0);
        assert_eq!(
            KernelCommandlineDescriptor::new(&contents).unwrap_err(),
            DescriptorError::InvalidUtf8
        );
    }
}
