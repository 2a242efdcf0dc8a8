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

//! The capability interface through which the verification core reaches the
//! outside world.
//!
//! The core performs no I/O of its own; every partition read, rollback
//! counter access, and device-state query goes through a caller-supplied
//! [`Ops`] object. Call sites are generic over the implementation, so there
//! is no dynamic dispatch on the verification path.

use crate::error::{IoError, IoResult};
use alloc::string::String;

/// How the root-of-trust oracle classified a public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublicKeyTrust {
    /// The device manufacturer's key; fully trusted.
    DeviceKey,
    /// A key the device owner installed; trusted, but boot state is YELLOW.
    UserKey,
    /// Not trusted.
    Untrusted,
}

/// Response from [`Ops::validate_vbmeta_public_key`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKeyValidation {
    /// Trust classification of the key.
    pub trust: PublicKeyTrust,
    /// Rollback index location to use for the top-level vbmeta when its
    /// header does not name one.
    pub rollback_index_location: u32,
}

/// Environment callbacks used during verification.
///
/// The `'a` lifetime is that of any caller-owned preloaded partition
/// buffers; data returned by [`Ops::get_preloaded_partition`] may be
/// referenced by the verification result without copying.
///
/// Rollback counters are read during verification but never written; the
/// caller commits new values after a successful boot (see
/// [`crate::commit_rollback_indexes`]).
pub trait Ops<'a> {
    /// Reads `buffer.len()` bytes from `partition` starting at `offset`.
    ///
    /// A negative `offset` is relative to the end of the partition. Returns
    /// the number of bytes read, which may be short only when the read runs
    /// to the end of the partition.
    fn read_from_partition(
        &mut self,
        partition: &str,
        offset: i64,
        buffer: &mut [u8],
    ) -> IoResult<usize>;

    /// Fast path returning an already-resident image of `partition`, if the
    /// platform has one.
    fn get_preloaded_partition(&mut self, _partition: &str) -> IoResult<&'a [u8]> {
        Err(IoError::NotImplemented)
    }

    /// Writes `data` to `partition` at `offset`. Only update and unlock
    /// flows use this; the verification core never writes to partitions.
    fn write_to_partition(&mut self, _partition: &str, _offset: i64, _data: &[u8]) -> IoResult<()> {
        Err(IoError::NotImplemented)
    }

    /// The root-of-trust oracle: decides whether `public_key` (with optional
    /// opaque `public_key_metadata`) may sign the top-level vbmeta of
    /// `partition`.
    ///
    /// Not consulted for chained partitions; those are pinned by their
    /// parent's chain descriptor.
    fn validate_vbmeta_public_key(
        &mut self,
        partition: &str,
        public_key: &[u8],
        public_key_metadata: Option<&[u8]>,
    ) -> IoResult<PublicKeyValidation>;

    /// Reads the monotonic rollback counter at `rollback_index_location`.
    fn read_rollback_index(&mut self, rollback_index_location: u32) -> IoResult<u64>;

    /// Writes the monotonic rollback counter at `rollback_index_location`.
    fn write_rollback_index(&mut self, rollback_index_location: u32, index: u64) -> IoResult<()>;

    /// Whether the device is unlocked; drives the boot-state color and the
    /// `androidboot.vbmeta.device_state` cmdline value.
    fn read_is_device_unlocked(&mut self) -> IoResult<bool>;

    /// Returns the unique GUID of `partition` for `PARTUUID=` references on
    /// the kernel command line.
    fn get_unique_guid_for_partition(&mut self, partition: &str) -> IoResult<String>;

    /// Returns the size of `partition` in bytes.
    fn get_size_of_partition(&mut self, partition: &str) -> IoResult<u64>;
}
