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

//! Verified-boot metadata (vbmeta) verification.
//!
//! Given a root-of-trust oracle and an [`Ops`] capability object for all
//! environment access, [`slot_verify`] authenticates the top-level vbmeta
//! image of a boot slot, walks its chained vbmetas, eagerly verifies hash
//! descriptors, enforces rollback indices, and assembles the kernel
//! command line. [`resolve_boot_state`] folds the result into the
//! verified-boot color. The [`aftl`] module independently verifies
//! firmware transparency log inclusion proofs attached to vbmeta images.
//!
//! The library performs no I/O of its own and holds no global state; two
//! verifications with disjoint ops objects cannot interfere.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod aftl;
pub mod crypto;
pub mod descriptor;

mod cmdline;
mod error;
mod ops;
mod state;
mod vbmeta;
mod verify;

pub use error::{DescriptorError, DescriptorResult, IoError, IoResult, SlotVerifyError, SlotVerifyResult};
pub use ops::{Ops, PublicKeyTrust, PublicKeyValidation};
pub use state::{commit_rollback_indexes, resolve_boot_state, BootState};
pub use vbmeta::{
    Algorithm, Vbmeta, VbmetaData, VbmetaImageFlags, VbmetaImageHeader, VbmetaVerifyError,
    VbmetaVerifyResult, VBMETA_HEADER_SIZE, VBMETA_MAGIC, VBMETA_MAX_SIZE, VBMETA_VERSION_MAJOR,
    VBMETA_VERSION_MINOR,
};
pub use verify::{
    slot_verify, PartitionData, SlotVerifyData, SlotVerifyFault, SlotVerifyFlags,
    SlotVerifyOutcome, MAX_ROLLBACK_INDEX_LOCATIONS,
};
