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

//! Boot-state policy: folds a verification result and the device lock
//! state into the verified-boot color, and commits rollback indices after
//! a successful boot.

use crate::error::{IoResult, SlotVerifyError, SlotVerifyResult};
use crate::ops::{Ops, PublicKeyTrust};
use crate::verify::{SlotVerifyData, SlotVerifyOutcome};
use log::{info, warn};

/// The verified-boot state communicated to the user and the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootState {
    /// Fully verified with the device manufacturer's key.
    Green,
    /// Fully verified with a key the device owner installed.
    Yellow,
    /// Device unlocked; verification skipped or downgraded.
    Orange,
    /// Verification failed, or the image is unsigned on a locked device.
    Red,
    /// Verification failed because of persistent I/O errors.
    RedEio,
}

/// Computes the boot-state color for a slot verification result.
///
/// GREEN and YELLOW depend only on the key trust; ORANGE requires both an
/// unlocked device and signature checks that were skipped or downgraded.
/// An unsigned top-level image (`OkNotSigned`) maps to RED on a locked
/// device and ORANGE on an unlocked one; callers wanting a stricter policy
/// can refuse `OkNotSigned` outright. Failures recorded under
/// `ALLOW_VERIFICATION_ERROR` also map to ORANGE or RED by lock state.
pub fn resolve_boot_state(
    result: &SlotVerifyResult<SlotVerifyData>,
    device_unlocked: bool,
) -> BootState {
    match result {
        Ok(data) if !data.faults.is_empty() => {
            if device_unlocked {
                BootState::Orange
            } else {
                BootState::Red
            }
        }
        Ok(data) => match data.outcome {
            SlotVerifyOutcome::OkNotSigned if device_unlocked => BootState::Orange,
            SlotVerifyOutcome::OkNotSigned => BootState::Red,
            SlotVerifyOutcome::Ok => match data.key_trust {
                PublicKeyTrust::DeviceKey => BootState::Green,
                PublicKeyTrust::UserKey => BootState::Yellow,
                PublicKeyTrust::Untrusted => BootState::Red,
            },
        },
        Err(SlotVerifyError::Io) => BootState::RedEio,
        Err(_) => BootState::Red,
    }
}

/// Commits the rollback index intents recorded during a verification walk.
///
/// Call after the verified system has actually booted; the walk itself
/// never writes. Counters only move forward: locations whose stored value
/// already meets the intent are left untouched.
pub fn commit_rollback_indexes<'a, O: Ops<'a>>(
    ops: &mut O,
    data: &SlotVerifyData,
) -> IoResult<()> {
    for (location, &value) in data.rollback_indexes.iter().enumerate() {
        if value == 0 {
            continue;
        }
        let location = location as u32;
        let stored = ops.read_rollback_index(location)?;
        if stored < value {
            info!("advancing rollback index at location {location} from {stored} to {value}");
            ops.write_rollback_index(location, value)?;
        } else if stored > value {
            warn!("stored rollback index at location {location} already ahead of {value}");
        }
    }
    Ok(())
}
