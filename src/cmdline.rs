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

//! Kernel command line assembly.
//!
//! The command line starts with `androidboot.vbmeta.*` values describing
//! the verification outcome, followed by a dm-verity target rendered from
//! each hashtree descriptor and the fragments carried by kernel-cmdline
//! descriptors.

use crate::descriptor::{Descriptor, HashtreeDescriptor};
use crate::error::IoError;
use crate::ops::Ops;
use crate::vbmeta::{VBMETA_VERSION_MAJOR, VBMETA_VERSION_MINOR};
use crate::verify::SlotVerifyData;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use log::warn;

const PARTUUID_SUBSTITUTIONS: [(&str, &str); 3] = [
    ("$(ANDROID_SYSTEM_PARTUUID)", "system"),
    ("$(ANDROID_BOOT_PARTUUID)", "boot"),
    ("$(ANDROID_VBMETA_PARTUUID)", "vbmeta"),
];

pub(crate) fn build<'a, O: Ops<'a>>(
    ops: &mut O,
    data: &SlotVerifyData,
    slot_suffix: &str,
    hashtree_disabled: bool,
    verification_disabled: bool,
) -> Result<String, IoError> {
    let mut parts: Vec<String> = Vec::new();
    parts.push(format!(
        "androidboot.vbmeta.device_state={}",
        if data.device_unlocked { "unlocked" } else { "locked" }
    ));

    if verification_disabled {
        parts.push("androidboot.veritymode=disabled".to_string());
        return Ok(parts.join(" "));
    }

    let algorithm = data.vbmeta_hash_algorithm();
    parts.push(format!("androidboot.vbmeta.hash_alg={}", algorithm.name()));
    parts.push(format!("androidboot.vbmeta.size={}", data.vbmeta_size()));
    parts.push(format!(
        "androidboot.vbmeta.digest={}",
        hex::encode(data.vbmeta_digest(algorithm).as_bytes())
    ));
    parts.push(format!(
        "androidboot.vbmeta.avb_version={VBMETA_VERSION_MAJOR}.{VBMETA_VERSION_MINOR}"
    ));
    parts.push(format!(
        "androidboot.veritymode={}",
        if hashtree_disabled { "disabled" } else { "enforcing" }
    ));

    for image in &data.vbmeta_images {
        let Ok(descriptors) = image.descriptors() else {
            continue;
        };
        for descriptor in descriptors {
            match descriptor {
                Descriptor::Hashtree(hashtree) if !hashtree_disabled => {
                    if let Some(entry) = hashtree_entry(ops, &hashtree, slot_suffix)? {
                        parts.push(entry);
                    }
                }
                Descriptor::KernelCommandline(cmdline)
                    if cmdline.flags.applies(hashtree_disabled) =>
                {
                    parts.push(substitute(ops, cmdline.kernel_cmdline, slot_suffix)?);
                }
                _ => {}
            }
        }
    }

    Ok(parts.join(" "))
}

/// Renders a hashtree descriptor as a dm-verity target line.
fn hashtree_entry<'a, O: Ops<'a>>(
    ops: &mut O,
    descriptor: &HashtreeDescriptor,
    slot_suffix: &str,
) -> Result<Option<String>, IoError> {
    let data_block_size = u64::from(descriptor.data_block_size);
    let hash_block_size = u64::from(descriptor.hash_block_size);
    if data_block_size == 0 || hash_block_size == 0 {
        warn!(
            "hashtree descriptor for {:?} has zero block sizes, skipping",
            descriptor.partition_name
        );
        return Ok(None);
    }

    let name = if descriptor.flags.use_ab() {
        format!("{}{}", descriptor.partition_name, slot_suffix)
    } else {
        descriptor.partition_name.to_string()
    };
    let guid = ops.get_unique_guid_for_partition(&name)?;

    let num_sectors = descriptor.image_size / 512;
    let num_data_blocks = descriptor.image_size / data_block_size;
    let hash_start_block = descriptor.tree_offset / hash_block_size;
    let root_digest = hex::encode(descriptor.root_digest);
    let salt = if descriptor.salt.is_empty() { "-".to_string() } else { hex::encode(descriptor.salt) };

    let options = if descriptor.fec_size > 0 {
        let fec_block = descriptor.fec_offset / data_block_size;
        format!(
            "10 restart_on_corruption ignore_zero_blocks use_fec_from_device PARTUUID={guid} \
             fec_roots {} fec_blocks {fec_block} fec_start {fec_block}",
            descriptor.fec_num_roots
        )
    } else {
        "2 restart_on_corruption ignore_zero_blocks".to_string()
    };

    Ok(Some(format!(
        "dm=\"1 vroot none ro 1,0 {num_sectors} verity {} PARTUUID={guid} PARTUUID={guid} \
         {data_block_size} {hash_block_size} {num_data_blocks} {hash_start_block} {} \
         {root_digest} {salt} {options}\"",
        descriptor.dm_verity_version, descriptor.hash_algorithm
    )))
}

/// Replaces `$(ANDROID_*_PARTUUID)` placeholders with partition GUIDs.
fn substitute<'a, O: Ops<'a>>(
    ops: &mut O,
    fragment: &str,
    slot_suffix: &str,
) -> Result<String, IoError> {
    let mut out = fragment.to_string();
    for (token, partition) in PARTUUID_SUBSTITUTIONS {
        if out.contains(token) {
            let guid = ops.get_unique_guid_for_partition(&format!("{partition}{slot_suffix}"))?;
            out = out.replace(token, &guid);
        }
    }
    Ok(out)
}
