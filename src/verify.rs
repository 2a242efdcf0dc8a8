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

//! Slot verification: loading the top-level vbmeta, walking its chain
//! descriptors, eagerly checking hash descriptors, and enforcing rollback
//! indices.

use crate::cmdline;
use crate::crypto::sha::{Digest, HashAlgorithm, HashContext};
use crate::descriptor::{ChainPartitionDescriptor, Descriptor, Descriptors, HashDescriptor};
use crate::error::{SlotVerifyError, SlotVerifyResult};
use crate::ops::{Ops, PublicKeyTrust};
use crate::vbmeta::{Vbmeta, VbmetaData, VbmetaVerifyResult, VBMETA_MAX_SIZE};
use alloc::borrow::Cow;
use alloc::collections::VecDeque;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use log::{debug, warn};

/// Number of rollback index locations the result can track.
pub const MAX_ROLLBACK_INDEX_LOCATIONS: usize = 32;

/// Deepest chain of vbmeta images the walker will follow.
const MAX_CHAIN_DEPTH: usize = 32;

/// Name of the top-level vbmeta partition, before slot suffixing.
const VBMETA_PARTITION: &str = "vbmeta";

/// Flags modifying slot verification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotVerifyFlags(pub u32);

impl SlotVerifyFlags {
    /// Record hash, signature, rollback, key, and metadata failures in the
    /// result instead of aborting, so an unlocked device can still boot in
    /// a degraded state. I/O and allocation failures stay fatal.
    pub const ALLOW_VERIFICATION_ERROR: u32 = 1 << 0;

    /// Whether nonfatal verification errors are downgraded.
    pub fn allow_verification_error(self) -> bool {
        self.0 & Self::ALLOW_VERIFICATION_ERROR != 0
    }
}

/// Overall outcome of a successful slot verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotVerifyOutcome {
    /// Every image was authenticated against a trusted key.
    Ok,
    /// The top-level image is unsigned (algorithm NONE) or has verification
    /// disabled; metadata was parsed but not authenticated. The caller
    /// decides policy.
    OkNotSigned,
}

/// A failure downgraded and recorded under `ALLOW_VERIFICATION_ERROR`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotVerifyFault {
    /// Malformed metadata.
    InvalidMetadata,
    /// A public key was not accepted.
    PublicKeyRejected,
    /// A stored rollback index exceeded an image's.
    RollbackIndex,
    /// An image requires an unsupported metadata version.
    UnsupportedVersion,
    /// A hash or signature check failed.
    Verification,
}

impl From<crate::vbmeta::VbmetaVerifyError> for SlotVerifyFault {
    fn from(e: crate::vbmeta::VbmetaVerifyError) -> Self {
        match e {
            crate::vbmeta::VbmetaVerifyError::InvalidMetadata => Self::InvalidMetadata,
            crate::vbmeta::VbmetaVerifyError::UnsupportedVersion => Self::UnsupportedVersion,
        }
    }
}

impl SlotVerifyFault {
    fn to_error(self) -> SlotVerifyError {
        match self {
            Self::InvalidMetadata => SlotVerifyError::InvalidMetadata,
            Self::PublicKeyRejected => SlotVerifyError::PublicKeyRejected,
            Self::RollbackIndex => SlotVerifyError::RollbackIndex,
            Self::UnsupportedVersion => SlotVerifyError::UnsupportedVersion,
            Self::Verification => SlotVerifyError::Verification,
        }
    }
}

/// A partition that was loaded and digested against a hash descriptor.
#[derive(Debug)]
pub struct PartitionData<'a> {
    /// Partition name, slot suffix included.
    pub partition_name: String,
    /// The partition image. Borrowed when the ops preloaded fast path
    /// supplied it, owned when read from storage.
    pub data: Cow<'a, [u8]>,
    /// Whether the data came from the preloaded fast path.
    pub preloaded: bool,
}

/// Everything a successful (or downgraded) verification walk produced.
///
/// Owns parsed copies of the vbmeta images; its lifetime is independent of
/// the input buffers except for preloaded partition data.
#[derive(Debug)]
pub struct SlotVerifyData<'a> {
    /// Verified vbmeta images in traversal order.
    pub vbmeta_images: Vec<VbmetaData>,
    /// Loaded images for the partitions the caller requested.
    pub loaded_partitions: Vec<PartitionData<'a>>,
    /// Rollback index values to commit after a successful boot, indexed by
    /// location. Each entry is the maximum seen at that location.
    pub rollback_indexes: [u64; MAX_ROLLBACK_INDEX_LOCATIONS],
    /// Kernel command line assembled from the walk.
    pub cmdline: String,
    /// Trust classification of the top-level signing key.
    pub key_trust: PublicKeyTrust,
    /// Overall outcome; see [`SlotVerifyOutcome`].
    pub outcome: SlotVerifyOutcome,
    /// Failures recorded under `ALLOW_VERIFICATION_ERROR`, in the order
    /// they were hit. Empty when fully verified.
    pub faults: Vec<SlotVerifyFault>,
    /// Device lock state sampled at the start of the walk.
    pub device_unlocked: bool,
}

impl SlotVerifyData<'_> {
    /// Digest over the concatenation of all vbmeta images in traversal
    /// order.
    pub fn vbmeta_digest(&self, algorithm: HashAlgorithm) -> Digest {
        let mut ctx = HashContext::new(algorithm);
        for image in &self.vbmeta_images {
            ctx.update(image.data());
        }
        ctx.finish()
    }

    /// Total size in bytes of all vbmeta images.
    pub fn vbmeta_size(&self) -> usize {
        self.vbmeta_images.iter().map(|i| i.data().len()).sum()
    }

    /// The hash algorithm declared by the top-level image, defaulting to
    /// SHA-256 for unsigned images.
    pub fn vbmeta_hash_algorithm(&self) -> HashAlgorithm {
        self.vbmeta_images
            .first()
            .and_then(|i| {
                crate::vbmeta::Algorithm::from_wire(i.header().algorithm_type.get())
                    .and_then(|a| a.hash_algorithm())
            })
            .unwrap_or(HashAlgorithm::Sha256)
    }
}

/// Verifies the boot slot identified by `slot_suffix`.
///
/// Loads and authenticates `vbmeta{slot_suffix}`, walks its chain
/// descriptors breadth-first, eagerly verifies every hash descriptor,
/// enforces rollback indices, and assembles the kernel command line.
/// `requested_partitions` names the partitions (without suffix) whose
/// verified contents the caller wants back in the result.
///
/// Ops calls, and the images in the result, follow the breadth-first
/// traversal order exactly: a vbmeta's chained siblings are all visited
/// before any of their children. Callers can rely on this for
/// deterministic telemetry.
pub fn slot_verify<'a, O: Ops<'a>>(
    ops: &mut O,
    requested_partitions: &[&str],
    slot_suffix: &str,
    flags: SlotVerifyFlags,
) -> SlotVerifyResult<SlotVerifyData<'a>> {
    if !slot_suffix.is_empty() && !slot_suffix.starts_with('_') {
        return Err(SlotVerifyError::InvalidArgument);
    }
    if requested_partitions.iter().any(|p| p.is_empty()) {
        return Err(SlotVerifyError::InvalidArgument);
    }

    let device_unlocked = ops.read_is_device_unlocked()?;
    debug!(
        "verifying slot {:?}, device is {}",
        slot_suffix,
        if device_unlocked { "unlocked" } else { "locked" }
    );

    let mut walker = Walker {
        ops: &mut *ops,
        requested_partitions,
        slot_suffix,
        allow: flags.allow_verification_error(),
        pending: VecDeque::new(),
        used_locations: Vec::new(),
        found_partitions: Vec::new(),
        verification_disabled: false,
        data: SlotVerifyData {
            vbmeta_images: Vec::new(),
            loaded_partitions: Vec::new(),
            rollback_indexes: [0; MAX_ROLLBACK_INDEX_LOCATIONS],
            cmdline: String::new(),
            key_trust: PublicKeyTrust::Untrusted,
            outcome: SlotVerifyOutcome::Ok,
            faults: Vec::new(),
            device_unlocked,
        },
    };

    walker.verify_vbmeta(VBMETA_PARTITION, true, 0, None)?;
    while let Some(target) = walker.pending.pop_front() {
        walker.verify_vbmeta(
            &target.partition,
            target.use_ab,
            target.depth,
            Some((&target.public_key, target.rollback_index_location)),
        )?;
    }
    walker.check_requested_partitions()?;

    let verification_disabled = walker.verification_disabled;
    let mut data = walker.data;

    let (outcome, hashtree_disabled) = match data.vbmeta_images.first() {
        Some(top) => {
            let flags = crate::vbmeta::VbmetaImageFlags(top.header().flags.get());
            let not_signed = top.verify_result() == VbmetaVerifyResult::OkNotSigned
                || verification_disabled;
            (
                if not_signed { SlotVerifyOutcome::OkNotSigned } else { SlotVerifyOutcome::Ok },
                flags.hashtree_disabled(),
            )
        }
        // Only reachable with ALLOW_VERIFICATION_ERROR after a top-level
        // parse failure.
        None => (SlotVerifyOutcome::Ok, false),
    };
    data.outcome = outcome;

    data.cmdline = cmdline::build(ops, &data, slot_suffix, hashtree_disabled, verification_disabled)
        .map_err(SlotVerifyError::from)?;

    Ok(data)
}

/// A chained vbmeta queued for the breadth-first walk. Owns its fields;
/// the parent's buffer is gone by the time the child is dequeued.
struct ChainTarget {
    partition: String,
    use_ab: bool,
    depth: usize,
    public_key: Vec<u8>,
    rollback_index_location: u32,
}

struct Walker<'a, 'o, O: Ops<'a>> {
    ops: &'o mut O,
    requested_partitions: &'o [&'o str],
    slot_suffix: &'o str,
    allow: bool,
    /// FIFO of chained vbmetas still to visit; drained level by level.
    pending: VecDeque<ChainTarget>,
    /// Rollback index locations seen so far; duplicates are rejected.
    used_locations: Vec<u32>,
    /// Base names of partitions matched by a hash descriptor.
    found_partitions: Vec<String>,
    verification_disabled: bool,
    data: SlotVerifyData<'a>,
}

impl<'a, 'o, O: Ops<'a>> Walker<'a, 'o, O> {
    /// Records `fault` and continues when downgrading is allowed, fails the
    /// walk otherwise.
    fn nonfatal(&mut self, fault: SlotVerifyFault) -> SlotVerifyResult<()> {
        if self.allow {
            self.data.faults.push(fault);
            Ok(())
        } else {
            Err(fault.to_error())
        }
    }

    fn suffixed_name(&self, base: &str, use_ab: bool) -> String {
        if use_ab {
            format!("{}{}", base, self.slot_suffix)
        } else {
            base.to_string()
        }
    }

    /// Loads, authenticates, and processes one vbmeta image, enqueueing its
    /// chain descriptors at the back of the walk queue. `pinned` carries
    /// the parent chain descriptor's public key and rollback index location
    /// for children.
    fn verify_vbmeta(
        &mut self,
        base: &str,
        use_ab: bool,
        depth: usize,
        pinned: Option<(&[u8], u32)>,
    ) -> SlotVerifyResult<()> {
        if depth > MAX_CHAIN_DEPTH {
            warn!("chain depth limit reached at {base}");
            return Err(SlotVerifyError::InvalidMetadata);
        }
        let name = self.suffixed_name(base, use_ab);
        debug!("loading vbmeta from {name:?}");

        let image: Cow<'a, [u8]> = match self.ops.get_preloaded_partition(&name) {
            Ok(preloaded) => Cow::Borrowed(preloaded),
            Err(_) => {
                let size = self.ops.get_size_of_partition(&name)?;
                let size = usize::try_from(size)
                    .map(|s| s.min(VBMETA_MAX_SIZE))
                    .unwrap_or(VBMETA_MAX_SIZE);
                let mut buffer = vec![0u8; size];
                let read = self.ops.read_from_partition(&name, 0, &mut buffer)?;
                buffer.truncate(read);
                Cow::Owned(buffer)
            }
        };

        let vbmeta = match Vbmeta::verify(&image) {
            Ok(vbmeta) => vbmeta,
            Err(e) => {
                warn!("vbmeta {name:?} rejected: {e}");
                return self.nonfatal(e.into());
            }
        };

        match vbmeta.verify_result() {
            VbmetaVerifyResult::Ok | VbmetaVerifyResult::OkNotSigned => {}
            VbmetaVerifyResult::HashMismatch | VbmetaVerifyResult::SignatureMismatch => {
                warn!("vbmeta {name:?} failed authentication");
                self.nonfatal(SlotVerifyFault::Verification)?;
            }
        }

        // Trust anchoring. Chained images must carry the exact key pinned
        // by their parent; the top-level key is judged by the ops oracle.
        let effective_location = match pinned {
            Some((pinned_key, location)) => {
                if vbmeta.public_key() != Some(pinned_key) {
                    warn!("vbmeta {name:?} key does not match pinned chain key");
                    self.nonfatal(SlotVerifyFault::PublicKeyRejected)?;
                }
                location
            }
            None => {
                let mut location = vbmeta.header().rollback_index_location.get();
                if vbmeta.verify_result() == VbmetaVerifyResult::Ok {
                    // Checked in Vbmeta::verify: signed images carry a key.
                    let public_key = vbmeta.public_key().ok_or(SlotVerifyError::InvalidMetadata)?;
                    let validation = self.ops.validate_vbmeta_public_key(
                        &name,
                        public_key,
                        vbmeta.public_key_metadata(),
                    )?;
                    match validation.trust {
                        PublicKeyTrust::Untrusted => {
                            warn!("root of trust rejected the {name:?} key");
                            self.nonfatal(SlotVerifyFault::PublicKeyRejected)?;
                        }
                        trust => self.data.key_trust = trust,
                    }
                    if location == 0 {
                        location = validation.rollback_index_location;
                    }
                }
                if self.data.vbmeta_images.is_empty()
                    && vbmeta.flags().verification_disabled()
                {
                    self.verification_disabled = true;
                }
                location
            }
        };

        if pinned.is_none() {
            self.check_rollback_location(effective_location)?;
        }
        self.check_rollback_index(effective_location, vbmeta.header().rollback_index.get())?;

        self.data.vbmeta_images.push(VbmetaData::new(
            name.clone(),
            vbmeta.data().to_vec(),
            vbmeta.verify_result(),
        ));

        if self.verification_disabled {
            // Nothing below the header can be trusted to route boot flow.
            return Ok(());
        }

        for descriptor in Descriptors::from_region(vbmeta.descriptors_region()).iter() {
            match descriptor {
                Ok(Descriptor::Hash(hash)) => self.verify_hash_partition(&hash)?,
                Ok(Descriptor::ChainPartition(chain)) => self.enqueue_chain(&chain, depth)?,
                Ok(_) => {}
                Err(e) => {
                    warn!("descriptor in {name:?} is malformed: {e}");
                    self.nonfatal(SlotVerifyFault::InvalidMetadata)?;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Queues a chained vbmeta for the breadth-first walk: all of a
    /// vbmeta's siblings are visited before any of their children.
    fn enqueue_chain(
        &mut self,
        chain: &ChainPartitionDescriptor,
        depth: usize,
    ) -> SlotVerifyResult<()> {
        self.check_rollback_location(chain.rollback_index_location)?;
        self.pending.push_back(ChainTarget {
            partition: chain.partition_name.to_string(),
            use_ab: chain.flags.use_ab(),
            depth: depth + 1,
            public_key: chain.public_key.to_vec(),
            rollback_index_location: chain.rollback_index_location,
        });
        Ok(())
    }

    /// Enforces that rollback index locations are in range and pairwise
    /// distinct across the walk.
    fn check_rollback_location(&mut self, location: u32) -> SlotVerifyResult<()> {
        if location as usize >= MAX_ROLLBACK_INDEX_LOCATIONS
            || self.used_locations.contains(&location)
        {
            warn!("rollback index location {location} is out of range or reused");
            return self.nonfatal(SlotVerifyFault::InvalidMetadata);
        }
        self.used_locations.push(location);
        Ok(())
    }

    /// Enforces monotonicity against the stored counter and records the
    /// intent value to commit after a successful boot.
    fn check_rollback_index(&mut self, location: u32, image_index: u64) -> SlotVerifyResult<()> {
        let Some(slot) = self.data.rollback_indexes.get_mut(location as usize) else {
            return Ok(());
        };
        *slot = (*slot).max(image_index);
        let stored = self.ops.read_rollback_index(location)?;
        if stored > image_index {
            warn!("stored rollback index {stored} at location {location} exceeds image {image_index}");
            return self.nonfatal(SlotVerifyFault::RollbackIndex);
        }
        Ok(())
    }

    /// Loads the partition named by a hash descriptor and checks its digest.
    fn verify_hash_partition(&mut self, descriptor: &HashDescriptor) -> SlotVerifyResult<()> {
        let name = self.suffixed_name(descriptor.partition_name, descriptor.flags.use_ab());
        let Some(algorithm) = HashAlgorithm::from_name(descriptor.hash_algorithm) else {
            warn!("hash descriptor for {name:?} names unknown algorithm");
            return self.nonfatal(SlotVerifyFault::InvalidMetadata);
        };
        if descriptor.digest.len() != algorithm.digest_size() {
            return self.nonfatal(SlotVerifyFault::InvalidMetadata);
        }
        let Ok(image_size) = usize::try_from(descriptor.image_size) else {
            return self.nonfatal(SlotVerifyFault::InvalidMetadata);
        };

        let (data, preloaded): (Cow<'a, [u8]>, bool) =
            match self.ops.get_preloaded_partition(&name) {
                Ok(data) if data.len() >= image_size => {
                    (Cow::Borrowed(&data[..image_size]), true)
                }
                Ok(_) => {
                    warn!("preloaded {name:?} is smaller than its descriptor claims");
                    return self.nonfatal(SlotVerifyFault::InvalidMetadata);
                }
                Err(_) => {
                    let partition_size = self.ops.get_size_of_partition(&name)?;
                    if descriptor.image_size > partition_size {
                        warn!("{name:?} descriptor image size exceeds the partition");
                        return self.nonfatal(SlotVerifyFault::InvalidMetadata);
                    }
                    let mut buffer = vec![0u8; image_size];
                    let read = self.ops.read_from_partition(&name, 0, &mut buffer)?;
                    if read != image_size {
                        return Err(SlotVerifyError::Io);
                    }
                    (Cow::Owned(buffer), false)
                }
            };

        let mut ctx = HashContext::new(algorithm);
        ctx.update(descriptor.salt);
        ctx.update(&data);
        let digest = ctx.finish();
        if digest.as_bytes() != descriptor.digest {
            warn!("{name:?} does not match its hash descriptor");
            self.nonfatal(SlotVerifyFault::Verification)?;
        } else {
            debug!("{name:?} verified ({} bytes)", descriptor.image_size);
        }

        self.found_partitions.push(descriptor.partition_name.to_string());
        if self.requested_partitions.iter().any(|p| *p == descriptor.partition_name) {
            self.data.loaded_partitions.push(PartitionData {
                partition_name: name,
                data,
                preloaded,
            });
        }
        Ok(())
    }

    /// Every requested partition must have been covered by a hash
    /// descriptor somewhere in the walk.
    fn check_requested_partitions(&mut self) -> SlotVerifyResult<()> {
        let missing: Vec<&str> = self
            .requested_partitions
            .iter()
            .filter(|p| !self.found_partitions.iter().any(|f| f == *p))
            .copied()
            .collect();
        for partition in missing {
            warn!("requested partition {partition:?} has no hash descriptor");
            self.nonfatal(SlotVerifyFault::InvalidMetadata)?;
        }
        Ok(())
    }
}
