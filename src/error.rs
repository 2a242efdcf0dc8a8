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

//! Error and Result types for vbmeta verification.

use core::{fmt, result};

/// Status of an operation performed through the [`crate::Ops`] interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoError {
    /// Underlying hardware I/O error; the caller may retry.
    Io,
    /// The named partition does not exist.
    NoSuchPartition,
    /// The requested byte range falls outside the partition.
    RangeOutsidePartition,
    /// Out of memory.
    Oom,
    /// The operation is not implemented by this ops object.
    NotImplemented,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io => write!(f, "I/O error"),
            Self::NoSuchPartition => write!(f, "no such partition"),
            Self::RangeOutsidePartition => write!(f, "range outside partition"),
            Self::Oom => write!(f, "out of memory"),
            Self::NotImplemented => write!(f, "operation not implemented"),
        }
    }
}

/// Result type for [`crate::Ops`] callbacks.
pub type IoResult<T> = result::Result<T, IoError>;

/// Error extracting a descriptor from the vbmeta auxiliary block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorError {
    /// The descriptor header could not be decoded.
    InvalidHeader,
    /// A length field overruns the descriptor or the region.
    InvalidSize,
    /// A field held an invalid value (e.g. an oversized name).
    InvalidValue,
    /// A string field was not valid UTF-8.
    InvalidUtf8,
    /// The descriptor payload was structurally wrong.
    InvalidContents,
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidHeader => write!(f, "invalid descriptor header"),
            Self::InvalidSize => write!(f, "invalid descriptor size"),
            Self::InvalidValue => write!(f, "invalid descriptor value"),
            Self::InvalidUtf8 => write!(f, "invalid descriptor string"),
            Self::InvalidContents => write!(f, "invalid descriptor contents"),
        }
    }
}

/// Result type for descriptor extraction.
pub type DescriptorResult<T> = result::Result<T, DescriptorError>;

/// Slot verification error.
///
/// With `SlotVerifyFlags::ALLOW_VERIFICATION_ERROR` the downgradable
/// classes (everything but `InvalidArgument`, `Io`, and `Oom`) are recorded
/// in the result instead of being returned, so degraded boot states can
/// still use the parsed metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotVerifyError {
    /// A caller-supplied argument was invalid. Always fatal.
    InvalidArgument,
    /// Metadata was malformed (bad magic, overrunning offsets, duplicate
    /// rollback locations, miscounted descriptors).
    InvalidMetadata,
    /// I/O error reading a required partition; the only retryable class.
    Io,
    /// Allocation failure. Always fatal.
    Oom,
    /// The vbmeta public key was not accepted (untrusted root, or a chained
    /// key that does not match its parent's pinned key).
    PublicKeyRejected,
    /// A stored rollback index exceeds the image's rollback index.
    RollbackIndex,
    /// The metadata declares a format version this library does not speak.
    UnsupportedVersion,
    /// A hash or signature check failed.
    Verification,
}

impl fmt::Display for SlotVerifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::InvalidMetadata => write!(f, "invalid metadata"),
            Self::Io => write!(f, "I/O error while verifying"),
            Self::Oom => write!(f, "out of memory while verifying"),
            Self::PublicKeyRejected => write!(f, "public key rejected"),
            Self::RollbackIndex => write!(f, "rollback index violation"),
            Self::UnsupportedVersion => write!(f, "unsupported metadata version"),
            Self::Verification => write!(f, "verification failure"),
        }
    }
}

impl From<IoError> for SlotVerifyError {
    fn from(e: IoError) -> Self {
        match e {
            IoError::Oom => Self::Oom,
            _ => Self::Io,
        }
    }
}

impl From<DescriptorError> for SlotVerifyError {
    fn from(_: DescriptorError) -> Self {
        Self::InvalidMetadata
    }
}

/// Result type for slot verification.
pub type SlotVerifyResult<T> = result::Result<T, SlotVerifyError>;
