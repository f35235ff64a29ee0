// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use nix::errno::Errno;

/// Error classes surfaced by the command ring and its wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    AllocationFailure,
    Interrupted,
}

impl ErrorCode {
    /// The errno a device file operation reports for this class.
    pub fn errno(&self) -> Errno {
        match self {
            Self::InvalidArgument => Errno::EINVAL,
            Self::AllocationFailure => Errno::ENOMEM,
            Self::Interrupted => Errno::EINTR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::AllocationFailure => "ALLOCATION_FAILURE",
            Self::Interrupted => "INTERRUPTED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a ring, assembler, or device operation.
///
/// None of these are fatal: the ring is left exactly as it was before the
/// failing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    /// Seek addressed a command index with no live command behind it.
    CommandOutOfRange { index: u32, live: usize },
    /// Seek addressed a live command of zero length.
    EmptyCommand { index: u32 },
    /// Seek offset lies outside the addressed command.
    OffsetOutOfRange { offset: u64, size: u64 },
    /// File position outside `0..=total_size`.
    PositionOutOfRange { position: i128, size: u64 },
    /// Growing a pending command failed.
    Allocation { requested: usize },
    /// Waiting for the shared lock was cancelled.
    Interrupted,
}

impl RingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::CommandOutOfRange { .. }
            | Self::EmptyCommand { .. }
            | Self::OffsetOutOfRange { .. }
            | Self::PositionOutOfRange { .. } => ErrorCode::InvalidArgument,
            Self::Allocation { .. } => ErrorCode::AllocationFailure,
            Self::Interrupted => ErrorCode::Interrupted,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.code() == ErrorCode::InvalidArgument
    }
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandOutOfRange { index, live } => {
                write!(f, "command index {index} out of range ({live} live commands)")
            }
            Self::EmptyCommand { index } => write!(f, "command {index} is empty"),
            Self::OffsetOutOfRange { offset, size } => {
                write!(f, "offset {offset} out of range for command of {size} bytes")
            }
            Self::PositionOutOfRange { position, size } => {
                write!(f, "position {position} out of range for {size} bytes of data")
            }
            Self::Allocation { requested } => {
                write!(f, "failed to allocate {requested} bytes for pending command")
            }
            Self::Interrupted => f.write_str("interrupted while waiting for ring lock"),
        }
    }
}

impl std::error::Error for RingError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
