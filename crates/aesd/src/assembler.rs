// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accumulates raw input into newline-terminated commands.

use bytes::Bytes;

use crate::error::RingError;

/// Command terminator.
pub const TERMINATOR: u8 = b'\n';

/// How many commands a single [`CommandAssembler::feed`] call may complete.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FeedPolicy {
    /// At most one command per chunk. Bytes after the first terminator stay
    /// pending and are not re-scanned until [`CommandAssembler::take_buffered`]
    /// is called; later chunks are scanned from their own start only.
    #[default]
    SinglePerChunk,
    /// Every complete command in the chunk is returned.
    DrainAll,
}

impl std::fmt::Display for FeedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SinglePerChunk => f.write_str("single"),
            Self::DrainAll => f.write_str("drain"),
        }
    }
}

impl std::str::FromStr for FeedPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Self::SinglePerChunk),
            "drain" => Ok(Self::DrainAll),
            other => anyhow::bail!("invalid assembly policy: {other}"),
        }
    }
}

/// Pending command for one writer context.
///
/// Dropping the assembler discards any partial command.
#[derive(Debug, Default)]
pub struct CommandAssembler {
    pending: Vec<u8>,
    policy: FeedPolicy,
}

impl CommandAssembler {
    pub fn new(policy: FeedPolicy) -> Self {
        Self { pending: Vec::new(), policy }
    }

    pub fn policy(&self) -> FeedPolicy {
        self.policy
    }

    /// Bytes accumulated but not yet part of a completed command.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Append `bytes` and return the commands they complete.
    ///
    /// Only the newly appended region is searched for terminators. On
    /// allocation failure nothing is appended.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Bytes>, RingError> {
        self.pending
            .try_reserve(bytes.len())
            .map_err(|_| RingError::Allocation { requested: bytes.len() })?;

        let mut scan_from = self.pending.len();
        self.pending.extend_from_slice(bytes);

        let mut completed = Vec::new();
        while let Some(command) = self.split_command(scan_from) {
            completed.push(command);
            if self.policy == FeedPolicy::SinglePerChunk {
                break;
            }
            scan_from = 0;
        }
        Ok(completed)
    }

    /// Extract one command already sitting in the pending buffer, such as
    /// the tail left behind by a [`FeedPolicy::SinglePerChunk`] feed.
    pub fn take_buffered(&mut self) -> Option<Bytes> {
        self.split_command(0)
    }

    /// Throw away the partial command.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending = Vec::new();
        dropped
    }

    fn split_command(&mut self, scan_from: usize) -> Option<Bytes> {
        let k = self.pending[scan_from..].iter().position(|b| *b == TERMINATOR)?;
        let rest = self.pending.split_off(scan_from + k + 1);
        Some(Bytes::from(std::mem::replace(&mut self.pending, rest)))
    }
}

#[cfg(test)]
#[path = "assembler_tests.rs"]
mod tests;
