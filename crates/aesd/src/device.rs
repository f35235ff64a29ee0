// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Character-device view of the command ring.
//!
//! One [`CommandDevice`] exists per service. Each opener gets a
//! [`DeviceFile`] carrying its own file position. Writes from every opener
//! assemble into a single device-wide pending command.

use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::assembler::{CommandAssembler, FeedPolicy, TERMINATOR};
use crate::error::RingError;
use crate::shared::{LockMode, SharedRing};

#[derive(Debug)]
pub struct CommandDevice {
    ring: SharedRing,
    pending: Mutex<CommandAssembler>,
}

impl CommandDevice {
    pub fn new(capacity: usize, mode: LockMode) -> Arc<Self> {
        Arc::new(Self {
            ring: SharedRing::new(capacity, mode),
            pending: Mutex::new(CommandAssembler::new(FeedPolicy::SinglePerChunk)),
        })
    }

    pub fn ring(&self) -> &SharedRing {
        &self.ring
    }

    /// Open the device. `cancel` interrupts lock waits of this opener.
    pub fn open(self: &Arc<Self>, cancel: CancellationToken) -> DeviceFile {
        DeviceFile { device: Arc::clone(self), pos: 0, cancel }
    }

    /// Release every stored command and the pending one. Returns the number
    /// of commands released.
    pub async fn release(&self) -> usize {
        let discarded = self.pending.lock().await.discard();
        let released = self.ring.teardown().await;
        debug!(released, discarded, "device released");
        released
    }
}

/// An open handle on a [`CommandDevice`].
#[derive(Debug)]
pub struct DeviceFile {
    device: Arc<CommandDevice>,
    pos: u64,
    cancel: CancellationToken,
}

impl DeviceFile {
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read at most `count` bytes from the current position.
    ///
    /// A read never crosses a command boundary. An empty result means no
    /// data is stored at or past the position.
    pub async fn read(&mut self, count: usize) -> Result<Bytes, RingError> {
        let ring = self.device.ring.read_interruptible(&self.cancel).await?;
        let Some(loc) = ring.find_entry_for_offset(self.pos) else {
            return Ok(Bytes::new());
        };
        let mut chunk = loc.remaining();
        chunk.truncate(count);
        self.pos += chunk.len() as u64;
        Ok(chunk)
    }

    /// Consume `buf` up to and including its first terminator.
    ///
    /// Returns the number of bytes consumed; callers loop on short writes.
    /// The file position is reset to the start of the log.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, RingError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let consumed = buf.iter().position(|b| *b == TERMINATOR).map_or(buf.len(), |k| k + 1);

        let mut pending = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(RingError::Interrupted),
            guard = self.device.pending.lock() => guard,
        };
        let mut ring = self.device.ring.write_interruptible(&self.cancel).await?;

        for command in pending.feed(&buf[..consumed])? {
            if let Some(evicted) = ring.insert(command) {
                debug!(bytes = evicted.len(), "evicted oldest command");
            }
        }
        drop(ring);
        drop(pending);

        self.pos = 0;
        Ok(consumed)
    }

    /// Write all of `buf`, looping over short writes.
    pub async fn write_all(&mut self, mut buf: &[u8]) -> Result<(), RingError> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Reposition within `0..=total_size`.
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64, RingError> {
        let size = self.device.ring.total_size(&self.cancel).await?;
        let target: i128 = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(d) => i128::from(self.pos) + i128::from(d),
            SeekFrom::End(d) => i128::from(size) + i128::from(d),
        };
        if target < 0 || target > i128::from(size) {
            return Err(RingError::PositionOutOfRange { position: target, size });
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    /// Move to byte `offset` of live command `command_index`.
    pub async fn seek_to_command(
        &mut self,
        command_index: u32,
        offset: u32,
    ) -> Result<u64, RingError> {
        self.pos =
            self.device.ring.resolve_seek(command_index, u64::from(offset), &self.cancel).await?;
        Ok(self.pos)
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
