// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock discipline around the command ring.
//!
//! Writers always exclude each other and all readers. In
//! [`LockMode::SharedRead`] readers may overlap each other; in
//! [`LockMode::Exclusive`] every operation is serialized.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

use crate::error::RingError;
use crate::ring::{CommandRing, EntryId};

/// Shared handle passed to every execution context.
pub type RingHandle = Arc<SharedRing>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// One mutex for reads and writes alike.
    Exclusive,
    /// Reader/writer lock; reads run concurrently.
    #[default]
    SharedRead,
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exclusive => f.write_str("exclusive"),
            Self::SharedRead => f.write_str("shared"),
        }
    }
}

impl std::str::FromStr for LockMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exclusive" => Ok(Self::Exclusive),
            "shared" => Ok(Self::SharedRead),
            other => anyhow::bail!("invalid lock mode: {other}"),
        }
    }
}

/// Owned copy of a resolved offset, valid after the lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    pub id: EntryId,
    pub intra_offset: u64,
    pub size: u64,
}

#[derive(Debug)]
enum Guarded {
    Exclusive(Mutex<CommandRing>),
    Shared(RwLock<CommandRing>),
}

/// Command ring behind the configured lock.
#[derive(Debug)]
pub struct SharedRing {
    inner: Guarded,
}

pub enum ReadGuard<'a> {
    Exclusive(MutexGuard<'a, CommandRing>),
    Shared(RwLockReadGuard<'a, CommandRing>),
}

impl Deref for ReadGuard<'_> {
    type Target = CommandRing;

    fn deref(&self) -> &CommandRing {
        match self {
            Self::Exclusive(g) => g,
            Self::Shared(g) => g,
        }
    }
}

pub enum WriteGuard<'a> {
    Exclusive(MutexGuard<'a, CommandRing>),
    Shared(RwLockWriteGuard<'a, CommandRing>),
}

impl Deref for WriteGuard<'_> {
    type Target = CommandRing;

    fn deref(&self) -> &CommandRing {
        match self {
            Self::Exclusive(g) => g,
            Self::Shared(g) => g,
        }
    }
}

impl DerefMut for WriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut CommandRing {
        match self {
            Self::Exclusive(g) => g,
            Self::Shared(g) => g,
        }
    }
}

impl SharedRing {
    pub fn new(capacity: usize, mode: LockMode) -> Self {
        let ring = CommandRing::new(capacity);
        let inner = match mode {
            LockMode::Exclusive => Guarded::Exclusive(Mutex::new(ring)),
            LockMode::SharedRead => Guarded::Shared(RwLock::new(ring)),
        };
        Self { inner }
    }

    pub fn mode(&self) -> LockMode {
        match self.inner {
            Guarded::Exclusive(_) => LockMode::Exclusive,
            Guarded::Shared(_) => LockMode::SharedRead,
        }
    }

    pub async fn read(&self) -> ReadGuard<'_> {
        match &self.inner {
            Guarded::Exclusive(m) => ReadGuard::Exclusive(m.lock().await),
            Guarded::Shared(rw) => ReadGuard::Shared(rw.read().await),
        }
    }

    pub async fn write(&self) -> WriteGuard<'_> {
        match &self.inner {
            Guarded::Exclusive(m) => WriteGuard::Exclusive(m.lock().await),
            Guarded::Shared(rw) => WriteGuard::Shared(rw.write().await),
        }
    }

    /// Acquire the read side unless `cancel` fires first.
    pub async fn read_interruptible(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ReadGuard<'_>, RingError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RingError::Interrupted),
            guard = self.read() => Ok(guard),
        }
    }

    /// Acquire the write side unless `cancel` fires first.
    pub async fn write_interruptible(
        &self,
        cancel: &CancellationToken,
    ) -> Result<WriteGuard<'_>, RingError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RingError::Interrupted),
            guard = self.write() => Ok(guard),
        }
    }

    /// Insert one command. Evicted bytes, if any, belong to the caller.
    pub async fn insert(
        &self,
        command: Bytes,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, RingError> {
        let mut ring = self.write_interruptible(cancel).await?;
        Ok(ring.insert(command))
    }

    pub async fn find_entry_for_offset(
        &self,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<Option<EntryLocation>, RingError> {
        let ring = self.read_interruptible(cancel).await?;
        Ok(ring.find_entry_for_offset(offset).map(|loc| EntryLocation {
            id: loc.id,
            intra_offset: loc.intra_offset,
            size: loc.entry.size(),
        }))
    }

    pub async fn resolve_seek(
        &self,
        command_index: u32,
        intra_offset: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, RingError> {
        let ring = self.read_interruptible(cancel).await?;
        ring.resolve_seek(command_index, intra_offset)
    }

    pub async fn iterate_live(&self, cancel: &CancellationToken) -> Result<Vec<EntryId>, RingError> {
        let ring = self.read_interruptible(cancel).await?;
        Ok(ring.iter_live().map(|(id, _)| id).collect())
    }

    pub async fn total_size(&self, cancel: &CancellationToken) -> Result<u64, RingError> {
        Ok(self.read_interruptible(cancel).await?.total_size())
    }

    /// Consistent snapshot of the log from `offset` to its end.
    pub async fn read_from(
        &self,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Bytes>, RingError> {
        Ok(self.read_interruptible(cancel).await?.read_from(offset))
    }

    /// Release every live entry; returns how many were released.
    pub async fn teardown(&self) -> usize {
        self.write().await.drain().len()
    }
}

#[cfg(test)]
#[path = "shared_tests.rs"]
mod tests;
