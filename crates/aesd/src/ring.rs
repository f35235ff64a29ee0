// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-capacity circular log of newline-terminated write commands.
//!
//! The ring holds up to `capacity` commands. Readers address the log by
//! logical byte offset: the position a byte would have if every live command
//! were concatenated oldest first. When the ring is full, inserting a new
//! command evicts the oldest one and hands its bytes back to the caller.
//!
//! No locking happens here; see [`crate::shared::SharedRing`].

use bytes::Bytes;

use crate::error::RingError;

/// Number of commands retained by default.
pub const DEFAULT_CAPACITY: usize = 10;

/// One stored command. Its size is always the length of the owned bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    data: Bytes,
}

impl Entry {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Physical slot index of an entry inside the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

impl EntryId {
    pub fn slot(&self) -> usize {
        self.0
    }
}

/// Result of resolving a logical offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location<'a> {
    pub id: EntryId,
    pub entry: &'a Entry,
    /// Byte within `entry` that the offset points at.
    pub intra_offset: u64,
}

impl Location<'_> {
    /// Bytes of the entry from `intra_offset` to its end.
    pub fn remaining(&self) -> Bytes {
        self.entry.data.slice(self.intra_offset as usize..)
    }
}

#[derive(Debug)]
pub struct CommandRing {
    entries: Box<[Entry]>,
    in_index: usize,
    out_index: usize,
    full: bool,
    total_size: u64,
}

impl CommandRing {
    /// Create an empty ring. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: vec![Entry::default(); capacity].into_boxed_slice(),
            in_index: 0,
            out_index: 0,
            full: false,
            total_size: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of live commands.
    pub fn len(&self) -> usize {
        if self.full {
            self.capacity()
        } else {
            (self.in_index + self.capacity() - self.out_index) % self.capacity()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.full && self.in_index == self.out_index
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Sum of the sizes of all live commands.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Append a command, evicting the oldest one when the ring is full.
    ///
    /// The evicted bytes are returned to the caller, who releases them.
    pub fn insert(&mut self, data: impl Into<Bytes>) -> Option<Bytes> {
        let entry = Entry::new(data);

        let evicted = if self.full {
            let old = std::mem::take(&mut self.entries[self.in_index]);
            self.out_index = self.advance(self.out_index);
            Some(old)
        } else {
            None
        };

        let evicted_size = evicted.as_ref().map_or(0, Entry::size);
        self.total_size = self.total_size - evicted_size + entry.size();

        self.entries[self.in_index] = entry;
        self.in_index = self.advance(self.in_index);
        self.full = self.in_index == self.out_index;

        evicted.map(Entry::into_bytes)
    }

    /// Live entries, oldest first, paired with their slot.
    pub fn iter_live(&self) -> LiveEntries<'_> {
        LiveEntries { ring: self, next: 0, len: self.len() }
    }

    /// Look up a live entry by slot.
    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.iter_live().find(|(live, _)| *live == id).map(|(_, entry)| entry)
    }

    /// Map a logical byte offset to the entry containing it.
    ///
    /// Returns `None` when `offset` is at or past [`total_size`](Self::total_size),
    /// meaning not enough data has been written yet.
    pub fn find_entry_for_offset(&self, offset: u64) -> Option<Location<'_>> {
        let mut remaining = offset;
        for (id, entry) in self.iter_live() {
            if remaining < entry.size() {
                return Some(Location { id, entry, intra_offset: remaining });
            }
            remaining -= entry.size();
        }
        None
    }

    /// Logical offset of byte `intra_offset` within the `command_index`-th
    /// live command (0 = oldest).
    pub fn resolve_seek(&self, command_index: u32, intra_offset: u64) -> Result<u64, RingError> {
        let live = self.len();
        let index = command_index as usize;
        if index >= live {
            return Err(RingError::CommandOutOfRange { index: command_index, live });
        }

        let mut position = 0u64;
        for (i, (_, entry)) in self.iter_live().enumerate() {
            if i < index {
                position += entry.size();
                continue;
            }
            if entry.size() == 0 {
                return Err(RingError::EmptyCommand { index: command_index });
            }
            if intra_offset >= entry.size() {
                return Err(RingError::OffsetOutOfRange {
                    offset: intra_offset,
                    size: entry.size(),
                });
            }
            return Ok(position + intra_offset);
        }

        Err(RingError::CommandOutOfRange { index: command_index, live })
    }

    /// Everything from `offset` to the end of the log, one slice per entry.
    pub fn read_from(&self, offset: u64) -> Vec<Bytes> {
        let Some(start) = self.find_entry_for_offset(offset) else {
            return Vec::new();
        };
        let mut chunks = vec![start.remaining()];
        chunks.extend(
            self.iter_live()
                .skip_while(|(id, _)| *id != start.id)
                .skip(1)
                .map(|(_, entry)| entry.data.clone()),
        );
        chunks
    }

    /// Release every live entry, oldest first, and reset to empty.
    pub fn drain(&mut self) -> Vec<Bytes> {
        let ids: Vec<EntryId> = self.iter_live().map(|(id, _)| id).collect();
        let released =
            ids.into_iter().map(|id| std::mem::take(&mut self.entries[id.0]).into_bytes()).collect();
        self.in_index = 0;
        self.out_index = 0;
        self.full = false;
        self.total_size = 0;
        released
    }

    fn advance(&self, index: usize) -> usize {
        (index + 1) % self.capacity()
    }
}

impl Default for CommandRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Iterator over live entries in FIFO order.
#[derive(Debug, Clone)]
pub struct LiveEntries<'a> {
    ring: &'a CommandRing,
    next: usize,
    len: usize,
}

impl<'a> Iterator for LiveEntries<'a> {
    type Item = (EntryId, &'a Entry);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.len {
            return None;
        }
        let slot = (self.ring.out_index + self.next) % self.ring.capacity();
        self.next += 1;
        Some((EntryId(slot), &self.ring.entries[slot]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.len - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for LiveEntries<'_> {}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
