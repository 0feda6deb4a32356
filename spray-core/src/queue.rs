//! Forward queue: bounded, insertion-ordered store of in-flight messages.
//!
//! Each entry remembers the lifetime it was last armed with. The timer itself is owned by
//! the host; the engine arms and stops it through actions keyed by `EntryId`.

use std::time::Duration;

use crate::protocol::{Header, PacketKey, Payload};

/// Handle to a queue entry. Never reused, so a late timer for a retired entry is detectable.
/// Ids grow with insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: EntryId,
    pub header: Header,
    pub payload: Payload,
    pub lifetime: Duration,
}

/// Admission refused: the queue is at capacity. Nothing was changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("forward queue full ({capacity} packets)")]
pub struct QueueFull {
    pub capacity: usize,
}

pub struct ForwardQueue {
    entries: Vec<Entry>,
    capacity: usize,
    next_id: u64,
}

impl ForwardQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Append a new entry at the tail of the rotation.
    /// Callers check `find` first; the key is not re-checked here.
    pub fn enqueue(
        &mut self,
        header: Header,
        payload: Payload,
        lifetime: Duration,
    ) -> Result<EntryId, QueueFull> {
        if self.is_full() {
            return Err(QueueFull {
                capacity: self.capacity,
            });
        }
        let id = EntryId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            header,
            payload,
            lifetime,
        });
        Ok(id)
    }

    pub fn find(&self, key: &PacketKey) -> Option<EntryId> {
        self.entries
            .iter()
            .find(|e| e.header.key() == *key)
            .map(|e| e.id)
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Record a new lifetime for the entry. Returns false if the entry is gone.
    pub fn rearm(&mut self, id: EntryId, lifetime: Duration) -> bool {
        match self.get_mut(id) {
            Some(e) => {
                e.lifetime = lifetime;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: EntryId) -> Option<Entry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos))
    }

    /// Entries in insertion (rotation) order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Entry following `after` in rotation order. If `after` has been removed, this is the
    /// entry that followed it. Wraps to the head when `after` is `None` or nothing follows it.
    /// `None` only when the queue is empty.
    pub fn next_after(&self, after: Option<EntryId>) -> Option<&Entry> {
        let next = match after {
            Some(id) => self.entries.partition_point(|e| e.id <= id),
            None => 0,
        };
        self.entries.get(next).or_else(|| self.entries.first())
    }

    pub fn is_last(&self, id: EntryId) -> bool {
        self.entries.last().map(|e| e.id) == Some(id)
    }

    pub fn clear(&mut self) -> Vec<Entry> {
        std::mem::take(&mut self.entries)
    }
}
