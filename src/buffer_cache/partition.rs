use std::collections::VecDeque;

use crate::types::{BlockId, SlotId};

/// Bookkeeping for one slot, owned by whichever partition lists it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Entry {
    pub slot: SlotId,
    /// The block this slot caches, or `None` if it was never used.
    pub key: Option<BlockId>,
    /// Holders (acquired guards plus pins) that have not let go yet.
    pub refs: usize,
    /// Bumped every time the slot is handed to a new block. Slot contents are
    /// tagged with the generation they were loaded for.
    pub generation: u64,
}

impl Entry {
    pub fn new(slot: SlotId) -> Self {
        Self {
            slot,
            key: None,
            refs: 0,
            generation: 0,
        }
    }

    /// Repurpose an unreferenced slot for `key` on behalf of one holder.
    pub fn claim(&mut self, key: BlockId) {
        debug_assert_eq!(self.refs, 0, "claiming a referenced slot");
        self.key = Some(key);
        self.refs = 1;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// A recency-ordered list of slots. The front is the most recently released
/// slot, the back the least recently released one.
#[derive(Debug, Default)]
pub(super) struct Partition {
    entries: VecDeque<Entry>,
}

impl Partition {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn find(&mut self, key: BlockId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.key == Some(key))
    }

    pub fn find_slot(&mut self, slot: SlotId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.slot == slot)
    }

    /// The position of the least recently used unreferenced slot.
    pub fn victim(&self) -> Option<usize> {
        self.entries.iter().rposition(|e| e.refs == 0)
    }

    pub fn get_mut(&mut self, pos: usize) -> &mut Entry {
        &mut self.entries[pos]
    }

    pub fn remove(&mut self, pos: usize) -> Entry {
        self.entries.remove(pos).expect("partition position out of range")
    }

    pub fn push_front(&mut self, entry: Entry) {
        self.entries.push_front(entry);
    }

    pub fn push_back(&mut self, entry: Entry) {
        self.entries.push_back(entry);
    }

    /// Move the slot to the most recently used end.
    pub fn touch(&mut self, slot: SlotId) {
        let pos = self
            .entries
            .iter()
            .position(|e| e.slot == slot)
            .expect("slot is not in this partition");
        if pos != 0 {
            let entry = self.remove(pos);
            self.entries.push_front(entry);
        }
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl '_ + DoubleEndedIterator<Item = &Entry> {
        self.entries.iter()
    }
}
