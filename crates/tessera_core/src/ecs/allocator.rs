//! # Entity Id Allocation
//!
//! A monotonically growing high-water mark plus a FIFO free list.
//!
//! ```text
//! taken:  0 1 _ 3 4 _ _        high_water_mark = 7
//! free:   [2, 5, 6]   (FIFO)
//! ```
//!
//! Free-list membership is tracked in a bitset so that hinted allocation and
//! high-water-mark shrinking never scan the queue. Entries taken out of the
//! middle of the queue are left behind as stale entries and skipped on pop.
//! An id queued more than once is only valid at its latest entry, so a
//! re-released id waits behind every id released before it.

use std::collections::VecDeque;

use super::entity::EntityId;

/// Stale queue entries tolerated before the queue is compacted.
const STALE_SLACK: usize = 64;

/// Largest distance a hint may sit above the high-water mark. Every id in
/// the gap is queued as free.
pub const MAX_HINT_GAP: u32 = 1 << 20;

/// Hands out and recycles entity ids for one world.
#[derive(Clone, Debug, Default)]
pub struct EntityAllocator {
    /// First id that has never been handed out.
    high_water_mark: u32,
    /// Free ids in release order. May contain stale entries.
    free: VecDeque<u32>,
    /// Entries of each id currently in `free`.
    queued: Vec<u32>,
    /// Bitset: 1 = id is on the free list. 64 ids per word.
    free_bits: Vec<u64>,
    /// Number of set bits in `free_bits`.
    free_count: usize,
}

impl EntityAllocator {
    /// Creates an allocator with no id handed out.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            high_water_mark: 0,
            free: VecDeque::new(),
            queued: Vec::new(),
            free_bits: Vec::new(),
            free_count: 0,
        }
    }

    /// Allocates an id.
    ///
    /// A usable `hint` (not null, not taken) is honoured: ids skipped between
    /// the old high-water mark and the hint go to the free list. Otherwise
    /// the oldest free id is reused, or a new id is taken from the mark.
    ///
    /// # Panics
    ///
    /// Panics if the id space is exhausted, or if `hint` is free but more
    /// than [`MAX_HINT_GAP`] ids above the high-water mark.
    pub fn allocate(&mut self, hint: Option<EntityId>) -> EntityId {
        match hint {
            Some(hint) if !hint.is_null() && !self.is_taken(hint) => {
                self.take_hint(hint.index());
                hint
            }
            _ => self.allocate_next(),
        }
    }

    fn allocate_next(&mut self) -> EntityId {
        while let Some(index) = self.free.pop_front() {
            let queued = &mut self.queued[index as usize];
            *queued -= 1;
            let latest = *queued == 0;
            if latest && self.is_free(index) {
                self.clear_free(index);
                return EntityId::new(index);
            }
        }

        let index = self.high_water_mark;
        assert!(index < u32::MAX, "entity id space exhausted");
        self.high_water_mark += 1;
        EntityId::new(index)
    }

    fn take_hint(&mut self, index: u32) {
        if index >= self.high_water_mark {
            assert!(
                index - self.high_water_mark <= MAX_HINT_GAP,
                "entity hint #{index} is more than {MAX_HINT_GAP} ids above the high-water mark {}",
                self.high_water_mark
            );
            for skipped in self.high_water_mark..index {
                self.push_free(skipped);
            }
            self.high_water_mark = index + 1;
        } else {
            self.clear_free(index);
            self.compact_if_stale();
        }
    }

    /// Returns an id to the allocator.
    ///
    /// Releasing the topmost taken id lowers the high-water mark past every
    /// trailing free id instead of queueing it.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not currently taken.
    pub fn release(&mut self, id: EntityId) {
        assert!(self.is_taken(id), "entity {id} is not allocated");

        let index = id.index();
        if index + 1 == self.high_water_mark {
            self.high_water_mark = index;
            while self.high_water_mark > 0 && self.is_free(self.high_water_mark - 1) {
                self.clear_free(self.high_water_mark - 1);
                self.high_water_mark -= 1;
            }
            self.compact_if_stale();
        } else {
            self.push_free(index);
        }
    }

    /// Checks if `id` is handed out (live or reserved).
    #[inline]
    #[must_use]
    pub fn is_taken(&self, id: EntityId) -> bool {
        !id.is_null() && id.index() < self.high_water_mark && !self.is_free(id.index())
    }

    /// First id that has never been handed out.
    #[inline]
    #[must_use]
    pub const fn high_water_mark(&self) -> u32 {
        self.high_water_mark
    }

    /// Number of ids waiting on the free list.
    #[inline]
    #[must_use]
    pub const fn free_count(&self) -> usize {
        self.free_count
    }

    /// Number of ids currently handed out.
    #[inline]
    #[must_use]
    pub const fn taken_count(&self) -> usize {
        self.high_water_mark as usize - self.free_count
    }

    #[inline]
    fn is_free(&self, index: u32) -> bool {
        let (word, mask) = split(index);
        self.free_bits.get(word).is_some_and(|bits| bits & mask != 0)
    }

    fn push_free(&mut self, index: u32) {
        let (word, mask) = split(index);
        if word >= self.free_bits.len() {
            self.free_bits.resize(word + 1, 0);
        }
        self.free_bits[word] |= mask;
        self.free_count += 1;

        let slot = index as usize;
        if slot >= self.queued.len() {
            self.queued.resize(slot + 1, 0);
        }
        self.queued[slot] += 1;
        self.free.push_back(index);
    }

    fn clear_free(&mut self, index: u32) {
        let (word, mask) = split(index);
        self.free_bits[word] &= !mask;
        self.free_count -= 1;
    }

    /// Drops stale entries once they outnumber the live ones.
    ///
    /// When an id was queued more than once only its latest entry is kept.
    fn compact_if_stale(&mut self) {
        if self.free.len() <= self.free_count * 2 + STALE_SLACK {
            return;
        }

        self.queued.fill(0);
        let mut kept = VecDeque::with_capacity(self.free_count);
        for &index in self.free.iter().rev() {
            if self.queued[index as usize] == 0 && self.is_free(index) {
                self.queued[index as usize] = 1;
                kept.push_front(index);
            }
        }
        self.free = kept;
    }
}

#[inline]
const fn split(index: u32) -> (usize, u64) {
    ((index / 64) as usize, 1u64 << (index % 64))
}
