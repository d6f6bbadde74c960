//! # Sparse Page Table
//!
//! Maps entity ids to dense indices through fixed-size pages.
//!
//! ```text
//! id 2051  ->  page 2051 >> 10 = 2, offset 2051 & 1023 = 3
//!
//! pages: [Some(P0), None, Some(P2)]
//!                          └─ slots[3] = dense index of entity 2051
//! ```
//!
//! Pages are allocated the first time an id in their range is inserted and
//! released as soon as their entry count drops back to zero. Empty trailing
//! page slots are trimmed so the table never outgrows the highest live id.

use crate::ecs::EntityId;

/// Number of id bits addressed inside one page.
pub const PAGE_BITS: u32 = 10;

/// Number of entries per page.
pub const PAGE_SIZE: usize = 1 << PAGE_BITS;

const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Sentinel stored in a page slot that maps to nothing.
const ABSENT: u32 = u32::MAX;

#[derive(Clone, Debug)]
struct Page {
    slots: Box<[u32]>,
    /// Number of non-absent slots.
    len: usize,
}

impl Page {
    fn new() -> Self {
        Self {
            slots: vec![ABSENT; PAGE_SIZE].into_boxed_slice(),
            len: 0,
        }
    }
}

/// Paged `EntityId -> dense index` table.
///
/// # Example
///
/// ```rust,ignore
/// let mut pages = SparsePages::new();
/// pages.insert(EntityId::new(2051), 0);
/// assert_eq!(pages.get(EntityId::new(2051)), Some(0));
/// assert_eq!(pages.page_count(), 3);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SparsePages {
    pages: Vec<Option<Page>>,
    /// Total entries across all pages.
    len: usize,
}

impl SparsePages {
    /// Creates an empty table. No page is allocated until the first insert.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pages: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    const fn split(id: EntityId) -> (usize, usize) {
        let raw = id.index() as usize;
        (raw >> PAGE_BITS, raw & PAGE_MASK)
    }

    /// Returns the dense index stored for `id`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<usize> {
        let (page, offset) = Self::split(id);
        let slot = self.pages.get(page)?.as_ref()?.slots[offset];
        (slot != ABSENT).then_some(slot as usize)
    }

    /// Returns the dense index for an id the caller knows is present.
    ///
    /// # Panics
    ///
    /// Panics if the page of `id` is not allocated. Presence inside an
    /// allocated page is only checked in debug builds.
    #[inline]
    #[must_use]
    pub fn get_unchecked(&self, id: EntityId) -> usize {
        let (page, offset) = Self::split(id);
        match &self.pages[page] {
            Some(page) => {
                let slot = page.slots[offset];
                debug_assert!(slot != ABSENT, "entity {id} is not present");
                slot as usize
            }
            None => panic!("entity {id} has no sparse page"),
        }
    }

    /// Inserts a new mapping, allocating the page if needed.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already mapped or `index` does not fit the table.
    pub fn insert(&mut self, id: EntityId, index: usize) {
        assert!(
            index < ABSENT as usize,
            "dense index {index} exceeds the sparse index range"
        );
        let (page_index, offset) = Self::split(id);
        if page_index >= self.pages.len() {
            self.pages.resize_with(page_index + 1, || None);
        }

        let page = self.pages[page_index].get_or_insert_with(Page::new);
        assert!(
            page.slots[offset] == ABSENT,
            "entity {id} is already present in the sparse table"
        );
        page.slots[offset] = index as u32;
        page.len += 1;
        self.len += 1;
    }

    /// Re-points an existing mapping after its dense slot moved.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not mapped.
    #[inline]
    pub fn set(&mut self, id: EntityId, index: usize) {
        let (page_index, offset) = Self::split(id);
        let slot = self
            .pages
            .get_mut(page_index)
            .and_then(Option::as_mut)
            .map(|page| &mut page.slots[offset]);

        match slot {
            Some(slot) if *slot != ABSENT => *slot = index as u32,
            _ => panic!("entity {id} is not present in the sparse table"),
        }
    }

    /// Removes the mapping for `id`, returning its dense index.
    ///
    /// Frees the page when it becomes empty and trims trailing empty slots.
    pub fn remove(&mut self, id: EntityId) -> Option<usize> {
        let (page_index, offset) = Self::split(id);
        let page = self.pages.get_mut(page_index)?.as_mut()?;
        let slot = std::mem::replace(&mut page.slots[offset], ABSENT);
        if slot == ABSENT {
            return None;
        }

        page.len -= 1;
        self.len -= 1;
        if page.len == 0 {
            self.pages[page_index] = None;
            while matches!(self.pages.last(), Some(None)) {
                self.pages.pop();
            }
        }
        Some(slot as usize)
    }

    /// Number of mapped ids.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no id is mapped.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length of the page directory (allocated or not).
    #[inline]
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of pages currently allocated.
    #[must_use]
    pub fn allocated_pages(&self) -> usize {
        self.pages.iter().filter(|page| page.is_some()).count()
    }

    /// Drops every page.
    pub fn clear(&mut self) {
        self.pages = Vec::new();
        self.len = 0;
    }
}
