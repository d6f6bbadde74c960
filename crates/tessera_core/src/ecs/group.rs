//! # Groups
//!
//! A group keeps the entities that have *every* member component at the
//! front of each member storage's active region, in the same relative
//! order:
//!
//! ```text
//! Position:  [ e4 e1 e7 | e2 e9 ]        matched = 3
//! Velocity:  [ e4 e1 e7 | e3 ]
//!              ^^ ^^ ^^
//!              slot p holds the same entity in both storages
//! ```
//!
//! A consumer walks `0..matched` once and indexes every member storage
//! directly, without a single id lookup.
//!
//! Groups over the same storage must nest (subset or superset). The nested
//! prefixes then form a chain: a superset's matched entities are the first
//! slots of every subset's prefix. Maintenance relies on that chain:
//!
//! - entities join groups smallest set first
//! - entities leave groups largest set first

use std::collections::HashMap;

use super::component::ClassId;
use super::entity::EntityId;
use super::storage::ComponentStorage;

pub(crate) type StorageMap = HashMap<ClassId, ComponentStorage>;

/// How one class set relates to another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupRelation {
    /// Same classes.
    Identical,
    /// No class in common.
    Disjoint,
    /// Every class of the first set is in the second.
    Subset,
    /// Every class of the second set is in the first.
    Superset,
    /// Some classes shared, neither contains the other.
    PartialOverlap,
}

impl GroupRelation {
    /// Classifies `a` against `b`. Both must be sorted and deduplicated.
    #[must_use]
    pub fn between(a: &[ClassId], b: &[ClassId]) -> Self {
        let shared = a.iter().filter(|class| b.binary_search(class).is_ok()).count();
        match shared {
            0 => Self::Disjoint,
            n if n == a.len() && n == b.len() => Self::Identical,
            n if n == a.len() => Self::Subset,
            n if n == b.len() => Self::Superset,
            _ => Self::PartialOverlap,
        }
    }

    /// Returns `true` if groups with this relation can be declared together.
    #[must_use]
    pub const fn can_coexist(self) -> bool {
        !matches!(self, Self::PartialOverlap)
    }
}

/// A declared group: sorted member classes plus the matched count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    class_ids: Vec<ClassId>,
    matched: usize,
}

impl Group {
    /// Member classes, sorted.
    #[must_use]
    pub fn class_ids(&self) -> &[ClassId] {
        &self.class_ids
    }

    /// Number of entities in the matched prefix.
    #[must_use]
    pub const fn matched_count(&self) -> usize {
        self.matched
    }

    /// Checks if `class` is a member.
    #[must_use]
    pub fn contains(&self, class: ClassId) -> bool {
        self.class_ids.binary_search(&class).is_ok()
    }

    /// Checks if `id` has every member component, all active.
    fn matches(&self, id: EntityId, storages: &StorageMap) -> bool {
        self.class_ids
            .iter()
            .all(|class| storages.get(class).is_some_and(|storage| storage.is_active(id)))
    }

    /// Moves `id` to relative slot `target` in every member storage.
    fn move_to(&self, id: EntityId, target: usize, storages: &mut StorageMap) {
        for class in &self.class_ids {
            let storage = member_mut(storages, *class);
            let slot = storage.inactive_len() + target;
            let Some(index) = storage.index_of(id) else {
                panic!("entity {id} is missing from group member {class}");
            };
            storage.swap_slots(index, slot);
        }
    }
}

/// Every group declared on one world.
#[derive(Clone, Debug, Default)]
pub(crate) struct Groups {
    groups: Vec<Group>,
}

impl Groups {
    pub(crate) fn as_slice(&self) -> &[Group] {
        &self.groups
    }

    /// Declares a group over `class_ids` and returns its index.
    ///
    /// Every member storage must already exist in `storages`.
    ///
    /// # Panics
    ///
    /// Panics on fewer than two distinct classes, on the entity class, or on
    /// a partial overlap with an existing group.
    pub(crate) fn declare(&mut self, mut class_ids: Vec<ClassId>, storages: &mut StorageMap) -> usize {
        class_ids.sort_unstable();
        class_ids.dedup();
        assert!(
            class_ids.len() >= 2,
            "a group needs at least two distinct component classes"
        );
        assert!(
            !class_ids.contains(&ClassId::ENTITY),
            "entity signatures cannot be grouped"
        );

        let mut start = 0;
        for (index, existing) in self.groups.iter().enumerate() {
            match GroupRelation::between(&class_ids, &existing.class_ids) {
                GroupRelation::Identical => return index,
                GroupRelation::PartialOverlap => panic!(
                    "group {class_ids:?} partially overlaps group {:?}",
                    existing.class_ids
                ),
                GroupRelation::Subset => start = start.max(existing.matched),
                GroupRelation::Disjoint | GroupRelation::Superset => {}
            }
        }

        let mut group = Group {
            class_ids,
            matched: start,
        };
        group.matched = sweep(&group, storages);

        tracing::debug!(
            classes = ?group.class_ids,
            matched = group.matched,
            "group declared"
        );
        self.groups.push(group);
        self.groups.len() - 1
    }

    /// Length of the grouped block in `class`'s storage.
    pub(crate) fn grouped_len(&self, class: ClassId) -> usize {
        self.groups
            .iter()
            .filter(|group| group.contains(class))
            .map(|group| group.matched)
            .max()
            .unwrap_or(0)
    }

    /// Pulls `id` into every group it now matches after its `class`
    /// component was added or reactivated.
    pub(crate) fn realign(&mut self, class: ClassId, id: EntityId, storages: &mut StorageMap) {
        for index in self.containing(class, false) {
            let group = &mut self.groups[index];
            if !group.matches(id, storages) {
                break;
            }
            let position = relative_slot(member(storages, group.class_ids[0]), id);
            if position.is_some_and(|position| position >= group.matched) {
                group.move_to(id, group.matched, storages);
                group.matched += 1;
            }
        }
    }

    /// Evicts `id` from every group prefix it occupies before its `class`
    /// component is removed or deactivated.
    pub(crate) fn dealign(&mut self, class: ClassId, id: EntityId, storages: &mut StorageMap) {
        for index in self.containing(class, true) {
            let group = &mut self.groups[index];
            let position = relative_slot(member(storages, group.class_ids[0]), id);
            if position.is_some_and(|position| position < group.matched) {
                group.matched -= 1;
                group.move_to(id, group.matched, storages);
            }
        }
    }

    /// Indices of the groups containing `class`, ordered by set size.
    fn containing(&self, class: ClassId, largest_first: bool) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.groups.len())
            .filter(|&index| self.groups[index].contains(class))
            .collect();
        indices.sort_by_key(|&index| self.groups[index].class_ids.len());
        if largest_first {
            indices.reverse();
        }
        indices
    }
}

/// Moves every qualifying entity past `group.matched` into the prefix.
/// Returns the new matched count.
fn sweep(group: &Group, storages: &mut StorageMap) -> usize {
    let Some(&driver) = group
        .class_ids
        .iter()
        .min_by_key(|class| member(storages, **class).active_len())
    else {
        return group.matched;
    };

    let mut matched = group.matched;
    let mut position = matched;
    while position < member(storages, driver).active_len() {
        let storage = member(storages, driver);
        let id = storage.active_ids()[position];
        if group.matches(id, storages) {
            group.move_to(id, matched, storages);
            matched += 1;
        }
        position += 1;
    }
    matched
}

/// Position of `id` relative to the active boundary.
fn relative_slot(storage: &ComponentStorage, id: EntityId) -> Option<usize> {
    storage
        .index_of(id)
        .and_then(|index| index.checked_sub(storage.inactive_len()))
}

fn member(storages: &StorageMap, class: ClassId) -> &ComponentStorage {
    match storages.get(&class) {
        Some(storage) => storage,
        None => panic!("group member {class} has no storage"),
    }
}

fn member_mut(storages: &mut StorageMap, class: ClassId) -> &mut ComponentStorage {
    match storages.get_mut(&class) {
        Some(storage) => storage,
        None => panic!("group member {class} has no storage"),
    }
}
