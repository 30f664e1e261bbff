//! The process-wide slot table that makes weak resolution safe across
//! slot reuse.
//!
//! Every tracked object occupies exactly one slot for its lifetime. A slot
//! records a type-erased pointer to its occupant plus a generation stamp
//! that changes whenever the occupancy changes, so a `(slot index,
//! generation)` pair uniquely names one occupancy of one slot for the whole
//! process lifetime. Weak handles store exactly that pair and nothing else.

use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use new_zealand::nz;

use crate::constants::ERR_POISONED_LOCK;
use crate::stats;

/// Identifies one slot in the [`Registry`].
///
/// Kept at 32 bits so a weak handle stays at two machine words on 64-bit
/// targets; the table can still address ~4 billion simultaneous objects.
pub type SlotIndex = u32;

/// Stamp distinguishing the current occupant of a slot from every previous
/// occupant of the same slot.
///
/// Advanced on every registration and every invalidation of a slot, so a
/// stale `(index, generation)` pair never matches again. Per-slot wrap-around
/// after ~4 billion reuses of one slot is a documented, accepted risk.
pub type Generation = u32;

/// Reserved [`Generation`] values.
pub(crate) mod generation {
    use super::Generation;

    /// Never stamped onto any occupancy; reported by anchors that were never
    /// registered.
    pub(crate) const NEVER: Generation = 0;

    /// The stamp the first occupant of a fresh slot receives.
    pub(crate) const FIRST: Generation = 1;
}

/// Number of slots appended each time the table has to grow.
///
/// Slots are three words, so this grows the backing storage in 6 KB steps
/// on 64-bit targets.
const GROWTH_INCREMENT: NonZero<usize> = nz!(256);

/// Advances a generation stamp, skipping the reserved
/// [`generation::NEVER`] value on wrap-around.
fn next_generation(current: Generation) -> Generation {
    current.checked_add(1).unwrap_or(generation::FIRST)
}

/// Converts a slot index to a storage index.
fn to_storage_index(index: SlotIndex) -> usize {
    // Infallible on every target with at least 32-bit pointers.
    usize::try_from(index).expect("SlotIndex must fit in usize")
}

#[derive(Debug)]
enum SlotContents {
    /// The slot is bound to a live object.
    Occupied {
        /// Type-erased pointer to the occupant. The registry never
        /// dereferences it; it is handed back from lookups as an opaque
        /// token of liveness.
        object: NonNull<()>,
    },

    /// The slot is on the free list.
    Vacant {
        /// Index of the next slot on the free list. Points one past the end
        /// of the slot storage when this is the last free slot.
        next_free_index: usize,
    },
}

#[derive(Debug)]
struct Slot {
    /// Stamp of the current occupancy (or, while vacant, of the most recent
    /// invalidation). Strictly different from the stamp handed out for any
    /// previous occupancy of this slot.
    generation: Generation,

    contents: SlotContents,
}

/// The slot storage behind the registry's lock.
#[derive(Debug)]
pub(crate) struct Slots {
    slots: Vec<Slot>,

    /// Index of the next slot to hand out. Points one past the end of
    /// `slots` when the free list is empty.
    next_free_index: usize,

    /// Number of occupied slots.
    count: usize,
}

impl Slots {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_free_index: 0,
            count: 0,
        }
    }

    /// Appends a chunk of vacant slots, chained onto the free list in
    /// ascending index order.
    fn grow(&mut self) {
        let old_len = self.slots.len();
        let new_len = old_len
            .checked_add(GROWTH_INCREMENT.get())
            .expect("slot table exceeded usize::MAX entries");

        self.slots.reserve(GROWTH_INCREMENT.get());

        for index in old_len..new_len {
            self.slots.push(Slot {
                generation: generation::NEVER,
                contents: SlotContents::Vacant {
                    next_free_index: index
                        .checked_add(1)
                        .expect("slot table exceeded usize::MAX entries"),
                },
            });
        }

        debug_assert_eq!(self.next_free_index, old_len);
    }

    fn register(&mut self, object: NonNull<()>) -> (SlotIndex, Generation) {
        if self.next_free_index == self.slots.len() {
            self.grow();
        }

        let index = self.next_free_index;

        // Registering more than SlotIndex::MAX simultaneous objects is
        // unsupported; there is no degraded mode in which objects lack an
        // identity, so we treat it as fatal.
        let slot_index =
            SlotIndex::try_from(index).expect("slot table exhausted - too many live objects");

        let slot = self
            .slots
            .get_mut(index)
            .expect("free list pointed out of bounds");

        let SlotContents::Vacant { next_free_index } = slot.contents else {
            panic!("free list pointed at an occupied slot");
        };

        self.next_free_index = next_free_index;

        let generation = next_generation(slot.generation);
        slot.generation = generation;
        slot.contents = SlotContents::Occupied { object };

        self.count = self
            .count
            .checked_add(1)
            .expect("occupied slot count cannot exceed slot count");

        (slot_index, generation)
    }

    pub(crate) fn lookup(
        &self,
        slot_index: SlotIndex,
        generation: Generation,
    ) -> Option<NonNull<()>> {
        let slot = self.slots.get(to_storage_index(slot_index))?;

        if slot.generation != generation {
            return None;
        }

        match slot.contents {
            SlotContents::Occupied { object } => Some(object),
            SlotContents::Vacant { .. } => None,
        }
    }

    fn advance_generation(&mut self, slot_index: SlotIndex) -> Generation {
        let slot = self
            .slots
            .get_mut(to_storage_index(slot_index))
            .expect("generation advance on out-of-bounds slot");

        debug_assert!(
            matches!(slot.contents, SlotContents::Occupied { .. }),
            "generation advance on a vacant slot"
        );

        let generation = next_generation(slot.generation);
        slot.generation = generation;
        generation
    }

    fn release(&mut self, slot_index: SlotIndex) {
        let index = to_storage_index(slot_index);
        let next_free_index = self.next_free_index;

        let slot = self
            .slots
            .get_mut(index)
            .expect("release of out-of-bounds slot");

        assert!(
            matches!(slot.contents, SlotContents::Occupied { .. }),
            "double release of slot {slot_index}"
        );

        slot.contents = SlotContents::Vacant { next_free_index };
        self.next_free_index = index;

        self.count = self
            .count
            .checked_sub(1)
            .expect("released a slot while occupied count was zero");
    }

    #[cfg(debug_assertions)]
    fn integrity_check(&self) {
        let mut free_seen = 0_usize;
        let mut cursor = self.next_free_index;

        while cursor != self.slots.len() {
            assert!(
                free_seen < self.slots.len(),
                "free list is longer than the slot storage - cycle suspected"
            );

            let slot = self
                .slots
                .get(cursor)
                .unwrap_or_else(|| panic!("free list points out of bounds: {cursor}"));

            let SlotContents::Vacant { next_free_index } = slot.contents else {
                panic!("free list points at occupied slot {cursor}");
            };

            cursor = next_free_index;
            free_seen = free_seen.checked_add(1).expect("bounded by slot count");
        }

        let occupied = self
            .slots
            .iter()
            .filter(|slot| matches!(slot.contents, SlotContents::Occupied { .. }))
            .count();

        assert_eq!(
            occupied, self.count,
            "occupied slot count does not match bookkeeping"
        );

        assert_eq!(
            free_seen,
            self.slots.len().checked_sub(occupied).expect(
                "occupied count cannot exceed slot count after the partition check above"
            ),
            "every vacant slot must be reachable through the free list"
        );
    }
}

// SAFETY: The slot storage holds object pointers purely as opaque tokens and
// never dereferences them. Whether the pointed-to objects may be touched from
// another thread is decided by the handle types, which bound their target
// types with Send/Sync as appropriate.
unsafe impl Send for Slots {}

// SAFETY: See above; all shared access goes through the registry's RwLock.
unsafe impl Sync for Slots {}

/// The process-wide table of tracked-object slots.
///
/// Weak handles name their target as a `(slot index, generation)` pair and
/// resolve it through this table on every access, which is what makes them
/// immune to their target's memory being freed and reused. Handles interact
/// with the table internally; the public surface is limited to occupancy
/// diagnostics.
///
/// # Example
///
/// ```
/// let registry = tether::Registry::global();
///
/// // The table never shrinks; capacity only grows with demand.
/// assert!(registry.capacity() >= registry.len());
/// ```
#[derive(Debug)]
pub struct Registry {
    slots: RwLock<Slots>,
}

static GLOBAL_REGISTRY: OnceLock<Registry> = OnceLock::new();

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            slots: RwLock::new(Slots::new()),
        }
    }

    /// Returns the registry every handle in the process resolves through.
    ///
    /// Created on first use and lives until the process exits.
    #[must_use]
    pub fn global() -> &'static Self {
        GLOBAL_REGISTRY.get_or_init(Self::new)
    }

    /// Binds `object` into a free slot and returns the identity pair stamped
    /// onto that occupancy.
    ///
    /// Amortized O(1); grows the backing storage by a fixed increment when
    /// the free list is empty. Panics if the table cannot grow - an object
    /// that cannot obtain an identity has no safe degraded mode.
    pub(crate) fn register(&self, object: NonNull<()>) -> (SlotIndex, Generation) {
        let pair = self.write_slots().register(object);

        stats::object_registered();

        pair
    }

    /// Replaces the slot's stamp so every `(index, generation)` pair handed
    /// out for the current occupancy stops resolving. The slot remains bound
    /// to its occupant.
    ///
    /// Returns the new stamp so the occupant can be re-stamped when it is
    /// staying alive (see [`Strong::invalidate_weaks`][1]).
    ///
    /// [1]: crate::Strong::invalidate_weaks
    pub(crate) fn advance_generation(&self, slot_index: SlotIndex) -> Generation {
        self.write_slots().advance_generation(slot_index)
    }

    /// Clears a slot and returns it to the free list for reuse.
    ///
    /// The caller must have already advanced the slot's generation; this is
    /// the second half of unregistration, performed after the occupant's
    /// destructor has run.
    pub(crate) fn release(&self, slot_index: SlotIndex) {
        self.write_slots().release(slot_index);

        stats::object_unregistered();
    }

    /// Resolves an identity pair to the occupant it was stamped onto.
    ///
    /// Returns `None` when the index is out of range, the slot is vacant or
    /// the stamp belongs to a previous occupancy. O(1), allocation-free;
    /// this is the single operation behind every weak-handle access.
    #[inline]
    pub(crate) fn lookup(
        &self,
        slot_index: SlotIndex,
        generation: Generation,
    ) -> Option<NonNull<()>> {
        self.read_slots().lookup(slot_index, generation)
    }

    /// Takes the table's shared lock so the caller can pair a lookup with a
    /// refcount operation that must not race slot invalidation.
    ///
    /// The destroying thread takes the exclusive lock to invalidate a slot
    /// before it frees the occupant, so the occupant of any slot that still
    /// resolves under this guard cannot be freed while the guard is held.
    pub(crate) fn read_slots(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read().expect(ERR_POISONED_LOCK)
    }

    fn write_slots(&self) -> RwLockWriteGuard<'_, Slots> {
        self.slots.write().expect(ERR_POISONED_LOCK)
    }

    /// Number of live tracked objects registered in this table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_slots().count
    }

    /// Whether the table currently has no occupants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots currently backing the table, occupied or not.
    ///
    /// Never decreases: indices already handed out must stay stable, so
    /// slots are recycled rather than released.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.read_slots().slots.len()
    }

    /// Verifies the free list and occupancy bookkeeping, panicking on any
    /// inconsistency. Intended for tests and for callers chasing suspected
    /// corruption.
    #[cfg(debug_assertions)]
    pub fn integrity_check(&self) {
        self.read_slots().integrity_check();
    }
}
