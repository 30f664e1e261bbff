//! The per-object state that makes a type trackable.
//!
//! A participating type embeds an [`Anchor`] as a field and implements
//! [`Anchored`] by exposing it. The anchor carries the intrusive strong
//! counter and remembers which registry slot the object occupies, which is
//! why handles need no separate control-block allocation.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{self, AtomicU32, Ordering};
use std::thread;

use crate::registry::{Generation, SlotIndex, generation};
use crate::stats;

/// Strong counts beyond this are treated as a runaway leak and refused.
///
/// Half the counter's range; even with 8-byte handles that is far more
/// handles than fit in any real address space, so hitting it means the
/// count is being incremented without corresponding handles.
pub(crate) const MAX_STRONG_COUNT: u32 = u32::MAX >> 1;

/// The embedded tracking state of one object.
///
/// Holds the strong-reference counter plus the `(slot index, generation)`
/// identity the object was stamped with when it was registered. Create one
/// with [`Anchor::new()`] as a field initializer; everything else happens
/// through handles.
///
/// An anchor is deliberately not `Clone`: copying one would fork a
/// reference count, so participating types cannot derive `Clone` either.
pub struct Anchor {
    /// Number of strong handles keeping the object alive.
    strong_count: AtomicU32,

    /// Slot occupied by this object; meaningless until `generation` is set.
    slot_index: AtomicU32,

    /// The stamp of this object's occupancy, or [`generation::NEVER`] while
    /// unregistered. This is the value every weak handle derived from the
    /// object carries and must match at resolve time.
    generation: AtomicU32,

    /// Head of this object's holder-record chain in the ledger.
    #[cfg(feature = "holder-tracking")]
    holder_head: AtomicU32,
}

impl Anchor {
    /// Creates the tracking state for a not-yet-registered object.
    ///
    /// # Example
    ///
    /// ```
    /// use tether::{Anchor, Anchored};
    ///
    /// struct Sensor {
    ///     anchor: Anchor,
    ///     reading: i32,
    /// }
    ///
    /// impl Anchored for Sensor {
    ///     fn anchor(&self) -> &Anchor {
    ///         &self.anchor
    ///     }
    /// }
    ///
    /// let sensor = Sensor {
    ///     anchor: Anchor::new(),
    ///     reading: 42,
    /// };
    /// assert_eq!(sensor.anchor().strong_count(), 0);
    /// ```
    #[must_use]
    pub const fn new() -> Self {
        Self {
            strong_count: AtomicU32::new(0),
            slot_index: AtomicU32::new(0),
            generation: AtomicU32::new(generation::NEVER),
            #[cfg(feature = "holder-tracking")]
            holder_head: AtomicU32::new(crate::holders::NO_RECORD),
        }
    }

    /// Number of strong handles currently keeping this object alive.
    ///
    /// Zero only for an object that was never handed to a factory; while any
    /// caller can reach this accessor through a handle, the count is at
    /// least one. The value may be stale by the time it is returned when
    /// other threads hold handles to the same object.
    #[must_use]
    #[inline]
    pub fn strong_count(&self) -> u32 {
        self.strong_count.load(Ordering::Relaxed)
    }

    /// The registry slot this object occupies, or `None` if the object was
    /// never registered.
    #[must_use]
    pub fn slot_index(&self) -> Option<SlotIndex> {
        if self.is_registered() {
            Some(self.slot_index.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    /// The stamp of this object's slot occupancy, or `None` if the object
    /// was never registered.
    ///
    /// Together with [`slot_index()`][Self::slot_index] this is the identity
    /// pair every weak handle derived from the object stores.
    #[must_use]
    pub fn slot_generation(&self) -> Option<Generation> {
        let generation = self.generation.load(Ordering::Relaxed);

        if generation == generation::NEVER {
            None
        } else {
            Some(generation)
        }
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.generation.load(Ordering::Relaxed) != generation::NEVER
    }

    /// Stamps the registration identity onto the anchor.
    ///
    /// Called once, before the first handle escapes to any other thread, so
    /// relaxed stores suffice.
    pub(crate) fn bind(&self, slot_index: SlotIndex, generation: Generation) {
        debug_assert!(
            !self.is_registered(),
            "object registered while already occupying a slot"
        );
        debug_assert_ne!(generation, generation::NEVER);

        self.slot_index.store(slot_index, Ordering::Relaxed);
        self.generation.store(generation, Ordering::Relaxed);
    }

    /// Replaces the stamp after the slot's generation was advanced in place.
    ///
    /// Weak handles minted before this call are dead; ones minted after it
    /// resolve normally.
    pub(crate) fn restamp(&self, generation: Generation) {
        debug_assert_ne!(generation, generation::NEVER);

        self.generation.store(generation, Ordering::Relaxed);
    }

    /// Takes the very first strong reference, 0 to 1.
    ///
    /// Only reachable from the factories, which still own the object
    /// exclusively at this point.
    pub(crate) fn take_first_ref(&self) {
        let previous = self.strong_count.fetch_add(1, Ordering::Relaxed);

        debug_assert_eq!(previous, 0, "first reference taken twice");

        stats::handle_created();
    }

    /// Takes an additional strong reference on an object that is already
    /// kept alive by the caller's own handle.
    pub(crate) fn take_ref(&self) {
        let previous = self.strong_count.fetch_add(1, Ordering::Relaxed);

        debug_assert_ne!(previous, 0, "reference taken on an unowned object");
        assert!(
            previous <= MAX_STRONG_COUNT,
            "strong count exceeded {MAX_STRONG_COUNT} - runaway handle leak"
        );

        stats::handle_created();
    }

    /// Takes a strong reference only if at least one is already held,
    /// returning whether it was taken.
    ///
    /// This is the promotion primitive: a count that has reached zero can
    /// never be raised again, so destruction races resolve to a clean
    /// failure instead of a resurrection.
    pub(crate) fn try_take_ref(&self) -> bool {
        let taken = self
            .strong_count
            .fetch_update(Ordering::Acquire, Ordering::Relaxed, |count| {
                if count == 0 {
                    None
                } else {
                    count.checked_add(1)
                }
            })
            .is_ok();

        if taken {
            stats::handle_created();
        }

        taken
    }

    /// Releases one strong reference; returns true exactly once per object,
    /// on the 1 to 0 transition, and the caller that sees it must destroy
    /// the object.
    pub(crate) fn release_ref(&self) -> bool {
        let previous = self.strong_count.fetch_sub(1, Ordering::Release);

        debug_assert_ne!(previous, 0, "strong reference released past zero");

        stats::handle_dropped();

        if previous == 1 {
            // Synchronizes with the Release above from every other releasing
            // thread, so the destructor observes all writes made while those
            // handles were alive.
            atomic::fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    #[cfg(feature = "holder-tracking")]
    pub(crate) fn holder_head(&self) -> u32 {
        self.holder_head.load(Ordering::Relaxed)
    }

    #[cfg(feature = "holder-tracking")]
    pub(crate) fn set_holder_head(&self, record: u32) {
        self.holder_head.store(record, Ordering::Relaxed);
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Anchor {
    #[cfg_attr(test, mutants::skip)] // Pure formatting, not worth mutation testing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anchor")
            .field("strong_count", &self.strong_count())
            .field("slot_index", &self.slot_index())
            .field("slot_generation", &self.slot_generation())
            .finish()
    }
}

impl Drop for Anchor {
    fn drop(&mut self) {
        if !thread::panicking() {
            debug_assert_eq!(
                self.strong_count(),
                0,
                "object destroyed while strong handles to it exist"
            );
        }
    }
}

/// The capability a type needs to participate in handle tracking.
///
/// Implemented by embedding an [`Anchor`] and returning it; the `Any`
/// supertrait is what makes checked downcasts of type-erased handles
/// possible.
///
/// # Example
///
/// ```
/// use tether::{Anchor, Anchored, Strong};
///
/// struct Texture {
///     anchor: Anchor,
///     width: u32,
/// }
///
/// impl Anchored for Texture {
///     fn anchor(&self) -> &Anchor {
///         &self.anchor
///     }
/// }
///
/// let texture = Strong::new(Texture {
///     anchor: Anchor::new(),
///     width: 1024,
/// });
/// assert_eq!(texture.width, 1024);
/// ```
pub trait Anchored: Any {
    /// The tracking state embedded in this object.
    ///
    /// Must return the same anchor for the object's whole lifetime.
    fn anchor(&self) -> &Anchor;
}
