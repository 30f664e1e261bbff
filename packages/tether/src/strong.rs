//! The owning handle type.

use std::any::{Any, type_name};
use std::fmt;
use std::ops::Deref;
#[cfg(feature = "holder-tracking")]
use std::panic::Location;
use std::ptr;
use std::ptr::NonNull;

use crate::anchor::{Anchor, Anchored};
#[cfg(feature = "holder-tracking")]
use crate::holders::{self, HolderReport};
use crate::registry::Registry;
use crate::weak::Weak;

/// An owning handle to a tracked object.
///
/// Holding one guarantees the target is alive: every handle contributes one
/// strong reference to the object's embedded counter, and the handle that
/// releases the last reference destroys the object and unregisters its slot.
/// There is no separate control-block allocation; the counter lives inside
/// the object's [`Anchor`].
///
/// A `Strong<T>` is never empty. Where the handle-to-nothing state is
/// needed, use `Option<Strong<T>>`; the niche in the internal pointer makes
/// that the same size as the handle itself.
///
/// Equality is object identity, not value equality: two handles compare
/// equal exactly when they refer to the same object instance, regardless of
/// the handle's static type.
///
/// # Example
///
/// ```
/// use tether::{Anchor, Anchored, Strong};
///
/// struct Mesh {
///     anchor: Anchor,
///     vertex_count: usize,
/// }
///
/// impl Anchored for Mesh {
///     fn anchor(&self) -> &Anchor {
///         &self.anchor
///     }
/// }
///
/// let mesh = Strong::new(Mesh {
///     anchor: Anchor::new(),
///     vertex_count: 36,
/// });
///
/// let also_mesh = mesh.clone();
/// assert_eq!(mesh.strong_count(), 2);
/// assert_eq!(also_mesh.vertex_count, 36);
/// assert_eq!(mesh, also_mesh);
///
/// drop(also_mesh);
/// assert_eq!(mesh.strong_count(), 1);
/// ```
pub struct Strong<T: Anchored + ?Sized> {
    /// Valid for the whole lifetime of the handle because the handle's own
    /// strong reference keeps the object from being destroyed.
    ptr: NonNull<T>,

    /// This handle's record in the holder ledger.
    #[cfg(feature = "holder-tracking")]
    holder_record: u32,
}

// SAFETY: Sending a handle to another thread can move destruction of the
// target there (T: Send) and concurrent handles on different threads hand
// out &T (T: Sync). With both bounds the handle is as thread-mobile as a
// standard shared-ownership pointer.
unsafe impl<T: Anchored + ?Sized> Send for Strong<T> where T: Send + Sync {}

// SAFETY: A shared handle only yields &T and atomic counter operations.
unsafe impl<T: Anchored + ?Sized> Sync for Strong<T> where T: Send + Sync {}

impl<T: Anchored> Strong<T> {
    /// Moves `value` to the heap, registers it and returns the first handle
    /// to it.
    ///
    /// The object is registered before the handle is returned, so there is
    /// no way to observe a tracked object without an identity.
    #[must_use]
    #[cfg_attr(feature = "holder-tracking", track_caller)]
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Explicit upcast to the base capability, erasing the concrete type.
    ///
    /// The returned handle shares the count with `self`. Recover the
    /// concrete type with [`Strong::downcast`].
    #[must_use]
    #[cfg_attr(feature = "holder-tracking", track_caller)]
    pub fn as_anchored(&self) -> Strong<dyn Anchored> {
        self.__cast_with(|value| value as &dyn Anchored)
    }
}

impl<T: Anchored + ?Sized> Strong<T> {
    /// Registers an already-boxed object and returns the first handle to it.
    ///
    /// # Panics
    ///
    /// Panics if the object's anchor claims it is already registered, which
    /// means the anchor is shared between objects or reused across
    /// registrations - both contract violations.
    #[must_use]
    #[cfg_attr(feature = "holder-tracking", track_caller)]
    pub fn from_box(boxed: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(boxed));

        // SAFETY: Freshly leaked from a live box; valid and uniquely ours.
        let anchor = unsafe { ptr.as_ref() }.anchor();

        assert!(
            !anchor.is_registered(),
            "object is already registered; anchors must not be shared or reused"
        );

        let (slot_index, generation) = Registry::global().register(ptr.cast());
        anchor.bind(slot_index, generation);
        anchor.take_first_ref();

        Self {
            ptr,
            #[cfg(feature = "holder-tracking")]
            holder_record: holders::attach(anchor, Some(Location::caller())),
        }
    }

    /// Wraps a pointer whose strong reference the caller has already taken.
    #[cfg_attr(feature = "holder-tracking", track_caller)]
    pub(crate) fn from_promoted(ptr: NonNull<T>) -> Self {
        Self {
            ptr,
            #[cfg(feature = "holder-tracking")]
            holder_record: {
                // SAFETY: The promotion's reference keeps the object alive.
                let anchor = unsafe { ptr.as_ref() }.anchor();
                holders::attach(anchor, Some(Location::caller()))
            },
        }
    }

    /// Number of strong handles currently keeping the target alive,
    /// including this one.
    ///
    /// Always at least 1. When other threads hold handles to the same
    /// object the value may be stale by the time it is returned.
    #[must_use]
    #[inline]
    pub fn strong_count(&self) -> u32 {
        self.anchor_ref().strong_count()
    }

    /// Derives an observing handle to the target.
    ///
    /// The weak handle does not keep the object alive and stays valid (as a
    /// value) forever; once the object is destroyed it simply resolves to
    /// `None`.
    #[must_use]
    pub fn downgrade(&self) -> Weak<T> {
        Weak::from_handle(self)
    }

    /// Pointer to the target.
    ///
    /// Guaranteed valid only while some strong handle to the object exists;
    /// the moment the last one is dropped the object is gone. Prefer
    /// [`downgrade()`][Self::downgrade] for any reference that may outlive
    /// this handle.
    #[must_use]
    #[inline]
    pub fn ptr(&self) -> NonNull<T> {
        self.ptr
    }

    /// Cuts loose every weak handle that currently observes the target,
    /// without destroying it.
    ///
    /// The slot's generation is advanced and the object re-stamped, so weak
    /// handles minted before this call resolve to `None` forever, while
    /// ones derived afterwards resolve normally. Strong handles and the
    /// reference count are unaffected.
    ///
    /// This is a teardown tool: it lets an owner revoke observers before
    /// the object enters a state they must no longer see. Racing calls on
    /// the same object from several threads can leave even freshly minted
    /// weak handles dead and are not useful.
    pub fn invalidate_weaks(&self) {
        let anchor = self.anchor_ref();

        let slot_index = anchor
            .slot_index()
            .expect("a handle's target is always registered");

        let generation = Registry::global().advance_generation(slot_index);
        anchor.restamp(generation);
    }

    /// Whether this handle's target is exactly `candidate`.
    ///
    /// Object identity, not value equality - the same relation handle
    /// equality uses, for callers holding a plain reference instead of a
    /// second handle.
    #[must_use]
    pub fn refers_to(&self, candidate: &T) -> bool {
        ptr::addr_eq(self.ptr.as_ptr(), ptr::from_ref(candidate))
    }

    /// Snapshot of the holder records currently keeping the target alive.
    ///
    /// The report implements `Display`; print it to see one line per live
    /// strong handle with the call site that created it (clones are
    /// recorded without a call site).
    #[cfg(feature = "holder-tracking")]
    #[must_use]
    pub fn holders(&self) -> HolderReport {
        holders::report_for(self.anchor_ref())
    }

    /// Creates a sibling handle through a type-changing view of the target.
    ///
    /// Not public API; use [`Strong::as_anchored`], [`Strong::downcast`] or
    /// the methods generated by [`define_handle_cast!`][crate::define_handle_cast].
    ///
    /// # Panics
    ///
    /// Panics if `cast` returns a reference to anything other than `self`'s
    /// own target.
    #[doc(hidden)]
    #[cfg_attr(feature = "holder-tracking", track_caller)]
    pub fn __cast_with<U: Anchored + ?Sized>(&self, cast: impl FnOnce(&T) -> &U) -> Strong<U> {
        let value: &T = self;
        let target = NonNull::from(cast(value));

        assert!(
            ptr::addr_eq(target.as_ptr(), self.ptr.as_ptr()),
            "cast must return a view of the handle's own target"
        );

        self.anchor_ref().take_ref();

        Strong {
            ptr: target,
            #[cfg(feature = "holder-tracking")]
            holder_record: holders::attach(self.anchor_ref(), Some(Location::caller())),
        }
    }

    /// Checked downcast machinery behind [`Strong::downcast`] and the
    /// methods generated by [`define_handle_cast!`][crate::define_handle_cast].
    #[doc(hidden)]
    #[cfg_attr(feature = "holder-tracking", track_caller)]
    pub fn __downcast_with<U: Anchored>(
        &self,
        as_anchored: impl FnOnce(&T) -> &dyn Anchored,
    ) -> Option<Strong<U>> {
        let value: &T = self;
        let base = as_anchored(value);

        assert!(
            ptr::addr_eq(ptr::from_ref(base), self.ptr.as_ptr()),
            "cast must return a view of the handle's own target"
        );

        let any: &dyn Any = base;
        let concrete = any.downcast_ref::<U>()?;

        self.anchor_ref().take_ref();

        Some(Strong {
            ptr: NonNull::from(concrete),
            #[cfg(feature = "holder-tracking")]
            holder_record: holders::attach(self.anchor_ref(), Some(Location::caller())),
        })
    }

    pub(crate) fn anchor_ref(&self) -> &Anchor {
        // SAFETY: Valid while this handle's strong reference is held.
        unsafe { self.ptr.as_ref() }.anchor()
    }

    /// Runs once per object, on the thread whose release hit zero.
    fn destroy(&mut self) {
        let registry = Registry::global();

        let slot_index = self
            .anchor_ref()
            .slot_index()
            .expect("a handle's target is always registered");

        // From here on no weak handle can resolve the object, so nothing
        // can observe it during destruction.
        _ = registry.advance_generation(slot_index);

        // The slot goes back on the free list only after the destructor has
        // finished (a recycled slot must never point at a dying object), but
        // it must go back even if the destructor panics.
        let _release_slot = scopeguard::guard((), move |()| {
            registry.release(slot_index);
        });

        // SAFETY: Every handle was created through a box; the count is zero
        // and promotion-on-zero always fails, so we are the unique owner.
        let boxed = unsafe { Box::from_raw(self.ptr.as_ptr()) };
        drop(boxed);
    }
}

impl Strong<dyn Anchored> {
    /// Checked downcast of a type-erased handle to a concrete type.
    ///
    /// Returns `None` when the target's dynamic type is not `U`; the
    /// original handle and the reference count are unaffected by a failed
    /// attempt. On success the returned handle shares the count with
    /// `self`, raising it by one.
    ///
    /// # Example
    ///
    /// ```
    /// use tether::{Anchor, Anchored, Strong};
    ///
    /// struct Circle {
    ///     anchor: Anchor,
    /// }
    ///
    /// impl Anchored for Circle {
    ///     fn anchor(&self) -> &Anchor {
    ///         &self.anchor
    ///     }
    /// }
    ///
    /// struct Square {
    ///     anchor: Anchor,
    /// }
    ///
    /// impl Anchored for Square {
    ///     fn anchor(&self) -> &Anchor {
    ///         &self.anchor
    ///     }
    /// }
    ///
    /// let circle = Strong::new(Circle { anchor: Anchor::new() });
    /// let erased = circle.as_anchored();
    ///
    /// assert!(erased.downcast::<Circle>().is_some());
    /// assert!(erased.downcast::<Square>().is_none());
    /// assert_eq!(circle.strong_count(), 2);
    /// ```
    #[must_use]
    #[cfg_attr(feature = "holder-tracking", track_caller)]
    pub fn downcast<U: Anchored>(&self) -> Option<Strong<U>> {
        self.__downcast_with(|value| value)
    }
}

impl<T: Anchored + ?Sized> Clone for Strong<T> {
    /// Takes an additional strong reference to the same object.
    fn clone(&self) -> Self {
        self.anchor_ref().take_ref();

        Self {
            ptr: self.ptr,
            // The language cannot thread caller location through `Clone`,
            // so clone records are call-site-less.
            #[cfg(feature = "holder-tracking")]
            holder_record: holders::attach(self.anchor_ref(), None),
        }
    }
}

impl<T: Anchored + ?Sized> Drop for Strong<T> {
    fn drop(&mut self) {
        #[cfg(feature = "holder-tracking")]
        holders::detach(self.anchor_ref(), self.holder_record);

        if self.anchor_ref().release_ref() {
            self.destroy();
        }
    }
}

impl<T: Anchored + ?Sized> Deref for Strong<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: Valid while this handle's strong reference is held.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: Anchored + ?Sized, U: Anchored + ?Sized> PartialEq<Strong<U>> for Strong<T> {
    /// Object identity: equal exactly when both handles refer to the same
    /// object instance, regardless of the static type of either handle.
    fn eq(&self, other: &Strong<U>) -> bool {
        ptr::addr_eq(self.ptr.as_ptr(), other.ptr.as_ptr())
    }
}

impl<T: Anchored + ?Sized> Eq for Strong<T> {}

impl<T: Anchored + ?Sized> fmt::Debug for Strong<T> {
    #[cfg_attr(test, mutants::skip)] // Pure formatting, not worth mutation testing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strong")
            .field("type", &type_name::<T>())
            .field("slot_index", &self.anchor_ref().slot_index())
            .field("strong_count", &self.strong_count())
            .finish()
    }
}
