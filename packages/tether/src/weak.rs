use std::any::type_name;
use std::fmt::{self, Debug, Formatter};
use std::ptr::{self, NonNull};

use crate::registry::{Generation, Registry, SlotIndex};
use crate::{Anchored, Strong};

/// An observing handle to an anchored object.
///
/// A weak handle asserts no ownership: it never keeps its target alive and
/// never delays its destruction. The only way to reach the target is
/// [`upgrade()`][Self::upgrade], which yields a [`Strong`] handle while the
/// object is still alive and `None` once it has been destroyed.
///
/// Weak handles are plain copyable values. Copying one is a pair of integer
/// loads with no bookkeeping attached, so they can be stored and passed
/// around freely, including beyond the lifetime of the object they observe.
/// A handle whose target has been destroyed is not dangling, merely
/// permanently stale.
///
/// [`Weak::new()`] creates a handle that never had a target; it behaves
/// exactly like one whose target has died.
///
/// # Example
///
/// ```
/// use tether::{Anchor, Anchored, Strong, Weak};
///
/// struct Sensor {
///     anchor: Anchor,
///     reading: f64,
/// }
///
/// impl Anchored for Sensor {
///     fn anchor(&self) -> &Anchor {
///         &self.anchor
///     }
/// }
///
/// let sensor = Strong::new(Sensor {
///     anchor: Anchor::new(),
///     reading: 21.5,
/// });
///
/// let observer: Weak<Sensor> = sensor.downgrade();
///
/// // While the owner lives, the observer can be upgraded.
/// let resolved = observer.upgrade().unwrap();
/// assert_eq!(resolved.reading, 21.5);
/// drop(resolved);
///
/// // Once the last owner is gone, the observer resolves to nothing.
/// drop(sensor);
/// assert!(observer.upgrade().is_none());
/// ```
pub struct Weak<T: Anchored + ?Sized> {
    /// `None` for a handle that never had a target.
    target: Option<WeakTarget<T>>,
}

/// The registry coordinates a weak handle actually pointing at something.
struct WeakTarget<T: ?Sized> {
    /// Cached typed pointer to the target. Only dereferenced after the
    /// registry has confirmed that `(slot_index, generation)` still
    /// resolves, which it can only do while the target is alive.
    ptr: NonNull<T>,

    slot_index: SlotIndex,
    generation: Generation,
}

impl<T: Anchored> Weak<T> {
    /// Erases the concrete type of this handle, yielding a weak handle
    /// to the same target as `dyn Anchored`.
    ///
    /// The result observes the same object; upgrading either handle
    /// resolves or fails identically.
    #[must_use]
    pub fn as_anchored(&self) -> Weak<dyn Anchored> {
        self.__map_ptr::<dyn Anchored, _>(|concrete| concrete)
    }
}

impl<T: Anchored + ?Sized> Weak<T> {
    /// Creates a weak handle that never had a target.
    ///
    /// It is indistinguishable from a handle whose target has been
    /// destroyed: [`upgrade()`][Self::upgrade] returns `None` and it
    /// compares equal to every other dead handle.
    #[must_use]
    pub const fn new() -> Self {
        Self { target: None }
    }

    pub(crate) fn from_handle(handle: &Strong<T>) -> Self {
        let anchor = handle.anchor_ref();

        Self {
            target: Some(WeakTarget {
                ptr: handle.ptr(),
                slot_index: anchor
                    .slot_index()
                    .expect("a live handle's target is always registered"),
                generation: anchor
                    .slot_generation()
                    .expect("a live handle's target is always registered"),
            }),
        }
    }

    /// Attempts to obtain an owning handle to the target.
    ///
    /// Returns `None` if the target has already been destroyed, if its
    /// owners have revoked outstanding weak handles, or if this handle
    /// never had a target. Otherwise the returned [`Strong`] handle keeps
    /// the object alive like any other owning handle.
    ///
    /// This is safe to race against the destruction of the target from
    /// another thread: the upgrade either completes before destruction
    /// begins, in which case destruction is deferred until the new handle
    /// is dropped, or it observes the target as already gone.
    #[must_use]
    #[cfg_attr(feature = "holder-tracking", track_caller)]
    pub fn upgrade(&self) -> Option<Strong<T>> {
        let target = self.target?;

        let registry = Registry::global();
        let slots = registry.read_slots();

        let object = slots.lookup(target.slot_index, target.generation)?;

        debug_assert!(
            ptr::addr_eq(object.as_ptr(), target.ptr.as_ptr()),
            "registry resolved a weak handle to a different object than it was created from"
        );

        // The count must be raised while the table lock is held. The thread
        // that destroys the object invalidates its slot under the write lock
        // before freeing the memory, so an object the lookup just resolved
        // cannot be freed while we still hold the read lock.
        //
        // SAFETY: The lookup succeeded and we hold the read lock, so the
        // target is alive (see above).
        let anchor = unsafe { target.ptr.as_ref() }.anchor();

        if !anchor.try_take_ref() {
            // The last owner is concurrently destroying the target. The slot
            // has not been invalidated yet but the object is already doomed.
            return None;
        }

        drop(slots);

        Some(Strong::from_promoted(target.ptr))
    }

    /// Whether the target is currently alive.
    ///
    /// This is advisory: another thread may destroy the target between this
    /// returning `true` and any use of the answer. Decisions that need the
    /// target should be built on [`upgrade()`][Self::upgrade] instead.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.live_object().is_some()
    }

    /// Whether this handle's target is alive and exactly `candidate`.
    ///
    /// Object identity, not value equality - the same relation handle
    /// equality uses, for callers holding a plain reference instead of a
    /// second handle. A dead handle refers to nothing, so this is then
    /// `false` even if `candidate` now occupies the target's old memory.
    #[must_use]
    pub fn refers_to(&self, candidate: &T) -> bool {
        self.live_object()
            .is_some_and(|object| ptr::addr_eq(object.as_ptr(), ptr::from_ref(candidate)))
    }

    /// Resolves the target if it is still alive, without touching its
    /// reference count. The address is only meaningful for identity
    /// comparison; the object may be destroyed the moment this returns.
    fn live_object(&self) -> Option<NonNull<()>> {
        let target = self.target?;

        Registry::global().lookup(target.slot_index, target.generation)
    }

    /// Creates a sibling weak handle through a type-changing view of the
    /// (possibly dead) target. The pointer is mapped without being
    /// dereferenced, so this works regardless of whether the target is
    /// still alive.
    ///
    /// Not public API; use [`Weak::as_anchored`] or the methods generated
    /// by [`define_handle_cast!`][crate::define_handle_cast].
    ///
    /// # Panics
    ///
    /// Panics if `map` returns a pointer with a different address.
    #[doc(hidden)]
    #[must_use]
    pub fn __map_ptr<U, F>(&self, map: F) -> Weak<U>
    where
        U: Anchored + ?Sized,
        F: FnOnce(NonNull<T>) -> NonNull<U>,
    {
        Weak {
            target: self.target.map(|target| {
                let mapped = map(target.ptr);

                // An unsizing or supertrait coercion never moves the object,
                // so a cast that changes the address cannot be one. Without
                // this check a misbehaving closure could smuggle in an
                // unrelated pointer that our slot pair does not guard.
                assert!(
                    ptr::addr_eq(mapped.as_ptr(), target.ptr.as_ptr()),
                    "cast must preserve the identity of the target"
                );

                WeakTarget {
                    ptr: mapped,
                    slot_index: target.slot_index,
                    generation: target.generation,
                }
            }),
        }
    }
}

impl<T: Anchored + ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Anchored + ?Sized> Copy for Weak<T> {}

impl<T: Anchored + ?Sized> Default for Weak<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for WeakTarget<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for WeakTarget<T> {}

/// Two weak handles are equal if they resolve to the same live object, or
/// if neither resolves to anything. All dead and never-set handles compare
/// equal to each other, regardless of what they once pointed at.
impl<T, U> PartialEq<Weak<U>> for Weak<T>
where
    T: Anchored + ?Sized,
    U: Anchored + ?Sized,
{
    fn eq(&self, other: &Weak<U>) -> bool {
        match (self.live_object(), other.live_object()) {
            (Some(left), Some(right)) => left == right,
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Anchored + ?Sized> Eq for Weak<T> {}

/// A weak handle is equal to an owning handle if it resolves to the
/// object the owning handle owns. A dead weak handle equals no owning
/// handle, since the owning handle's target is by definition alive.
impl<T, U> PartialEq<Strong<U>> for Weak<T>
where
    T: Anchored + ?Sized,
    U: Anchored + ?Sized,
{
    fn eq(&self, other: &Strong<U>) -> bool {
        self.live_object()
            .is_some_and(|object| ptr::addr_eq(object.as_ptr(), other.ptr().as_ptr()))
    }
}

impl<T, U> PartialEq<Weak<U>> for Strong<T>
where
    T: Anchored + ?Sized,
    U: Anchored + ?Sized,
{
    fn eq(&self, other: &Weak<U>) -> bool {
        other
            .live_object()
            .is_some_and(|object| ptr::addr_eq(object.as_ptr(), self.ptr().as_ptr()))
    }
}

// SAFETY: Upgrading on another thread hands out a `Strong<T>`, which gives
// `&T` there, so we require the same bounds as the owning handle.
unsafe impl<T: Anchored + ?Sized> Send for Weak<T> where T: Send + Sync {}
// SAFETY: As above; `&Weak<T>` only allows upgrading, which yields `&T`.
unsafe impl<T: Anchored + ?Sized> Sync for Weak<T> where T: Send + Sync {}

impl<T: Anchored + ?Sized> Debug for Weak<T> {
    #[cfg_attr(test, mutants::skip)] // Cosmetic and we have no API promises here.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weak")
            .field("type", &type_name::<T>())
            .field("slot_index", &self.target.map(|target| target.slot_index))
            .field("generation", &self.target.map(|target| target.generation))
            .field("is_alive", &self.is_alive())
            .finish()
    }
}
