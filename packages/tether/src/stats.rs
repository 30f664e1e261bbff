//! Process-wide counters for leak auditing.
//!
//! The counters track every tracked object and every strong handle in the
//! process, so a steady climb with no matching decline points at a leak.
//! They are plain relaxed atomics: values read while other threads are
//! creating or dropping handles are snapshots, not synchronization points.
//!
//! Exact-value assertions only make sense when the process is otherwise
//! quiescent; the standard multi-threaded test runner is not, so tests that
//! assert exact counts belong in their own integration-test binary.

use std::sync::atomic::{AtomicUsize, Ordering};

static LIVE_OBJECTS: AtomicUsize = AtomicUsize::new(0);
static LIVE_STRONG_HANDLES: AtomicUsize = AtomicUsize::new(0);

/// Number of tracked objects currently alive in the process.
///
/// Incremented when an object is registered, decremented after its slot is
/// returned to the free list.
#[must_use]
#[inline]
pub fn live_objects() -> usize {
    LIVE_OBJECTS.load(Ordering::Relaxed)
}

/// Number of strong handles currently alive in the process, across all
/// tracked objects.
#[must_use]
#[inline]
pub fn live_strong_handles() -> usize {
    LIVE_STRONG_HANDLES.load(Ordering::Relaxed)
}

pub(crate) fn object_registered() {
    LIVE_OBJECTS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn object_unregistered() {
    LIVE_OBJECTS.fetch_sub(1, Ordering::Relaxed);
}

pub(crate) fn handle_created() {
    LIVE_STRONG_HANDLES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn handle_dropped() {
    LIVE_STRONG_HANDLES.fetch_sub(1, Ordering::Relaxed);
}
