//! End-to-end lifecycle accounting, asserted exactly.
//!
//! Everything here lives in one `#[test]` on purpose: the registry and the
//! live-object counters are process-wide, so exact assertions about them
//! are only meaningful while nothing else in the process is creating or
//! destroying handles. Unit tests run many to a process and stick to
//! per-object facts; this binary owns its process and can pin down the
//! global numbers and the exact slot-reuse sequence.
#![allow(
    clippy::arithmetic_side_effects,
    reason = "test code is permitted less rigor"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tether::{Anchor, Anchored, Registry, Strong, Weak, stats};

struct Resource {
    anchor: Anchor,
    label: &'static str,
    drops: Arc<AtomicU32>,
}

impl Resource {
    fn new(label: &'static str) -> (Strong<Self>, Arc<AtomicU32>) {
        let drops = Arc::new(AtomicU32::new(0));

        let handle = Strong::new(Self {
            anchor: Anchor::new(),
            label,
            drops: Arc::clone(&drops),
        });

        (handle, drops)
    }
}

impl Anchored for Resource {
    fn anchor(&self) -> &Anchor {
        &self.anchor
    }
}

impl Drop for Resource {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn lifecycle_accounting_is_exact() {
    let registry = Registry::global();

    let base_objects = stats::live_objects();
    let base_handles = stats::live_strong_handles();
    let base_len = registry.len();

    assert_eq!(base_objects, 0);
    assert_eq!(base_handles, 0);
    assert_eq!(base_len, 0);

    // --- Creation is registration. ---

    let (first, first_drops) = Resource::new("first");

    assert_eq!(stats::live_objects(), 1);
    assert_eq!(stats::live_strong_handles(), 1);
    assert_eq!(registry.len(), 1);

    let first_slot = first.anchor().slot_index().unwrap();
    let first_generation = first.anchor().slot_generation().unwrap();

    // --- Handles are counted one by one. ---

    let second_handle = first.clone();
    let weak: Weak<Resource> = first.downgrade();

    assert_eq!(stats::live_strong_handles(), 2);
    assert_eq!(stats::live_objects(), 1);

    {
        let upgraded = weak.upgrade().unwrap();
        assert_eq!(upgraded.label, "first");
        assert_eq!(stats::live_strong_handles(), 3);
    }

    assert_eq!(stats::live_strong_handles(), 2);

    // --- Dropping a non-final handle destroys nothing. ---

    drop(second_handle);

    assert_eq!(stats::live_strong_handles(), 1);
    assert_eq!(first_drops.load(Ordering::SeqCst), 0);
    assert!(weak.is_alive());

    // --- The final drop destroys and unregisters. ---

    drop(first);

    assert_eq!(first_drops.load(Ordering::SeqCst), 1);
    assert_eq!(stats::live_objects(), 0);
    assert_eq!(stats::live_strong_handles(), 0);
    assert_eq!(registry.len(), 0);
    assert!(!weak.is_alive());
    assert!(weak.upgrade().is_none());

    // --- The next object takes over the freed slot... ---

    let (replacement, _replacement_drops) = Resource::new("replacement");

    let replacement_slot = replacement.anchor().slot_index().unwrap();
    let replacement_generation = replacement.anchor().slot_generation().unwrap();

    assert_eq!(replacement_slot, first_slot);

    // Unregistration and registration each advance the stamp, so the new
    // occupancy sits two stamps past the old one.
    assert_eq!(replacement_generation, first_generation + 2);

    // --- ...and the old observer still resolves to nothing. ---

    assert!(weak.upgrade().is_none());
    assert!(!weak.is_alive());

    let replacement_weak = replacement.downgrade();
    assert_eq!(replacement_weak.upgrade().unwrap().label, "replacement");

    // The dead observer and the live one are distinguishable even though
    // they carry the same slot index.
    assert_ne!(weak, replacement_weak);

    // --- Revocation advances the stamp without destroying anything. ---

    replacement.invalidate_weaks();

    assert!(replacement_weak.upgrade().is_none());
    assert_eq!(stats::live_objects(), 1);
    assert_eq!(
        replacement.anchor().slot_generation().unwrap(),
        replacement_generation + 1
    );

    // A fresh observer picks up the new stamp.
    let post_revocation_weak = replacement.downgrade();
    assert!(post_revocation_weak.upgrade().is_some());

    // --- Capacity only ever grows, and the books stay balanced. ---

    let capacity_before_burst = registry.capacity();

    let burst: Vec<_> = (0..1000).map(|_| Resource::new("burst").0).collect();

    assert_eq!(stats::live_objects(), 1001);
    assert_eq!(stats::live_strong_handles(), 1001);
    assert!(registry.capacity() >= 1000);

    drop(burst);

    assert_eq!(stats::live_objects(), 1);
    assert_eq!(stats::live_strong_handles(), 1);
    assert_eq!(registry.len(), 1);
    assert!(registry.capacity() >= capacity_before_burst);

    #[cfg(debug_assertions)]
    registry.integrity_check();

    drop(replacement);

    assert_eq!(stats::live_objects(), 0);
    assert_eq!(stats::live_strong_handles(), 0);
    assert!(registry.is_empty());
}
