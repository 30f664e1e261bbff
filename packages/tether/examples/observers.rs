//! Weak observers over owned objects.
//!
//! This example walks through the handle lifecycle: shared ownership
//! through strong handles, observation through weak handles, staleness
//! instead of dangling when the target dies, and revoking observers
//! while the target lives on.

use tether::{Anchor, Anchored, Registry, Strong, Weak, stats};

/// A connection to one upstream data feed.
struct Feed {
    anchor: Anchor,
    name: String,
    messages: u64,
}

impl Feed {
    fn connect(name: &str, messages: u64) -> Strong<Self> {
        Strong::new(Self {
            anchor: Anchor::new(),
            name: name.to_string(),
            messages,
        })
    }
}

impl Anchored for Feed {
    fn anchor(&self) -> &Anchor {
        &self.anchor
    }
}

fn main() {
    println!("Tether Observer Example");
    println!("=======================");

    let feed = Feed::connect("alpha", 17);
    let mirror = feed.clone();

    println!(
        "Feed '{}' has {} strong handle(s)",
        feed.name,
        feed.strong_count()
    );

    // Observers are plain copyable values; hand them out freely.
    let observer: Weak<Feed> = feed.downgrade();
    let observer_copy = observer;

    println!("\n=== Observation while the feed is alive ===");
    if let Some(resolved) = observer.upgrade() {
        println!("'{}' has delivered {} messages", resolved.name, resolved.messages);
    }
    println!("copy agrees: is_alive = {}", observer_copy.is_alive());

    println!("\n=== After the owners are gone ===");
    drop(mirror);
    drop(feed);
    println!("observer.is_alive() = {}", observer.is_alive());
    println!("observer.upgrade() hit: {}", observer.upgrade().is_some());

    // The dead feed's slot is free now; the next feed takes it over. The
    // old observer must still resolve to nothing.
    println!("\n=== Slot reuse cannot revive an observer ===");
    let replacement = Feed::connect("beta", 0);
    let fresh_observer = replacement.downgrade();

    assert!(observer.upgrade().is_none());
    println!("old observer still dead: {}", observer.upgrade().is_none());
    println!(
        "new observer resolves to '{}'",
        fresh_observer.upgrade().map_or_else(String::new, |feed| feed.name.clone())
    );

    println!("\n=== Revoking observers explicitly ===");
    replacement.invalidate_weaks();
    println!(
        "after revocation, new observer dead: {}",
        fresh_observer.upgrade().is_none()
    );
    println!(
        "feed '{}' still alive with {} strong handle(s)",
        replacement.name,
        replacement.strong_count()
    );

    println!("\n=== Process-wide accounting ===");
    println!("Registered objects: {}", Registry::global().len());
    println!("Live objects: {}", stats::live_objects());
    println!("Live strong handles: {}", stats::live_strong_handles());
}
