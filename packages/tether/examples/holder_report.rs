//! Attributing live handles to their creators.
//!
//! Run with `--features holder-tracking`. Every owning handle records the
//! call site that created it, and any handle can list the call sites of
//! all its siblings - the starting point for "who is leaking this object"
//! investigations.

use tether::{Anchor, Anchored, Strong};

/// A resource someone, somewhere, forgets to release.
struct Connection {
    anchor: Anchor,
    peer: String,
}

impl Connection {
    fn open(peer: &str) -> Strong<Self> {
        Strong::new(Self {
            anchor: Anchor::new(),
            peer: peer.to_string(),
        })
    }
}

impl Anchored for Connection {
    fn anchor(&self) -> &Anchor {
        &self.anchor
    }
}

/// Simulates a subsystem that stashes a handle and keeps it.
fn subscribe(connection: &Strong<Connection>) -> Strong<Connection> {
    connection.clone()
}

fn main() {
    println!("Tether Holder Report Example");
    println!("============================");

    let connection = Connection::open("10.0.0.7:9000");

    // A few subsystems grab their own handles.
    let metrics = subscribe(&connection);
    let replay = subscribe(&connection);
    let watchdog = connection.downgrade().upgrade().unwrap();

    println!("\nWho is holding '{}'?", connection.peer);
    print!("{}", connection.holders());

    drop(metrics);
    drop(replay);

    println!("\nAfter two subsystems let go:");
    print!("{}", connection.holders());

    drop(watchdog);

    println!("\nDown to the original handle:");
    print!("{}", connection.holders());
}
