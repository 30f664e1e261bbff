//! Shared ownership with reuse-safe observation, built on an intrusive
//! reference count and a process-wide generational slot table.
//!
//! This crate provides two handle types over heap objects: [`Strong<T>`],
//! which keeps its target alive, and [`Weak<T>`], which observes a target
//! without extending its lifetime. The reference count is embedded in the
//! object itself through its [`Anchor`] field, so there is no separately
//! allocated control block. Every tracked object is also entered into a
//! process-wide [`Registry`] under a `(slot, generation)` pair; weak
//! handles resolve through that table, so a stale handle returns nothing
//! rather than touching recycled memory, even when its old slot has been
//! handed to a new object.
//!
//! # Key Features
//!
//! - **Intrusive counting**: The count lives inside the object's [`Anchor`]
//!   field; creating, cloning and dropping handles is O(1) with no
//!   auxiliary allocation.
//! - **Reuse-safe weak handles**: Slot reuse advances a generation counter,
//!   so a weak handle from a previous occupant can never resolve to the
//!   new one.
//! - **Copyable observers**: [`Weak<T>`] is a plain `Copy` value with no
//!   drop bookkeeping, cheap enough to store in bulk.
//! - **Type-erased handles**: Upcast to [`Strong<dyn Anchored>`] and
//!   recover the concrete type with a checked
//!   [`downcast`][Strong::downcast].
//! - **User trait casts**: [`define_handle_cast!`] generates the same cast
//!   surface for your own trait objects.
//! - **Thread-safe**: Handles move and share across threads when the
//!   target allows it, and upgrading races destruction without incident.
//! - **Observer revocation**: [`Strong::invalidate_weaks`] severs every
//!   outstanding weak handle while the object lives on.
//! - **Holder diagnostics**: The `holder-tracking` feature records the
//!   call site of every live owning handle for leak investigations.
//!
//! # The anchor contract
//!
//! A type opts in to tracking by embedding an [`Anchor`] and exposing it
//! through the [`Anchored`] trait:
//!
//! ```rust
//! use tether::{Anchor, Anchored};
//!
//! struct Document {
//!     anchor: Anchor,
//!     title: String,
//! }
//!
//! impl Anchored for Document {
//!     fn anchor(&self) -> &Anchor {
//!         &self.anchor
//!     }
//! }
//! ```
//!
//! Each object owns exactly one anchor; sharing an anchor between objects
//! or reusing one across registrations is a contract violation that the
//! handle constructors reject. Objects enter the registry the moment the
//! first handle is created and leave it as part of being destroyed, so
//! every handle always refers to a registered object.
//!
//! # Examples
//!
//! ## Ownership and observation
//!
//! ```rust
//! use tether::{Anchor, Anchored, Strong, Weak};
//!
//! struct Document {
//!     anchor: Anchor,
//!     title: String,
//! }
//!
//! impl Anchored for Document {
//!     fn anchor(&self) -> &Anchor {
//!         &self.anchor
//!     }
//! }
//!
//! let doc = Strong::new(Document {
//!     anchor: Anchor::new(),
//!     title: "Quarterly report".to_string(),
//! });
//!
//! // Owning handles share the object.
//! let editor = doc.clone();
//! assert_eq!(doc.strong_count(), 2);
//!
//! // Observers do not keep it alive.
//! let observer: Weak<Document> = doc.downgrade();
//! assert_eq!(observer.upgrade().unwrap().title, "Quarterly report");
//!
//! drop(editor);
//! drop(doc);
//!
//! // The object is gone; the observer resolves to nothing rather than
//! // dangling, no matter how its old slot gets reused.
//! assert!(observer.upgrade().is_none());
//! ```
//!
//! ## Revoking observers early
//!
//! ```rust
//! use tether::{Anchor, Anchored, Strong};
//!
//! struct Cache {
//!     anchor: Anchor,
//! }
//!
//! impl Anchored for Cache {
//!     fn anchor(&self) -> &Anchor {
//!         &self.anchor
//!     }
//! }
//!
//! let cache = Strong::new(Cache { anchor: Anchor::new() });
//! let observer = cache.downgrade();
//!
//! // Cut off every outstanding observer without destroying the object.
//! cache.invalidate_weaks();
//!
//! assert!(observer.upgrade().is_none());
//! assert_eq!(cache.strong_count(), 1);
//! ```
//!
//! # Features
//!
//! - `holder-tracking`: Each owning handle records where it was created;
//!   `Strong::holders()` lists the call sites of every live handle of an
//!   object. Adds a global ledger write to handle creation and drop, so
//!   leave it off outside debugging builds.

#[doc(hidden)]
pub mod __private;
mod anchor;
mod cast;
mod constants;
#[cfg(feature = "holder-tracking")]
mod holders;
mod registry;
pub mod stats;
mod strong;
mod weak;

pub use anchor::{Anchor, Anchored};
#[cfg(feature = "holder-tracking")]
pub use holders::HolderReport;
pub use registry::{Generation, Registry, SlotIndex};
pub use strong::Strong;
pub use weak::Weak;
