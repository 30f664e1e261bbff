//! Fixed-length shared buffers owned and observed through [`tether`]
//! handles.
//!
//! [`Buffer<T>`] owns a heap-allocated slice whose length is fixed at
//! creation. Buffers exist only behind handles: the constructors return
//! [`Strong<Buffer<T>>`] directly, so every buffer is registered and
//! shareable from the moment it exists, and parts of a program that must
//! not keep a buffer alive can hold a `Weak<Buffer<T>>` instead.
//!
//! # Example
//!
//! ```rust
//! use tether_buffer::Buffer;
//!
//! let samples = Buffer::from_vec(vec![0.5_f64, 0.25, 0.125]);
//!
//! // Plain slice access through the handle.
//! assert_eq!(samples.len(), 3);
//! assert_eq!(samples[1], 0.25);
//!
//! // Consumers that must not extend the buffer's lifetime observe it.
//! let observer = samples.downgrade();
//! assert_eq!(observer.upgrade().unwrap().iter().sum::<f64>(), 0.875);
//!
//! drop(samples);
//! assert!(observer.upgrade().is_none());
//! ```

use std::fmt::{self, Debug, Formatter};
use std::ops::Deref;

use tether::{Anchor, Anchored, Strong};

/// A heap-allocated slice of `T` with a fixed length, tracked by tether
/// handles.
///
/// The element storage never moves or resizes, so slices borrowed through
/// a [`Strong`] handle stay valid for as long as that handle lives.
pub struct Buffer<T> {
    anchor: Anchor,
    elems: Box<[T]>,
}

impl<T: 'static> Buffer<T> {
    /// Moves the elements of `vec` into a new tracked buffer and returns
    /// the first handle to it.
    #[must_use]
    pub fn from_vec(vec: Vec<T>) -> Strong<Self> {
        Strong::new(Self {
            anchor: Anchor::new(),
            elems: vec.into_boxed_slice(),
        })
    }

    /// Creates a tracked buffer holding `len` copies of `value`.
    #[must_use]
    pub fn filled(len: usize, value: T) -> Strong<Self>
    where
        T: Clone,
    {
        Self::from_vec(vec![value; len])
    }

    /// Number of elements in the buffer. Fixed for the buffer's lifetime.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Whether the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }
}

impl<T: 'static> Anchored for Buffer<T> {
    fn anchor(&self) -> &Anchor {
        &self.anchor
    }
}

impl<T: 'static> Deref for Buffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.elems
    }
}

impl<T: 'static> Debug for Buffer<T> {
    #[cfg_attr(test, mutants::skip)] // Pure formatting, not worth mutation testing.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("type", &std::any::type_name::<T>())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::indexing_slicing,
        clippy::arithmetic_side_effects,
        reason = "test code is permitted less rigor"
    )]

    use super::*;

    #[test]
    fn from_vec_preserves_contents() {
        let buffer = Buffer::from_vec(vec![1_u32, 2, 3]);

        assert_eq!(buffer.len(), 3);
        assert!(!buffer.is_empty());
        assert_eq!(&buffer[..], &[1, 2, 3]);
        assert_eq!(buffer[2], 3);
    }

    #[test]
    fn filled_repeats_the_value() {
        let buffer = Buffer::filled(4, 7_u8);

        assert_eq!(&buffer[..], &[7, 7, 7, 7]);
    }

    #[test]
    fn empty_buffer_is_well_formed() {
        let buffer = Buffer::from_vec(Vec::<u64>::new());

        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert!(buffer.anchor().slot_index().is_some());
    }

    #[test]
    fn handles_share_one_buffer() {
        let buffer = Buffer::from_vec(vec!["a", "b"]);
        let sibling = buffer.clone();

        assert_eq!(buffer.strong_count(), 2);
        assert_eq!(buffer, sibling);
        assert_eq!(sibling[0], "a");
    }

    #[test]
    fn observers_do_not_keep_the_buffer_alive() {
        let buffer = Buffer::from_vec(vec![9_i32; 16]);
        let observer = buffer.downgrade();

        assert_eq!(observer.upgrade().unwrap().iter().sum::<i32>(), 144);

        drop(buffer);

        assert!(observer.upgrade().is_none());
        assert!(!observer.is_alive());
    }

    #[test]
    fn buffers_participate_in_type_erasure() {
        let buffer = Buffer::from_vec(vec![1_u16, 2]);
        let erased = buffer.as_anchored();

        assert_eq!(buffer.strong_count(), 2);

        // Same element type resolves; a different one does not.
        let recovered = erased.downcast::<Buffer<u16>>().unwrap();
        assert_eq!(recovered[1], 2);

        assert!(erased.downcast::<Buffer<i64>>().is_none());
    }

    #[test]
    fn erased_handle_keeps_the_buffer_alive() {
        let erased = Buffer::from_vec(vec![5_u8]).as_anchored();

        let recovered = erased.downcast::<Buffer<u8>>().unwrap();
        assert_eq!(recovered[0], 5);
    }

    #[test]
    fn debug_reports_type_and_length() {
        let buffer = Buffer::filled(3, 0_f32);

        let output = format!("{:?}", *buffer);

        assert!(output.contains("Buffer"));
        assert!(output.contains("f32"));
        assert!(output.contains('3'));
    }
}
