//! Logically private things that must be technically public because they
//! are accessed from macro-generated code.

/// Re-export so our macros can use it in projects that do not have their
/// own reference to `paste`.
pub use ::paste::paste;
