//! Constants shared between modules of the crate.

/// Error message used when a lock is found to be poisoned.
///
/// We never expect locks to be poisoned because the code holding a lock is
/// not meant to panic while holding it, so we treat this as a fatal error.
pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - fatal error";
