//! Narrow Rust-level error surface.
//!
//! These are never visible to XC host code as thrown values — per the
//! runtime's error-handling policy the facade itself never raises an
//! exception; it returns null or, for the handful of conditions that
//! can't be represented as a `Value`, one of these.

use crate::types::{TypeCategory, TypeId};

/// Errors the runtime can produce without going through the exception
/// machine.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A fixed type-id range (internal/user/extension) has no free slots
    /// left for a new registration.
    #[error("type id range exhausted for category {category:?}")]
    TypeRangeExhausted {
        /// The range that ran out of ids.
        category: TypeCategory,
    },

    /// `get_type_id`/`find_method` referenced a type id nothing registered.
    #[error("unknown type id {0}")]
    UnknownType(TypeId),

    /// The heap's intrusive list or ref-count bookkeeping is inconsistent
    /// (self-loop in `gc_next`, negative `ref_count`). Always fatal.
    #[error("heap invariant violated: {0}")]
    CorruptHeap(String),
}
