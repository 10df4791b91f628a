//! # XC Garbage Collector
//!
//! Tri-color mark-and-sweep collector with a reference-count hybrid: host
//! refs (`add_ref`/`release`) give deterministic, immediate destruction for
//! acyclic values the moment their count reaches zero. The tracing
//! collector handles the case ref-counting alone can't: a cycle whose
//! members keep each other's count above zero forever. It does this with
//! a CPython-style trial-deletion pass ahead of the mark, subtracting
//! each node's in-cycle references from its ref_count snapshot before
//! deciding what's actually externally rooted; see `collector::collect`.
//!
//! This crate knows nothing about `Value`s or JS-like semantics; it is
//! generic over any `T: GcObject`. `xc` supplies the concrete object type.

#![warn(missing_docs)]

mod allocator;
mod collector;
mod header;
mod heap;

pub use allocator::{Heap, RootSlot};
pub use collector::{collect, maybe_collect, Collector, CycleReport};
pub use header::{Color, GcHeader, GcObject};
pub use heap::{GcConfig, GcStats};
