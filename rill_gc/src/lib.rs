//! Rill heap and garbage collector.
//!
//! All series live in typed arenas owned by a [`Heap`]: cell arrays, string
//! series, keylists, contexts, action details, and specifier patches.  Cells
//! reference them through the typed handles defined in `rill_core`.
//!
//! # Collection model
//!
//! Mark-and-sweep, non-moving.  The interpreter assembles an explicit root
//! set (data stack, mold stack, level stack, API handles, sys/lib modules,
//! throw slots) and hands it to [`Heap::collect`]; marking walks cells via
//! their payloads, so the heart of a cell unambiguously determines what gets
//! traced.  Handles are stable for a series' whole lifetime — executors may
//! keep them across arbitrary user code.
//!
//! Series are unmanaged when allocated with [`SeriesFlags::empty`]; the sweep
//! only frees series that are MANAGED and unmarked.  A series flips to
//! managed exactly once and never reverts.
//!
//! Collection is only triggered between trampoline iterations, never inside
//! an executor, so executors may allocate freely without re-rooting local
//! state.

#![warn(clippy::all)]

mod arena;
pub mod config;
pub mod heap;
pub mod stats;
pub mod trace;

pub use config::GcConfig;
pub use heap::{
    ContextKind, ContextRecord, DetailsRecord, Dispatcher, Heap, KeylistRecord, PatchKind,
    PatchRecord, SeriesFlags, StringData, StringRecord,
};
pub use stats::GcStats;
pub use trace::{NodeId, SweepReport};
