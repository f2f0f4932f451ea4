//! Core value representation for the Rill interpreter.
//!
//! This crate defines the leaf layer of the runtime:
//!
//! - The fixed-shape tagged [`Cell`] with its heart [`Kind`], quoting state,
//!   flags, and payload
//! - Quoting states (plain, quoted, quasiform, antiform) and their algebra
//! - Interned [`Symbol`](symbol::SymbolTable) machinery with fixed boot IDs
//! - Typed handles into the heap arenas (the arenas themselves live in
//!   `rill_gc`)
//! - The [`Error`](error::Error) value carried by raised errors
//!
//! Nothing here allocates heap series; cells only *reference* series through
//! typed handles, so this crate stays free of the garbage collector.

#![warn(clippy::all)]

pub mod cell;
pub mod error;
pub mod handles;
pub mod quoting;
pub mod symbol;

pub use cell::{Cell, CellFlags, Kind, ParamClass, ParamFlags, Payload};
pub use error::{Category, Error, RillResult};
pub use handles::{
    ArrayId, Binding, ContextId, DetailsId, KeylistId, PatchId, Specifier, StringId, UseFilter,
    VarRef, INDEX_ATTACHED,
};
pub use quoting::{Lift, Quoting};
pub use symbol::{sym, SymId, SymbolTable};
