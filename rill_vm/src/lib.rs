//! The Rill evaluator runtime.
//!
//! This crate is the hard core of the interpreter:
//!
//! - [`bind`] — word resolution through specifier chains, derived and
//!   relative binding, module attachment
//! - [`feed`] — the lazy cell source (array-backed or variadic) that levels
//!   pull from
//! - [`level`] / [`trampoline`] — activation records and the central loop
//!   driving the topmost level's executor
//! - [`eval`] / [`action`] — the evaluator and action-fulfillment executors
//! - [`path`] — the path dispatch protocol
//! - [`typecheck`] — parameter test interpretation with intrinsic fast paths
//! - [`functionals`] — SPECIALIZE / ADAPT / CHAIN / ENCLOSE / HIJACK /
//!   LAMBDA / TYPECHECKER
//! - [`natives`] — the native library installed at boot
//! - [`port`] — the port actor protocol and the in-memory blob port
//! - [`api`] — the embedding surface
//!
//! Everything hangs off an owned [`Vm`] handle; one process may host any
//! number of independent interpreters.

#![warn(clippy::all)]

pub mod action;
pub mod api;
pub mod bind;
pub mod boot;
pub mod context;
pub mod eval;
pub mod feed;
pub mod functionals;
pub mod interp;
pub mod level;
pub mod limits;
pub mod natives;
pub mod path;
pub mod port;
pub mod specifier;
pub mod trampoline;
pub mod typecheck;

pub use interp::Vm;
pub use level::{Bounce, Exec, Level, LevelFlags, VmSignal};
pub use limits::EvalLimits;

pub use rill_core::{Cell, Error, Kind, RillResult};
