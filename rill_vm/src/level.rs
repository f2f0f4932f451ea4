//! Levels: pushed activation records, and the bounce protocol.
//!
//! A level owns its output cell; when it completes, the trampoline stages
//! that output into the parent level, which resumes at its stored mode.
//! Executors never call each other directly — they return a [`Bounce`] and
//! the trampoline does the pushing, popping, and unwinding.

use rill_core::{Cell, ContextId, Error, SymId};

use crate::action::ActionState;
use crate::eval::EvalState;
use crate::feed::FeedRef;

/// Signal used by nested trampolines and native helpers.
///
/// `Thrown` means the interpreter's throw slots hold a label and value;
/// `Error` is a raised error that the call site may opt to receive as a
/// value, and which otherwise decays into a `failure`-labelled throw.
#[derive(Debug)]
pub enum VmSignal {
    /// A raised error.
    Error(Error),
    /// A throw is in flight (see `Vm::throw_label` / `Vm::throw_value`).
    Thrown,
}

impl From<Error> for VmSignal {
    fn from(err: Error) -> VmSignal {
        VmSignal::Error(err)
    }
}

/// Result alias for operations that may raise or throw.
pub type Exec<T> = Result<T, VmSignal>;

/// What an executor tells the trampoline.
pub enum Bounce {
    /// The level's output holds its result; pop it.
    Done,
    /// Push the sublevel; re-enter this level (at its stored mode) when the
    /// sublevel completes.
    Continue(Box<Level>),
    /// Push the sublevel; its eventual result passes through as this level's
    /// result (the level resumes once, in a pass-through mode).
    Delegate(Box<Level>),
    /// A throw is in flight; unwind.
    Thrown,
}

bitflags::bitflags! {
    /// Level behavior flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct LevelFlags: u16 {
        /// Raised errors from the completing sublevel become antiform ERROR!
        /// results instead of decaying to a failure throw.
        const RAISED_OK = 1 << 0;
        /// This eval level is gathering an argument for an action; deferred
        /// enfix operators do not trigger under it.
        const FULFILLING_ARG = 1 << 1;
        /// Keep the frame varlist alive and reusable after the level drops.
        const KEEPALIVE = 1 << 2;
        /// Refinements may be left on the data stack at completion (path
        /// evaluation protocol).
        const PUSHES_OK = 1 << 3;
        /// The evaluator may complete with a stale output (invisibles ran).
        const MAYBE_STALE = 1 << 4;
    }
}

/// Executor selection plus its mode-specific state.
pub enum Executor {
    /// Expression evaluator.
    Eval(EvalState),
    /// Action frame fulfillment and dispatch.
    Action(ActionState),
}

/// A pushed activation record.
pub struct Level {
    /// The cell source this level advances.
    pub feed: FeedRef,
    /// The output cell, owned by the level (the trampoline moves it to the
    /// parent's staging slot on completion).
    pub out: Cell,
    /// Where a completed sublevel's result lands before this level resumes.
    pub staged: Cell,
    /// Behavior flags.
    pub flags: LevelFlags,
    /// Executor and its state machine.
    pub executor: Executor,
    /// Label for diagnostics (invoked word, action name).
    pub label: Option<SymId>,
    /// Frame varlist, for action levels.
    pub varlist: Option<ContextId>,
    /// Throws labelled with this frame are caught here (definitional RETURN).
    pub catch_frame: Option<ContextId>,
    /// Data stack height at push; enforced at drop, restored at abort.
    pub dsp_base: usize,
}

impl Level {
    /// A level running the expression evaluator over `feed`.
    pub fn eval(feed: FeedRef, state: EvalState, flags: LevelFlags) -> Level {
        Level {
            feed,
            out: Cell::fresh(),
            staged: Cell::fresh(),
            flags,
            executor: Executor::Eval(state),
            label: None,
            varlist: None,
            catch_frame: None,
            dsp_base: 0, // set by push_level
        }
    }

    /// A level running action fulfillment over `feed`.
    pub fn action(feed: FeedRef, state: ActionState, flags: LevelFlags) -> Level {
        Level {
            feed,
            out: Cell::fresh(),
            staged: Cell::fresh(),
            flags,
            executor: Executor::Action(state),
            label: None,
            varlist: None,
            catch_frame: None,
            dsp_base: 0,
        }
    }
}
