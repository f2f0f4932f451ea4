//! The trampoline: the single scheduler.
//!
//! The loop repeatedly invokes the top level's executor and acts on its
//! bounce: push a continuation, pass a delegated result through, stage a
//! completed result into the parent, or unwind a throw.  Suspension happens
//! only at these points; between them, executor state is not observable.
//!
//! Natives may run nested trampolines (their levels sit above the nested
//! base).  Garbage collection triggers only at iterations of the outermost
//! trampoline, where every live cell is reachable from the level stack and
//! the interpreter's root slots — executors and natives may therefore hold
//! cells in locals freely between suspension points.
//!
//! Every push is matched by a drop or an abort on every control path,
//! including throws; the data-stack balance is checked at each drop and is
//! a fatal diagnostic in debug builds.

use std::sync::atomic::Ordering;

use rill_core::{Cell, Kind};
use rill_gc::NodeId;

use crate::action::{self, ActionMode};
use crate::context;
use crate::eval;
use crate::interp::Vm;
use crate::level::{Bounce, Exec, Executor, Level, LevelFlags, VmSignal};

impl Vm {
    /// Push a level onto the stack, enforcing the depth limit.
    pub(crate) fn push_level(&mut self, mut level: Level) -> Exec<()> {
        if self.levels.len() >= self.limits.max_levels {
            return Err(rill_core::Error::stack_overflow().into());
        }
        level.dsp_base = self.data_stack.len();
        self.levels.push(level);
        Ok(())
    }

    /// Drop a completed level: enforce balance, stage its output.
    fn finish_level(&mut self, level: Level, base: usize) {
        if !level.flags.contains(LevelFlags::PUSHES_OK) {
            debug_assert_eq!(
                self.data_stack.len(),
                level.dsp_base,
                "data stack unbalanced at level drop (label {:?})",
                level.label
            );
            self.data_stack.truncate(level.dsp_base);
        }
        if self.levels.len() == base {
            self.trampoline_result = level.out;
        } else {
            let parent = self.levels.last_mut().expect("parent level");
            parent.staged = level.out;
        }
    }

    /// Abandon a level on an unwind path, restoring stack balance.
    fn abort_level(&mut self, level: Level) {
        self.data_stack.truncate(level.dsp_base);
        drop(level);
    }

    /// Push `level` and run the trampoline until it completes, returning its
    /// result.
    pub(crate) fn run_to_completion(&mut self, level: Level) -> Exec<Cell> {
        let base = self.levels.len();
        self.push_level(level)?;
        self.trampoline(base)?;
        Ok(self.trampoline_result)
    }

    /// Drive the level stack until it returns to `base`.
    pub(crate) fn trampoline(&mut self, base: usize) -> Exec<()> {
        self.trampoline_depth += 1;
        let result = self.trampoline_inner(base);
        self.trampoline_depth -= 1;
        result
    }

    fn trampoline_inner(&mut self, base: usize) -> Exec<()> {
        loop {
            self.tick += 1;

            // Interrupt requests turn into a reserved-label throw.
            if self.interrupt.swap(false, Ordering::Relaxed) {
                log::debug!("interrupt requested; converting to throw");
                let signal = self.throw(Cell::word(rill_core::sym::INTERRUPT), Cell::nulled());
                self.unwind_all(base);
                return Err(signal);
            }

            // Collection points: outermost iterations only, with every level
            // attached, so the root set is complete.
            if self.trampoline_depth == 1 && self.heap.wants_collect() {
                self.collect_garbage();
            }

            let mut level = self.levels.pop().expect("trampoline under base");
            let bounce = execute(self, &mut level);
            match bounce {
                Ok(Bounce::Continue(sub)) => {
                    self.levels.push(level);
                    if let Err(signal) = self.push_level(*sub) {
                        self.unwind_all(base);
                        return Err(signal);
                    }
                }
                Ok(Bounce::Delegate(sub)) => {
                    set_pass_through(&mut level);
                    self.levels.push(level);
                    if let Err(signal) = self.push_level(*sub) {
                        self.unwind_all(base);
                        return Err(signal);
                    }
                }
                Ok(Bounce::Done) => {
                    self.finish_level(level, base);
                    if self.levels.len() == base {
                        return Ok(());
                    }
                }
                Ok(Bounce::Thrown) | Err(VmSignal::Thrown) => {
                    self.abort_level(level);
                    if !self.unwind(base)? {
                        return Err(VmSignal::Thrown);
                    }
                }
                Err(VmSignal::Error(err)) => {
                    // A raised error: the call site may opt in to receive it
                    // as an antiform value; otherwise it decays to a
                    // failure-labelled throw.
                    self.abort_level(level);
                    if self.levels.len() > base
                        && self
                            .levels
                            .last()
                            .map(|l| l.flags.contains(LevelFlags::RAISED_OK))
                            .unwrap_or(false)
                    {
                        let raised = context::raise_error(self, &err);
                        self.levels.last_mut().expect("parent").staged = raised;
                        continue;
                    }
                    self.unwind_all(base);
                    return Err(VmSignal::Error(err));
                }
            }
        }
    }

    /// Unwind a throw: abort levels until one intercepts (definitional
    /// RETURN frames), or the base is reached.  Returns true when caught.
    fn unwind(&mut self, base: usize) -> Exec<bool> {
        loop {
            if self.levels.len() == base {
                return Ok(false);
            }
            let mut level = self.levels.pop().expect("unwind under base");
            if let Some(frame) = level.catch_frame {
                let matches = self.throw_label.is(Kind::Frame)
                    && self.throw_label.context() == Some(frame);
                if matches {
                    let (_, value) = self.take_throw();
                    level.out = value;
                    if let Executor::Action(state) = &mut level.executor {
                        state.mode = ActionMode::ReturnCheck;
                    }
                    self.data_stack.truncate(level.dsp_base);
                    self.levels.push(level);
                    return Ok(true);
                }
            }
            self.abort_level(level);
        }
    }

    /// Abort every level above `base` (uncatchable unwinds).
    fn unwind_all(&mut self, base: usize) {
        while self.levels.len() > base {
            let level = self.levels.pop().expect("level");
            self.abort_level(level);
        }
    }

    // =========================================================================
    // Garbage collection
    // =========================================================================

    /// Gather the root set and run a collection cycle.
    pub fn collect_garbage(&mut self) {
        let mut cells: Vec<Cell> = Vec::with_capacity(64);
        let mut nodes: Vec<NodeId> = Vec::with_capacity(16);

        cells.push(self.throw_label);
        cells.push(self.throw_value);
        cells.push(self.trampoline_result);
        cells.extend(self.data_stack.iter().copied());
        cells.extend(self.api_handles.iter().flatten().copied());

        nodes.push(NodeId::Context(self.lib));
        nodes.push(NodeId::Context(self.sys));
        if let Some(details) = self.return_details {
            nodes.push(NodeId::Details(details));
        }

        for level in &self.levels {
            cells.push(level.out);
            cells.push(level.staged);
            if let Some(varlist) = level.varlist {
                nodes.push(NodeId::Context(varlist));
            }
            if let Some(frame) = level.catch_frame {
                nodes.push(NodeId::Context(frame));
            }
            let feed = level.feed.borrow();
            if let Some(array) = feed.backing_array() {
                nodes.push(NodeId::Array(array));
            }
            cells.extend(feed.pending.iter().copied());
            cells.extend(feed.variadic_cells().iter().copied());
            if let Some(gotten) = feed.gotten {
                cells.push(gotten);
            }
            match feed.specifier {
                rill_core::Specifier::Patch(p) => nodes.push(NodeId::Patch(p)),
                rill_core::Specifier::Frame(f) => nodes.push(NodeId::Context(f)),
                rill_core::Specifier::None => {}
            }
            match &level.executor {
                Executor::Eval(state) => state.gather_roots(&mut cells, &mut nodes),
                Executor::Action(state) => state.gather_roots(&mut cells, &mut nodes),
            }
        }

        let report = self.heap.collect(&cells, &nodes);
        for port_ctx in report.freed_ports {
            crate::port::finalize_collected_port(self, port_ctx);
        }
    }
}

/// Invoke the proper executor for a (detached) level.
fn execute(vm: &mut Vm, level: &mut Level) -> Exec<Bounce> {
    let mut executor = std::mem::replace(
        &mut level.executor,
        Executor::Eval(eval::EvalState::step()),
    );
    let bounce = match &mut executor {
        Executor::Eval(state) => eval::execute(vm, level, state),
        Executor::Action(state) => action::execute(vm, level, state),
    };
    level.executor = executor;
    bounce
}

/// Arrange for a level to pass its next staged result through as its own.
fn set_pass_through(level: &mut Level) {
    match &mut level.executor {
        Executor::Eval(state) => state.set_pass_through(),
        Executor::Action(state) => state.mode = ActionMode::PassThrough,
    }
}
