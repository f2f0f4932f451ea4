//! The interpreter handle.
//!
//! All global state lives here: the heap, the symbol table, root modules,
//! the data stack, the level stack, throw slots, API handles, and the tick
//! counter.  There are no hidden singletons; a process may host several
//! independent interpreters.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rill_core::{Cell, ContextId, DetailsId, Kind, Specifier, SymbolTable};
use rill_gc::{ContextKind, GcConfig, Heap, SeriesFlags};

use crate::bind;
use crate::boot;
use crate::eval::EvalState;
use crate::feed::{Feed, FeedRef};
use crate::level::{Exec, Level, LevelFlags, VmSignal};
use crate::limits::EvalLimits;
use crate::natives::NativeEntry;
use crate::port::PortState;

/// An interpreter instance.
pub struct Vm {
    /// The heap arenas.
    pub heap: Heap,
    /// Interned symbols.
    pub symbols: SymbolTable,
    /// Native registry; `Dispatcher::Native(n)` indexes this.
    pub natives: Vec<NativeEntry>,
    /// The user-facing library module (also the single inheritance source
    /// for module read-misses).
    pub lib: ContextId,
    /// The system module (protected; write-attachment is refused).
    pub sys: ContextId,
    /// Data stack (refinement accumulation, reduce, paramlist building).
    pub data_stack: Vec<Cell>,
    /// Mold buffer stack.
    pub mold_stack: Vec<String>,
    /// The level stack.
    pub(crate) levels: Vec<Level>,
    /// Throw label slot (nulled when no throw is in flight).
    pub throw_label: Cell,
    /// Throw value slot.
    pub throw_value: Cell,
    /// Host-settable interrupt request, polled at trampoline iterations.
    pub interrupt: Arc<AtomicBool>,
    /// GC-rooted cells handed out through the embedding API.
    pub api_handles: Vec<Option<Cell>>,
    /// Captured PRINT output (the host drains this).
    pub output: String,
    /// Trampoline iteration counter.
    pub tick: u64,
    /// Depth limits.
    pub limits: EvalLimits,
    /// Open port states, keyed by handle payload.
    pub ports: Vec<Option<PortState>>,
    /// Identity of the RETURN native (frames splice activations of it).
    pub return_details: Option<DetailsId>,
    /// Result slot of the innermost completed trampoline run.
    pub(crate) trampoline_result: Cell,
    /// Nesting depth of active trampolines (collection gates on 1).
    pub(crate) trampoline_depth: usize,
}

impl Vm {
    /// Boot a fresh interpreter with default configuration.
    pub fn new() -> Vm {
        Vm::with_config(GcConfig::default(), EvalLimits::default())
    }

    /// Boot with explicit GC and limit configuration.
    pub fn with_config(gc: GcConfig, limits: EvalLimits) -> Vm {
        let mut heap = Heap::new(gc);
        let symbols = SymbolTable::new();

        // Root modules exist before boot so natives can be installed into
        // them.  A module varlist is just its archetype; variables live in
        // patches.
        let kl = heap.alloc_keylist(vec![], None);
        let lib = heap.alloc_context(
            ContextKind::Module,
            kl,
            vec![Cell::blank()],
            SeriesFlags::MANAGED,
        );
        let kl_sys = heap.alloc_keylist(vec![], None);
        let sys = heap.alloc_context(
            ContextKind::Module,
            kl_sys,
            vec![Cell::blank()],
            SeriesFlags::MANAGED,
        );
        let lib_arch = Cell::any_context(Kind::Module, lib);
        heap.context_mut(lib).vars[0] = lib_arch;
        let sys_arch = Cell::any_context(Kind::Module, sys);
        heap.context_mut(sys).vars[0] = sys_arch;

        let mut vm = Vm {
            heap,
            symbols,
            natives: Vec::new(),
            lib,
            sys,
            data_stack: Vec::new(),
            mold_stack: Vec::new(),
            levels: Vec::new(),
            throw_label: Cell::nulled(),
            throw_value: Cell::nulled(),
            interrupt: Arc::new(AtomicBool::new(false)),
            api_handles: Vec::new(),
            output: String::new(),
            tick: 0,
            limits,
            ports: Vec::new(),
            return_details: None,
            trampoline_result: Cell::nulled(),
            trampoline_depth: 0,
        };
        boot::startup(&mut vm);
        vm
    }

    /// Number of levels currently pushed (debug probes and tests).
    pub fn level_depth(&self) -> usize {
        self.levels.len()
    }

    // =========================================================================
    // Evaluation entry points
    // =========================================================================

    /// Scan source, attach it to lib, and evaluate it to the end.
    pub fn run_source(&mut self, source: &str) -> Exec<Cell> {
        let array = rill_parser::scan_block(&mut self.heap, &mut self.symbols, source)
            .map_err(VmSignal::Error)?;
        let lib = self.lib;
        bind::bind_nonspecifically(self, array, lib);
        self.do_array(array, 0, Specifier::None)
    }

    /// Evaluate an array to its end; a fully-invisible run yields void.
    pub fn do_array(&mut self, array: rill_core::ArrayId, index: usize, specifier: Specifier) -> Exec<Cell> {
        let feed = Feed::from_array(array, index, specifier);
        self.do_feed(feed)
    }

    /// Evaluate a feed to its end.
    pub fn do_feed(&mut self, feed: FeedRef) -> Exec<Cell> {
        let level = Level::eval(feed, EvalState::to_end(), LevelFlags::MAYBE_STALE);
        let result = self.run_to_completion(level)?;
        Ok(if result.is_stale() || result.is_nihil() {
            Cell::void()
        } else {
            result
        })
    }

    /// Evaluate a block-bearing cell (block or group) to its end.
    pub fn do_block_cell(&mut self, cell: &Cell, specifier: Specifier) -> Exec<Cell> {
        let (array, index, own) = cell
            .series()
            .ok_or_else(|| VmSignal::Error(rill_core::Error::script(
                rill_core::sym::BAD_VALUE,
                "cannot evaluate non-array value",
                vec![cell.reified()],
            )))?;
        let derived = crate::specifier::derive(self, own, specifier);
        self.do_array(array, index as usize, derived)
    }

    /// One evaluation step from a shared feed.  Returns the step's value; a
    /// step that only ran invisibles yields nihil; an ended feed yields None.
    pub fn eval_step(&mut self, feed: FeedRef, flags: LevelFlags) -> Exec<Option<Cell>> {
        if feed.borrow().at_end(&self.heap) {
            return Ok(None);
        }
        let level = Level::eval(feed, EvalState::step(), flags | LevelFlags::MAYBE_STALE);
        let result = self.run_to_completion(level)?;
        Ok(Some(if result.is_stale() { Cell::nihil() } else { result }))
    }

    /// Invoke an action value with pre-evaluated arguments.
    ///
    /// Arguments are passed through a variadic feed in meta form, so one
    /// evaluation step recovers each exactly (including antiforms).
    pub fn apply_action(&mut self, action: &Cell, args: Vec<Cell>) -> Exec<Cell> {
        let cells: Vec<Cell> = args.into_iter().map(|c| c.meta()).collect();
        let feed = Feed::from_cells(cells, Specifier::None);
        let state = crate::action::ActionState::invoke(action, None, smallvec::SmallVec::new());
        let level = Level::action(feed, state, LevelFlags::empty());
        self.run_to_completion(level)
    }

    // =========================================================================
    // Throw plumbing
    // =========================================================================

    /// Arm the throw slots and produce the signal to propagate.
    pub fn throw(&mut self, label: Cell, value: Cell) -> VmSignal {
        self.throw_label = label;
        self.throw_value = value;
        VmSignal::Thrown
    }

    /// Take the in-flight throw, clearing the slots.
    pub fn take_throw(&mut self) -> (Cell, Cell) {
        let pair = (self.throw_label, self.throw_value);
        self.throw_label = Cell::nulled();
        self.throw_value = Cell::nulled();
        pair
    }

    /// True when the in-flight throw's label is the given reserved word.
    pub fn throw_label_is(&self, sym: rill_core::SymId) -> bool {
        self.throw_label.is(Kind::Word) && self.throw_label.word_sym() == Some(sym)
    }

    // =========================================================================
    // Convenience
    // =========================================================================

    /// Mold any cell (shorthand over the parser crate).
    pub fn mold(&self, cell: &Cell) -> String {
        rill_parser::mold(&self.heap, &self.symbols, cell)
    }

    /// Form any cell.
    pub fn form(&self, cell: &Cell) -> String {
        rill_parser::form(&self.heap, &self.symbols, cell)
    }

    /// Intern a spelling.
    pub fn intern(&mut self, spelling: &str) -> rill_core::SymId {
        self.symbols.intern(spelling)
    }

    /// Drain captured PRINT output.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}
