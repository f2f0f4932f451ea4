//! Native registry and shared helpers.
//!
//! Natives are plain functions over a [`Call`] (the built frame plus the
//! caller's feed).  Each category module contributes entries; boot scans
//! each entry's spec text, builds its paramlist, and installs an activation
//! into lib under the entry's name.

pub mod bindery;
pub mod control;
pub mod data;
pub mod loops;
pub mod math;
pub mod ports;

use rill_core::{Cell, ContextId, DetailsId, Error, RillResult, SymId};

use crate::context;
use crate::feed::FeedRef;
use crate::interp::Vm;
use crate::level::Exec;

/// Invocation context handed to a native: its frame, the caller's feed (for
/// feed-aware natives like LET), and the action cell's binding override.
pub struct Call {
    /// The fulfilled frame.
    pub frame: ContextId,
    /// The caller's feed.
    pub feed: FeedRef,
    /// Binding override from the invoked action cell (definitional RETURN).
    pub binding: Option<ContextId>,
}

impl Call {
    /// Fetch an argument by parameter name.  Panics if the native's spec
    /// doesn't declare it (an internal bug, not a user error).
    pub fn arg(&self, vm: &Vm, sym: SymId) -> Cell {
        let index = context::find_key(vm, self.frame, sym)
            .unwrap_or_else(|| panic!("native argument missing from frame: {sym:?}"));
        vm.heap.context(self.frame).vars[index as usize]
    }

    /// An argument that may be null (unused refinement or `<opt>`).
    pub fn arg_opt(&self, vm: &Vm, sym: SymId) -> Option<Cell> {
        let cell = self.arg(vm, sym);
        if cell.is_nulled() {
            None
        } else {
            Some(cell)
        }
    }

    /// Was a refinement used?
    pub fn has_refinement(&self, vm: &Vm, sym: SymId) -> bool {
        self.arg_opt(vm, sym).is_some()
    }
}

/// Native function signature.
pub type NativeFn = fn(&mut Vm, &Call) -> Exec<Cell>;

/// Intrinsic signature: dispatched without building a frame.
pub type IntrinsicFn = fn(&mut Vm, DetailsId, &Cell) -> Exec<Cell>;

/// One registry row.
pub struct NativeEntry {
    /// Name installed into lib.
    pub name: &'static str,
    /// Parameter spec, in the FUNC spec dialect.
    pub spec: &'static str,
    /// The implementation.
    pub func: NativeFn,
    /// Frameless fast-path implementation, when one exists.
    pub intrinsic: Option<IntrinsicFn>,
    /// Install with the enfix bit set on the lib variable.
    pub enfix: bool,
    /// Enfix deferral across construct boundaries (THEN/ELSE).
    pub defers: bool,
    /// Whether boot installs a lib variable for this entry (RETURN and the
    /// intrinsic cores are reachable by other paths).
    pub install: bool,
}

impl NativeEntry {
    /// Plain prefix native.
    pub fn new(name: &'static str, spec: &'static str, func: NativeFn) -> NativeEntry {
        NativeEntry {
            name,
            spec,
            func,
            intrinsic: None,
            enfix: false,
            defers: false,
            install: true,
        }
    }

    /// Enfix native.
    pub fn enfix(name: &'static str, spec: &'static str, func: NativeFn) -> NativeEntry {
        NativeEntry { enfix: true, ..NativeEntry::new(name, spec, func) }
    }

    /// Enfix native that defers across construct boundaries.
    pub fn enfix_defer(name: &'static str, spec: &'static str, func: NativeFn) -> NativeEntry {
        NativeEntry { enfix: true, defers: true, ..NativeEntry::new(name, spec, func) }
    }
}

/// The full registry, in installation order.
pub fn table() -> Vec<NativeEntry> {
    let mut entries = Vec::with_capacity(64);
    control::register(&mut entries);
    data::register(&mut entries);
    bindery::register(&mut entries);
    loops::register(&mut entries);
    math::register(&mut entries);
    ports::register(&mut entries);
    crate::functionals::register(&mut entries);
    entries
}

// =============================================================================
// Shared helpers
// =============================================================================

/// View a block argument's parts.
pub fn block_parts(cell: &Cell) -> RillResult<(rill_core::ArrayId, u32, rill_core::Specifier)> {
    cell.series().ok_or_else(|| {
        Error::script(
            rill_core::sym::BAD_VALUE,
            "expected a block",
            vec![cell.reified()],
        )
    })
}

/// Run a branch: blocks evaluate; actions are applied (passing `with` when
/// the action takes an argument).
pub fn run_branch(vm: &mut Vm, branch: &Cell, with: Option<Cell>) -> Exec<Cell> {
    if branch.is(rill_core::Kind::Block) {
        return vm.do_block_cell(branch, rill_core::Specifier::None);
    }
    if branch.kind() == rill_core::Kind::Action {
        let takes_arg = {
            let (details, _) = branch.action_parts().expect("action");
            let exemplar = vm.heap.details(details).exemplar;
            exemplar_has_params(vm, exemplar)
        };
        let args = match (takes_arg, with) {
            (true, Some(value)) => vec![value],
            _ => Vec::new(),
        };
        return vm.apply_action(branch, args);
    }
    Err(Error::script(
        rill_core::sym::BAD_VALUE,
        "branch must be a block or an action",
        vec![branch.reified()],
    )
    .into())
}

fn exemplar_has_params(vm: &Vm, exemplar: ContextId) -> bool {
    let record = vm.heap.context(exemplar);
    record.vars.iter().skip(1).any(|var| {
        matches!(
            var.param_parts(),
            Some((class, _, _)) if class != rill_core::ParamClass::Return
        )
    })
}

/// Deep-copy an array (sub-arrays copied, other values shared).
pub fn copy_array_deep(vm: &mut Vm, array: rill_core::ArrayId) -> rill_core::ArrayId {
    let cells = vm.heap.array(array).cells.clone();
    let mut copied = Vec::with_capacity(cells.len());
    for mut cell in cells {
        if cell.kind().is_array() {
            if let Some((sub, index, spec)) = cell.series() {
                let sub_copy = copy_array_deep(vm, sub);
                if cell.kind().is_sequence() {
                    vm.heap.freeze_array(sub_copy);
                }
                cell = Cell::any_array_at(cell.kind(), sub_copy, index, spec);
            }
        }
        copied.push(cell);
    }
    vm.heap.alloc_array(copied, rill_gc::SeriesFlags::MANAGED)
}
