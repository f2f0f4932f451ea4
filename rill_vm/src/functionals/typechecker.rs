//! TYPECHECKER: generator for optimized type-checking actions.
//!
//! The generated action uses the intrinsic dispatcher.  Two call paths are
//! frameless: the evaluator's bare invocations (a word or literal naming
//! the intrinsic) and predicate positions inside another parameter's type
//! test both call the implementation directly, with no frame built and no
//! action level pushed.  Indirect invocations — through paths, reified
//! frames, or composition layers — still build a frame and reach the
//! implementation through the action executor's intrinsic arm.

use rill_core::{sym, Cell, DetailsId, Error, Kind, SymId};
use rill_gc::Dispatcher;

use crate::action::{make_action, make_paramlist};
use crate::interp::Vm;
use crate::level::Exec;
use crate::natives::{Call, NativeEntry};
use crate::typecheck;

/// Name of the hidden intrinsic entry (not installed in lib).
pub const INTRINSIC_NAME: &str = "typechecker-intrinsic";

/// Register TYPECHECKER and its intrinsic core.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "typechecker",
        "type [datatype! word!]",
        native_typechecker,
    ));
    entries.push(NativeEntry {
        name: INTRINSIC_NAME,
        spec: "value [<opt> any-value!]",
        func: intrinsic_framed,
        intrinsic: Some(checker_intrinsic),
        enfix: false,
        defers: false,
        install: false,
    });
}

fn native_typechecker(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let type_sym = vm.intern("type");
    let type_arg = call.arg(vm, type_sym);
    match type_arg.plain_kind() {
        Some(Kind::Datatype) | Some(Kind::Word) => {}
        _ => {
            return Err(Error::script(
                sym::BAD_VALUE,
                "TYPECHECKER takes a datatype or typeset word",
                vec![type_arg.reified()],
            )
            .into())
        }
    }
    let checker = make_typechecker(vm, type_arg, None)?;
    Ok(Cell::activation(checker, None))
}

/// Build a typechecker action for a datatype or typeset word.  Factored out
/// because boot creates the standard predicates before TYPECHECKER itself
/// is callable.
pub fn make_typechecker(
    vm: &mut Vm,
    type_cell: Cell,
    label: Option<SymId>,
) -> Exec<DetailsId> {
    let index = vm
        .natives
        .iter()
        .position(|entry| entry.name == INTRINSIC_NAME)
        .expect("intrinsic core registered");

    // The spec is just `value` with no constraints.
    let spec = vec![Cell::word(sym::VALUE)];
    let exemplar = make_paramlist(vm, &spec, true)?;
    let details = make_action(
        vm,
        exemplar,
        Dispatcher::Intrinsic(index as u16),
        label,
        vec![type_cell.reified()],
    );
    Ok(details)
}

/// The intrinsic: compare the argument against the stored datatype or
/// typeset, yielding logic.
fn checker_intrinsic(vm: &mut Vm, details: DetailsId, arg: &Cell) -> Exec<Cell> {
    let stored = vm.heap.details(details).cells[1];
    let result = match stored.plain_kind() {
        Some(Kind::Datatype) => {
            let kind = stored.datatype_kind().expect("datatype");
            arg.quoting().is_plain() && arg.kind() == kind
        }
        Some(Kind::Word) => {
            let name = stored.word_sym().expect("word");
            match name {
                sym::NULL => arg.is_nulled(),
                sym::VOID => arg.is_void(),
                _ => typecheck::typeset_member(name, arg).unwrap_or(false),
            }
        }
        _ => false,
    };
    Ok(Cell::logic(result))
}

/// Framed fallback, used if the checker is invoked through a generic frame
/// path rather than the intrinsic fast path.
fn intrinsic_framed(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let value = call.arg(vm, sym::VALUE);
    let phase = vm
        .heap
        .context(call.frame)
        .phase
        .expect("typechecker frame has a phase");
    checker_intrinsic(vm, phase, &value)
}
