//! SPECIALIZE: pre-fill some of an action's parameters.

use rill_core::{sym, Cell, Error, Kind, UseFilter};
use rill_gc::{ContextKind, Dispatcher, SeriesFlags};

use crate::action::make_action;
use crate::interp::Vm;
use crate::level::Exec;
use crate::natives::{block_parts, Call, NativeEntry};
use crate::specifier;

/// Register SPECIALIZE.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "specialize",
        "action [action!] def [block!]",
        native_specialize,
    ));
}

/// SPECIALIZE copies the action's exemplar frame, evaluates the definition
/// block with its SET-WORD!s virtually bound into the copy, and wraps the
/// result: slots the definition assigned are specialized, the rest remain
/// parameters to be fulfilled at the call site.
fn native_specialize(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let action = call.arg(vm, sym::ACTION);
    let def = call.arg(vm, sym::DEF);
    let Some((details, _binding)) = action.action_parts() else {
        return Err(Error::script(
            sym::BAD_VALUE,
            "SPECIALIZE requires an action",
            vec![action.reified()],
        )
        .into());
    };

    // Copy the exemplar: shared keylist, cloned slots.
    let source = vm.heap.details(details).exemplar;
    let keylist = vm.heap.context(source).keylist;
    let vars = vm.heap.context(source).vars.clone();
    let exemplar = vm
        .heap
        .alloc_context(ContextKind::Frame, keylist, vars, SeriesFlags::MANAGED);
    vm.heap.context_mut(exemplar).vars[0] = Cell::any_context(Kind::Frame, exemplar);
    vm.heap.context_mut(exemplar).phase = Some(details);

    // Run the definition with set-words bound into the copy.
    let (def_array, def_index, def_spec) = block_parts(&def)?;
    let chain = specifier::make_use_patch(vm, exemplar, UseFilter::SetWordsOnly, def_spec);
    vm.do_array(def_array, def_index as usize, chain)?;

    let label = vm.heap.details(details).label;
    let specialized = make_action(
        vm,
        exemplar,
        Dispatcher::Specializer,
        label,
        vec![action.as_plain()],
    );
    Ok(Cell::activation(specialized, None))
}
