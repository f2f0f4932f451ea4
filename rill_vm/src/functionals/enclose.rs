//! ENCLOSE: wrap an action with full control over when it runs.

use rill_core::{sym, Cell, Error};
use rill_gc::Dispatcher;

use crate::action::make_action;
use crate::interp::Vm;
use crate::level::Exec;
use crate::natives::{Call, NativeEntry};

/// Register ENCLOSE.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "enclose",
        "inner [action!] outer [action!]",
        native_enclose,
    ));
}

/// ENCLOSE builds the inner action's frame without running it and hands
/// that FRAME! to the outer function, which decides if and when to DO it.
fn native_enclose(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let inner = call.arg(vm, sym::INNER);
    let outer = call.arg(vm, sym::OUTER);
    let Some((inner_details, _)) = inner.action_parts() else {
        return Err(Error::script(
            sym::BAD_VALUE,
            "ENCLOSE requires an inner action",
            vec![inner.reified()],
        )
        .into());
    };
    if outer.action_parts().is_none() {
        return Err(Error::script(
            sym::BAD_VALUE,
            "ENCLOSE requires an outer action",
            vec![outer.reified()],
        )
        .into());
    }

    let exemplar = vm.heap.details(inner_details).exemplar;
    let label = vm.heap.details(inner_details).label;
    let enclosed = make_action(
        vm,
        exemplar,
        Dispatcher::Encloser,
        label,
        vec![inner.as_plain(), outer.as_plain()],
    );
    Ok(Cell::activation(enclosed, None))
}
