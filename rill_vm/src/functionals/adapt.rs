//! ADAPT: run a prelude in the frame before the underlying action.

use rill_core::{sym, Cell, Error, Kind, Specifier};
use rill_gc::Dispatcher;

use crate::action::make_action;
use crate::bind::copy_and_bind_relative_deep;
use crate::interp::Vm;
use crate::level::Exec;
use crate::natives::{block_parts, Call, NativeEntry};

/// Register ADAPT.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "adapt",
        "action [action!] prelude [block!]",
        native_adapt,
    ));
}

/// ADAPT shares the underlying action's exemplar (the parameters are
/// unchanged); the prelude is copied with parameter words bound relatively,
/// runs in the fulfilled frame, and may mutate arguments before the
/// underlying dispatcher sees them.
fn native_adapt(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let action = call.arg(vm, sym::ACTION);
    let prelude = call.arg(vm, sym::PRELUDE);
    let Some((details, _)) = action.action_parts() else {
        return Err(Error::script(
            sym::BAD_VALUE,
            "ADAPT requires an action",
            vec![action.reified()],
        )
        .into());
    };

    let exemplar = vm.heap.details(details).exemplar;
    let label = vm.heap.details(details).label;
    let adapted = make_action(
        vm,
        exemplar,
        Dispatcher::Adapter,
        label,
        vec![Cell::blank(), action.as_plain()],
    );

    let (prelude_array, prelude_index, _) = block_parts(&prelude)?;
    let relativized = copy_and_bind_relative_deep(vm, prelude_array, adapted);
    vm.heap.details_mut(adapted).cells[1] =
        Cell::any_array_at(Kind::Block, relativized, prelude_index, Specifier::None);
    Ok(Cell::activation(adapted, None))
}
