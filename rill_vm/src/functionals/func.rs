//! FUNC, definitional RETURN, and ENFIX.

use rill_core::{sym, Cell, CellFlags, Error, Kind};
use rill_gc::Dispatcher;

use crate::action::{make_action, make_paramlist};
use crate::bind::copy_and_bind_relative_deep;
use crate::interp::Vm;
use crate::level::Exec;
use crate::natives::{block_parts, Call, NativeEntry};

/// Register FUNC / RETURN / ENFIX.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "func",
        "spec [block!] body [block!]",
        native_func,
    ));
    entries.push(NativeEntry {
        name: "return",
        spec: "value [<opt> any-value!]",
        func: native_return,
        intrinsic: None,
        enfix: false,
        defers: false,
        install: false, // reachable only through a frame's definitional slot
    });
    entries.push(NativeEntry::new("enfix", "action [action!]", native_enfix));
}

/// FUNC: interpreted action with a type-checked, definitional RETURN.
/// The body is deep-copied with parameter words bound relatively, so one
/// body array serves every future frame.
fn native_func(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let spec = call.arg(vm, sym::SPEC);
    let body = call.arg(vm, sym::BODY);

    let (spec_array, spec_index, _) = block_parts(&spec)?;
    let spec_cells = vm.heap.array(spec_array).cells[spec_index as usize..].to_vec();
    let exemplar = make_paramlist(vm, &spec_cells, true)?;

    let details = make_action(vm, exemplar, Dispatcher::Func, None, vec![Cell::blank()]);
    let (body_array, body_index, _) = block_parts(&body)?;
    let relativized = copy_and_bind_relative_deep(vm, body_array, details);
    vm.heap.details_mut(details).cells[1] = Cell::any_array_at(
        Kind::Block,
        relativized,
        body_index,
        rill_core::Specifier::None,
    );
    Ok(Cell::activation(details, None))
}

/// RETURN throws to its definitional frame; the frame's action level
/// intercepts and runs the return-type check.
fn native_return(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let value = call.arg(vm, sym::VALUE);
    let Some(frame) = call.binding else {
        return Err(Error::script(
            sym::BAD_VALUE,
            "RETURN used outside of a function frame",
            Vec::new(),
        )
        .into());
    };
    let label = Cell::any_context(Kind::Frame, frame);
    Err(vm.throw(label, value))
}

/// ENFIX marks an action value so word-fetches of it take their first
/// argument from the preceding expression.
fn native_enfix(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let action = call.arg(vm, sym::ACTION);
    let (details, binding) = action.action_parts().ok_or_else(|| {
        Error::script(sym::BAD_VALUE, "ENFIX requires an action", vec![action.reified()])
    })?;
    let mut cell = Cell::activation(details, binding);
    cell.flags.insert(CellFlags::ENFIX);
    Ok(cell)
}
