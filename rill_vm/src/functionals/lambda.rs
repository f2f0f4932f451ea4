//! LAMBDA: low-overhead action with virtual binding and no RETURN.

use rill_core::{sym, Cell, Error, Kind};
use rill_gc::Dispatcher;

use crate::action::{make_action, make_paramlist};
use crate::interp::Vm;
use crate::level::Exec;
use crate::natives::{block_parts, Call, NativeEntry};

/// Register LAMBDA.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "lambda",
        "spec [blank! word! meta-word! block!] body [block!]",
        native_lambda,
    ));
}

/// LAMBDA: no RETURN slot, no body copy.  The body runs under a use-patch
/// over the frame, so its bindings stay shared with the definition site and
/// the frame shadows only the named parameters.  Invisibility is allowed:
/// an empty body yields void.
fn native_lambda(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let spec = call.arg(vm, sym::SPEC);
    let body = call.arg(vm, sym::BODY);
    block_parts(&body)?;

    let spec_cells: Vec<Cell> = if spec.is(Kind::Blank) {
        Vec::new()
    } else if spec.is(Kind::Block) {
        let (array, index, _) = block_parts(&spec)?;
        vm.heap.array(array).cells[index as usize..].to_vec()
    } else if spec.kind().is_word() || (spec.is_quoted() && spec.kind() == Kind::Word) {
        vec![spec]
    } else {
        return Err(Error::script(
            sym::BAD_VALUE,
            "LAMBDA spec must be a blank, word, or block",
            vec![spec.reified()],
        )
        .into());
    };

    let exemplar = make_paramlist(vm, &spec_cells, false)?;
    let details = make_action(vm, exemplar, Dispatcher::Lambda, None, vec![body]);
    Ok(Cell::activation(details, None))
}
