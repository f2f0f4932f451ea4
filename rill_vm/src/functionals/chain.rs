//! CHAIN: pipe an action's result through further actions.

use rill_core::{sym, Cell, Error, Specifier};
use rill_gc::{Dispatcher, SeriesFlags};

use crate::action::make_action;
use crate::feed::Feed;
use crate::interp::Vm;
use crate::level::{Exec, LevelFlags};
use crate::natives::{block_parts, Call, NativeEntry};

/// Register CHAIN.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "chain",
        "actions [block!]",
        native_chain,
    ));
}

/// CHAIN reduces its block to a pipeline of actions.  The composite takes
/// the first action's parameters; each later action receives the previous
/// result as its sole argument.
fn native_chain(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let actions_sym = vm.intern("actions");
    let block = call.arg(vm, actions_sym);
    let (array, index, spec) = block_parts(&block)?;

    // Reduce the pipeline block: entries are typically `:get-words`.
    let feed = Feed::from_array(array, index as usize, spec);
    let mut pipeline: Vec<Cell> = Vec::new();
    while let Some(step) = vm.eval_step(feed.clone(), LevelFlags::empty())? {
        if step.is_nihil() {
            continue;
        }
        let action = step.as_plain();
        if action.action_parts().is_none() {
            return Err(Error::script(
                sym::BAD_VALUE,
                "CHAIN pipeline items must be actions",
                vec![step.reified()],
            )
            .into());
        }
        pipeline.push(action);
    }
    let Some(first) = pipeline.first().copied() else {
        return Err(Error::script(
            sym::BAD_VALUE,
            "CHAIN requires at least one action",
            Vec::new(),
        )
        .into());
    };

    let (first_details, _) = first.action_parts().expect("action");
    let exemplar = vm.heap.details(first_details).exemplar;
    let label = vm.heap.details(first_details).label;
    let pipeline_array = vm.heap.alloc_array(pipeline, SeriesFlags::MANAGED);
    let pipeline_cell = Cell::block(pipeline_array, Specifier::None);

    let chained = make_action(vm, exemplar, Dispatcher::Chainer, label, vec![pipeline_cell]);
    Ok(Cell::activation(chained, None))
}
