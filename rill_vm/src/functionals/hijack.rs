//! HIJACK: replace an action's behavior for every existing reference.
//!
//! Hijacking rewrites the victim's identity record, so every cell pointing
//! at it sees the new behavior.  When the hijacker's frame derives from the
//! victim's, the hijacker's dispatcher and data slide in directly; when the
//! frames don't line up, a shim dispatcher remaps arguments by name at call
//! time.  A copy of the victim taken before the hijack keeps the old
//! behavior, and hijacking the copy back restores it.

use rill_core::{sym, Cell, Error};
use rill_gc::Dispatcher;

use crate::context;
use crate::interp::Vm;
use crate::level::Exec;
use crate::natives::{Call, NativeEntry};

/// Register HIJACK.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "hijack",
        "return: [<opt> action!] victim [action!] hijacker [action!]",
        native_hijack,
    ));
}

fn native_hijack(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let victim_cell = call.arg(vm, sym::VICTIM);
    let hijacker_cell = call.arg(vm, sym::HIJACKER);
    let (victim, _) = victim_cell.action_parts().ok_or_else(|| {
        Error::script(sym::BAD_VALUE, "HIJACK victim must be an action", Vec::new())
    })?;
    let (hijacker, hijacker_binding) = hijacker_cell.action_parts().ok_or_else(|| {
        Error::script(sym::BAD_VALUE, "HIJACK hijacker must be an action", Vec::new())
    })?;

    if victim == hijacker {
        return Ok(Cell::nulled()); // self-hijack is a useful no-op
    }

    let victim_keylist = {
        let exemplar = vm.heap.details(victim).exemplar;
        vm.heap.context(exemplar).keylist
    };
    let hijacker_keylist = {
        let exemplar = vm.heap.details(hijacker).exemplar;
        vm.heap.context(exemplar).keylist
    };

    if context::keylist_descends_from(vm, hijacker_keylist, victim_keylist) {
        // Compatible frames: take over the dispatcher and its data outright.
        // Frames built against the victim's paramlist keep working, since
        // the shapes agree.
        let (cells, dispatcher, defers) = {
            let record = vm.heap.details(hijacker);
            (record.cells.clone(), record.dispatcher, record.defers_lookback)
        };
        let record = vm.heap.details_mut(victim);
        record.cells = cells;
        record.dispatcher = dispatcher;
        record.defers_lookback = defers;
    } else {
        // Mismatched frames: leave the victim's data intact (other copies
        // may still use it) and install the shim, with the hijacker's
        // archetype slipped into slot 0.
        let archetype = vm.heap.details(hijacker).cells[0];
        let record = vm.heap.details_mut(victim);
        record.dispatcher = Dispatcher::HijackShim;
        record.cells[0] = archetype;
    }

    // No pre-hijack copy is returned: callers snapshot with COPY themselves
    // if they intend to restore.
    Ok(Cell::activation(victim, hijacker_binding))
}
