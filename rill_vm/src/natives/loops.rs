//! Loop natives: FOR-EACH, REPEAT, WHILE, UNTIL.
//!
//! Loop bodies run under a copied-and-bound body block; BREAK and CONTINUE
//! are throws with reserved labels, intercepted here.  BREAK makes the loop
//! yield null; a loop that never runs yields null as well.

use rill_core::{sym, Cell, Error, Kind, Specifier};

use crate::bind;
use crate::interp::Vm;
use crate::level::{Exec, VmSignal};
use crate::natives::bindery::{bind_loop_body, loop_context, LoopVar};
use crate::natives::{block_parts, Call, NativeEntry};
use crate::typecheck::truthy;

/// Register the loop natives.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "for-each",
        "return: [<opt> any-value!] 'vars [word! block! group!] \
         data [any-series! any-context!] body [block!]",
        native_for_each,
    ));
    entries.push(NativeEntry::new(
        "repeat",
        "return: [<opt> any-value!] count [integer!] body [block!]",
        native_repeat,
    ));
    entries.push(NativeEntry::new(
        "while",
        "return: [<opt> any-value!] condition [block!] body [block!]",
        native_while,
    ));
    entries.push(NativeEntry::new(
        "until",
        "return: [<opt> any-value!] body [block!]",
        native_until,
    ));
}

/// What a loop body iteration asked of its loop.
enum LoopSignal {
    /// Keep going; the value is the iteration's product.
    Next(Cell),
    /// BREAK: stop, loop yields null.
    Stop,
}

/// Run one body iteration, translating BREAK/CONTINUE throws.
fn run_body(vm: &mut Vm, body: &Cell) -> Exec<LoopSignal> {
    match vm.do_block_cell(body, Specifier::None) {
        Ok(value) => Ok(LoopSignal::Next(value)),
        Err(VmSignal::Thrown) => {
            if vm.throw_label_is(sym::BREAK) {
                vm.take_throw();
                Ok(LoopSignal::Stop)
            } else if vm.throw_label_is(sym::CONTINUE) {
                vm.take_throw();
                Ok(LoopSignal::Next(Cell::void()))
            } else {
                Err(VmSignal::Thrown)
            }
        }
        Err(other) => Err(other),
    }
}

fn native_for_each(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let spec = call.arg(vm, sym::VARS);
    let data = call.arg(vm, sym::DATA);
    let body = call.arg(vm, sym::BODY);

    let mut spec = spec;
    if spec.is(Kind::Group) {
        spec = vm.do_block_cell(&spec, Specifier::None)?;
    }
    // Quoted variables resolve through the caller's chain, so LET-bound
    // words can be reused as loop variables.
    let spec_chain = call.feed.borrow().specifier;
    let (ctx, vars) = loop_context(vm, &spec, spec_chain)?;
    let body = bind_loop_body(vm, &body, ctx)?;

    // Gather the iterated values up front; the loop context holds stable
    // slot references while user code runs.
    let items: Vec<Cell> = if data.kind().is_array() {
        let (array, index, _) = data.series().expect("array");
        vm.heap.array(array).cells[index as usize..].to_vec()
    } else if data.kind().is_context() {
        let ctx_id = data.context().expect("context");
        let record = vm.heap.context_accessible(ctx_id)?;
        let keylist = record.keylist;
        vm.heap
            .keylist(keylist)
            .keys
            .iter()
            .map(|k| Cell::word(*k))
            .collect()
    } else {
        return Err(Error::script(
            sym::BAD_VALUE,
            "FOR-EACH cannot iterate this value",
            vec![data.reified()],
        )
        .into());
    };

    let mut result = Cell::nulled();
    let mut cursor = 0usize;
    while cursor < items.len() {
        // One chunk of loop variables per iteration.
        for var in &vars {
            let value = items.get(cursor).copied().unwrap_or_else(Cell::nulled);
            cursor += 1;
            match var {
                LoopVar::Fresh(index) => {
                    vm.heap.context_mut(ctx).vars[*index as usize] = value;
                }
                LoopVar::Existing(var_ref) => {
                    bind::write_var(vm, *var_ref, value)?;
                }
                LoopVar::Skip => {}
            }
        }
        match run_body(vm, &body)? {
            LoopSignal::Next(value) => result = value,
            LoopSignal::Stop => return Ok(Cell::nulled()),
        }
    }
    Ok(result)
}

fn native_repeat(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let count = call.arg(vm, sym::COUNT).as_int().unwrap_or(0);
    let body = call.arg(vm, sym::BODY);
    let mut result = Cell::nulled();
    for _ in 0..count.max(0) {
        match run_body(vm, &body)? {
            LoopSignal::Next(value) => result = value,
            LoopSignal::Stop => return Ok(Cell::nulled()),
        }
    }
    Ok(result)
}

fn native_while(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let condition = call.arg(vm, sym::CONDITION);
    let body = call.arg(vm, sym::BODY);
    block_parts(&condition)?;
    let mut result = Cell::nulled();
    loop {
        let test = vm.do_block_cell(&condition, Specifier::None)?;
        if !truthy(&test)? {
            return Ok(result);
        }
        match run_body(vm, &body)? {
            LoopSignal::Next(value) => result = value,
            LoopSignal::Stop => return Ok(Cell::nulled()),
        }
    }
}

fn native_until(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let body = call.arg(vm, sym::BODY);
    loop {
        match run_body(vm, &body)? {
            LoopSignal::Next(value) => {
                if !value.is_void() && truthy(&value)? {
                    return Ok(value);
                }
            }
            LoopSignal::Stop => return Ok(Cell::nulled()),
        }
    }
}
