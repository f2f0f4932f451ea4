//! Control-flow natives: branching, catch/throw, error handling.

use rill_core::{sym, Cell, Error, Kind};

use crate::context;
use crate::interp::Vm;
use crate::level::{Exec, VmSignal};
use crate::natives::{run_branch, Call, NativeEntry};
use crate::typecheck::truthy;

/// Register the control natives.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "if",
        "return: [<opt> any-value!] condition [any-value!] branch [block! action!]",
        native_if,
    ));
    entries.push(NativeEntry::new(
        "either",
        "return: [<opt> any-value!] condition [any-value!] \
         true-branch [block! action!] false-branch [block! action!]",
        native_either,
    ));
    entries.push(NativeEntry::new("not", "value [any-value!]", native_not));
    entries.push(NativeEntry::new(
        "catch",
        "return: [<opt> any-value!] block [block!] /name [word!]",
        native_catch,
    ));
    entries.push(NativeEntry::new(
        "throw",
        "value [<opt> any-value!] /name [word!]",
        native_throw,
    ));
    entries.push(NativeEntry::new("break", "", native_break));
    entries.push(NativeEntry::new("continue", "", native_continue));
    entries.push(NativeEntry::new(
        "try",
        "return: [<opt> any-value!] block [block!]",
        native_try,
    ));
    entries.push(NativeEntry::new("fail", "reason [text! error!]", native_fail));
    entries.push(NativeEntry::new(
        "comment",
        "return: [<void>] 'discarded [block! text! tag! integer!]",
        native_comment,
    ));
    entries.push(NativeEntry::new(
        "do",
        "return: [<opt> any-value!] source [block! group! text! frame! error!]",
        native_do,
    ));
    entries.push(NativeEntry::enfix_defer(
        "then",
        "return: [<opt> any-value!] optional [<opt> any-value!] branch [block! action!]",
        native_then,
    ));
    entries.push(NativeEntry::enfix_defer(
        "else",
        "return: [<opt> any-value!] optional [<opt> any-value!] branch [block! action!]",
        native_else,
    ));
}

fn native_if(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let condition = call.arg(vm, sym::CONDITION);
    let branch = call.arg(vm, sym::BRANCH);
    if truthy(&condition)? {
        run_branch(vm, &branch, Some(condition))
    } else {
        Ok(Cell::nulled())
    }
}

fn native_either(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let condition = call.arg(vm, sym::CONDITION);
    let which = if truthy(&condition)? {
        vm.intern("true-branch")
    } else {
        vm.intern("false-branch")
    };
    let branch = call.arg(vm, which);
    run_branch(vm, &branch, Some(condition))
}

fn native_not(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let value = call.arg(vm, sym::VALUE);
    Ok(Cell::logic(!truthy(&value)?))
}

/// CATCH evaluates its block and intercepts a throw whose label matches:
/// unlabelled catch takes unlabelled throws, `catch/name` matches the label
/// word.  A non-matching throw keeps unwinding.
fn native_catch(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let block_sym = vm.intern("block");
    let block = call.arg(vm, block_sym);
    let name = call.arg_opt(vm, sym::NAME);
    match vm.do_block_cell(&block, rill_core::Specifier::None) {
        Ok(_) => Ok(Cell::nulled()), // completed without a throw
        Err(VmSignal::Thrown) => {
            let matches = match name {
                Some(word) => {
                    vm.throw_label.is(Kind::Word)
                        && vm.throw_label.word_sym() == word.word_sym()
                }
                None => vm.throw_label.is_nulled(),
            };
            if matches {
                let (_, value) = vm.take_throw();
                Ok(value)
            } else {
                Err(VmSignal::Thrown) // re-raise for an outer catch
            }
        }
        Err(other) => Err(other),
    }
}

fn native_throw(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let value = call.arg(vm, sym::VALUE);
    let label = match call.arg_opt(vm, sym::NAME) {
        Some(word) => word,
        None => Cell::nulled(),
    };
    Err(vm.throw(label, value))
}

fn native_break(vm: &mut Vm, _call: &Call) -> Exec<Cell> {
    Err(vm.throw(Cell::word(sym::BREAK), Cell::nulled()))
}

fn native_continue(vm: &mut Vm, _call: &Call) -> Exec<Cell> {
    Err(vm.throw(Cell::word(sym::CONTINUE), Cell::nulled()))
}

/// TRY runs a block, defusing raised errors to null.  Throws pass through.
fn native_try(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let block_sym = vm.intern("block");
    let block = call.arg(vm, block_sym);
    match vm.do_block_cell(&block, rill_core::Specifier::None) {
        Ok(value) => Ok(value),
        Err(VmSignal::Error(_)) => Ok(Cell::nulled()),
        Err(VmSignal::Thrown) => Err(VmSignal::Thrown),
    }
}

fn native_fail(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let reason_sym = vm.intern("reason");
    let reason = call.arg(vm, reason_sym);
    let err = match reason.plain_kind() {
        Some(Kind::Error) => context::error_from_context(vm, &reason),
        _ => Error::script(
            sym::BAD_VALUE,
            vm.form(&reason),
            Vec::new(),
        ),
    };
    Err(VmSignal::Error(err))
}

fn native_comment(_vm: &mut Vm, _call: &Call) -> Exec<Cell> {
    Ok(Cell::nihil())
}

fn native_do(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let source_sym = vm.intern("source");
    let source = call.arg(vm, source_sym);
    match source.plain_kind() {
        Some(Kind::Block) | Some(Kind::Group) => {
            vm.do_block_cell(&source, rill_core::Specifier::None)
        }
        Some(Kind::Text) => {
            let (string, _) = source.string().expect("text");
            let text = vm.heap.utf8(string).to_string();
            vm.run_source(&text)
        }
        Some(Kind::Frame) => {
            let ctx = source.context().expect("frame");
            crate::action::do_frame(vm, ctx)
        }
        Some(Kind::Error) => {
            Err(VmSignal::Error(context::error_from_context(vm, &source)))
        }
        _ => Err(Error::script(
            sym::BAD_VALUE,
            "DO cannot evaluate this value",
            vec![source.reified()],
        )
        .into()),
    }
}

fn native_then(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let optional_sym = vm.intern("optional");
    let optional = call.arg(vm, optional_sym);
    let branch = call.arg(vm, sym::BRANCH);
    if optional.is_nulled() {
        Ok(Cell::nulled())
    } else {
        run_branch(vm, &branch, Some(optional))
    }
}

fn native_else(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let optional_sym = vm.intern("optional");
    let optional = call.arg(vm, optional_sym);
    let branch = call.arg(vm, sym::BRANCH);
    if optional.is_nulled() {
        run_branch(vm, &branch, None)
    } else {
        Ok(optional)
    }
}
