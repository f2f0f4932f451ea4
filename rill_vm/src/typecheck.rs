//! Parameter type checking.
//!
//! A parameter's test is an array (empty or absent = accept anything).
//! Elements are interpreted as: datatype words match the heart; well-known
//! typeset words match families; `<opt>` admits null and `<void>` admits
//! void; quasiform words match same-symbol antiform words; blocks recurse
//! with ANY semantics and groups with ALL; parameter cells delegate to
//! their own spec; actions run as predicates — with a frameless fast path
//! when the action is an intrinsic typechecker.
//!
//! Before rejecting, one round of coercion is attempted (activations drop
//! to plain actions, unstable packs decay); meta parameters are unwrapped
//! one level for the test and rewrapped after.

use rill_core::{sym, Cell, CellFlags, Error, Kind, ParamClass, ParamFlags, Specifier, SymId};
use rill_gc::Dispatcher;

use crate::bind::{self, Mode};
use crate::eval;
use crate::interp::Vm;
use crate::level::Exec;

/// Check and possibly coerce an argument against a parameter cell.
/// Returns false when the argument is rejected (caller raises).
pub fn typecheck_coerce(vm: &mut Vm, param: &Cell, arg: &mut Cell) -> Exec<bool> {
    let (class, flags, spec) = param.param_parts().expect("parameter cell");

    if flags.contains(ParamFlags::CONST) {
        arg.flags.insert(CellFlags::CONST);
    }

    if flags.contains(ParamFlags::REFINEMENT) || flags.contains(ParamFlags::SKIPPABLE) {
        if arg.is_nulled() {
            return Ok(true); // refinement not used
        }
        if spec.is_none() {
            return Ok(arg.as_logic() == Some(true)); // argless refinement marker
        }
    }

    // Meta parameters test the unwrapped form.
    let mut unquoted = false;
    if class == ParamClass::Meta {
        if arg.is_nulled() {
            return Ok(flags.contains(ParamFlags::ENDABLE));
        }
        if !arg.is_quasi() && !arg.is_quoted() {
            return Ok(false);
        }
        *arg = arg.unmeta();
        unquoted = true;
    }

    let mut coerced = false;
    let mut ok;
    loop {
        ok = match spec {
            None => arg.is_stable(),
            Some(array) => {
                let tests = vm.heap.array(array).cells.clone();
                if tests.is_empty() {
                    // An empty test block constrains nothing.
                    arg.is_stable()
                } else {
                    typecheck_cells(vm, &tests, Specifier::None, arg, false)?
                }
            }
        };
        if ok || coerced {
            break;
        }
        // Single-step coercions, then one re-test.
        coerced = true;
        if arg.is_activation() {
            *arg = arg.as_plain();
            continue;
        }
        if arg.is_raised() || arg.is_nihil() {
            break;
        }
        if arg.is_pack() {
            *arg = eval::decay(vm, *arg)?;
            continue;
        }
        break;
    }

    if unquoted {
        *arg = arg.meta();
    }
    Ok(ok)
}

/// Interpret a test array against a value.  `match_all` selects ALL (group)
/// semantics; otherwise the first passing test wins.
pub fn typecheck_cells(
    vm: &mut Vm,
    tests: &[Cell],
    tests_specifier: Specifier,
    value: &Cell,
    match_all: bool,
) -> Exec<bool> {
    for item in tests {
        let passed = check_one(vm, item, tests_specifier, value)?;
        if passed && !match_all {
            return Ok(true);
        }
        if !passed && match_all {
            return Ok(false);
        }
    }
    Ok(match_all)
}

/// Check a full test-bearing cell (block = ANY, group = ALL, parameter,
/// datatype, action) against a value.
pub fn typecheck_value(vm: &mut Vm, test: &Cell, specifier: Specifier, value: &Cell) -> Exec<bool> {
    match test.plain_kind() {
        Some(Kind::Block) | Some(Kind::TypeBlock) => {
            let (array, index, own) = test.series().expect("array");
            let tests = vm.heap.array(array).cells[index as usize..].to_vec();
            let spec = crate::specifier::derive(vm, own, specifier);
            typecheck_cells(vm, &tests, spec, value, false)
        }
        Some(Kind::Group) | Some(Kind::TypeGroup) => {
            let (array, index, own) = test.series().expect("array");
            let tests = vm.heap.array(array).cells[index as usize..].to_vec();
            let spec = crate::specifier::derive(vm, own, specifier);
            typecheck_cells(vm, &tests, spec, value, true)
        }
        Some(Kind::Parameter) => {
            let (_, _, spec) = test.param_parts().expect("parameter");
            match spec {
                None => Ok(true),
                Some(array) => {
                    let tests = vm.heap.array(array).cells.clone();
                    typecheck_cells(vm, &tests, Specifier::None, value, false)
                }
            }
        }
        _ => check_one(vm, test, specifier, value),
    }
}

fn check_one(vm: &mut Vm, item: &Cell, specifier: Specifier, value: &Cell) -> Exec<bool> {
    // Quasiform words match same-symbol antiform words.
    if item.is_quasi() && item.kind() == Kind::Word {
        return Ok(value.is_antiform()
            && value.kind() == Kind::Word
            && value.word_sym() == item.word_sym());
    }

    match item.plain_kind() {
        Some(Kind::Tag) => {
            let (string, _) = item.string().expect("tag");
            match vm.heap.utf8(string) {
                "opt" => Ok(value.is_nulled()),
                "void" => Ok(value.is_void()),
                // Endability and skippability are parameter flags, consumed
                // at paramlist build; as tests they admit nothing extra.
                _ => Ok(false),
            }
        }
        Some(Kind::Word) => {
            let sym = item.word_sym().expect("word");
            // Datatype and typeset names get a fast path that avoids any
            // variable lookup.
            if let Some(kind) = Kind::from_datatype_sym(sym) {
                return Ok(match_datatype(kind, value));
            }
            if let Some(result) = typeset_member(sym, value) {
                return Ok(result);
            }
            // Otherwise: look the word up and recurse into what it names.
            let looked = bind::resolve(vm, item, specifier, Mode::Read)?
                .map(|var| bind::read_var(vm, var))
                .transpose()?;
            match looked {
                None => Err(Error::unbound_word(*item).into()),
                Some(resolved) => check_resolved(vm, &resolved, specifier, value, Some(sym)),
            }
        }
        Some(Kind::Datatype) => {
            let kind = item.datatype_kind().expect("datatype");
            Ok(match_datatype(kind, value))
        }
        Some(Kind::Block) | Some(Kind::Group) | Some(Kind::TypeBlock) | Some(Kind::TypeGroup)
        | Some(Kind::Parameter) => typecheck_value(vm, item, specifier, value),
        Some(Kind::Action) => check_predicate(vm, item, value, None),
        _ if item.is_activation() => check_predicate(vm, item, value, None),
        _ => Err(Error::script(
            sym::BAD_VALUE,
            "invalid element in type test: {1}",
            vec![item.reified()],
        )
        .into()),
    }
}

fn check_resolved(
    vm: &mut Vm,
    resolved: &Cell,
    specifier: Specifier,
    value: &Cell,
    label: Option<SymId>,
) -> Exec<bool> {
    if resolved.is_activation() || resolved.is(Kind::Action) {
        return check_predicate(vm, resolved, value, label);
    }
    match resolved.plain_kind() {
        Some(Kind::Datatype) => Ok(match_datatype(
            resolved.datatype_kind().expect("datatype"),
            value,
        )),
        Some(Kind::TypeBlock) | Some(Kind::TypeGroup) | Some(Kind::Parameter) => {
            typecheck_value(vm, resolved, specifier, value)
        }
        _ => Err(Error::script(
            sym::BAD_VALUE,
            "word in type test does not name a test: {1}",
            vec![resolved.reified()],
        )
        .into()),
    }
}

/// Run an action as a predicate.  Intrinsic typecheckers are called
/// directly, without building a frame.
fn check_predicate(
    vm: &mut Vm,
    action: &Cell,
    value: &Cell,
    label: Option<SymId>,
) -> Exec<bool> {
    let (details, _) = action.action_parts().expect("action");
    if let Dispatcher::Intrinsic(index) = vm.heap.details(details).dispatcher {
        let intrinsic = vm.natives[index as usize]
            .intrinsic
            .expect("intrinsic dispatcher without intrinsic function");
        let result = intrinsic(vm, details, value)?;
        return logic_or_error(result, label);
    }
    let result = vm.apply_action(action, vec![*value])?;
    logic_or_error(result, label)
}

fn logic_or_error(result: Cell, label: Option<SymId>) -> Exec<bool> {
    match result.as_logic() {
        Some(b) => Ok(b),
        None => Err(Error::script(
            sym::NO_LOGIC_TYPECHECK,
            "type test predicate {1} did not return logic",
            vec![Cell::word(label.unwrap_or(sym::VALUE))],
        )
        .into()),
    }
}

/// Match a concrete datatype against a value's heart.
fn match_datatype(kind: Kind, value: &Cell) -> bool {
    if value.quoting().is_plain() {
        return value.kind() == kind;
    }
    // Plain ACTION! tests also admit activations (the common coercion).
    if kind == Kind::Action && value.is_activation() {
        return true;
    }
    if kind == Kind::Error && value.is_raised() {
        return true;
    }
    false
}

/// Well-known typeset names.
pub fn typeset_member(sym_id: SymId, value: &Cell) -> Option<bool> {
    let plain = value.quoting().is_plain();
    Some(match sym_id {
        sym::ANY_VALUE_X => value.is_stable(),
        sym::ANY_WORD_X => plain && value.kind().is_word(),
        sym::ANY_ARRAY_X => plain && value.kind().is_array(),
        sym::ANY_SERIES_X => plain && (value.kind().is_array() || value.kind().is_string()),
        sym::ANY_CONTEXT_X => plain && value.kind().is_context(),
        sym::ANY_PATH_X => plain && value.kind().is_sequence(),
        sym::ANY_NUMBER_X => {
            plain && matches!(value.kind(), Kind::Integer | Kind::Decimal)
        }
        sym::LOGIC_Q => value.as_logic().is_some(),
        _ => return None,
    })
}

/// Conditional truthiness: null and false are falsey; void errors; all
/// other stable values are truthy.
pub fn truthy(value: &Cell) -> Exec<bool> {
    if value.is_nulled() || value.as_logic() == Some(false) {
        return Ok(false);
    }
    if value.is_void() || value.is_none() {
        return Err(Error::script(
            sym::BAD_VALUE,
            "void or unset value used as a condition",
            Vec::new(),
        )
        .into());
    }
    Ok(true)
}
