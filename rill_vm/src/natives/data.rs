//! Data natives: construction, access, series operations.

use rill_core::{sym, Cell, Error, Kind, Specifier};
use rill_gc::{ContextKind, SeriesFlags, StringData};

use crate::bind::{self, Mode};
use crate::context;
use crate::interp::Vm;
use crate::level::Exec;
use crate::natives::{block_parts, copy_array_deep, Call, NativeEntry};
use crate::path::{self, PathIntent, PathProduct};

/// Register the data natives.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "make",
        "type [datatype! object! module!] def [block! integer! action!]",
        native_make,
    ));
    entries.push(NativeEntry::new(
        "get",
        "return: [<opt> any-value!] source [any-word! any-path!] /any",
        native_get,
    ));
    entries.push(NativeEntry::new(
        "set",
        "target [any-word! any-path!] value [<opt> any-value!]",
        native_set,
    ));
    entries.push(NativeEntry::new("the", "'value [any-value!]", native_the));
    entries.push(NativeEntry::new(
        "type-of",
        "value [<opt> any-value!]",
        native_type_of,
    ));
    entries.push(NativeEntry::new("mold", "value [any-value!]", native_mold));
    entries.push(NativeEntry::new("print", "value [<opt> any-value!]", native_print));
    entries.push(NativeEntry::new("probe", "value [<opt> any-value!]", native_probe));
    entries.push(NativeEntry::new(
        "copy",
        "value [any-series! any-context! action!] /deep",
        native_copy,
    ));
    entries.push(NativeEntry::new(
        "append",
        "series [any-series!] value [<opt> any-value!] /only /dup [integer!]",
        native_append,
    ));
    entries.push(NativeEntry::new(
        "length-of",
        "series [any-series! any-context!]",
        native_length_of,
    ));
    entries.push(NativeEntry::new("first", "series [any-series!]", native_first));
    entries.push(NativeEntry::new(
        "pick",
        "return: [<opt> any-value!] location [any-value!] picker [any-value!]",
        native_pick,
    ));
    entries.push(NativeEntry::new(
        "poke",
        "location [any-value!] picker [any-value!] value [<opt> any-value!]",
        native_poke,
    ));
    entries.push(NativeEntry::new(
        "reduce",
        "block [block!]",
        native_reduce,
    ));
}

/// MAKE: `make object! [...]` builds a context by collecting top-level
/// set-words, binding the body deeply, and evaluating it.
fn native_make(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let type_sym = vm.intern("type");
    let type_arg = call.arg(vm, type_sym);
    let def = call.arg(vm, sym::DEF);

    // MAKE of an existing object makes a derived copy evaluated with the
    // definition on top (derivation keeps the keylist ancestry).
    let target_kind = match type_arg.plain_kind() {
        Some(Kind::Datatype) => type_arg.datatype_kind().expect("datatype"),
        Some(other) if other.is_context() => other,
        _ => {
            return Err(Error::script(
                sym::BAD_MAKE_ARG,
                "MAKE requires a datatype or context",
                vec![type_arg.reified()],
            )
            .into())
        }
    };

    match target_kind {
        Kind::Object | Kind::Module => {
            let (array, _, _) = block_parts(&def)?;
            let kind = if target_kind == Kind::Module {
                ContextKind::Module
            } else {
                ContextKind::Object
            };

            // MAKE of an existing object derives: the child's keylist keeps
            // the parent as ancestor, values are copied, and action values
            // bound to the parent are re-pointed at the child so derived
            // binding can substitute it.
            let ctx = match type_arg.context() {
                Some(parent) if type_arg.plain_kind() == Some(Kind::Object) => {
                    let parent_record = vm.heap.context_accessible(parent)?;
                    let parent_keylist = parent_record.keylist;
                    let mut vars = parent_record.vars.clone();
                    let keys = vm.heap.keylist(parent_keylist).keys.clone();
                    let keylist = vm.heap.alloc_keylist(keys, Some(parent_keylist));
                    let child = vm.heap.alloc_context(
                        ContextKind::Object,
                        keylist,
                        vars.clone(),
                        SeriesFlags::MANAGED,
                    );
                    for (i, var) in vars.iter_mut().enumerate().skip(1) {
                        if let Some((details, Some(bound))) = var.action_parts() {
                            if bound == parent {
                                let anti = var.is_antiform();
                                let mut rebound = Cell::action(details, Some(child));
                                if anti {
                                    rebound = rebound.antiformify();
                                }
                                vm.heap.context_mut(child).vars[i] = rebound;
                            }
                        }
                    }
                    vm.heap.context_mut(child).vars[0] = Cell::any_context(Kind::Object, child);
                    child
                }
                _ => context::make_context(vm, kind, Vec::new()),
            };

            // Collect top-level set-words (modules attach sea-of-words
            // variables; objects get keylist slots), then bind deeply and
            // evaluate.
            let cells = vm.heap.array(array).cells.clone();
            for cell in &cells {
                if cell.is(Kind::SetWord) {
                    let key = cell.word_sym().expect("set-word");
                    if kind == ContextKind::Module {
                        if context::module_var(vm, ctx, key).is_none() {
                            context::attach_module_var(vm, ctx, key, Cell::none());
                        }
                    } else if context::find_key(vm, ctx, key).is_none() {
                        context::append_key(vm, ctx, key, Cell::none())?;
                    }
                }
            }
            let body = copy_array_deep(vm, array);
            bind::bind_values_deep(vm, body, ctx, |k| k.is_word(), false)?;
            vm.do_array(body, 0, Specifier::None)?;
            Ok(Cell::any_context(target_kind, ctx))
        }
        Kind::Block => {
            let capacity = def.as_int().unwrap_or(0).max(0) as usize;
            let array = vm
                .heap
                .alloc_array(Vec::with_capacity(capacity), SeriesFlags::MANAGED);
            Ok(Cell::block(array, Specifier::None))
        }
        Kind::Frame => {
            // MAKE FRAME! :action builds an unfilled frame for later DO.
            let Some((details, binding)) = def.action_parts() else {
                return Err(Error::script(
                    sym::BAD_MAKE_ARG,
                    "MAKE FRAME! requires an action",
                    vec![def.reified()],
                )
                .into());
            };
            let exemplar = vm.heap.details(details).exemplar;
            let keylist = vm.heap.context(exemplar).keylist;
            let vars = vm.heap.context(exemplar).vars.clone();
            let frame = vm
                .heap
                .alloc_context(ContextKind::Frame, keylist, vars, SeriesFlags::MANAGED);
            let record = vm.heap.context_mut(frame);
            record.vars[0] = Cell::any_context(Kind::Frame, frame);
            record.phase = Some(details);
            record.frame_binding = binding;
            Ok(Cell::any_context(Kind::Frame, frame))
        }
        Kind::Error => {
            let (array, _, _) = block_parts(&def)?;
            let text = {
                let cells = vm.heap.array(array).cells.clone();
                cells
                    .iter()
                    .map(|c| vm.form(c))
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            let err = Error::script(sym::BAD_VALUE, text, Vec::new());
            Ok(context::make_error_context(vm, &err))
        }
        _ => Err(Error::script(
            sym::BAD_MAKE_ARG,
            "MAKE does not support this type",
            vec![type_arg.reified()],
        )
        .into()),
    }
}

fn native_get(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let source_sym = vm.intern("source");
    let source = call.arg(vm, source_sym);
    let any_sym = vm.intern("any");
    let allow_unset = call.has_refinement(vm, any_sym);
    let value = match source.kind() {
        Kind::Word | Kind::GetWord | Kind::SetWord => {
            let word = source.as_plain();
            match bind::resolve(vm, &word, Specifier::None, Mode::Read)? {
                Some(var) => bind::read_var(vm, var)?,
                None => return Err(Error::unbound_word(word).into()),
            }
        }
        Kind::Path | Kind::GetPath => {
            match path::eval_path(vm, &source.as_plain(), Specifier::None, PathIntent::GetNoGroups)? {
                PathProduct::Value(v) => v,
                PathProduct::Action { action, .. } => action,
            }
        }
        _ => {
            return Err(Error::script(
                sym::BAD_VALUE,
                "GET requires a word or path",
                vec![source.reified()],
            )
            .into())
        }
    };
    if value.is_none() && !allow_unset {
        return Err(Error::bad_word_get(source).into());
    }
    Ok(value)
}

fn native_set(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let target = call.arg(vm, sym::TARGET);
    let value = call.arg(vm, sym::VALUE);
    match target.kind() {
        Kind::Word | Kind::SetWord | Kind::GetWord => {
            bind::set_word_value(vm, &target.as_plain(), Specifier::None, value)?;
        }
        Kind::Path | Kind::SetPath => {
            path::set_path(vm, &target.as_plain(), Specifier::None, value)?;
        }
        _ => {
            return Err(Error::script(
                sym::BAD_VALUE,
                "SET requires a word or path",
                vec![target.reified()],
            )
            .into())
        }
    }
    Ok(value)
}

fn native_the(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    Ok(call.arg(vm, sym::VALUE))
}

fn native_type_of(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let value = call.arg(vm, sym::VALUE);
    if value.is_nulled() {
        return Ok(Cell::nulled());
    }
    Ok(Cell::datatype(value.kind()))
}

fn native_mold(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let value = call.arg(vm, sym::VALUE);
    let text = vm.mold(&value);
    let string = vm.heap.alloc_text(text, SeriesFlags::MANAGED);
    Ok(Cell::text(string))
}

/// PRINT forms its value (reducing blocks, space-separated) and appends a
/// newline to the interpreter's output buffer.
fn native_print(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let value = call.arg(vm, sym::VALUE);
    let text = if value.is(Kind::Block) {
        let (array, index, spec) = value.series().expect("block");
        let feed = crate::feed::Feed::from_array(array, index as usize, spec);
        let mut parts: Vec<String> = Vec::new();
        while let Some(step) = vm.eval_step(feed.clone(), crate::level::LevelFlags::empty())? {
            if step.is_nihil() {
                continue;
            }
            parts.push(vm.form(&step));
        }
        parts.join(" ")
    } else if value.is_nulled() {
        String::new()
    } else {
        vm.form(&value)
    };
    vm.output.push_str(&text);
    vm.output.push('\n');
    Ok(Cell::void())
}

fn native_probe(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let value = call.arg(vm, sym::VALUE);
    let text = vm.mold(&value);
    vm.output.push_str(&text);
    vm.output.push('\n');
    Ok(value)
}

/// COPY: series get fresh storage (optionally deep); actions get a fresh
/// identity with the same behavior (the pre-hijack snapshot idiom).
fn native_copy(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let value = call.arg(vm, sym::VALUE);
    let deep = call.has_refinement(vm, sym::DEEP);
    if value.kind() == Kind::Action {
        let (details, binding) = value.action_parts().expect("action");
        let record = vm.heap.details(details);
        let cells = record.cells.clone();
        let exemplar = record.exemplar;
        let dispatcher = record.dispatcher;
        let label = record.label;
        let defers = record.defers_lookback;
        let copy = vm.heap.alloc_details(cells, exemplar, dispatcher, label);
        vm.heap.details_mut(copy).cells[0] = Cell::action(copy, None);
        vm.heap.details_mut(copy).defers_lookback = defers;
        let mut result = Cell::action(copy, binding);
        if value.is_antiform() {
            result = result.antiformify();
        }
        return Ok(result);
    }
    if value.kind().is_array() {
        let (array, index, spec) = value.series().expect("array");
        let copied = if deep {
            copy_array_deep(vm, array)
        } else {
            let cells = vm.heap.array(array).cells.clone();
            vm.heap.alloc_array(cells, SeriesFlags::MANAGED)
        };
        return Ok(Cell::any_array_at(value.kind(), copied, index, spec));
    }
    if value.kind().is_string() {
        let (string, index) = value.string().expect("string");
        let data = vm.heap.string(string).data.clone();
        let copied = vm.heap.alloc_string(data, SeriesFlags::MANAGED);
        let mut cell = Cell::any_string(value.kind(), copied);
        cell.set_index(index);
        return Ok(cell);
    }
    if value.kind().is_context() {
        let ctx = value.context().expect("context");
        let record = vm.heap.context_accessible(ctx)?;
        let keylist = record.keylist;
        let vars = record.vars.clone();
        let kind = record.kind;
        let copied = vm.heap.alloc_context(kind, keylist, vars, SeriesFlags::MANAGED);
        vm.heap.context_mut(copied).vars[0] = Cell::any_context(value.kind(), copied);
        return Ok(Cell::any_context(value.kind(), copied));
    }
    Err(Error::script(
        sym::BAD_VALUE,
        "COPY does not support this type",
        vec![value.reified()],
    )
    .into())
}

/// APPEND: blocks splice block values (unless /only); strings append formed
/// text.  Returns the series at its head.
fn native_append(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let series = call.arg(vm, sym::SERIES);
    let value = call.arg(vm, sym::VALUE);
    let only = call.has_refinement(vm, sym::ONLY);
    let count = call
        .arg_opt(vm, sym::DUP)
        .and_then(|c| c.as_int())
        .unwrap_or(1)
        .max(0);

    if value.is_nulled() {
        return Ok(series); // appending null is a no-op
    }

    for _ in 0..count {
        if series.kind().is_array() {
            let (array, _, _) = series.series().expect("array");
            if value.is(Kind::Block) && !only {
                let (src, src_index, _) = value.series().expect("block");
                let items = vm.heap.array(src).cells[src_index as usize..].to_vec();
                let target = vm.heap.array_for_write(array)?;
                target.cells.extend(items);
            } else {
                let item = value.reified();
                let target = vm.heap.array_for_write(array)?;
                target.cells.push(item);
            }
        } else if series.kind().is_string() {
            let text = vm.form(&value);
            let (string, _) = series.string().expect("string");
            match &mut vm.heap.string_mut(string).data {
                StringData::Utf8(s) => s.push_str(&text),
                StringData::Bytes(b) => b.extend_from_slice(text.as_bytes()),
            }
        }
    }
    Ok(series)
}

fn native_length_of(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let series = call.arg(vm, sym::SERIES);
    let len = if series.kind().is_array() {
        let (array, index, _) = series.series().expect("array");
        vm.heap.array(array).cells.len().saturating_sub(index as usize)
    } else if series.kind().is_string() {
        let (string, index) = series.string().expect("string");
        match &vm.heap.string(string).data {
            StringData::Utf8(s) => s.chars().count().saturating_sub(index as usize),
            StringData::Bytes(b) => b.len().saturating_sub(index as usize),
        }
    } else if series.kind().is_context() {
        let ctx = series.context().expect("context");
        let record = vm.heap.context_accessible(ctx)?;
        if record.kind == ContextKind::Module {
            record.mvars.len()
        } else {
            record.vars.len() - 1
        }
    } else {
        0
    };
    Ok(Cell::integer(len as i64))
}

fn native_first(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let series = call.arg(vm, sym::SERIES);
    match path::pick_or_poke(vm, &series, &Cell::integer(1), None)? {
        Some(value) => Ok(value),
        None => Ok(Cell::nulled()),
    }
}

fn native_pick(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let location = call.arg(vm, sym::LOCATION);
    let picker = call.arg(vm, sym::PICKER);
    // Ports bounce the verb to their actor, keeping frame compatibility.
    if location.is(Kind::Port) {
        return crate::port::port_action(vm, &location, sym::PICK, &[picker]);
    }
    match path::pick_or_poke(vm, &location, &picker, None)? {
        Some(value) => Ok(value),
        None => Ok(Cell::nulled()),
    }
}

fn native_poke(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let location = call.arg(vm, sym::LOCATION);
    let picker = call.arg(vm, sym::PICKER);
    let value = call.arg(vm, sym::VALUE);
    if location.is(Kind::Port) {
        return crate::port::port_action(vm, &location, sym::POKE, &[picker, value]);
    }
    path::pick_or_poke(vm, &location, &picker, Some(&value))?;
    Ok(value)
}

fn native_reduce(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let block_sym = vm.intern("block");
    let block = call.arg(vm, block_sym);
    let (array, index, spec) = block_parts(&block)?;
    let feed = crate::feed::Feed::from_array(array, index as usize, spec);
    let mut values = Vec::new();
    while let Some(step) = vm.eval_step(feed.clone(), crate::level::LevelFlags::empty())? {
        if step.is_nihil() {
            continue;
        }
        values.push(step.reified());
    }
    let result = vm.heap.alloc_array(values, SeriesFlags::MANAGED);
    Ok(Cell::block(result, Specifier::None))
}
