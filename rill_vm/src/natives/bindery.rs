//! Binding natives: LET, USE, BIND, UNBIND, INTERN*.

use rill_core::{sym, Binding, Cell, Error, Kind, Specifier, UseFilter};

use crate::bind;
use crate::context;
use crate::interp::Vm;
use crate::level::Exec;
use crate::natives::{block_parts, copy_array_deep, Call, NativeEntry};
use crate::specifier;

/// Register the binding natives.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "let",
        "return: [<void> <opt> any-value!] 'vars [word! set-word! block! group!]",
        native_let,
    ));
    entries.push(NativeEntry::new(
        "use",
        "return: [<opt> any-value!] vars [block! word!] body [block!]",
        native_use,
    ));
    entries.push(NativeEntry::new(
        "bind",
        "value [block! any-word!] context [any-context! any-word!]",
        native_bind,
    ));
    entries.push(NativeEntry::new(
        "unbind",
        "value [block! any-word!] /deep",
        native_unbind,
    ));
    entries.push(NativeEntry::new(
        "intern*",
        "where [module!] data [block!]",
        native_intern,
    ));
}

/// LET dynamically adds a binding to the remainder of the evaluation
/// stream.
///
/// The plain form (`let x`) returns the newly-bound word.  The set form
/// (`let x: ...`) re-injects a rebound SET-WORD! ahead of the feed and runs
/// the assignment step itself, so the right-hand side evaluates under the
/// *old* bindings while the word lands in the new one; the assignment's
/// product is LET's result.  Either way, the feed's specifier is updated so
/// all future steps see the new variable, and the lookahead cache is
/// dropped since the rug moved.
fn native_let(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let mut vars = call.arg(vm, sym::VARS);

    // A group must evaluate to a word or block form.
    if vars.is(Kind::Group) {
        let product = vm.do_block_cell(&vars, Specifier::None)?;
        match product.plain_kind() {
            Some(Kind::Word) | Some(Kind::SetWord) | Some(Kind::Block) => vars = product,
            _ => {
                return Err(Error::script(
                    sym::BAD_VALUE,
                    "LET GROUP! must produce a word or block",
                    vec![product.reified()],
                )
                .into())
            }
        }
    }

    let old_chain = call.feed.borrow().specifier;

    match vars.kind() {
        Kind::Word | Kind::SetWord => {
            let name = vars.word_sym().expect("word");
            let patch = specifier::make_let_patch(vm, name, old_chain);
            let chain = Specifier::Patch(patch);
            let mut bound = Cell::any_word(vars.kind(), name);
            bound.set_word_binding(Binding::Patch(patch), 1);
            if vars.kind() == Kind::SetWord {
                // Re-inject the set-word hard-bound to the new variable and
                // run the assignment step ourselves: the right-hand side
                // evaluates under the *old* bindings, only the target uses
                // the new one.
                call.feed.borrow_mut().inject(bound);
                let product = vm
                    .eval_step(call.feed.clone(), crate::level::LevelFlags::empty())?
                    .unwrap_or_else(Cell::nihil);
                // The step may itself have extended the chain (nested LETs);
                // merge with this LET's binding taking priority.
                let now = call.feed.borrow().specifier;
                let merged = specifier::merge(vm, chain, now);
                {
                    let mut feed = call.feed.borrow_mut();
                    feed.specifier = merged;
                    feed.gotten = None; // bindings moved under the lookahead
                }
                Ok(product)
            } else {
                {
                    let mut feed = call.feed.borrow_mut();
                    feed.specifier = chain;
                    feed.gotten = None;
                }
                Ok(bound)
            }
        }
        Kind::Block => {
            // Quoted words pass through with their existing bindings; plain
            // words get fresh let-patches.
            let (array, index, _) = block_parts(&vars)?;
            let items = vm.heap.array(array).cells[index as usize..].to_vec();
            let mut chain = old_chain;
            let mut rebound: Vec<Cell> = Vec::with_capacity(items.len());
            for item in &items {
                if item.is_quoted() && item.kind().is_word() {
                    rebound.push(item.unquotify(1));
                    continue;
                }
                match item.plain_kind() {
                    Some(Kind::Word) | Some(Kind::SetWord) => {
                        let name = item.word_sym().expect("word");
                        let patch = specifier::make_let_patch(vm, name, chain);
                        chain = Specifier::Patch(patch);
                        let mut bound = *item;
                        bound.set_word_binding(Binding::Patch(patch), 1);
                        rebound.push(bound);
                    }
                    Some(Kind::Blank) | Some(Kind::Issue) => rebound.push(*item),
                    _ => {
                        return Err(Error::script(
                            sym::BAD_VALUE,
                            "LET block may hold words, quoted words, and blanks",
                            vec![item.reified()],
                        )
                        .into())
                    }
                }
            }
            {
                let mut feed = call.feed.borrow_mut();
                feed.specifier = chain;
                feed.gotten = None;
            }
            let out = vm
                .heap
                .alloc_array(rebound, rill_gc::SeriesFlags::MANAGED);
            Ok(Cell::block(out, chain))
        }
        _ => Err(Error::script(
            sym::BAD_VALUE,
            "LET requires a word, set-word, or block",
            vec![vars.reified()],
        )
        .into()),
    }
}

/// USE gives a body its own variables through a use-patch over a fresh
/// context, leaving the surrounding bindings untouched.
fn native_use(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let vars = call.arg(vm, sym::VARS);
    let body = call.arg(vm, sym::BODY);

    let mut names = Vec::new();
    if vars.is(Kind::Word) {
        names.push(vars.word_sym().expect("word"));
    } else {
        let (array, index, _) = block_parts(&vars)?;
        for item in &vm.heap.array(array).cells[index as usize..] {
            match item.word_sym().filter(|_| item.is(Kind::Word)) {
                Some(name) => names.push(name),
                None => {
                    return Err(Error::script(
                        sym::BAD_VALUE,
                        "USE vars must be words",
                        vec![item.reified()],
                    )
                    .into())
                }
            }
        }
    }

    let ctx = context::make_context(vm, rill_gc::ContextKind::Object, names);
    let (array, index, own) = block_parts(&body)?;
    let chain = specifier::make_use_patch(vm, ctx, UseFilter::AllWords, own);
    vm.do_array(array, index as usize, chain)
}

/// BIND a block (deeply) or a single word to a context.
fn native_bind(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let value = call.arg(vm, sym::VALUE);
    let ctx_sym = vm.intern("context");
    let target = call.arg(vm, ctx_sym);

    // A word target means "the context that word is bound into".
    let ctx = if target.kind().is_word() {
        match target.word_binding() {
            Some(Binding::Context(ctx)) => ctx,
            Some(Binding::Patch(patch)) => {
                match &vm.heap.patch(vm.heap.patch_target(patch)).kind {
                    rill_gc::PatchKind::ModuleVar { module, .. } => *module,
                    _ => {
                        return Err(Error::script(
                            sym::NOT_BOUND,
                            "word is not bound to a context",
                            vec![target.reified()],
                        )
                        .into())
                    }
                }
            }
            _ => {
                return Err(Error::script(
                    sym::NOT_BOUND,
                    "word is not bound to a context",
                    vec![target.reified()],
                )
                .into())
            }
        }
    } else {
        target.context().ok_or_else(|| {
            Error::script(
                sym::BAD_VALUE,
                "BIND requires a context",
                vec![target.reified()],
            )
        })?
    };

    if value.kind().is_word() {
        let mut word = value;
        match context::find_key(vm, ctx, word.word_sym().expect("word")) {
            Some(index) => {
                word.set_word_binding(Binding::Context(ctx), index);
                Ok(word)
            }
            None => Ok(value), // not in context: unchanged
        }
    } else {
        let (array, _, _) = block_parts(&value)?;
        bind::bind_values_deep(vm, array, ctx, |k| k.is_word(), false)?;
        Ok(value)
    }
}

fn native_unbind(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let value = call.arg(vm, sym::VALUE);
    if value.kind().is_word() {
        let mut word = value;
        word.set_word_binding(Binding::Unbound, 0);
        return Ok(word);
    }
    let (array, _, _) = block_parts(&value)?;
    bind::unbind_values_deep(vm, array, None);
    Ok(value)
}

/// INTERN*: overwrite all bindings of a block deeply with attachment to a
/// module (the boot loader's binding pass).
fn native_intern(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let where_sym = vm.intern("where");
    let module = call.arg(vm, where_sym);
    let data = call.arg(vm, sym::DATA);
    let ctx = module.context().ok_or_else(|| {
        Error::script(sym::BAD_VALUE, "INTERN* requires a module", vec![module.reified()])
    })?;
    let (array, _, _) = block_parts(&data)?;
    bind::bind_nonspecifically(vm, array, ctx);
    Ok(data)
}

/// FOR-EACH style loop-context construction, shared with USE-adjacent
/// natives: words make fresh slots, quoted words reuse existing bindings.
pub fn loop_context(
    vm: &mut Vm,
    spec: &Cell,
    spec_specifier: Specifier,
) -> Exec<(rill_core::ContextId, Vec<LoopVar>)> {
    let mut items: Vec<Cell> = Vec::new();
    if spec.is_quoted() || spec.kind().is_word() {
        items.push(*spec);
    } else if spec.is(Kind::Block) {
        let (array, index, _) = block_parts(spec)?;
        items.extend(vm.heap.array(array).cells[index as usize..].iter().copied());
    } else {
        return Err(Error::script(
            sym::BAD_VALUE,
            "loop variable spec must be a word or block",
            vec![spec.reified()],
        )
        .into());
    }
    if items.is_empty() {
        return Err(Error::script(
            sym::BAD_VALUE,
            "loop variable spec is empty",
            Vec::new(),
        )
        .into());
    }

    let mut keys = Vec::new();
    let mut vars = Vec::new();
    for item in &items {
        if item.is_quoted() && item.kind().is_word() {
            // Reuse the existing binding: writes go through it, and the
            // variable outlives the loop in place.
            let word = item.unquotify(1);
            let var = bind::resolve(vm, &word, spec_specifier, bind::Mode::Write)?
                .ok_or_else(|| Error::unbound_word(word))?;
            vars.push(LoopVar::Existing(var));
            continue;
        }
        match item.plain_kind() {
            Some(Kind::Word) => {
                let name = item.word_sym().expect("word");
                if keys.contains(&name) {
                    return Err(Error::script(
                        sym::DUP_VARS,
                        "duplicate loop variable: {1}",
                        vec![Cell::word(name)],
                    )
                    .into());
                }
                keys.push(name);
                vars.push(LoopVar::Fresh(keys.len() as u32));
            }
            Some(Kind::Blank) => vars.push(LoopVar::Skip),
            _ => {
                return Err(Error::script(
                    sym::BAD_VALUE,
                    "loop variables must be words, quoted words, or blanks",
                    vec![item.reified()],
                )
                .into())
            }
        }
    }

    let ctx = context::make_context(vm, rill_gc::ContextKind::Object, keys);
    // Loop constructs hand out slot references across user code; the frame
    // must not expand under them.
    vm.heap.context_mut(ctx).flags |= rill_gc::SeriesFlags::FIXED_SIZE;
    Ok((ctx, vars))
}

/// One loop variable's write destination.
pub enum LoopVar {
    /// Fresh slot in the loop context (1-based index).
    Fresh(u32),
    /// Existing variable named by a quoted word.
    Existing(rill_core::VarRef),
    /// Blank in the spec: value discarded.
    Skip,
}

/// Copy a loop body and bind it to the loop context (fresh variables only;
/// existing bindings already point where they should).
pub fn bind_loop_body(vm: &mut Vm, body: &Cell, ctx: rill_core::ContextId) -> Exec<Cell> {
    let (array, index, spec) = block_parts(body)?;
    let copied = copy_array_deep(vm, array);
    bind::bind_values_deep(vm, copied, ctx, |k| k.is_word(), false)?;
    Ok(Cell::any_array_at(Kind::Block, copied, index, spec))
}
