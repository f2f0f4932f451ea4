//! The action executor: frame fulfillment and dispatch.
//!
//! Invoking an action builds a frame from the action's exemplar (specialized
//! slots come pre-filled, unspecialized slots hold PARAMETER! descriptors),
//! gathers arguments left-to-right from the caller's feed per parameter
//! class, type-checks each, and then runs the phase's dispatcher.  The
//! dispatcher selection is a tag, and composition layers (specialize, adapt,
//! chain, enclose, hijack shims) switch the frame's phase and loop, so one
//! level services the whole composition stack.
//!
//! Definitional RETURN is caught here: the frame archetype is the throw
//! label, and the trampoline redirects a matching throw into this level's
//! ReturnCheck state.

use smallvec::SmallVec;

use rill_core::{
    ArrayId, Cell, CellFlags, ContextId, DetailsId, Error, Kind, ParamClass, ParamFlags,
    Specifier, SymId,
};
use rill_gc::{ContextKind, Dispatcher, NodeId, SeriesFlags};

use crate::bind;
use crate::context;
use crate::eval::EvalState;
use crate::feed::Feed;
use crate::interp::Vm;
use crate::level::{Bounce, Exec, Level, LevelFlags};
use crate::natives::Call;
use crate::specifier;
use crate::typecheck;

/// Mode byte of the action executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionMode {
    /// Build the frame; apply refinement requests and the enfix first arg.
    Begin,
    /// Walk parameters, gathering arguments.
    Fulfill,
    /// An evaluated argument is staged for the current parameter.
    ArgTake,
    /// All arguments ready; run the phase's dispatcher.
    Dispatch,
    /// A body block's product is staged (interpreted functions).
    BodyOut {
        /// Lambda semantics: stale becomes void, no RETURN check.
        lambda: bool,
    },
    /// An ADAPT prelude finished; fall through to the underlying phase.
    PreludeDone,
    /// A CHAIN pipeline stage finished; feed the next stage.
    ChainNext,
    /// An ENCLOSE outer function finished; its product is the result.
    EncloseDone,
    /// Check the candidate result against the RETURN parameter.
    ReturnCheck,
    /// Deliver the next staged result as this level's own.
    PassThrough,
}

/// State of an action level.
pub struct ActionState {
    /// Current mode.
    pub mode: ActionMode,
    /// Currently-dispatching phase.
    pub details: DetailsId,
    /// The identity that was invoked (labels, chain bookkeeping).
    pub original: DetailsId,
    /// Binding override from the action cell.
    pub binding: Option<ContextId>,
    /// 1-based frame slot currently being fulfilled.
    pub param_index: usize,
    /// First argument rolled in from the previous expression (enfix).
    pub enfix_first: Option<Cell>,
    /// Refinements requested by path dispatch, in source order.
    pub refinements: SmallVec<[SymId; 4]>,
    /// CHAIN pipeline and the index of the next stage to run.
    pub chain: Option<(ArrayId, usize)>,
}

impl ActionState {
    /// State for invoking an action value.
    pub fn invoke(
        action: &Cell,
        enfix_first: Option<Cell>,
        refinements: SmallVec<[SymId; 4]>,
    ) -> ActionState {
        let (details, binding) = action
            .action_parts()
            .unwrap_or_else(|| panic!("invoke of non-action cell: {action:?}"));
        ActionState {
            mode: ActionMode::Begin,
            details,
            original: details,
            binding,
            param_index: 1,
            enfix_first,
            refinements,
            chain: None,
        }
    }

    /// GC roots held in executor state.
    pub fn gather_roots(&self, cells: &mut Vec<Cell>, nodes: &mut Vec<NodeId>) {
        nodes.push(NodeId::Details(self.details));
        nodes.push(NodeId::Details(self.original));
        if let Some(ctx) = self.binding {
            nodes.push(NodeId::Context(ctx));
        }
        if let Some(first) = self.enfix_first {
            cells.push(first);
        }
        if let Some((array, _)) = self.chain {
            nodes.push(NodeId::Array(array));
        }
    }
}

/// Drive an action level until it completes or suspends.
pub fn execute(vm: &mut Vm, level: &mut Level, state: &mut ActionState) -> Exec<Bounce> {
    loop {
        match state.mode {
            ActionMode::Begin => begin(vm, level, state)?,
            ActionMode::Fulfill => match fulfill(vm, level, state)? {
                Some(bounce) => return Ok(bounce),
                None => {}
            },
            ActionMode::ArgTake => {
                let staged = level.staged;
                level.staged = Cell::fresh();
                take_arg(vm, level, state, staged)?;
            }
            ActionMode::Dispatch => match dispatch(vm, level, state)? {
                Some(bounce) => return Ok(bounce),
                None => {}
            },
            ActionMode::BodyOut { lambda } => {
                let staged = level.staged;
                level.staged = Cell::fresh();
                let vanished = staged.is_stale() || staged.is_nihil();
                level.out = if vanished { Cell::void() } else { staged };
                if lambda {
                    return Ok(Bounce::Done);
                }
                state.mode = ActionMode::ReturnCheck;
            }
            ActionMode::PreludeDone => {
                // Prelude result is discarded; the frame may have been
                // mutated, which is the point of ADAPT.
                level.staged = Cell::fresh();
                let underlying = vm.heap.details(state.details).cells[2];
                switch_phase(vm, level, state, &underlying);
                state.mode = ActionMode::Dispatch;
            }
            ActionMode::ChainNext => {
                let staged = level.staged;
                level.staged = Cell::fresh();
                level.out = staged;
                match next_chain_stage(vm, level, state)? {
                    Some(bounce) => return Ok(bounce),
                    None => return Ok(Bounce::Done),
                }
            }
            ActionMode::EncloseDone => {
                level.out = level.staged;
                level.staged = Cell::fresh();
                return Ok(Bounce::Done);
            }
            ActionMode::ReturnCheck => {
                return_check(vm, level, state)?;
                match next_chain_stage(vm, level, state)? {
                    Some(bounce) => return Ok(bounce),
                    None => return Ok(Bounce::Done),
                }
            }
            ActionMode::PassThrough => {
                level.out = level.staged;
                level.staged = Cell::fresh();
                return Ok(Bounce::Done);
            }
        }
    }
}

// =============================================================================
// Frame construction
// =============================================================================

fn begin(vm: &mut Vm, level: &mut Level, state: &mut ActionState) -> Exec<()> {
    let exemplar = vm.heap.details(state.details).exemplar;
    let keylist = vm.heap.context(exemplar).keylist;
    let vars = vm.heap.context(exemplar).vars.clone();

    let frame = vm
        .heap
        .alloc_context(ContextKind::Frame, keylist, vars.clone(), SeriesFlags::MANAGED);
    {
        let record = vm.heap.context_mut(frame);
        record.vars[0] = Cell::any_context(Kind::Frame, frame);
        record.phase = Some(state.details);
        record.frame_binding = state.binding;
    }

    // Splice the definitional RETURN and remember the catch frame.
    let keys = vm.heap.keylist(keylist).keys.clone();
    let mut has_return = false;
    for (i, _key) in keys.iter().enumerate() {
        if let Some((ParamClass::Return, _, _)) = vars[i + 1].param_parts() {
            has_return = true;
            if let Some(return_details) = vm.return_details {
                vm.heap.context_mut(frame).vars[i + 1] =
                    Cell::activation(return_details, Some(frame));
            }
        }
    }
    if has_return {
        level.catch_frame = Some(frame);
    }
    level.varlist = Some(frame);
    level.label = level.label.or(vm.heap.details(state.original).label);

    // Refinement requests from path dispatch.
    let requested = std::mem::take(&mut state.refinements);
    for sym in &requested {
        let Some(index) = context::find_key(vm, frame, *sym) else {
            return Err(Error::script(
                rill_core::sym::BAD_REFINE,
                "action has no refinement named {1}",
                vec![Cell::word(*sym)],
            )
            .into());
        };
        let slot = vm.heap.context(frame).vars[index as usize];
        match slot.param_parts() {
            Some((_, flags, _)) if flags.contains(ParamFlags::REFINEMENT) => {}
            _ => {
                return Err(Error::script(
                    rill_core::sym::BAD_REFINE,
                    "{1} is not a refinement of this action",
                    vec![Cell::word(*sym)],
                )
                .into())
            }
        }
    }
    state.refinements = requested;

    state.param_index = 1;
    state.mode = ActionMode::Fulfill;
    Ok(())
}

// =============================================================================
// Argument fulfillment
// =============================================================================

/// Walk parameter slots; push an evaluation sublevel when a class needs one.
fn fulfill(vm: &mut Vm, level: &mut Level, state: &mut ActionState) -> Exec<Option<Bounce>> {
    let frame = level.varlist.expect("frame built");
    loop {
        let len = vm.heap.context(frame).vars.len();
        if state.param_index >= len {
            state.mode = ActionMode::Dispatch;
            return Ok(None);
        }
        let index = state.param_index;
        let slot = vm.heap.context(frame).vars[index];
        let Some((class, flags, spec)) = slot.param_parts() else {
            state.param_index += 1; // specialized (or RETURN) slot
            continue;
        };
        if class == ParamClass::Return {
            state.param_index += 1;
            continue;
        }
        let keylist = vm.heap.context(frame).keylist;
        let key = vm.heap.keylist(keylist).keys[index - 1];

        if flags.contains(ParamFlags::REFINEMENT) {
            if state.refinements.contains(&key) {
                if spec.is_none() {
                    // Argless refinement: mark as used.
                    set_frame_var(vm, frame, index, Cell::logic(true));
                    state.param_index += 1;
                    continue;
                }
                // Falls through to gather this refinement's argument.
            } else {
                set_frame_var(vm, frame, index, Cell::nulled());
                state.param_index += 1;
                continue;
            }
        }

        // Enfix: the first real argument is the previous expression's
        // product, already in hand.
        if let Some(first) = state.enfix_first.take() {
            let mut arg = first;
            if class == ParamClass::Meta {
                arg = arg.meta();
            }
            if class == ParamClass::Hard || class == ParamClass::Soft {
                arg.flags.insert(CellFlags::UNEVALUATED);
            }
            check_and_store(vm, level, state, frame, index, key, arg)?;
            continue;
        }

        let at_end = level.feed.borrow().at_end(&vm.heap);
        if at_end {
            if flags.contains(ParamFlags::ENDABLE) {
                set_frame_var(vm, frame, index, Cell::nulled());
                state.param_index += 1;
                continue;
            }
            return Err(Error::missing_arg(key).into());
        }

        match class {
            ParamClass::Normal | ParamClass::Meta => {
                let sub = Level::eval(
                    level.feed.clone(),
                    EvalState::step(),
                    LevelFlags::FULFILLING_ARG | LevelFlags::MAYBE_STALE,
                );
                state.mode = ActionMode::ArgTake;
                return Ok(Some(Bounce::Continue(Box::new(sub))));
            }
            ParamClass::Hard => {
                let arg = take_literal(vm, level)?;
                check_and_store(vm, level, state, frame, index, key, arg)?;
            }
            ParamClass::Soft => {
                let peeked = level.feed.borrow().peek(&vm.heap).expect("not at end");
                if peeked.is(Kind::Group) {
                    let sub = Level::eval(
                        level.feed.clone(),
                        EvalState::step(),
                        LevelFlags::FULFILLING_ARG | LevelFlags::MAYBE_STALE,
                    );
                    state.mode = ActionMode::ArgTake;
                    return Ok(Some(Bounce::Continue(Box::new(sub))));
                }
                let arg = if peeked.is(Kind::GetWord) {
                    level.feed.borrow_mut().next(&vm.heap);
                    let feed_spec = level.feed.borrow().specifier;
                    let mut fetched = bind::get_word_value(vm, &peeked, feed_spec)?;
                    if fetched.is_activation() {
                        fetched = fetched.as_plain();
                    }
                    fetched
                } else {
                    take_literal(vm, level)?
                };
                check_and_store(vm, level, state, frame, index, key, arg)?;
            }
            ParamClass::Return => unreachable!("return skipped above"),
        }
    }
}

/// Take the next feed value literally (hard quoting), preserving bindings
/// and deriving array specifiers.
fn take_literal(vm: &mut Vm, level: &mut Level) -> Exec<Cell> {
    let (cell, feed_spec) = {
        let mut feed = level.feed.borrow_mut();
        let spec = feed.specifier;
        (feed.next(&vm.heap).expect("literal arg present"), spec)
    };
    let mut arg = cell;
    if arg.kind().is_array() && !arg.is_quoted() {
        let (_, _, own) = arg.series().expect("array");
        let derived = specifier::derive(vm, own, feed_spec);
        arg.set_specifier(derived);
    }
    arg.flags.insert(CellFlags::UNEVALUATED);
    Ok(arg)
}

/// An evaluated argument arrived for the pending parameter.
fn take_arg(vm: &mut Vm, level: &mut Level, state: &mut ActionState, staged: Cell) -> Exec<()> {
    let frame = level.varlist.expect("frame built");
    let index = state.param_index;
    let slot = vm.heap.context(frame).vars[index];
    let (class, flags, _) = slot.param_parts().expect("parameter slot");
    let keylist = vm.heap.context(frame).keylist;
    let key = vm.heap.keylist(keylist).keys[index - 1];

    let mut arg = staged;
    if arg.is_nihil() || arg.is_stale() {
        if flags.contains(ParamFlags::ENDABLE) {
            arg = Cell::nulled();
        } else {
            return Err(Error::missing_arg(key).into());
        }
    } else if class == ParamClass::Meta {
        arg = arg.meta();
    }
    check_and_store(vm, level, state, frame, index, key, arg)?;
    state.mode = ActionMode::Fulfill;
    Ok(())
}

fn check_and_store(
    vm: &mut Vm,
    level: &Level,
    state: &mut ActionState,
    frame: ContextId,
    index: usize,
    key: SymId,
    mut arg: Cell,
) -> Exec<()> {
    let param = vm.heap.context(frame).vars[index];
    if !typecheck::typecheck_coerce(vm, &param, &mut arg)? {
        let label = level.label.or(vm.heap.details(state.original).label);
        let action_name = label
            .map(|s| vm.symbols.spelling(s).to_string())
            .unwrap_or_else(|| "(anonymous)".to_string());
        let param_name = vm.symbols.spelling(key).to_string();
        return Err(Error::script(
            rill_core::sym::EXPECT_ARG,
            format!("{action_name} does not allow this argument type for {param_name}: {{1}}"),
            vec![arg.reified()],
        )
        .into());
    }
    set_frame_var(vm, frame, index, arg);
    state.param_index += 1;
    Ok(())
}

fn set_frame_var(vm: &mut Vm, frame: ContextId, index: usize, value: Cell) {
    vm.heap.context_mut(frame).vars[index] = value;
}

// =============================================================================
// Dispatch
// =============================================================================

/// Switch the frame to a new phase (underlying action of a composition).
fn switch_phase(vm: &mut Vm, level: &mut Level, state: &mut ActionState, action: &Cell) {
    let (details, binding) = action
        .action_parts()
        .unwrap_or_else(|| panic!("composition slot holds non-action: {action:?}"));
    state.details = details;
    if binding.is_some() {
        state.binding = binding;
    }
    if let Some(frame) = level.varlist {
        vm.heap.context_mut(frame).phase = Some(details);
    }
}

fn dispatch(vm: &mut Vm, level: &mut Level, state: &mut ActionState) -> Exec<Option<Bounce>> {
    let frame = level.varlist.expect("frame built");
    loop {
        let dispatcher = vm.heap.details(state.details).dispatcher;
        match dispatcher {
            Dispatcher::Native(index) => {
                let func = vm.natives[index as usize].func;
                let call = Call {
                    frame,
                    feed: level.feed.clone(),
                    binding: state.binding,
                };
                let result = func(vm, &call)?;
                level.out = result;
                state.mode = ActionMode::ReturnCheck;
                return Ok(None);
            }
            Dispatcher::Intrinsic(index) => {
                // Frameless fast path exists for typechecks; a full frame was
                // built here, so pull the single argument from it.
                let intrinsic = vm.natives[index as usize]
                    .intrinsic
                    .expect("intrinsic dispatcher without intrinsic function");
                let arg = first_unspecialized_arg(vm, frame).ok_or_else(|| {
                    Error::script(
                        rill_core::sym::NO_ARG_TYPECHECK,
                        "intrinsic requires an argument",
                        Vec::new(),
                    )
                })?;
                let result = intrinsic(vm, state.details, &arg)?;
                level.out = result;
                state.mode = ActionMode::ReturnCheck;
                return Ok(None);
            }
            Dispatcher::Func => {
                let body = vm.heap.details(state.details).cells[1];
                let (array, index, _) = body.series().expect("func body is a block");
                let feed = Feed::from_array(array, index as usize, Specifier::Frame(frame));
                let sub = Level::eval(feed, EvalState::to_end(), LevelFlags::MAYBE_STALE);
                state.mode = ActionMode::BodyOut { lambda: false };
                return Ok(Some(Bounce::Continue(Box::new(sub))));
            }
            Dispatcher::Lambda => {
                let body = vm.heap.details(state.details).cells[1];
                let (array, index, own) = body.series().expect("lambda body is a block");
                let chain = specifier::make_use_patch(
                    vm,
                    frame,
                    rill_core::UseFilter::AllWords,
                    own,
                );
                let feed = Feed::from_array(array, index as usize, chain);
                let sub = Level::eval(feed, EvalState::to_end(), LevelFlags::MAYBE_STALE);
                state.mode = ActionMode::BodyOut { lambda: true };
                return Ok(Some(Bounce::Continue(Box::new(sub))));
            }
            Dispatcher::Specializer => {
                let underlying = vm.heap.details(state.details).cells[1];
                switch_phase(vm, level, state, &underlying);
            }
            Dispatcher::Adapter => {
                let prelude = vm.heap.details(state.details).cells[1];
                let (array, index, _) = prelude.series().expect("adapt prelude is a block");
                let feed = Feed::from_array(array, index as usize, Specifier::Frame(frame));
                let sub = Level::eval(feed, EvalState::to_end(), LevelFlags::MAYBE_STALE);
                state.mode = ActionMode::PreludeDone;
                return Ok(Some(Bounce::Continue(Box::new(sub))));
            }
            Dispatcher::Chainer => {
                let pipeline = vm.heap.details(state.details).cells[1];
                let (array, _, _) = pipeline.series().expect("chain pipeline is a block");
                state.chain = Some((array, 1));
                let first = vm.heap.array(array).cells[0];
                switch_phase(vm, level, state, &first);
            }
            Dispatcher::Encloser => {
                let inner = vm.heap.details(state.details).cells[1];
                let outer = vm.heap.details(state.details).cells[2];
                switch_phase(vm, level, state, &inner); // frame belongs to inner
                let frame_cell = vm.heap.context(frame).vars[0];
                let feed = Feed::from_cells(vec![frame_cell.meta()], Specifier::None);
                let sub_state = ActionState::invoke(&outer, None, SmallVec::new());
                let sub = Level::action(feed, sub_state, LevelFlags::empty());
                state.mode = ActionMode::EncloseDone;
                return Ok(Some(Bounce::Continue(Box::new(sub))));
            }
            Dispatcher::HijackShim => {
                let hijacker = vm.heap.details(state.details).cells[0];
                let (hijacker_details, _) =
                    hijacker.action_parts().expect("hijack archetype is an action");
                let compat = {
                    let frame_keylist = vm.heap.context(frame).keylist;
                    let exemplar = vm.heap.details(hijacker_details).exemplar;
                    let hijacker_keylist = vm.heap.context(exemplar).keylist;
                    context::keylist_descends_from(vm, frame_keylist, hijacker_keylist)
                };
                if compat {
                    switch_phase(vm, level, state, &hijacker);
                    continue;
                }
                let bounce = push_redo_frame(vm, level, state, &hijacker)?;
                return Ok(Some(bounce));
            }
        }
    }
}

/// Run a reified frame: dispatch its phase over its current variables.
/// Unfilled parameter slots read as null to the body.
pub fn do_frame(vm: &mut Vm, ctx: ContextId) -> Exec<Cell> {
    let record = vm.heap.context_accessible(ctx)?;
    let phase = record.phase.ok_or_else(|| {
        Error::script(
            rill_core::sym::BAD_VALUE,
            "frame has no phase to run",
            Vec::new(),
        )
    })?;
    let binding = record.frame_binding;
    let len = record.vars.len();
    for i in 1..len {
        let slot = vm.heap.context(ctx).vars[i];
        if let Some((class, _, _)) = slot.param_parts() {
            if class == ParamClass::Return {
                if let Some(return_details) = vm.return_details {
                    vm.heap.context_mut(ctx).vars[i] =
                        Cell::activation(return_details, Some(ctx));
                }
            } else {
                vm.heap.context_mut(ctx).vars[i] = Cell::nulled();
            }
        }
    }
    let state = ActionState {
        mode: ActionMode::Dispatch,
        details: phase,
        original: phase,
        binding,
        param_index: 1,
        enfix_first: None,
        refinements: SmallVec::new(),
        chain: None,
    };
    let mut level = Level::action(Feed::empty(), state, LevelFlags::empty());
    level.varlist = Some(ctx);
    level.catch_frame = Some(ctx);
    vm.run_to_completion(level)
}

/// First frame slot whose exemplar position is an unspecialized non-return
/// parameter (the argument an intrinsic consumes).
pub fn first_unspecialized_arg(vm: &Vm, frame: ContextId) -> Option<Cell> {
    let record = vm.heap.context(frame);
    let Some(phase) = record.phase else { return None };
    let exemplar = vm.heap.details(phase).exemplar;
    let len = record.vars.len();
    for i in 1..len {
        if let Some((class, _, _)) = vm.heap.context(exemplar).vars[i].param_parts() {
            if class != ParamClass::Return {
                return Some(record.vars[i]);
            }
        }
    }
    None
}

/// Remap a frame built for one action onto another by parameter name
/// (incompatible hijack).  Arguments are passed pre-evaluated via meta
/// quoting; used refinements are requested by name.
fn push_redo_frame(
    vm: &mut Vm,
    level: &mut Level,
    state: &mut ActionState,
    target: &Cell,
) -> Exec<Bounce> {
    let frame = level.varlist.expect("frame built");
    let exemplar = vm.heap.details(state.details).exemplar;
    let keylist = vm.heap.context(frame).keylist;
    let keys = vm.heap.keylist(keylist).keys.clone();

    let mut args: Vec<Cell> = Vec::new();
    let mut refinements: SmallVec<[SymId; 4]> = SmallVec::new();
    for (i, key) in keys.iter().enumerate() {
        let param = vm.heap.context(exemplar).vars[i + 1];
        let Some((class, flags, spec)) = param.param_parts() else {
            continue; // specialized in the exemplar: not caller-supplied
        };
        if class == ParamClass::Return {
            continue;
        }
        let var = vm.heap.context(frame).vars[i + 1];
        if flags.contains(ParamFlags::REFINEMENT) {
            if var.is_nulled() {
                continue;
            }
            refinements.push(*key);
            if spec.is_none() {
                continue; // argless refinement carries no value
            }
        }
        args.push(var.meta());
    }

    let feed = Feed::from_cells(args, Specifier::None);
    let sub_state = ActionState::invoke(target, None, refinements);
    let sub = Level::action(feed, sub_state, LevelFlags::empty());
    state.mode = ActionMode::PassThrough;
    Ok(Bounce::Continue(Box::new(sub)))
}

/// Start the next CHAIN stage, if a pipeline is active.
fn next_chain_stage(
    vm: &mut Vm,
    level: &mut Level,
    state: &mut ActionState,
) -> Exec<Option<Bounce>> {
    let Some((pipeline, next)) = state.chain else {
        return Ok(None);
    };
    let len = vm.heap.array(pipeline).cells.len();
    if next >= len {
        state.chain = None;
        return Ok(None);
    }
    state.chain = Some((pipeline, next + 1));
    let stage = vm.heap.array(pipeline).cells[next];
    let stage = if stage.is_quasi() { stage.antiformify() } else { stage };
    let arg = level.out;
    level.out = Cell::fresh();
    let feed = Feed::from_cells(vec![arg.meta()], Specifier::None);
    let sub_state = ActionState::invoke(&stage, None, SmallVec::new());
    let sub = Level::action(feed, sub_state, LevelFlags::empty());
    state.mode = ActionMode::ChainNext;
    Ok(Some(Bounce::Continue(Box::new(sub))))
}

/// Check the candidate result against the RETURN parameter's tests.
fn return_check(vm: &mut Vm, level: &mut Level, state: &mut ActionState) -> Exec<()> {
    let exemplar = vm.heap.details(state.original).exemplar;
    let keylist = vm.heap.context(exemplar).keylist;
    let keys = vm.heap.keylist(keylist).keys.clone();
    for (i, key) in keys.iter().enumerate() {
        if *key != rill_core::sym::RETURN {
            continue;
        }
        let param = vm.heap.context(exemplar).vars[i + 1];
        let Some((class, flags, spec)) = param.param_parts() else {
            continue;
        };
        if class != ParamClass::Return {
            continue;
        }
        if level.out.is_stale() || level.out.is_nihil() {
            if flags.contains(ParamFlags::VANISHABLE) {
                return Ok(()); // vanishing return permitted
            }
            level.out = Cell::void();
        }
        if spec.is_some() {
            let mut candidate = level.out;
            if !typecheck::typecheck_coerce(vm, &param, &mut candidate)? {
                return Err(Error::script(
                    rill_core::sym::BAD_RETURN_TYPE,
                    "return value does not match the action's return spec",
                    vec![candidate.reified()],
                )
                .into());
            }
            level.out = candidate;
        }
        return Ok(());
    }
    Ok(())
}

// =============================================================================
// Action construction
// =============================================================================

/// Build a paramlist exemplar from a spec block's cells.
///
/// The dialect: plain words are normal parameters; `'word` hard-quotes;
/// `:word` soft-quotes; `^word` takes the argument meta; `/word` declares a
/// refinement; `return:` declares the return spec; a block after any of
/// these is the type-test spec; strings are descriptions and are skipped.
pub fn make_paramlist(
    vm: &mut Vm,
    spec_cells: &[Cell],
    add_return: bool,
) -> Exec<ContextId> {
    let mut keys: Vec<SymId> = Vec::new();
    let mut params: Vec<Cell> = Vec::new();

    let mut has_return = false;
    let mut i = 0;
    while i < spec_cells.len() {
        let cell = spec_cells[i];
        i += 1;

        if cell.is(Kind::Text) {
            continue; // description
        }

        let (key, class, mut flags) = if cell.is_quoted() && cell.kind() == Kind::Word {
            (cell.word_sym().expect("word"), ParamClass::Hard, ParamFlags::empty())
        } else if cell.is(Kind::Word) {
            (cell.word_sym().expect("word"), ParamClass::Normal, ParamFlags::empty())
        } else if cell.is(Kind::GetWord) {
            (cell.word_sym().expect("word"), ParamClass::Soft, ParamFlags::empty())
        } else if cell.is(Kind::MetaWord) {
            (cell.word_sym().expect("word"), ParamClass::Meta, ParamFlags::empty())
        } else if cell.is(Kind::SetWord) && cell.word_sym() == Some(rill_core::sym::RETURN) {
            (rill_core::sym::RETURN, ParamClass::Return, ParamFlags::empty())
        } else if cell.is(Kind::Path) {
            // `/name` scans as a blank-headed path.
            let (array, _, _) = cell.series().expect("path");
            let elements = vm.heap.array(array).cells.clone();
            match elements.as_slice() {
                [head, word] if head.is(Kind::Blank) && word.is(Kind::Word) => (
                    word.word_sym().expect("word"),
                    ParamClass::Normal,
                    ParamFlags::REFINEMENT,
                ),
                _ => {
                    return Err(Error::script(
                        rill_core::sym::BAD_VALUE,
                        "unrecognized item in parameter spec: {1}",
                        vec![cell.reified()],
                    )
                    .into())
                }
            }
        } else {
            return Err(Error::script(
                rill_core::sym::BAD_VALUE,
                "unrecognized item in parameter spec: {1}",
                vec![cell.reified()],
            )
            .into());
        };

        // Optional type-test block follows the name.
        let mut spec: Option<ArrayId> = None;
        if let Some(next) = spec_cells.get(i) {
            if next.is(Kind::Block) {
                let (array, _, _) = next.series().expect("block");
                for test in &vm.heap.array(array).cells {
                    if test.is(Kind::Tag) {
                        let (string, _) = test.string().expect("tag");
                        match vm.heap.utf8(string) {
                            "end" => flags.insert(ParamFlags::ENDABLE),
                            "skip" => flags.insert(ParamFlags::SKIPPABLE),
                            "const" => flags.insert(ParamFlags::CONST),
                            "void" if class == ParamClass::Return => {
                                flags.insert(ParamFlags::VANISHABLE)
                            }
                            _ => {}
                        }
                    }
                }
                spec = Some(array);
                i += 1;
            }
        }

        if class == ParamClass::Return {
            has_return = true;
        }
        if keys.contains(&key) {
            return Err(Error::script(
                rill_core::sym::DUP_VARS,
                "duplicate parameter name: {1}",
                vec![Cell::word(key)],
            )
            .into());
        }
        keys.push(key);
        params.push(Cell::parameter(class, flags, spec));
    }

    if add_return && !has_return {
        keys.insert(0, rill_core::sym::RETURN);
        params.insert(
            0,
            Cell::parameter(ParamClass::Return, ParamFlags::VANISHABLE, None),
        );
    }

    let keylist = vm.heap.alloc_keylist(keys, None);
    let mut vars = vec![Cell::blank()];
    vars.extend(params);
    let exemplar = vm
        .heap
        .alloc_context(ContextKind::Frame, keylist, vars, SeriesFlags::MANAGED);
    vm.heap.context_mut(exemplar).vars[0] = Cell::any_context(Kind::Frame, exemplar);
    Ok(exemplar)
}

/// Allocate an action: details cells (slot 0 becomes the archetype), an
/// exemplar, and a dispatcher tag.
pub fn make_action(
    vm: &mut Vm,
    exemplar: ContextId,
    dispatcher: Dispatcher,
    label: Option<SymId>,
    data: Vec<Cell>,
) -> DetailsId {
    let mut cells = vec![Cell::blank()];
    cells.extend(data);
    let details = vm.heap.alloc_details(cells, exemplar, dispatcher, label);
    vm.heap.details_mut(details).cells[0] = Cell::action(details, None);
    details
}
