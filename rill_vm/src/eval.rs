//! The evaluator executor.
//!
//! One expression step at a time: fetch a value from the feed, act on its
//! heart (inert, word fetch, group, path, action invocation), then look
//! ahead for an enfix operator that wants the step's product as its first
//! argument.  SET-WORD!s and SET-PATH!s accumulate as pending targets and
//! receive the step's final product.
//!
//! The executor is re-entered by the trampoline at its stored mode after
//! any sublevel (group, action) completes; nihil results mean the sublevel
//! was invisible, and the step keeps going.

use smallvec::SmallVec;

use rill_core::{Cell, CellFlags, DetailsId, Error, Kind, Specifier, SymId};
use rill_gc::Dispatcher;

use crate::action::ActionState;
use crate::bind::{self, Mode};
use crate::interp::Vm;
use crate::level::{Bounce, Exec, Level, LevelFlags};
use crate::path::{self, PathProduct};
use crate::specifier;

/// Mode byte of the evaluator executor.
#[derive(Clone, Copy, Debug)]
pub enum EvalMode {
    /// Begin (or continue) an expression: fetch the next value.
    Fetch,
    /// A sublevel's product is staged; adopt it (or keep going if nihil).
    StepResult,
    /// An intrinsic's single argument is staged; call it framelessly.
    IntrinsicArg {
        /// The intrinsic action's identity (its details carry the data the
        /// implementation reads).
        details: DetailsId,
        /// Registry index of the intrinsic function.
        index: u16,
    },
    /// The step has a product in `out`; check for enfix continuation.
    Lookahead,
    /// Deliver the next staged result as this level's own (delegation).
    PassThrough,
}

/// State of an evaluator level.
#[derive(Clone, Debug)]
pub struct EvalState {
    /// Complete after one expression (argument gathering) instead of
    /// running to the feed's end.
    pub step_only: bool,
    /// Current mode.
    pub mode: EvalMode,
    /// SET-WORD!/SET-PATH! targets awaiting this step's product.
    pub pending_sets: Vec<(Cell, Specifier)>,
}

impl EvalState {
    /// Single-step state (argument fulfillment, API single evaluation).
    pub fn step() -> EvalState {
        EvalState { step_only: true, mode: EvalMode::Fetch, pending_sets: Vec::new() }
    }

    /// Run-to-end state.
    pub fn to_end() -> EvalState {
        EvalState { step_only: false, mode: EvalMode::Fetch, pending_sets: Vec::new() }
    }

    /// Delegation support: next staged result passes through.
    pub fn set_pass_through(&mut self) {
        self.mode = EvalMode::PassThrough;
    }

    /// GC roots held in executor state.  The captured specifiers must be
    /// rooted explicitly: a LET later in the step can rebuild the feed's
    /// chain, leaving these copies as the only reference to the old one.
    /// A pending intrinsic's identity is likewise held only here while its
    /// argument step runs.
    pub fn gather_roots(&self, cells: &mut Vec<Cell>, nodes: &mut Vec<rill_gc::NodeId>) {
        for (target, spec) in &self.pending_sets {
            cells.push(*target);
            match spec {
                Specifier::Patch(patch) => nodes.push(rill_gc::NodeId::Patch(*patch)),
                Specifier::Frame(frame) => nodes.push(rill_gc::NodeId::Context(*frame)),
                Specifier::None => {}
            }
        }
        if let EvalMode::IntrinsicArg { details, .. } = self.mode {
            nodes.push(rill_gc::NodeId::Details(details));
        }
    }
}

/// Drive an evaluator level until it completes or suspends.
pub fn execute(vm: &mut Vm, level: &mut Level, state: &mut EvalState) -> Exec<Bounce> {
    loop {
        match state.mode {
            EvalMode::Fetch => match fetch(vm, level, state)? {
                Some(bounce) => return Ok(bounce),
                None => continue,
            },
            EvalMode::StepResult => {
                let staged = level.staged;
                level.staged = Cell::fresh();
                if staged.is_nihil() || staged.is_stale() {
                    // The sublevel vaporized; the step continues.
                    state.mode = EvalMode::Fetch;
                    continue;
                }
                level.out = staged;
                level.out.flags.remove(CellFlags::STALE);
                state.mode = EvalMode::Lookahead;
            }
            EvalMode::IntrinsicArg { details, index } => {
                let staged = level.staged;
                level.staged = Cell::fresh();
                if staged.is_nihil() || staged.is_stale() {
                    return Err(Error::missing_arg(intrinsic_arg_key(vm, details)).into());
                }
                let mut arg = staged;
                if !arg.is_stable() {
                    arg = decay(vm, arg)?;
                }
                let intrinsic = vm.natives[index as usize]
                    .intrinsic
                    .expect("intrinsic dispatcher without intrinsic function");
                level.out = intrinsic(vm, details, &arg)?;
                level.out.flags.remove(CellFlags::STALE);
                state.mode = EvalMode::Lookahead;
            }
            EvalMode::Lookahead => match lookahead(vm, level, state)? {
                Some(bounce) => return Ok(bounce),
                None => continue,
            },
            EvalMode::PassThrough => {
                level.out = level.staged;
                level.staged = Cell::fresh();
                return Ok(Bounce::Done);
            }
        }
    }
}

/// Fetch-and-dispatch.  `Ok(None)` means "loop again in a new mode".
fn fetch(vm: &mut Vm, level: &mut Level, state: &mut EvalState) -> Exec<Option<Bounce>> {
    let (cell, feed_specifier) = {
        let mut feed = level.feed.borrow_mut();
        let specifier = feed.specifier;
        (feed.next(&vm.heap), specifier)
    };
    let Some(cell) = cell else {
        // Feed exhausted.
        if !state.pending_sets.is_empty() {
            return Err(Error::script(
                rill_core::sym::NEED_NON_END,
                "assignment target with nothing to assign",
                Vec::new(),
            )
            .into());
        }
        return Ok(Some(Bounce::Done));
    };

    // Quoted values drop one quote level and are otherwise literal.
    if cell.is_quoted() {
        let mut value = cell.unquotify(1);
        value.flags.insert(CellFlags::UNEVALUATED);
        return produce(vm, level, state, value);
    }
    // Quasiforms evaluate to their antiform.
    if cell.is_quasi() {
        return produce(vm, level, state, cell.antiformify());
    }

    match cell.kind() {
        Kind::Comma => Ok(None), // expression barrier between steps

        // Inert values evaluate to themselves (arrays pick up the chain).
        kind if kind.is_inert() => {
            let mut value = cell;
            if kind.is_array() {
                let (_, _, own) = cell.series().expect("array");
                let derived = specifier::derive(vm, own, feed_specifier);
                value.set_specifier(derived);
            }
            value.flags.insert(CellFlags::UNEVALUATED);
            produce(vm, level, state, value)
        }

        Kind::Word => {
            let value = bind::get_word_value(vm, &cell, feed_specifier)?;
            if value.is_none() {
                return Err(Error::bad_word_get(cell).into());
            }
            if value.kind() == Kind::Action && !value.is_quoted() {
                if value.flags.contains(CellFlags::ENFIX) {
                    return Err(Error::missing_arg(
                        cell.word_sym().unwrap_or(rill_core::sym::VALUE),
                    )
                    .into());
                }
                if let Some((details, index)) = intrinsic_parts(vm, &value) {
                    return begin_intrinsic(vm, level, state, details, index);
                }
                return Ok(Some(invoke_action(
                    vm,
                    level,
                    state,
                    value,
                    cell.word_sym(),
                    None,
                    SmallVec::new(),
                )));
            }
            if value.is_unstable_antiform() {
                return Err(Error::bad_word_get(cell).into());
            }
            produce(vm, level, state, value)
        }

        Kind::SetWord => {
            state.pending_sets.push((cell, feed_specifier));
            Ok(None) // the next expression is the assignment source
        }

        Kind::GetWord => {
            let mut value = bind::get_word_value(vm, &cell, feed_specifier)?;
            if value.is_none() {
                return Err(Error::bad_word_get(cell).into());
            }
            if value.is_activation() {
                value = value.as_plain(); // defuse to a plain ACTION!
            }
            produce(vm, level, state, value)
        }

        Kind::MetaWord => {
            let var = bind::resolve(vm, &cell, feed_specifier, Mode::Read)?
                .ok_or_else(|| Error::unbound_word(cell))?;
            let value = bind::read_var(vm, var)?;
            produce(vm, level, state, value.meta())
        }

        Kind::Group => {
            let (array, index, own) = cell.series().expect("group");
            if vm.heap.array(array).cells.len() <= index as usize {
                return Ok(None); // empty group vaporizes
            }
            let derived = specifier::derive(vm, own, feed_specifier);
            let feed = crate::feed::Feed::from_array(array, index as usize, derived);
            let sub = Level::eval(feed, EvalState::to_end(), LevelFlags::MAYBE_STALE);
            state.mode = EvalMode::StepResult;
            Ok(Some(Bounce::Continue(Box::new(sub))))
        }

        Kind::Path => {
            match path::eval_path(vm, &cell, feed_specifier, path::PathIntent::Get)? {
                PathProduct::Value(value) => produce(vm, level, state, value),
                PathProduct::Action { action, refinements, label } => Ok(Some(invoke_action(
                    vm,
                    level,
                    state,
                    action,
                    label,
                    None,
                    refinements,
                ))),
            }
        }

        Kind::GetPath => {
            match path::eval_path(vm, &cell, feed_specifier, path::PathIntent::GetNoGroups)? {
                PathProduct::Value(mut value) => {
                    if value.is_activation() {
                        value = value.as_plain();
                    }
                    produce(vm, level, state, value)
                }
                PathProduct::Action { mut action, .. } => {
                    action = action.as_plain();
                    produce(vm, level, state, action)
                }
            }
        }

        Kind::SetPath => {
            state.pending_sets.push((cell, feed_specifier));
            Ok(None)
        }

        Kind::Tuple => {
            match path::eval_path(vm, &cell, feed_specifier, path::PathIntent::Get)? {
                PathProduct::Value(value) => produce(vm, level, state, value),
                PathProduct::Action { action, .. } => {
                    // Tuple access never invokes; the action is a value.
                    produce(vm, level, state, action.as_plain())
                }
            }
        }

        Kind::Action => {
            if let Some((details, index)) = intrinsic_parts(vm, &cell) {
                return begin_intrinsic(vm, level, state, details, index);
            }
            Ok(Some(invoke_action(
                vm,
                level,
                state,
                cell,
                None,
                None,
                SmallVec::new(),
            )))
        }

        other => Err(Error::script(
            rill_core::sym::BAD_VALUE,
            "cannot evaluate value of this type: {1}",
            vec![Cell::datatype(other)],
        )
        .into()),
    }
}

/// Adopt a step product and move to lookahead.
fn produce(
    _vm: &mut Vm,
    level: &mut Level,
    state: &mut EvalState,
    value: Cell,
) -> Exec<Option<Bounce>> {
    level.out = value;
    level.out.flags.remove(CellFlags::STALE);
    state.mode = EvalMode::Lookahead;
    Ok(None)
}

/// An action's identity and registry index, when its dispatcher is an
/// intrinsic (and therefore eligible for frameless dispatch).
fn intrinsic_parts(vm: &Vm, action: &Cell) -> Option<(DetailsId, u16)> {
    let (details, _) = action.action_parts()?;
    match vm.heap.details(details).dispatcher {
        Dispatcher::Intrinsic(index) => Some((details, index)),
        _ => None,
    }
}

/// The name of an intrinsic's argument, for end-of-feed errors.
fn intrinsic_arg_key(vm: &Vm, details: DetailsId) -> SymId {
    let exemplar = vm.heap.details(details).exemplar;
    let keylist = vm.heap.context(exemplar).keylist;
    vm.heap
        .keylist(keylist)
        .keys
        .iter()
        .copied()
        .find(|key| *key != rill_core::sym::RETURN)
        .unwrap_or(rill_core::sym::VALUE)
}

/// Begin a frameless intrinsic call: one ordinary evaluation step gathers
/// the single argument, then the implementation runs directly — no frame is
/// built and no action level is pushed.  Path-invoked and composed forms
/// still route through the action executor, which validates refinements.
fn begin_intrinsic(
    vm: &mut Vm,
    level: &mut Level,
    state: &mut EvalState,
    details: DetailsId,
    index: u16,
) -> Exec<Option<Bounce>> {
    if level.feed.borrow().at_end(&vm.heap) {
        return Err(Error::missing_arg(intrinsic_arg_key(vm, details)).into());
    }
    let sub = Level::eval(
        level.feed.clone(),
        EvalState::step(),
        LevelFlags::FULFILLING_ARG | LevelFlags::MAYBE_STALE,
    );
    state.mode = EvalMode::IntrinsicArg { details, index };
    Ok(Some(Bounce::Continue(Box::new(sub))))
}

/// Begin an action invocation as a sublevel sharing this level's feed.
fn invoke_action(
    _vm: &mut Vm,
    level: &mut Level,
    state: &mut EvalState,
    action: Cell,
    label: Option<SymId>,
    enfix_first: Option<Cell>,
    refinements: SmallVec<[SymId; 4]>,
) -> Bounce {
    let action_state = ActionState::invoke(&action, enfix_first, refinements);
    let mut sub = Level::action(level.feed.clone(), action_state, LevelFlags::empty());
    sub.label = label;
    state.mode = EvalMode::StepResult;
    Bounce::Continue(Box::new(sub))
}

/// After a step produced `out`: run any enfix continuation, else finish the
/// step (apply pending assignments) and either complete or start the next
/// expression.
fn lookahead(vm: &mut Vm, level: &mut Level, state: &mut EvalState) -> Exec<Option<Bounce>> {
    let peeked = {
        let feed = level.feed.borrow();
        feed.peek(&vm.heap)
    };

    if let Some(cell) = peeked {
        if cell.is(Kind::Word) {
            // A fetch failure here just means "not an enfix operator".
            let looked = bind::resolve(vm, &cell, level.feed.borrow().specifier, Mode::Read)
                .ok()
                .flatten()
                .and_then(|var| bind::read_var(vm, var).ok());
            if let Some(value) = looked {
                let is_enfix_action =
                    value.kind() == Kind::Action && value.flags.contains(CellFlags::ENFIX);
                if is_enfix_action {
                    let (details, _) = value.action_parts().expect("action");
                    let defers = vm.heap.details(details).defers_lookback;
                    if defers && level.flags.contains(LevelFlags::FULFILLING_ARG) {
                        // Deferred enfix waits for the outer construct.
                        return finish_step(vm, level, state);
                    }
                    {
                        let mut feed = level.feed.borrow_mut();
                        feed.next(&vm.heap); // consume the operator word
                        feed.gotten = None;
                    }
                    let first = level.out;
                    level.out = Cell::fresh();
                    return Ok(Some(invoke_action(
                        vm,
                        level,
                        state,
                        value,
                        cell.word_sym(),
                        Some(first),
                        SmallVec::new(),
                    )));
                }
                level.feed.borrow_mut().gotten = Some(value);
            }
        }
    }

    finish_step(vm, level, state)
}

/// Apply pending assignments; then either complete the level or begin the
/// next expression.
fn finish_step(vm: &mut Vm, level: &mut Level, state: &mut EvalState) -> Exec<Option<Bounce>> {
    if !state.pending_sets.is_empty() {
        let mut value = level.out;
        if value.is_unstable_antiform() {
            value = decay(vm, value)?;
            level.out = value;
        }
        for (target, spec) in state.pending_sets.drain(..).rev() {
            match target.kind() {
                Kind::SetWord => bind::set_word_value(vm, &target, spec, value)?,
                Kind::SetPath => path::set_path(vm, &target, spec, value)?,
                _ => unreachable!("pending set of non-settable target"),
            }
        }
    }

    if state.step_only {
        return Ok(Some(Bounce::Done));
    }
    if level.feed.borrow().at_end(&vm.heap) {
        return Ok(Some(Bounce::Done));
    }
    state.mode = EvalMode::Fetch;
    Ok(None)
}

/// Decay an unstable antiform to a stable value: packs take their first
/// item, nihil becomes void, raised errors propagate.
pub fn decay(vm: &mut Vm, value: Cell) -> Exec<Cell> {
    if value.is_raised() {
        return Err(crate::level::VmSignal::Error(crate::context::error_from_context(
            vm, &value,
        )));
    }
    if value.is_pack() {
        let (array, index, _) = value.series().expect("pack");
        let first = vm.heap.array(array).cells.get(index as usize).copied();
        return match first {
            Some(item) => Ok(item.unmeta_or_plain()),
            None => Ok(Cell::void()),
        };
    }
    Ok(value.decayed_shallow())
}
