//! Path dispatch.
//!
//! A path is walked left to right: the head is looked up (or evaluated, for
//! groups), and each further element becomes a "picker" handed to the
//! dispatcher for the current value's heart.  Dispatchers answer with a
//! signal: a plain value, an addressable reference, an immediate (write
//! back through the previously-stashed reference), "I did the write
//! myself", unhandled, or thrown (a group threw).
//!
//! Paths that reach an action accumulate refinement words in source order
//! and hand the action back to the evaluator for invocation (or to
//! SPECIALIZE when a reusable value is wanted).  Paths with inert heads are
//! inert in plain evaluation; GET- and SET- variants refuse them.

use smallvec::SmallVec;

use rill_core::{Cell, Error, Kind, Specifier, SymId, VarRef};
use rill_gc::{ContextKind, SeriesFlags};

use crate::bind::{self, Mode};
use crate::context;
use crate::interp::Vm;
use crate::level::Exec;
use crate::specifier;

/// How a path evaluation is being used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathIntent {
    /// Plain or nested read; groups evaluate.
    Get,
    /// GET-PATH! semantics: no groups allowed.
    GetNoGroups,
}

/// What a path evaluation produced.
pub enum PathProduct {
    /// An ordinary value.
    Value(Cell),
    /// An action with accumulated refinements, ready to invoke.
    Action {
        /// The action value found at the head.
        action: Cell,
        /// Refinement words, in source order.
        refinements: SmallVec<[SymId; 4]>,
        /// The word that named the action, for frame labels.
        label: Option<SymId>,
    },
}

/// Dispatcher answers.
enum PathSignal {
    /// Normal result; next step's input.
    Value(Cell),
    /// An addressable slot; final write target when the path ends with a
    /// set value in hand.
    Reference(VarRef),
    /// A fresh composite; the caller writes it through the stashed
    /// reference from the previous step.
    Immediate(Cell),
    /// The dispatcher performed the write itself.
    Invisible,
    /// This heart does not support this picker.
    Unhandled,
}

/// Evaluate a path for reading (possibly producing an action to invoke).
pub fn eval_path(
    vm: &mut Vm,
    path: &Cell,
    specifier: Specifier,
    intent: PathIntent,
) -> Exec<PathProduct> {
    walk(vm, path, specifier, intent, None)
}

/// Evaluate a SET-PATH!: walk to the final location and store `value`.
pub fn set_path(vm: &mut Vm, path: &Cell, specifier: Specifier, value: Cell) -> Exec<()> {
    walk(vm, path, specifier, PathIntent::GetNoGroups, Some(value)).map(|_| ())
}

fn walk(
    vm: &mut Vm,
    path: &Cell,
    specifier: Specifier,
    intent: PathIntent,
    setval: Option<Cell>,
) -> Exec<PathProduct> {
    let (array, start, own) = path.series().expect("path cell");
    let chain = specifier::derive(vm, own, specifier);
    let elements = vm.heap.array(array).cells[start as usize..].to_vec();

    let Some(head) = elements.first().copied() else {
        return Err(Error::script(
            rill_core::sym::BAD_VALUE,
            "cannot dispatch empty path",
            Vec::new(),
        )
        .into());
    };

    // Inert heads (the leading-slash form) make the whole path inert, but
    // only for plain reads; GET and SET of such paths is an error.
    if head.is_quoted() || head.kind().is_inert() || head.is(Kind::Blank) {
        if setval.is_some() || intent == PathIntent::GetNoGroups {
            return Err(Error::script(
                rill_core::sym::BAD_PATH_PICK,
                "cannot GET or SET a path with an inert head",
                Vec::new(),
            )
            .into());
        }
        let mut inert = *path;
        inert.set_specifier(chain);
        return Ok(PathProduct::Value(inert));
    }

    let mut refinements: SmallVec<[SymId; 4]> = SmallVec::new();
    let mut label: Option<SymId> = None;
    let mut deferred: Option<VarRef> = None;

    // Seed with the head's value.
    let mut out = match head.kind() {
        Kind::Word => {
            let write_through = setval.is_some() && elements.len() == 1;
            if write_through {
                // Degenerate one-element set-path acts like a set-word.
                bind::set_word_value(vm, &head, chain, setval.expect("setval"))?;
                return Ok(PathProduct::Value(Cell::nulled()));
            }
            let var = bind::resolve(vm, &head, chain, Mode::Read)?
                .ok_or_else(|| Error::unbound_word(head))?;
            deferred = Some(var);
            let value = bind::read_var(vm, var)?;
            if value.is_none() {
                return Err(Error::bad_word_get(head).into());
            }
            if value.kind() == Kind::Action {
                label = head.word_sym();
            }
            value
        }
        Kind::Group => {
            if intent == PathIntent::GetNoGroups {
                return Err(Error::script(
                    rill_core::sym::BAD_PATH_PICK,
                    "GROUP! in path used with GET or SET",
                    Vec::new(),
                )
                .into());
            }
            vm.do_block_cell(&head, chain)?
        }
        _ => head,
    };

    // Walk the pickers.
    for (i, element) in elements.iter().enumerate().skip(1) {
        let is_last = i == elements.len() - 1;

        // Refinement accumulation once an action is in hand.
        if out.kind() == Kind::Action {
            let Some(sym) = element.word_sym().filter(|_| element.is(Kind::Word)) else {
                return Err(Error::bad_path_pick(*element).into());
            };
            refinements.push(sym);
            continue;
        }

        // Compute the picker.
        let picker = match element.kind() {
            Kind::GetWord => {
                let fetched = bind::get_word_value(vm, element, chain)?;
                if fetched.is_nulled() || fetched.is_none() {
                    return Err(Error::script(
                        rill_core::sym::NO_VALUE,
                        "path picker has no value: {1}",
                        vec![element.reified()],
                    )
                    .into());
                }
                fetched
            }
            Kind::Group => {
                if intent == PathIntent::GetNoGroups {
                    return Err(Error::script(
                        rill_core::sym::BAD_PATH_PICK,
                        "GROUP! in path used with GET or SET",
                        Vec::new(),
                    )
                    .into());
                }
                vm.do_block_cell(element, chain)?
            }
            _ => *element,
        };

        let step_setval = if is_last { setval } else { None };
        let signal = dispatch_pick(vm, &out, &picker, step_setval.as_ref())?;

        match signal {
            PathSignal::Invisible => {
                debug_assert!(step_setval.is_some(), "write signal on a read step");
                return Ok(PathProduct::Value(Cell::nulled()));
            }
            PathSignal::Reference(var) => {
                if let Some(value) = step_setval {
                    bind::write_var(vm, var, value)?;
                    return Ok(PathProduct::Value(Cell::nulled()));
                }
                deferred = Some(var);
                out = bind::read_var(vm, var)?;
            }
            PathSignal::Immediate(fresh) => {
                debug_assert!(step_setval.is_some(), "immediate signal on a read step");
                let Some(var) = deferred else {
                    return Err(Error::script(
                        rill_core::sym::BAD_PATH_POKE,
                        "cannot update temporary immediate value via SET-PATH!",
                        Vec::new(),
                    )
                    .into());
                };
                bind::write_var(vm, var, fresh)?;
                return Ok(PathProduct::Value(Cell::nulled()));
            }
            PathSignal::Value(next) => {
                if step_setval.is_some() {
                    return Err(Error::bad_path_poke(picker).into());
                }
                deferred = None;
                out = next;
            }
            PathSignal::Unhandled => {
                return Err(if step_setval.is_some() {
                    Error::bad_path_poke(picker).into()
                } else {
                    Error::bad_path_pick(picker).into()
                });
            }
        }
    }

    if setval.is_some() {
        // The walk completed without any step accepting the write.
        return Err(Error::script(
            rill_core::sym::BAD_PATH_POKE,
            "set-path did not reach a writable location",
            Vec::new(),
        )
        .into());
    }

    if out.kind() == Kind::Action && !out.is_quoted() {
        return Ok(PathProduct::Action { action: out, refinements, label });
    }
    Ok(PathProduct::Value(out))
}

// =============================================================================
// Per-heart dispatchers
// =============================================================================

/// One pick/poke step: dispatch on the current value's heart.  Public for
/// the PICK and POKE natives, which speak the same protocol.
pub fn pick_or_poke(
    vm: &mut Vm,
    current: &Cell,
    picker: &Cell,
    setval: Option<&Cell>,
) -> Exec<Option<Cell>> {
    match dispatch_pick(vm, current, picker, setval)? {
        PathSignal::Value(value) => Ok(Some(value)),
        PathSignal::Reference(var) => {
            if let Some(value) = setval {
                bind::write_var(vm, var, *value)?;
                Ok(None)
            } else {
                Ok(Some(bind::read_var(vm, var)?))
            }
        }
        PathSignal::Invisible => Ok(None),
        PathSignal::Immediate(_) => Err(Error::script(
            rill_core::sym::BAD_PATH_POKE,
            "cannot update temporary immediate value",
            Vec::new(),
        )
        .into()),
        PathSignal::Unhandled => Err(if setval.is_some() {
            Error::bad_path_poke(*picker).into()
        } else {
            Error::bad_path_pick(*picker).into()
        }),
    }
}

fn dispatch_pick(
    vm: &mut Vm,
    current: &Cell,
    picker: &Cell,
    setval: Option<&Cell>,
) -> Exec<PathSignal> {
    if current.is_nulled() || current.is_void() {
        return Err(Error::script(
            rill_core::sym::NO_VALUE,
            "path step has no value to pick from",
            Vec::new(),
        )
        .into());
    }
    match current.plain_kind() {
        Some(Kind::Object) | Some(Kind::Module) | Some(Kind::Frame) | Some(Kind::Error)
        | Some(Kind::Port) => pd_context(vm, current, picker, setval),
        Some(Kind::Block) | Some(Kind::Group) | Some(Kind::TypeBlock) | Some(Kind::TypeGroup) => {
            pd_array(vm, current, picker, setval)
        }
        Some(Kind::Path) | Some(Kind::Tuple) | Some(Kind::GetPath) | Some(Kind::SetPath) => {
            pd_sequence(vm, current, picker, setval)
        }
        Some(Kind::Text) | Some(Kind::Tag) | Some(Kind::Issue) | Some(Kind::Binary) => {
            pd_string(vm, current, picker, setval)
        }
        _ => Ok(PathSignal::Unhandled),
    }
}

/// Contexts: word pickers address fields.
fn pd_context(
    vm: &mut Vm,
    current: &Cell,
    picker: &Cell,
    setval: Option<&Cell>,
) -> Exec<PathSignal> {
    let ctx = current.context().expect("context");
    let Some(sym_id) = picker.word_sym().filter(|_| picker.kind().is_word()) else {
        return Ok(PathSignal::Unhandled);
    };
    let record = vm.heap.context_accessible(ctx)?;
    if record.kind == ContextKind::Module {
        if let Some(patch) = context::module_var(vm, ctx, sym_id) {
            return Ok(PathSignal::Reference(VarRef::Patch(patch)));
        }
        if setval.is_some() {
            let patch = context::attach_module_var(vm, ctx, sym_id, Cell::none());
            return Ok(PathSignal::Reference(VarRef::Patch(patch)));
        }
        return Ok(PathSignal::Unhandled);
    }
    match context::find_key(vm, ctx, sym_id) {
        Some(index) => Ok(PathSignal::Reference(VarRef::Context(ctx, index))),
        None => Ok(PathSignal::Unhandled),
    }
}

/// Arrays: integer pickers index (1-based); word pickers select the value
/// following the matching word.
fn pd_array(
    vm: &mut Vm,
    current: &Cell,
    picker: &Cell,
    setval: Option<&Cell>,
) -> Exec<PathSignal> {
    let (array, index, own) = current.series().expect("array");
    if let Some(n) = picker.as_int() {
        if n < 1 {
            return Ok(PathSignal::Unhandled);
        }
        let at = index as usize + (n as usize - 1);
        if let Some(value) = setval {
            let record = vm.heap.array_for_write(array)?;
            match record.cells.get_mut(at) {
                Some(slot) => {
                    *slot = value.reified();
                    return Ok(PathSignal::Invisible);
                }
                None => {
                    return Err(Error::math(
                        rill_core::sym::OUT_OF_RANGE,
                        "index out of range for series",
                        vec![Cell::integer(n)],
                    )
                    .into())
                }
            }
        }
        let picked = vm.heap.array(array).cells.get(at).copied();
        return Ok(match picked {
            Some(mut value) => {
                if value.kind().is_array() {
                    let (_, _, sub) = value.series().expect("array");
                    let derived = specifier::derive(vm, sub, own);
                    value.set_specifier(derived);
                }
                PathSignal::Value(value)
            }
            None => PathSignal::Value(Cell::nulled()),
        });
    }
    if picker.kind().is_word() {
        // SELECT-style: find the word, yield the following value.
        let sym_id = picker.word_sym().expect("word");
        let cells = vm.heap.array(array).cells.clone();
        for (i, cell) in cells.iter().enumerate().skip(index as usize) {
            if cell.kind().is_word() && cell.word_sym() == Some(sym_id) {
                if let Some(value) = setval {
                    let record = vm.heap.array_for_write(array)?;
                    if let Some(slot) = record.cells.get_mut(i + 1) {
                        *slot = value.reified();
                        return Ok(PathSignal::Invisible);
                    }
                    return Ok(PathSignal::Unhandled);
                }
                return Ok(match cells.get(i + 1) {
                    Some(found) => PathSignal::Value(*found),
                    None => PathSignal::Value(Cell::nulled()),
                });
            }
        }
        return Ok(PathSignal::Value(Cell::nulled()));
    }
    Ok(PathSignal::Unhandled)
}

/// Sequences are frozen; reads index like arrays, writes go through the
/// immediate protocol (a fresh sequence written back to the prior slot).
fn pd_sequence(
    vm: &mut Vm,
    current: &Cell,
    picker: &Cell,
    setval: Option<&Cell>,
) -> Exec<PathSignal> {
    let (array, index, _) = current.series().expect("sequence");
    let Some(n) = picker.as_int() else {
        return Ok(PathSignal::Unhandled);
    };
    if n < 1 {
        return Ok(PathSignal::Unhandled);
    }
    let at = index as usize + (n as usize - 1);
    match setval {
        None => Ok(match vm.heap.array(array).cells.get(at) {
            Some(cell) => PathSignal::Value(*cell),
            None => PathSignal::Value(Cell::nulled()),
        }),
        Some(value) => {
            let mut cells = vm.heap.array(array).cells.clone();
            match cells.get_mut(at) {
                Some(slot) => *slot = value.reified(),
                None => {
                    return Err(Error::math(
                        rill_core::sym::OUT_OF_RANGE,
                        "index out of range for sequence",
                        vec![Cell::integer(n)],
                    )
                    .into())
                }
            }
            let fresh = vm.heap.alloc_array(cells, SeriesFlags::MANAGED);
            vm.heap.freeze_array(fresh);
            Ok(PathSignal::Immediate(Cell::any_array(
                current.kind(),
                fresh,
                Specifier::None,
            )))
        }
    }
}

/// Strings: integer pickers yield one-character issues; writes unhandled.
fn pd_string(
    vm: &mut Vm,
    current: &Cell,
    picker: &Cell,
    setval: Option<&Cell>,
) -> Exec<PathSignal> {
    if setval.is_some() {
        return Ok(PathSignal::Unhandled);
    }
    let Some(n) = picker.as_int() else {
        return Ok(PathSignal::Unhandled);
    };
    let (string, index) = current.string().expect("string");
    let text = vm.heap.utf8(string).to_string();
    match text.chars().skip(index as usize).nth((n - 1).max(0) as usize) {
        Some(ch) => {
            let one = vm.heap.alloc_text(ch.to_string(), SeriesFlags::MANAGED);
            Ok(PathSignal::Value(Cell::any_string(Kind::Issue, one)))
        }
        None => Ok(PathSignal::Value(Cell::nulled())),
    }
}
