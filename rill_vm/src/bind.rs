//! The binder: resolving words to variables.
//!
//! Resolution runs in two phases.  First the specifier chain is walked from
//! head to tail: let-patches match by symbol, use-patches consult their
//! context (respecting the kind filter), and a frame tail stops the walk
//! while being remembered for relative bindings.  Second, the word's stored
//! binding is consulted: a patch binding is direct, a positional context
//! binding may be upgraded by derived binding, a relative binding resolves
//! through the remembered frame, and a module binding falls back to the
//! sea-of-words lookup with write-attachment and lib inheritance.
//!
//! Resolved specific bindings are written back into array cells only by the
//! deep binding walks (which own their cells); inherited hits are never
//! cached, so later overrides stay visible.

use rustc_hash::FxHashMap;

use rill_core::{
    sym, Binding, Cell, ContextId, Error, Kind, RillResult, Specifier, SymId, UseFilter, VarRef,
    INDEX_ATTACHED,
};
use rill_gc::{ContextKind, PatchKind};

use crate::context;
use crate::interp::Vm;

/// What the caller intends to do with the variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Reading; misses may fall back to lib inheritance.
    Read,
    /// Writing; module misses attach a new variable.
    Write,
}

/// Resolve a word cell through a specifier chain.
///
/// Returns `None` for a word with no reachable variable (unbound).
pub fn resolve(
    vm: &mut Vm,
    word: &Cell,
    specifier: Specifier,
    mode: Mode,
) -> RillResult<Option<VarRef>> {
    let sym = word
        .word_sym()
        .unwrap_or_else(|| panic!("resolve of non-word cell: {word:?}"));

    // Phase 1: the virtual-binding chain.
    let mut chain_frame: Option<ContextId> = None;
    let mut walk = specifier;
    loop {
        match walk {
            Specifier::None => break,
            Specifier::Frame(frame) => {
                chain_frame = Some(frame);
                break;
            }
            Specifier::Patch(patch) => {
                let next = vm.heap.patch(patch).next;
                match vm.heap.patch(patch).kind {
                    PatchKind::Let { sym: patch_sym, .. } => {
                        if patch_sym == sym {
                            return Ok(Some(VarRef::Patch(patch)));
                        }
                    }
                    PatchKind::Alias { target } => {
                        if vm.heap.patch_sym(target) == Some(sym) {
                            return Ok(Some(VarRef::Patch(target)));
                        }
                    }
                    PatchKind::Use { ctx, filter } => {
                        if filter_admits(filter, word.kind()) {
                            if let Some(var) = lookup_in_context(vm, ctx, sym)? {
                                return Ok(Some(var));
                            }
                        }
                    }
                    PatchKind::ModuleVar { sym: patch_sym, .. } => {
                        // Module variables do not normally appear in chains,
                        // but match directly if one does.
                        if patch_sym == sym {
                            return Ok(Some(VarRef::Patch(patch)));
                        }
                    }
                }
                walk = next;
            }
        }
    }

    // Phase 2: the stored binding.
    match word.word_binding().expect("word has binding slot") {
        Binding::Unbound => Ok(None),
        Binding::Patch(patch) => Ok(Some(VarRef::Patch(vm.heap.patch_target(patch)))),
        Binding::Relative(details) => {
            let frame = chain_frame.ok_or_else(|| {
                Error::internal(
                    sym::INVARIANT,
                    "relative word resolved with no frame in specifier chain",
                )
            })?;
            debug_assert!(
                frame_phase_derives(vm, frame, details),
                "frame phase is not base of relatively-bound action"
            );
            let index = word.word_index().unwrap_or(0);
            Ok(Some(VarRef::Context(frame, index)))
        }
        Binding::Context(ctx) => {
            let record = vm.heap.context_accessible(ctx)?;
            if record.kind == ContextKind::Module {
                return resolve_in_module(vm, ctx, sym, mode);
            }
            // Derived binding: substitute a more-derived context supplied by
            // the frame's binding override, when it descends from the stored
            // context in the keylist-ancestor chain.
            let mut target = ctx;
            if let Some(frame) = chain_frame {
                if let Some(derived) = vm.heap.context(frame).frame_binding {
                    if derived != ctx && context::context_descends_from(vm, derived, ctx) {
                        target = derived;
                    }
                }
            }
            let index = word.word_index().unwrap_or(0);
            if index == INDEX_ATTACHED {
                return Ok(None);
            }
            Ok(Some(VarRef::Context(target, index)))
        }
    }
}

fn filter_admits(filter: UseFilter, kind: Kind) -> bool {
    match filter {
        UseFilter::AllWords => true,
        UseFilter::SetWordsOnly => kind == Kind::SetWord,
    }
}

fn lookup_in_context(vm: &Vm, ctx: ContextId, sym: SymId) -> RillResult<Option<VarRef>> {
    let record = vm.heap.context_accessible(ctx)?;
    if record.kind == ContextKind::Module {
        return Ok(context::module_var(vm, ctx, sym).map(VarRef::Patch));
    }
    Ok(context::find_key(vm, ctx, sym).map(|index| VarRef::Context(ctx, index)))
}

/// Module fallback: hitch lookup, write-attachment, lib inheritance.
fn resolve_in_module(
    vm: &mut Vm,
    module: ContextId,
    sym: SymId,
    mode: Mode,
) -> RillResult<Option<VarRef>> {
    if let Some(patch) = context::module_var(vm, module, sym) {
        return Ok(Some(VarRef::Patch(patch)));
    }
    match mode {
        Mode::Write => {
            if module == vm.sys {
                // The protected root module refuses attachment.
                return Err(Error::protected_word(Cell::word(sym)));
            }
            let patch = context::attach_module_var(vm, module, sym, Cell::none());
            Ok(Some(VarRef::Patch(patch)))
        }
        Mode::Read => {
            // Single designated inheritance source.
            if module != vm.lib {
                if let Some(patch) = context::module_var(vm, vm.lib, sym) {
                    // Inherited: usable, but MUST NOT be cached in the word.
                    return Ok(Some(VarRef::Patch(patch)));
                }
            }
            Ok(None)
        }
    }
}

/// Is the frame's phase the bound action itself, or derived from it (the
/// frame's keylist descends from the action exemplar's keylist)?
fn frame_phase_derives(vm: &Vm, frame: ContextId, details: rill_core::DetailsId) -> bool {
    let frame_record = vm.heap.context(frame);
    if frame_record.phase == Some(details) {
        return true;
    }
    let exemplar = vm.heap.details(details).exemplar;
    context::keylist_descends_from(
        vm,
        frame_record.keylist,
        vm.heap.context(exemplar).keylist,
    )
}

// =============================================================================
// Variable access
// =============================================================================

/// Read a resolved variable.
pub fn read_var(vm: &Vm, var: VarRef) -> RillResult<Cell> {
    match var {
        VarRef::Patch(patch) => Ok(*vm
            .heap
            .patch_value(patch)
            .unwrap_or_else(|| panic!("read of variable-less patch"))),
        VarRef::Context(ctx, index) => {
            let record = vm.heap.context_accessible(ctx)?;
            record
                .vars
                .get(index as usize)
                .copied()
                .ok_or_else(|| Error::series_inaccessible())
        }
    }
}

/// Write a resolved variable, honoring slot protection.
pub fn write_var(vm: &mut Vm, var: VarRef, value: Cell) -> RillResult<()> {
    debug_assert!(value.is_stable(), "unstable antiform written to variable");
    match var {
        VarRef::Patch(patch) => {
            let slot = vm
                .heap
                .patch_value_mut(patch)
                .unwrap_or_else(|| panic!("write to variable-less patch"));
            if slot.flags.contains(rill_core::CellFlags::PROTECTED) {
                return Err(Error::protected_word(Cell::blank()));
            }
            *slot = value;
            Ok(())
        }
        VarRef::Context(ctx, index) => {
            let record = vm.heap.context_accessible_mut(ctx)?;
            let slot = record
                .vars
                .get_mut(index as usize)
                .ok_or_else(Error::series_inaccessible)?;
            if slot.flags.contains(rill_core::CellFlags::PROTECTED) {
                return Err(Error::protected_word(Cell::blank()));
            }
            *slot = value;
            Ok(())
        }
    }
}

/// Resolve and read, raising on unbound words.
pub fn get_word_value(vm: &mut Vm, word: &Cell, specifier: Specifier) -> RillResult<Cell> {
    match resolve(vm, word, specifier, Mode::Read)? {
        Some(var) => read_var(vm, var),
        None => Err(Error::unbound_word(*word)),
    }
}

/// Resolve (attaching if a module word) and write.
pub fn set_word_value(
    vm: &mut Vm,
    word: &Cell,
    specifier: Specifier,
    value: Cell,
) -> RillResult<()> {
    match resolve(vm, word, specifier, Mode::Write)? {
        Some(var) => write_var(vm, var, value),
        None => Err(Error::unbound_word(*word)),
    }
}

// =============================================================================
// Deep binding walks
// =============================================================================

/// Scratch index mapping symbols to context slots during a deep bind.
pub struct Binder {
    index: FxHashMap<SymId, i64>,
}

impl Binder {
    /// Fresh, empty binder.
    pub fn new() -> Binder {
        Binder { index: FxHashMap::default() }
    }

    /// Register a symbol at a (1-based) slot.  Returns false on duplicates.
    pub fn try_add(&mut self, sym: SymId, index: i64) -> bool {
        match self.index.entry(sym) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(index);
                true
            }
        }
    }

    /// Slot for a symbol, 0 when absent.  Negative entries mean "known but
    /// not bindable" (reused loop variables).
    pub fn get(&self, sym: SymId) -> i64 {
        self.index.get(&sym).copied().unwrap_or(0)
    }
}

impl Default for Binder {
    fn default() -> Self {
        Binder::new()
    }
}

/// Bind word cells in an array (deeply) to a context.  Only kinds admitted
/// by `kinds` are bound; when `add_midstream` is set, unknown words are
/// appended to the context as they are encountered.
pub fn bind_values_deep(
    vm: &mut Vm,
    array: rill_core::ArrayId,
    ctx: ContextId,
    kinds: fn(Kind) -> bool,
    add_midstream: bool,
) -> RillResult<()> {
    let is_module = vm.heap.context(ctx).kind == ContextKind::Module;
    let mut binder = Binder::new();
    if !is_module {
        let keylist = vm.heap.context(ctx).keylist;
        let keys = vm.heap.keylist(keylist).keys.clone();
        for (i, key) in keys.iter().enumerate() {
            binder.try_add(*key, i as i64 + 1);
        }
    }
    bind_inner(vm, &mut binder, array, ctx, is_module, kinds, add_midstream)
}

fn bind_inner(
    vm: &mut Vm,
    binder: &mut Binder,
    array: rill_core::ArrayId,
    ctx: ContextId,
    is_module: bool,
    kinds: fn(Kind) -> bool,
    add_midstream: bool,
) -> RillResult<()> {
    for i in 0..vm.heap.array(array).cells.len() {
        let cell = vm.heap.array(array).cells[i];
        let heart = cell.kind();
        if heart.is_word() && kinds(heart) {
            let sym = cell.word_sym().expect("word");
            if is_module {
                if let Some(patch) = context::module_var(vm, ctx, sym) {
                    let slot = &mut vm.heap.array_mut(array).cells[i];
                    slot.set_word_binding(Binding::Patch(patch), 1);
                } else if add_midstream {
                    let patch = context::attach_module_var(vm, ctx, sym, Cell::none());
                    let slot = &mut vm.heap.array_mut(array).cells[i];
                    slot.set_word_binding(Binding::Patch(patch), 1);
                }
            } else {
                let n = binder.get(sym);
                if n > 0 {
                    let slot = &mut vm.heap.array_mut(array).cells[i];
                    slot.set_word_binding(Binding::Context(ctx), n as u32);
                } else if add_midstream {
                    let index = context::append_key(vm, ctx, sym, Cell::none())?;
                    binder.try_add(sym, index as i64);
                    let slot = &mut vm.heap.array_mut(array).cells[i];
                    slot.set_word_binding(Binding::Context(ctx), index);
                }
            }
        } else if heart.is_array() {
            if let Some((sub, _, _)) = cell.series() {
                bind_inner(vm, binder, sub, ctx, is_module, kinds, add_midstream)?;
            }
        }
    }
    Ok(())
}

/// Unbind word cells deeply; with `ctx` given, only words bound there.
pub fn unbind_values_deep(vm: &mut Vm, array: rill_core::ArrayId, ctx: Option<ContextId>) {
    for i in 0..vm.heap.array(array).cells.len() {
        let cell = vm.heap.array(array).cells[i];
        if cell.kind().is_word() {
            let matches = match (ctx, cell.word_binding()) {
                (None, _) => true,
                (Some(c), Some(Binding::Context(bound))) => bound == c,
                _ => false,
            };
            if matches {
                let slot = &mut vm.heap.array_mut(array).cells[i];
                slot.set_word_binding(Binding::Unbound, 0);
            }
        } else if cell.kind().is_array() {
            if let Some((sub, _, _)) = cell.series() {
                unbind_values_deep(vm, sub, ctx);
            }
        }
    }
}

/// Attach every word deeply to a module, without resolving indices: binding
/// points at the module with `INDEX_ATTACHED`, so reads fall back through
/// the sea-of-words and writes attach on demand.
pub fn bind_nonspecifically(vm: &mut Vm, array: rill_core::ArrayId, module: ContextId) {
    for i in 0..vm.heap.array(array).cells.len() {
        let cell = vm.heap.array(array).cells[i];
        if cell.kind().is_word() {
            let slot = &mut vm.heap.array_mut(array).cells[i];
            slot.set_word_binding(Binding::Context(module), INDEX_ATTACHED);
        } else if cell.kind().is_array() {
            if let Some((sub, _, _)) = cell.series() {
                bind_nonspecifically(vm, sub, module);
            }
        }
    }
}

/// Deep-copy a body array, binding words that name the action's parameters
/// relatively to the action.  Nested arrays are copied so the bindings do
/// not contaminate the original; nested sequences are frozen like their
/// originals.
pub fn copy_and_bind_relative_deep(
    vm: &mut Vm,
    body: rill_core::ArrayId,
    details: rill_core::DetailsId,
) -> rill_core::ArrayId {
    let mut binder = Binder::new();
    let exemplar = vm.heap.details(details).exemplar;
    let keylist = vm.heap.context(exemplar).keylist;
    let keys = vm.heap.keylist(keylist).keys.clone();
    for (i, key) in keys.iter().enumerate() {
        binder.try_add(*key, i as i64 + 1);
    }
    copy_relative_inner(vm, &binder, body, details)
}

fn copy_relative_inner(
    vm: &mut Vm,
    binder: &Binder,
    array: rill_core::ArrayId,
    details: rill_core::DetailsId,
) -> rill_core::ArrayId {
    let cells = vm.heap.array(array).cells.clone();
    let mut copied = Vec::with_capacity(cells.len());
    for mut cell in cells {
        if cell.kind().is_word() {
            let n = binder.get(cell.word_sym().expect("word"));
            if n > 0 {
                cell.set_word_binding(Binding::Relative(details), n as u32);
            }
        } else if cell.kind().is_array() {
            if let Some((sub, index, _)) = cell.series() {
                let sub_copy = copy_relative_inner(vm, binder, sub, details);
                if cell.kind().is_sequence() {
                    vm.heap.freeze_array(sub_copy);
                }
                cell = Cell::any_array_at(cell.kind(), sub_copy, index, Specifier::None);
            }
        }
        copied.push(cell);
    }
    vm.heap.alloc_array(copied, rill_gc::SeriesFlags::MANAGED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_gc::SeriesFlags;

    #[test]
    fn test_resolve_let_patch_in_chain() {
        let mut vm = Vm::new();
        let patch = crate::specifier::make_let_patch(&mut vm, sym::VALUE, Specifier::None);
        let word = Cell::word(sym::VALUE);
        let var = resolve(&mut vm, &word, Specifier::Patch(patch), Mode::Read)
            .expect("resolve")
            .expect("bound");
        assert_eq!(var, VarRef::Patch(patch));
        write_var(&mut vm, var, Cell::integer(7)).expect("write");
        assert_eq!(read_var(&vm, var).expect("read").as_int(), Some(7));
    }

    #[test]
    fn test_chain_shadows_stored_binding() {
        let mut vm = Vm::new();
        let ctx = context::make_context(&mut vm, ContextKind::Object, vec![sym::VALUE]);
        let mut word = Cell::word(sym::VALUE);
        word.set_word_binding(Binding::Context(ctx), 1);
        // Without a chain, resolves into the context.
        let var = resolve(&mut vm, &word, Specifier::None, Mode::Read)
            .expect("resolve")
            .expect("bound");
        assert_eq!(var, VarRef::Context(ctx, 1));
        // A let-patch for the same symbol shadows it.
        let patch = crate::specifier::make_let_patch(&mut vm, sym::VALUE, Specifier::None);
        let var = resolve(&mut vm, &word, Specifier::Patch(patch), Mode::Read)
            .expect("resolve")
            .expect("bound");
        assert_eq!(var, VarRef::Patch(patch));
    }

    #[test]
    fn test_module_write_attaches_read_inherits() {
        let mut vm = Vm::new();
        let user = context::make_context(&mut vm, ContextKind::Module, vec![]);
        let my = vm.intern("wholly-new");
        let word = {
            let mut w = Cell::word(my);
            w.set_word_binding(Binding::Context(user), INDEX_ATTACHED);
            w
        };
        // Read miss with no lib variable: unbound.
        assert!(resolve(&mut vm, &word, Specifier::None, Mode::Read)
            .expect("resolve")
            .is_none());
        // Lib inheritance on read.
        context::set_lib_var(&mut vm, my, Cell::integer(3));
        let var = resolve(&mut vm, &word, Specifier::None, Mode::Read)
            .expect("resolve")
            .expect("inherited");
        assert_eq!(read_var(&vm, var).expect("read").as_int(), Some(3));
        // Write attaches locally rather than touching lib.
        let var = resolve(&mut vm, &word, Specifier::None, Mode::Write)
            .expect("resolve")
            .expect("attached");
        write_var(&mut vm, var, Cell::integer(9)).expect("write");
        assert_eq!(
            context::module_var(&vm, user, my)
                .and_then(|p| vm.heap.patch_value(p).copied())
                .and_then(|c| c.as_int()),
            Some(9)
        );
        assert_eq!(
            context::lib_var(&vm, my).and_then(|c| c.as_int()),
            Some(3),
            "lib variable must be untouched by the attachment"
        );
    }

    #[test]
    fn test_sys_refuses_attachment() {
        let mut vm = Vm::new();
        let sys = vm.sys;
        let my = vm.intern("intruder");
        let mut word = Cell::word(my);
        word.set_word_binding(Binding::Context(sys), INDEX_ATTACHED);
        assert!(resolve(&mut vm, &word, Specifier::None, Mode::Write).is_err());
    }

    #[test]
    fn test_bind_values_deep_binds_nested() {
        let mut vm = Vm::new();
        let ctx = context::make_context(&mut vm, ContextKind::Object, vec![sym::VALUE]);
        let inner = vm
            .heap
            .alloc_array(vec![Cell::word(sym::VALUE)], SeriesFlags::MANAGED);
        let outer = vm.heap.alloc_array(
            vec![Cell::word(sym::VALUE), Cell::block(inner, Specifier::None)],
            SeriesFlags::MANAGED,
        );
        bind_values_deep(&mut vm, outer, ctx, |k| k == Kind::Word, false).expect("bind");
        assert_eq!(
            vm.heap.array(outer).cells[0].word_binding(),
            Some(Binding::Context(ctx))
        );
        assert_eq!(
            vm.heap.array(inner).cells[0].word_binding(),
            Some(Binding::Context(ctx))
        );

        unbind_values_deep(&mut vm, outer, Some(ctx));
        assert_eq!(
            vm.heap.array(inner).cells[0].word_binding(),
            Some(Binding::Unbound)
        );
    }

    #[test]
    fn test_referential_stability_of_resolution() {
        let mut vm = Vm::new();
        let ctx = context::make_context(&mut vm, ContextKind::Object, vec![sym::VALUE]);
        let mut word = Cell::word(sym::VALUE);
        word.set_word_binding(Binding::Context(ctx), 1);
        let patch = crate::specifier::make_let_patch(&mut vm, sym::DATA, Specifier::None);
        let spec = Specifier::Patch(patch);
        let first = resolve(&mut vm, &word, spec, Mode::Read).expect("resolve");
        let second = resolve(&mut vm, &word, spec, Mode::Read).expect("resolve");
        assert_eq!(first, second);
    }
}
