//! Context construction and key management.

use rill_core::{Cell, ContextId, Error, Kind, KeylistId, PatchId, RillResult, SymId};
use rill_gc::{ContextKind, PatchKind, SeriesFlags};

use crate::interp::Vm;

/// Create a context with the given keys, all variables unset.
pub fn make_context(vm: &mut Vm, kind: ContextKind, keys: Vec<SymId>) -> ContextId {
    let len = keys.len();
    let keylist = vm.heap.alloc_keylist(keys, None);
    let mut vars = vec![Cell::blank(); len + 1];
    for var in vars.iter_mut().skip(1) {
        *var = Cell::none();
    }
    let ctx = vm
        .heap
        .alloc_context(kind, keylist, vars, SeriesFlags::MANAGED);
    vm.heap.context_mut(ctx).vars[0] = Cell::any_context(kind.cell_kind(), ctx);
    ctx
}

/// 1-based slot of a symbol in a context's keylist (positional contexts).
pub fn find_key(vm: &Vm, ctx: ContextId, sym: SymId) -> Option<u32> {
    let keylist = vm.heap.context(ctx).keylist;
    vm.heap
        .keylist(keylist)
        .keys
        .iter()
        .position(|k| *k == sym)
        .map(|i| i as u32 + 1)
}

/// Append a key/value pair to a context, returning the new slot index.
///
/// The keylist is copy-on-write: expansion makes a derived keylist with the
/// old one as ancestor, so siblings sharing the old keylist are unaffected
/// and derivation checks keep working.
pub fn append_key(vm: &mut Vm, ctx: ContextId, sym: SymId, value: Cell) -> RillResult<u32> {
    let record = vm.heap.context(ctx);
    if record.flags.contains(SeriesFlags::FIXED_SIZE) {
        return Err(Error::series_frozen());
    }
    let old_keylist = record.keylist;
    let mut keys = vm.heap.keylist(old_keylist).keys.clone();
    keys.push(sym);
    let new_keylist = vm.heap.alloc_keylist(keys, Some(old_keylist));
    let record = vm.heap.context_mut(ctx);
    record.keylist = new_keylist;
    record.vars.push(value);
    Ok((record.vars.len() - 1) as u32)
}

/// Walk the keylist ancestor chain: is `derived` the same as, or descended
/// from, `base`?  The chain terminates by self-reference.
pub fn keylist_descends_from(vm: &Vm, derived: KeylistId, base: KeylistId) -> bool {
    let mut walk = derived;
    loop {
        if walk == base {
            return true;
        }
        let ancestor = vm.heap.keylist(walk).ancestor;
        if ancestor == walk {
            return false;
        }
        walk = ancestor;
    }
}

/// Context-to-context derivation check through keylists.
pub fn context_descends_from(vm: &Vm, derived: ContextId, base: ContextId) -> bool {
    keylist_descends_from(
        vm,
        vm.heap.context(derived).keylist,
        vm.heap.context(base).keylist,
    )
}

// =============================================================================
// Module variables
// =============================================================================

/// Look up a module variable's patch.
pub fn module_var(vm: &Vm, module: ContextId, sym: SymId) -> Option<PatchId> {
    vm.heap.context(module).mvars.get(&sym).copied()
}

/// Create (or find) a module variable, returning its patch.
pub fn attach_module_var(vm: &mut Vm, module: ContextId, sym: SymId, value: Cell) -> PatchId {
    if let Some(patch) = module_var(vm, module, sym) {
        if let Some(slot) = vm.heap.patch_value_mut(patch) {
            *slot = value;
        }
        return patch;
    }
    let patch = vm.heap.alloc_patch(
        PatchKind::ModuleVar { sym, module, value },
        rill_core::Specifier::None,
    );
    vm.heap.context_mut(module).mvars.insert(sym, patch);
    patch
}

/// Set a lib variable by name (boot convenience).
pub fn set_lib_var(vm: &mut Vm, sym: SymId, value: Cell) {
    let lib = vm.lib;
    attach_module_var(vm, lib, sym, value);
}

/// Read a lib variable by name.
pub fn lib_var(vm: &Vm, sym: SymId) -> Option<Cell> {
    module_var(vm, vm.lib, sym).and_then(|p| vm.heap.patch_value(p).copied())
}

// =============================================================================
// Error contexts
// =============================================================================

/// Keys of the standard error context, in slot order.
fn error_keys() -> Vec<SymId> {
    use rill_core::sym;
    vec![sym::TYPE, sym::ID, sym::MESSAGE, sym::ARGS]
}

/// Reify an [`Error`] into an ERROR! context cell (plain, not raised).
pub fn make_error_context(vm: &mut Vm, err: &Error) -> Cell {
    let keys = error_keys();
    let ctx = make_context(vm, ContextKind::Error, keys);

    let category_sym = vm.intern(err.category.name());
    let message = vm.heap.alloc_text(err.template.clone(), SeriesFlags::MANAGED);
    let args: Vec<Cell> = err.args.iter().map(|c| c.reified()).collect();
    let args = vm.heap.alloc_array(args, SeriesFlags::MANAGED);

    let record = vm.heap.context_mut(ctx);
    record.vars[1] = Cell::word(category_sym);
    record.vars[2] = Cell::word(err.id);
    record.vars[3] = Cell::text(message);
    record.vars[4] = Cell::block(args, rill_core::Specifier::None);
    Cell::any_context(Kind::Error, ctx)
}

/// Reify an error as a *raised* (antiform) cell.
pub fn raise_error(vm: &mut Vm, err: &Error) -> Cell {
    make_error_context(vm, err).antiformify()
}

/// Recover an [`Error`] from an ERROR! context cell.
pub fn error_from_context(vm: &Vm, cell: &Cell) -> Error {
    let fallback = || {
        Error::script(
            rill_core::sym::BAD_VALUE,
            "malformed error context",
            Vec::new(),
        )
    };
    let Some(ctx) = cell.context() else { return fallback() };
    let Ok(record) = vm.heap.context_accessible(ctx) else { return fallback() };
    if record.vars.len() < 5 {
        return fallback();
    }
    let category = match record.vars[1].word_sym().map(|s| vm.symbols.spelling(s)) {
        Some("Internal") => rill_core::Category::Internal,
        Some("Syntax") => rill_core::Category::Syntax,
        Some("Math") => rill_core::Category::Math,
        Some("Access") => rill_core::Category::Access,
        _ => rill_core::Category::Script,
    };
    let id = record.vars[2].word_sym().unwrap_or(rill_core::sym::BAD_VALUE);
    let template = record.vars[3]
        .string()
        .map(|(s, _)| vm.heap.utf8(s).to_string())
        .unwrap_or_default();
    let args = record.vars[4]
        .series()
        .map(|(array, _, _)| vm.heap.array(array).cells.clone())
        .unwrap_or_default();
    Error { category, id, template, args }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::sym;

    #[test]
    fn test_make_context_and_find_key() {
        let mut vm = Vm::new();
        let ctx = make_context(&mut vm, ContextKind::Object, vec![sym::VALUE, sym::DATA]);
        assert_eq!(find_key(&vm, ctx, sym::VALUE), Some(1));
        assert_eq!(find_key(&vm, ctx, sym::DATA), Some(2));
        assert_eq!(find_key(&vm, ctx, sym::WORD), None);
        // Archetype points back at the context.
        assert_eq!(vm.heap.context(ctx).vars[0].context(), Some(ctx));
    }

    #[test]
    fn test_append_key_derives_keylist() {
        let mut vm = Vm::new();
        let ctx = make_context(&mut vm, ContextKind::Object, vec![sym::VALUE]);
        let old_keylist = vm.heap.context(ctx).keylist;
        let index = append_key(&mut vm, ctx, sym::DATA, Cell::integer(5)).expect("append");
        assert_eq!(index, 2);
        let new_keylist = vm.heap.context(ctx).keylist;
        assert_ne!(old_keylist, new_keylist);
        assert!(keylist_descends_from(&vm, new_keylist, old_keylist));
        assert!(!keylist_descends_from(&vm, old_keylist, new_keylist));
    }

    #[test]
    fn test_module_var_attach_and_read() {
        let mut vm = Vm::new();
        let module = vm.lib;
        let my = vm.intern("my-var");
        attach_module_var(&mut vm, module, my, Cell::integer(42));
        let patch = module_var(&vm, module, my).expect("attached");
        assert_eq!(vm.heap.patch_value(patch).and_then(|c| c.as_int()), Some(42));
    }

    #[test]
    fn test_error_context_roundtrip() {
        let mut vm = Vm::new();
        let err = Error::zero_divide();
        let cell = make_error_context(&mut vm, &err);
        assert!(cell.is(Kind::Error));
        let back = error_from_context(&vm, &cell);
        assert_eq!(back.category, err.category);
        assert_eq!(back.id, err.id);
    }
}
