//! The heap: typed arenas for every series flavor, plus allocation and
//! accessor paths.  Collection lives in `trace`.

use rill_core::{
    ArrayId, Cell, ContextId, DetailsId, Error, KeylistId, PatchId, RillResult, Specifier,
    StringId, SymId,
};
use rustc_hash::FxHashMap;

use crate::arena::Arena;
use crate::config::GcConfig;
use crate::stats::GcStats;

bitflags::bitflags! {
    /// Per-series flag bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct SeriesFlags: u16 {
        /// Owned by the GC; swept when unreachable.  Flips on once.
        const MANAGED = 1 << 0;
        /// Deep-immutable; any mutation raises an Access error.
        const FROZEN = 1 << 1;
        /// May not grow or shrink (loop frames hand out slot references).
        const FIXED_SIZE = 1 << 2;
        /// Freed context shell; dereferences raise an Access error.
        const INACCESSIBLE = 1 << 3;
        /// Reached during the current mark phase.
        const MARK = 1 << 4;
        /// Merge produced this chain by reusing an existing one.
        const REUSED = 1 << 5;
        /// Formatting hint for molded output.
        const NEWLINE_AT_TAIL = 1 << 6;
    }
}

/// A cell array (block/group/path backing, details data, api blocks).
#[derive(Debug)]
pub struct ArrayRecord {
    /// The elements.  Antiforms never appear here (asserted on write paths).
    pub cells: Vec<Cell>,
    /// Flags.
    pub flags: SeriesFlags,
}

/// String payloads: UTF-8 text or raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringData {
    /// TEXT!/TAG!/ISSUE! storage.
    Utf8(String),
    /// BINARY! storage.
    Bytes(Vec<u8>),
}

/// A string or binary series.
#[derive(Debug)]
pub struct StringRecord {
    /// Content.
    pub data: StringData,
    /// Flags.
    pub flags: SeriesFlags,
}

/// Shared key list with derivation ancestry.
///
/// The ancestor chain terminates in a self-reference, detected by handle
/// equality.
#[derive(Debug)]
pub struct KeylistRecord {
    /// Key symbols, in slot order (vars slot i+1 is keys\[i\]).
    pub keys: Vec<SymId>,
    /// Derivation parent (self for roots).
    pub ancestor: KeylistId,
    /// Flags.
    pub flags: SeriesFlags,
}

/// What flavor of context a record is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    /// Plain keyed object.
    Object,
    /// Sea-of-words module (variables live in patches, not the varlist).
    Module,
    /// Function frame (positional varlist, phase set).
    Frame,
    /// Error context.
    Error,
    /// Port object.
    Port,
}

impl ContextKind {
    /// The cell kind presenting this context.
    pub fn cell_kind(self) -> rill_core::Kind {
        match self {
            ContextKind::Object => rill_core::Kind::Object,
            ContextKind::Module => rill_core::Kind::Module,
            ContextKind::Frame => rill_core::Kind::Frame,
            ContextKind::Error => rill_core::Kind::Error,
            ContextKind::Port => rill_core::Kind::Port,
        }
    }
}

/// A context: keylist + varlist (vars\[0\] is the archetype).
#[derive(Debug)]
pub struct ContextRecord {
    /// Shared key list.
    pub keylist: KeylistId,
    /// Values; one longer than the keylist, slot 0 is the archetype.
    pub vars: Vec<Cell>,
    /// Flavor.
    pub kind: ContextKind,
    /// Flags.
    pub flags: SeriesFlags,
    /// Currently-dispatching action layer, for frames.
    pub phase: Option<DetailsId>,
    /// The invoked action's binding override (frames only); derived binding
    /// substitutes through this.
    pub frame_binding: Option<ContextId>,
    /// Module variables by symbol (modules only; empty otherwise).
    pub mvars: FxHashMap<SymId, PatchId>,
}

/// How an action's dispatcher is selected.
///
/// Dispatchers are state machines: the trampoline re-enters them at the
/// level's stored state byte, so each variant is a tag rather than a closure.
/// `Native` and `Intrinsic` index the interpreter's native registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatcher {
    /// Native function from the registry.
    Native(u16),
    /// Frameless native: called directly with one argument.
    Intrinsic(u16),
    /// Interpreted FUNC body (details\[1\] = relativized body).
    Func,
    /// LAMBDA body (details\[1\] = body; virtual bind, no RETURN).
    Lambda,
    /// SPECIALIZE (details\[1\] = underlying action).
    Specializer,
    /// ADAPT (details\[1\] = prelude block, details\[2\] = underlying).
    Adapter,
    /// CHAIN (details\[1\] = pipeline block of actions).
    Chainer,
    /// ENCLOSE (details\[1\] = inner action, details\[2\] = outer action).
    Encloser,
    /// Post-hijack shim remapping frames built for the old identity
    /// (details\[0\] archetype holds the hijacker).
    HijackShim,
}

/// An action's identity: details cells + exemplar + dispatcher.
#[derive(Debug)]
pub struct DetailsRecord {
    /// details\[0\] is the archetype; slots 1..N are per-dispatcher data.
    pub cells: Vec<Cell>,
    /// Parameter frame exemplar: unspecialized slots hold PARAMETER! cells,
    /// specialized slots hold values.
    pub exemplar: ContextId,
    /// Dispatcher selection.
    pub dispatcher: Dispatcher,
    /// Cached name for errors and molding.
    pub label: Option<SymId>,
    /// Flags.
    pub flags: SeriesFlags,
    /// Optional adjunct (meta/help) object.
    pub adjunct: Option<ContextId>,
    /// Enfix forms of this action defer across construct boundaries
    /// (THEN/ELSE-style lookback).
    pub defers_lookback: bool,
}

/// Specifier patch payloads.
#[derive(Clone, Copy, Debug)]
pub enum PatchKind {
    /// One symbol, one variable (LET).
    Let {
        /// The bound spelling.
        sym: SymId,
        /// The variable content.
        value: Cell,
    },
    /// A whole context's worth of bindings (USE).
    Use {
        /// The referenced context.
        ctx: ContextId,
        /// Which word kinds the patch binds.
        filter: rill_core::handles::UseFilter,
    },
    /// A module-level variable (sea of words).
    ModuleVar {
        /// The variable's spelling.
        sym: SymId,
        /// Owning module.
        module: ContextId,
        /// The variable content.
        value: Cell,
    },
    /// Alias of another patch's variable.  Chain merges rebuild the outer
    /// chain with aliases so the underlying variables are not forked.
    Alias {
        /// The patch whose variable this node matches and resolves to.
        target: PatchId,
    },
}

/// A node in a specifier chain (or a free-standing module variable).
#[derive(Debug)]
pub struct PatchRecord {
    /// Payload.
    pub kind: PatchKind,
    /// Rest of the chain (None / next patch / frame tail).
    pub next: Specifier,
    /// Flags.
    pub flags: SeriesFlags,
}

/// The heap: one arena per series flavor.
pub struct Heap {
    pub(crate) arrays: Arena<ArrayRecord>,
    pub(crate) strings: Arena<StringRecord>,
    pub(crate) keylists: Arena<KeylistRecord>,
    pub(crate) contexts: Arena<ContextRecord>,
    pub(crate) details: Arena<DetailsRecord>,
    pub(crate) patches: Arena<PatchRecord>,
    pub(crate) config: GcConfig,
    /// Counters, public for diagnostics.
    pub stats: GcStats,
    pub(crate) allocs_since_collect: usize,
}

impl Heap {
    /// A heap with the given configuration.
    pub fn new(config: GcConfig) -> Heap {
        Heap {
            arrays: Arena::with_capacity(config.initial_capacity),
            strings: Arena::new(),
            keylists: Arena::new(),
            contexts: Arena::new(),
            details: Arena::new(),
            patches: Arena::new(),
            config,
            stats: GcStats::default(),
            allocs_since_collect: 0,
        }
    }

    #[inline]
    fn count_alloc(&mut self) {
        self.allocs_since_collect += 1;
        self.stats.allocated_total += 1;
    }

    /// Whether enough allocation has happened to warrant a collection.
    /// Polled by the trampoline between iterations.
    #[inline]
    pub fn wants_collect(&self) -> bool {
        self.config.stress || self.allocs_since_collect >= self.config.collect_threshold
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate a cell array.  Panics if any cell is an antiform.
    pub fn alloc_array(&mut self, cells: Vec<Cell>, flags: SeriesFlags) -> ArrayId {
        debug_assert!(
            cells.iter().all(Cell::array_legal),
            "antiform stored into array"
        );
        self.count_alloc();
        ArrayId(self.arrays.insert(ArrayRecord { cells, flags }))
    }

    /// Allocate a string series.
    pub fn alloc_string(&mut self, data: StringData, flags: SeriesFlags) -> StringId {
        self.count_alloc();
        StringId(self.strings.insert(StringRecord { data, flags }))
    }

    /// Allocate a UTF-8 string series.
    pub fn alloc_text(&mut self, text: impl Into<String>, flags: SeriesFlags) -> StringId {
        self.alloc_string(StringData::Utf8(text.into()), flags)
    }

    /// Allocate a keylist; `ancestor: None` makes it its own root.
    pub fn alloc_keylist(&mut self, keys: Vec<SymId>, ancestor: Option<KeylistId>) -> KeylistId {
        self.count_alloc();
        let id = KeylistId(self.keylists.insert(KeylistRecord {
            keys,
            ancestor: KeylistId(u32::MAX), // patched below
            flags: SeriesFlags::MANAGED,
        }));
        self.keylists.get_mut(id.0).ancestor = ancestor.unwrap_or(id);
        id
    }

    /// Allocate a context record.
    pub fn alloc_context(
        &mut self,
        kind: ContextKind,
        keylist: KeylistId,
        vars: Vec<Cell>,
        flags: SeriesFlags,
    ) -> ContextId {
        debug_assert_eq!(
            vars.len(),
            self.keylists.get(keylist.0).keys.len() + 1,
            "varlist must be one longer than keylist"
        );
        self.count_alloc();
        ContextId(self.contexts.insert(ContextRecord {
            keylist,
            vars,
            kind,
            flags,
            phase: None,
            frame_binding: None,
            mvars: FxHashMap::default(),
        }))
    }

    /// Allocate an action details record.
    pub fn alloc_details(
        &mut self,
        cells: Vec<Cell>,
        exemplar: ContextId,
        dispatcher: Dispatcher,
        label: Option<SymId>,
    ) -> DetailsId {
        self.count_alloc();
        DetailsId(self.details.insert(DetailsRecord {
            cells,
            exemplar,
            dispatcher,
            label,
            flags: SeriesFlags::MANAGED,
            adjunct: None,
            defers_lookback: false,
        }))
    }

    /// Allocate a patch.
    pub fn alloc_patch(&mut self, kind: PatchKind, next: Specifier) -> PatchId {
        self.count_alloc();
        PatchId(self.patches.insert(PatchRecord {
            kind,
            next,
            flags: SeriesFlags::MANAGED,
        }))
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// Shared array access.
    #[inline]
    pub fn array(&self, id: ArrayId) -> &ArrayRecord {
        self.arrays.get(id.0)
    }

    /// Mutable array access.  Mutation legality (frozen etc.) is checked by
    /// [`Heap::array_for_write`]; this path is for the runtime itself.
    #[inline]
    pub fn array_mut(&mut self, id: ArrayId) -> &mut ArrayRecord {
        self.arrays.get_mut(id.0)
    }

    /// Mutable array access for user-visible mutation; checks frozen and
    /// fixed-size discipline.
    pub fn array_for_write(&mut self, id: ArrayId) -> RillResult<&mut ArrayRecord> {
        let record = self.arrays.get_mut(id.0);
        if record.flags.contains(SeriesFlags::FROZEN) {
            return Err(Error::series_frozen());
        }
        Ok(record)
    }

    /// Shared string access.
    #[inline]
    pub fn string(&self, id: StringId) -> &StringRecord {
        self.strings.get(id.0)
    }

    /// Mutable string access.
    #[inline]
    pub fn string_mut(&mut self, id: StringId) -> &mut StringRecord {
        self.strings.get_mut(id.0)
    }

    /// UTF-8 view of a string series (empty for binaries).
    pub fn utf8(&self, id: StringId) -> &str {
        match &self.strings.get(id.0).data {
            StringData::Utf8(s) => s,
            StringData::Bytes(_) => "",
        }
    }

    /// Shared keylist access.
    #[inline]
    pub fn keylist(&self, id: KeylistId) -> &KeylistRecord {
        self.keylists.get(id.0)
    }

    /// Shared context access (no accessibility check).
    #[inline]
    pub fn context(&self, id: ContextId) -> &ContextRecord {
        self.contexts.get(id.0)
    }

    /// Mutable context access (no accessibility check).
    #[inline]
    pub fn context_mut(&mut self, id: ContextId) -> &mut ContextRecord {
        self.contexts.get_mut(id.0)
    }

    /// Context access that raises if the context has been freed.
    pub fn context_accessible(&self, id: ContextId) -> RillResult<&ContextRecord> {
        let record = self.contexts.get(id.0);
        if record.flags.contains(SeriesFlags::INACCESSIBLE) {
            return Err(Error::series_inaccessible());
        }
        Ok(record)
    }

    /// Mutable variant of [`Heap::context_accessible`].
    pub fn context_accessible_mut(&mut self, id: ContextId) -> RillResult<&mut ContextRecord> {
        let record = self.contexts.get_mut(id.0);
        if record.flags.contains(SeriesFlags::INACCESSIBLE) {
            return Err(Error::series_inaccessible());
        }
        Ok(record)
    }

    /// Shared details access.
    #[inline]
    pub fn details(&self, id: DetailsId) -> &DetailsRecord {
        self.details.get(id.0)
    }

    /// Mutable details access.
    #[inline]
    pub fn details_mut(&mut self, id: DetailsId) -> &mut DetailsRecord {
        self.details.get_mut(id.0)
    }

    /// Shared patch access.
    #[inline]
    pub fn patch(&self, id: PatchId) -> &PatchRecord {
        self.patches.get(id.0)
    }

    /// Mutable patch access.
    #[inline]
    pub fn patch_mut(&mut self, id: PatchId) -> &mut PatchRecord {
        self.patches.get_mut(id.0)
    }

    /// Resolve aliases to the patch actually holding the variable.
    pub fn patch_target(&self, id: PatchId) -> PatchId {
        let mut id = id;
        while let PatchKind::Alias { target } = self.patches.get(id.0).kind {
            id = target;
        }
        id
    }

    /// Read a patch's variable cell.  Use-patches have no single variable.
    pub fn patch_value(&self, id: PatchId) -> Option<&Cell> {
        let id = self.patch_target(id);
        match &self.patches.get(id.0).kind {
            PatchKind::Let { value, .. } => Some(value),
            PatchKind::ModuleVar { value, .. } => Some(value),
            PatchKind::Use { .. } | PatchKind::Alias { .. } => None,
        }
    }

    /// Write a patch's variable cell.
    pub fn patch_value_mut(&mut self, id: PatchId) -> Option<&mut Cell> {
        let id = self.patch_target(id);
        match &mut self.patches.get_mut(id.0).kind {
            PatchKind::Let { value, .. } => Some(value),
            PatchKind::ModuleVar { value, .. } => Some(value),
            PatchKind::Use { .. } | PatchKind::Alias { .. } => None,
        }
    }

    /// The symbol a let/module-var patch binds (aliases delegate).
    pub fn patch_sym(&self, id: PatchId) -> Option<SymId> {
        let id = self.patch_target(id);
        match &self.patches.get(id.0).kind {
            PatchKind::Let { sym, .. } => Some(*sym),
            PatchKind::ModuleVar { sym, .. } => Some(*sym),
            PatchKind::Use { .. } | PatchKind::Alias { .. } => None,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flip a series to managed (one-way).
    pub fn manage_array(&mut self, id: ArrayId) {
        self.arrays.get_mut(id.0).flags |= SeriesFlags::MANAGED;
    }

    /// Flip a context to managed (one-way).
    pub fn manage_context(&mut self, id: ContextId) {
        self.contexts.get_mut(id.0).flags |= SeriesFlags::MANAGED;
    }

    /// Freeze an array (deep immutability is the caller's loop).
    pub fn freeze_array(&mut self, id: ArrayId) {
        self.arrays.get_mut(id.0).flags |= SeriesFlags::FROZEN;
    }

    /// Explicitly free a context: the record stays but is marked
    /// inaccessible, so stale references error rather than reading junk.
    pub fn free_context(&mut self, id: ContextId) {
        let record = self.contexts.get_mut(id.0);
        record.flags |= SeriesFlags::INACCESSIBLE;
        record.vars.clear();
        record.mvars.clear();
    }

    /// Explicitly free an unmanaged array.
    pub fn free_array(&mut self, id: ArrayId) {
        debug_assert!(
            !self.arrays.get(id.0).flags.contains(SeriesFlags::MANAGED),
            "manual free of managed array"
        );
        self.arrays.remove(id.0);
    }

    /// Live series counts, for balance diagnostics and tests.
    pub fn live_counts(&self) -> [usize; 6] {
        [
            self.arrays.len(),
            self.strings.len(),
            self.keylists.len(),
            self.contexts.len(),
            self.details.len(),
            self.patches.len(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::Kind;

    fn heap() -> Heap {
        Heap::new(GcConfig::default())
    }

    #[test]
    fn test_alloc_and_read_array() {
        let mut h = heap();
        let id = h.alloc_array(vec![Cell::integer(1), Cell::integer(2)], SeriesFlags::MANAGED);
        assert_eq!(h.array(id).cells.len(), 2);
        assert_eq!(h.array(id).cells[0].as_int(), Some(1));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "antiform stored into array")]
    fn test_antiform_in_array_asserts() {
        let mut h = heap();
        h.alloc_array(vec![Cell::nulled()], SeriesFlags::MANAGED);
    }

    #[test]
    fn test_context_freeing_marks_inaccessible() {
        let mut h = heap();
        let kl = h.alloc_keylist(vec![], None);
        let ctx = h.alloc_context(
            ContextKind::Object,
            kl,
            vec![Cell::blank()],
            SeriesFlags::MANAGED,
        );
        assert!(h.context_accessible(ctx).is_ok());
        h.free_context(ctx);
        let err = h.context_accessible(ctx).unwrap_err();
        assert_eq!(err.category, rill_core::Category::Access);
    }

    #[test]
    fn test_keylist_root_is_self_ancestor() {
        let mut h = heap();
        let kl = h.alloc_keylist(vec![], None);
        assert_eq!(h.keylist(kl).ancestor, kl);
        let derived = h.alloc_keylist(vec![], Some(kl));
        assert_eq!(h.keylist(derived).ancestor, kl);
    }

    #[test]
    fn test_frozen_array_rejects_write() {
        let mut h = heap();
        let id = h.alloc_array(vec![], SeriesFlags::MANAGED);
        h.freeze_array(id);
        assert!(h.array_for_write(id).is_err());
    }

    #[test]
    fn test_context_kind_cell_kind() {
        assert_eq!(ContextKind::Module.cell_kind(), Kind::Module);
        assert_eq!(ContextKind::Frame.cell_kind(), Kind::Frame);
    }
}
