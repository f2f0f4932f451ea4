//! Typed handles into the heap arenas.
//!
//! Series live in arenas owned by the `rill_gc` heap and are addressed by
//! strongly-typed index handles rather than pointers. A handle says nothing
//! about liveness; the garbage collector guarantees that any handle reachable
//! from the root set stays valid, and explicitly freed contexts are marked
//! inaccessible rather than having their slot reused while references remain.

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Raw index into the owning arena.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_id!(
    /// Handle to a cell array (block, group, path, tuple backing storage,
    /// details data, or any other cell-flavored series).
    ArrayId
);
define_id!(
    /// Handle to a UTF-8 string or byte series.
    StringId
);
define_id!(
    /// Handle to a keylist (shared, copy-on-write list of symbol keys with an
    /// ancestor backlink).
    KeylistId
);
define_id!(
    /// Handle to a context (keylist + varlist pair; objects, modules, frames,
    /// errors, ports).
    ContextId
);
define_id!(
    /// Handle to an action's details record (archetype, dispatcher data,
    /// exemplar frame, dispatcher tag).
    DetailsId
);
define_id!(
    /// Handle to a specifier patch (let-patch, use-patch, or module variable).
    PatchId
);

/// Index stored in a word cell that is attached to a module but has not yet
/// resolved to a concrete variable.  Real context indices are 1-based.
pub const INDEX_ATTACHED: u32 = 0;

/// What a word cell's extra slot points at.
///
/// `Relative` bindings name an action rather than a concrete frame; they can
/// only be resolved through a specifier chain that bottoms out in a frame
/// whose phase derives from that action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    /// No binding stored.
    Unbound,
    /// Specific binding into a context's indexed slot (or, for modules, an
    /// attachment awaiting resolution when the index is [`INDEX_ATTACHED`]).
    Context(ContextId),
    /// Binding directly to a patch's single variable cell.
    Patch(PatchId),
    /// Relative binding to a parameter of an action.
    Relative(DetailsId),
}

/// Head of a specifier chain: the virtual-binding context attached to
/// array-carrying cells and feeds.
///
/// Chains thread through patch records (`next` links) and terminate in either
/// `None` or a `Frame`, which supplies the concrete frame for relative
/// bindings at the bottom of the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Specifier {
    /// Fully specified; no virtual bindings, no relative frame.
    None,
    /// Chain continues through a patch.
    Patch(PatchId),
    /// Chain bottom: the frame resolving relative bindings.
    Frame(ContextId),
}

impl Specifier {
    /// True if there is no chain at all.
    #[inline]
    pub fn is_none(self) -> bool {
        matches!(self, Specifier::None)
    }
}

/// A resolved variable location, as produced by the binder.
///
/// `Context` carries a 1-based slot index (slot 0 of a varlist is the
/// archetype).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarRef {
    /// Indexed slot in a context varlist.
    Context(ContextId, u32),
    /// The single cell of a let-patch or module-variable patch.
    Patch(PatchId),
}

/// Filter on a use-patch restricting which word kinds it binds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UseFilter {
    /// Bind every word-like cell.
    AllWords,
    /// Bind only SET-WORD!s (the `apply`-style override pattern).
    SetWordsOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct_types() {
        let a = ArrayId(3);
        let c = ContextId(3);
        assert_eq!(a.index(), c.index());
        // (The point is that `a == c` does not compile.)
    }

    #[test]
    fn test_specifier_none() {
        assert!(Specifier::None.is_none());
        assert!(!Specifier::Frame(ContextId(0)).is_none());
    }
}
