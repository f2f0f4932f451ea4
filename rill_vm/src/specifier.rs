//! Specifier chains: construction, derivation, and merging.
//!
//! Chains are built head-first: the newest binding is the head, and the
//! chain bottoms out in `None` or the frame that resolves relative bindings.
//! Chains are immutable once built — merging never relinks an existing
//! chain, it either reuses one outright or rebuilds the outer chain out of
//! alias nodes so the underlying variables are shared, not forked.

use rill_core::{Cell, ContextId, PatchId, Specifier, SymId, UseFilter};
use rill_gc::{PatchKind, SeriesFlags};

use crate::interp::Vm;

/// Make a let-patch holding one fresh unset variable, linked onto `next`.
pub fn make_let_patch(vm: &mut Vm, sym: SymId, next: Specifier) -> PatchId {
    vm.heap.alloc_patch(PatchKind::Let { sym, value: Cell::none() }, next)
}

/// Make a use-patch over a context, linked onto `next`.  An empty context
/// adds nothing, so the chain is returned unchanged.
pub fn make_use_patch(
    vm: &mut Vm,
    ctx: ContextId,
    filter: UseFilter,
    next: Specifier,
) -> Specifier {
    let record = vm.heap.context(ctx);
    let empty = match record.kind {
        rill_gc::ContextKind::Module => record.mvars.is_empty(),
        _ => vm.heap.keylist(record.keylist).keys.is_empty(),
    };
    if empty {
        return next;
    }
    Specifier::Patch(vm.heap.alloc_patch(PatchKind::Use { ctx, filter }, next))
}

/// The chain a sub-cell should be seen under: the cell's own specifier when
/// it has one, merged under the feed's chain.
pub fn derive(vm: &mut Vm, own: Specifier, feed: Specifier) -> Specifier {
    if own.is_none() {
        return feed;
    }
    if feed.is_none() {
        return own;
    }
    if own == feed {
        return own;
    }
    merge(vm, feed, own)
}

/// True when `needle` appears as `chain` or one of its tails.
fn chain_contains(vm: &Vm, chain: Specifier, needle: Specifier) -> bool {
    let mut walk = chain;
    loop {
        if walk == needle {
            return true;
        }
        match walk {
            Specifier::Patch(p) => walk = vm.heap.patch(p).next,
            _ => return false,
        }
    }
}

/// Merge two chains, outer taking lookup precedence, inner spliced at the
/// tail.  If the outer chain already ends in the inner chain the outer is
/// reused as-is; rebuilt heads get the REUSED flag cleared and reused heads
/// get it set, so callers can skip redundant cache updates.
pub fn merge(vm: &mut Vm, outer: Specifier, inner: Specifier) -> Specifier {
    if inner.is_none() || outer == inner {
        mark_reused(vm, outer, true);
        return outer;
    }
    if outer.is_none() {
        return inner;
    }
    if chain_contains(vm, outer, inner) {
        mark_reused(vm, outer, true);
        return outer;
    }

    // Rebuild the outer run (down to its tail) as alias nodes over `inner`.
    let mut run = Vec::new();
    let mut walk = outer;
    let tail_frame = loop {
        match walk {
            Specifier::Patch(p) => {
                run.push(p);
                walk = vm.heap.patch(p).next;
            }
            Specifier::Frame(f) => break Some(f),
            Specifier::None => break None,
        }
    };

    // The inner chain supplies the new tail; if the outer had a frame tail
    // and the inner chain has none, the frame is preserved at the bottom.
    let mut next = match (tail_frame, chain_tail_frame(vm, inner)) {
        (Some(frame), None) => append_frame(vm, inner, frame),
        _ => inner,
    };
    for patch in run.into_iter().rev() {
        let kind = vm.heap.patch(patch).kind;
        let aliased = match kind {
            PatchKind::Use { ctx, filter } => {
                vm.heap.alloc_patch(PatchKind::Use { ctx, filter }, next)
            }
            _ => vm.heap.alloc_patch(PatchKind::Alias { target: patch }, next),
        };
        next = Specifier::Patch(aliased);
    }
    mark_reused(vm, next, false);
    next
}

/// The frame at the bottom of a chain, if any.
pub fn chain_tail_frame(vm: &Vm, chain: Specifier) -> Option<ContextId> {
    let mut walk = chain;
    loop {
        match walk {
            Specifier::Patch(p) => walk = vm.heap.patch(p).next,
            Specifier::Frame(f) => return Some(f),
            Specifier::None => return None,
        }
    }
}

/// Rebuild `chain` (which must be frameless) with `frame` as its tail.
fn append_frame(vm: &mut Vm, chain: Specifier, frame: ContextId) -> Specifier {
    let mut run = Vec::new();
    let mut walk = chain;
    loop {
        match walk {
            Specifier::Patch(p) => {
                run.push(p);
                walk = vm.heap.patch(p).next;
            }
            Specifier::None => break,
            Specifier::Frame(_) => return chain,
        }
    }
    let mut next = Specifier::Frame(frame);
    for patch in run.into_iter().rev() {
        let kind = vm.heap.patch(patch).kind;
        let aliased = match kind {
            PatchKind::Use { ctx, filter } => {
                vm.heap.alloc_patch(PatchKind::Use { ctx, filter }, next)
            }
            _ => vm.heap.alloc_patch(PatchKind::Alias { target: patch }, next),
        };
        next = Specifier::Patch(aliased);
    }
    next
}

fn mark_reused(vm: &mut Vm, chain: Specifier, reused: bool) {
    if let Specifier::Patch(p) = chain {
        let flags = &mut vm.heap.patch_mut(p).flags;
        if reused {
            flags.insert(SeriesFlags::REUSED);
        } else {
            flags.remove(SeriesFlags::REUSED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::sym;

    #[test]
    fn test_merge_reuses_when_inner_is_tail() {
        let mut vm = Vm::new();
        let inner = Specifier::Patch(make_let_patch(&mut vm, sym::VALUE, Specifier::None));
        let outer = Specifier::Patch(make_let_patch(&mut vm, sym::WORD, inner));
        let merged = merge(&mut vm, outer, inner);
        assert_eq!(merged, outer);
        if let Specifier::Patch(p) = merged {
            assert!(vm.heap.patch(p).flags.contains(SeriesFlags::REUSED));
        }
    }

    #[test]
    fn test_merge_rebuilds_disjoint_chains() {
        let mut vm = Vm::new();
        let a = make_let_patch(&mut vm, sym::VALUE, Specifier::None);
        let b = make_let_patch(&mut vm, sym::WORD, Specifier::None);
        let merged = merge(&mut vm, Specifier::Patch(a), Specifier::Patch(b));
        assert_ne!(merged, Specifier::Patch(a));

        // Outer symbol resolves through an alias to the same variable.
        let head = match merged {
            Specifier::Patch(p) => p,
            _ => panic!("expected patch chain"),
        };
        assert_eq!(vm.heap.patch_sym(head), Some(sym::VALUE));
        assert_eq!(vm.heap.patch_target(head), a);
        // And the tail is the inner chain.
        assert_eq!(vm.heap.patch(head).next, Specifier::Patch(b));
    }

    #[test]
    fn test_merge_preserves_frame_tail() {
        let mut vm = Vm::new();
        let kl = vm.heap.alloc_keylist(vec![], None);
        let frame = vm.heap.alloc_context(
            rill_gc::ContextKind::Frame,
            kl,
            vec![Cell::blank()],
            SeriesFlags::MANAGED,
        );
        let outer_head = make_let_patch(&mut vm, sym::WORD, Specifier::Frame(frame));
        let inner = Specifier::Patch(make_let_patch(&mut vm, sym::VALUE, Specifier::None));
        let merged = merge(&mut vm, Specifier::Patch(outer_head), inner);
        assert_eq!(chain_tail_frame(&vm, merged), Some(frame));
    }

    #[test]
    fn test_derive_prefers_own_then_feed() {
        let mut vm = Vm::new();
        let own = Specifier::Patch(make_let_patch(&mut vm, sym::VALUE, Specifier::None));
        assert_eq!(derive(&mut vm, Specifier::None, own), own);
        assert_eq!(derive(&mut vm, own, Specifier::None), own);
    }
}
