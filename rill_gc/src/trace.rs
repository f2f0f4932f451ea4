//! Marking and sweeping.
//!
//! Marking is payload-driven: a cell's payload says exactly which handles it
//! holds, so there is a single trace function for cells and one per record
//! flavor.  The interpreter gathers root cells (they are `Copy`) plus root
//! node ids and calls [`Heap::collect`] between trampoline iterations.

use rill_core::{
    ArrayId, Binding, Cell, ContextId, DetailsId, KeylistId, PatchId, Payload, Specifier, StringId,
};

use crate::heap::{ContextKind, Heap, PatchKind, SeriesFlags};

/// Identity of any heap record, for the mark worklist and root lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeId {
    /// Cell array.
    Array(ArrayId),
    /// String series.
    String(StringId),
    /// Keylist.
    Keylist(KeylistId),
    /// Context.
    Context(ContextId),
    /// Action details.
    Details(DetailsId),
    /// Patch.
    Patch(PatchId),
}

/// What a sweep did, reported back to the interpreter so it can run
/// finalization hooks (e.g. close ports whose context was collected).
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Total records freed.
    pub freed: usize,
    /// Port contexts that were collected (close-on-GC hooks fire for these).
    pub freed_ports: Vec<ContextId>,
}

struct Marker {
    work: Vec<NodeId>,
    marked: usize,
}

impl Marker {
    fn push(&mut self, node: NodeId) {
        self.work.push(node);
    }

    fn mark_cell(&mut self, cell: &Cell) {
        match *cell.payload() {
            Payload::None | Payload::Int(_) | Payload::Dec(_) | Payload::Datatype(_)
            | Payload::Handle(_) => {}
            Payload::Word { binding, .. } => self.mark_binding(binding),
            Payload::Series { array, specifier, .. } => {
                self.push(NodeId::Array(array));
                self.mark_specifier(specifier);
            }
            Payload::Text { string, .. } => self.push(NodeId::String(string)),
            Payload::Context(id) => self.push(NodeId::Context(id)),
            Payload::Action { details, binding } => {
                self.push(NodeId::Details(details));
                if let Some(ctx) = binding {
                    self.push(NodeId::Context(ctx));
                }
            }
            Payload::Parameter { spec, .. } => {
                if let Some(array) = spec {
                    self.push(NodeId::Array(array));
                }
            }
        }
    }

    fn mark_binding(&mut self, binding: Binding) {
        match binding {
            Binding::Unbound => {}
            Binding::Context(id) => self.push(NodeId::Context(id)),
            Binding::Patch(id) => self.push(NodeId::Patch(id)),
            Binding::Relative(id) => self.push(NodeId::Details(id)),
        }
    }

    fn mark_specifier(&mut self, specifier: Specifier) {
        match specifier {
            Specifier::None => {}
            Specifier::Patch(id) => self.push(NodeId::Patch(id)),
            Specifier::Frame(id) => self.push(NodeId::Context(id)),
        }
    }
}

impl Heap {
    fn clear_marks(&mut self) {
        for (_, r) in self.arrays.iter_mut() {
            r.flags.remove(SeriesFlags::MARK);
        }
        for (_, r) in self.strings.iter_mut() {
            r.flags.remove(SeriesFlags::MARK);
        }
        for (_, r) in self.keylists.iter_mut() {
            r.flags.remove(SeriesFlags::MARK);
        }
        for (_, r) in self.contexts.iter_mut() {
            r.flags.remove(SeriesFlags::MARK);
        }
        for (_, r) in self.details.iter_mut() {
            r.flags.remove(SeriesFlags::MARK);
        }
        for (_, r) in self.patches.iter_mut() {
            r.flags.remove(SeriesFlags::MARK);
        }
    }

    /// Mark the node if unmarked; on first visit, trace its contents into
    /// the marker's worklist.
    fn visit(&mut self, marker: &mut Marker, node: NodeId) {
        match node {
            NodeId::Array(id) => {
                let record = self.arrays.get_mut(id.0);
                if record.flags.contains(SeriesFlags::MARK) {
                    return;
                }
                record.flags |= SeriesFlags::MARK;
                marker.marked += 1;
                // Cells are Copy; a short borrow-free walk keeps this simple.
                for i in 0..self.arrays.get(id.0).cells.len() {
                    let cell = self.arrays.get(id.0).cells[i];
                    marker.mark_cell(&cell);
                }
            }
            NodeId::String(id) => {
                let record = self.strings.get_mut(id.0);
                if !record.flags.contains(SeriesFlags::MARK) {
                    record.flags |= SeriesFlags::MARK;
                    marker.marked += 1;
                }
            }
            NodeId::Keylist(id) => {
                let record = self.keylists.get_mut(id.0);
                if record.flags.contains(SeriesFlags::MARK) {
                    return;
                }
                record.flags |= SeriesFlags::MARK;
                marker.marked += 1;
                let ancestor = record.ancestor;
                if ancestor != id {
                    marker.push(NodeId::Keylist(ancestor));
                }
            }
            NodeId::Context(id) => {
                let record = self.contexts.get_mut(id.0);
                if record.flags.contains(SeriesFlags::MARK) {
                    return;
                }
                record.flags |= SeriesFlags::MARK;
                marker.marked += 1;
                marker.push(NodeId::Keylist(record.keylist));
                if let Some(phase) = record.phase {
                    marker.push(NodeId::Details(phase));
                }
                if let Some(binding) = record.frame_binding {
                    marker.push(NodeId::Context(binding));
                }
                for patch in record.mvars.values() {
                    marker.push(NodeId::Patch(*patch));
                }
                for i in 0..self.contexts.get(id.0).vars.len() {
                    let cell = self.contexts.get(id.0).vars[i];
                    marker.mark_cell(&cell);
                }
            }
            NodeId::Details(id) => {
                let record = self.details.get_mut(id.0);
                if record.flags.contains(SeriesFlags::MARK) {
                    return;
                }
                record.flags |= SeriesFlags::MARK;
                marker.marked += 1;
                marker.push(NodeId::Context(record.exemplar));
                if let Some(adjunct) = record.adjunct {
                    marker.push(NodeId::Context(adjunct));
                }
                for i in 0..self.details.get(id.0).cells.len() {
                    let cell = self.details.get(id.0).cells[i];
                    marker.mark_cell(&cell);
                }
            }
            NodeId::Patch(id) => {
                let record = self.patches.get_mut(id.0);
                if record.flags.contains(SeriesFlags::MARK) {
                    return;
                }
                record.flags |= SeriesFlags::MARK;
                marker.marked += 1;
                let next = record.next;
                marker.mark_specifier(next);
                match &self.patches.get(id.0).kind {
                    PatchKind::Let { value, .. } => {
                        let value = *value;
                        marker.mark_cell(&value);
                    }
                    PatchKind::Use { ctx, .. } => {
                        let ctx = *ctx;
                        marker.push(NodeId::Context(ctx));
                    }
                    PatchKind::ModuleVar { module, value, .. } => {
                        let (module, value) = (*module, *value);
                        marker.push(NodeId::Context(module));
                        marker.mark_cell(&value);
                    }
                    PatchKind::Alias { target } => {
                        let target = *target;
                        marker.push(NodeId::Patch(target));
                    }
                }
            }
        }
    }

    /// One full mark/sweep cycle over the given roots.
    ///
    /// `root_cells` are copies of every live cell outside the heap (stacks,
    /// outputs, throw slots, API handles); `root_nodes` are record handles
    /// rooted directly (sys/lib modules, level varlists, feed arrays).
    pub fn collect(&mut self, root_cells: &[Cell], root_nodes: &[NodeId]) -> SweepReport {
        let mut marker = Marker { work: Vec::with_capacity(256), marked: 0 };

        self.clear_marks();
        for cell in root_cells {
            marker.mark_cell(cell);
        }
        for node in root_nodes {
            marker.push(*node);
        }
        while let Some(node) = marker.work.pop() {
            self.visit(&mut marker, node);
        }

        let report = self.sweep();
        self.stats.collections += 1;
        self.stats.last_marked = marker.marked;
        self.stats.last_freed = report.freed;
        self.stats.freed_total += report.freed as u64;
        self.allocs_since_collect = 0;
        log::debug!(
            "gc cycle {}: {} marked, {} freed ({} ports)",
            self.stats.collections,
            marker.marked,
            report.freed,
            report.freed_ports.len()
        );
        report
    }

    fn sweep(&mut self) -> SweepReport {
        let mut report = SweepReport::default();
        let sweepable =
            |flags: SeriesFlags| flags.contains(SeriesFlags::MANAGED) && !flags.contains(SeriesFlags::MARK);

        for index in self.arrays.live_indices() {
            if sweepable(self.arrays.get(index).flags) {
                self.arrays.remove(index);
                report.freed += 1;
            }
        }
        for index in self.strings.live_indices() {
            if sweepable(self.strings.get(index).flags) {
                self.strings.remove(index);
                report.freed += 1;
            }
        }
        for index in self.keylists.live_indices() {
            if sweepable(self.keylists.get(index).flags) {
                self.keylists.remove(index);
                report.freed += 1;
            }
        }
        for index in self.contexts.live_indices() {
            if sweepable(self.contexts.get(index).flags) {
                if self.contexts.get(index).kind == ContextKind::Port {
                    report.freed_ports.push(ContextId(index));
                }
                self.contexts.remove(index);
                report.freed += 1;
            }
        }
        for index in self.details.live_indices() {
            if sweepable(self.details.get(index).flags) {
                self.details.remove(index);
                report.freed += 1;
            }
        }
        for index in self.patches.live_indices() {
            if sweepable(self.patches.get(index).flags) {
                self.patches.remove(index);
                report.freed += 1;
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::heap::{ContextKind, StringData};
    use rill_core::Specifier;

    fn heap() -> Heap {
        Heap::new(GcConfig::default())
    }

    #[test]
    fn test_unreachable_managed_array_is_swept() {
        let mut h = heap();
        let dead = h.alloc_array(vec![Cell::integer(1)], SeriesFlags::MANAGED);
        let live = h.alloc_array(vec![Cell::integer(2)], SeriesFlags::MANAGED);
        let root = Cell::block(live, Specifier::None);

        let report = h.collect(&[root], &[]);
        assert_eq!(report.freed, 1);
        assert!(h.arrays.contains(live.0));
        assert!(!h.arrays.contains(dead.0));
    }

    #[test]
    fn test_unmanaged_series_survive_sweep() {
        let mut h = heap();
        let manual = h.alloc_array(vec![], SeriesFlags::empty());
        h.collect(&[], &[]);
        assert!(h.arrays.contains(manual.0));
    }

    #[test]
    fn test_nested_reachability() {
        let mut h = heap();
        let inner = h.alloc_array(vec![Cell::integer(1)], SeriesFlags::MANAGED);
        let outer = h.alloc_array(
            vec![Cell::block(inner, Specifier::None)],
            SeriesFlags::MANAGED,
        );
        let root = Cell::block(outer, Specifier::None);
        let report = h.collect(&[root], &[]);
        assert_eq!(report.freed, 0);
        assert!(h.arrays.contains(inner.0));
    }

    #[test]
    fn test_context_traces_keylist_and_vars() {
        let mut h = heap();
        let text = h.alloc_string(StringData::Utf8("hi".into()), SeriesFlags::MANAGED);
        let kl = h.alloc_keylist(vec![rill_core::sym::VALUE], None);
        let ctx = h.alloc_context(
            ContextKind::Object,
            kl,
            vec![Cell::blank(), Cell::text(text)],
            SeriesFlags::MANAGED,
        );
        let report = h.collect(&[], &[NodeId::Context(ctx)]);
        assert_eq!(report.freed, 0);
        assert!(h.strings.contains(text.0));
    }

    #[test]
    fn test_collected_port_is_reported() {
        let mut h = heap();
        let kl = h.alloc_keylist(vec![], None);
        let port = h.alloc_context(
            ContextKind::Port,
            kl,
            vec![Cell::blank()],
            SeriesFlags::MANAGED,
        );
        let report = h.collect(&[], &[]);
        assert_eq!(report.freed_ports, vec![port]);
    }

    #[test]
    fn test_patch_chain_is_traced() {
        let mut h = heap();
        let tail = h.alloc_patch(
            PatchKind::Let { sym: rill_core::sym::VALUE, value: Cell::integer(9) },
            Specifier::None,
        );
        let head = h.alloc_patch(
            PatchKind::Let { sym: rill_core::sym::WORD, value: Cell::blank() },
            Specifier::Patch(tail),
        );
        let report = h.collect(&[], &[NodeId::Patch(head)]);
        assert_eq!(report.freed, 0);
        assert!(h.patches.contains(tail.0));
    }
}
