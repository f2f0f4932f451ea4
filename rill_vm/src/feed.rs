//! Feeds: lazy, restartable sources of cells.
//!
//! A feed is either a view over a heap array or a variadic run of cells
//! supplied by the host/API, in both cases carrying the specifier that words
//! pulled from it resolve through.  Multiple levels share one feed while an
//! action gathers arguments, so feeds are reference-counted.
//!
//! `pending` lets a value be injected ahead of the source (re-evaluation,
//! LET's rebound set-word).  `gotten` caches the lookahead fetch of a word
//! so the enfix check and the subsequent evaluation agree on what they saw;
//! anything that changes bindings mid-stream must drop it.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rill_core::{ArrayId, Cell, Specifier};
use rill_gc::Heap;

/// Shared handle to a feed.
pub type FeedRef = Rc<RefCell<Feed>>;

enum FeedSource {
    Array { array: ArrayId, index: usize },
    Cells { cells: Vec<Cell>, index: usize },
}

/// A lazy cell source plus its specifier.
pub struct Feed {
    source: FeedSource,
    /// Specifier applied to cells pulled from this feed.  Mutated by LET and
    /// USE as they add bindings for the remainder of the stream.
    pub specifier: Specifier,
    /// Values injected ahead of the source.
    pub pending: VecDeque<Cell>,
    /// Lookahead cache: the resolved value of the word `peek` saw last.
    pub gotten: Option<Cell>,
}

impl Feed {
    /// Feed over a heap array starting at `index`.
    pub fn from_array(array: ArrayId, index: usize, specifier: Specifier) -> FeedRef {
        Rc::new(RefCell::new(Feed {
            source: FeedSource::Array { array, index },
            specifier,
            pending: VecDeque::new(),
            gotten: None,
        }))
    }

    /// Variadic feed over host-supplied cells.
    pub fn from_cells(cells: Vec<Cell>, specifier: Specifier) -> FeedRef {
        Rc::new(RefCell::new(Feed {
            source: FeedSource::Cells { cells, index: 0 },
            specifier,
            pending: VecDeque::new(),
            gotten: None,
        }))
    }

    /// An exhausted feed.
    pub fn empty() -> FeedRef {
        Feed::from_cells(Vec::new(), Specifier::None)
    }

    /// True when no more cells will come.
    pub fn at_end(&self, heap: &Heap) -> bool {
        if !self.pending.is_empty() {
            return false;
        }
        match &self.source {
            FeedSource::Array { array, index } => *index >= heap.array(*array).cells.len(),
            FeedSource::Cells { cells, index } => *index >= cells.len(),
        }
    }

    /// Copy of the next cell without advancing.
    pub fn peek(&self, heap: &Heap) -> Option<Cell> {
        if let Some(cell) = self.pending.front() {
            return Some(*cell);
        }
        match &self.source {
            FeedSource::Array { array, index } => heap.array(*array).cells.get(*index).copied(),
            FeedSource::Cells { cells, index } => cells.get(*index).copied(),
        }
    }

    /// Take the next cell, advancing the feed.
    pub fn next(&mut self, heap: &Heap) -> Option<Cell> {
        self.gotten = None;
        if let Some(cell) = self.pending.pop_front() {
            return Some(cell);
        }
        match &mut self.source {
            FeedSource::Array { array, index } => {
                let cell = heap.array(*array).cells.get(*index).copied();
                if cell.is_some() {
                    *index += 1;
                }
                cell
            }
            FeedSource::Cells { cells, index } => {
                let cell = cells.get(*index).copied();
                if cell.is_some() {
                    *index += 1;
                }
                cell
            }
        }
    }

    /// Inject a cell to be produced before the remaining source.
    pub fn inject(&mut self, cell: Cell) {
        self.gotten = None;
        self.pending.push_front(cell);
    }

    /// The backing array, if array-sourced (for GC rooting).
    pub fn backing_array(&self) -> Option<ArrayId> {
        match &self.source {
            FeedSource::Array { array, .. } => Some(*array),
            FeedSource::Cells { .. } => None,
        }
    }

    /// Remaining variadic cells (for GC rooting of cell-sourced feeds).
    pub fn variadic_cells(&self) -> &[Cell] {
        match &self.source {
            FeedSource::Cells { cells, index } => cells.get(*index..).unwrap_or(&[]),
            FeedSource::Array { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_gc::{GcConfig, SeriesFlags};

    #[test]
    fn test_array_feed_advances() {
        let mut heap = Heap::new(GcConfig::default());
        let array = heap.alloc_array(
            vec![Cell::integer(1), Cell::integer(2)],
            SeriesFlags::MANAGED,
        );
        let feed = Feed::from_array(array, 0, Specifier::None);
        let mut feed = feed.borrow_mut();
        assert!(!feed.at_end(&heap));
        assert_eq!(feed.peek(&heap).and_then(|c| c.as_int()), Some(1));
        assert_eq!(feed.next(&heap).and_then(|c| c.as_int()), Some(1));
        assert_eq!(feed.next(&heap).and_then(|c| c.as_int()), Some(2));
        assert!(feed.at_end(&heap));
        assert_eq!(feed.next(&heap), None);
    }

    #[test]
    fn test_injection_comes_first() {
        let heap = Heap::new(GcConfig::default());
        let feed = Feed::from_cells(vec![Cell::integer(9)], Specifier::None);
        let mut feed = feed.borrow_mut();
        feed.inject(Cell::integer(1));
        assert_eq!(feed.next(&heap).and_then(|c| c.as_int()), Some(1));
        assert_eq!(feed.next(&heap).and_then(|c| c.as_int()), Some(9));
    }

    #[test]
    fn test_next_clears_gotten() {
        let heap = Heap::new(GcConfig::default());
        let feed = Feed::from_cells(vec![Cell::integer(1)], Specifier::None);
        let mut feed = feed.borrow_mut();
        feed.gotten = Some(Cell::integer(5));
        feed.next(&heap);
        assert!(feed.gotten.is_none());
    }
}
