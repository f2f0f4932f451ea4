//! The embedding API.
//!
//! Hosts construct and release GC-rooted value handles, evaluate source,
//! and extract data from result cells.  Raised errors surface as
//! [`RunFailure::Error`]; uncaught throws surface with their label and
//! value so the host can distinguish interrupts from script bugs.

use rill_core::{Cell, Error, Kind, Specifier};
use rill_gc::SeriesFlags;

use crate::interp::Vm;
use crate::level::VmSignal;

/// A GC root handed to the host.  Valid until released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApiHandle(usize);

/// How an evaluation failed, from the host's point of view.
#[derive(Debug)]
pub enum RunFailure {
    /// A raised error reached the top without being defused.
    Error(Error),
    /// A throw reached the top without a catch.
    Thrown {
        /// The throw's label cell.
        label: Cell,
        /// The thrown value.
        value: Cell,
    },
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunFailure::Error(err) => write!(f, "{err}"),
            RunFailure::Thrown { .. } => write!(f, "** uncaught throw"),
        }
    }
}

impl std::error::Error for RunFailure {}

impl Vm {
    /// Root a cell for the host; it survives collections until released.
    pub fn alloc_handle(&mut self, cell: Cell) -> ApiHandle {
        for (i, slot) in self.api_handles.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(cell);
                return ApiHandle(i);
            }
        }
        self.api_handles.push(Some(cell));
        ApiHandle(self.api_handles.len() - 1)
    }

    /// Read a rooted cell.
    pub fn handle_cell(&self, handle: ApiHandle) -> Option<Cell> {
        self.api_handles.get(handle.0).copied().flatten()
    }

    /// Release a rooted cell.
    pub fn release_handle(&mut self, handle: ApiHandle) {
        if let Some(slot) = self.api_handles.get_mut(handle.0) {
            *slot = None;
        }
    }

    /// Evaluate source text, mapping the signal space into host-visible
    /// failures.
    pub fn run(&mut self, source: &str) -> Result<Cell, RunFailure> {
        match self.run_source(source) {
            Ok(value) => Ok(value),
            Err(VmSignal::Error(err)) => Err(RunFailure::Error(err)),
            Err(VmSignal::Thrown) => {
                let (label, value) = self.take_throw();
                Err(RunFailure::Thrown { label, value })
            }
        }
    }

    /// UTF-8 spelling of a word or string cell.
    pub fn spell(&self, cell: &Cell) -> Option<String> {
        if cell.kind().is_word() {
            return cell.word_sym().map(|s| self.symbols.spelling(s).to_string());
        }
        if cell.kind().is_string() {
            let (string, index) = cell.string()?;
            return Some(self.heap.utf8(string).get(index as usize..)?.to_string());
        }
        None
    }

    /// Extract an INTEGER! cell's value.
    pub fn unbox_integer(&self, cell: &Cell) -> Option<i64> {
        if cell.is(Kind::Integer) {
            cell.as_int()
        } else {
            None
        }
    }

    /// Build a block from items, splicing [`BlockItem::Splice`] entries.
    pub fn build_block(&mut self, items: Vec<BlockItem>) -> Cell {
        let mut cells = Vec::with_capacity(items.len());
        for item in items {
            match item {
                BlockItem::Value(cell) => cells.push(cell.reified()),
                BlockItem::Splice(block) => {
                    if let Some((array, index, _)) = block.series() {
                        cells.extend(
                            self.heap.array(array).cells[index as usize..].iter().copied(),
                        );
                    }
                }
            }
        }
        let array = self.heap.alloc_array(cells, SeriesFlags::MANAGED);
        Cell::block(array, Specifier::None)
    }
}

/// Input to [`Vm::build_block`].
pub enum BlockItem {
    /// One cell, appended as-is (antiforms are reified).
    Value(Cell),
    /// A block whose contents are spliced in place.
    Splice(Cell),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_and_unbox() {
        let mut vm = Vm::new();
        let result = vm.run("1 + 2").expect("run");
        assert_eq!(vm.unbox_integer(&result), Some(3));
    }

    #[test]
    fn test_handles_survive_collection() {
        let mut vm = Vm::new();
        let result = vm.run("append [] 10").expect("run");
        let handle = vm.alloc_handle(result);
        vm.collect_garbage();
        let cell = vm.handle_cell(handle).expect("rooted");
        let (array, _, _) = cell.series().expect("block");
        assert_eq!(vm.heap.array(array).cells[0].as_int(), Some(10));
        vm.release_handle(handle);
    }

    #[test]
    fn test_spell() {
        let mut vm = Vm::new();
        let word = Cell::word(vm.intern("greetings"));
        assert_eq!(vm.spell(&word).as_deref(), Some("greetings"));
    }

    #[test]
    fn test_thrown_failure_carries_label() {
        let mut vm = Vm::new();
        let failure = vm.run("throw/name 3 'escape").expect_err("uncaught");
        match failure {
            RunFailure::Thrown { label, value } => {
                assert_eq!(vm.spell(&label).as_deref(), Some("escape"));
                assert_eq!(value.as_int(), Some(3));
            }
            other => panic!("expected throw, got {other:?}"),
        }
    }

    #[test]
    fn test_build_block_with_splice() {
        let mut vm = Vm::new();
        let inner = vm.run("[b c]").expect("run");
        let block = vm.build_block(vec![
            BlockItem::Value(Cell::integer(1)),
            BlockItem::Splice(inner),
            BlockItem::Value(Cell::integer(2)),
        ]);
        assert_eq!(vm.mold(&block), "[1 b c 2]");
    }
}
