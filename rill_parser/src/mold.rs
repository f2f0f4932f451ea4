//! The molder: cells back to canonical source.
//!
//! `mold` produces text the scanner reads back to the same value.  `form` is
//! the human-facing variant: strings lose their quotes, words lose nothing.
//! Antiforms have no source notation; they mold as their quasiform followed
//! by nothing (the caller decides whether to annotate), matching how raised
//! and special values are surfaced in messages.

use rill_core::{Cell, CellFlags, Kind, Lift, SymbolTable};
use rill_gc::{Heap, StringData};

/// Mold a cell to loadable text.
pub fn mold(heap: &Heap, symbols: &SymbolTable, cell: &Cell) -> String {
    let mut out = String::new();
    mold_into(heap, symbols, cell, &mut out);
    out
}

/// Form a cell: like mold but unadorned for strings.
pub fn form(heap: &Heap, symbols: &SymbolTable, cell: &Cell) -> String {
    if cell.is(Kind::Text) {
        if let Some((string, index)) = cell.string() {
            let text = heap.utf8(string);
            return text.get(index as usize..).unwrap_or("").to_string();
        }
    }
    mold(heap, symbols, cell)
}

/// Mold the elements of an array (no outer brackets), preserving rough line
/// breaks via NEWLINE_BEFORE flags.
pub fn mold_array(heap: &Heap, symbols: &SymbolTable, cells: &[Cell]) -> String {
    let mut out = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            if cell.flags.contains(CellFlags::NEWLINE_BEFORE) {
                out.push('\n');
            } else {
                out.push(' ');
            }
        }
        mold_into(heap, symbols, cell, &mut out);
    }
    out
}

fn mold_into(heap: &Heap, symbols: &SymbolTable, cell: &Cell, out: &mut String) {
    // Quoting prefix; antiforms render as their quasiform.
    for _ in 0..cell.quoting().depth() {
        out.push('\'');
    }
    let quasi = matches!(cell.quoting().lift(), Lift::Quasi | Lift::Anti);
    if quasi {
        out.push('~');
    }

    mold_heart(heap, symbols, cell, out);

    if quasi {
        // Bare quasi-blank molds as a single `~`.
        if cell.kind() != Kind::Blank {
            out.push('~');
        }
    }
}

fn mold_heart(heap: &Heap, symbols: &SymbolTable, cell: &Cell, out: &mut String) {
    match cell.kind() {
        Kind::Blank => {
            if !matches!(cell.quoting().lift(), Lift::Quasi | Lift::Anti) {
                out.push('_');
            }
        }
        Kind::Comma => out.push(','),
        Kind::Integer => {
            if let Some(n) = cell.as_int() {
                out.push_str(&n.to_string());
            }
        }
        Kind::Decimal => {
            if let Some(n) = cell.as_dec() {
                let text = n.to_string();
                out.push_str(&text);
                if !text.contains('.') && !text.contains('e') {
                    out.push_str(".0");
                }
            }
        }
        Kind::Text => {
            if let Some((string, index)) = cell.string() {
                out.push('"');
                let text = heap.utf8(string);
                for ch in text.chars().skip(index as usize) {
                    match ch {
                        '"' => out.push_str("^\""),
                        '^' => out.push_str("^^"),
                        '\n' => out.push_str("^/"),
                        '\t' => out.push_str("^-"),
                        ch => out.push(ch),
                    }
                }
                out.push('"');
            }
        }
        Kind::Tag => {
            if let Some((string, _)) = cell.string() {
                out.push('<');
                out.push_str(heap.utf8(string));
                out.push('>');
            }
        }
        Kind::Issue => {
            if let Some((string, _)) = cell.string() {
                out.push('#');
                out.push_str(heap.utf8(string));
            }
        }
        Kind::Binary => {
            if let Some((string, index)) = cell.string() {
                out.push_str("#{");
                if let StringData::Bytes(bytes) = &heap.string(string).data {
                    for byte in bytes.iter().skip(index as usize) {
                        out.push_str(&format!("{byte:02X}"));
                    }
                }
                out.push('}');
            }
        }
        Kind::Word | Kind::SetWord | Kind::GetWord | Kind::MetaWord => {
            if let Some(sym) = cell.word_sym() {
                match cell.kind() {
                    Kind::GetWord => out.push(':'),
                    Kind::MetaWord => out.push('^'),
                    _ => {}
                }
                out.push_str(symbols.spelling(sym));
                if cell.kind() == Kind::SetWord {
                    out.push(':');
                }
            }
        }
        Kind::Block | Kind::Group => {
            if let Some((array, index, _)) = cell.series() {
                let (open, close) = if cell.kind() == Kind::Block { ('[', ']') } else { ('(', ')') };
                out.push(open);
                let cells = &heap.array(array).cells;
                let slice = cells.get(index as usize..).unwrap_or(&[]);
                out.push_str(&mold_array(heap, symbols, slice));
                out.push(close);
            }
        }
        Kind::Path | Kind::SetPath | Kind::GetPath | Kind::Tuple => {
            if let Some((array, index, _)) = cell.series() {
                if cell.kind() == Kind::GetPath {
                    out.push(':');
                }
                let sep = if cell.kind() == Kind::Tuple { '.' } else { '/' };
                let cells = &heap.array(array).cells;
                let slice = cells.get(index as usize..).unwrap_or(&[]);
                for (i, element) in slice.iter().enumerate() {
                    if i > 0 {
                        out.push(sep);
                    }
                    // A blank head renders as nothing: `/foo` style.
                    if i == 0 && element.is(Kind::Blank) {
                        continue;
                    }
                    mold_into(heap, symbols, element, out);
                }
                if cell.kind() == Kind::SetPath {
                    out.push(':');
                }
            }
        }
        Kind::TypeBlock | Kind::TypeGroup => {
            if let Some((array, index, _)) = cell.series() {
                let (open, close) =
                    if cell.kind() == Kind::TypeBlock { ("&[", ']') } else { ("&(", ')') };
                out.push_str(open);
                let cells = &heap.array(array).cells;
                let slice = cells.get(index as usize..).unwrap_or(&[]);
                out.push_str(&mold_array(heap, symbols, slice));
                out.push(close);
            }
        }
        Kind::Object | Kind::Module | Kind::Frame | Kind::Error | Kind::Port => {
            mold_context(heap, symbols, cell, out);
        }
        Kind::Action => {
            out.push_str("#[action");
            if let Some((details, _)) = cell.action_parts() {
                if let Some(label) = heap.details(details).label {
                    out.push(' ');
                    out.push_str(symbols.spelling(label));
                }
            }
            out.push(']');
        }
        Kind::Datatype => {
            if let Some(kind) = cell.datatype_kind() {
                out.push_str(symbols.spelling(kind.datatype_sym()));
            }
        }
        Kind::Parameter => out.push_str("#[parameter]"),
        Kind::Handle => out.push_str("#[handle]"),
    }
}

fn mold_context(heap: &Heap, symbols: &SymbolTable, cell: &Cell, out: &mut String) {
    let Some(id) = cell.context() else { return };
    let label = match cell.kind() {
        Kind::Object => "object",
        Kind::Module => "module",
        Kind::Frame => "frame",
        Kind::Error => "error",
        _ => "port",
    };
    out.push_str("make ");
    out.push_str(label);
    out.push_str("! [");
    let Ok(record) = heap.context_accessible(id) else {
        out.push_str("...]");
        return;
    };
    let keys = heap.keylist(record.keylist).keys.clone();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(symbols.spelling(*key));
        out.push_str(": ");
        if let Some(var) = record.vars.get(i + 1) {
            mold_into(heap, symbols, &var.reified(), out);
        }
    }
    out.push(']');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::scan_block;
    use rill_gc::GcConfig;
    use rill_core::SymbolTable;

    fn roundtrip(source: &str) -> (String, String) {
        let mut heap = Heap::new(GcConfig::default());
        let mut symbols = SymbolTable::new();
        let array = scan_block(&mut heap, &mut symbols, source).expect("scan");
        let cells = heap.array(array).cells.clone();
        let molded = mold_array(&heap, &symbols, &cells);

        let rescanned = scan_block(&mut heap, &mut symbols, &molded).expect("rescan");
        let cells2 = heap.array(rescanned).cells.clone();
        let remolded = mold_array(&heap, &symbols, &cells2);
        (molded, remolded)
    }

    #[test]
    fn test_mold_roundtrip_fixpoint() {
        for source in [
            "foo 10 -3 1.5 \"hi\" [a b [c]] (x) 'q ''qq ~w~",
            "x: :y ^z obj/a obj/a: a/(b)/c 1.2.3",
            "<opt> <end> #issue #{C0FFEE} _ ,",
            "&[integer! block!] &(any-value!)",
        ] {
            let (molded, remolded) = roundtrip(source);
            assert_eq!(molded, remolded, "mold not a fixpoint for {source:?}");
        }
    }

    #[test]
    fn test_mold_specific_shapes() {
        let mut heap = Heap::new(GcConfig::default());
        let symbols = SymbolTable::new();
        assert_eq!(mold(&heap, &symbols, &Cell::integer(42)), "42");
        assert_eq!(mold(&heap, &symbols, &Cell::decimal(2.0)), "2.0");
        assert_eq!(mold(&heap, &symbols, &Cell::blank()), "_");
        assert_eq!(mold(&heap, &symbols, &Cell::nulled()), "~null~");
        assert_eq!(mold(&heap, &symbols, &Cell::word(rill_core::sym::VALUE)), "value");
        assert_eq!(
            mold(&heap, &symbols, &Cell::set_word(rill_core::sym::VALUE)),
            "value:"
        );
        let text = heap.alloc_text("a\"b", rill_gc::SeriesFlags::MANAGED);
        assert_eq!(mold(&heap, &symbols, &Cell::text(text)), "\"a^\"b\"");
    }

    #[test]
    fn test_form_strips_string_quotes() {
        let mut heap = Heap::new(GcConfig::default());
        let symbols = SymbolTable::new();
        let text = heap.alloc_text("plain", rill_gc::SeriesFlags::MANAGED);
        assert_eq!(form(&heap, &symbols, &Cell::text(text)), "plain");
    }
}
