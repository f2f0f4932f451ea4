//! The scanner: source text to cells.
//!
//! A hand-rolled recursive scanner over bytes.  Structural characters are
//! `[ ] ( ) " ; ,` plus the quote / quasi / sigil prefixes; everything else
//! agglomerates into words, numbers, sequences, tags, and issues.  Newlines
//! set `NEWLINE_BEFORE` on the following cell so molds can preserve rough
//! line shape.

use rill_core::{sym, Cell, CellFlags, Error, Kind, RillResult, Specifier, SymbolTable};
use rill_gc::{Heap, SeriesFlags, StringData};

/// Scan a whole source string into a managed array of cells.
pub fn scan_block(heap: &mut Heap, symbols: &mut SymbolTable, source: &str) -> RillResult<rill_core::ArrayId> {
    let mut scanner = Scanner { bytes: source.as_bytes(), pos: 0, line: 1 };
    let cells = scanner.scan_many(heap, symbols, None)?;
    Ok(heap.alloc_array(cells, SeriesFlags::MANAGED))
}

struct Scanner<'s> {
    bytes: &'s [u8],
    pos: usize,
    line: u32,
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || matches!(b, b'+' | b'-' | b'*' | b'=' | b'<' | b'>' | b'!' | b'?' | b'&' | b'|' | b'_')
}

fn is_word_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(b, b'+' | b'-' | b'*' | b'=' | b'<' | b'>' | b'!' | b'?' | b'&' | b'|' | b'_' | b'\'')
}

impl<'s> Scanner<'s> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn error(&self, id: rill_core::SymId, what: &str) -> Error {
        Error::syntax(
            id,
            format!("{what} (line {{1}})"),
            vec![Cell::integer(self.line as i64)],
        )
    }

    /// Skip whitespace and comments; report whether a newline was crossed.
    fn skip_space(&mut self) -> bool {
        let mut saw_newline = false;
        loop {
            match self.peek() {
                Some(b'\n') => {
                    saw_newline = true;
                    self.bump();
                }
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b';') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return saw_newline,
            }
        }
    }

    /// Scan values until `until` (or end of input when `None`).
    fn scan_many(
        &mut self,
        heap: &mut Heap,
        symbols: &mut SymbolTable,
        until: Option<u8>,
    ) -> RillResult<Vec<Cell>> {
        let mut cells = Vec::new();
        loop {
            let saw_newline = self.skip_space();
            match self.peek() {
                None => {
                    if let Some(close) = until {
                        return Err(self.error(
                            sym::SCAN_MISSING,
                            &format!("missing closing {}", close as char),
                        ));
                    }
                    return Ok(cells);
                }
                Some(b) if Some(b) == until => {
                    self.bump();
                    return Ok(cells);
                }
                Some(b']') | Some(b')') => {
                    return Err(self.error(sym::SCAN_EXTRA, "unexpected closing delimiter"));
                }
                _ => {
                    let mut cell = self.scan_one(heap, symbols)?;
                    if saw_newline && !cells.is_empty() {
                        cell.flags |= CellFlags::NEWLINE_BEFORE;
                    }
                    cells.push(cell);
                }
            }
        }
    }

    /// Scan a single value (after whitespace).
    fn scan_one(&mut self, heap: &mut Heap, symbols: &mut SymbolTable) -> RillResult<Cell> {
        let b = self.peek().expect("scan_one at end");

        // Quote prefix: count levels, then quote whatever follows.
        if b == b'\'' {
            let mut depth: u8 = 0;
            while self.peek() == Some(b'\'') {
                self.bump();
                depth += 1;
            }
            let inner = self.scan_one(heap, symbols)?;
            return Ok(inner.quotify(depth));
        }

        // Quasiform: ~word~ (or bare `~` which is quasi-blank).
        if b == b'~' {
            self.bump();
            if self.peek().map(is_word_start).unwrap_or(false) {
                let word = self.scan_token(heap, symbols)?;
                if self.peek() == Some(b'~') {
                    self.bump();
                    if word.kind() == Kind::Word {
                        return Ok(word.quasify());
                    }
                }
                return Err(self.error(sym::SCAN_INVALID, "malformed quasiform"));
            }
            return Ok(Cell::blank().quasify());
        }

        match b {
            b'[' => {
                self.bump();
                let cells = self.scan_many(heap, symbols, Some(b']'))?;
                let array = heap.alloc_array(cells, SeriesFlags::MANAGED);
                Ok(Cell::block(array, Specifier::None))
            }
            b'(' => {
                self.bump();
                let cells = self.scan_many(heap, symbols, Some(b')'))?;
                let array = heap.alloc_array(cells, SeriesFlags::MANAGED);
                Ok(Cell::group(array, Specifier::None))
            }
            b',' => {
                self.bump();
                Ok(Cell::comma())
            }
            b'&' if matches!(self.peek_at(1), Some(b'[') | Some(b'(')) => {
                self.bump();
                let (close, kind) = if self.peek() == Some(b'[') {
                    (b']', Kind::TypeBlock)
                } else {
                    (b')', Kind::TypeGroup)
                };
                self.bump();
                let cells = self.scan_many(heap, symbols, Some(close))?;
                let array = heap.alloc_array(cells, SeriesFlags::MANAGED);
                Ok(Cell::any_array(kind, array, Specifier::None))
            }
            b'"' => self.scan_string(heap),
            b'#' => {
                self.bump();
                if self.peek() == Some(b'{') {
                    self.scan_binary(heap)
                } else {
                    // #issue
                    let start = self.pos;
                    while self.peek().map(is_word_continue).unwrap_or(false) {
                        self.bump();
                    }
                    let text = std::str::from_utf8(&self.bytes[start..self.pos])
                        .map_err(|_| self.error(sym::SCAN_INVALID, "invalid UTF-8 in issue"))?
                        .to_string();
                    let string = heap.alloc_text(text, SeriesFlags::MANAGED);
                    Ok(Cell::any_string(Kind::Issue, string))
                }
            }
            b'<' => self.scan_tag_or_word(heap, symbols),
            b':' => {
                // :word or :path
                self.bump();
                let inner = self.scan_token(heap, symbols)?;
                match inner.kind() {
                    Kind::Word => Ok(Cell::any_word(Kind::GetWord, inner.word_sym().expect("word"))),
                    Kind::Path => {
                        let (array, index, specifier) = inner.series().expect("path");
                        Ok(Cell::any_array_at(Kind::GetPath, array, index, specifier))
                    }
                    _ => Err(self.error(sym::SCAN_INVALID, "bad get-word")),
                }
            }
            b'^' => {
                self.bump();
                let inner = self.scan_token(heap, symbols)?;
                match inner.kind() {
                    Kind::Word => Ok(Cell::any_word(Kind::MetaWord, inner.word_sym().expect("word"))),
                    _ => Err(self.error(sym::SCAN_INVALID, "bad meta-word")),
                }
            }
            b'/' => {
                // Leading-slash path: blank-headed, hence inert.
                self.bump();
                let rest = self.scan_token(heap, symbols)?;
                let mut cells = vec![Cell::blank()];
                match rest.kind() {
                    Kind::Path => {
                        let (array, _, _) = rest.series().expect("path");
                        cells.extend(heap.array(array).cells.iter().copied());
                    }
                    _ => cells.push(rest),
                }
                let array = heap.alloc_array(cells, SeriesFlags::MANAGED);
                Ok(Cell::any_array(Kind::Path, array, Specifier::None))
            }
            _ => self.scan_token(heap, symbols),
        }
    }

    /// Scan a word / number / sequence token (no prefix sigils).
    fn scan_token(&mut self, heap: &mut Heap, symbols: &mut SymbolTable) -> RillResult<Cell> {
        let first = self.scan_element(heap, symbols, false)?;

        // Sequence gathering: `/` makes paths, `.` makes tuples (no mixing).
        let sep = match self.peek() {
            Some(b'/') => Some((b'/', Kind::Path)),
            Some(b'.') if first.kind() != Kind::Decimal => Some((b'.', Kind::Tuple)),
            _ => None,
        };
        let mut cell = if let Some((sep, kind)) = sep {
            let in_tuple = kind == Kind::Tuple;
            let mut cells = vec![first];
            while self.peek() == Some(sep) {
                self.bump();
                cells.push(self.scan_element(heap, symbols, in_tuple)?);
            }
            let array = heap.alloc_array(cells, SeriesFlags::MANAGED);
            heap.freeze_array(array); // sequences are immutable
            Cell::any_array(kind, array, Specifier::None)
        } else {
            first
        };

        // Trailing colon: set-word / set-path.
        if self.peek() == Some(b':') {
            match cell.kind() {
                Kind::Word => {
                    self.bump();
                    cell = Cell::any_word(Kind::SetWord, cell.word_sym().expect("word"));
                }
                Kind::Path => {
                    self.bump();
                    let (array, index, specifier) = cell.series().expect("path");
                    cell = Cell::any_array_at(Kind::SetPath, array, index, specifier);
                }
                _ => {}
            }
        }
        Ok(cell)
    }

    /// One sequence element: word, number, group, or blank.  Inside a tuple,
    /// dots separate elements, so numbers may not consume them as decimals.
    fn scan_element(
        &mut self,
        heap: &mut Heap,
        symbols: &mut SymbolTable,
        in_tuple: bool,
    ) -> RillResult<Cell> {
        match self.peek() {
            Some(b'(') => {
                self.bump();
                let cells = self.scan_many(heap, symbols, Some(b')'))?;
                let array = heap.alloc_array(cells, SeriesFlags::MANAGED);
                Ok(Cell::group(array, Specifier::None))
            }
            Some(b'_') => {
                self.bump();
                Ok(Cell::blank())
            }
            Some(b) if b.is_ascii_digit() => self.scan_number(1, in_tuple),
            Some(b'-') if self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) => {
                self.bump();
                self.scan_number(-1, in_tuple)
            }
            Some(b) if is_word_start(b) => {
                let start = self.pos;
                while self.peek().map(is_word_continue).unwrap_or(false) {
                    self.bump();
                }
                let spelling = std::str::from_utf8(&self.bytes[start..self.pos])
                    .map_err(|_| self.error(sym::SCAN_INVALID, "invalid UTF-8 in word"))?;
                Ok(Cell::word(symbols.intern(spelling)))
            }
            _ => Err(self.error(sym::SCAN_INVALID, "unrecognized token")),
        }
    }

    fn scan_number(&mut self, sign: i64, in_tuple: bool) -> RillResult<Cell> {
        let start = self.pos;
        while self.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
            self.bump();
        }
        // One dot followed by digits makes a decimal; a second dot would be a
        // tuple, which the element scanner handles (digits-only elements).
        if !in_tuple
            && self.peek() == Some(b'.')
            && self.peek_at(1).map(|b| b.is_ascii_digit()).unwrap_or(false)
        {
            let dot = self.pos;
            self.bump();
            while self.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
                self.bump();
            }
            if self.peek() == Some(b'.') {
                // Tuple like 1.2.3: rewind to the first dot; yield the integer.
                self.pos = dot;
            } else {
                let text = std::str::from_utf8(&self.bytes[start..self.pos]).expect("digits");
                let n: f64 = text
                    .parse()
                    .map_err(|_| self.error(sym::SCAN_INVALID, "bad decimal"))?;
                return Ok(Cell::decimal(n * sign as f64));
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).expect("digits");
        let n: i64 = text
            .parse()
            .map_err(|_| self.error(sym::SCAN_INVALID, "integer overflow"))?;
        Ok(Cell::integer(n * sign))
    }

    fn scan_string(&mut self, heap: &mut Heap) -> RillResult<Cell> {
        self.bump(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.error(sym::SCAN_MISSING, "unterminated string")),
                Some(b'"') => break,
                Some(b'^') => match self.bump() {
                    Some(b'"') => bytes.push(b'"'),
                    Some(b'^') => bytes.push(b'^'),
                    Some(b'/') => bytes.push(b'\n'),
                    Some(b'-') => bytes.push(b'\t'),
                    _ => return Err(self.error(sym::SCAN_INVALID, "bad escape in string")),
                },
                Some(b) => bytes.push(b),
            }
        }
        let text = String::from_utf8(bytes)
            .map_err(|_| self.error(sym::SCAN_INVALID, "invalid UTF-8 in string"))?;
        let string = heap.alloc_text(text, SeriesFlags::MANAGED);
        Ok(Cell::text(string))
    }

    fn scan_binary(&mut self, heap: &mut Heap) -> RillResult<Cell> {
        self.bump(); // `{`
        let mut nibbles = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.error(sym::SCAN_MISSING, "unterminated binary")),
                Some(b'}') => break,
                Some(b) if b.is_ascii_hexdigit() => {
                    nibbles.push((b as char).to_digit(16).expect("hex digit") as u8)
                }
                Some(b) if b.is_ascii_whitespace() => {}
                Some(_) => return Err(self.error(sym::SCAN_INVALID, "bad hex digit in binary")),
            }
        }
        if nibbles.len() % 2 != 0 {
            return Err(self.error(sym::SCAN_INVALID, "odd number of hex digits in binary"));
        }
        let bytes = nibbles.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect();
        let string = heap.alloc_string(StringData::Bytes(bytes), SeriesFlags::MANAGED);
        Ok(Cell::any_string(Kind::Binary, string))
    }

    fn scan_tag_or_word(&mut self, heap: &mut Heap, symbols: &mut SymbolTable) -> RillResult<Cell> {
        // `<` begins a TAG! when the next character could begin tag content;
        // otherwise it's the `<` / `<>` / `<=` word family.
        let next = self.peek_at(1);
        let tag_start = matches!(next, Some(b) if b.is_ascii_alphanumeric() || b == b'/' || b == b'-' || b == b'_');
        if !tag_start {
            let start = self.pos;
            self.bump();
            while self.peek().map(is_word_continue).unwrap_or(false) {
                self.bump();
            }
            let spelling = std::str::from_utf8(&self.bytes[start..self.pos]).expect("ascii");
            return Ok(Cell::word(symbols.intern(spelling)));
        }
        self.bump(); // `<`
        let start = self.pos;
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Err(self.error(sym::SCAN_MISSING, "unterminated tag"))
                }
                Some(b'>') => break,
                _ => {
                    self.bump();
                }
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| self.error(sym::SCAN_INVALID, "invalid UTF-8 in tag"))?
            .to_string();
        self.bump(); // `>`
        let string = heap.alloc_text(text, SeriesFlags::MANAGED);
        Ok(Cell::tag(string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_gc::GcConfig;

    fn scan_all(source: &str) -> (Heap, SymbolTable, Vec<Cell>) {
        let mut heap = Heap::new(GcConfig::default());
        let mut symbols = SymbolTable::new();
        let array = scan_block(&mut heap, &mut symbols, source).expect("scan");
        let cells = heap.array(array).cells.clone();
        (heap, symbols, cells)
    }

    #[test]
    fn test_scan_words_and_integers() {
        let (_, symbols, cells) = scan_all("foo 10 -3 bar");
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[0].word_sym().map(|s| symbols.spelling(s).to_string()),
            Some("foo".to_string()));
        assert_eq!(cells[1].as_int(), Some(10));
        assert_eq!(cells[2].as_int(), Some(-3));
    }

    #[test]
    fn test_scan_set_and_get_words() {
        let (_, _, cells) = scan_all("x: :y ^z");
        assert_eq!(cells[0].kind(), Kind::SetWord);
        assert_eq!(cells[1].kind(), Kind::GetWord);
        assert_eq!(cells[2].kind(), Kind::MetaWord);
    }

    #[test]
    fn test_scan_nested_blocks() {
        let (heap, _, cells) = scan_all("[a [b] (c)]");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].kind(), Kind::Block);
        let (array, _, _) = cells[0].series().expect("block");
        let inner = &heap.array(array).cells;
        assert_eq!(inner.len(), 3);
        assert_eq!(inner[1].kind(), Kind::Block);
        assert_eq!(inner[2].kind(), Kind::Group);
    }

    #[test]
    fn test_scan_path_and_set_path() {
        let (heap, _, cells) = scan_all("obj/a obj/a: a/(b)/c");
        assert_eq!(cells[0].kind(), Kind::Path);
        assert_eq!(cells[1].kind(), Kind::SetPath);
        let (array, _, _) = cells[2].series().expect("path");
        assert_eq!(heap.array(array).cells[1].kind(), Kind::Group);
    }

    #[test]
    fn test_scan_tuple_vs_decimal() {
        let (heap, _, cells) = scan_all("1.5 1.2.3 a.b");
        assert_eq!(cells[0].as_dec(), Some(1.5));
        assert_eq!(cells[1].kind(), Kind::Tuple);
        let (array, _, _) = cells[1].series().expect("tuple");
        assert_eq!(heap.array(array).cells.len(), 3);
        assert_eq!(cells[2].kind(), Kind::Tuple);
    }

    #[test]
    fn test_scan_quotes_and_quasi() {
        let (_, _, cells) = scan_all("'x ''y ~z~");
        assert_eq!(cells[0].quoting().depth(), 1);
        assert_eq!(cells[1].quoting().depth(), 2);
        assert!(cells[2].is_quasi());
        assert_eq!(cells[2].kind(), Kind::Word);
    }

    #[test]
    fn test_scan_string_and_tag() {
        let (heap, _, cells) = scan_all(r#""hello ^"quoted^"" <opt> < 3"#);
        let (string, _) = cells[0].string().expect("text");
        assert_eq!(heap.utf8(string), "hello \"quoted\"");
        assert_eq!(cells[1].kind(), Kind::Tag);
        assert_eq!(cells[2].kind(), Kind::Word); // bare `<`
        assert_eq!(cells[3].as_int(), Some(3));
    }

    #[test]
    fn test_scan_comma_and_comment() {
        let (_, _, cells) = scan_all("a, b ; trailing comment\nc");
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[1].kind(), Kind::Comma);
        assert!(cells[3].flags.contains(CellFlags::NEWLINE_BEFORE));
    }

    #[test]
    fn test_scan_leading_slash_path() {
        let (heap, _, cells) = scan_all("/only");
        assert_eq!(cells[0].kind(), Kind::Path);
        let (array, _, _) = cells[0].series().expect("path");
        assert_eq!(heap.array(array).cells[0].kind(), Kind::Blank);
    }

    #[test]
    fn test_scan_errors() {
        let mut heap = Heap::new(GcConfig::default());
        let mut symbols = SymbolTable::new();
        assert!(scan_block(&mut heap, &mut symbols, "[a b").is_err());
        assert!(scan_block(&mut heap, &mut symbols, "a]").is_err());
        assert!(scan_block(&mut heap, &mut symbols, "\"unterminated").is_err());
    }

    #[test]
    fn test_scan_binary() {
        let (heap, _, cells) = scan_all("#{DECAFBAD}");
        let (string, _) = cells[0].string().expect("binary");
        match &heap.string(string).data {
            StringData::Bytes(bytes) => assert_eq!(bytes, &vec![0xDE, 0xCA, 0xFB, 0xAD]),
            _ => panic!("expected bytes"),
        }
    }
}
