//! Symbol interning.
//!
//! Symbols are interned UTF-8 spellings; two symbols are equal iff their
//! [`SymId`]s are equal.  Interning is case-sensitive.  Symbols interned
//! during boot get fixed IDs, in table order, so native code can `match` on
//! them directly; everything interned later gets the next free ID.
//!
//! The ID `0` is reserved as invalid, so `SymId(0)` never names a spelling.

use rustc_hash::FxHashMap;

/// Identity of an interned symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymId(pub u32);

impl SymId {
    /// The reserved invalid symbol.
    pub const NONE: SymId = SymId(0);

    /// True for symbols with fixed boot-assigned IDs.
    #[inline]
    pub fn is_fixed(self) -> bool {
        self.0 != 0 && (self.0 as usize) <= FIXED_SYMBOLS.len()
    }
}

macro_rules! fixed_symbols {
    ($(($name:ident, $text:literal)),* $(,)?) => {
        #[allow(non_camel_case_types, dead_code, clippy::upper_case_acronyms)]
        #[repr(u32)]
        enum FixedTag { __ZERO, $($name),* }

        /// Fixed symbol IDs, assigned in boot order.
        #[allow(missing_docs)]
        pub mod sym {
            use super::{FixedTag, SymId};
            $(pub const $name: SymId = SymId(FixedTag::$name as u32);)*
        }

        /// Spellings of the fixed symbols, in ID order (index 0 is ID 1).
        pub static FIXED_SYMBOLS: &[&str] = &[$($text),*];
    };
}

fixed_symbols! {
    // Special-value words (antiform spellings)
    (NULL, "null"),
    (VOID, "void"),
    (TRUE, "true"),
    (FALSE, "false"),
    (NONE, "none"),

    // Reserved throw labels
    (BREAK, "break"),
    (CONTINUE, "continue"),
    (RETURN, "return"),
    (INTERRUPT, "interrupt"),
    (FAILURE, "failure"),

    // Datatype names
    (BLANK_X, "blank!"),
    (COMMA_X, "comma!"),
    (INTEGER_X, "integer!"),
    (DECIMAL_X, "decimal!"),
    (TEXT_X, "text!"),
    (TAG_X, "tag!"),
    (ISSUE_X, "issue!"),
    (BINARY_X, "binary!"),
    (WORD_X, "word!"),
    (SET_WORD_X, "set-word!"),
    (GET_WORD_X, "get-word!"),
    (META_WORD_X, "meta-word!"),
    (BLOCK_X, "block!"),
    (GROUP_X, "group!"),
    (PATH_X, "path!"),
    (SET_PATH_X, "set-path!"),
    (GET_PATH_X, "get-path!"),
    (TUPLE_X, "tuple!"),
    (TYPE_BLOCK_X, "type-block!"),
    (TYPE_GROUP_X, "type-group!"),
    (OBJECT_X, "object!"),
    (MODULE_X, "module!"),
    (FRAME_X, "frame!"),
    (ERROR_X, "error!"),
    (PORT_X, "port!"),
    (ACTION_X, "action!"),
    (DATATYPE_X, "datatype!"),
    (PARAMETER_X, "parameter!"),
    (HANDLE_X, "handle!"),

    // Typeset names
    (ANY_VALUE_X, "any-value!"),
    (ANY_WORD_X, "any-word!"),
    (ANY_ARRAY_X, "any-array!"),
    (ANY_SERIES_X, "any-series!"),
    (ANY_CONTEXT_X, "any-context!"),
    (ANY_PATH_X, "any-path!"),
    (ANY_NUMBER_X, "any-number!"),

    // Native names: binding
    (LET, "let"),
    (USE, "use"),
    (BIND, "bind"),
    (UNBIND, "unbind"),
    (INTERN_P, "intern*"),

    // Native names: evaluation and control
    (DO, "do"),
    (EVAL, "eval"),
    (IF, "if"),
    (EITHER, "either"),
    (CATCH, "catch"),
    (THROW, "throw"),
    (TRY, "try"),
    (FAIL, "fail"),
    (COMMENT, "comment"),
    (QUIT, "quit"),

    // Native names: functions and composition
    (FUNC, "func"),
    (LAMBDA, "lambda"),
    (SPECIALIZE, "specialize"),
    (ADAPT, "adapt"),
    (CHAIN, "chain"),
    (ENCLOSE, "enclose"),
    (HIJACK, "hijack"),
    (TYPECHECKER, "typechecker"),
    (ENFIX, "enfix"),

    // Native names: data
    (MAKE, "make"),
    (COPY, "copy"),
    (GET, "get"),
    (SET, "set"),
    (PICK, "pick"),
    (POKE, "poke"),
    (APPEND, "append"),
    (INSERT, "insert"),
    (LENGTH_OF, "length-of"),
    (FIRST, "first"),
    (THE, "the"),
    (MOLD, "mold"),
    (PRINT, "print"),
    (PROBE, "probe"),
    (TYPE_OF, "type-of"),
    (REDUCE, "reduce"),

    // Native names: loops
    (FOR_EACH, "for-each"),
    (REPEAT, "repeat"),
    (WHILE, "while"),
    (UNTIL, "until"),

    // Native names: math and comparison
    (ADD, "add"),
    (SUBTRACT, "subtract"),
    (MULTIPLY, "multiply"),
    (DIVIDE, "divide"),
    (EQUAL_Q, "equal?"),
    (NOT_EQUAL_Q, "not-equal?"),
    (LESSER_Q, "lesser?"),
    (GREATER_Q, "greater?"),
    (NOT, "not"),

    // Operator words (enfix aliases installed at boot)
    (PLUS, "+"),
    (MINUS, "-"),
    (STAR, "*"),
    (SLASH, "/"),
    (EQ_OP, "="),
    (NEQ_OP, "<>"),
    (LT_OP, "<"),
    (GT_OP, ">"),

    // Port verbs (also used as native names where applicable)
    (OPEN, "open"),
    (CLOSE, "close"),
    (READ, "read"),
    (WRITE, "write"),
    (QUERY, "query"),
    (DELETE, "delete"),
    (RENAME, "rename"),
    (CREATE, "create"),
    (SEEK, "seek"),
    (SKIP, "skip"),
    (CLEAR, "clear"),
    (REFLECT, "reflect"),
    (LENGTH, "length"),
    (HEAD_Q, "head?"),
    (TAIL_Q, "tail?"),

    // Common parameter and field names
    (VALUE, "value"),
    (SERIES, "series"),
    (CONDITION, "condition"),
    (BRANCH, "branch"),
    (BODY, "body"),
    (ACTION, "action"),
    (FRAME, "frame"),
    (WORD, "word"),
    (VARS, "vars"),
    (DATA, "data"),
    (COUNT, "count"),
    (NAME, "name"),
    (OBJECT, "object"),
    (SPEC, "spec"),
    (DEF, "def"),
    (VICTIM, "victim"),
    (HIJACKER, "hijacker"),
    (PRELUDE, "prelude"),
    (PIPELINE, "pipeline"),
    (INNER, "inner"),
    (OUTER, "outer"),
    (TARGET, "target"),
    (PICKER, "picker"),
    (LOCATION, "location"),
    (PORT, "port"),
    (TYPE, "type"),
    (ID, "id"),
    (MESSAGE, "message"),
    (ARGS, "args"),
    (SELF, "self"),
    (SYSTEM, "system"),
    (LIB, "lib"),
    (SYS, "sys"),
    (STATE, "state"),
    (OFFSET, "offset"),
    (SIZE, "size"),
    (SCHEME, "scheme"),
    (ONLY, "only"),
    (DUP, "dup"),
    (DEEP, "deep"),
    (PART, "part"),
    (LOGIC_Q, "logic?"),

    // Error IDs: internal
    (INVARIANT, "invariant"),
    (STACK_OVERFLOW, "stack-overflow"),
    (BALANCE_MISMATCH, "balance-mismatch"),
    (NOT_DONE, "not-done"),

    // Error IDs: syntax
    (SCAN_INVALID, "scan-invalid"),
    (SCAN_MISSING, "scan-missing"),
    (SCAN_EXTRA, "scan-extra"),

    // Error IDs: script
    (UNBOUND_WORD, "unbound-word"),
    (NOT_BOUND, "not-bound"),
    (NO_VALUE, "no-value"),
    (NEED_NON_END, "need-non-end"),
    (EXPECT_ARG, "expect-arg"),
    (MISSING_ARG, "missing-arg"),
    (BAD_REFINE, "bad-refine"),
    (BAD_PATH_PICK, "bad-path-pick"),
    (BAD_PATH_POKE, "bad-path-poke"),
    (BAD_MAKE_ARG, "bad-make-arg"),
    (BAD_VALUE, "bad-value"),
    (DUP_VARS, "dup-vars"),
    (NO_CATCH, "no-catch"),
    (BAD_WORD_GET, "bad-word-get"),
    (BAD_RETURN_TYPE, "bad-return-type"),
    (NO_LOGIC_TYPECHECK, "no-logic-typecheck"),
    (NO_ARG_TYPECHECK, "no-arg-typecheck"),

    // Error IDs: math
    (OVERFLOW, "overflow"),
    (ZERO_DIVIDE, "zero-divide"),
    (OUT_OF_RANGE, "out-of-range"),

    // Error IDs: access
    (PROTECTED_WORD, "protected-word"),
    (SERIES_FROZEN, "series-frozen"),
    (SERIES_INACCESSIBLE, "series-inaccessible"),
    (CONST_VALUE, "const-value"),
    (NO_PORT_ACTION, "no-port-action"),
    (PORT_CLOSED, "port-closed"),
}

/// Name of a fixed symbol, if the ID is in the fixed range.
pub fn fixed_sym_name(id: SymId) -> Option<&'static str> {
    if id.0 == 0 {
        return None;
    }
    FIXED_SYMBOLS.get(id.0 as usize - 1).copied()
}

/// The interning table.  One per interpreter; never shared.
#[derive(Debug)]
pub struct SymbolTable {
    spellings: Vec<Box<str>>,
    by_spelling: FxHashMap<Box<str>, SymId>,
}

impl SymbolTable {
    /// Create a table with all fixed symbols pre-interned in ID order.
    pub fn new() -> SymbolTable {
        let mut table = SymbolTable {
            spellings: Vec::with_capacity(FIXED_SYMBOLS.len() + 64),
            by_spelling: FxHashMap::default(),
        };
        table.spellings.push("".into()); // SymId(0) is invalid
        for (i, text) in FIXED_SYMBOLS.iter().enumerate() {
            let id = table.intern(text);
            debug_assert_eq!(id.0 as usize, i + 1, "fixed symbol table out of order");
        }
        table
    }

    /// Intern a spelling, returning the existing ID if already present.
    pub fn intern(&mut self, spelling: &str) -> SymId {
        if let Some(&id) = self.by_spelling.get(spelling) {
            return id;
        }
        let id = SymId(self.spellings.len() as u32);
        self.spellings.push(spelling.into());
        self.by_spelling.insert(spelling.into(), id);
        id
    }

    /// Look up a spelling without interning.
    pub fn try_id(&self, spelling: &str) -> Option<SymId> {
        self.by_spelling.get(spelling).copied()
    }

    /// The spelling of an interned symbol.
    pub fn spelling(&self, id: SymId) -> &str {
        &self.spellings[id.0 as usize]
    }

    /// Number of interned symbols (excluding the invalid 0 slot).
    pub fn len(&self) -> usize {
        self.spellings.len() - 1
    }

    /// True if only the invalid slot exists (never the case after `new`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_ids_match_table() {
        let table = SymbolTable::new();
        assert_eq!(table.spelling(sym::NULL), "null");
        assert_eq!(table.spelling(sym::BLANK_X), "blank!");
        assert_eq!(table.spelling(sym::FOR_EACH), "for-each");
        assert_eq!(table.try_id("specialize"), Some(sym::SPECIALIZE));
        assert_eq!(fixed_sym_name(sym::ZERO_DIVIDE), Some("zero-divide"));
    }

    #[test]
    fn test_intern_is_identity_preserving() {
        let mut table = SymbolTable::new();
        let a = table.intern("my-word");
        let b = table.intern("my-word");
        assert_eq!(a, b);
        assert!(!a.is_fixed());
        // Case-sensitive: a different casing is a different symbol.
        let c = table.intern("My-Word");
        assert_ne!(a, c);
    }

    #[test]
    fn test_invalid_id_has_no_name() {
        assert_eq!(fixed_sym_name(SymId::NONE), None);
    }
}
