//! The Cell: Rill's fixed-shape tagged value.
//!
//! A cell is `kind + quoting + flags + payload`.  The kind (the "heart") says
//! what the payload means; the quoting state is orthogonal and says how many
//! quote levels and which lift (plain/quasi/antiform) the value is under.
//! Constructors enforce the kind/payload pairing, and the payload alone
//! determines which heap handles the garbage collector must trace.
//!
//! Cells are `Copy`.  Copying a cell never copies the series it references.

use crate::handles::{ArrayId, Binding, ContextId, DetailsId, Specifier, StringId};
use crate::quoting::{Lift, Quoting};
use crate::symbol::{sym, SymId};

/// The heart byte: the concrete storage kind of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Kind {
    /// Placeholder value `_`.
    Blank,
    /// Expression barrier `,`.
    Comma,
    /// 64-bit integer.
    Integer,
    /// 64-bit float.
    Decimal,
    /// UTF-8 string.
    Text,
    /// `<tag>`.
    Tag,
    /// `#issue`.
    Issue,
    /// Byte series.
    Binary,
    /// `word`.
    Word,
    /// `word:`.
    SetWord,
    /// `:word`.
    GetWord,
    /// `^word`.
    MetaWord,
    /// `[...]`.
    Block,
    /// `(...)`.
    Group,
    /// `a/b/c`.
    Path,
    /// `a/b/c:`.
    SetPath,
    /// `:a/b/c`.
    GetPath,
    /// `a.b.c`.
    Tuple,
    /// Type-matching block (ANY semantics in type tests).
    TypeBlock,
    /// Type-matching group (ALL semantics in type tests).
    TypeGroup,
    /// Keyed record.
    Object,
    /// Sea-of-words context.
    Module,
    /// Reified activation record.
    Frame,
    /// Error context.
    Error,
    /// Port object.
    Port,
    /// Function value.
    Action,
    /// A datatype as a value.
    Datatype,
    /// Parameter descriptor (lives in paramlists).
    Parameter,
    /// Opaque host handle.
    Handle,
}

impl Kind {
    /// Any WORD!-class kind.
    #[inline]
    pub fn is_word(self) -> bool {
        matches!(self, Kind::Word | Kind::SetWord | Kind::GetWord | Kind::MetaWord)
    }

    /// Any cell-array-backed kind (blocks, groups, sequences, type arrays).
    #[inline]
    pub fn is_array(self) -> bool {
        matches!(
            self,
            Kind::Block
                | Kind::Group
                | Kind::Path
                | Kind::SetPath
                | Kind::GetPath
                | Kind::Tuple
                | Kind::TypeBlock
                | Kind::TypeGroup
        )
    }

    /// PATH!-class or TUPLE! kinds.
    #[inline]
    pub fn is_sequence(self) -> bool {
        matches!(self, Kind::Path | Kind::SetPath | Kind::GetPath | Kind::Tuple)
    }

    /// Any context-backed kind.
    #[inline]
    pub fn is_context(self) -> bool {
        matches!(
            self,
            Kind::Object | Kind::Module | Kind::Frame | Kind::Error | Kind::Port
        )
    }

    /// Any string-series-backed kind.
    #[inline]
    pub fn is_string(self) -> bool {
        matches!(self, Kind::Text | Kind::Tag | Kind::Issue | Kind::Binary)
    }

    /// Inert kinds evaluate to themselves.
    #[inline]
    pub fn is_inert(self) -> bool {
        matches!(
            self,
            Kind::Blank
                | Kind::Integer
                | Kind::Decimal
                | Kind::Text
                | Kind::Tag
                | Kind::Issue
                | Kind::Binary
                | Kind::Block
                | Kind::TypeBlock
                | Kind::TypeGroup
                | Kind::Object
                | Kind::Module
                | Kind::Frame
                | Kind::Error
                | Kind::Port
                | Kind::Datatype
                | Kind::Parameter
                | Kind::Handle
        )
    }

    /// The `xxx!` word naming this datatype.
    pub fn datatype_sym(self) -> SymId {
        match self {
            Kind::Blank => sym::BLANK_X,
            Kind::Comma => sym::COMMA_X,
            Kind::Integer => sym::INTEGER_X,
            Kind::Decimal => sym::DECIMAL_X,
            Kind::Text => sym::TEXT_X,
            Kind::Tag => sym::TAG_X,
            Kind::Issue => sym::ISSUE_X,
            Kind::Binary => sym::BINARY_X,
            Kind::Word => sym::WORD_X,
            Kind::SetWord => sym::SET_WORD_X,
            Kind::GetWord => sym::GET_WORD_X,
            Kind::MetaWord => sym::META_WORD_X,
            Kind::Block => sym::BLOCK_X,
            Kind::Group => sym::GROUP_X,
            Kind::Path => sym::PATH_X,
            Kind::SetPath => sym::SET_PATH_X,
            Kind::GetPath => sym::GET_PATH_X,
            Kind::Tuple => sym::TUPLE_X,
            Kind::TypeBlock => sym::TYPE_BLOCK_X,
            Kind::TypeGroup => sym::TYPE_GROUP_X,
            Kind::Object => sym::OBJECT_X,
            Kind::Module => sym::MODULE_X,
            Kind::Frame => sym::FRAME_X,
            Kind::Error => sym::ERROR_X,
            Kind::Port => sym::PORT_X,
            Kind::Action => sym::ACTION_X,
            Kind::Datatype => sym::DATATYPE_X,
            Kind::Parameter => sym::PARAMETER_X,
            Kind::Handle => sym::HANDLE_X,
        }
    }

    /// Inverse of [`Kind::datatype_sym`].
    pub fn from_datatype_sym(id: SymId) -> Option<Kind> {
        Some(match id {
            sym::BLANK_X => Kind::Blank,
            sym::COMMA_X => Kind::Comma,
            sym::INTEGER_X => Kind::Integer,
            sym::DECIMAL_X => Kind::Decimal,
            sym::TEXT_X => Kind::Text,
            sym::TAG_X => Kind::Tag,
            sym::ISSUE_X => Kind::Issue,
            sym::BINARY_X => Kind::Binary,
            sym::WORD_X => Kind::Word,
            sym::SET_WORD_X => Kind::SetWord,
            sym::GET_WORD_X => Kind::GetWord,
            sym::META_WORD_X => Kind::MetaWord,
            sym::BLOCK_X => Kind::Block,
            sym::GROUP_X => Kind::Group,
            sym::PATH_X => Kind::Path,
            sym::SET_PATH_X => Kind::SetPath,
            sym::GET_PATH_X => Kind::GetPath,
            sym::TUPLE_X => Kind::Tuple,
            sym::TYPE_BLOCK_X => Kind::TypeBlock,
            sym::TYPE_GROUP_X => Kind::TypeGroup,
            sym::OBJECT_X => Kind::Object,
            sym::MODULE_X => Kind::Module,
            sym::FRAME_X => Kind::Frame,
            sym::ERROR_X => Kind::Error,
            sym::PORT_X => Kind::Port,
            sym::ACTION_X => Kind::Action,
            sym::DATATYPE_X => Kind::Datatype,
            sym::PARAMETER_X => Kind::Parameter,
            sym::HANDLE_X => Kind::Handle,
            _ => return None,
        })
    }
}

bitflags::bitflags! {
    /// Per-cell flag bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct CellFlags: u16 {
        /// Value may not be mutated through this reference.
        const CONST = 1 << 0;
        /// Variable slot may not be overwritten.
        const PROTECTED = 1 << 1;
        /// Formatting hint: a newline preceded this cell in source.
        const NEWLINE_BEFORE = 1 << 2;
        /// "Did not produce a value this step" marker on output cells.
        const STALE = 1 << 3;
        /// This action variable invokes infix (first arg from prior output).
        const ENFIX = 1 << 4;
        /// The evaluator did not evaluate to produce this (literal fetch).
        const UNEVALUATED = 1 << 5;
        /// Loop-construct note: slot reuses an existing binding.
        const NOTE_REUSE = 1 << 6;
    }
}

/// Class of a function parameter, deciding how its argument is gathered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamClass {
    /// One full evaluation step.
    Normal,
    /// Evaluate, then meta-quote the product (`^arg`).
    Meta,
    /// Take the next value literally (`'arg`).
    Hard,
    /// Literal, but evaluate GROUP!s and fetch GET-WORD!s.
    Soft,
    /// The RETURN slot (not fulfilled from the feed).
    Return,
}

bitflags::bitflags! {
    /// Parameter behavior flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ParamFlags: u16 {
        /// Optional, invoked by name from a path.
        const REFINEMENT = 1 << 0;
        /// Quoted parameter that yields null on a non-matching lookahead.
        const SKIPPABLE = 1 << 1;
        /// Tolerates the feed being at its end (arg becomes null).
        const ENDABLE = 1 << 2;
        /// Argument is viewed as const inside the body.
        const CONST = 1 << 3;
        /// RETURN slot permits a stale (vanished) output.
        const VANISHABLE = 1 << 4;
    }
}

/// The payload: what the two payload slots plus the extra slot hold,
/// interpreted per kind.  The GC traces cells by matching this enum, which is
/// what makes trace decisions unambiguous.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Payload {
    /// No payload (blank, comma).
    None,
    /// Integer payload.
    Int(i64),
    /// Decimal payload.
    Dec(f64),
    /// Any-word: symbol + binding + index into the bound context.
    Word {
        /// Interned spelling.
        sym: SymId,
        /// Where the word resolves (or `Unbound`).
        binding: Binding,
        /// 1-based slot index when bound to a context positionally;
        /// `INDEX_ATTACHED` for module attachment.
        index: u32,
    },
    /// Any-array: backing array + position + specifier chain head.
    Series {
        /// Backing cell array.
        array: ArrayId,
        /// 0-based element position the value "is at".
        index: u32,
        /// Virtual-binding chain for cells under this array.
        specifier: Specifier,
    },
    /// Any-string: backing string series + position.
    Text {
        /// Backing string/binary series.
        string: StringId,
        /// 0-based position.
        index: u32,
    },
    /// Any-context.
    Context(ContextId),
    /// Action: details identity + optional binding override.
    Action {
        /// The action's identity (details record).
        details: DetailsId,
        /// Binding override (e.g. definitional RETURN's frame).
        binding: Option<ContextId>,
    },
    /// A datatype value.
    Datatype(Kind),
    /// Parameter descriptor.
    Parameter {
        /// How the argument is gathered.
        class: ParamClass,
        /// Behavior flags.
        flags: ParamFlags,
        /// Optional type-test array (None = accept anything).
        spec: Option<ArrayId>,
    },
    /// Opaque host data.
    Handle(u64),
}

/// The tagged cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cell {
    kind: Kind,
    quoting: Quoting,
    /// Flag bits; pub because flag twiddling is pervasive in executors.
    pub flags: CellFlags,
    payload: Payload,
}

impl Cell {
    fn plain(kind: Kind, payload: Payload) -> Cell {
        Cell {
            kind,
            quoting: Quoting::PLAIN,
            flags: CellFlags::empty(),
            payload,
        }
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    /// `_`
    pub fn blank() -> Cell {
        Cell::plain(Kind::Blank, Payload::None)
    }

    /// `,`
    pub fn comma() -> Cell {
        Cell::plain(Kind::Comma, Payload::None)
    }

    /// An INTEGER!.
    pub fn integer(n: i64) -> Cell {
        Cell::plain(Kind::Integer, Payload::Int(n))
    }

    /// A DECIMAL!.
    pub fn decimal(n: f64) -> Cell {
        Cell::plain(Kind::Decimal, Payload::Dec(n))
    }

    /// An unbound word of the given word kind.
    pub fn any_word(kind: Kind, sym: SymId) -> Cell {
        debug_assert!(kind.is_word());
        Cell::plain(
            kind,
            Payload::Word { sym, binding: Binding::Unbound, index: 0 },
        )
    }

    /// An unbound WORD!.
    pub fn word(sym: SymId) -> Cell {
        Cell::any_word(Kind::Word, sym)
    }

    /// An unbound SET-WORD!.
    pub fn set_word(sym: SymId) -> Cell {
        Cell::any_word(Kind::SetWord, sym)
    }

    /// An unbound GET-WORD!.
    pub fn get_word(sym: SymId) -> Cell {
        Cell::any_word(Kind::GetWord, sym)
    }

    /// An array-backed value at index 0.
    pub fn any_array(kind: Kind, array: ArrayId, specifier: Specifier) -> Cell {
        Cell::any_array_at(kind, array, 0, specifier)
    }

    /// An array-backed value at a position.
    pub fn any_array_at(kind: Kind, array: ArrayId, index: u32, specifier: Specifier) -> Cell {
        debug_assert!(kind.is_array());
        Cell::plain(kind, Payload::Series { array, index, specifier })
    }

    /// A BLOCK! over an array.
    pub fn block(array: ArrayId, specifier: Specifier) -> Cell {
        Cell::any_array(Kind::Block, array, specifier)
    }

    /// A GROUP! over an array.
    pub fn group(array: ArrayId, specifier: Specifier) -> Cell {
        Cell::any_array(Kind::Group, array, specifier)
    }

    /// A string-backed value at index 0.
    pub fn any_string(kind: Kind, string: StringId) -> Cell {
        debug_assert!(kind.is_string());
        Cell::plain(kind, Payload::Text { string, index: 0 })
    }

    /// A TEXT!.
    pub fn text(string: StringId) -> Cell {
        Cell::any_string(Kind::Text, string)
    }

    /// A TAG!.
    pub fn tag(string: StringId) -> Cell {
        Cell::any_string(Kind::Tag, string)
    }

    /// A context-backed value.
    pub fn any_context(kind: Kind, id: ContextId) -> Cell {
        debug_assert!(kind.is_context());
        Cell::plain(kind, Payload::Context(id))
    }

    /// A plain (inert) ACTION! value.
    pub fn action(details: DetailsId, binding: Option<ContextId>) -> Cell {
        Cell::plain(Kind::Action, Payload::Action { details, binding })
    }

    /// An activation: the antiform of an action, which runs when fetched
    /// from a word.
    pub fn activation(details: DetailsId, binding: Option<ContextId>) -> Cell {
        Cell::action(details, binding).antiformify()
    }

    /// A DATATYPE! value.
    pub fn datatype(kind: Kind) -> Cell {
        Cell::plain(Kind::Datatype, Payload::Datatype(kind))
    }

    /// A parameter descriptor.
    pub fn parameter(class: ParamClass, flags: ParamFlags, spec: Option<ArrayId>) -> Cell {
        Cell::plain(Kind::Parameter, Payload::Parameter { class, flags, spec })
    }

    /// An opaque handle.
    pub fn handle(data: u64) -> Cell {
        Cell::plain(Kind::Handle, Payload::Handle(data))
    }

    // =========================================================================
    // Special antiform values
    // =========================================================================

    /// The null antiform.
    pub fn nulled() -> Cell {
        Cell::word(sym::NULL).antiformify()
    }

    /// The void antiform.
    pub fn void() -> Cell {
        Cell::word(sym::VOID).antiformify()
    }

    /// The none antiform (unset variable state).
    pub fn none() -> Cell {
        Cell::word(sym::NONE).antiformify()
    }

    /// A logic antiform (`~true~` / `~false~`).
    pub fn logic(b: bool) -> Cell {
        Cell::word(if b { sym::TRUE } else { sym::FALSE }).antiformify()
    }

    /// Nihil: the vaporous antiform produced by invisibles.
    pub fn nihil() -> Cell {
        Cell::comma().antiformify()
    }

    /// A fresh stale cell for output slots.
    pub fn fresh() -> Cell {
        let mut c = Cell::void();
        c.flags |= CellFlags::STALE;
        c
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// The heart kind (under any quoting).
    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The quoting state.
    #[inline]
    pub fn quoting(&self) -> Quoting {
        self.quoting
    }

    /// The payload.
    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Kind, but only if the cell is plain (else `None`): quoted and quasi
    /// cells do not "act like" their heart.
    #[inline]
    pub fn plain_kind(&self) -> Option<Kind> {
        if self.quoting.is_plain() {
            Some(self.kind)
        } else {
            None
        }
    }

    /// True when this is a plain cell of the given kind.
    #[inline]
    pub fn is(&self, kind: Kind) -> bool {
        self.quoting.is_plain() && self.kind == kind
    }

    #[inline]
    pub fn is_antiform(&self) -> bool {
        self.quoting.is_anti()
    }

    #[inline]
    pub fn is_quoted(&self) -> bool {
        self.quoting.is_quoted()
    }

    #[inline]
    pub fn is_quasi(&self) -> bool {
        self.quoting.is_quasi()
    }

    /// An antiform word with the given symbol?
    pub fn is_anti_word(&self, sym: SymId) -> bool {
        self.quoting.is_anti() && self.kind == Kind::Word && self.word_sym() == Some(sym)
    }

    /// The null antiform?
    pub fn is_nulled(&self) -> bool {
        self.is_anti_word(sym::NULL)
    }

    /// The void antiform?
    pub fn is_void(&self) -> bool {
        self.is_anti_word(sym::VOID)
    }

    /// The none antiform (unset)?
    pub fn is_none(&self) -> bool {
        self.is_anti_word(sym::NONE)
    }

    /// Nihil (antiform comma)?
    pub fn is_nihil(&self) -> bool {
        self.quoting.is_anti() && self.kind == Kind::Comma
    }

    /// A logic antiform, and which one?
    pub fn as_logic(&self) -> Option<bool> {
        if self.is_anti_word(sym::TRUE) {
            Some(true)
        } else if self.is_anti_word(sym::FALSE) {
            Some(false)
        } else {
            None
        }
    }

    /// An activation (antiform action)?
    pub fn is_activation(&self) -> bool {
        self.quoting.is_anti() && self.kind == Kind::Action
    }

    /// A raised error (antiform error)?
    pub fn is_raised(&self) -> bool {
        self.quoting.is_anti() && self.kind == Kind::Error
    }

    /// A pack (antiform block)?
    pub fn is_pack(&self) -> bool {
        self.quoting.is_anti() && self.kind == Kind::Block
    }

    /// Unstable antiforms cannot even sit in variables; they must decay.
    pub fn is_unstable_antiform(&self) -> bool {
        self.is_raised() || self.is_pack() || self.is_nihil()
    }

    /// Stale marker set?
    #[inline]
    pub fn is_stale(&self) -> bool {
        self.flags.contains(CellFlags::STALE)
    }

    // =========================================================================
    // Payload accessors
    // =========================================================================

    /// Integer payload, if an INTEGER! heart.
    pub fn as_int(&self) -> Option<i64> {
        match self.payload {
            Payload::Int(n) => Some(n),
            _ => None,
        }
    }

    /// Decimal payload, if a DECIMAL! heart.
    pub fn as_dec(&self) -> Option<f64> {
        match self.payload {
            Payload::Dec(n) => Some(n),
            _ => None,
        }
    }

    /// Word symbol, for any word heart (any quoting).
    pub fn word_sym(&self) -> Option<SymId> {
        match self.payload {
            Payload::Word { sym, .. } => Some(sym),
            _ => None,
        }
    }

    /// Word binding, for any word heart.
    pub fn word_binding(&self) -> Option<Binding> {
        match self.payload {
            Payload::Word { binding, .. } => Some(binding),
            _ => None,
        }
    }

    /// Word index, for any word heart.
    pub fn word_index(&self) -> Option<u32> {
        match self.payload {
            Payload::Word { index, .. } => Some(index),
            _ => None,
        }
    }

    /// Backing array + index + specifier, for any array heart.
    pub fn series(&self) -> Option<(ArrayId, u32, Specifier)> {
        match self.payload {
            Payload::Series { array, index, specifier } => Some((array, index, specifier)),
            _ => None,
        }
    }

    /// Backing string + index, for any string heart.
    pub fn string(&self) -> Option<(StringId, u32)> {
        match self.payload {
            Payload::Text { string, index } => Some((string, index)),
            _ => None,
        }
    }

    /// Context id, for any context heart.
    pub fn context(&self) -> Option<ContextId> {
        match self.payload {
            Payload::Context(id) => Some(id),
            _ => None,
        }
    }

    /// Action identity + binding, for ACTION! hearts.
    pub fn action_parts(&self) -> Option<(DetailsId, Option<ContextId>)> {
        match self.payload {
            Payload::Action { details, binding } => Some((details, binding)),
            _ => None,
        }
    }

    /// Datatype payload.
    pub fn datatype_kind(&self) -> Option<Kind> {
        match self.payload {
            Payload::Datatype(k) => Some(k),
            _ => None,
        }
    }

    /// Parameter payload parts.
    pub fn param_parts(&self) -> Option<(ParamClass, ParamFlags, Option<ArrayId>)> {
        match self.payload {
            Payload::Parameter { class, flags, spec } => Some((class, flags, spec)),
            _ => None,
        }
    }

    // =========================================================================
    // Mutation helpers
    // =========================================================================

    /// Set a word's binding and index in place.
    pub fn set_word_binding(&mut self, new_binding: Binding, new_index: u32) {
        match &mut self.payload {
            Payload::Word { binding, index, .. } => {
                *binding = new_binding;
                *index = new_index;
            }
            _ => panic!("set_word_binding on non-word cell: {self:?}"),
        }
    }

    /// Set an array-backed cell's specifier in place.
    pub fn set_specifier(&mut self, spec: Specifier) {
        match &mut self.payload {
            Payload::Series { specifier, .. } => *specifier = spec,
            _ => panic!("set_specifier on non-array cell: {self:?}"),
        }
    }

    /// Set the series position of an array- or string-backed cell.
    pub fn set_index(&mut self, new_index: u32) {
        match &mut self.payload {
            Payload::Series { index, .. } => *index = new_index,
            Payload::Text { index, .. } => *index = new_index,
            _ => panic!("set_index on non-series cell: {self:?}"),
        }
    }

    // =========================================================================
    // Quoting operations
    // =========================================================================

    /// Add `n` quote levels.
    pub fn quotify(mut self, n: u8) -> Cell {
        self.quoting = self.quoting.quotify(n);
        self
    }

    /// Remove `n` quote levels.
    pub fn unquotify(mut self, n: u8) -> Cell {
        self.quoting = self.quoting.unquotify(n);
        self
    }

    /// Make a quasiform of a plain cell.
    pub fn quasify(mut self) -> Cell {
        debug_assert!(self.quoting.is_plain(), "quasify of non-plain cell");
        self.quoting = Quoting::QUASI;
        self
    }

    /// Make the antiform of a plain or quasi cell.
    pub fn antiformify(mut self) -> Cell {
        debug_assert!(!self.quoting.is_quoted(), "antiform of quoted cell");
        self.quoting = Quoting::ANTI;
        self
    }

    /// Meta: antiform -> quasi, otherwise add a quote.
    pub fn meta(mut self) -> Cell {
        self.quoting = self.quoting.meta();
        self
    }

    /// Unmeta: quasi -> antiform, quoted -> one less quote.
    pub fn unmeta(mut self) -> Cell {
        match self.quoting.unmeta() {
            Some(q) => {
                self.quoting = q;
                self
            }
            None => panic!("unmeta of plain cell: {self:?}"),
        }
    }

    /// Unmeta when there is a meta level to remove; plain cells pass through
    /// (used when unpacking meta-stored pack items).
    pub fn unmeta_or_plain(mut self) -> Cell {
        if let Some(q) = self.quoting.unmeta() {
            self.quoting = q;
        }
        self
    }

    /// View the cell with plain quoting (the "noquote" heart view).
    pub fn as_plain(mut self) -> Cell {
        self.quoting = Quoting::PLAIN;
        self
    }

    /// Reify for array storage: antiforms become quasiforms.
    pub fn reified(mut self) -> Cell {
        if self.quoting.is_anti() {
            self.quoting = Quoting::QUASI;
        }
        self
    }

    /// Is this legal to store in an array?
    #[inline]
    pub fn array_legal(&self) -> bool {
        self.quoting.array_legal()
    }

    /// Decay an unstable antiform to its stable form: packs decay to their
    /// first item is handled by the evaluator (needs heap access); here nihil
    /// decays to void.  Stable cells pass through.
    pub fn decayed_shallow(self) -> Cell {
        if self.is_nihil() {
            Cell::void()
        } else {
            self
        }
    }

    /// Identity comparison modulo flags (cell equality for round-trips).
    pub fn same_value(&self, other: &Cell) -> bool {
        self.kind == other.kind && self.quoting == other.quoting && self.payload == other.payload
    }

    /// True if the lift state is plain or quasi at depth 0 and this cell can
    /// be a variable's content.
    pub fn is_stable(&self) -> bool {
        !self.is_unstable_antiform()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quoting::Quoting;

    #[test]
    fn test_constructor_kind_pairing() {
        assert_eq!(Cell::integer(7).as_int(), Some(7));
        assert!(Cell::blank().is(Kind::Blank));
        let w = Cell::word(sym::VALUE);
        assert_eq!(w.word_sym(), Some(sym::VALUE));
        assert_eq!(w.word_binding(), Some(Binding::Unbound));
    }

    #[test]
    fn test_special_values() {
        assert!(Cell::nulled().is_nulled());
        assert!(Cell::void().is_void());
        assert!(Cell::none().is_none());
        assert_eq!(Cell::logic(true).as_logic(), Some(true));
        assert_eq!(Cell::logic(false).as_logic(), Some(false));
        assert!(Cell::nihil().is_nihil());
        assert!(Cell::nihil().is_unstable_antiform());
        assert!(!Cell::nulled().is_unstable_antiform());
    }

    #[test]
    fn test_antiforms_are_not_array_legal() {
        assert!(!Cell::nulled().array_legal());
        assert!(Cell::nulled().reified().array_legal());
        assert_eq!(Cell::nulled().reified().quoting(), Quoting::QUASI);
    }

    #[test]
    fn test_quote_roundtrip() {
        let q = Cell::word(sym::VALUE).quotify(2);
        assert!(q.is_quoted());
        assert_eq!(q.unquotify(2), Cell::word(sym::VALUE));
    }

    #[test]
    fn test_meta_unmeta() {
        let null = Cell::nulled();
        let meta = null.meta();
        assert!(meta.is_quasi());
        assert!(meta.unmeta().is_nulled());
    }

    #[test]
    fn test_plain_kind_hidden_by_quote() {
        let q = Cell::integer(1).quotify(1);
        assert_eq!(q.plain_kind(), None);
        assert_eq!(q.kind(), Kind::Integer);
        assert!(!q.is(Kind::Integer));
    }

    #[test]
    fn test_activation_vs_action() {
        let act = Cell::action(DetailsId(4), None);
        assert!(!act.is_activation());
        let live = Cell::activation(DetailsId(4), None);
        assert!(live.is_activation());
        assert_eq!(live.action_parts(), Some((DetailsId(4), None)));
    }

    #[test]
    fn test_datatype_sym_roundtrip() {
        for kind in [Kind::Integer, Kind::Block, Kind::Action, Kind::Module] {
            assert_eq!(Kind::from_datatype_sym(kind.datatype_sym()), Some(kind));
        }
    }
}
