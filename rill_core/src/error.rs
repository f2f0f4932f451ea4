//! Error values.
//!
//! Every surfaced error carries a category, a symbol ID, a message template
//! with positional interpolation slots, and argument cells.  Raised errors
//! travel through the trampoline as antiform ERROR! cells; this type is the
//! Rust-facing view, used both before an error context is reified and at the
//! embedding API boundary.

use crate::cell::{Cell, Kind};
use crate::symbol::{fixed_sym_name, sym, SymId};

/// Convenience alias for fallible core operations.
pub type RillResult<T> = Result<T, Error>;

/// The five error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    /// Invariant violations, resource exhaustion.
    Internal,
    /// Scanner/loader failures.
    Syntax,
    /// Type mismatches, missing args, unbound words.
    Script,
    /// Overflow, divide by zero, out-of-range.
    Math,
    /// Protected/locked series, I/O and port errors.
    Access,
}

impl Category {
    /// Human name used in rendered messages.
    pub fn name(self) -> &'static str {
        match self {
            Category::Internal => "Internal",
            Category::Syntax => "Syntax",
            Category::Script => "Script",
            Category::Math => "Math",
            Category::Access => "Access",
        }
    }
}

/// An error value: category + id + template + args.
///
/// The template is a string with `{1}`, `{2}`, ... slots substituted by the
/// argument cells positionally.  Rendering through [`std::fmt::Display`] uses
/// a heap-free approximation of mold; the VM re-renders with real molding
/// when an error context is reified.
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    /// Which category the id belongs to.
    pub category: Category,
    /// Symbol naming the error within its category.
    pub id: SymId,
    /// Message template with positional slots.
    pub template: String,
    /// Argument cells, substituted by position.
    pub args: Vec<Cell>,
}

impl Error {
    /// Build an error from parts.
    pub fn new(
        category: Category,
        id: SymId,
        template: impl Into<String>,
        args: Vec<Cell>,
    ) -> Error {
        Error { category, id, template: template.into(), args }
    }

    /// Internal-category error.
    pub fn internal(id: SymId, template: impl Into<String>) -> Error {
        Error::new(Category::Internal, id, template, Vec::new())
    }

    /// Syntax-category error.
    pub fn syntax(id: SymId, template: impl Into<String>, args: Vec<Cell>) -> Error {
        Error::new(Category::Syntax, id, template, args)
    }

    /// Script-category error.
    pub fn script(id: SymId, template: impl Into<String>, args: Vec<Cell>) -> Error {
        Error::new(Category::Script, id, template, args)
    }

    /// Math-category error.
    pub fn math(id: SymId, template: impl Into<String>, args: Vec<Cell>) -> Error {
        Error::new(Category::Math, id, template, args)
    }

    /// Access-category error.
    pub fn access(id: SymId, template: impl Into<String>, args: Vec<Cell>) -> Error {
        Error::new(Category::Access, id, template, args)
    }

    // Frequently-raised errors get canned constructors, so raise sites stay
    // one-liners.

    /// A word had no binding.
    pub fn unbound_word(word: Cell) -> Error {
        Error::script(sym::UNBOUND_WORD, "word is not bound: {1}", vec![word.reified()])
    }

    /// A variable held none (unset).
    pub fn bad_word_get(word: Cell) -> Error {
        Error::script(
            sym::BAD_WORD_GET,
            "variable is unset: {1}",
            vec![word.reified()],
        )
    }

    /// Division by zero.
    pub fn zero_divide() -> Error {
        Error::math(sym::ZERO_DIVIDE, "attempt to divide by zero", Vec::new())
    }

    /// Arithmetic overflow.
    pub fn overflow() -> Error {
        Error::math(sym::OVERFLOW, "math or number overflow", Vec::new())
    }

    /// Path pick not supported by the value.
    pub fn bad_path_pick(picker: Cell) -> Error {
        Error::script(
            sym::BAD_PATH_PICK,
            "cannot pick {1} in path",
            vec![picker.reified()],
        )
    }

    /// Path poke not supported by the value.
    pub fn bad_path_poke(picker: Cell) -> Error {
        Error::script(
            sym::BAD_PATH_POKE,
            "cannot poke {1} in path",
            vec![picker.reified()],
        )
    }

    /// Throw had no catch.
    pub fn no_catch(value: Cell, label: Cell) -> Error {
        Error::script(
            sym::NO_CATCH,
            "no catch for throw of {1} with label {2}",
            vec![value.reified(), label.reified()],
        )
    }

    /// Argument type mismatch.
    pub fn expect_arg(action: Option<SymId>, param: SymId, actual: Cell) -> Error {
        let name = action
            .and_then(fixed_sym_name)
            .unwrap_or("(anonymous)");
        Error::script(
            sym::EXPECT_ARG,
            format!("{name} does not allow this argument type for {{1}}"),
            vec![Cell::word(param), actual.reified()],
        )
    }

    /// Missing non-endable argument.
    pub fn missing_arg(param: SymId) -> Error {
        Error::script(sym::MISSING_ARG, "missing argument: {1}", vec![Cell::word(param)])
    }

    /// Series or context is inaccessible (freed).
    pub fn series_inaccessible() -> Error {
        Error::access(
            sym::SERIES_INACCESSIBLE,
            "series or context is no longer accessible",
            Vec::new(),
        )
    }

    /// Attempt to modify a protected variable.
    pub fn protected_word(word: Cell) -> Error {
        Error::access(
            sym::PROTECTED_WORD,
            "variable is protected: {1}",
            vec![word.reified()],
        )
    }

    /// Attempt to modify a frozen series.
    pub fn series_frozen() -> Error {
        Error::access(sym::SERIES_FROZEN, "series is frozen", Vec::new())
    }

    /// Level-stack depth limit hit.
    pub fn stack_overflow() -> Error {
        Error::internal(sym::STACK_OVERFLOW, "evaluation stack depth limit reached")
    }

    /// Render the template, substituting args with the given formatter.
    pub fn render(&self, form: impl Fn(&Cell) -> String) -> String {
        let mut out = String::with_capacity(self.template.len() + 16);
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            rest = &rest[open..];
            match rest.find('}') {
                Some(close) => {
                    let slot: Option<usize> = rest[1..close].parse().ok();
                    match slot.and_then(|n| self.args.get(n - 1)) {
                        Some(cell) => out.push_str(&form(cell)),
                        None => out.push_str(&rest[..=close]),
                    }
                    rest = &rest[close + 1..];
                }
                None => break,
            }
        }
        out.push_str(rest);
        out
    }
}

/// Heap-free fallback rendering of an argument cell, used by `Display`.
fn form_shallow(cell: &Cell) -> String {
    match cell.kind() {
        Kind::Integer => cell.as_int().map(|n| n.to_string()).unwrap_or_default(),
        Kind::Decimal => cell.as_dec().map(|n| n.to_string()).unwrap_or_default(),
        Kind::Word | Kind::SetWord | Kind::GetWord | Kind::MetaWord => cell
            .word_sym()
            .and_then(fixed_sym_name)
            .map(str::to_string)
            .unwrap_or_else(|| "(word)".to_string()),
        Kind::Datatype => cell
            .datatype_kind()
            .and_then(|k| fixed_sym_name(k.datatype_sym()))
            .map(str::to_string)
            .unwrap_or_else(|| "(datatype)".to_string()),
        Kind::Blank => "_".to_string(),
        kind => format!("({})", fixed_sym_name(kind.datatype_sym()).unwrap_or("value")),
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "** {} error ({}): {}",
            self.category.name(),
            fixed_sym_name(self.id).unwrap_or("custom"),
            self.render(form_shallow)
        )
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_positionally() {
        let err = Error::script(
            sym::EXPECT_ARG,
            "got {1} then {2}",
            vec![Cell::integer(3), Cell::word(sym::VALUE)],
        );
        let text = err.render(|c| match c.as_int() {
            Some(n) => n.to_string(),
            None => "value".to_string(),
        });
        assert_eq!(text, "got 3 then value");
    }

    #[test]
    fn test_display_has_category_and_id() {
        let err = Error::zero_divide();
        let text = err.to_string();
        assert!(text.contains("Math"));
        assert!(text.contains("zero-divide"));
    }

    #[test]
    fn test_unbound_word_reifies_antiforms() {
        // Even if a weird caller passes an antiform, args stay array-legal.
        let err = Error::unbound_word(Cell::nulled());
        assert!(err.args[0].array_legal());
    }

    #[test]
    fn test_render_ignores_bad_slots() {
        let err = Error::script(sym::BAD_VALUE, "only {9} here", vec![]);
        assert_eq!(err.render(|_| "x".into()), "only {9} here");
    }
}
