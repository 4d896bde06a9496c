//! Diagnostic records for the Ruby parser.
//!
//! Parsing is fully recoverable: a syntax error never aborts the parse.
//! Instead every problem becomes a [`Diagnostic`] — a message id, a severity,
//! and a byte span — collected on a [`DiagnosticList`]. Consumers render the
//! records however they like; this crate owns only the structured data and
//! the canonical message text for each id.

use ruby_position_tracking::ByteSpan;
use thiserror::Error;

/// Severity of a diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// The source is not valid Ruby; the AST contains missing nodes.
    Error,
    /// The source parses but something is suspect.
    Warning,
}

/// Message catalog for every diagnostic the parser can emit.
///
/// The `Display` impl carries the canonical message text. Ids with runtime
/// parameters (an identifier name, a delimiter byte) are formatted at push
/// time via [`DiagnosticList::error_with`] and keep the id for programmatic
/// matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DiagnosticId {
    // ===== Lexical =====
    #[error("invalid escape sequence")]
    EscapeInvalid,
    #[error("invalid hex escape sequence; expected at least one hex digit")]
    EscapeHexEmpty,
    #[error("invalid Unicode escape sequence; expected four hex digits")]
    EscapeUnicodeShort,
    #[error("invalid Unicode escape sequence; needs closing `}}`")]
    EscapeUnicodeUnterminated,
    #[error("invalid Unicode codepoint; surrogate halves are not allowed")]
    EscapeUnicodeSurrogate,
    #[error("Unicode codepoint is too large")]
    EscapeUnicodeTooLarge,
    #[error("multiple codepoints at single character literal")]
    EscapeUnicodeListInCharacter,
    #[error("control escape was already specified")]
    EscapeControlRepeated,
    #[error("meta escape was already specified")]
    EscapeMetaRepeated,
    #[error("unterminated string literal")]
    StringUnterminated,
    #[error("unterminated regular expression")]
    RegexpUnterminated,
    #[error("unterminated list literal")]
    ListUnterminated,
    #[error("unterminated heredoc; terminator not found before end of file")]
    HeredocUnterminated,
    #[error("unterminated heredoc identifier")]
    HeredocIdentifierUnterminated,
    #[error("unknown type of percent literal")]
    PercentUnknownType,
    #[error("invalid percent literal delimiter")]
    PercentInvalidDelimiter,
    #[error("unterminated quoted string; detected an end of file")]
    PercentUnterminated,
    #[error("trailing underscore in number")]
    NumberTrailingUnderscore,
    #[error("unexpected multiple underscores in number")]
    NumberDoubleUnderscore,
    #[error("invalid digit for this numeric base")]
    NumberInvalidDigit,
    #[error("missing exponent digits")]
    NumberMissingExponent,
    #[error("incomplete character syntax")]
    IncompleteCharacterSyntax,
    #[error("embedded document meets end of file")]
    EmbDocUnterminated,
    #[error("symbol literal may not be empty")]
    SymbolInvalid,
    #[error("invalid global variable name")]
    GlobalVariableInvalid,
    #[error("incomplete instance variable name")]
    InstanceVariableInvalid,
    #[error("incomplete class variable name")]
    ClassVariableInvalid,

    // ===== Encoding =====
    #[error("unknown or invalid source encoding in magic comment")]
    EncodingUnknown,
    #[error("conflicting explicit encodings within one literal")]
    EncodingLiteralConflict,
    #[error("invalid byte sequence for the source encoding")]
    EncodingInvalidByteSequence,

    // ===== Structural =====
    #[error("unexpected token; expected an expression")]
    ExpressionExpected,
    #[error("unexpected token at this position")]
    UnexpectedToken,
    #[error("expected a matching `)`")]
    ParenCloseExpected,
    #[error("expected a matching `]`")]
    BracketCloseExpected,
    #[error("expected a matching `}}`")]
    BraceCloseExpected,
    #[error("expected an `end` to close this block")]
    EndExpected,
    #[error("expected a `then` or a newline after the predicate")]
    ThenExpected,
    #[error("expected an `in` clause after `case` in pattern mode")]
    CaseMissingClauses,
    #[error("expected a predicate after `case`")]
    CaseExpressionExpected,
    #[error("expected a delimiter to close the interpolated expression")]
    EmbexprCloseExpected,
    #[error("nesting too deep; the maximum parse depth was exceeded")]
    NestingTooDeep,
    #[error("expected a `do`, a newline, or a `;` after the loop predicate")]
    LoopTermExpected,
    #[error("expected a method name")]
    MethodNameExpected,
    #[error("expected a constant name")]
    ConstantNameExpected,
    #[error("expected a local variable name")]
    LocalNameExpected,
    #[error("non-associative operator used consecutively")]
    NonAssociativeOperator,
    #[error("unexpected multiple commands in one statement; wrap the call in parentheses")]
    CommandChained,

    // ===== Parse-time semantic =====
    #[error("dynamic constant assignment; constants may not be assigned inside a method")]
    ConstantAssignmentInMethod,
    #[error("duplicated `when` clause")]
    WhenClauseDuplicate,
    #[error("duplicated pattern key")]
    PatternKeyDuplicate,
    #[error("duplicated variable in pattern")]
    PatternCaptureDuplicate,
    #[error("hash pattern key must be a symbol usable as a local name")]
    PatternKeyInvalidLocal,
    #[error("splat may appear only once in an array pattern")]
    PatternRestDuplicate,
    #[error("`return` used outside of a method")]
    ReturnOutsideMethod,
    #[error("`yield` used outside of a method")]
    YieldOutsideMethod,
    #[error("invalid `break`; no enclosing loop or block")]
    BreakOutsideLoop,
    #[error("invalid `next`; no enclosing loop or block")]
    NextOutsideLoop,
    #[error("invalid `redo`; no enclosing loop or block")]
    RedoOutsideLoop,
    #[error("invalid `retry`; no enclosing `rescue` clause")]
    RetryOutsideRescue,
    #[error("`BEGIN` blocks are permitted only at toplevel")]
    BeginUpcaseNotAtTopLevel,
    #[error("can't assign to a keyword")]
    WriteTargetInvalid,
    #[error("target cannot be read from")]
    WriteTargetUnreadable,
    #[error("index writes may not take a block argument")]
    IndexWriteBlockGiven,
    #[error("index writes may not take keyword arguments")]
    IndexWriteKeywordsGiven,
    #[error("`it` is not allowed when an ordinary parameter is defined")]
    ItWithOrdinaryParameters,
    #[error("numbered parameter is not allowed when an ordinary parameter is defined")]
    NumberedWithOrdinaryParameters,
    #[error("numbered parameters may not be used in both an outer and an inner block")]
    NumberedInNestedBlocks,
    #[error("`it` may not be mixed with numbered parameters")]
    ItWithNumberedParameters,
    #[error("reserved numbered-parameter name")]
    ParameterNameReserved,
    #[error("duplicated parameter name")]
    ParameterNameDuplicate,
    #[error("forwarding argument used outside a forwarding method definition")]
    ForwardingOutsideDefinition,

    // ===== Warnings =====
    #[error("ambiguous first argument; put parentheses or a space even after the operator")]
    AmbiguousPrefixWarning,
    #[error("`/` interpreted as the start of a regexp")]
    AmbiguousSlashWarning,
    #[error("assigned but unused variable")]
    UnusedLocalVariableWarning,
    #[error("mismatched indentation of the closing keyword")]
    IndentMismatchWarning,
    #[error("magic comment appears after the first semantic token and is ignored")]
    MagicCommentIgnoredWarning,
    #[error("unknown magic-comment value")]
    MagicCommentUnknownWarning,
    #[error("carriage return in source; treated as whitespace")]
    CarriageReturnWarning,
    #[error("duplicated hash key; the earlier entry is overwritten")]
    HashKeyDuplicateWarning,
    #[error("regexp literal in a condition")]
    RegexpInConditionWarning,
}

/// A single structured diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Byte range the diagnostic points at
    pub span: ByteSpan,
    /// Message id, stable across releases
    pub id: DiagnosticId,
    /// Severity
    pub level: Level,
    /// Formatted message text; equals `id.to_string()` unless the push site
    /// supplied extra context
    pub message: String,
}

/// Accumulates errors and warnings during one parse.
///
/// Errors never stop the parse; the list simply grows and the parser keeps
/// synthesizing missing tokens and nodes.
#[derive(Debug, Default)]
pub struct DiagnosticList {
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
}

impl DiagnosticList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error with the id's canonical message
    pub fn error(&mut self, span: ByteSpan, id: DiagnosticId) {
        self.errors.push(Diagnostic { span, id, level: Level::Error, message: id.to_string() });
    }

    /// Record an error with extra context appended to the canonical message
    pub fn error_with(&mut self, span: ByteSpan, id: DiagnosticId, detail: impl AsRef<str>) {
        let message = format!("{id}: {}", detail.as_ref());
        self.errors.push(Diagnostic { span, id, level: Level::Error, message });
    }

    /// Record a warning with the id's canonical message
    pub fn warning(&mut self, span: ByteSpan, id: DiagnosticId) {
        self.warnings.push(Diagnostic { span, id, level: Level::Warning, message: id.to_string() });
    }

    /// Record a warning with extra context appended to the canonical message
    pub fn warning_with(&mut self, span: ByteSpan, id: DiagnosticId, detail: impl AsRef<str>) {
        let message = format!("{id}: {}", detail.as_ref());
        self.warnings.push(Diagnostic { span, id, level: Level::Warning, message });
    }

    /// All errors recorded so far, in emission order
    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// All warnings recorded so far, in emission order
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// True if at least one error was recorded
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// True if any recorded error indicates an unterminated construct,
    /// meaning more input could still complete the parse. Drives the
    /// streaming entry point's re-read loop.
    pub fn has_unterminated_error(&self) -> bool {
        self.errors.iter().any(|d| {
            matches!(
                d.id,
                DiagnosticId::StringUnterminated
                    | DiagnosticId::RegexpUnterminated
                    | DiagnosticId::ListUnterminated
                    | DiagnosticId::HeredocUnterminated
                    | DiagnosticId::PercentUnterminated
                    | DiagnosticId::EmbDocUnterminated
                    | DiagnosticId::EndExpected
            )
        })
    }

    /// Move every record out of `other` into `self`, preserving order.
    pub fn absorb(&mut self, other: &mut DiagnosticList) {
        self.errors.append(&mut other.errors);
        self.warnings.append(&mut other.warnings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_and_warning_are_separate() {
        let mut list = DiagnosticList::new();
        list.error(ByteSpan::new(0, 1), DiagnosticId::StringUnterminated);
        list.warning(ByteSpan::new(2, 3), DiagnosticId::CarriageReturnWarning);
        assert_eq!(list.errors().len(), 1);
        assert_eq!(list.warnings().len(), 1);
        assert!(list.has_errors());
        assert_eq!(list.errors()[0].level, Level::Error);
    }

    #[test]
    fn formatted_context_keeps_the_id() {
        let mut list = DiagnosticList::new();
        list.error_with(ByteSpan::new(0, 3), DiagnosticId::ParameterNameDuplicate, "`foo`");
        let diag = &list.errors()[0];
        assert_eq!(diag.id, DiagnosticId::ParameterNameDuplicate);
        assert!(diag.message.contains("`foo`"));
    }

    #[test]
    fn unterminated_detection() {
        let mut list = DiagnosticList::new();
        list.error(ByteSpan::new(0, 1), DiagnosticId::UnexpectedToken);
        assert!(!list.has_unterminated_error());
        list.error(ByteSpan::new(0, 1), DiagnosticId::HeredocUnterminated);
        assert!(list.has_unterminated_error());
    }
}
