//! Context-aware Ruby lexer with mode-based tokenization.
//!
//! Ruby's surface syntax is context-sensitive: the same byte may be an
//! operator, a unary prefix, a symbol marker, the start of a regular
//! expression, or part of an identifier, depending on lexer state. This
//! crate reconciles a finite set of orthogonal state dimensions at every
//! token boundary:
//!
//! - **Lex state** ([`LexState`]): a bitfield describing the syntactic role
//!   of the next token (beginning of an expression, after one, method-name
//!   position, …). Drives operator-vs-unary and regexp-vs-division
//!   decisions.
//! - **Lex modes** ([`LexMode`]): a push-down automaton over quoted
//!   sublanguages (strings, `%w` lists, regexps, heredocs, `#{}`
//!   interpolation).
//! - **Nesting counters**: open enclosures and code-level braces inside the
//!   current interpolation.
//! - **Do-loop / accepts-block stacks**: decide whether `do` opens a loop
//!   body or a block; pushed and popped by the parser at predicate
//!   boundaries.
//! - **Heredoc resume pointer**: heredoc bodies interleave with the code on
//!   their opener's line.
//!
//! The lexer appends every `\n` it crosses to a [`NewlineIndex`] exactly
//! once and collects structured diagnostics instead of failing; the token
//! stream always ends with [`TokenKind::Eof`].

pub mod escape;
pub mod encoding;
mod mode;
pub mod numbers;
mod state;

pub use mode::{ByteSet, FlagStack, LexMode, ModeStack};
pub use ruby_token::{Token, TokenKind};
pub use state::LexState;

use encoding::Encoding;
use ruby_error::{DiagnosticId, DiagnosticList};
use ruby_heredoc::{HeredocIndent, HeredocQuote, fold_common_whitespace, line_is_terminator};
use ruby_position_tracking::{ByteSpan, NewlineIndex};
use ruby_pragma::{MagicKind, ShareableConstantValue};

/// Configuration fixed at lexer construction.
#[derive(Debug, Clone, Default)]
pub struct LexerConfig {
    /// Magic `coding:` comments may not replace the encoding
    pub encoding_locked: bool,
    /// Search for a `ruby` shebang line when the source does not start with
    /// one (the `-x` switch, or main-script semantics)
    pub search_shebang: bool,
    /// Suppress minor warnings (`-e` scripts)
    pub suppress_minor_warnings: bool,
}

/// Settings collected from magic comments during the scan.
#[derive(Debug, Clone, Default)]
pub struct MagicState {
    /// `frozen_string_literal:` value, if the pragma appeared
    pub frozen_string_literal: Option<bool>,
    /// `shareable_constant_value:` value, if the pragma appeared
    pub shareable_constant_value: Option<ShareableConstantValue>,
    /// `warn_indent:` value, if the pragma appeared
    pub warn_indent: Option<bool>,
    /// Name from a `coding:`/`encoding:` pragma
    pub encoding_name: Option<String>,
}

/// Mode-aware Ruby lexer.
pub struct Lexer<'src> {
    source: &'src [u8],
    position: usize,
    /// Offset of the current line's first byte
    line_start: usize,
    state: LexState,
    modes: ModeStack,
    /// Offsets of every `\n` crossed, exactly once each
    pub newlines: NewlineIndex,
    /// Structured errors and warnings
    pub diagnostics: DiagnosticList,
    /// Spans of comments and embedded docs, in source order
    pub comments: Vec<ByteSpan>,
    encoding: &'static Encoding,
    /// Unmatched `(`, `[`, `{` currently open in code
    enclosure_nesting: usize,
    /// Code-level `{` inside the current `#{ … }`
    brace_nesting: usize,
    /// Enclosure depth at the most recent `->`, expecting its body opener
    lambda_enclosure_nesting: Option<usize>,
    command_start: bool,
    do_loop_stack: FlagStack,
    accepts_block_stack: FlagStack,
    /// Resume point past already-lexed heredoc bodies (0 = none pending)
    heredoc_end: usize,
    /// Dedent width of the most recently closed `<<~` heredoc
    last_heredoc_dedent: usize,
    seen_semantic_token: bool,
    data_span: Option<ByteSpan>,
    /// Settings gathered from magic comments
    pub magic: MagicState,
    config: LexerConfig,
    shebang_callback: Option<Box<dyn FnMut(&[u8])>>,
    encoding_callback: Option<Box<dyn FnMut(&'static Encoding)>>,
}

impl<'src> Lexer<'src> {
    /// Create a lexer with default configuration
    pub fn new(source: &'src [u8]) -> Self {
        Self::with_config(source, LexerConfig::default())
    }

    /// Create a lexer with explicit configuration
    pub fn with_config(source: &'src [u8], config: LexerConfig) -> Self {
        Lexer {
            source,
            position: 0,
            line_start: 0,
            state: LexState::BEG,
            modes: ModeStack::new(),
            newlines: NewlineIndex::with_source_len(source.len()),
            diagnostics: DiagnosticList::new(),
            comments: Vec::new(),
            encoding: &encoding::UTF_8,
            enclosure_nesting: 0,
            brace_nesting: 0,
            lambda_enclosure_nesting: None,
            command_start: true,
            do_loop_stack: FlagStack::default(),
            accepts_block_stack: FlagStack::default(),
            heredoc_end: 0,
            last_heredoc_dedent: 0,
            seen_semantic_token: false,
            data_span: None,
            magic: MagicState::default(),
            config,
            shebang_callback: None,
            encoding_callback: None,
        }
    }

    /// Register a callback invoked with the shebang line when it names ruby
    pub fn on_shebang(&mut self, callback: Box<dyn FnMut(&[u8])>) {
        self.shebang_callback = Some(callback);
    }

    /// Register a callback invoked when a magic comment switches encodings
    pub fn on_encoding_change(&mut self, callback: Box<dyn FnMut(&'static Encoding)>) {
        self.encoding_callback = Some(callback);
    }

    /// The source buffer
    pub fn source(&self) -> &'src [u8] {
        self.source
    }

    /// The active source encoding
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Override the initial source encoding (the caller's `encoding` option)
    pub fn set_encoding(&mut self, record: &'static Encoding) {
        self.encoding = record;
    }

    /// Current lex state
    pub fn state(&self) -> LexState {
        self.state
    }

    /// Overwrite the lex state (the parser steers a few transitions)
    pub fn set_state(&mut self, state: LexState) {
        self.state = state;
    }

    /// The `__END__` data range, if one was seen
    pub fn data_span(&self) -> Option<ByteSpan> {
        self.data_span
    }

    /// Dedent width of the most recently closed `<<~` heredoc
    pub fn heredoc_dedent(&self) -> usize {
        self.last_heredoc_dedent
    }

    /// Depth of the lex-mode stack (1 = plain code)
    pub fn mode_depth(&self) -> usize {
        self.modes.depth()
    }

    /// Parser hook: entering a `while`/`until`/`for` predicate
    pub fn do_loop_push(&mut self, value: bool) {
        self.do_loop_stack.push(value);
    }

    /// Parser hook: leaving a predicate
    pub fn do_loop_pop(&mut self) {
        self.do_loop_stack.pop();
    }

    /// Parser hook: entering command arguments that may take a block
    pub fn accepts_block_push(&mut self, value: bool) {
        self.accepts_block_stack.push(value);
    }

    /// Parser hook: leaving command arguments
    pub fn accepts_block_pop(&mut self) {
        self.accepts_block_stack.pop();
    }

    /// Produce the next token. Always returns [`TokenKind::Eof`] at and
    /// after the end of input.
    pub fn next_token(&mut self) -> Token {
        loop {
            match self.modes.current() {
                LexMode::Heredoc { .. } => return self.lex_heredoc_body(),
                LexMode::String { .. } => return self.lex_string_body(),
                LexMode::List { .. } => return self.lex_list_body(),
                LexMode::Regexp { .. } => return self.lex_regexp_body(),
                LexMode::EmbVar => return self.lex_embedded_variable(),
                LexMode::Default | LexMode::EmbExpr { .. } => {
                    if let Some(token) = self.lex_code() {
                        if token.kind != TokenKind::Newline {
                            self.seen_semantic_token = true;
                        }
                        return token;
                    }
                    // A literal opener pushed a mode; dispatch again.
                }
            }
        }
    }

    // ===== trivia =====

    /// Records a newline at `offset` (idempotent across re-crossings).
    fn record_newline(&mut self, offset: usize) {
        self.newlines.push(offset);
    }

    /// Consumes a `\n` in code, jumping past pending heredoc bodies.
    fn consume_code_newline(&mut self, newline_pos: usize) {
        self.record_newline(newline_pos);
        if self.heredoc_end > newline_pos {
            self.position = self.heredoc_end;
            self.heredoc_end = 0;
        } else {
            self.position = newline_pos + 1;
        }
        self.line_start = self.position;
    }

    /// After a newline, looks ahead over whitespace and comments for a
    /// leading `.` or `&.` method-call continuation.
    fn newline_is_call_continuation(&self) -> bool {
        let mut pos = self.position;
        loop {
            match self.source.get(pos) {
                Some(b' ' | b'\t' | b'\x0B' | b'\x0C' | b'\r') => pos += 1,
                Some(b'\n') => return false,
                Some(b'#') => {
                    while pos < self.source.len() && self.source[pos] != b'\n' {
                        pos += 1;
                    }
                }
                Some(b'.') => return self.source.get(pos + 1) != Some(&b'.'),
                Some(b'&') => return self.source.get(pos + 1) == Some(&b'.'),
                _ => return false,
            }
        }
    }

    /// Handles one comment starting at `#`; returns the position after it.
    fn scan_comment(&mut self, start: usize) -> usize {
        let mut end = start;
        while end < self.source.len() && self.source[end] != b'\n' {
            end += 1;
        }
        // Exclude a trailing CR from the recorded span
        let visible_end = if end > start && self.source[end - 1] == b'\r' { end - 1 } else { end };
        let span = ByteSpan::new(start, visible_end);
        self.comments.push(span);
        self.process_magic_comment(span);
        end
    }

    fn process_magic_comment(&mut self, span: ByteSpan) {
        let comment = span.slice(self.source);
        for pragma in ruby_pragma::scan_comment(comment, span.start) {
            let key = pragma.key.slice(self.source);
            let Some(kind) = MagicKind::from_key(key) else { continue };
            if self.seen_semantic_token {
                self.diagnostics.warning(pragma.key, DiagnosticId::MagicCommentIgnoredWarning);
                continue;
            }
            let value = pragma.value.slice(self.source);
            match kind {
                MagicKind::Encoding => {
                    if self.config.encoding_locked {
                        continue;
                    }
                    match encoding::find(value) {
                        Some(record) => {
                            self.encoding = record;
                            self.magic.encoding_name = Some(record.name.to_string());
                            if let Some(callback) = self.encoding_callback.as_mut() {
                                callback(record);
                            }
                        }
                        None => {
                            self.diagnostics.error(pragma.value, DiagnosticId::EncodingUnknown);
                        }
                    }
                }
                MagicKind::FrozenStringLiteral => match ruby_pragma::parse_bool(value) {
                    Some(flag) => self.magic.frozen_string_literal = Some(flag),
                    None => self
                        .diagnostics
                        .warning(pragma.value, DiagnosticId::MagicCommentUnknownWarning),
                },
                MagicKind::ShareableConstantValue => {
                    match ShareableConstantValue::from_value(value) {
                        Some(setting) => self.magic.shareable_constant_value = Some(setting),
                        None => self
                            .diagnostics
                            .warning(pragma.value, DiagnosticId::MagicCommentUnknownWarning),
                    }
                }
                MagicKind::WarnIndent => match ruby_pragma::parse_bool(value) {
                    Some(flag) => self.magic.warn_indent = Some(flag),
                    None => self
                        .diagnostics
                        .warning(pragma.value, DiagnosticId::MagicCommentUnknownWarning),
                },
            }
        }
    }

    /// Handles the shebang at position 0, including the `-x` search.
    fn handle_shebang(&mut self) {
        if self.source.first() == Some(&b'#') && self.source.get(1) == Some(&b'!') {
            let mut end = 0;
            while end < self.source.len() && self.source[end] != b'\n' {
                end += 1;
            }
            let line = &self.source[..end];
            if contains_ruby(line) {
                if let Some(callback) = self.shebang_callback.as_mut() {
                    callback(line);
                }
                self.position = end;
                return;
            }
        } else if !self.config.search_shebang {
            return;
        }

        if self.config.search_shebang {
            // Skip everything up to a `#!` line containing "ruby".
            let mut pos = self.position;
            let mut line_start = pos;
            while pos < self.source.len() {
                if self.source[pos] == b'\n' {
                    self.record_newline(pos);
                    pos += 1;
                    line_start = pos;
                    if self.source[line_start..].starts_with(b"#!") {
                        let mut end = line_start;
                        while end < self.source.len() && self.source[end] != b'\n' {
                            end += 1;
                        }
                        if contains_ruby(&self.source[line_start..end]) {
                            if let Some(callback) = self.shebang_callback.as_mut() {
                                callback(&self.source[line_start..end]);
                            }
                            self.position = end;
                            self.line_start = line_start;
                            return;
                        }
                    }
                } else {
                    pos += 1;
                }
            }
        }
    }

    /// Skips `=begin … =end` embedded documentation; the cursor sits at the
    /// `=` of a line-leading `=begin`.
    fn scan_embedded_doc(&mut self) {
        let start = self.position;
        loop {
            // Consume to end of the current line
            while self.position < self.source.len() && self.source[self.position] != b'\n' {
                self.position += 1;
            }
            if self.position >= self.source.len() {
                self.diagnostics
                    .error(ByteSpan::new(start, self.position), DiagnosticId::EmbDocUnterminated);
                break;
            }
            self.record_newline(self.position);
            self.position += 1;
            self.line_start = self.position;
            if self.source[self.position..].starts_with(b"=end")
                && matches!(
                    self.source.get(self.position + 4),
                    None | Some(b'\n' | b'\r' | b' ' | b'\t')
                )
            {
                while self.position < self.source.len() && self.source[self.position] != b'\n' {
                    self.position += 1;
                }
                break;
            }
        }
        self.comments.push(ByteSpan::new(start, self.position));
    }

    // ===== code lexing =====

    /// Lexes one token in code context (default or embedded-expression
    /// mode). Returns `None` when a literal opener pushed a new mode and the
    /// dispatcher should re-enter.
    fn lex_code(&mut self) -> Option<Token> {
        if self.position == 0 {
            self.handle_shebang();
        }

        let mut space_before = false;
        // Trivia: whitespace, comments, insignificant newlines
        loop {
            let Some(&b) = self.source.get(self.position) else {
                return Some(self.eof_token());
            };
            match b {
                b' ' | b'\t' | b'\x0B' | b'\x0C' => {
                    self.position += 1;
                    space_before = true;
                }
                b'\r' => {
                    if self.source.get(self.position + 1) != Some(&b'\n') {
                        self.diagnostics.warning(
                            ByteSpan::new(self.position, self.position + 1),
                            DiagnosticId::CarriageReturnWarning,
                        );
                    }
                    self.position += 1;
                    space_before = true;
                }
                b'\\' => {
                    // Backslash-newline is a line continuation
                    match self.source.get(self.position + 1) {
                        Some(b'\n') => {
                            self.record_newline(self.position + 1);
                            self.position += 2;
                            self.line_start = self.position;
                            space_before = true;
                        }
                        Some(b'\r') if self.source.get(self.position + 2) == Some(&b'\n') => {
                            self.record_newline(self.position + 2);
                            self.position += 3;
                            self.line_start = self.position;
                            space_before = true;
                        }
                        _ => break,
                    }
                }
                b'#' => {
                    self.position = self.scan_comment(self.position);
                    space_before = true;
                }
                b'\n' => {
                    let newline_pos = self.position;
                    self.consume_code_newline(newline_pos);
                    if self.state.ignores_newline() || self.newline_is_call_continuation() {
                        space_before = true;
                        continue;
                    }
                    self.state = LexState::BEG;
                    self.command_start = true;
                    return Some(Token::new(TokenKind::Newline, newline_pos, newline_pos + 1));
                }
                b'=' if self.position == self.line_start
                    && self.source[self.position..].starts_with(b"=begin")
                    && matches!(
                        self.source.get(self.position + 6),
                        None | Some(b'\n' | b'\r' | b' ' | b'\t')
                    ) =>
                {
                    self.scan_embedded_doc();
                    space_before = true;
                }
                _ => break,
            }
        }

        // `__END__` alone on a line at column 0
        if self.position == self.line_start
            && self.source[self.position..].starts_with(b"__END__")
        {
            let after = self.source.get(self.position + 7);
            if matches!(after, None | Some(b'\n')) || (after == Some(&b'\r')
                && self.source.get(self.position + 8) == Some(&b'\n'))
            {
                self.data_span = Some(ByteSpan::new(self.position, self.source.len()));
                return Some(Token::new(TokenKind::Eof, self.position, self.position));
            }
        }

        Some(self.dispatch(space_before))
    }

    fn eof_token(&mut self) -> Token {
        if self.modes.depth() > 1 {
            // Unbalanced interpolation at EOF
            self.modes.pop();
        }
        Token::new(TokenKind::Eof, self.position, self.position)
    }

    /// True for bytes that can follow an operator as the start of a value,
    /// making a spaced operator an ambiguity worth warning about.
    fn warn_ambiguous_prefix(&mut self, start: usize, operator: &str) {
        if !self.config.suppress_minor_warnings {
            self.diagnostics.warning_with(
                ByteSpan::new(start, self.position),
                DiagnosticId::AmbiguousPrefixWarning,
                operator,
            );
        }
    }

    /// Main byte dispatch for one code token.
    fn dispatch(&mut self, space_before: bool) -> Token {
        let start = self.position;
        let b = self.source[self.position];
        match b {
            b'\0' | 0x04 | 0x1A => Token::new(TokenKind::Eof, start, start),

            b'(' => {
                self.position += 1;
                self.enclosure_nesting += 1;
                self.do_loop_stack.push(false);
                self.accepts_block_stack.push(false);
                self.state = LexState::BEG | LexState::LABEL;
                self.command_start = true;
                Token::new(TokenKind::ParenLeft, start, self.position)
            }
            b')' => {
                self.position += 1;
                self.enclosure_nesting = self.enclosure_nesting.saturating_sub(1);
                self.do_loop_stack.pop();
                self.accepts_block_stack.pop();
                self.state = LexState::ENDFN;
                Token::new(TokenKind::ParenRight, start, self.position)
            }
            b'[' => {
                if self.state.is_fname() {
                    return self.lex_bracket_method_name(start);
                }
                self.position += 1;
                self.enclosure_nesting += 1;
                self.do_loop_stack.push(false);
                self.accepts_block_stack.push(false);
                let kind = if self.state.is_beg() || self.state.spaced_arg(space_before, false) {
                    TokenKind::BracketLeftArray
                } else {
                    TokenKind::BracketLeft
                };
                self.state = LexState::BEG | LexState::LABEL;
                Token::new(kind, start, self.position)
            }
            b']' => {
                self.position += 1;
                self.enclosure_nesting = self.enclosure_nesting.saturating_sub(1);
                self.do_loop_stack.pop();
                self.accepts_block_stack.pop();
                self.state = LexState::END;
                Token::new(TokenKind::BracketRight, start, self.position)
            }
            b'{' => {
                self.position += 1;
                let kind = if self.lambda_enclosure_nesting == Some(self.enclosure_nesting) {
                    self.lambda_enclosure_nesting = None;
                    TokenKind::LambdaBegin
                } else {
                    TokenKind::BraceLeft
                };
                self.enclosure_nesting += 1;
                self.brace_nesting += 1;
                self.do_loop_stack.push(false);
                self.accepts_block_stack.push(false);
                self.state = LexState::BEG | LexState::LABEL;
                self.command_start = true;
                Token::new(kind, start, self.position)
            }
            b'}' => {
                if self.brace_nesting == 0 {
                    if let LexMode::EmbExpr { saved_brace_nesting } = *self.modes.current() {
                        self.position += 1;
                        self.modes.pop();
                        self.brace_nesting = saved_brace_nesting;
                        self.state = LexState::END;
                        return Token::new(TokenKind::EmbexprEnd, start, self.position);
                    }
                }
                self.position += 1;
                self.brace_nesting = self.brace_nesting.saturating_sub(1);
                self.enclosure_nesting = self.enclosure_nesting.saturating_sub(1);
                self.do_loop_stack.pop();
                self.accepts_block_stack.pop();
                self.state = LexState::END;
                Token::new(TokenKind::BraceRight, start, self.position)
            }
            b';' => {
                self.position += 1;
                self.state = LexState::BEG;
                self.command_start = true;
                Token::new(TokenKind::Semicolon, start, self.position)
            }
            b',' => {
                self.position += 1;
                self.state = LexState::BEG | LexState::LABEL;
                Token::new(TokenKind::Comma, start, self.position)
            }
            b'.' => {
                if self.source.get(start + 1) == Some(&b'.') {
                    let three = self.source.get(start + 2) == Some(&b'.');
                    self.position += if three { 3 } else { 2 };
                    let beg = self.state.is_beg();
                    self.state = LexState::BEG;
                    let kind = match (three, beg) {
                        (false, false) => TokenKind::DotDot,
                        (true, false) => TokenKind::DotDotDot,
                        (false, true) => TokenKind::UDotDot,
                        (true, true) => TokenKind::UDotDotDot,
                    };
                    Token::new(kind, start, self.position)
                } else {
                    self.position += 1;
                    self.state = LexState::DOT;
                    Token::new(TokenKind::Dot, start, self.position)
                }
            }
            b'0'..=b'9' => self.lex_number(start),
            b'"' => {
                self.position += 1;
                self.modes.push(LexMode::string(true, self.label_possible(), 0, b'"'));
                Token::new(TokenKind::StringBegin, start, self.position)
            }
            b'\'' => {
                self.position += 1;
                self.modes.push(LexMode::string(false, self.label_possible(), 0, b'\''));
                Token::new(TokenKind::StringBegin, start, self.position)
            }
            b'`' => {
                self.position += 1;
                if self.state.is_fname() {
                    self.state = LexState::ENDFN;
                    return Token::new(TokenKind::MethodName, start, self.position);
                }
                self.modes.push(LexMode::string(true, false, 0, b'`'));
                Token::new(TokenKind::XStringBegin, start, self.position)
            }
            b'%' => self.lex_percent(start, space_before),
            b'/' => self.lex_slash(start, space_before),
            b'*' => self.lex_star(start, space_before),
            b'+' | b'-' => self.lex_plus_minus(start, space_before),
            b'&' => self.lex_ampersand(start, space_before),
            b'|' => self.lex_pipe(start),
            b'<' => self.lex_less(start, space_before),
            b'>' => self.lex_greater(start),
            b'=' => self.lex_equal(start),
            b'!' => self.lex_bang(start),
            b'^' => {
                if self.source.get(start + 1) == Some(&b'=') {
                    self.position += 2;
                    self.state = LexState::BEG;
                    Token::new(TokenKind::CaretEqual, start, self.position)
                } else {
                    self.position += 1;
                    self.state = LexState::BEG;
                    Token::new(TokenKind::Caret, start, self.position)
                }
            }
            b'~' => {
                self.position += 1;
                // `def ~` names the complement operator
                if self.state.is_fname() {
                    self.state = LexState::ENDFN;
                } else {
                    self.state = LexState::BEG;
                }
                Token::new(TokenKind::Tilde, start, self.position)
            }
            b':' => self.lex_colon(start),
            b'?' => self.lex_question(start),
            b'@' => self.lex_at_variable(start),
            b'$' => self.lex_global_variable(start),
            b'_' => self.lex_identifier(start),
            b'a'..=b'z' | b'A'..=b'Z' => self.lex_identifier(start),
            _ => {
                let width = (self.encoding.char_width)(&self.source[start..]);
                if width > 1 && (self.encoding.alpha_char)(&self.source[start..]) > 0 {
                    return self.lex_identifier(start);
                }
                let skip = width.max(1);
                self.position += skip;
                self.diagnostics.error(
                    ByteSpan::new(start, self.position),
                    if width == 0 {
                        DiagnosticId::EncodingInvalidByteSequence
                    } else {
                        DiagnosticId::UnexpectedToken
                    },
                );
                Token::new(TokenKind::Missing, start, self.position)
            }
        }
    }

    /// True when a label (`foo:`) would be accepted at this position.
    fn label_possible(&self) -> bool {
        self.state.any(LexState::LABEL)
            || self.state.any(LexState::ARG_ANY)
            || self.state.any(LexState::ENDFN)
    }

    fn lex_bracket_method_name(&mut self, start: usize) -> Token {
        // `def []` / `def []=` / `alias [] fetch`
        if self.source.get(start + 1) == Some(&b']') {
            if self.source.get(start + 2) == Some(&b'=') {
                self.position += 3;
                self.state = LexState::ENDFN;
                return Token::new(TokenKind::BracketLeftRightEqual, start, self.position);
            }
            self.position += 2;
            self.state = LexState::ENDFN;
            return Token::new(TokenKind::BracketLeftRight, start, self.position);
        }
        self.position += 1;
        self.enclosure_nesting += 1;
        self.state = LexState::BEG | LexState::LABEL;
        Token::new(TokenKind::BracketLeft, start, self.position)
    }

    fn lex_number(&mut self, start: usize) -> Token {
        let scanned = numbers::scan_number(self.source, start, &mut self.diagnostics);
        self.position = scanned.end;
        self.state = LexState::END;
        Token::new(scanned.kind, start, self.position)
    }

    fn lex_slash(&mut self, start: usize, space_before: bool) -> Token {
        let space_after = matches!(self.source.get(start + 1), Some(b' ' | b'\t'));
        if self.state.is_beg() {
            self.position += 1;
            self.modes.push(LexMode::regexp(0, b'/'));
            return Token::new(TokenKind::RegexpBegin, start, self.position);
        }
        if self.state.spaced_arg(space_before, space_after) {
            if !self.config.suppress_minor_warnings {
                self.diagnostics.warning(
                    ByteSpan::new(start, start + 1),
                    DiagnosticId::AmbiguousSlashWarning,
                );
            }
            self.position += 1;
            self.modes.push(LexMode::regexp(0, b'/'));
            return Token::new(TokenKind::RegexpBegin, start, self.position);
        }
        if self.source.get(start + 1) == Some(&b'=') {
            self.position += 2;
            self.state = LexState::BEG;
            return Token::new(TokenKind::SlashEqual, start, self.position);
        }
        self.position += 1;
        self.state = if self.state.is_fname() { LexState::ENDFN } else { LexState::BEG };
        Token::new(TokenKind::Slash, start, self.position)
    }

    fn lex_star(&mut self, start: usize, space_before: bool) -> Token {
        let double = self.source.get(start + 1) == Some(&b'*');
        let after_op = start + if double { 2 } else { 1 };
        if self.source.get(after_op) == Some(&b'=') && !self.state.is_beg() {
            self.position = after_op + 1;
            self.state = LexState::BEG;
            return Token::new(
                if double { TokenKind::StarStarEqual } else { TokenKind::StarEqual },
                start,
                self.position,
            );
        }
        let space_after = matches!(self.source.get(after_op), Some(b' ' | b'\t'));
        let unary = self.state.is_beg() || self.state.spaced_arg(space_before, space_after);
        if unary && self.state.spaced_arg(space_before, space_after) {
            self.warn_ambiguous_prefix(start, if double { "**" } else { "*" });
        }
        self.position = after_op;
        let kind = match (double, unary) {
            (false, false) => TokenKind::Star,
            (true, false) => TokenKind::StarStar,
            (false, true) => TokenKind::UStar,
            (true, true) => TokenKind::UStarStar,
        };
        self.state = if self.state.is_fname() { LexState::ENDFN } else { LexState::BEG };
        Token::new(kind, start, self.position)
    }

    fn lex_plus_minus(&mut self, start: usize, space_before: bool) -> Token {
        let b = self.source[start];
        let next = self.source.get(start + 1).copied();
        if next == Some(b'=') {
            self.position += 2;
            self.state = LexState::BEG;
            return Token::new(
                if b == b'+' { TokenKind::PlusEqual } else { TokenKind::MinusEqual },
                start,
                self.position,
            );
        }
        if b == b'-' && next == Some(b'>') {
            self.position += 2;
            self.lambda_enclosure_nesting = Some(self.enclosure_nesting);
            self.state = LexState::ENDFN;
            return Token::new(TokenKind::MinusGreater, start, self.position);
        }
        if self.state.is_fname() {
            // `def +`, `def -@` style method names
            self.position += 1;
            if self.source.get(self.position) == Some(&b'@') {
                self.position += 1;
                self.state = LexState::ENDFN;
                return Token::new(
                    if b == b'+' { TokenKind::UPlus } else { TokenKind::UMinus },
                    start,
                    self.position,
                );
            }
            self.state = LexState::ENDFN;
            return Token::new(
                if b == b'+' { TokenKind::Plus } else { TokenKind::Minus },
                start,
                self.position,
            );
        }
        let space_after = matches!(next, Some(b' ' | b'\t'));
        if self.state.is_beg() || self.state.spaced_arg(space_before, space_after) {
            if self.state.spaced_arg(space_before, space_after) {
                self.warn_ambiguous_prefix(start, if b == b'+' { "+" } else { "-" });
            }
            self.position += 1;
            let digit_follows = self.source.get(self.position).is_some_and(u8::is_ascii_digit);
            self.state = LexState::BEG;
            let kind = match (b, digit_follows) {
                (b'-', true) => TokenKind::UMinusNum,
                (b'-', false) => TokenKind::UMinus,
                (_, _) => TokenKind::UPlus,
            };
            return Token::new(kind, start, self.position);
        }
        self.position += 1;
        self.state = LexState::BEG;
        Token::new(if b == b'+' { TokenKind::Plus } else { TokenKind::Minus }, start, self.position)
    }

    fn lex_ampersand(&mut self, start: usize, space_before: bool) -> Token {
        match self.source.get(start + 1) {
            Some(b'&') => {
                if self.source.get(start + 2) == Some(&b'=') {
                    self.position += 3;
                    self.state = LexState::BEG;
                    Token::new(TokenKind::AmpAmpEqual, start, self.position)
                } else {
                    self.position += 2;
                    self.state = LexState::BEG;
                    Token::new(TokenKind::AmpAmp, start, self.position)
                }
            }
            Some(b'.') => {
                self.position += 2;
                self.state = LexState::DOT;
                Token::new(TokenKind::AmpDot, start, self.position)
            }
            Some(b'=') => {
                self.position += 2;
                self.state = LexState::BEG;
                Token::new(TokenKind::AmpEqual, start, self.position)
            }
            next => {
                let space_after = matches!(next, Some(b' ' | b'\t'));
                let unary =
                    self.state.is_beg() || self.state.spaced_arg(space_before, space_after);
                if unary && self.state.spaced_arg(space_before, space_after) {
                    self.warn_ambiguous_prefix(start, "&");
                }
                self.position += 1;
                self.state = if self.state.is_fname() {
                    LexState::ENDFN
                } else {
                    LexState::BEG
                };
                Token::new(
                    if unary { TokenKind::UAmp } else { TokenKind::Amp },
                    start,
                    self.position,
                )
            }
        }
    }

    fn lex_pipe(&mut self, start: usize) -> Token {
        match self.source.get(start + 1) {
            Some(b'|') => {
                if self.source.get(start + 2) == Some(&b'=') {
                    self.position += 3;
                    self.state = LexState::BEG;
                    Token::new(TokenKind::PipePipeEqual, start, self.position)
                } else if self.state.is_beg() {
                    // `||` at expression start is two empty block-parameter
                    // pipes; hand back one and re-lex the second.
                    self.position += 1;
                    self.state = LexState::BEG | LexState::LABEL;
                    Token::new(TokenKind::Pipe, start, self.position)
                } else {
                    self.position += 2;
                    self.state = LexState::BEG;
                    Token::new(TokenKind::PipePipe, start, self.position)
                }
            }
            Some(b'=') => {
                self.position += 2;
                self.state = LexState::BEG;
                Token::new(TokenKind::PipeEqual, start, self.position)
            }
            _ => {
                self.position += 1;
                self.state = if self.state.is_fname() {
                    LexState::ENDFN
                } else {
                    LexState::BEG | LexState::LABEL
                };
                Token::new(TokenKind::Pipe, start, self.position)
            }
        }
    }

    fn lex_less(&mut self, start: usize, space_before: bool) -> Token {
        if self.source.get(start + 1) == Some(&b'<') && !self.state.is_fname() {
            let heredoc_allowed =
                self.state.is_beg() || self.state.spaced_arg(space_before, false);
            if heredoc_allowed {
                if let Some(token) = self.try_heredoc_opener(start) {
                    return token;
                }
            }
        }
        match (self.source.get(start + 1), self.source.get(start + 2)) {
            (Some(b'='), Some(b'>')) => {
                self.position += 3;
                self.state = LexState::BEG;
                Token::new(TokenKind::LessEqualGreater, start, self.position)
            }
            (Some(b'='), _) => {
                self.position += 2;
                self.state = LexState::BEG;
                Token::new(TokenKind::LessEqual, start, self.position)
            }
            (Some(b'<'), Some(b'=')) => {
                self.position += 3;
                self.state = LexState::BEG;
                Token::new(TokenKind::LessLessEqual, start, self.position)
            }
            (Some(b'<'), _) => {
                self.position += 2;
                self.state = if self.state.is_fname() { LexState::ENDFN } else { LexState::BEG };
                Token::new(TokenKind::LessLess, start, self.position)
            }
            _ => {
                self.position += 1;
                self.state = if self.state.is_fname() { LexState::ENDFN } else { LexState::BEG };
                Token::new(TokenKind::Less, start, self.position)
            }
        }
    }

    fn lex_greater(&mut self, start: usize) -> Token {
        match (self.source.get(start + 1), self.source.get(start + 2)) {
            (Some(b'='), _) => {
                self.position += 2;
                self.state = LexState::BEG;
                Token::new(TokenKind::GreaterEqual, start, self.position)
            }
            (Some(b'>'), Some(b'=')) => {
                self.position += 3;
                self.state = LexState::BEG;
                Token::new(TokenKind::GreaterGreaterEqual, start, self.position)
            }
            (Some(b'>'), _) => {
                self.position += 2;
                self.state = if self.state.is_fname() { LexState::ENDFN } else { LexState::BEG };
                Token::new(TokenKind::GreaterGreater, start, self.position)
            }
            _ => {
                self.position += 1;
                self.state = if self.state.is_fname() { LexState::ENDFN } else { LexState::BEG };
                Token::new(TokenKind::Greater, start, self.position)
            }
        }
    }

    fn lex_equal(&mut self, start: usize) -> Token {
        match (self.source.get(start + 1), self.source.get(start + 2)) {
            (Some(b'='), Some(b'=')) => {
                self.position += 3;
                self.state = LexState::BEG;
                Token::new(TokenKind::EqualEqualEqual, start, self.position)
            }
            (Some(b'='), _) => {
                self.position += 2;
                self.state = LexState::BEG;
                Token::new(TokenKind::EqualEqual, start, self.position)
            }
            (Some(b'~'), _) => {
                self.position += 2;
                self.state = LexState::BEG;
                Token::new(TokenKind::EqualTilde, start, self.position)
            }
            (Some(b'>'), _) => {
                self.position += 2;
                self.state = LexState::BEG | LexState::LABEL;
                Token::new(TokenKind::EqualGreater, start, self.position)
            }
            _ => {
                self.position += 1;
                self.state = LexState::BEG;
                self.command_start = true;
                Token::new(TokenKind::Equal, start, self.position)
            }
        }
    }

    fn lex_bang(&mut self, start: usize) -> Token {
        match self.source.get(start + 1) {
            Some(b'=') => {
                self.position += 2;
                self.state = LexState::BEG;
                Token::new(TokenKind::BangEqual, start, self.position)
            }
            Some(b'~') => {
                self.position += 2;
                self.state = LexState::BEG;
                Token::new(TokenKind::BangTilde, start, self.position)
            }
            _ => {
                self.position += 1;
                self.state = if self.state.is_fname() { LexState::ENDFN } else { LexState::BEG };
                Token::new(TokenKind::Bang, start, self.position)
            }
        }
    }

    fn lex_colon(&mut self, start: usize) -> Token {
        if self.source.get(start + 1) == Some(&b':') {
            self.position += 2;
            let kind = if self.state.is_beg() {
                self.state = LexState::BEG;
                TokenKind::UColonColon
            } else {
                self.state = LexState::DOT;
                TokenKind::ColonColon
            };
            return Token::new(kind, start, self.position);
        }
        match self.source.get(start + 1) {
            None | Some(b' ' | b'\t' | b'\n' | b'\r' | b'#') => {
                self.position += 1;
                self.state = LexState::BEG;
                Token::new(TokenKind::Colon, start, self.position)
            }
            Some(b'"') => {
                self.position += 2;
                self.modes.push(LexMode::string(true, false, 0, b'"'));
                Token::new(TokenKind::SymbolBegin, start, self.position)
            }
            Some(b'\'') => {
                self.position += 2;
                self.modes.push(LexMode::string(false, false, 0, b'\''));
                Token::new(TokenKind::SymbolBegin, start, self.position)
            }
            Some(_) if self.state.is_end() => {
                // Ternary separator after a complete expression
                self.position += 1;
                self.state = LexState::BEG;
                Token::new(TokenKind::Colon, start, self.position)
            }
            Some(_) => {
                self.position += 1;
                self.state = LexState::FNAME | LexState::FITEM;
                Token::new(TokenKind::SymbolBegin, start, self.position)
            }
        }
    }

    fn lex_question(&mut self, start: usize) -> Token {
        if self.state.is_end() {
            self.position += 1;
            self.state = LexState::BEG;
            return Token::new(TokenKind::Question, start, self.position);
        }
        match self.source.get(start + 1) {
            None => {
                self.position += 1;
                self.diagnostics.error(
                    ByteSpan::new(start, self.position),
                    DiagnosticId::IncompleteCharacterSyntax,
                );
                self.state = LexState::BEG;
                Token::new(TokenKind::Question, start, self.position)
            }
            Some(b' ' | b'\t' | b'\n' | b'\r' | b'\x0B' | b'\x0C') => {
                self.position += 1;
                self.state = LexState::BEG;
                Token::new(TokenKind::Question, start, self.position)
            }
            Some(b'\\') => {
                // `?\n`, `?\u{41}` … scan the escape extent
                self.position = scan_escape_extent(self.source, start + 1);
                self.state = LexState::END;
                Token::new(TokenKind::CharacterLiteral, start, self.position)
            }
            Some(&c) => {
                let width = (self.encoding.char_width)(&self.source[start + 1..]).max(1);
                let after = self.source.get(start + 1 + width);
                let ident_like = c == b'_' || c.is_ascii_alphanumeric() || c >= 0x80;
                let followed_by_ident = after.is_some_and(|&a| {
                    a == b'_' || a.is_ascii_alphanumeric() || a >= 0x80
                });
                if ident_like && followed_by_ident {
                    // `?ab` is a ternary over an identifier, not a character
                    self.position += 1;
                    self.state = LexState::BEG;
                    Token::new(TokenKind::Question, start, self.position)
                } else {
                    self.position = start + 1 + width;
                    self.state = LexState::END;
                    Token::new(TokenKind::CharacterLiteral, start, self.position)
                }
            }
        }
    }

    fn lex_at_variable(&mut self, start: usize) -> Token {
        let class_var = self.source.get(start + 1) == Some(&b'@');
        let name_start = start + if class_var { 2 } else { 1 };
        let name_end = self.scan_identifier_extent(name_start);
        self.position = name_end;
        self.state = LexState::END;
        if name_end == name_start {
            self.diagnostics.error(
                ByteSpan::new(start, name_start.min(self.source.len())),
                if class_var {
                    DiagnosticId::ClassVariableInvalid
                } else {
                    DiagnosticId::InstanceVariableInvalid
                },
            );
            self.position = name_start.min(self.source.len());
            return Token::new(TokenKind::Missing, start, self.position);
        }
        if self.source.get(name_start).is_some_and(u8::is_ascii_digit) {
            self.diagnostics.error(
                ByteSpan::new(start, name_end),
                if class_var {
                    DiagnosticId::ClassVariableInvalid
                } else {
                    DiagnosticId::InstanceVariableInvalid
                },
            );
        }
        Token::new(
            if class_var { TokenKind::ClassVariable } else { TokenKind::InstanceVariable },
            start,
            self.position,
        )
    }

    fn lex_global_variable(&mut self, start: usize) -> Token {
        self.state = LexState::END;
        match self.source.get(start + 1) {
            Some(b'1'..=b'9') => {
                let mut end = start + 1;
                while end < self.source.len() && self.source[end].is_ascii_digit() {
                    end += 1;
                }
                self.position = end;
                Token::new(TokenKind::NthReference, start, self.position)
            }
            Some(b'&' | b'`' | b'\'' | b'+') => {
                self.position = start + 2;
                Token::new(TokenKind::BackReference, start, self.position)
            }
            Some(
                b'~' | b'*' | b'$' | b'?' | b'!' | b'@' | b'/' | b'\\' | b';' | b',' | b'.'
                | b'=' | b':' | b'<' | b'>' | b'"' | b'0',
            ) => {
                self.position = start + 2;
                Token::new(TokenKind::GlobalVariable, start, self.position)
            }
            Some(b'-') => {
                // `$-w` style option variables
                let end = self.scan_identifier_extent(start + 2);
                self.position = end.max(start + 2).min(self.source.len());
                Token::new(TokenKind::GlobalVariable, start, self.position)
            }
            _ => {
                let name_end = self.scan_identifier_extent(start + 1);
                if name_end == start + 1 {
                    self.position = (start + 1).min(self.source.len());
                    self.diagnostics.error(
                        ByteSpan::new(start, self.position),
                        DiagnosticId::GlobalVariableInvalid,
                    );
                    return Token::new(TokenKind::Missing, start, self.position);
                }
                self.position = name_end;
                Token::new(TokenKind::GlobalVariable, start, self.position)
            }
        }
    }

    /// Extent of an identifier starting at `pos` (may be empty).
    fn scan_identifier_extent(&self, pos: usize) -> usize {
        let mut end = pos;
        // Leading character must not be a digit; callers diagnose that case.
        while end < self.source.len() {
            let b = self.source[end];
            if b == b'_' || b.is_ascii_alphanumeric() {
                end += 1;
            } else if b >= 0x80 {
                let width = (self.encoding.alnum_char)(&self.source[end..]);
                if width == 0 {
                    break;
                }
                end += width;
            } else {
                break;
            }
        }
        end
    }

    fn lex_identifier(&mut self, start: usize) -> Token {
        let mut end = self.scan_identifier_extent(start);
        // Trailing `?` / `!` belong to the name unless `=` follows (`a != b`)
        if matches!(self.source.get(end), Some(b'?' | b'!'))
            && self.source.get(end + 1) != Some(&b'=')
        {
            end += 1;
        } else if self.state.is_fname()
            && self.source.get(end) == Some(&b'=')
            && !matches!(self.source.get(end + 1), Some(b'=' | b'~' | b'>'))
        {
            // Setter name in `def foo=` / `alias foo= bar=`
            end += 1;
        }
        self.position = end;
        let text = &self.source[start..end];

        if self.state.is_fname() {
            self.state = LexState::ENDFN;
            return Token::new(TokenKind::MethodName, start, end);
        }

        // Keywords (never after `.`/`&.`, which is handled above)
        if let Some(kind) = keyword_kind(text) {
            return self.lex_keyword(kind, start, end);
        }

        // Labels: `ident:` with no space, not `::`
        if self.source.get(end) == Some(&b':')
            && self.source.get(end + 1) != Some(&b':')
            && self.label_possible()
        {
            self.position = end + 1;
            self.state = LexState::BEG | LexState::LABELED;
            return Token::new(TokenKind::Label, start, end + 1);
        }

        let constant = (self.encoding.isupper_char)(text);
        let cmd_state = self.command_start;
        self.command_start = false;
        self.state = if cmd_state {
            LexState::CMDARG
        } else if self.state.any(LexState::BEG_ANY) || self.state.any(LexState::ARG_ANY) {
            LexState::ARG
        } else {
            LexState::ENDFN
        };
        Token::new(
            if constant { TokenKind::Constant } else { TokenKind::Identifier },
            start,
            end,
        )
    }

    fn lex_keyword(&mut self, kind: TokenKind, start: usize, end: usize) -> Token {
        use TokenKind::*;
        let kind = match kind {
            KeywordDo => {
                if self.lambda_enclosure_nesting == Some(self.enclosure_nesting) {
                    self.lambda_enclosure_nesting = None;
                    KeywordDo
                } else if self.do_loop_stack.top() {
                    KeywordDoLoop
                } else {
                    KeywordDo
                }
            }
            other => other,
        };
        self.command_start = false;
        self.state = match kind {
            KeywordReturn | KeywordBreak | KeywordNext => LexState::MID,
            KeywordDef => LexState::FNAME,
            KeywordAlias | KeywordUndef => LexState::FNAME | LexState::FITEM,
            KeywordClass => LexState::CLASS,
            KeywordEnd | KeywordSelf | KeywordNil | KeywordTrue | KeywordFalse | KeywordRedo
            | KeywordRetry | KeywordFile | KeywordLine | KeywordEncoding => LexState::END,
            KeywordDefined | KeywordSuper | KeywordYield => LexState::ARG,
            _ => {
                self.command_start = true;
                LexState::BEG
            }
        };
        Token::new(kind, start, end)
    }

    // ===== percent literals =====

    fn lex_percent(&mut self, start: usize, space_before: bool) -> Token {
        let next = self.source.get(start + 1).copied();
        let beg = self.state.is_beg()
            || self
                .state
                .spaced_arg(space_before, matches!(next, Some(b' ' | b'\t')));
        if !beg {
            if next == Some(b'=') {
                self.position += 2;
                self.state = LexState::BEG;
                return Token::new(TokenKind::PercentEqual, start, self.position);
            }
            self.position += 1;
            self.state = if self.state.is_fname() { LexState::ENDFN } else { LexState::BEG };
            return Token::new(TokenKind::Percent, start, self.position);
        }

        let Some(type_byte) = next else {
            self.position += 1;
            self.diagnostics.error(
                ByteSpan::new(start, self.position),
                DiagnosticId::PercentUnterminated,
            );
            return Token::new(TokenKind::Percent, start, self.position);
        };

        let (kind_byte, delim_pos) = if type_byte.is_ascii_alphabetic() {
            (type_byte, start + 2)
        } else {
            (b'Q', start + 1)
        };

        let Some(&delim) = self.source.get(delim_pos) else {
            self.position = self.source.len();
            self.diagnostics.error(
                ByteSpan::new(start, self.position),
                DiagnosticId::PercentUnterminated,
            );
            return Token::new(TokenKind::Percent, start, self.position);
        };
        if delim.is_ascii_alphanumeric() || (delim >= 0x80) {
            self.position = start + 1;
            self.diagnostics.error(
                ByteSpan::new(start, delim_pos + 1),
                if type_byte.is_ascii_alphabetic() {
                    DiagnosticId::PercentInvalidDelimiter
                } else {
                    DiagnosticId::PercentUnknownType
                },
            );
            self.state = LexState::BEG;
            return Token::new(TokenKind::Percent, start, self.position);
        }

        let (incrementor, terminator) = paired_delimiters(delim);
        self.position = delim_pos + 1;
        let token_span = (start, self.position);

        let kind = match kind_byte {
            b'q' => {
                self.modes.push(LexMode::string(false, false, incrementor, terminator));
                TokenKind::StringBegin
            }
            b'Q' => {
                self.modes.push(LexMode::string(true, false, incrementor, terminator));
                TokenKind::StringBegin
            }
            b'w' => {
                self.modes.push(LexMode::list(false, incrementor, terminator));
                TokenKind::PercentLowerW
            }
            b'W' => {
                self.modes.push(LexMode::list(true, incrementor, terminator));
                TokenKind::PercentUpperW
            }
            b'i' => {
                self.modes.push(LexMode::list(false, incrementor, terminator));
                TokenKind::PercentLowerI
            }
            b'I' => {
                self.modes.push(LexMode::list(true, incrementor, terminator));
                TokenKind::PercentUpperI
            }
            b'r' => {
                self.modes.push(LexMode::regexp(incrementor, terminator));
                TokenKind::RegexpBegin
            }
            b's' => {
                self.modes.push(LexMode::string(false, false, incrementor, terminator));
                TokenKind::SymbolBegin
            }
            b'x' => {
                self.modes.push(LexMode::string(true, false, incrementor, terminator));
                TokenKind::XStringBegin
            }
            _ => {
                self.position = start + 1;
                self.diagnostics.error(
                    ByteSpan::new(start, start + 2),
                    DiagnosticId::PercentUnknownType,
                );
                self.state = LexState::BEG;
                return Token::new(TokenKind::Percent, start, self.position);
            }
        };
        Token::new(kind, token_span.0, token_span.1)
    }

    // ===== heredocs =====

    /// Tries to lex `<<ID`, `<<-ID`, `<<~ID` at `start`; `None` falls back
    /// to the shift operator.
    fn try_heredoc_opener(&mut self, start: usize) -> Option<Token> {
        let mut pos = start + 2;
        let indent = match self.source.get(pos) {
            Some(b'~') => {
                pos += 1;
                HeredocIndent::Tilde
            }
            Some(b'-') => {
                pos += 1;
                HeredocIndent::Dash
            }
            _ => HeredocIndent::None,
        };

        let (quote, ident_span) = match self.source.get(pos) {
            Some(&q @ (b'\'' | b'"' | b'`')) => {
                let ident_start = pos + 1;
                let mut end = ident_start;
                while end < self.source.len() && self.source[end] != q && self.source[end] != b'\n'
                {
                    end += 1;
                }
                if self.source.get(end) != Some(&q) {
                    self.diagnostics.error(
                        ByteSpan::new(start, end),
                        DiagnosticId::HeredocIdentifierUnterminated,
                    );
                    return None;
                }
                pos = end + 1;
                let quote = match q {
                    b'\'' => HeredocQuote::Single,
                    b'"' => HeredocQuote::Double,
                    _ => HeredocQuote::Backtick,
                };
                (quote, ByteSpan::new(ident_start, end))
            }
            Some(&c) if c == b'_' || c.is_ascii_alphanumeric() || c >= 0x80 => {
                let ident_start = pos;
                let end = self.scan_identifier_extent(ident_start);
                pos = end;
                (HeredocQuote::None, ByteSpan::new(ident_start, end))
            }
            _ => return None,
        };
        if ident_span.is_empty() {
            return None;
        }

        self.position = pos;
        self.modes.push(LexMode::heredoc(ident_span, quote, indent));
        self.state = LexState::END;
        Some(Token::new(TokenKind::HeredocStart, start, pos))
    }

    /// Lexes inside a heredoc body.
    fn lex_heredoc_body(&mut self) -> Token {
        let (ident, quote, indent, mut next_start) = match self.modes.current() {
            LexMode::Heredoc { ident, quote, indent, next_start, .. } => {
                (*ident, *quote, *indent, *next_start)
            }
            _ => return self.eof_token(),
        };

        // First entry: remember where the opener's line resumes and jump to
        // the body (after this line's newline, or after the previous
        // heredoc's terminator when several open on one line).
        if next_start == 0 {
            next_start = self.position;
            if self.heredoc_end != 0 {
                self.position = self.heredoc_end;
            } else {
                while self.position < self.source.len() && self.source[self.position] != b'\n' {
                    self.position += 1;
                }
                if self.position < self.source.len() {
                    self.record_newline(self.position);
                    self.position += 1;
                }
            }
            self.line_start = self.position;
            if let LexMode::Heredoc { next_start: slot, .. } = self.modes.current_mut() {
                *slot = next_start;
            }
        }

        let ident_bytes = ident.slice(self.source);

        loop {
            if self.position >= self.source.len() {
                self.diagnostics.error(ident, DiagnosticId::HeredocUnterminated);
                self.finish_heredoc(next_start, self.source.len(), indent);
                return Token::new(TokenKind::HeredocEnd, self.source.len(), self.source.len());
            }

            // Terminator check is only meaningful at a line start
            if self.position == self.line_start {
                let (line_end, after_line) = line_bounds(self.source, self.position);
                let line = &self.source[self.position..line_end];
                if line_is_terminator(line, ident_bytes, indent) {
                    let token = Token::new(TokenKind::HeredocEnd, self.position, line_end);
                    if line_end < self.source.len() {
                        // Terminator line's newline belongs to the heredoc
                        if let Some(nl) = newline_before(self.source, after_line) {
                            self.record_newline(nl);
                        }
                    }
                    self.finish_heredoc(next_start, after_line, indent);
                    return token;
                }
                // Content line: fold `<<~` indent bookkeeping
                if indent == HeredocIndent::Tilde {
                    if let LexMode::Heredoc { common_whitespace, .. } = self.modes.current_mut() {
                        *common_whitespace = fold_common_whitespace(*common_whitespace, line);
                    }
                }
            }

            match quote {
                HeredocQuote::Single => return self.heredoc_content_line(),
                _ => {
                    if let Some(token) = self.heredoc_interpolated_content() {
                        return token;
                    }
                    // An interpolation opener was pushed; let the dispatcher
                    // hand out code tokens.
                    return self.next_token();
                }
            }
        }
    }

    /// One full raw line of single-quoted heredoc content.
    fn heredoc_content_line(&mut self) -> Token {
        let start = self.position;
        let (_, after_line) = line_bounds(self.source, self.position);
        if let Some(nl) = newline_before(self.source, after_line) {
            self.record_newline(nl);
        }
        self.position = after_line;
        self.line_start = after_line;
        Token::new(TokenKind::StringContent, start, after_line)
    }

    /// Interpolated heredoc content up to the next `#{`, `#@`, `#$`, or end
    /// of line. Returns `None` when an interpolation mode was pushed with no
    /// pending content.
    fn heredoc_interpolated_content(&mut self) -> Option<Token> {
        let start = self.position;
        let mut pos = self.position;
        while pos < self.source.len() {
            match self.source[pos] {
                b'\\' => {
                    // Keep the escape in the content; cooking happens later.
                    if self.source.get(pos + 1) == Some(&b'\n') {
                        self.record_newline(pos + 1);
                        pos += 2;
                        self.line_start = pos;
                        // Continuation joins the lines; the content run keeps
                        // going on the next physical line.
                        self.position = pos;
                        return Some(Token::new(TokenKind::StringContent, start, pos));
                    }
                    pos += 2;
                }
                b'\n' => {
                    self.record_newline(pos);
                    pos += 1;
                    self.position = pos;
                    self.line_start = pos;
                    return Some(Token::new(TokenKind::StringContent, start, pos));
                }
                b'#' => match self.source.get(pos + 1) {
                    Some(b'{') => {
                        if pos > start {
                            self.position = pos;
                            return Some(Token::new(TokenKind::StringContent, start, pos));
                        }
                        self.position = pos + 2;
                        let saved = self.brace_nesting;
                        self.brace_nesting = 0;
                        self.modes.push(LexMode::EmbExpr { saved_brace_nesting: saved });
                        self.state = LexState::BEG;
                        self.command_start = true;
                        return Some(Token::new(TokenKind::EmbexprBegin, pos, pos + 2));
                    }
                    Some(b'@' | b'$') => {
                        if pos > start {
                            self.position = pos;
                            return Some(Token::new(TokenKind::StringContent, start, pos));
                        }
                        self.position = pos + 1;
                        self.modes.push(LexMode::EmbVar);
                        return Some(Token::new(TokenKind::EmbVar, pos, pos + 1));
                    }
                    _ => pos += 1,
                },
                _ => pos += 1,
            }
        }
        self.position = pos;
        if pos > start {
            Some(Token::new(TokenKind::StringContent, start, pos))
        } else {
            None
        }
    }

    /// Closes the current heredoc: records the resume pointer, restores the
    /// opener-line cursor, and publishes the dedent width.
    fn finish_heredoc(&mut self, next_start: usize, after_terminator: usize, indent: HeredocIndent) {
        let common = match self.modes.current() {
            LexMode::Heredoc { common_whitespace, .. } => *common_whitespace,
            _ => ruby_heredoc::NO_COMMON_WHITESPACE,
        };
        self.modes.pop();
        self.heredoc_end = after_terminator;
        self.position = next_start;
        // The resume point is mid-line; nothing may match a column-0 rule
        // until the next newline is crossed.
        self.line_start = usize::MAX;
        self.state = LexState::END;
        self.last_heredoc_dedent = if indent == HeredocIndent::Tilde
            && common != ruby_heredoc::NO_COMMON_WHITESPACE
        {
            common
        } else {
            0
        };
    }

    // ===== string-like bodies =====

    fn lex_string_body(&mut self) -> Token {
        let (interpolation, label_allowed, incrementor, terminator, mut nesting, breakpoints) =
            match self.modes.current() {
                LexMode::String {
                    interpolation,
                    label_allowed,
                    incrementor,
                    terminator,
                    nesting,
                    breakpoints,
                } => (*interpolation, *label_allowed, *incrementor, *terminator, *nesting, *breakpoints),
                _ => return self.eof_token(),
            };

        let start = self.position;
        let mut pos = self.position;
        loop {
            let Some(found) = breakpoints.find(&self.source[pos..]) else {
                // Unterminated: consume to EOF
                self.position = self.source.len();
                if self.position > start {
                    return Token::new(TokenKind::StringContent, start, self.position);
                }
                self.diagnostics.error(
                    ByteSpan::new(start, self.position),
                    DiagnosticId::StringUnterminated,
                );
                self.modes.pop();
                self.state = LexState::END;
                return Token::new(TokenKind::StringEnd, self.position, self.position);
            };
            pos += found;
            let b = self.source[pos];
            if b == b'\\' {
                if self.source.get(pos + 1) == Some(&b'\n') {
                    self.record_newline(pos + 1);
                }
                pos = (pos + 2).min(self.source.len());
                continue;
            }
            if b == b'\n' {
                self.record_newline(pos);
                pos += 1;
                self.line_start = pos;
                continue;
            }
            if interpolation && b == b'#' {
                match self.source.get(pos + 1) {
                    Some(b'{') => {
                        if pos > start {
                            self.position = pos;
                            return Token::new(TokenKind::StringContent, start, pos);
                        }
                        self.position = pos + 2;
                        let saved = self.brace_nesting;
                        self.brace_nesting = 0;
                        self.modes.push(LexMode::EmbExpr { saved_brace_nesting: saved });
                        self.state = LexState::BEG;
                        self.command_start = true;
                        return Token::new(TokenKind::EmbexprBegin, pos, pos + 2);
                    }
                    Some(b'@' | b'$') => {
                        if pos > start {
                            self.position = pos;
                            return Token::new(TokenKind::StringContent, start, pos);
                        }
                        self.position = pos + 1;
                        self.modes.push(LexMode::EmbVar);
                        return Token::new(TokenKind::EmbVar, pos, pos + 1);
                    }
                    _ => {
                        pos += 1;
                        continue;
                    }
                }
            }
            if incrementor != 0 && b == incrementor {
                nesting += 1;
                self.sync_string_nesting(nesting);
                pos += 1;
                continue;
            }
            if b == terminator {
                if nesting > 0 {
                    nesting -= 1;
                    self.sync_string_nesting(nesting);
                    pos += 1;
                    continue;
                }
                if pos > start {
                    self.position = pos;
                    return Token::new(TokenKind::StringContent, start, pos);
                }
                // Terminator with no pending content: close the literal
                self.position = pos + 1;
                self.modes.pop();
                if label_allowed
                    && self.source.get(self.position) == Some(&b':')
                    && self.source.get(self.position + 1) != Some(&b':')
                {
                    self.position += 1;
                    self.state = LexState::BEG | LexState::LABELED;
                    return Token::new(TokenKind::LabelEnd, pos, self.position);
                }
                self.state = LexState::END;
                return Token::new(TokenKind::StringEnd, pos, self.position);
            }
            // A breakpoint byte that means nothing here (e.g. '#' without
            // interpolation in the set — cannot happen, but stay safe)
            pos += 1;
        }
    }

    fn sync_string_nesting(&mut self, value: usize) {
        match self.modes.current_mut() {
            LexMode::String { nesting, .. }
            | LexMode::List { nesting, .. }
            | LexMode::Regexp { nesting, .. } => *nesting = value,
            _ => {}
        }
    }

    fn lex_list_body(&mut self) -> Token {
        let (interpolation, incrementor, terminator, mut nesting, breakpoints) =
            match self.modes.current() {
                LexMode::List { interpolation, incrementor, terminator, nesting, breakpoints } => {
                    (*interpolation, *incrementor, *terminator, *nesting, *breakpoints)
                }
                _ => return self.eof_token(),
            };

        // Leading whitespace between elements becomes one separator token
        let ws_start = self.position;
        let mut pos = self.position;
        while pos < self.source.len() && is_list_whitespace(self.source[pos]) {
            if self.source[pos] == b'\n' {
                self.record_newline(pos);
                self.line_start = pos + 1;
            }
            pos += 1;
        }
        if pos > ws_start {
            self.position = pos;
            return Token::new(TokenKind::WordsSep, ws_start, pos);
        }

        let start = pos;
        loop {
            let Some(found) = breakpoints.find(&self.source[pos..]) else {
                self.position = self.source.len();
                if self.position > start {
                    return Token::new(TokenKind::StringContent, start, self.position);
                }
                self.diagnostics.error(
                    ByteSpan::new(start, self.position),
                    DiagnosticId::ListUnterminated,
                );
                self.modes.pop();
                self.state = LexState::END;
                return Token::new(TokenKind::StringEnd, self.position, self.position);
            };
            pos += found;
            let b = self.source[pos];
            if b == b'\\' {
                if self.source.get(pos + 1) == Some(&b'\n') {
                    self.record_newline(pos + 1);
                }
                pos = (pos + 2).min(self.source.len());
                continue;
            }
            if is_list_whitespace(b) {
                // Element boundary
                self.position = pos;
                return Token::new(TokenKind::StringContent, start, pos);
            }
            if interpolation && b == b'#' {
                match self.source.get(pos + 1) {
                    Some(b'{') => {
                        if pos > start {
                            self.position = pos;
                            return Token::new(TokenKind::StringContent, start, pos);
                        }
                        self.position = pos + 2;
                        let saved = self.brace_nesting;
                        self.brace_nesting = 0;
                        self.modes.push(LexMode::EmbExpr { saved_brace_nesting: saved });
                        self.state = LexState::BEG;
                        return Token::new(TokenKind::EmbexprBegin, pos, pos + 2);
                    }
                    Some(b'@' | b'$') => {
                        if pos > start {
                            self.position = pos;
                            return Token::new(TokenKind::StringContent, start, pos);
                        }
                        self.position = pos + 1;
                        self.modes.push(LexMode::EmbVar);
                        return Token::new(TokenKind::EmbVar, pos, pos + 1);
                    }
                    _ => {
                        pos += 1;
                        continue;
                    }
                }
            }
            if incrementor != 0 && b == incrementor {
                nesting += 1;
                self.sync_string_nesting(nesting);
                pos += 1;
                continue;
            }
            if b == terminator {
                if nesting > 0 {
                    nesting -= 1;
                    self.sync_string_nesting(nesting);
                    pos += 1;
                    continue;
                }
                if pos > start {
                    self.position = pos;
                    return Token::new(TokenKind::StringContent, start, pos);
                }
                self.position = pos + 1;
                self.modes.pop();
                self.state = LexState::END;
                return Token::new(TokenKind::StringEnd, pos, self.position);
            }
            pos += 1;
        }
    }

    fn lex_regexp_body(&mut self) -> Token {
        let (incrementor, terminator, mut nesting, breakpoints) = match self.modes.current() {
            LexMode::Regexp { incrementor, terminator, nesting, breakpoints } => {
                (*incrementor, *terminator, *nesting, *breakpoints)
            }
            _ => return self.eof_token(),
        };

        let start = self.position;
        let mut pos = self.position;
        loop {
            let Some(found) = breakpoints.find(&self.source[pos..]) else {
                self.position = self.source.len();
                if self.position > start {
                    return Token::new(TokenKind::StringContent, start, self.position);
                }
                self.diagnostics.error(
                    ByteSpan::new(start, self.position),
                    DiagnosticId::RegexpUnterminated,
                );
                self.modes.pop();
                self.state = LexState::END;
                return Token::new(TokenKind::RegexpEnd, self.position, self.position);
            };
            pos += found;
            let b = self.source[pos];
            if b == b'\\' {
                if self.source.get(pos + 1) == Some(&b'\n') {
                    self.record_newline(pos + 1);
                }
                pos = (pos + 2).min(self.source.len());
                continue;
            }
            if b == b'\n' {
                self.record_newline(pos);
                pos += 1;
                self.line_start = pos;
                continue;
            }
            if b == b'#' {
                match self.source.get(pos + 1) {
                    Some(b'{') => {
                        if pos > start {
                            self.position = pos;
                            return Token::new(TokenKind::StringContent, start, pos);
                        }
                        self.position = pos + 2;
                        let saved = self.brace_nesting;
                        self.brace_nesting = 0;
                        self.modes.push(LexMode::EmbExpr { saved_brace_nesting: saved });
                        self.state = LexState::BEG;
                        return Token::new(TokenKind::EmbexprBegin, pos, pos + 2);
                    }
                    Some(b'@' | b'$') => {
                        if pos > start {
                            self.position = pos;
                            return Token::new(TokenKind::StringContent, start, pos);
                        }
                        self.position = pos + 1;
                        self.modes.push(LexMode::EmbVar);
                        return Token::new(TokenKind::EmbVar, pos, pos + 1);
                    }
                    _ => {
                        pos += 1;
                        continue;
                    }
                }
            }
            if incrementor != 0 && b == incrementor {
                nesting += 1;
                self.sync_string_nesting(nesting);
                pos += 1;
                continue;
            }
            if b == terminator {
                if nesting > 0 {
                    nesting -= 1;
                    self.sync_string_nesting(nesting);
                    pos += 1;
                    continue;
                }
                if pos > start {
                    self.position = pos;
                    return Token::new(TokenKind::StringContent, start, pos);
                }
                // Closing delimiter plus trailing flag letters
                let mut end = pos + 1;
                while end < self.source.len() && self.source[end].is_ascii_alphabetic() {
                    if !matches!(self.source[end], b'i' | b'm' | b'x' | b'o' | b'n' | b'e' | b's' | b'u') {
                        self.diagnostics.error_with(
                            ByteSpan::new(end, end + 1),
                            DiagnosticId::UnexpectedToken,
                            "unknown regexp flag",
                        );
                    }
                    end += 1;
                }
                self.position = end;
                self.modes.pop();
                self.state = LexState::END;
                return Token::new(TokenKind::RegexpEnd, pos, end);
            }
            pos += 1;
        }
    }

    /// Lexes the variable of a `#@foo` / `#$foo` short interpolation.
    fn lex_embedded_variable(&mut self) -> Token {
        self.modes.pop();
        let start = self.position;
        match self.source.get(start) {
            Some(b'@') => self.lex_at_variable(start),
            Some(b'$') => self.lex_global_variable(start),
            _ => {
                self.diagnostics
                    .error(ByteSpan::new(start, start), DiagnosticId::ExpressionExpected);
                Token::new(TokenKind::Missing, start, start)
            }
        }
    }
}

/// `(line_end_excl_newline, position_after_newline)` for the line at `pos`.
fn line_bounds(source: &[u8], pos: usize) -> (usize, usize) {
    let mut end = pos;
    while end < source.len() && source[end] != b'\n' {
        end += 1;
    }
    if end < source.len() { (end, end + 1) } else { (end, end) }
}

/// The offset of the `\n` immediately before `after_line`, if any.
fn newline_before(source: &[u8], after_line: usize) -> Option<usize> {
    if after_line > 0 && source.get(after_line - 1) == Some(&b'\n') {
        Some(after_line - 1)
    } else {
        None
    }
}

fn is_list_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0B' | b'\x0C' | b'\r')
}

fn contains_ruby(line: &[u8]) -> bool {
    line.windows(4).any(|w| w == b"ruby")
}

/// Extent of a `?\…` escape for a character literal; `pos` is at the
/// backslash.
fn scan_escape_extent(source: &[u8], pos: usize) -> usize {
    let mut end = pos + 1;
    match source.get(end) {
        Some(b'u') => {
            end += 1;
            if source.get(end) == Some(&b'{') {
                while end < source.len() && source[end] != b'}' {
                    end += 1;
                }
                end = (end + 1).min(source.len());
            } else {
                let mut digits = 0;
                while digits < 4 && source.get(end).is_some_and(u8::is_ascii_hexdigit) {
                    end += 1;
                    digits += 1;
                }
            }
        }
        Some(b'x') => {
            end += 1;
            let mut digits = 0;
            while digits < 2 && source.get(end).is_some_and(u8::is_ascii_hexdigit) {
                end += 1;
                digits += 1;
            }
        }
        Some(b'0'..=b'7') => {
            let mut digits = 0;
            while digits < 3 && matches!(source.get(end), Some(b'0'..=b'7')) {
                end += 1;
                digits += 1;
            }
        }
        Some(b'C' | b'M') => {
            // \C-x, \M-x, possibly chained with another escape
            end += 1;
            if source.get(end) == Some(&b'-') {
                end += 1;
            }
            if source.get(end) == Some(&b'\\') {
                return scan_escape_extent(source, end);
            }
            end = (end + 1).min(source.len());
        }
        Some(b'c') => {
            end += 1;
            if source.get(end) == Some(&b'\\') {
                return scan_escape_extent(source, end);
            }
            end = (end + 1).min(source.len());
        }
        Some(_) => end += 1,
        None => {}
    }
    end
}

fn paired_delimiters(open: u8) -> (u8, u8) {
    match open {
        b'(' => (b'(', b')'),
        b'[' => (b'[', b']'),
        b'{' => (b'{', b'}'),
        b'<' => (b'<', b'>'),
        other => (0, other),
    }
}

fn keyword_kind(text: &[u8]) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match text {
        b"alias" => KeywordAlias,
        b"and" => KeywordAnd,
        b"begin" => KeywordBegin,
        b"BEGIN" => KeywordBeginUpcase,
        b"break" => KeywordBreak,
        b"case" => KeywordCase,
        b"class" => KeywordClass,
        b"def" => KeywordDef,
        b"defined?" => KeywordDefined,
        b"do" => KeywordDo,
        b"else" => KeywordElse,
        b"elsif" => KeywordElsif,
        b"end" => KeywordEnd,
        b"END" => KeywordEndUpcase,
        b"ensure" => KeywordEnsure,
        b"false" => KeywordFalse,
        b"for" => KeywordFor,
        b"if" => KeywordIf,
        b"in" => KeywordIn,
        b"module" => KeywordModule,
        b"next" => KeywordNext,
        b"nil" => KeywordNil,
        b"not" => KeywordNot,
        b"or" => KeywordOr,
        b"redo" => KeywordRedo,
        b"rescue" => KeywordRescue,
        b"retry" => KeywordRetry,
        b"return" => KeywordReturn,
        b"self" => KeywordSelf,
        b"super" => KeywordSuper,
        b"then" => KeywordThen,
        b"true" => KeywordTrue,
        b"undef" => KeywordUndef,
        b"unless" => KeywordUnless,
        b"until" => KeywordUntil,
        b"when" => KeywordWhen,
        b"while" => KeywordWhile,
        b"yield" => KeywordYield,
        b"__ENCODING__" => KeywordEncoding,
        b"__FILE__" => KeywordFile,
        b"__LINE__" => KeywordLine,
        _ => return None,
    })
}

#[cfg(test)]
mod tests;
