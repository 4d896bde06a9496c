impl<'src> Parser<'src> {
    /// Moves the token window forward by one and returns the consumed token.
    /// The window never rewinds, though byte positions may jump backwards
    /// when a heredoc body closes and the opener's line resumes.
    fn advance(&mut self) -> Token {
        let consumed = self.current;
        self.previous = self.current;
        self.current = self.lexer.next_token();
        consumed
    }

    /// Consumes the current token if it has the given kind.
    fn accept(&mut self, kind: TokenKind) -> bool {
        if self.current.kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consumes one of statement separators (newline or semicolon); returns
    /// true if at least one was consumed.
    fn accept_terminator(&mut self) -> bool {
        let mut seen = false;
        while matches!(self.current.kind, TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
            seen = true;
        }
        seen
    }

    /// Skips insignificant statement separators.
    fn skip_newlines(&mut self) {
        while matches!(self.current.kind, TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// Demands a token of `kind`. On mismatch, emits `diag` and synthesizes
    /// a zero-width missing token at the end of the previous token instead
    /// of consuming anything.
    fn expect(&mut self, kind: TokenKind, diag: DiagnosticId) -> Token {
        if self.current.kind == kind {
            return self.advance();
        }
        self.lexer.diagnostics.error(self.current.span(), diag);
        Token::missing(self.previous.end)
    }

    /// Demands the `end` closing the construct opened by `opener`. With the
    /// `warn_indent` pragma on, an `end` whose column differs from its
    /// opener's draws the mismatched-indentation warning.
    fn expect_end(&mut self, opener: Token) -> Token {
        let end_token = self.expect(TokenKind::KeywordEnd, DiagnosticId::EndExpected);
        if end_token.kind == TokenKind::KeywordEnd
            && self.lexer.magic.warn_indent.unwrap_or(false)
        {
            let (_, opener_col) = self.lexer.newlines.line_col(opener.start, 1);
            let (_, end_col) = self.lexer.newlines.line_col(end_token.start, 1);
            if opener_col != end_col {
                self.warning(end_token.span(), DiagnosticId::IndentMismatchWarning);
            }
        }
        end_token
    }

    /// Span of the current token.
    fn current_span(&self) -> ByteSpan {
        self.current.span()
    }

    /// Text of a token.
    fn token_text(&self, token: Token) -> &'src [u8] {
        &self.source[token.start..token.end]
    }

    /// Token text as an owned string (tokens are always ASCII-compatible
    /// slices; invalid UTF-8 is replaced, which only ever affects
    /// already-diagnosed encodings).
    fn token_string(&self, token: Token) -> String {
        String::from_utf8_lossy(self.token_text(token)).into_owned()
    }

    /// Interns a token's text.
    fn intern_token(&mut self, token: Token) -> ConstantId {
        let bytes = &self.source[token.start..token.end];
        self.pool.insert_shared(bytes)
    }

    /// Interns arbitrary bytes not backed by the source.
    fn intern_owned(&mut self, bytes: Vec<u8>) -> ConstantId {
        self.pool.insert_owned(bytes)
    }

    /// Name behind an interned id.
    fn constant_name(&self, id: ConstantId) -> String {
        String::from_utf8_lossy(self.pool.lookup(id)).into_owned()
    }

    /// Emits an error diagnostic.
    fn error(&mut self, span: ByteSpan, id: DiagnosticId) {
        self.lexer.diagnostics.error(span, id);
    }

    /// Emits an error diagnostic with context.
    fn error_with(&mut self, span: ByteSpan, id: DiagnosticId, detail: &str) {
        self.lexer.diagnostics.error_with(span, id, detail);
    }

    /// Emits a warning diagnostic.
    fn warning(&mut self, span: ByteSpan, id: DiagnosticId) {
        self.lexer.diagnostics.warning(span, id);
    }

    /// Resolved frozen-string-literal setting: explicit option wins, then
    /// the magic comment.
    fn frozen_literals(&self) -> bool {
        self.frozen_string_literal
            .or(self.lexer.magic.frozen_string_literal)
            .unwrap_or(false)
    }

    /// Collects local names of a popped scope, warning about unused ones.
    fn scope_local_names(&mut self, scope: Option<Scope>) -> Vec<String> {
        let Some(scope) = scope else { return Vec::new() };
        let suppress = self.command_line.has(CommandLine::E);
        let mut names = Vec::with_capacity(scope.locals().len());
        for local in scope.locals() {
            let name = self.constant_name(local.name);
            if local.reads == 0 && !name.starts_with('_') && !suppress {
                self.lexer.diagnostics.warning_with(
                    local.location,
                    DiagnosticId::UnusedLocalVariableWarning,
                    &name,
                );
            }
            names.push(name);
        }
        names
    }

    /// Registers a `break`/`next`/`redo` with the block-exit stack.
    fn register_block_exit(&mut self, span: ByteSpan, diag: DiagnosticId) {
        for frame in self.block_exits.iter_mut().rev() {
            match frame {
                ExitFrame::Loop => return,
                ExitFrame::Barrier => {
                    self.lexer.diagnostics.error(span, diag);
                    return;
                }
                ExitFrame::Candidate(pending) => {
                    pending.push((span, diag));
                    return;
                }
            }
        }
        self.lexer.diagnostics.error(span, diag);
    }

    /// Pushes a loop-candidate frame (e.g. around `begin`), returning its
    /// index for [`Parser::resolve_exit_candidate`].
    fn push_exit_candidate(&mut self) -> usize {
        self.block_exits.push(ExitFrame::Candidate(Vec::new()));
        self.block_exits.len() - 1
    }

    /// Resolves a candidate frame: a trailing `while`/`until` modifier
    /// legalizes the pending exits; otherwise they flow outward or error.
    fn resolve_exit_candidate(&mut self, index: usize, became_loop: bool) {
        let Some(ExitFrame::Candidate(pending)) = self.block_exits.get_mut(index) else {
            return;
        };
        let pending = std::mem::take(pending);
        self.block_exits.truncate(index);
        if became_loop {
            return;
        }
        for (span, diag) in pending {
            self.register_block_exit(span, diag);
        }
    }

    /// Recovery: should the statement loop hand this token to an enclosing
    /// construct rather than skip it?
    fn token_closes_enclosing(&self, kind: TokenKind) -> bool {
        self.contexts.any_terminated_by(kind)
    }

    /// True when the current token can begin an expression (and therefore a
    /// parenthesis-free command argument). The check is conservative: only
    /// kinds that unambiguously start a value.
    fn token_begins_expression(&self) -> bool {
        use TokenKind::*;
        matches!(
            self.current.kind,
            Identifier
                | Constant
                | MethodName
                | InstanceVariable
                | ClassVariable
                | GlobalVariable
                | NthReference
                | BackReference
                | IntegerLiteral
                | IntegerImaginary
                | IntegerRational
                | IntegerRationalImaginary
                | FloatLiteral
                | FloatImaginary
                | FloatRational
                | FloatRationalImaginary
                | CharacterLiteral
                | StringBegin
                | XStringBegin
                | SymbolBegin
                | RegexpBegin
                | HeredocStart
                | PercentLowerW
                | PercentUpperW
                | PercentLowerI
                | PercentUpperI
                | Label
                | ParenLeft
                | BracketLeftArray
                | UMinus
                | UMinusNum
                | UPlus
                | UStar
                | UStarStar
                | UAmp
                | UColonColon
                | UDotDot
                | UDotDotDot
                | Bang
                | Tilde
                | MinusGreater
                | DotDotDot
                | KeywordNil
                | KeywordTrue
                | KeywordFalse
                | KeywordSelf
                | KeywordFile
                | KeywordLine
                | KeywordEncoding
                | KeywordDefined
                | KeywordSuper
                | KeywordYield
                | KeywordNot
        )
    }
}
