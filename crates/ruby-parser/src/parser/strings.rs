impl<'src> Parser<'src> {
    /// Parses a string-like literal starting at a `StringBegin` /
    /// `XStringBegin` token. Returns the node and whether the literal closed
    /// as a quoted label (`"key":`).
    fn parse_string_literal(&mut self) -> (Node, bool) {
        let begin = self.advance();
        let xstring = begin.kind == TokenKind::XStringBegin;
        let mode = self.string_unescape_mode(begin);

        let (parts, explicit, label) = self.parse_string_parts(mode);
        let span = ByteSpan::new(begin.start, self.previous.end.max(begin.end));

        let node = self.assemble_string(parts, explicit, span, xstring);

        // Adjacent plain string literals concatenate
        if !xstring && !label && self.current.kind == TokenKind::StringBegin {
            let (next, next_label) = self.parse_string_literal();
            return (Self::concatenate_strings(node, next), next_label);
        }
        (node, label)
    }

    /// Escape rules for the literal opened by `begin`.
    fn string_unescape_mode(&self, begin: Token) -> UnescapeMode {
        let text = self.token_text(begin);
        match text.first() {
            Some(b'\'') => UnescapeMode::Minimal { terminator: b'\'', incrementor: 0 },
            Some(b'%') => match text.get(1) {
                Some(b'q') | Some(b's') => {
                    let open = *text.last().unwrap_or(&b'\'');
                    let (incrementor, terminator) = percent_delimiters(open);
                    UnescapeMode::Minimal { terminator, incrementor }
                }
                _ => UnescapeMode::All,
            },
            Some(b':') => match text.get(1) {
                Some(b'\'') => UnescapeMode::Minimal { terminator: b'\'', incrementor: 0 },
                _ => UnescapeMode::All,
            },
            _ => UnescapeMode::All,
        }
    }

    /// Collects content/interpolation parts until the literal closes.
    /// Returns `(parts, merged explicit encoding, closed-as-label)`.
    fn parse_string_parts(
        &mut self,
        mode: UnescapeMode,
    ) -> (Vec<Node>, ExplicitEncoding, bool) {
        let mut parts = Vec::new();
        let mut explicit = ExplicitEncoding::None;
        loop {
            match self.current.kind {
                TokenKind::StringContent => {
                    let token = self.advance();
                    let raw = &self.source[token.start..token.end];
                    let cooked =
                        escape::unescape(raw, token.start, mode, &mut self.lexer.diagnostics);
                    explicit = self.merge_explicit(explicit, cooked.explicit, token.span());
                    parts.push(Node::new(
                        NodeKind::String {
                            value: String::from_utf8_lossy(&cooked.value).into_owned(),
                        },
                        token.span(),
                    ));
                }
                TokenKind::EmbexprBegin => {
                    parts.push(self.parse_embedded_statements());
                }
                TokenKind::EmbVar => {
                    parts.push(self.parse_embedded_variable());
                }
                TokenKind::StringEnd => {
                    self.advance();
                    return (parts, explicit, false);
                }
                TokenKind::LabelEnd => {
                    self.advance();
                    return (parts, explicit, true);
                }
                _ => {
                    // The lexer already diagnosed an unterminated literal
                    return (parts, explicit, false);
                }
            }
        }
    }

    fn parse_embedded_statements(&mut self) -> Node {
        let open = self.advance();
        self.contexts.push(Context::Embexpr);
        let statements = self.parse_statements();
        self.contexts.pop();
        let close = self.expect(TokenKind::EmbexprEnd, DiagnosticId::EmbexprCloseExpected);
        let empty = matches!(&statements.kind, NodeKind::Statements { body } if body.is_empty());
        Node::new(
            NodeKind::EmbeddedStatements {
                statements: if empty { None } else { Some(Box::new(statements)) },
            },
            ByteSpan::new(open.start, close.end.max(open.end)),
        )
    }

    fn parse_embedded_variable(&mut self) -> Node {
        let marker = self.advance();
        let variable = match self.current.kind {
            TokenKind::InstanceVariable => {
                let token = self.advance();
                Node::new(
                    NodeKind::InstanceVariableRead { name: self.token_string(token) },
                    token.span(),
                )
            }
            TokenKind::ClassVariable => {
                let token = self.advance();
                Node::new(
                    NodeKind::ClassVariableRead { name: self.token_string(token) },
                    token.span(),
                )
            }
            TokenKind::GlobalVariable => {
                let token = self.advance();
                Node::new(
                    NodeKind::GlobalVariableRead { name: self.token_string(token) },
                    token.span(),
                )
            }
            _ => {
                self.error(self.current_span(), DiagnosticId::ExpressionExpected);
                Node::missing(marker.end)
            }
        };
        let span = ByteSpan::new(marker.start, variable.location.end.max(marker.end));
        Node::new(NodeKind::EmbeddedVariable { variable: Box::new(variable) }, span)
    }

    /// Merges consecutive plain content runs (heredocs and multi-line
    /// strings arrive line by line).
    fn coalesce_string_parts(parts: Vec<Node>) -> Vec<Node> {
        let mut merged: Vec<Node> = Vec::with_capacity(parts.len());
        for part in parts {
            match (merged.last_mut(), &part.kind) {
                (
                    Some(Node { kind: NodeKind::String { value: existing }, location, .. }),
                    NodeKind::String { value },
                ) => {
                    existing.push_str(value);
                    *location = location.join(part.location);
                }
                _ => merged.push(part),
            }
        }
        merged
    }

    /// Builds the final node for a string literal from its parts.
    fn assemble_string(
        &mut self,
        parts: Vec<Node>,
        explicit: ExplicitEncoding,
        span: ByteSpan,
        xstring: bool,
    ) -> Node {
        let mut parts = Self::coalesce_string_parts(parts);
        let interpolated = parts.len() != 1
            && !parts.is_empty()
            || parts
                .first()
                .is_some_and(|p| !matches!(p.kind, NodeKind::String { .. }));

        if !interpolated {
            let value = match parts.pop() {
                Some(Node { kind: NodeKind::String { value }, .. }) => value,
                _ => String::new(),
            };
            let mut flags = NodeFlags::STATIC_LITERAL | self.encoding_flags(explicit, &value);
            if !xstring && self.frozen_literals() {
                flags |= NodeFlags::FROZEN;
            }
            let kind = if xstring {
                NodeKind::XString { value }
            } else {
                NodeKind::String { value }
            };
            return Node::with_flags(kind, span, flags);
        }

        let kind = if xstring {
            NodeKind::InterpolatedXString { parts }
        } else {
            NodeKind::InterpolatedString { parts }
        };
        Node::new(kind, span)
    }

    /// The encoding flags a closed literal ends up with.
    fn encoding_flags(&self, explicit: ExplicitEncoding, value: &str) -> NodeFlags {
        match explicit {
            ExplicitEncoding::Utf8 => NodeFlags::FORCED_UTF8,
            ExplicitEncoding::Binary => NodeFlags::FORCED_BINARY,
            ExplicitEncoding::None => {
                if value.as_bytes().is_ascii() {
                    NodeFlags::FORCED_US_ASCII
                } else {
                    NodeFlags::empty()
                }
            }
        }
    }

    /// Merges the explicit-encoding constraints of two content runs.
    fn merge_explicit(
        &mut self,
        a: ExplicitEncoding,
        b: ExplicitEncoding,
        span: ByteSpan,
    ) -> ExplicitEncoding {
        match (a, b) {
            (ExplicitEncoding::None, other) => other,
            (existing, ExplicitEncoding::None) => existing,
            (existing, other) if existing == other => existing,
            (existing, _) => {
                self.error(span, DiagnosticId::EncodingLiteralConflict);
                existing
            }
        }
    }

    /// `"a" "b"` concatenation; mixed plain/interpolated folds into an
    /// interpolated string.
    fn concatenate_strings(left: Node, right: Node) -> Node {
        let span = left.location.join(right.location);
        match (left.kind, right.kind) {
            (NodeKind::String { value: a }, NodeKind::String { value: b }) => {
                let flags = left.flags;
                Node::with_flags(NodeKind::String { value: format!("{a}{b}") }, span, flags)
            }
            (a, b) => {
                let mut parts = Vec::new();
                match a {
                    NodeKind::InterpolatedString { parts: inner } => parts.extend(inner),
                    other => parts.push(Node::new(other, left.location)),
                }
                match b {
                    NodeKind::InterpolatedString { parts: inner } => parts.extend(inner),
                    other => parts.push(Node::new(other, right.location)),
                }
                Node::new(NodeKind::InterpolatedString { parts }, span)
            }
        }
    }

    // ===== symbols =====

    fn parse_symbol(&mut self) -> Node {
        let begin = self.advance();
        let text = self.token_text(begin);
        let quoted = text.len() >= 2 || text.first() == Some(&b'%');
        if quoted {
            // `:"…"`, `:'…'`, `%s{…}`
            let mode = self.string_unescape_mode(begin);
            let (parts, _, _) = self.parse_string_parts(mode);
            let mut parts = Self::coalesce_string_parts(parts);
            let span = ByteSpan::new(begin.start, self.previous.end.max(begin.end));
            let plain = parts.len() <= 1
                && parts
                    .first()
                    .is_none_or(|p| matches!(p.kind, NodeKind::String { .. }));
            if plain {
                let name = match parts.pop() {
                    Some(Node { kind: NodeKind::String { value }, .. }) => value,
                    _ => String::new(),
                };
                if name.is_empty() {
                    self.error(span, DiagnosticId::SymbolInvalid);
                }
                return Node::with_flags(
                    NodeKind::Symbol { name },
                    span,
                    NodeFlags::STATIC_LITERAL,
                );
            }
            return Node::new(NodeKind::InterpolatedSymbol { parts }, span);
        }

        // `:name`, `:+`, `:@ivar`, `:$gvar`
        let name_token = match self.current.kind {
            TokenKind::MethodName
            | TokenKind::Identifier
            | TokenKind::Constant
            | TokenKind::InstanceVariable
            | TokenKind::ClassVariable
            | TokenKind::GlobalVariable
            | TokenKind::BackReference
            | TokenKind::NthReference
            | TokenKind::BracketLeftRight
            | TokenKind::BracketLeftRightEqual => self.advance(),
            kind if kind.is_operator_method_name() => self.advance(),
            _ => {
                self.error(self.current_span(), DiagnosticId::SymbolInvalid);
                Token::missing(begin.end)
            }
        };
        let name = if name_token.kind == TokenKind::Missing {
            String::new()
        } else {
            self.token_string(name_token)
        };
        let span = ByteSpan::new(begin.start, name_token.end.max(begin.end));
        Node::with_flags(NodeKind::Symbol { name }, span, NodeFlags::STATIC_LITERAL)
    }

    // ===== regexps =====

    fn parse_regexp(&mut self) -> Node {
        let begin = self.advance();
        let mut parts = Vec::new();
        let mut source = Vec::new();
        let mut explicit = ExplicitEncoding::None;
        let mut plain = true;

        loop {
            match self.current.kind {
                TokenKind::StringContent => {
                    let token = self.advance();
                    let raw = &self.source[token.start..token.end];
                    let cooked = escape::unescape(
                        raw,
                        token.start,
                        UnescapeMode::Regexp,
                        &mut self.lexer.diagnostics,
                    );
                    // The `\u in a non-UTF-8 regexp` rule changed over Ruby
                    // versions; 3.3 leaves the encoding inherited.
                    if self.version != SyntaxVersion::CRuby3_3
                        || cooked.explicit != ExplicitEncoding::Utf8
                    {
                        explicit = self.merge_explicit(explicit, cooked.explicit, token.span());
                    }
                    source.extend_from_slice(&cooked.regexp_source);
                    parts.push(Node::new(
                        NodeKind::String {
                            value: String::from_utf8_lossy(&cooked.value).into_owned(),
                        },
                        token.span(),
                    ));
                }
                TokenKind::EmbexprBegin => {
                    plain = false;
                    parts.push(self.parse_embedded_statements());
                }
                TokenKind::EmbVar => {
                    plain = false;
                    parts.push(self.parse_embedded_variable());
                }
                TokenKind::RegexpEnd => break,
                _ => break,
            }
        }
        let end_token = if self.current.kind == TokenKind::RegexpEnd {
            self.advance()
        } else {
            Token::missing(self.previous.end)
        };
        let options = self.parse_regexp_options(end_token);
        let span = ByteSpan::new(begin.start, end_token.end.max(begin.end));

        if plain {
            let source_string = String::from_utf8_lossy(&source).into_owned();
            // Hand the unescaped source to the regexp engine for structural
            // validation; capture discovery happens again at `=~` sites
            let _ = self.named_captures_of(source, span);
            let flags = NodeFlags::STATIC_LITERAL | self.encoding_flags(explicit, &source_string);
            return Node::with_flags(
                NodeKind::Regexp { source: source_string, options },
                span,
                flags,
            );
        }
        Node::new(NodeKind::InterpolatedRegexp { parts, options }, span)
    }

    /// Decodes the flag letters trailing a regexp close delimiter.
    fn parse_regexp_options(&mut self, end_token: Token) -> RegexpOptions {
        let mut options = RegexpOptions::default();
        if end_token.kind == TokenKind::Missing {
            return options;
        }
        let text = self.token_text(end_token);
        for &letter in text.iter().skip(1) {
            match letter {
                b'i' => options.ignore_case = true,
                b'm' => options.multi_line = true,
                b'x' => options.extended = true,
                b'o' => options.once = true,
                b'n' => options.encoding = RegexpEncoding::Binary,
                b'e' => options.encoding = RegexpEncoding::EucJp,
                b's' => options.encoding = RegexpEncoding::Windows31J,
                b'u' => options.encoding = RegexpEncoding::Utf8,
                _ => {}
            }
        }
        options
    }

    // ===== heredocs =====

    fn parse_heredoc(&mut self) -> Node {
        let begin = self.advance();
        let (quote, _indent) = Self::heredoc_opener_kind(self.token_text(begin));
        let mode = match quote {
            HeredocQuote::Single => UnescapeMode::None,
            _ => UnescapeMode::All,
        };
        let xstring = quote == HeredocQuote::Backtick;

        // (part, started-at-line-start) for dedent bookkeeping
        let mut parts: Vec<(Node, bool)> = Vec::new();
        let mut explicit = ExplicitEncoding::None;
        let mut at_line_start = true;
        loop {
            match self.current.kind {
                TokenKind::StringContent => {
                    let token = self.advance();
                    let raw = &self.source[token.start..token.end];
                    let cooked =
                        escape::unescape(raw, token.start, mode, &mut self.lexer.diagnostics);
                    explicit = self.merge_explicit(explicit, cooked.explicit, token.span());
                    let part = Node::new(
                        NodeKind::String {
                            value: String::from_utf8_lossy(&cooked.value).into_owned(),
                        },
                        token.span(),
                    );
                    let starts_line = at_line_start;
                    at_line_start = raw.ends_with(b"\n");
                    parts.push((part, starts_line));
                }
                TokenKind::EmbexprBegin => {
                    parts.push((self.parse_embedded_statements(), at_line_start));
                    at_line_start = false;
                }
                TokenKind::EmbVar => {
                    parts.push((self.parse_embedded_variable(), at_line_start));
                    at_line_start = false;
                }
                TokenKind::HeredocEnd => {
                    self.advance();
                    break;
                }
                _ => break,
            }
        }

        // `<<~` dedent, published by the lexer at close
        let dedent = self.lexer.heredoc_dedent();
        let mut assembled = Vec::with_capacity(parts.len());
        for (mut part, starts_line) in parts {
            if dedent > 0 {
                if let NodeKind::String { value } = &part.kind {
                    let trimmed = ruby_heredoc::dedent_cooked(
                        value.as_bytes(),
                        dedent,
                        starts_line,
                    );
                    part = Node::new(
                        NodeKind::String {
                            value: String::from_utf8_lossy(&trimmed).into_owned(),
                        },
                        part.location,
                    );
                }
            }
            assembled.push(part);
        }

        let span = ByteSpan::new(begin.start, self.previous.end.max(begin.end));
        self.assemble_string(assembled, explicit, span, xstring)
    }

    /// Quote and indent styles from a heredoc opener's text (`<<~"EOS"`).
    fn heredoc_opener_kind(text: &[u8]) -> (HeredocQuote, HeredocIndent) {
        let mut pos = 2;
        let indent = match text.get(pos) {
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
        let quote = match text.get(pos) {
            Some(b'\'') => HeredocQuote::Single,
            Some(b'"') => HeredocQuote::Double,
            Some(b'`') => HeredocQuote::Backtick,
            _ => HeredocQuote::None,
        };
        (quote, indent)
    }

    // ===== percent word/symbol lists =====

    fn parse_word_list(&mut self) -> Node {
        let begin = self.advance();
        let symbols = matches!(
            begin.kind,
            TokenKind::PercentLowerI | TokenKind::PercentUpperI
        );
        let interpolating = matches!(
            begin.kind,
            TokenKind::PercentUpperW | TokenKind::PercentUpperI
        );
        let mode = if interpolating {
            UnescapeMode::All
        } else {
            let open = *self.token_text(begin).last().unwrap_or(&b'(');
            let (incrementor, terminator) = percent_delimiters(open);
            UnescapeMode::Minimal { terminator, incrementor }
        };

        let mut elements = Vec::new();
        let mut current_parts: Vec<Node> = Vec::new();
        let mut all_static = true;
        loop {
            match self.current.kind {
                TokenKind::WordsSep => {
                    self.advance();
                    if !current_parts.is_empty() {
                        let element =
                            Self::assemble_word(&mut current_parts, symbols);
                        all_static &= element.flags.contains(NodeFlags::STATIC_LITERAL);
                        elements.push(element);
                    }
                }
                TokenKind::StringContent => {
                    let token = self.advance();
                    let raw = &self.source[token.start..token.end];
                    let cooked =
                        escape::unescape(raw, token.start, mode, &mut self.lexer.diagnostics);
                    current_parts.push(Node::new(
                        NodeKind::String {
                            value: String::from_utf8_lossy(&cooked.value).into_owned(),
                        },
                        token.span(),
                    ));
                }
                TokenKind::EmbexprBegin => {
                    current_parts.push(self.parse_embedded_statements());
                }
                TokenKind::EmbVar => {
                    current_parts.push(self.parse_embedded_variable());
                }
                TokenKind::StringEnd => {
                    self.advance();
                    break;
                }
                _ => break,
            }
        }
        if !current_parts.is_empty() {
            let element = Self::assemble_word(&mut current_parts, symbols);
            all_static &= element.flags.contains(NodeFlags::STATIC_LITERAL);
            elements.push(element);
        }

        let span = ByteSpan::new(begin.start, self.previous.end.max(begin.end));
        let flags = if all_static { NodeFlags::STATIC_LITERAL } else { NodeFlags::empty() };
        Node::with_flags(NodeKind::Array { elements }, span, flags)
    }

    fn assemble_word(parts: &mut Vec<Node>, symbols: bool) -> Node {
        let parts = std::mem::take(parts);
        let span = parts
            .iter()
            .map(|p| p.location)
            .reduce(|a, b| a.join(b))
            .unwrap_or_else(|| ByteSpan::empty(0));
        let plain = parts.len() == 1 && matches!(parts[0].kind, NodeKind::String { .. });
        if plain {
            let value = match parts.into_iter().next() {
                Some(Node { kind: NodeKind::String { value }, .. }) => value,
                _ => String::new(),
            };
            let kind = if symbols {
                NodeKind::Symbol { name: value }
            } else {
                NodeKind::String { value }
            };
            Node::with_flags(kind, span, NodeFlags::STATIC_LITERAL)
        } else if symbols {
            Node::new(NodeKind::InterpolatedSymbol { parts }, span)
        } else {
            Node::new(NodeKind::InterpolatedString { parts }, span)
        }
    }

    // ===== character literals =====

    fn parse_character_literal(&mut self) -> Node {
        let token = self.advance();
        let body = &self.source[token.start + 1..token.end];
        let cooked = escape::unescape(
            body,
            token.start + 1,
            UnescapeMode::CharacterLiteral,
            &mut self.lexer.diagnostics,
        );
        let value = String::from_utf8_lossy(&cooked.value).into_owned();
        let mut flags = NodeFlags::STATIC_LITERAL | self.encoding_flags(cooked.explicit, &value);
        if self.frozen_literals() {
            flags |= NodeFlags::FROZEN;
        }
        Node::with_flags(NodeKind::String { value }, token.span(), flags)
    }
}

/// Paired delimiter mapping shared by percent literals.
fn percent_delimiters(open: u8) -> (u8, u8) {
    match open {
        b'(' => (b'(', b')'),
        b'[' => (b'[', b']'),
        b'{' => (b'{', b'}'),
        b'<' => (b'<', b'>'),
        other => (0, other),
    }
}
