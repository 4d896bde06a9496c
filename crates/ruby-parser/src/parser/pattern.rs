impl<'src> Parser<'src> {
    // ===== case/in =====

    fn parse_case_in(&mut self, keyword: Token, predicate: Option<Node>) -> Node {
        let predicate = predicate.unwrap_or_else(|| {
            self.error(keyword.span(), DiagnosticId::CaseExpressionExpected);
            Node::missing(keyword.end)
        });
        let mut conditions = Vec::new();
        while self.current.kind == TokenKind::KeywordIn {
            let in_token = self.advance();
            let pattern = self.parse_pattern_root();
            let guard = match self.current.kind {
                TokenKind::KeywordIf => {
                    self.advance();
                    let condition = self.parse_expression(
                        level::PREDICATE,
                        false,
                        DiagnosticId::ExpressionExpected,
                    );
                    Some((GuardKind::If, Box::new(condition)))
                }
                TokenKind::KeywordUnless => {
                    self.advance();
                    let condition = self.parse_expression(
                        level::PREDICATE,
                        false,
                        DiagnosticId::ExpressionExpected,
                    );
                    Some((GuardKind::Unless, Box::new(condition)))
                }
                _ => None,
            };
            let separated = self.accept_terminator();
            if !self.accept(TokenKind::KeywordThen) && !separated {
                self.error(self.current_span(), DiagnosticId::ThenExpected);
            }
            let statements = self.parse_body(Context::CaseIn);
            let span =
                ByteSpan::new(in_token.start, statements.location.end.max(in_token.end));
            conditions.push(Node::new(
                NodeKind::In { pattern: Box::new(pattern), statements: Box::new(statements), guard },
                span,
            ));
        }
        if conditions.is_empty() {
            self.error(self.current_span(), DiagnosticId::CaseMissingClauses);
        }
        let else_clause = if self.current.kind == TokenKind::KeywordElse {
            Some(Box::new(self.parse_else_clause()))
        } else {
            None
        };
        let end_token = self.expect_end(keyword);
        Node::new(
            NodeKind::CaseMatch { predicate: Box::new(predicate), conditions, else_clause },
            ByteSpan::new(keyword.start, end_token.end.max(keyword.end)),
        )
    }

    // ===== pattern grammar =====

    /// Entry point for one pattern (an `in` arm, `=>`, or `in` operator).
    /// Resets the per-arm capture list.
    fn parse_pattern_root(&mut self) -> Node {
        self.pattern_captures.clear();
        let first = self.parse_pattern_element();

        // Bracketless top-level comma list: `in a, b` / trailing `in a,`
        if self.current.kind != TokenKind::Comma {
            return first;
        }
        let start = first.location.start;
        let mut requireds = vec![first];
        let mut rest: Option<Box<Node>> = None;
        let mut posts = Vec::new();
        let mut trailing_comma_rest = true;
        while self.accept(TokenKind::Comma) {
            if !self.pattern_element_follows() {
                // `in a,` matches any extra elements
                break;
            }
            trailing_comma_rest = false;
            if self.current.kind == TokenKind::UStar {
                let splat = self.parse_pattern_splat();
                if rest.is_some() {
                    self.error(splat.location, DiagnosticId::PatternRestDuplicate);
                } else {
                    rest = Some(Box::new(splat));
                }
            } else {
                let element = self.parse_pattern_element();
                if rest.is_some() {
                    posts.push(element);
                } else {
                    requireds.push(element);
                }
            }
        }
        if trailing_comma_rest && rest.is_none() {
            rest = Some(Box::new(Node::new(
                NodeKind::Splat { expression: None },
                ByteSpan::empty(self.previous.end),
            )));
        }
        let end = self.previous.end;
        Node::new(
            NodeKind::ArrayPattern { constant: None, requireds, rest, posts },
            ByteSpan::new(start, end),
        )
    }

    fn pattern_element_follows(&self) -> bool {
        !matches!(
            self.current.kind,
            TokenKind::KeywordThen
                | TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::Eof
                | TokenKind::KeywordIf
                | TokenKind::KeywordUnless
        )
    }

    /// One pattern element: an alternation with optional trailing captures
    /// (`1 | 2 => n` captures the whole alternation).
    fn parse_pattern_element(&mut self) -> Node {
        let mut value = self.parse_pattern_alternation();
        while self.current.kind == TokenKind::EqualGreater {
            self.advance();
            let target = if self.current.kind == TokenKind::Identifier {
                let token = self.advance();
                self.declare_pattern_capture(token)
            } else {
                self.error(self.current_span(), DiagnosticId::LocalNameExpected);
                Node::missing(self.previous.end)
            };
            let span = value.location.join(target.location);
            value = Node::new(
                NodeKind::CapturePattern { value: Box::new(value), target: Box::new(target) },
                span,
            );
        }
        value
    }

    /// `p1 | p2`, left-associative.
    fn parse_pattern_alternation(&mut self) -> Node {
        let mut left = self.parse_pattern_primary();
        while self.current.kind == TokenKind::Pipe {
            self.advance();
            let right = self.parse_pattern_primary();
            let span = left.location.join(right.location);
            left = Node::new(
                NodeKind::AlternationPattern { left: Box::new(left), right: Box::new(right) },
                span,
            );
        }
        left
    }

    /// Declares a pattern capture, diagnosing duplicates within the arm.
    fn declare_pattern_capture(&mut self, token: Token) -> Node {
        let name = self.token_string(token);
        let id = self.intern_token(token);
        if self.pattern_captures.contains(&id) && !name.starts_with('_') {
            self.error_with(token.span(), DiagnosticId::PatternCaptureDuplicate, &name);
        } else {
            self.pattern_captures.push(id);
        }
        self.scopes.declare(id, token.span());
        Node::new(NodeKind::LocalVariableTarget { name }, token.span())
    }

    fn parse_pattern_primary(&mut self) -> Node {
        use TokenKind::*;
        match self.current.kind {
            BracketLeftArray | BracketLeft => self.parse_array_or_find_pattern(None),
            BraceLeft => self.parse_hash_pattern(None),
            Label => {
                // Braceless hash pattern: `in key: 1, other:`
                let start = self.current.start;
                self.parse_hash_pattern_elements(start)
            }
            Caret => self.parse_pin_pattern(),
            Identifier => {
                let token = self.advance();
                self.declare_pattern_capture(token)
            }
            Constant | UColonColon => {
                let path = self.parse_pattern_constant_path();
                match self.current.kind {
                    BracketLeft | BracketLeftArray => {
                        self.parse_array_or_find_pattern(Some(Box::new(path)))
                    }
                    ParenLeft => {
                        self.advance();
                        let inner = if self.current.kind == ParenRight {
                            Node::new(
                                NodeKind::ArrayPattern {
                                    constant: Some(Box::new(path)),
                                    requireds: Vec::new(),
                                    rest: None,
                                    posts: Vec::new(),
                                },
                                self.current_span(),
                            )
                        } else {
                            self.parse_constant_qualified_body(path)
                        };
                        self.expect(ParenRight, DiagnosticId::ParenCloseExpected);
                        inner
                    }
                    _ => path,
                }
            }
            ParenLeft => {
                self.advance();
                let inner = self.parse_pattern_element();
                self.expect(ParenRight, DiagnosticId::ParenCloseExpected);
                inner
            }
            UStar => self.parse_pattern_splat(),
            KeywordNil => self.simple_literal(NodeKind::Nil),
            KeywordTrue => self.simple_literal(NodeKind::True),
            KeywordFalse => self.simple_literal(NodeKind::False),
            _ => self.parse_pattern_literal(),
        }
    }

    /// The body of `Const(...)`: array elements or hash pairs.
    fn parse_constant_qualified_body(&mut self, path: Node) -> Node {
        if self.current.kind == TokenKind::Label {
            let mut pattern = self.parse_hash_pattern_elements(path.location.start);
            if let NodeKind::HashPattern { constant, .. } = &mut pattern.kind {
                *constant = Some(Box::new(path));
            }
            pattern
        } else {
            let mut pattern = self.parse_array_pattern_elements(
                path.location.start,
                TokenKind::ParenRight,
            );
            if let NodeKind::ArrayPattern { constant, .. }
            | NodeKind::FindPattern { constant, .. } = &mut pattern.kind
            {
                *constant = Some(Box::new(path));
            }
            pattern
        }
    }

    fn parse_pattern_constant_path(&mut self) -> Node {
        let mut node = if self.current.kind == TokenKind::UColonColon {
            let colon = self.advance();
            let name_token = self.expect(TokenKind::Constant, DiagnosticId::ConstantNameExpected);
            Node::new(
                NodeKind::ConstantPath { parent: None, name: self.token_string(name_token) },
                ByteSpan::new(colon.start, name_token.end.max(colon.end)),
            )
        } else {
            let token = self.advance();
            Node::new(NodeKind::ConstantRead { name: self.token_string(token) }, token.span())
        };
        while self.current.kind == TokenKind::ColonColon {
            self.advance();
            let part = if matches!(self.current.kind, TokenKind::Constant | TokenKind::MethodName)
            {
                self.advance()
            } else {
                self.error(self.current_span(), DiagnosticId::ConstantNameExpected);
                Token::missing(self.previous.end)
            };
            let name = self.token_string(part);
            let span = ByteSpan::new(node.location.start, part.end.max(node.location.end));
            node = Node::new(NodeKind::ConstantPath { parent: Some(Box::new(node)), name }, span);
        }
        node
    }

    fn parse_pin_pattern(&mut self) -> Node {
        let pin = self.advance();
        match self.current.kind {
            TokenKind::Identifier => {
                let token = self.advance();
                let name = self.token_string(token);
                let id = self.intern_token(token);
                self.scopes.mark_read(id);
                let variable = Node::new(NodeKind::LocalVariableRead { name }, token.span());
                Node::new(
                    NodeKind::PinnedVariable { variable: Box::new(variable) },
                    ByteSpan::new(pin.start, token.end),
                )
            }
            TokenKind::InstanceVariable | TokenKind::ClassVariable | TokenKind::GlobalVariable => {
                let token = self.advance();
                let name = self.token_string(token);
                let variable = match token.kind {
                    TokenKind::InstanceVariable => {
                        Node::new(NodeKind::InstanceVariableRead { name }, token.span())
                    }
                    TokenKind::ClassVariable => {
                        Node::new(NodeKind::ClassVariableRead { name }, token.span())
                    }
                    _ => Node::new(NodeKind::GlobalVariableRead { name }, token.span()),
                };
                Node::new(
                    NodeKind::PinnedVariable { variable: Box::new(variable) },
                    ByteSpan::new(pin.start, token.end),
                )
            }
            TokenKind::ParenLeft => {
                self.advance();
                let expression = self.parse_expression(
                    level::STATEMENT,
                    false,
                    DiagnosticId::ExpressionExpected,
                );
                let close = self.expect(TokenKind::ParenRight, DiagnosticId::ParenCloseExpected);
                Node::new(
                    NodeKind::PinnedExpression { expression: Box::new(expression) },
                    ByteSpan::new(pin.start, close.end.max(pin.end)),
                )
            }
            _ => {
                self.error(self.current_span(), DiagnosticId::ExpressionExpected);
                Node::missing(pin.end)
            }
        }
    }

    fn parse_pattern_splat(&mut self) -> Node {
        let star = self.advance();
        let expression = if self.current.kind == TokenKind::Identifier {
            let token = self.advance();
            Some(Box::new(self.declare_pattern_capture(token)))
        } else {
            None
        };
        let end = expression.as_ref().map_or(star.end, |e| e.location.end);
        Node::new(NodeKind::Splat { expression }, ByteSpan::new(star.start, end))
    }

    /// `[...]` array or find pattern.
    fn parse_array_or_find_pattern(&mut self, constant: Option<Box<Node>>) -> Node {
        let open = self.advance();
        let mut pattern = self.parse_array_pattern_elements(open.start, TokenKind::BracketRight);
        self.expect(TokenKind::BracketRight, DiagnosticId::BracketCloseExpected);
        let end = self.previous.end;
        pattern.location = ByteSpan::new(
            constant.as_ref().map_or(open.start, |c| c.location.start),
            end,
        );
        if let NodeKind::ArrayPattern { constant: slot, .. }
        | NodeKind::FindPattern { constant: slot, .. } = &mut pattern.kind
        {
            *slot = constant;
        }
        pattern
    }

    /// Elements of an array/find pattern up to (excluding) `closer`.
    fn parse_array_pattern_elements(&mut self, start: usize, closer: TokenKind) -> Node {
        enum Element {
            Pattern(Node),
            Splat(Node),
        }
        let mut elements = Vec::new();
        self.skip_newlines();
        while self.current.kind != closer && self.current.kind != TokenKind::Eof {
            if self.current.kind == TokenKind::UStar {
                elements.push(Element::Splat(self.parse_pattern_splat()));
            } else {
                elements.push(Element::Pattern(self.parse_pattern_element()));
            }
            self.skip_newlines();
            if !self.accept(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }

        let splat_positions: Vec<usize> = elements
            .iter()
            .enumerate()
            .filter_map(|(i, e)| matches!(e, Element::Splat(_)).then_some(i))
            .collect();
        let end = self.previous.end.max(start);
        let span = ByteSpan::new(start, end);

        // Two splats bracketing at least one element: a find pattern
        if splat_positions.len() == 2
            && splat_positions[0] == 0
            && splat_positions[1] == elements.len() - 1
            && elements.len() > 2
        {
            let mut iter = elements.into_iter();
            let Some(Element::Splat(left)) = iter.next() else {
                return Node::missing(start);
            };
            let mut requireds = Vec::new();
            let mut right = None;
            for element in iter {
                match element {
                    Element::Pattern(node) => requireds.push(node),
                    Element::Splat(node) => right = Some(node),
                }
            }
            let Some(right) = right else { return Node::missing(start) };
            return Node::new(
                NodeKind::FindPattern {
                    constant: None,
                    left: Box::new(left),
                    requireds,
                    right: Box::new(right),
                },
                span,
            );
        }

        let mut requireds = Vec::new();
        let mut rest: Option<Box<Node>> = None;
        let mut posts = Vec::new();
        for element in elements {
            match element {
                Element::Pattern(node) => {
                    if rest.is_some() {
                        posts.push(node);
                    } else {
                        requireds.push(node);
                    }
                }
                Element::Splat(node) => {
                    if rest.is_some() {
                        self.error(node.location, DiagnosticId::PatternRestDuplicate);
                    } else {
                        rest = Some(Box::new(node));
                    }
                }
            }
        }
        Node::new(NodeKind::ArrayPattern { constant: None, requireds, rest, posts }, span)
    }

    /// `{ key: pat, **rest }` hash pattern.
    fn parse_hash_pattern(&mut self, constant: Option<Box<Node>>) -> Node {
        let open = self.advance();
        let mut pattern = self.parse_hash_pattern_elements(open.start);
        self.expect(TokenKind::BraceRight, DiagnosticId::BraceCloseExpected);
        pattern.location = ByteSpan::new(open.start, self.previous.end);
        if let NodeKind::HashPattern { constant: slot, .. } = &mut pattern.kind {
            *slot = constant;
        }
        pattern
    }

    fn parse_hash_pattern_elements(&mut self, start: usize) -> Node {
        let mut elements = Vec::new();
        let mut rest: Option<Box<Node>> = None;
        let mut seen_keys: Vec<ConstantId> = Vec::new();
        self.skip_newlines();
        while !matches!(
            self.current.kind,
            TokenKind::BraceRight | TokenKind::ParenRight | TokenKind::Eof
        ) {
            match self.current.kind {
                TokenKind::Label => {
                    let label = self.advance();
                    let key_bytes = &self.source[label.start..label.end - 1];
                    let key_name = String::from_utf8_lossy(key_bytes).into_owned();
                    let key_id = self.pool.insert_shared(key_bytes);
                    if seen_keys.contains(&key_id) {
                        self.error_with(
                            label.span(),
                            DiagnosticId::PatternKeyDuplicate,
                            &key_name,
                        );
                    } else {
                        seen_keys.push(key_id);
                    }
                    let key =
                        Node::new(NodeKind::Symbol { name: key_name.clone() }, label.span());
                    let value = if self.pattern_value_follows() {
                        Some(Box::new(self.parse_pattern_element()))
                    } else {
                        // `key:` with no value binds a local of that name
                        if !is_valid_local_key(key_bytes) {
                            self.error(label.span(), DiagnosticId::PatternKeyInvalidLocal);
                        }
                        if self.pattern_captures.contains(&key_id)
                            && !key_name.starts_with('_')
                        {
                            self.error_with(
                                label.span(),
                                DiagnosticId::PatternCaptureDuplicate,
                                &key_name,
                            );
                        } else {
                            self.pattern_captures.push(key_id);
                        }
                        self.scopes.declare(key_id, label.span());
                        None
                    };
                    let end = value.as_ref().map_or(label.end, |v| v.location.end);
                    elements.push(Node::new(
                        NodeKind::Assoc { key: Box::new(key), value },
                        ByteSpan::new(label.start, end),
                    ));
                }
                TokenKind::UStarStar => {
                    let star = self.advance();
                    let node = if self.current.kind == TokenKind::KeywordNil {
                        let nil = self.advance();
                        Node::new(
                            NodeKind::NoKeywordsParameter,
                            ByteSpan::new(star.start, nil.end),
                        )
                    } else if self.current.kind == TokenKind::Identifier {
                        let token = self.advance();
                        let target = self.declare_pattern_capture(token);
                        Node::new(
                            NodeKind::Splat { expression: Some(Box::new(target)) },
                            ByteSpan::new(star.start, token.end),
                        )
                    } else {
                        Node::new(NodeKind::Splat { expression: None }, star.span())
                    };
                    if rest.is_some() {
                        self.error(node.location, DiagnosticId::PatternRestDuplicate);
                    } else {
                        rest = Some(Box::new(node));
                    }
                }
                _ => {
                    self.error(self.current_span(), DiagnosticId::PatternKeyInvalidLocal);
                    self.advance();
                }
            }
            self.skip_newlines();
            if !self.accept(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        let end = self.previous.end.max(start);
        Node::new(
            NodeKind::HashPattern { constant: None, elements, rest },
            ByteSpan::new(start, end),
        )
    }

    /// A sub-pattern follows the label of a hash-pattern pair.
    fn pattern_value_follows(&self) -> bool {
        !matches!(
            self.current.kind,
            TokenKind::Comma
                | TokenKind::BraceRight
                | TokenKind::ParenRight
                | TokenKind::BracketRight
                | TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::KeywordThen
                | TokenKind::Eof
        )
    }

    /// Literal patterns: numbers, strings, symbols, regexps, ranges.
    fn parse_pattern_literal(&mut self) -> Node {
        use TokenKind::*;
        let node = match self.current.kind {
            IntegerLiteral | IntegerImaginary | IntegerRational | IntegerRationalImaginary
            | FloatLiteral | FloatImaginary | FloatRational | FloatRationalImaginary => {
                self.parse_numeric(false)
            }
            UMinusNum => {
                self.advance();
                self.parse_numeric(true)
            }
            StringBegin => self.parse_string_literal().0,
            SymbolBegin => self.parse_symbol(),
            RegexpBegin => self.parse_regexp(),
            HeredocStart => self.parse_heredoc(),
            CharacterLiteral => self.parse_character_literal(),
            PercentLowerW | PercentUpperW | PercentLowerI | PercentUpperI => {
                self.parse_word_list()
            }
            UDotDot | UDotDotDot => {
                // Beginless range pattern
                let op = self.advance();
                let right = self.parse_pattern_range_end();
                let span = ByteSpan::new(op.start, right.location.end);
                let flags = if op.kind == UDotDotDot {
                    NodeFlags::EXCLUDE_END | NodeFlags::STATIC_LITERAL
                } else {
                    NodeFlags::STATIC_LITERAL
                };
                return Node::with_flags(
                    NodeKind::Range { left: None, right: Some(Box::new(right)) },
                    span,
                    flags,
                );
            }
            MinusGreater => return self.parse_lambda(),
            KeywordSelf => return self.simple_literal(NodeKind::SelfExpression),
            _ => {
                self.error(self.current_span(), DiagnosticId::ExpressionExpected);
                return Node::missing(self.current.start);
            }
        };

        // Endless/bounded range tail
        if matches!(self.current.kind, DotDot | DotDotDot) {
            let op = self.advance();
            let exclusive = op.kind == DotDotDot;
            let right = if self.pattern_value_follows()
                && !matches!(self.current.kind, Pipe | EqualGreater | KeywordIf | KeywordUnless)
            {
                Some(Box::new(self.parse_pattern_range_end()))
            } else {
                None
            };
            let end = right.as_ref().map_or(op.end, |r| r.location.end);
            let span = ByteSpan::new(node.location.start, end);
            let mut flags = NodeFlags::STATIC_LITERAL;
            if exclusive {
                flags |= NodeFlags::EXCLUDE_END;
            }
            return Node::with_flags(
                NodeKind::Range { left: Some(Box::new(node)), right },
                span,
                flags,
            );
        }
        node
    }

    fn parse_pattern_range_end(&mut self) -> Node {
        use TokenKind::*;
        match self.current.kind {
            IntegerLiteral | FloatLiteral => self.parse_numeric(false),
            UMinusNum => {
                self.advance();
                self.parse_numeric(true)
            }
            StringBegin => self.parse_string_literal().0,
            SymbolBegin => self.parse_symbol(),
            CharacterLiteral => self.parse_character_literal(),
            _ => {
                self.error(self.current_span(), DiagnosticId::ExpressionExpected);
                Node::missing(self.current.start)
            }
        }
    }
}

/// A hash-pattern key usable as a local binding.
fn is_valid_local_key(bytes: &[u8]) -> bool {
    let Some(&first) = bytes.first() else { return false };
    (first == b'_' || first.is_ascii_lowercase())
        && bytes.iter().all(|&b| b == b'_' || b.is_ascii_alphanumeric())
}
