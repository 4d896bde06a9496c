impl<'src> Parser<'src> {
    /// Parses the prefix (null-denotation) of an expression.
    fn parse_expression_prefix(&mut self, accepts_command: bool, diag: DiagnosticId) -> Node {
        use TokenKind::*;
        match self.current.kind {
            IntegerLiteral | IntegerImaginary | IntegerRational | IntegerRationalImaginary
            | FloatLiteral | FloatImaginary | FloatRational | FloatRationalImaginary => {
                self.parse_numeric(false)
            }
            UMinusNum => {
                self.advance();
                let numeric = self.parse_numeric(true);
                // -2 ** n negates the power, not the base
                if self.current.kind == StarStar {
                    let op = self.advance();
                    let right = self.parse_expression(
                        level::POWER,
                        false,
                        DiagnosticId::ExpressionExpected,
                    );
                    let positive = Self::negate_numeric(numeric);
                    let power = self.binary_call(positive, op, right);
                    let span = power.location;
                    return Node::new(
                        NodeKind::Call {
                            receiver: Some(Box::new(power)),
                            name: "-@".into(),
                            arguments: Vec::new(),
                            block: None,
                        },
                        span,
                    );
                }
                numeric
            }
            UMinus | UPlus | Bang | Tilde => self.parse_unary_operator(),
            KeywordNot => {
                let keyword = self.advance();
                let operand =
                    self.parse_expression(level::NOT, true, DiagnosticId::ExpressionExpected);
                let span = ByteSpan::new(keyword.start, operand.location.end);
                Node::new(NodeKind::Not { expression: Box::new(operand) }, span)
            }
            UDotDot | UDotDotDot => {
                let op = self.advance();
                let exclusive = op.kind == UDotDotDot;
                let right = self.parse_expression(
                    level::RANGE + 1,
                    false,
                    DiagnosticId::ExpressionExpected,
                );
                let span = ByteSpan::new(op.start, right.location.end);
                let mut flags =
                    if exclusive { NodeFlags::EXCLUDE_END } else { NodeFlags::empty() };
                if Self::is_static_range_end(Some(&right)) {
                    flags |= NodeFlags::STATIC_LITERAL;
                }
                Node::with_flags(
                    NodeKind::Range { left: None, right: Some(Box::new(right)) },
                    span,
                    flags,
                )
            }
            UStar => {
                let star = self.advance();
                let expression = if self.token_begins_expression() {
                    Some(Box::new(self.parse_expression(
                        level::COMMAND_ARGUMENT,
                        false,
                        DiagnosticId::ExpressionExpected,
                    )))
                } else {
                    None
                };
                let end = expression.as_ref().map_or(star.end, |e| e.location.end);
                Node::new(NodeKind::Splat { expression }, ByteSpan::new(star.start, end))
            }
            UAmp => {
                let amp = self.advance();
                let expression = if self.token_begins_expression() {
                    Some(Box::new(self.parse_expression(
                        level::COMMAND_ARGUMENT,
                        false,
                        DiagnosticId::ExpressionExpected,
                    )))
                } else {
                    None
                };
                let end = expression.as_ref().map_or(amp.end, |e| e.location.end);
                Node::new(NodeKind::BlockArgument { expression }, ByteSpan::new(amp.start, end))
            }
            KeywordNil => self.simple_literal(NodeKind::Nil),
            KeywordTrue => self.simple_literal(NodeKind::True),
            KeywordFalse => self.simple_literal(NodeKind::False),
            KeywordSelf => self.simple_literal(NodeKind::SelfExpression),
            KeywordFile => {
                let token = self.advance();
                Node::new(NodeKind::SourceFile { filepath: self.filepath.clone() }, token.span())
            }
            KeywordLine => {
                let token = self.advance();
                let (line, _) = self.lexer.newlines.line_col(token.start, self.start_line);
                Node::new(NodeKind::SourceLine { line }, token.span())
            }
            KeywordEncoding => self.simple_literal(NodeKind::SourceEncoding),
            Identifier => self.parse_identifier(accepts_command),
            Constant => self.parse_constant(accepts_command),
            MethodName => {
                // An identifier lexed in name position (e.g. after `::`)
                self.parse_identifier(accepts_command)
            }
            UColonColon => {
                let colon = self.advance();
                let name_token = if matches!(self.current.kind, Constant | MethodName) {
                    self.advance()
                } else {
                    self.error(self.current_span(), DiagnosticId::ConstantNameExpected);
                    Token::missing(self.previous.end)
                };
                let name = self.token_string(name_token);
                Node::new(
                    NodeKind::ConstantPath { parent: None, name },
                    ByteSpan::new(colon.start, name_token.end.max(colon.end)),
                )
            }
            InstanceVariable => {
                let token = self.advance();
                Node::new(
                    NodeKind::InstanceVariableRead { name: self.token_string(token) },
                    token.span(),
                )
            }
            ClassVariable => {
                let token = self.advance();
                Node::new(
                    NodeKind::ClassVariableRead { name: self.token_string(token) },
                    token.span(),
                )
            }
            GlobalVariable => {
                let token = self.advance();
                Node::new(
                    NodeKind::GlobalVariableRead { name: self.token_string(token) },
                    token.span(),
                )
            }
            NthReference => {
                let token = self.advance();
                let digits = &self.source[token.start + 1..token.end];
                let number = String::from_utf8_lossy(digits).parse().unwrap_or(0);
                Node::new(NodeKind::NumberedReferenceRead { number }, token.span())
            }
            BackReference => {
                let token = self.advance();
                Node::new(
                    NodeKind::BackReferenceRead { name: self.token_string(token) },
                    token.span(),
                )
            }
            StringBegin | XStringBegin => self.parse_string_literal().0,
            SymbolBegin => self.parse_symbol(),
            RegexpBegin => self.parse_regexp(),
            HeredocStart => self.parse_heredoc(),
            CharacterLiteral => self.parse_character_literal(),
            PercentLowerW | PercentUpperW | PercentLowerI | PercentUpperI => {
                self.parse_word_list()
            }
            Label => {
                // A bare label opens an unbraced keyword hash (command args,
                // `when` clauses)
                self.parse_keyword_hash()
            }
            BracketLeftArray => self.parse_array_literal(),
            BraceLeft => self.parse_hash_literal(),
            ParenLeft => self.parse_parentheses(),
            MinusGreater => self.parse_lambda(),
            KeywordIf | KeywordUnless => self.parse_conditional(),
            KeywordWhile | KeywordUntil => self.parse_loop(),
            KeywordCase => self.parse_case(),
            KeywordFor => self.parse_for(),
            KeywordBegin => self.parse_begin(),
            KeywordDef => self.parse_def(),
            KeywordClass => self.parse_class(),
            KeywordModule => self.parse_module(),
            KeywordAlias => self.parse_alias(),
            KeywordUndef => self.parse_undef(),
            KeywordBeginUpcase | KeywordEndUpcase => self.parse_execution_block(),
            KeywordReturn | KeywordBreak | KeywordNext => self.parse_jump(),
            KeywordYield => self.parse_yield(),
            KeywordSuper => self.parse_super(),
            KeywordDefined => self.parse_defined(),
            KeywordRedo => {
                let token = self.advance();
                self.register_block_exit(token.span(), DiagnosticId::RedoOutsideLoop);
                Node::new(NodeKind::Redo, token.span())
            }
            KeywordRetry => {
                let token = self.advance();
                if !self.contexts.in_rescue() {
                    self.error(token.span(), DiagnosticId::RetryOutsideRescue);
                }
                Node::new(NodeKind::Retry, token.span())
            }
            DotDotDot => {
                // Forwarding `...` in argument position
                let token = self.advance();
                if let Some(scope) = self.scopes.current() {
                    if !scope.parameters.any(ParameterBits::FORWARDING) {
                        self.error(token.span(), DiagnosticId::ForwardingOutsideDefinition);
                    }
                }
                Node::new(NodeKind::ForwardingArguments, token.span())
            }
            _ => {
                self.error(self.current_span(), diag);
                Node::missing(self.current.start)
            }
        }
    }

    fn simple_literal(&mut self, kind: NodeKind) -> Node {
        let token = self.advance();
        Node::with_flags(kind, token.span(), NodeFlags::STATIC_LITERAL)
    }

    // ===== numerics =====

    /// Parses the numeric literal at `current`; `negated` folds a fused
    /// leading minus into the value.
    fn parse_numeric(&mut self, negated: bool) -> Node {
        use TokenKind::*;
        let token = self.advance();
        let span = if negated {
            ByteSpan::new(self.previous.start.saturating_sub(1), token.end)
        } else {
            token.span()
        };
        let text = self.token_text(token);
        let (base_kind, rational, imaginary) = match token.kind {
            IntegerLiteral => (0, false, false),
            IntegerRational => (0, true, false),
            IntegerImaginary => (0, false, true),
            IntegerRationalImaginary => (0, true, true),
            FloatLiteral => (1, false, false),
            FloatRational => (1, true, false),
            FloatImaginary => (1, false, true),
            _ => (1, true, true),
        };
        let suffix_len = usize::from(rational) + usize::from(imaginary);
        let digits = &text[..text.len() - suffix_len];

        let mut node = if base_kind == 0 {
            let value = match numbers::integer_value(digits) {
                numbers::ParsedInteger::Small(v) => {
                    IntegerValue::Small(if negated { -v } else { v })
                }
                numbers::ParsedInteger::Big { base, digits } => {
                    let digits =
                        if negated { format!("-{digits}") } else { digits };
                    IntegerValue::Big { base, digits }
                }
            };
            Node::with_flags(NodeKind::Integer { value }, span, NodeFlags::STATIC_LITERAL)
        } else {
            let value = numbers::float_value(digits);
            let value = if negated { -value } else { value };
            Node::with_flags(NodeKind::Float { value }, span, NodeFlags::STATIC_LITERAL)
        };
        if rational {
            node = Node::with_flags(
                NodeKind::Rational { numeric: Box::new(node) },
                span,
                NodeFlags::STATIC_LITERAL,
            );
        }
        if imaginary {
            node = Node::with_flags(
                NodeKind::Imaginary { numeric: Box::new(node) },
                span,
                NodeFlags::STATIC_LITERAL,
            );
        }
        node
    }

    /// Strips the negation folded into a numeric node (for `-2 ** n`).
    fn negate_numeric(node: Node) -> Node {
        let span = node.location;
        let flags = node.flags;
        let kind = match node.kind {
            NodeKind::Integer { value } => NodeKind::Integer {
                value: match value {
                    IntegerValue::Small(v) => IntegerValue::Small(-v),
                    IntegerValue::Big { base, digits } => IntegerValue::Big {
                        base,
                        digits: digits.strip_prefix('-').map(str::to_string).unwrap_or(digits),
                    },
                },
            },
            NodeKind::Float { value } => NodeKind::Float { value: -value },
            other => other,
        };
        Node::with_flags(kind, span, flags)
    }

    fn parse_unary_operator(&mut self) -> Node {
        let op = self.advance();
        let (name, bp) = match op.kind {
            TokenKind::UMinus => ("-@", level::UNARY_MINUS),
            TokenKind::UPlus => ("+@", level::UNARY),
            TokenKind::Tilde => ("~", level::UNARY),
            _ => ("!", level::UNARY),
        };
        let operand = self.parse_expression(bp, false, DiagnosticId::ExpressionExpected);
        let span = ByteSpan::new(op.start, operand.location.end);
        if op.kind == TokenKind::Bang {
            return Node::new(NodeKind::Not { expression: Box::new(operand) }, span);
        }
        Node::new(
            NodeKind::Call {
                receiver: Some(Box::new(operand)),
                name: name.into(),
                arguments: Vec::new(),
                block: None,
            },
            span,
        )
    }

    // ===== identifiers =====

    /// A bare identifier: local read, implicit parameter, or method call
    /// (possibly command style).
    fn parse_identifier(&mut self, accepts_command: bool) -> Node {
        let token = self.advance();
        let name_bytes = self.token_text(token);
        let name = self.token_string(token);
        let id = self.intern_token(token);

        let is_local = self.scopes.local_visible(id);
        let paren_call = self.current.kind == TokenKind::ParenLeft
            && self.current.start == token.end;

        if is_local && !paren_call {
            self.scopes.mark_read(id);
            let read = Node::new(NodeKind::LocalVariableRead { name }, token.span());
            // A known local followed by command arguments is still a call in
            // Ruby only with an explicit receiver; keep the read.
            return read;
        }

        // Implicit block parameters
        if !is_local && self.implicit_parameter_allowed(name_bytes, token.span()) {
            return self.parse_implicit_parameter(token, name);
        }

        if paren_call {
            return self.parse_call_with_parens(None, token, name);
        }

        if accepts_command && self.token_begins_expression() {
            return self.parse_command_call(None, token, name);
        }

        // A bare name: a zero-argument call that might later prove to be a
        // local (variable-call)
        let mut node = Node::with_flags(
            NodeKind::Call { receiver: None, name, arguments: Vec::new(), block: None },
            token.span(),
            NodeFlags::VARIABLE_CALL,
        );
        if matches!(self.current.kind, TokenKind::BraceLeft | TokenKind::KeywordDo) {
            node = self.attach_block(node);
        }
        node
    }

    fn parse_constant(&mut self, accepts_command: bool) -> Node {
        let token = self.advance();
        let name = self.token_string(token);
        if self.current.kind == TokenKind::ParenLeft && self.current.start == token.end {
            return self.parse_call_with_parens(None, token, name);
        }
        if accepts_command && self.token_begins_expression() {
            return self.parse_command_call(None, token, name);
        }
        Node::new(NodeKind::ConstantRead { name }, token.span())
    }

    /// `_1`..`_9` / `it` eligibility in the current scope.
    fn implicit_parameter_allowed(&mut self, name: &[u8], span: ByteSpan) -> bool {
        let numbered = is_numbered_parameter_name(name);
        let is_it = name == b"it";
        if !numbered && !is_it {
            return false;
        }
        let (allow_implicit, disallowed, ordinary) = match self.scopes.current() {
            Some(scope) => (
                scope.allow_implicit,
                scope.parameters.any(ParameterBits::IMPLICIT_DISALLOWED),
                scope.parameters.any(ParameterBits::ORDINARY),
            ),
            None => return false,
        };
        if !allow_implicit || disallowed {
            return false;
        }
        if ordinary {
            self.error(
                span,
                if numbered {
                    DiagnosticId::NumberedWithOrdinaryParameters
                } else {
                    DiagnosticId::ItWithOrdinaryParameters
                },
            );
            return false;
        }
        true
    }

    fn parse_implicit_parameter(&mut self, token: Token, name: String) -> Node {
        let numbered = name.as_bytes()[0] == b'_';
        let span = token.span();
        let id = self.intern_token(token);

        // Conflict matrix
        let (found_numbered, inner_numbered) = match self.scopes.current() {
            Some(scope) => (
                scope.parameters.any(ParameterBits::NUMBERED_FOUND),
                scope.parameters.any(ParameterBits::NUMBERED_INNER),
            ),
            None => (false, false),
        };
        if numbered && inner_numbered {
            self.error(span, DiagnosticId::NumberedInNestedBlocks);
        }
        if !numbered && found_numbered {
            self.error(span, DiagnosticId::ItWithNumberedParameters);
        }
        if numbered && self.outer_block_uses_numbered() {
            self.error(span, DiagnosticId::NumberedInNestedBlocks);
        }

        if let Some(scope) = self.scopes.current_mut() {
            if numbered {
                scope.parameters.set(ParameterBits::NUMBERED_FOUND);
            }
            if !scope.declares(id) {
                scope.declare(id, span);
                scope.implicit_parameters.push((id, span));
            }
            scope.mark_read(id);
        }
        if numbered {
            self.mark_enclosing_blocks_numbered_inner();
        }
        Node::new(NodeKind::LocalVariableRead { name }, span)
    }

    /// Does any enclosing open scope already bind numbered parameters?
    fn outer_block_uses_numbered(&self) -> bool {
        let mut frames = self.scopes.iter_rev();
        let Some(current) = frames.next() else { return false };
        if current.closed {
            return false;
        }
        for scope in frames {
            if scope.parameters.any(ParameterBits::NUMBERED_FOUND) {
                return true;
            }
            if scope.closed {
                break;
            }
        }
        false
    }

    /// Tags every enclosing block scope as having an inner numbered-
    /// parameter user, so it can no longer bind its own.
    fn mark_enclosing_blocks_numbered_inner(&mut self) {
        if self.scopes.current().is_none_or(|scope| scope.closed) {
            // A closed scope (lambda) does not leak the constraint outward
            return;
        }
        let mut index = self.scopes.depth().saturating_sub(1);
        while index > 0 {
            index -= 1;
            let Some(scope) = self.scopes.frame_mut(index) else { break };
            if scope.allow_implicit {
                scope.parameters.set(ParameterBits::NUMBERED_INNER);
            }
            if scope.closed {
                break;
            }
        }
    }

    // ===== grouping =====

    fn parse_parentheses(&mut self) -> Node {
        let open = self.advance();
        self.skip_newlines();
        if self.current.kind == TokenKind::ParenRight {
            let close = self.advance();
            return Node::new(
                NodeKind::Parentheses { body: None },
                ByteSpan::new(open.start, close.end),
            );
        }
        self.contexts.push(Context::Parens);
        let statements = self.parse_statements();
        self.contexts.pop();
        let close = self.expect(TokenKind::ParenRight, DiagnosticId::ParenCloseExpected);
        let body = match statements.kind {
            // A single expression keeps its own node under the parens
            NodeKind::Statements { mut body } if body.len() == 1 => {
                // Length was just checked.
                body.pop().unwrap_or_else(|| Node::missing(open.end))
            }
            _ => statements,
        };
        Node::new(
            NodeKind::Parentheses { body: Some(Box::new(body)) },
            ByteSpan::new(open.start, close.end.max(open.end)),
        )
    }

    fn parse_array_literal(&mut self) -> Node {
        let open = self.advance();
        let mut elements = Vec::new();
        let mut all_static = true;
        self.skip_newlines();
        while !matches!(self.current.kind, TokenKind::BracketRight | TokenKind::Eof) {
            let element = self.parse_array_element();
            all_static &= element.flags.contains(NodeFlags::STATIC_LITERAL);
            elements.push(element);
            self.skip_newlines();
            if !self.accept(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        let close = self.expect(TokenKind::BracketRight, DiagnosticId::BracketCloseExpected);
        let flags = if all_static { NodeFlags::STATIC_LITERAL } else { NodeFlags::empty() };
        Node::with_flags(
            NodeKind::Array { elements },
            ByteSpan::new(open.start, close.end.max(open.end)),
            flags,
        )
    }

    fn parse_array_element(&mut self) -> Node {
        match self.current.kind {
            TokenKind::UStar => {
                let star = self.advance();
                let value = self.parse_expression(
                    level::COMMAND_ARGUMENT,
                    false,
                    DiagnosticId::ExpressionExpected,
                );
                let span = ByteSpan::new(star.start, value.location.end);
                Node::new(NodeKind::Splat { expression: Some(Box::new(value)) }, span)
            }
            TokenKind::Label => {
                // `[a: 1]` — trailing keyword hash
                self.parse_keyword_hash()
            }
            _ => {
                let value = self.parse_expression(
                    level::COMMAND_ARGUMENT,
                    false,
                    DiagnosticId::ExpressionExpected,
                );
                if self.current.kind == TokenKind::EqualGreater {
                    // `[k => v]` — keyword hash with expression keys
                    self.parse_keyword_hash_from(value)
                } else {
                    value
                }
            }
        }
    }

    fn parse_hash_literal(&mut self) -> Node {
        let open = self.advance();
        let mut elements = Vec::new();
        self.skip_newlines();
        while !matches!(self.current.kind, TokenKind::BraceRight | TokenKind::Eof) {
            elements.push(self.parse_hash_element());
            self.skip_newlines();
            if !self.accept(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        let close = self.expect(TokenKind::BraceRight, DiagnosticId::BraceCloseExpected);
        self.check_duplicate_hash_keys(&elements);
        Node::new(
            NodeKind::Hash { elements },
            ByteSpan::new(open.start, close.end.max(open.end)),
        )
    }

    /// One `key: value`, `"key": value`, `key => value`, or `**splat`.
    fn parse_hash_element(&mut self) -> Node {
        match self.current.kind {
            TokenKind::Label => {
                let label = self.advance();
                let key_text =
                    String::from_utf8_lossy(&self.source[label.start..label.end - 1]).into_owned();
                let key = Node::new(NodeKind::Symbol { name: key_text }, label.span());
                let value = if self.token_begins_expression() {
                    Some(Box::new(self.parse_expression(
                        level::COMMAND_ARGUMENT,
                        false,
                        DiagnosticId::ExpressionExpected,
                    )))
                } else {
                    // Shorthand `{x:}` reads the local/method of that name
                    None
                };
                let end = value.as_ref().map_or(label.end, |v| v.location.end);
                Node::new(
                    NodeKind::Assoc { key: Box::new(key), value },
                    ByteSpan::new(label.start, end),
                )
            }
            TokenKind::UStarStar => {
                let star = self.advance();
                let value = if self.token_begins_expression() {
                    Some(Box::new(self.parse_expression(
                        level::COMMAND_ARGUMENT,
                        false,
                        DiagnosticId::ExpressionExpected,
                    )))
                } else {
                    None
                };
                let end = value.as_ref().map_or(star.end, |v| v.location.end);
                Node::new(NodeKind::AssocSplat { value }, ByteSpan::new(star.start, end))
            }
            TokenKind::StringBegin => {
                let (string, was_label) = self.parse_string_literal();
                if was_label {
                    let key = Self::string_to_symbol(string);
                    let value = self.parse_expression(
                        level::COMMAND_ARGUMENT,
                        false,
                        DiagnosticId::ExpressionExpected,
                    );
                    let span = key.location.join(value.location);
                    Node::new(
                        NodeKind::Assoc {
                            key: Box::new(key),
                            value: Some(Box::new(value)),
                        },
                        span,
                    )
                } else {
                    self.parse_assoc_from(string)
                }
            }
            _ => {
                let key = self.parse_expression(
                    level::COMMAND_ARGUMENT,
                    false,
                    DiagnosticId::ExpressionExpected,
                );
                self.parse_assoc_from(key)
            }
        }
    }

    fn parse_assoc_from(&mut self, key: Node) -> Node {
        self.expect(TokenKind::EqualGreater, DiagnosticId::UnexpectedToken);
        let value =
            self.parse_expression(level::COMMAND_ARGUMENT, false, DiagnosticId::ExpressionExpected);
        let span = key.location.join(value.location);
        Node::new(
            NodeKind::Assoc { key: Box::new(key), value: Some(Box::new(value)) },
            span,
        )
    }

    /// A quoted label key becomes an interned symbol.
    fn string_to_symbol(string: Node) -> Node {
        let span = string.location;
        match string.kind {
            NodeKind::String { value } => Node::new(NodeKind::Symbol { name: value }, span),
            NodeKind::InterpolatedString { parts } => {
                Node::new(NodeKind::InterpolatedSymbol { parts }, span)
            }
            other => Node::new(other, span),
        }
    }

    fn check_duplicate_hash_keys(&mut self, elements: &[Node]) {
        let mut seen: Vec<(String, ByteSpan)> = Vec::new();
        for element in elements {
            let NodeKind::Assoc { key, .. } = &element.kind else { continue };
            let repr = match &key.kind {
                NodeKind::Symbol { name } => format!(":{name}"),
                NodeKind::String { value } => format!("\"{value}\""),
                NodeKind::Integer { value } => value.to_string(),
                _ => continue,
            };
            if seen.iter().any(|(existing, _)| *existing == repr) {
                self.warning(key.location, DiagnosticId::HashKeyDuplicateWarning);
            } else {
                seen.push((repr, key.location));
            }
        }
    }

    /// A bare keyword-hash in argument position, starting at a label.
    fn parse_keyword_hash(&mut self) -> Node {
        let start = self.current.start;
        let mut elements = Vec::new();
        loop {
            elements.push(self.parse_hash_element());
            if !self.accept(TokenKind::Comma) {
                break;
            }
        }
        let end = elements.last().map_or(start, |e| e.location.end);
        let elements_span = ByteSpan::new(start, end);
        self.check_duplicate_hash_keys(&elements);
        Node::new(NodeKind::KeywordHash { elements }, elements_span)
    }

    /// A keyword hash whose first key (an expression before `=>`) is
    /// already parsed.
    fn parse_keyword_hash_from(&mut self, first_key: Node) -> Node {
        let start = first_key.location.start;
        let mut elements = vec![self.parse_assoc_from(first_key)];
        while self.accept(TokenKind::Comma) {
            elements.push(self.parse_hash_element());
        }
        let end = elements.last().map_or(start, |e| e.location.end);
        self.check_duplicate_hash_keys(&elements);
        Node::new(NodeKind::KeywordHash { elements }, ByteSpan::new(start, end))
    }

    // ===== lambdas =====

    fn parse_lambda(&mut self) -> Node {
        let arrow = self.advance();
        self.scopes.push(Scope::block(true));

        let parameters = if self.accept(TokenKind::ParenLeft) {
            let parameters = if self.current.kind == TokenKind::ParenRight {
                None
            } else {
                Some(self.parse_parameter_list(TokenKind::ParenRight))
            };
            self.expect(TokenKind::ParenRight, DiagnosticId::ParenCloseExpected);
            parameters
        } else if matches!(
            self.current.kind,
            TokenKind::Identifier | TokenKind::UStar | TokenKind::UStarStar | TokenKind::UAmp
        ) {
            Some(self.parse_parameter_list(TokenKind::LambdaBegin))
        } else {
            None
        };

        self.block_exits.push(ExitFrame::Loop);
        let (body, close_end) = if self.accept(TokenKind::LambdaBegin) {
            let statements = self.parse_body(Context::LambdaBraces);
            let close = self.expect(TokenKind::BraceRight, DiagnosticId::BraceCloseExpected);
            (statements, close.end)
        } else if self.accept(TokenKind::KeywordDo) {
            let statements = self.parse_body(Context::LambdaDo);
            let close = self.expect_end(arrow);
            (statements, close.end)
        } else {
            self.error(self.current_span(), DiagnosticId::UnexpectedToken);
            (Node::new(NodeKind::Statements { body: Vec::new() }, arrow.span()), arrow.end)
        };
        self.block_exits.pop();

        let scope = self.scopes.pop();
        let locals = self.scope_local_names(scope);
        let body_empty = matches!(&body.kind, NodeKind::Statements { body } if body.is_empty());
        Node::new(
            NodeKind::Lambda {
                parameters: parameters.map(Box::new),
                body: if body_empty { None } else { Some(Box::new(body)) },
                locals,
            },
            ByteSpan::new(arrow.start, close_end.max(arrow.end)),
        )
    }

    // ===== defined? and super =====

    fn parse_defined(&mut self) -> Node {
        let keyword = self.advance();
        let (expression, end) = if self.accept(TokenKind::ParenLeft) {
            let expression =
                self.parse_expression(level::STATEMENT, false, DiagnosticId::ExpressionExpected);
            let close = self.expect(TokenKind::ParenRight, DiagnosticId::ParenCloseExpected);
            (expression, close.end)
        } else {
            let expression =
                self.parse_expression(level::UNARY, false, DiagnosticId::ExpressionExpected);
            let end = expression.location.end;
            (expression, end)
        };
        Node::new(
            NodeKind::Defined { expression: Box::new(expression) },
            ByteSpan::new(keyword.start, end.max(keyword.end)),
        )
    }

    fn parse_super(&mut self) -> Node {
        let keyword = self.advance();
        if self.accept(TokenKind::ParenLeft) {
            let arguments = if self.current.kind == TokenKind::ParenRight {
                Vec::new()
            } else {
                self.parse_argument_list(TokenKind::ParenRight)
            };
            let close = self.expect(TokenKind::ParenRight, DiagnosticId::ParenCloseExpected);
            let mut node = Node::new(
                NodeKind::Super { arguments, block: None },
                ByteSpan::new(keyword.start, close.end.max(keyword.end)),
            );
            if matches!(self.current.kind, TokenKind::BraceLeft | TokenKind::KeywordDo) {
                node = self.attach_block(node);
            }
            node
        } else if self.token_begins_expression() {
            let arguments = self.parse_command_argument_list();
            let end = arguments.last().map_or(keyword.end, |a| a.location.end);
            Node::new(
                NodeKind::Super { arguments, block: None },
                ByteSpan::new(keyword.start, end),
            )
        } else {
            let mut node = Node::new(NodeKind::ZSuper, keyword.span());
            if matches!(self.current.kind, TokenKind::BraceLeft | TokenKind::KeywordDo) {
                node = self.attach_block(node);
            }
            node
        }
    }
}
