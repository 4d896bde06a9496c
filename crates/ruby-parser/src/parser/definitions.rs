impl<'src> Parser<'src> {
    // ===== method definitions =====

    fn parse_def(&mut self) -> Node {
        let keyword = self.advance();

        // Everything after `def` lexes in method-name state, so a singleton
        // receiver (`def self.foo`, `def obj.foo`) shows up as a name token
        // followed by `.` / `::`.
        let mut receiver = None;
        let mut name_token = self.parse_method_name_token();
        if matches!(self.current.kind, TokenKind::Dot | TokenKind::ColonColon)
            && name_token.kind != TokenKind::Missing
        {
            self.advance();
            let text = self.token_text(name_token);
            receiver = Some(Box::new(if text == b"self" {
                Node::new(NodeKind::SelfExpression, name_token.span())
            } else if text.first().is_some_and(u8::is_ascii_uppercase) {
                let name = self.token_string(name_token);
                Node::new(NodeKind::ConstantRead { name }, name_token.span())
            } else {
                let name = self.token_string(name_token);
                let id = self.intern_token(name_token);
                self.scopes.mark_read(id);
                Node::new(NodeKind::LocalVariableRead { name }, name_token.span())
            }));
            name_token = self.parse_method_name_token();
        }
        let name = self.method_name_string(name_token);

        // The method body is a fresh closed scope
        self.scopes.push(Scope::new(true));
        self.block_exits.push(ExitFrame::Barrier);

        let parameters = self.parse_method_parameters();

        // Endless definition: `def foo(x) = expr`
        if self.accept(TokenKind::Equal) {
            self.contexts.push(Context::Def);
            let body = self.parse_expression(
                level::ASSIGNMENT,
                true,
                DiagnosticId::ExpressionExpected,
            );
            self.contexts.pop();
            self.block_exits.pop();
            let scope = self.scopes.pop();
            let locals = self.scope_local_names(scope);
            let span = ByteSpan::new(keyword.start, body.location.end.max(keyword.end));
            return Node::new(
                NodeKind::Def {
                    name,
                    receiver,
                    parameters: parameters.map(Box::new),
                    body: Some(Box::new(body)),
                    locals,
                },
                span,
            );
        }

        self.accept_terminator();
        self.contexts.push(Context::Def);
        let statements = self.parse_statements();
        self.contexts.pop();

        // rescue/else/ensure tail shares the begin machinery
        let body = if matches!(
            self.current.kind,
            TokenKind::KeywordRescue | TokenKind::KeywordEnsure | TokenKind::KeywordElse
        ) {
            self.contexts.push(Context::DefRescue);
            let begin = self.parse_begin_tail(keyword, Some(statements));
            self.contexts.pop();
            begin
        } else {
            self.expect_end(keyword);
            statements
        };
        self.block_exits.pop();
        let scope = self.scopes.pop();
        let locals = self.scope_local_names(scope);

        let body_empty = matches!(&body.kind, NodeKind::Statements { body } if body.is_empty());
        let span = ByteSpan::new(keyword.start, self.previous.end.max(keyword.end));
        Node::new(
            NodeKind::Def {
                name,
                receiver,
                parameters: parameters.map(Box::new),
                body: if body_empty { None } else { Some(Box::new(body)) },
                locals,
            },
            span,
        )
    }

    /// The token naming a method in `def`/`alias`/`undef` position: an
    /// identifier, setter, or operator.
    fn parse_method_name_token(&mut self) -> Token {
        let kind = self.current.kind;
        if kind == TokenKind::MethodName
            || kind == TokenKind::Identifier
            || kind == TokenKind::Constant
            || kind.is_operator_method_name()
        {
            self.advance()
        } else {
            self.error(self.current_span(), DiagnosticId::MethodNameExpected);
            Token::missing(self.previous.end)
        }
    }

    fn method_name_string(&self, token: Token) -> String {
        if token.kind == TokenKind::Missing {
            String::new()
        } else {
            self.token_string(token)
        }
    }

    /// Parses the parameter list of a `def` (parenthesized or bare).
    fn parse_method_parameters(&mut self) -> Option<Node> {
        if self.accept(TokenKind::ParenLeft) {
            let parameters = if self.current.kind == TokenKind::ParenRight {
                None
            } else {
                Some(self.parse_parameter_list(TokenKind::ParenRight))
            };
            self.expect(TokenKind::ParenRight, DiagnosticId::ParenCloseExpected);
            parameters
        } else if matches!(
            self.current.kind,
            TokenKind::Identifier
                | TokenKind::UStar
                | TokenKind::UStarStar
                | TokenKind::UAmp
                | TokenKind::Label
                | TokenKind::DotDotDot
                | TokenKind::UDotDotDot
        ) {
            Some(self.parse_parameter_list(TokenKind::Newline))
        } else {
            None
        }
    }

    /// The ordered parameter grammar: requireds, optionals, `*rest`, posts,
    /// keywords, `**kwrest`, `&block`, or `...`.
    fn parse_parameter_list(&mut self, terminator: TokenKind) -> Node {
        let start = self.current.start;
        let mut requireds = Vec::new();
        let mut optionals = Vec::new();
        let mut rest: Option<Box<Node>> = None;
        let mut posts = Vec::new();
        let mut keywords = Vec::new();
        let mut keyword_rest: Option<Box<Node>> = None;
        let mut block: Option<Box<Node>> = None;

        loop {
            if self.current.kind == terminator || self.current.kind == TokenKind::Eof {
                break;
            }
            match self.current.kind {
                TokenKind::Identifier => {
                    let token = self.advance();
                    let name = self.declare_parameter(token);
                    if self.accept(TokenKind::Equal) {
                        let value = self.parse_expression(
                            level::COMMAND_ARGUMENT,
                            false,
                            DiagnosticId::ExpressionExpected,
                        );
                        let span = ByteSpan::new(token.start, value.location.end);
                        optionals.push(Node::new(
                            NodeKind::OptionalParameter { name, value: Box::new(value) },
                            span,
                        ));
                    } else if rest.is_some() {
                        posts
                            .push(Node::new(NodeKind::RequiredParameter { name }, token.span()));
                    } else {
                        requireds
                            .push(Node::new(NodeKind::RequiredParameter { name }, token.span()));
                    }
                }
                TokenKind::ParenLeft => {
                    // Destructured parameter: `def f((a, b))`
                    self.advance();
                    let target = self.parse_destructured_parameter();
                    self.expect(TokenKind::ParenRight, DiagnosticId::ParenCloseExpected);
                    if rest.is_some() {
                        posts.push(target);
                    } else {
                        requireds.push(target);
                    }
                }
                TokenKind::UStar | TokenKind::Star => {
                    let star = self.advance();
                    let name = if self.current.kind == TokenKind::Identifier {
                        let token = self.advance();
                        Some(self.declare_parameter(token))
                    } else {
                        None
                    };
                    let end = self.previous.end;
                    let node =
                        Node::new(NodeKind::RestParameter { name }, ByteSpan::new(star.start, end));
                    if rest.is_some() {
                        self.error(node.location, DiagnosticId::PatternRestDuplicate);
                    } else {
                        rest = Some(Box::new(node));
                        self.mark_parameter_bit(ParameterBits::REST);
                    }
                }
                TokenKind::UStarStar | TokenKind::StarStar => {
                    let star = self.advance();
                    let node = if self.current.kind == TokenKind::KeywordNil {
                        let nil = self.advance();
                        Node::new(
                            NodeKind::NoKeywordsParameter,
                            ByteSpan::new(star.start, nil.end),
                        )
                    } else {
                        let name = if self.current.kind == TokenKind::Identifier {
                            let token = self.advance();
                            Some(self.declare_parameter(token))
                        } else {
                            None
                        };
                        Node::new(
                            NodeKind::KeywordRestParameter { name },
                            ByteSpan::new(star.start, self.previous.end),
                        )
                    };
                    keyword_rest = Some(Box::new(node));
                    self.mark_parameter_bit(ParameterBits::KEYWORD_REST);
                }
                TokenKind::UAmp | TokenKind::Amp => {
                    let amp = self.advance();
                    let name = if self.current.kind == TokenKind::Identifier {
                        let token = self.advance();
                        Some(self.declare_parameter(token))
                    } else {
                        None
                    };
                    block = Some(Box::new(Node::new(
                        NodeKind::BlockParameter { name },
                        ByteSpan::new(amp.start, self.previous.end),
                    )));
                    self.mark_parameter_bit(ParameterBits::BLOCK);
                }
                TokenKind::DotDotDot | TokenKind::UDotDotDot => {
                    let dots = self.advance();
                    keyword_rest = Some(Box::new(Node::new(
                        NodeKind::ForwardingParameter,
                        dots.span(),
                    )));
                    self.mark_parameter_bit(ParameterBits::FORWARDING);
                }
                TokenKind::Label => {
                    let token = self.advance();
                    // Label text includes the trailing ':'
                    let name_bytes = &self.source[token.start..token.end - 1];
                    let name = String::from_utf8_lossy(name_bytes).into_owned();
                    self.declare_parameter_named(name_bytes.to_vec(), token.span());
                    let value = if self.token_begins_expression()
                        && self.current.kind != TokenKind::Comma
                    {
                        Some(Box::new(self.parse_expression(
                            level::COMMAND_ARGUMENT,
                            false,
                            DiagnosticId::ExpressionExpected,
                        )))
                    } else {
                        None
                    };
                    let end = value.as_ref().map_or(token.end, |v| v.location.end);
                    keywords.push(Node::new(
                        NodeKind::KeywordParameter { name, value },
                        ByteSpan::new(token.start, end),
                    ));
                }
                _ => {
                    self.error(self.current_span(), DiagnosticId::UnexpectedToken);
                    break;
                }
            }
            if !self.accept(TokenKind::Comma) {
                break;
            }
        }

        self.mark_parameter_bit(ParameterBits::ORDINARY);
        let end = self.previous.end.max(start);
        Node::new(
            NodeKind::Parameters {
                requireds,
                optionals,
                rest,
                posts,
                keywords,
                keyword_rest,
                block,
            },
            ByteSpan::new(start, end),
        )
    }

    fn parse_destructured_parameter(&mut self) -> Node {
        let start = self.current.start;
        let mut targets = Vec::new();
        loop {
            match self.current.kind {
                TokenKind::Identifier => {
                    let token = self.advance();
                    let name = self.declare_parameter(token);
                    targets.push(Node::new(NodeKind::RequiredParameter { name }, token.span()));
                }
                TokenKind::UStar | TokenKind::Star => {
                    let star = self.advance();
                    let name = if self.current.kind == TokenKind::Identifier {
                        let token = self.advance();
                        Some(self.declare_parameter(token))
                    } else {
                        None
                    };
                    targets.push(Node::new(
                        NodeKind::RestParameter { name },
                        ByteSpan::new(star.start, self.previous.end),
                    ));
                }
                TokenKind::ParenLeft => {
                    self.advance();
                    let nested = self.parse_destructured_parameter();
                    self.expect(TokenKind::ParenRight, DiagnosticId::ParenCloseExpected);
                    targets.push(nested);
                }
                _ => {
                    self.error(self.current_span(), DiagnosticId::UnexpectedToken);
                    break;
                }
            }
            if !self.accept(TokenKind::Comma) {
                break;
            }
        }
        Node::new(NodeKind::MultiTarget { targets }, ByteSpan::new(start, self.previous.end))
    }

    /// Declares a parameter local, diagnosing duplicates and reserved names.
    fn declare_parameter(&mut self, token: Token) -> String {
        let name = self.token_string(token);
        self.declare_parameter_named(self.token_text(token).to_vec(), token.span());
        name
    }

    fn declare_parameter_named(&mut self, bytes: Vec<u8>, span: ByteSpan) {
        if is_numbered_parameter_name(&bytes) {
            self.error(span, DiagnosticId::ParameterNameReserved);
        }
        let id = self.intern_owned(bytes);
        if !self.scopes.declare(id, span) {
            let name = self.constant_name(id);
            if !name.starts_with('_') {
                self.error_with(span, DiagnosticId::ParameterNameDuplicate, &name);
            }
        }
    }

    fn mark_parameter_bit(&mut self, bit: ParameterBits) {
        if let Some(scope) = self.scopes.current_mut() {
            scope.parameters.set(bit);
        }
    }

    // ===== classes and modules =====

    fn parse_class(&mut self) -> Node {
        let keyword = self.advance();

        // `class << expr` singleton class
        if self.accept(TokenKind::LessLess) {
            let expression =
                self.parse_expression(level::NOT, false, DiagnosticId::ExpressionExpected);
            self.accept_terminator();
            self.scopes.push(Scope::new(true));
            self.block_exits.push(ExitFrame::Barrier);
            let statements = self.parse_body(Context::SClass);
            self.block_exits.pop();
            let scope = self.scopes.pop();
            let locals = self.scope_local_names(scope);
            let end_token = self.expect_end(keyword);
            let body_empty =
                matches!(&statements.kind, NodeKind::Statements { body } if body.is_empty());
            return Node::new(
                NodeKind::SingletonClass {
                    expression: Box::new(expression),
                    body: if body_empty { None } else { Some(Box::new(statements)) },
                    locals,
                },
                ByteSpan::new(keyword.start, end_token.end.max(keyword.end)),
            );
        }

        let constant_path = self.parse_defined_constant_path();
        let superclass = if self.accept(TokenKind::Less) {
            Some(Box::new(self.parse_expression(
                level::COMMAND_ARGUMENT,
                false,
                DiagnosticId::ExpressionExpected,
            )))
        } else {
            None
        };
        self.accept_terminator();
        self.scopes.push(Scope::new(true));
        self.block_exits.push(ExitFrame::Barrier);
        let statements = self.parse_body(Context::Class);
        self.block_exits.pop();
        let scope = self.scopes.pop();
        let locals = self.scope_local_names(scope);
        let end_token = self.expect_end(keyword);
        let body_empty =
            matches!(&statements.kind, NodeKind::Statements { body } if body.is_empty());
        Node::new(
            NodeKind::Class {
                constant_path: Box::new(constant_path),
                superclass,
                body: if body_empty { None } else { Some(Box::new(statements)) },
                locals,
            },
            ByteSpan::new(keyword.start, end_token.end.max(keyword.end)),
        )
    }

    fn parse_module(&mut self) -> Node {
        let keyword = self.advance();
        let constant_path = self.parse_defined_constant_path();
        self.accept_terminator();
        self.scopes.push(Scope::new(true));
        self.block_exits.push(ExitFrame::Barrier);
        let statements = self.parse_body(Context::Module);
        self.block_exits.pop();
        let scope = self.scopes.pop();
        let locals = self.scope_local_names(scope);
        let end_token = self.expect_end(keyword);
        let body_empty =
            matches!(&statements.kind, NodeKind::Statements { body } if body.is_empty());
        Node::new(
            NodeKind::Module {
                constant_path: Box::new(constant_path),
                body: if body_empty { None } else { Some(Box::new(statements)) },
                locals,
            },
            ByteSpan::new(keyword.start, end_token.end.max(keyword.end)),
        )
    }

    /// The `Foo::Bar::Baz` path after `class` / `module`.
    fn parse_defined_constant_path(&mut self) -> Node {
        let leading = if self.current.kind == TokenKind::UColonColon {
            Some(self.advance())
        } else {
            None
        };
        let first = self.expect(TokenKind::Constant, DiagnosticId::ConstantNameExpected);
        let mut node = if let Some(colon) = leading {
            Node::new(
                NodeKind::ConstantPath { parent: None, name: self.token_string(first) },
                ByteSpan::new(colon.start, first.end.max(colon.end)),
            )
        } else if first.kind == TokenKind::Missing {
            Node::missing(first.start)
        } else {
            Node::new(NodeKind::ConstantRead { name: self.token_string(first) }, first.span())
        };
        while self.current.kind == TokenKind::ColonColon {
            self.advance();
            // After `::` the lexer is in method-name state; constants arrive
            // as MethodName tokens whose text decides the path.
            let part = if matches!(self.current.kind, TokenKind::Constant | TokenKind::MethodName)
            {
                self.advance()
            } else {
                self.error(self.current_span(), DiagnosticId::ConstantNameExpected);
                Token::missing(self.previous.end)
            };
            let name = self.token_string(part);
            let span = ByteSpan::new(node.location.start, part.end.max(node.location.end));
            node = Node::new(
                NodeKind::ConstantPath { parent: Some(Box::new(node)), name },
                span,
            );
        }
        node
    }

    // ===== alias / undef =====

    fn parse_alias(&mut self) -> Node {
        let keyword = self.advance();
        let new_name = self.parse_alias_name();
        let old_name = self.parse_alias_name();
        let span = ByteSpan::new(keyword.start, old_name.location.end.max(keyword.end));
        Node::new(
            NodeKind::Alias { new_name: Box::new(new_name), old_name: Box::new(old_name) },
            span,
        )
    }

    /// One name in an `alias` pair: a bare method name, a symbol, or a
    /// global variable (for `alias $new $old`).
    fn parse_alias_name(&mut self) -> Node {
        match self.current.kind {
            TokenKind::SymbolBegin => self.parse_symbol(),
            TokenKind::GlobalVariable | TokenKind::BackReference | TokenKind::NthReference => {
                let token = self.advance();
                Node::new(
                    NodeKind::GlobalVariableRead { name: self.token_string(token) },
                    token.span(),
                )
            }
            _ => {
                let token = self.parse_method_name_token();
                Node::new(NodeKind::Symbol { name: self.method_name_string(token) }, token.span())
            }
        }
    }

    fn parse_undef(&mut self) -> Node {
        let keyword = self.advance();
        let mut names = Vec::new();
        loop {
            let name = match self.current.kind {
                TokenKind::SymbolBegin => self.parse_symbol(),
                _ => {
                    let token = self.parse_method_name_token();
                    Node::new(
                        NodeKind::Symbol { name: self.method_name_string(token) },
                        token.span(),
                    )
                }
            };
            names.push(name);
            if !self.accept(TokenKind::Comma) {
                break;
            }
        }
        let end = names.last().map_or(keyword.end, |n| n.location.end);
        Node::new(NodeKind::Undef { names }, ByteSpan::new(keyword.start, end))
    }
}

/// `_1` through `_9`.
fn is_numbered_parameter_name(bytes: &[u8]) -> bool {
    bytes.len() == 2 && bytes[0] == b'_' && (b'1'..=b'9').contains(&bytes[1])
}
