impl<'src> Parser<'src> {
    /// `name(args)` with an adjacent opening paren.
    fn parse_call_with_parens(
        &mut self,
        receiver: Option<Box<Node>>,
        name_token: Token,
        name: String,
    ) -> Node {
        self.advance(); // '('
        self.skip_newlines();
        let arguments = if self.current.kind == TokenKind::ParenRight {
            Vec::new()
        } else {
            self.parse_argument_list(TokenKind::ParenRight)
        };
        let close = self.expect(TokenKind::ParenRight, DiagnosticId::ParenCloseExpected);
        let start = receiver.as_ref().map_or(name_token.start, |r| r.location.start);
        let mut node = Node::new(
            NodeKind::Call { receiver, name, arguments, block: None },
            ByteSpan::new(start, close.end.max(name_token.end)),
        );
        if matches!(self.current.kind, TokenKind::BraceLeft | TokenKind::KeywordDo) {
            node = self.attach_block(node);
        }
        node
    }

    /// A parenthesis-free call with arguments (`foo a, b`).
    fn parse_command_call(
        &mut self,
        receiver: Option<Box<Node>>,
        name_token: Token,
        name: String,
    ) -> Node {
        // Command arguments may end at a `do` that belongs to this call
        self.lexer.accepts_block_push(true);
        let arguments = self.parse_command_argument_list();
        self.lexer.accepts_block_pop();
        let start = receiver.as_ref().map_or(name_token.start, |r| r.location.start);
        let end = arguments.last().map_or(name_token.end, |a| a.location.end);
        let mut node = Node::with_flags(
            NodeKind::Call { receiver, name, arguments, block: None },
            ByteSpan::new(start, end),
            NodeFlags::COMMAND_CALL,
        );
        // A `do` block may still attach to a command call
        if self.current.kind == TokenKind::KeywordDo {
            node = self.attach_block(node);
        }
        node
    }

    /// Comma-separated parenthesized arguments up to (not including)
    /// `closer`.
    fn parse_argument_list(&mut self, closer: TokenKind) -> Vec<Node> {
        let mut arguments = Vec::new();
        loop {
            self.skip_newlines();
            if self.current.kind == closer || self.current.kind == TokenKind::Eof {
                break;
            }
            arguments.push(self.parse_argument());
            self.skip_newlines();
            if !self.accept(TokenKind::Comma) {
                break;
            }
        }
        arguments
    }

    /// Bare command arguments: no enclosing delimiter, one line.
    fn parse_command_argument_list(&mut self) -> Vec<Node> {
        let mut arguments = Vec::new();
        loop {
            arguments.push(self.parse_argument());
            if !self.accept(TokenKind::Comma) {
                break;
            }
        }
        arguments
    }

    /// One argument: splat, block-pass, keyword hash, forwarding, or a
    /// plain expression.
    fn parse_argument(&mut self) -> Node {
        match self.current.kind {
            TokenKind::UStar => {
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
            TokenKind::UStarStar => {
                // `**opts` flows into a keyword hash
                self.parse_keyword_hash()
            }
            TokenKind::UAmp => {
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
                Node::new(
                    NodeKind::BlockArgument { expression },
                    ByteSpan::new(amp.start, end),
                )
            }
            TokenKind::Label => self.parse_keyword_hash(),
            TokenKind::DotDotDot => self.parse_forwarding_argument(),
            TokenKind::UDotDotDot
                if matches!(
                    peek_after_dots(self.source, self.current.end),
                    b')' | b',' | b'\n' | 0
                ) =>
            {
                self.parse_forwarding_argument()
            }
            _ => {
                // Commands nest inside command arguments: `puts foo bar`
                let value = self.parse_expression(
                    level::COMMAND_ARGUMENT,
                    true,
                    DiagnosticId::ExpressionExpected,
                );
                if self.current.kind == TokenKind::EqualGreater {
                    self.parse_keyword_hash_from(value)
                } else {
                    value
                }
            }
        }
    }

    /// Infix `.`, `&.`, `::`: method call or constant-path extension.
    fn parse_call_chain(&mut self, receiver: Node, accepts_command: bool) -> Node {
        let operator = self.advance();
        let safe_navigation = operator.kind == TokenKind::AmpDot;

        // `Foo::Bar` without arguments is a constant path
        if operator.kind == TokenKind::ColonColon
            && matches!(self.current.kind, TokenKind::Constant | TokenKind::MethodName)
        {
            let text = self.token_text(self.current);
            let upper = text.first().is_some_and(u8::is_ascii_uppercase);
            let paren_follows = {
                let end = self.current.end;
                self.source.get(end) == Some(&b'(')
            };
            if upper && !paren_follows {
                let name_token = self.advance();
                let name = self.token_string(name_token);
                let span = ByteSpan::new(receiver.location.start, name_token.end);
                return Node::new(
                    NodeKind::ConstantPath { parent: Some(Box::new(receiver)), name },
                    span,
                );
            }
        }

        let name_token = match self.current.kind {
            TokenKind::MethodName
            | TokenKind::Identifier
            | TokenKind::Constant
            | TokenKind::BracketLeftRight
            | TokenKind::BracketLeftRightEqual => self.advance(),
            kind if kind.is_operator_method_name() => self.advance(),
            _ => {
                self.error(self.current_span(), DiagnosticId::MethodNameExpected);
                Token::missing(self.previous.end)
            }
        };
        let name = if name_token.kind == TokenKind::Missing {
            String::new()
        } else {
            self.token_string(name_token)
        };

        let flags = if safe_navigation {
            NodeFlags::SAFE_NAVIGATION
        } else {
            NodeFlags::empty()
        };

        if self.current.kind == TokenKind::ParenLeft && self.current.start == name_token.end {
            let mut node =
                self.parse_call_with_parens(Some(Box::new(receiver)), name_token, name);
            node.flags |= flags;
            return node;
        }

        if accepts_command && self.token_begins_expression() {
            let mut node = self.parse_command_call(Some(Box::new(receiver)), name_token, name);
            node.flags |= flags;
            return node;
        }

        let span = ByteSpan::new(receiver.location.start, name_token.end);
        let mut node = Node::with_flags(
            NodeKind::Call {
                receiver: Some(Box::new(receiver)),
                name,
                arguments: Vec::new(),
                block: None,
            },
            span,
            flags,
        );
        if matches!(self.current.kind, TokenKind::BraceLeft | TokenKind::KeywordDo) {
            node = self.attach_block(node);
        }
        node
    }

    /// Infix `receiver[args]` element reference.
    fn parse_index_call(&mut self, receiver: Node) -> Node {
        self.advance(); // '['
        self.skip_newlines();
        let arguments = if self.current.kind == TokenKind::BracketRight {
            Vec::new()
        } else {
            self.parse_argument_list(TokenKind::BracketRight)
        };
        let close = self.expect(TokenKind::BracketRight, DiagnosticId::BracketCloseExpected);
        let span = ByteSpan::new(receiver.location.start, close.end.max(receiver.location.end));
        Node::new(
            NodeKind::Call {
                receiver: Some(Box::new(receiver)),
                name: "[]".into(),
                arguments,
                block: None,
            },
            span,
        )
    }

    /// Attaches a brace or `do` block to a call-like node.
    fn attach_block(&mut self, call: Node) -> Node {
        let block = self.parse_block();
        let span = call.location.join(block.location);
        let flags = call.flags;
        let kind = match call.kind {
            NodeKind::Call { receiver, name, arguments, .. } => {
                NodeKind::Call { receiver, name, arguments, block: Some(Box::new(block)) }
            }
            NodeKind::Super { arguments, .. } => {
                NodeKind::Super { arguments, block: Some(Box::new(block)) }
            }
            other => other,
        };
        Node::with_flags(kind, span, flags)
    }

    /// `{ |params| body }` or `do |params| body end`.
    fn parse_block(&mut self) -> Node {
        let open = self.advance();
        let braces = open.kind == TokenKind::BraceLeft;
        self.scopes.push(Scope::block(false));

        let parameters = if self.current.kind == TokenKind::Pipe {
            Some(Box::new(self.parse_block_parameters()))
        } else {
            None
        };

        self.block_exits.push(ExitFrame::Loop);
        let statements =
            self.parse_body(if braces { Context::BlockBraces } else { Context::BlockDo });
        self.block_exits.pop();

        let close = if braces {
            self.expect(TokenKind::BraceRight, DiagnosticId::BraceCloseExpected)
        } else {
            self.expect_end(open)
        };

        let scope = self.scopes.pop();
        let locals = self.scope_local_names(scope);
        let body_empty =
            matches!(&statements.kind, NodeKind::Statements { body } if body.is_empty());
        Node::new(
            NodeKind::Block {
                parameters,
                body: if body_empty { None } else { Some(Box::new(statements)) },
                locals,
            },
            ByteSpan::new(open.start, close.end.max(open.end)),
        )
    }

    /// `...` as an argument, forwarding every parameter kind onward.
    fn parse_forwarding_argument(&mut self) -> Node {
        let dots = self.advance();
        if let Some(scope) = self.scopes.current() {
            if !scope.parameters.any(ParameterBits::FORWARDING) {
                self.error(dots.span(), DiagnosticId::ForwardingOutsideDefinition);
            }
        }
        Node::new(NodeKind::ForwardingArguments, dots.span())
    }

    /// `|a, b; c|` block parameters (block-local variables after `;`).
    fn parse_block_parameters(&mut self) -> Node {
        let open = self.advance(); // '|'
        // Even `| |` counts as an ordinary parameter list, suppressing
        // numbered parameters and `it`
        self.mark_parameter_bit(ParameterBits::ORDINARY);
        let parameters = if matches!(self.current.kind, TokenKind::Pipe) {
            None
        } else {
            Some(Box::new(self.parse_parameter_list(TokenKind::Pipe)))
        };
        let mut block_locals = Vec::new();
        if self.accept(TokenKind::Semicolon) {
            while self.current.kind == TokenKind::Identifier {
                let token = self.advance();
                let name = self.declare_parameter(token);
                block_locals
                    .push(Node::new(NodeKind::RequiredParameter { name }, token.span()));
                if !self.accept(TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::Pipe, DiagnosticId::UnexpectedToken);
        Node::new(
            NodeKind::BlockParameters { parameters, locals: block_locals },
            ByteSpan::new(open.start, close.end.max(open.end)),
        )
    }
}

/// First significant byte after a `...` token (0 at end of input), deciding
/// argument forwarding (`g(...)`) versus a beginless range (`g(...9)`).
fn peek_after_dots(source: &[u8], mut pos: usize) -> u8 {
    while pos < source.len() && matches!(source[pos], b' ' | b'\t') {
        pos += 1;
    }
    source.get(pos).copied().unwrap_or(0)
}
