impl<'src> Parser<'src> {
    /// The Pratt loop: parse a prefix expression, then greedily apply infix
    /// operators while their left binding power meets `min_bp`.
    fn parse_expression(&mut self, min_bp: u8, accepts_command: bool, diag: DiagnosticId) -> Node {
        if self.depth >= MAX_PARSE_DEPTH {
            self.error(self.current_span(), DiagnosticId::NestingTooDeep);
            return Node::missing(self.current.start);
        }
        self.depth += 1;
        let exit_watermark = self.block_exits.len();

        let mut node = self.parse_expression_prefix(accepts_command, diag);
        let mut statement_only = Self::is_statement_only(&node.kind);
        let mut last_nonassoc: Option<u8> = None;

        loop {
            // Comma after a target-able expression at statement level opens
            // a multiple assignment.
            if min_bp <= level::MODIFIER
                && self.current.kind == TokenKind::Comma
                && Self::is_write_target_candidate(&node.kind)
            {
                node = self.parse_multi_write(node);
                statement_only = true;
                continue;
            }

            let bp = binding_power(self.current.kind);
            if !bp.is_binary() || bp.left < min_bp {
                break;
            }
            if statement_only && !Self::is_modifier_operator(self.current.kind) {
                break;
            }
            // A parenthesis-free command call only composes with and/or and
            // the statement modifiers; chaining a method call onto a command
            // result needs parentheses.
            if node.flags.contains(NodeFlags::COMMAND_CALL)
                && bp.left > level::MODIFIER_RESCUE
            {
                if matches!(
                    self.current.kind,
                    TokenKind::Dot
                        | TokenKind::AmpDot
                        | TokenKind::ColonColon
                        | TokenKind::BracketLeft
                ) {
                    self.error(self.current_span(), DiagnosticId::CommandChained);
                }
                break;
            }
            if bp.nonassoc {
                if last_nonassoc == Some(bp.left) {
                    self.error(self.current_span(), DiagnosticId::NonAssociativeOperator);
                    break;
                }
                last_nonassoc = Some(bp.left);
            } else {
                last_nonassoc = None;
            }
            node = self.parse_expression_infix(node, bp, accepts_command);
        }

        // Resolve begin-candidates opened by this level's prefix: a trailing
        // while/until modifier legalizes pending block exits.
        while self.block_exits.len() > exit_watermark {
            let became_loop = node.flags.contains(NodeFlags::BEGIN_MODIFIER)
                && matches!(node.kind, NodeKind::While { .. } | NodeKind::Until { .. });
            self.resolve_exit_candidate(self.block_exits.len() - 1, became_loop);
        }

        self.depth -= 1;
        node
    }

    /// Statement-only constructs accept only modifier infixes afterwards.
    fn is_statement_only(kind: &NodeKind) -> bool {
        matches!(
            kind,
            NodeKind::Alias { .. }
                | NodeKind::Undef { .. }
                | NodeKind::MultiWrite { .. }
                | NodeKind::PreExecution { .. }
                | NodeKind::PostExecution { .. }
        )
    }

    fn is_modifier_operator(kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::KeywordIf
                | TokenKind::KeywordUnless
                | TokenKind::KeywordWhile
                | TokenKind::KeywordUntil
                | TokenKind::KeywordRescue
        )
    }

    /// Expressions that may open a multiple-assignment target list.
    fn is_write_target_candidate(kind: &NodeKind) -> bool {
        matches!(
            kind,
            NodeKind::LocalVariableRead { .. }
                | NodeKind::InstanceVariableRead { .. }
                | NodeKind::ClassVariableRead { .. }
                | NodeKind::GlobalVariableRead { .. }
                | NodeKind::ConstantRead { .. }
                | NodeKind::ConstantPath { .. }
                | NodeKind::Splat { .. }
        ) || matches!(kind, NodeKind::Call { arguments, block, .. }
            if arguments.is_empty() && block.is_none())
    }

    /// One infix application.
    fn parse_expression_infix(
        &mut self,
        left: Node,
        bp: crate::precedence::BindingPower,
        accepts_command: bool,
    ) -> Node {
        use TokenKind::*;
        match self.current.kind {
            // Arithmetic, comparison, bitwise, shift: method calls
            Plus | Minus | Star | Slash | Percent | StarStar | LessLess | GreaterGreater
            | Amp | Pipe | Caret | EqualEqual | EqualEqualEqual | BangEqual | Less
            | LessEqual | Greater | GreaterEqual | LessEqualGreater | BangTilde => {
                let op = self.advance();
                let right =
                    self.parse_expression(bp.right, false, DiagnosticId::ExpressionExpected);
                self.binary_call(left, op, right)
            }
            EqualTilde => {
                let op = self.advance();
                let right =
                    self.parse_expression(bp.right, false, DiagnosticId::ExpressionExpected);
                self.parse_match_operator(left, op, right)
            }
            AmpAmp | KeywordAnd => {
                self.advance();
                let right =
                    self.parse_expression(bp.right, accepts_command, DiagnosticId::ExpressionExpected);
                let span = left.location.join(right.location);
                Node::new(NodeKind::And { left: Box::new(left), right: Box::new(right) }, span)
            }
            PipePipe | KeywordOr => {
                self.advance();
                let right =
                    self.parse_expression(bp.right, accepts_command, DiagnosticId::ExpressionExpected);
                let span = left.location.join(right.location);
                Node::new(NodeKind::Or { left: Box::new(left), right: Box::new(right) }, span)
            }
            KeywordIf => {
                self.advance();
                let predicate =
                    self.parse_expression(bp.right, true, DiagnosticId::ExpressionExpected);
                let span = left.location.join(predicate.location);
                let statements = Self::wrap_statements(left);
                Node::new(
                    NodeKind::If {
                        predicate: Box::new(predicate),
                        statements: Box::new(statements),
                        subsequent: None,
                    },
                    span,
                )
            }
            KeywordUnless => {
                self.advance();
                let predicate =
                    self.parse_expression(bp.right, true, DiagnosticId::ExpressionExpected);
                let span = left.location.join(predicate.location);
                let statements = Self::wrap_statements(left);
                Node::new(
                    NodeKind::Unless {
                        predicate: Box::new(predicate),
                        statements: Box::new(statements),
                        else_clause: None,
                    },
                    span,
                )
            }
            KeywordWhile | KeywordUntil => {
                let until = self.current.kind == KeywordUntil;
                self.advance();
                self.lexer.do_loop_push(true);
                let predicate =
                    self.parse_expression(bp.right, true, DiagnosticId::ExpressionExpected);
                self.lexer.do_loop_pop();
                let span = left.location.join(predicate.location);
                let begin_body = matches!(left.kind, NodeKind::Begin { .. });
                let statements = Self::wrap_statements(left);
                let kind = if until {
                    NodeKind::Until {
                        predicate: Box::new(predicate),
                        statements: Box::new(statements),
                    }
                } else {
                    NodeKind::While {
                        predicate: Box::new(predicate),
                        statements: Box::new(statements),
                    }
                };
                let flags = if begin_body {
                    NodeFlags::BEGIN_MODIFIER
                } else {
                    NodeFlags::empty()
                };
                Node::with_flags(kind, span, flags)
            }
            KeywordRescue => {
                self.advance();
                let rescue_expression =
                    self.parse_expression(bp.right, false, DiagnosticId::ExpressionExpected);
                let span = left.location.join(rescue_expression.location);
                Node::new(
                    NodeKind::RescueModifier {
                        expression: Box::new(left),
                        rescue_expression: Box::new(rescue_expression),
                    },
                    span,
                )
            }
            KeywordIn => {
                self.advance();
                let pattern = self.parse_pattern_root();
                let span = left.location.join(pattern.location);
                Node::new(
                    NodeKind::MatchPredicate { value: Box::new(left), pattern: Box::new(pattern) },
                    span,
                )
            }
            EqualGreater => {
                self.advance();
                let pattern = self.parse_pattern_root();
                let span = left.location.join(pattern.location);
                Node::new(
                    NodeKind::MatchRequired { value: Box::new(left), pattern: Box::new(pattern) },
                    span,
                )
            }
            Question => self.parse_ternary(left),
            DotDot | DotDotDot => {
                let op = self.advance();
                let exclusive = op.kind == DotDotDot;
                let right = if self.token_begins_expression() {
                    Some(Box::new(self.parse_expression(
                        bp.right,
                        false,
                        DiagnosticId::ExpressionExpected,
                    )))
                } else {
                    None
                };
                let end = right.as_ref().map_or(op.end, |r| r.location.end);
                let span = ByteSpan::new(left.location.start, end);
                let mut flags =
                    if exclusive { NodeFlags::EXCLUDE_END } else { NodeFlags::empty() };
                if Self::is_static_range_end(Some(&left))
                    && Self::is_static_range_end(right.as_deref())
                {
                    flags |= NodeFlags::STATIC_LITERAL;
                }
                Node::with_flags(
                    NodeKind::Range { left: Some(Box::new(left)), right },
                    span,
                    flags,
                )
            }
            Equal => {
                self.advance();
                let target = self.parse_target(left);
                self.parse_assignment_tail(target)
            }
            PlusEqual | MinusEqual | StarEqual | SlashEqual | PercentEqual | StarStarEqual
            | LessLessEqual | GreaterGreaterEqual | AmpEqual | PipeEqual | CaretEqual
            | AmpAmpEqual | PipePipeEqual => {
                let op = self.advance();
                let target = self.parse_target(left);
                self.parse_operator_assignment_tail(target, op)
            }
            Dot | AmpDot | ColonColon => self.parse_call_chain(left, accepts_command),
            BracketLeft => self.parse_index_call(left),
            _ => {
                // Table and dispatch disagree; consume to guarantee progress.
                self.error(self.current_span(), DiagnosticId::UnexpectedToken);
                self.advance();
                left
            }
        }
    }

    /// Builds `left op right` as a method call on `left`.
    fn binary_call(&mut self, left: Node, op: Token, right: Node) -> Node {
        let span = left.location.join(right.location);
        let name = self.token_string(op);
        Node::new(
            NodeKind::Call {
                receiver: Some(Box::new(left)),
                name,
                arguments: vec![right],
                block: None,
            },
            span,
        )
    }

    /// `left =~ right`; a static regexp on the left introduces its named
    /// captures as locals through a match-write node.
    fn parse_match_operator(&mut self, left: Node, op: Token, right: Node) -> Node {
        let captures = if let NodeKind::Regexp { source, .. } = &left.kind {
            self.named_captures_of(source.clone().into_bytes(), left.location)
        } else {
            Vec::new()
        };
        let call = self.binary_call(left, op, right);
        if captures.is_empty() {
            return call;
        }
        let span = call.location;
        let mut targets = Vec::with_capacity(captures.len());
        for name in captures {
            let id = self.intern_owned(name.clone().into_bytes());
            self.scopes.declare(id, span);
            targets.push(Node::new(NodeKind::LocalVariableTarget { name }, span));
        }
        Node::new(NodeKind::MatchWrite { call: Box::new(call), targets }, span)
    }

    /// Runs the external regexp parser over a literal's source, returning
    /// capture names that are valid local identifiers.
    fn named_captures_of(&mut self, source: Vec<u8>, location: ByteSpan) -> Vec<String> {
        let mut captures = Vec::new();
        let mut errors = Vec::new();
        self.regexp_parser.parse(
            &source,
            &mut |name| {
                if is_local_name(name) {
                    captures.push(String::from_utf8_lossy(name).into_owned());
                }
            },
            &mut |message| errors.push(message.to_string()),
        );
        for message in errors {
            self.error_with(location, DiagnosticId::UnexpectedToken, &message);
        }
        captures
    }

    /// `cond ? then : else`, sharing the if-node representation.
    fn parse_ternary(&mut self, predicate: Node) -> Node {
        self.advance(); // '?'
        let then_expression =
            self.parse_expression(level::TERNARY, false, DiagnosticId::ExpressionExpected);
        self.expect(TokenKind::Colon, DiagnosticId::UnexpectedToken);
        let else_expression =
            self.parse_expression(level::TERNARY, false, DiagnosticId::ExpressionExpected);
        let span = predicate.location.join(else_expression.location);
        let else_span = else_expression.location;
        Node::new(
            NodeKind::If {
                predicate: Box::new(predicate),
                statements: Box::new(Self::wrap_statements(then_expression)),
                subsequent: Some(Box::new(Node::new(
                    NodeKind::Else {
                        statements: Box::new(Self::wrap_statements(else_expression)),
                    },
                    else_span,
                ))),
            },
            span,
        )
    }

    /// Wraps a single expression as a statement list (modifier forms).
    fn wrap_statements(node: Node) -> Node {
        let span = node.location;
        Node::new(NodeKind::Statements { body: vec![node] }, span)
    }

    /// Integer literals, nil, and omitted ends keep ranges static.
    fn is_static_range_end(node: Option<&Node>) -> bool {
        match node {
            None => true,
            Some(node) => {
                matches!(node.kind, NodeKind::Integer { .. } | NodeKind::Nil)
            }
        }
    }
}

/// True for byte strings that could name a local variable.
fn is_local_name(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    let first = bytes[0];
    (first == b'_' || first.is_ascii_lowercase())
        && bytes[1..].iter().all(|&b| b == b'_' || b.is_ascii_alphanumeric())
}
