impl<'src> Parser<'src> {
    /// Parses a statement list in the current (already pushed) context.
    fn parse_statements(&mut self) -> Node {
        let context = self.contexts.current().unwrap_or(Context::Main);
        self.skip_newlines();
        let start = self.current.start;
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            let kind = self.current.kind;
            if kind == TokenKind::Eof || context.terminated_by(kind) {
                break;
            }
            let statement =
                self.parse_expression(level::STATEMENT, true, DiagnosticId::ExpressionExpected);
            let made_progress = !statement.is_missing() || self.previous.end > start;
            body.push(statement);

            if self.accept_terminator() {
                continue;
            }
            let kind = self.current.kind;
            if kind == TokenKind::Eof || context.terminated_by(kind) {
                break;
            }
            // Unexpected token after a statement: if it closes an enclosing
            // construct, unwind to it; otherwise skip it and resync.
            self.error(self.current_span(), DiagnosticId::UnexpectedToken);
            if self.token_closes_enclosing(kind) {
                break;
            }
            self.advance();
            if !made_progress && self.current.kind == TokenKind::Eof {
                break;
            }
        }
        let end = self.previous.end.max(start);
        Node::new(NodeKind::Statements { body }, ByteSpan::new(start, end))
    }

    /// Statement list for a pushed context, as an optional body (None when
    /// empty), wrapping context push/pop.
    fn parse_body(&mut self, context: Context) -> Node {
        self.contexts.push(context);
        let statements = self.parse_statements();
        self.contexts.pop();
        statements
    }

    // ===== conditionals =====

    /// `if`/`elsif`/`unless`; the keyword token is current.
    fn parse_conditional(&mut self) -> Node {
        let keyword = self.advance();
        let unless = keyword.kind == TokenKind::KeywordUnless;
        let predicate =
            self.parse_expression(level::PREDICATE, true, DiagnosticId::ExpressionExpected);
        let separated = self.accept_terminator();
        if !self.accept(TokenKind::KeywordThen) && !separated {
            self.error(self.current_span(), DiagnosticId::ThenExpected);
        }

        let statements =
            self.parse_body(if unless { Context::Unless } else { Context::If });

        let subsequent = match self.current.kind {
            TokenKind::KeywordElsif if !unless => Some(Box::new(self.parse_elsif())),
            TokenKind::KeywordElse => Some(Box::new(self.parse_else_clause())),
            _ => None,
        };
        let end_token = self.expect_end(keyword);
        let span = ByteSpan::new(keyword.start, end_token.end.max(keyword.end));
        if unless {
            Node::new(
                NodeKind::Unless {
                    predicate: Box::new(predicate),
                    statements: Box::new(statements),
                    else_clause: subsequent,
                },
                span,
            )
        } else {
            Node::new(
                NodeKind::If {
                    predicate: Box::new(predicate),
                    statements: Box::new(statements),
                    subsequent,
                },
                span,
            )
        }
    }

    /// An `elsif` chain entry (does not consume the closing `end`).
    fn parse_elsif(&mut self) -> Node {
        let keyword = self.advance();
        let predicate =
            self.parse_expression(level::PREDICATE, true, DiagnosticId::ExpressionExpected);
        let separated = self.accept_terminator();
        if !self.accept(TokenKind::KeywordThen) && !separated {
            self.error(self.current_span(), DiagnosticId::ThenExpected);
        }
        let statements = self.parse_body(Context::If);
        let subsequent = match self.current.kind {
            TokenKind::KeywordElsif => Some(Box::new(self.parse_elsif())),
            TokenKind::KeywordElse => Some(Box::new(self.parse_else_clause())),
            _ => None,
        };
        let span = ByteSpan::new(keyword.start, self.previous.end);
        Node::new(
            NodeKind::If {
                predicate: Box::new(predicate),
                statements: Box::new(statements),
                subsequent,
            },
            span,
        )
    }

    fn parse_else_clause(&mut self) -> Node {
        let keyword = self.advance();
        let statements = self.parse_body(Context::Else);
        let span = ByteSpan::new(keyword.start, statements.location.end.max(keyword.end));
        Node::new(NodeKind::Else { statements: Box::new(statements) }, span)
    }

    // ===== loops =====

    /// `while` / `until`; the keyword token is current.
    fn parse_loop(&mut self) -> Node {
        let keyword = self.advance();
        let until = keyword.kind == TokenKind::KeywordUntil;
        self.lexer.do_loop_push(true);
        let predicate =
            self.parse_expression(level::PREDICATE, true, DiagnosticId::ExpressionExpected);
        self.lexer.do_loop_pop();
        self.check_predicate_regexp(&predicate);
        let separated = self.accept_terminator();
        if !self.accept(TokenKind::KeywordDoLoop) && !separated {
            self.error(self.current_span(), DiagnosticId::LoopTermExpected);
        }

        self.block_exits.push(ExitFrame::Loop);
        let statements = self.parse_body(if until { Context::Until } else { Context::While });
        self.block_exits.pop();
        let end_token = self.expect_end(keyword);
        let span = ByteSpan::new(keyword.start, end_token.end.max(keyword.end));
        if until {
            Node::new(
                NodeKind::Until {
                    predicate: Box::new(predicate),
                    statements: Box::new(statements),
                },
                span,
            )
        } else {
            Node::new(
                NodeKind::While {
                    predicate: Box::new(predicate),
                    statements: Box::new(statements),
                },
                span,
            )
        }
    }

    /// A bare regexp literal as a loop/conditional predicate matches against
    /// `$_`, which is nearly always an accident.
    fn check_predicate_regexp(&mut self, predicate: &Node) {
        if matches!(predicate.kind, NodeKind::Regexp { .. })
            && !self.command_line.has(CommandLine::E)
        {
            self.warning(predicate.location, DiagnosticId::RegexpInConditionWarning);
        }
    }

    /// `for index in collection … end`
    fn parse_for(&mut self) -> Node {
        let keyword = self.advance();
        let mut targets = Vec::new();
        loop {
            if self.current.kind == TokenKind::UStar {
                let star = self.advance();
                let expression = if self.token_begins_expression() {
                    let value = self.parse_expression(
                        level::TERNARY,
                        false,
                        DiagnosticId::ExpressionExpected,
                    );
                    Some(Box::new(self.parse_target(value)))
                } else {
                    None
                };
                let end = expression.as_ref().map_or(star.end, |e| e.location.end);
                targets.push(Node::new(
                    NodeKind::Splat { expression },
                    ByteSpan::new(star.start, end),
                ));
            } else {
                let value = self.parse_expression(
                    level::ASSIGNMENT,
                    false,
                    DiagnosticId::ExpressionExpected,
                );
                let target = self.parse_target(value);
                targets.push(target);
            }
            if !self.accept(TokenKind::Comma) {
                break;
            }
        }
        let index = if targets.len() == 1 {
            // Single target; the vec was just checked.
            targets.pop().unwrap_or_else(|| Node::missing(keyword.end))
        } else {
            let span = targets
                .first()
                .map(|n| n.location)
                .unwrap_or_else(|| ByteSpan::empty(keyword.end));
            let span = targets.iter().fold(span, |acc, n| acc.join(n.location));
            Node::new(NodeKind::MultiTarget { targets }, span)
        };

        self.expect(TokenKind::KeywordIn, DiagnosticId::UnexpectedToken);
        self.lexer.do_loop_push(true);
        let collection =
            self.parse_expression(level::PREDICATE, true, DiagnosticId::ExpressionExpected);
        self.lexer.do_loop_pop();
        let separated = self.accept_terminator();
        if !self.accept(TokenKind::KeywordDoLoop) && !separated {
            self.error(self.current_span(), DiagnosticId::LoopTermExpected);
        }
        self.block_exits.push(ExitFrame::Loop);
        let statements = self.parse_body(Context::For);
        self.block_exits.pop();
        let end_token = self.expect_end(keyword);
        Node::new(
            NodeKind::For {
                index: Box::new(index),
                collection: Box::new(collection),
                statements: Box::new(statements),
            },
            ByteSpan::new(keyword.start, end_token.end.max(keyword.end)),
        )
    }

    // ===== case =====

    fn parse_case(&mut self) -> Node {
        let keyword = self.advance();
        let predicate = if matches!(
            self.current.kind,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::KeywordWhen | TokenKind::KeywordIn
        ) {
            None
        } else {
            Some(self.parse_expression(
                level::PREDICATE,
                true,
                DiagnosticId::CaseExpressionExpected,
            ))
        };
        self.accept_terminator();

        match self.current.kind {
            TokenKind::KeywordWhen => self.parse_case_when(keyword, predicate),
            TokenKind::KeywordIn => self.parse_case_in(keyword, predicate),
            _ => {
                self.error(self.current_span(), DiagnosticId::CaseMissingClauses);
                let end_token = self.expect_end(keyword);
                Node::new(
                    NodeKind::Case {
                        predicate: predicate.map(Box::new),
                        conditions: Vec::new(),
                        else_clause: None,
                    },
                    ByteSpan::new(keyword.start, end_token.end.max(keyword.end)),
                )
            }
        }
    }

    fn parse_case_when(&mut self, keyword: Token, predicate: Option<Node>) -> Node {
        let mut conditions = Vec::new();
        let mut seen_literals: Vec<String> = Vec::new();
        while self.current.kind == TokenKind::KeywordWhen {
            let when_token = self.advance();
            let mut when_conditions = Vec::new();
            loop {
                if self.current.kind == TokenKind::UStar {
                    let star = self.advance();
                    let value = self.parse_expression(
                        level::COMMAND_ARGUMENT,
                        false,
                        DiagnosticId::ExpressionExpected,
                    );
                    let span = ByteSpan::new(star.start, value.location.end);
                    when_conditions
                        .push(Node::new(NodeKind::Splat { expression: Some(Box::new(value)) }, span));
                } else {
                    let value = self.parse_expression(
                        level::COMMAND_ARGUMENT,
                        false,
                        DiagnosticId::ExpressionExpected,
                    );
                    if value.flags.contains(NodeFlags::STATIC_LITERAL) {
                        let key = value.to_sexp();
                        if seen_literals.contains(&key) {
                            self.warning(value.location, DiagnosticId::WhenClauseDuplicate);
                        } else {
                            seen_literals.push(key);
                        }
                    }
                    when_conditions.push(value);
                }
                if !self.accept(TokenKind::Comma) {
                    break;
                }
            }
            let separated = self.accept_terminator();
            if !self.accept(TokenKind::KeywordThen) && !separated {
                self.error(self.current_span(), DiagnosticId::ThenExpected);
            }
            let statements = self.parse_body(Context::CaseWhen);
            let span = ByteSpan::new(when_token.start, statements.location.end.max(when_token.end));
            conditions.push(Node::new(
                NodeKind::When { conditions: when_conditions, statements: Box::new(statements) },
                span,
            ));
        }
        let else_clause = if self.current.kind == TokenKind::KeywordElse {
            Some(Box::new(self.parse_else_clause()))
        } else {
            None
        };
        let end_token = self.expect_end(keyword);
        Node::new(
            NodeKind::Case {
                predicate: predicate.map(Box::new),
                conditions,
                else_clause,
            },
            ByteSpan::new(keyword.start, end_token.end.max(keyword.end)),
        )
    }

    // ===== begin / rescue / ensure =====

    fn parse_begin(&mut self) -> Node {
        let keyword = self.advance();
        // `break` inside may yet be legalized by a trailing while/until
        // modifier; the candidate frame is resolved by parse_expression.
        self.push_exit_candidate();
        self.accept_terminator();
        let statements = self.parse_body(Context::Begin);
        self.parse_begin_tail(keyword, Some(statements))
    }

    /// Shared rescue/else/ensure/end tail for `begin` and `def` bodies.
    /// `statements` is the main body (already parsed).
    fn parse_begin_tail(&mut self, keyword: Token, statements: Option<Node>) -> Node {
        let mut rescue_clauses = Vec::new();
        while self.current.kind == TokenKind::KeywordRescue {
            rescue_clauses.push(self.parse_rescue_clause());
        }
        let else_clause = if self.current.kind == TokenKind::KeywordElse {
            let clause = self.parse_else_clause();
            if rescue_clauses.is_empty() {
                self.error(clause.location, DiagnosticId::UnexpectedToken);
            }
            Some(Box::new(clause))
        } else {
            None
        };
        let ensure_clause = if self.current.kind == TokenKind::KeywordEnsure {
            let ensure_token = self.advance();
            let body = self.parse_body(Context::BeginEnsure);
            let span = ByteSpan::new(ensure_token.start, body.location.end.max(ensure_token.end));
            Some(Box::new(Node::new(NodeKind::Ensure { statements: Box::new(body) }, span)))
        } else {
            None
        };
        let end_token = self.expect_end(keyword);
        Node::new(
            NodeKind::Begin {
                statements: statements.map(Box::new),
                rescue_clauses,
                else_clause,
                ensure_clause,
            },
            ByteSpan::new(keyword.start, end_token.end.max(keyword.end)),
        )
    }

    fn parse_rescue_clause(&mut self) -> Node {
        let keyword = self.advance();
        let mut exceptions = Vec::new();
        if self.token_begins_expression()
            && !matches!(self.current.kind, TokenKind::EqualGreater)
        {
            loop {
                let exception = self.parse_expression(
                    level::COMMAND_ARGUMENT,
                    false,
                    DiagnosticId::ExpressionExpected,
                );
                exceptions.push(exception);
                if !self.accept(TokenKind::Comma) {
                    break;
                }
            }
        }
        let reference = if self.accept(TokenKind::EqualGreater) {
            let value =
                self.parse_expression(level::TERNARY, false, DiagnosticId::ExpressionExpected);
            Some(Box::new(self.parse_target(value)))
        } else {
            None
        };
        let separated = self.accept_terminator();
        if !self.accept(TokenKind::KeywordThen) && !separated {
            self.error(self.current_span(), DiagnosticId::ThenExpected);
        }
        let statements = self.parse_body(Context::BeginRescue);
        let span = ByteSpan::new(keyword.start, statements.location.end.max(keyword.end));
        Node::new(
            NodeKind::Rescue { exceptions, reference, statements: Box::new(statements) },
            span,
        )
    }

    // ===== jumps and execution blocks =====

    /// `return` / `break` / `next` with optional bare arguments.
    fn parse_jump(&mut self) -> Node {
        let keyword = self.advance();
        let mut arguments = Vec::new();
        if self.token_begins_expression() {
            loop {
                if self.current.kind == TokenKind::UStar {
                    let star = self.advance();
                    let value = self.parse_expression(
                        level::COMMAND_ARGUMENT,
                        false,
                        DiagnosticId::ExpressionExpected,
                    );
                    let span = ByteSpan::new(star.start, value.location.end);
                    arguments.push(Node::new(
                        NodeKind::Splat { expression: Some(Box::new(value)) },
                        span,
                    ));
                } else {
                    arguments.push(self.parse_expression(
                        level::COMMAND_ARGUMENT,
                        true,
                        DiagnosticId::ExpressionExpected,
                    ));
                }
                if !self.accept(TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = arguments.last().map_or(keyword.end, |a| a.location.end);
        let span = ByteSpan::new(keyword.start, end);
        match keyword.kind {
            TokenKind::KeywordReturn => {
                if self.contexts.in_class_body() {
                    self.error(span, DiagnosticId::ReturnOutsideMethod);
                }
                Node::new(NodeKind::Return { arguments }, span)
            }
            TokenKind::KeywordBreak => {
                self.register_block_exit(span, DiagnosticId::BreakOutsideLoop);
                Node::new(NodeKind::Break { arguments }, span)
            }
            _ => {
                self.register_block_exit(span, DiagnosticId::NextOutsideLoop);
                Node::new(NodeKind::Next { arguments }, span)
            }
        }
    }

    fn parse_yield(&mut self) -> Node {
        let keyword = self.advance();
        if !self.contexts.in_method_body() {
            self.error(keyword.span(), DiagnosticId::YieldOutsideMethod);
        }
        let mut arguments = Vec::new();
        if self.accept(TokenKind::ParenLeft) {
            if self.current.kind != TokenKind::ParenRight {
                arguments = self.parse_argument_list(TokenKind::ParenRight);
            }
            self.expect(TokenKind::ParenRight, DiagnosticId::ParenCloseExpected);
        } else if self.token_begins_expression() {
            loop {
                arguments.push(self.parse_expression(
                    level::COMMAND_ARGUMENT,
                    false,
                    DiagnosticId::ExpressionExpected,
                ));
                if !self.accept(TokenKind::Comma) {
                    break;
                }
            }
        }
        let span = ByteSpan::new(keyword.start, self.previous.end.max(keyword.end));
        Node::new(NodeKind::Yield { arguments }, span)
    }

    /// `BEGIN { … }` / `END { … }`
    fn parse_execution_block(&mut self) -> Node {
        let keyword = self.advance();
        let pre = keyword.kind == TokenKind::KeywordBeginUpcase;
        if pre && self.contexts.current() != Some(Context::Main) {
            self.error(keyword.span(), DiagnosticId::BeginUpcaseNotAtTopLevel);
        }
        self.expect(TokenKind::BraceLeft, DiagnosticId::UnexpectedToken);
        let statements = self.parse_body(Context::ExecutionBlock);
        let close = self.expect(TokenKind::BraceRight, DiagnosticId::BraceCloseExpected);
        let span = ByteSpan::new(keyword.start, close.end.max(keyword.end));
        if pre {
            Node::new(NodeKind::PreExecution { statements: Box::new(statements) }, span)
        } else {
            Node::new(NodeKind::PostExecution { statements: Box::new(statements) }, span)
        }
    }
}
