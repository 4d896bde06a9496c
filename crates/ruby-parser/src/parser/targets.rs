impl<'src> Parser<'src> {
    /// Converts a read/call node into its write-target analog, declaring
    /// locals as needed. Invalid targets diagnose and come back as missing.
    fn parse_target(&mut self, node: Node) -> Node {
        let span = node.location;
        match node.kind {
            NodeKind::LocalVariableRead { name } => {
                let id = self.intern_owned(name.clone().into_bytes());
                self.scopes.declare(id, span);
                Node::new(NodeKind::LocalVariableTarget { name }, span)
            }
            NodeKind::Call { receiver: None, name, ref arguments, ref block }
                if arguments.is_empty()
                    && block.is_none()
                    && node.flags.contains(NodeFlags::VARIABLE_CALL) =>
            {
                // A bare name on the LHS declares a local
                let id = self.intern_owned(name.clone().into_bytes());
                self.scopes.declare(id, span);
                Node::new(NodeKind::LocalVariableTarget { name }, span)
            }
            NodeKind::InstanceVariableRead { name } => {
                Node::new(NodeKind::InstanceVariableTarget { name }, span)
            }
            NodeKind::ClassVariableRead { name } => {
                Node::new(NodeKind::ClassVariableTarget { name }, span)
            }
            NodeKind::GlobalVariableRead { name } => {
                Node::new(NodeKind::GlobalVariableTarget { name }, span)
            }
            NodeKind::ConstantRead { name } => {
                if self.contexts.in_method_body() {
                    self.error(span, DiagnosticId::ConstantAssignmentInMethod);
                }
                Node::new(NodeKind::ConstantTarget { name }, span)
            }
            NodeKind::ConstantPath { .. } => {
                if self.contexts.in_method_body() {
                    self.error(span, DiagnosticId::ConstantAssignmentInMethod);
                }
                Node::new(NodeKind::ConstantPathTarget { target: Box::new(node) }, span)
            }
            NodeKind::Call { receiver: Some(receiver), name, arguments, block }
                if name == "[]" =>
            {
                self.check_index_target_arguments(&arguments, span);
                let _ = block;
                Node::new(NodeKind::IndexTarget { receiver, arguments }, span)
            }
            NodeKind::Call { receiver: Some(receiver), name, arguments, block }
                if arguments.is_empty() && block.is_none() =>
            {
                let mut target =
                    Node::new(NodeKind::CallTarget { receiver, name }, span);
                target.flags = node.flags;
                target
            }
            NodeKind::Splat { expression } => {
                let expression = expression.map(|inner| Box::new(self.parse_target(*inner)));
                Node::new(NodeKind::Splat { expression }, span)
            }
            NodeKind::MultiTarget { .. } => node,
            NodeKind::BackReferenceRead { .. } | NodeKind::NumberedReferenceRead { .. } => {
                self.error(span, DiagnosticId::WriteTargetUnreadable);
                Node::missing(span.start)
            }
            NodeKind::Missing => node,
            _ => {
                self.error(span, DiagnosticId::WriteTargetInvalid);
                Node::missing(span.start)
            }
        }
    }

    /// Ruby 3.4 forbids keyword and block arguments on an index write.
    fn check_index_target_arguments(&mut self, arguments: &[Node], span: ByteSpan) {
        if self.version == SyntaxVersion::CRuby3_3 {
            return;
        }
        for argument in arguments {
            match argument.kind {
                NodeKind::BlockArgument { .. } => {
                    self.error(span, DiagnosticId::IndexWriteBlockGiven);
                }
                NodeKind::KeywordHash { .. } => {
                    self.error(span, DiagnosticId::IndexWriteKeywordsGiven);
                }
                _ => {}
            }
        }
    }

    /// The value side of `target = …`, including multi-value RHS and the
    /// assignment-scoped `rescue` modifier.
    fn parse_assignment_tail(&mut self, target: Node) -> Node {
        let (value, implicit_array) = self.parse_assignment_value();
        self.build_write(target, value, implicit_array)
    }

    fn parse_assignment_value(&mut self) -> (Node, bool) {
        let first = if self.current.kind == TokenKind::UStar {
            let star = self.advance();
            let value = self.parse_expression(
                level::COMMAND_ARGUMENT,
                true,
                DiagnosticId::ExpressionExpected,
            );
            let span = ByteSpan::new(star.start, value.location.end);
            Node::new(NodeKind::Splat { expression: Some(Box::new(value)) }, span)
        } else {
            self.parse_expression(level::ASSIGNMENT, true, DiagnosticId::ExpressionExpected)
        };

        if self.current.kind != TokenKind::Comma {
            // A single value permits the rescue-modifier extension
            if self.current.kind == TokenKind::KeywordRescue {
                self.advance();
                let rescue_expression = self.parse_expression(
                    level::MODIFIER_RESCUE + 1,
                    false,
                    DiagnosticId::ExpressionExpected,
                );
                let span = first.location.join(rescue_expression.location);
                return (
                    Node::new(
                        NodeKind::RescueModifier {
                            expression: Box::new(first),
                            rescue_expression: Box::new(rescue_expression),
                        },
                        span,
                    ),
                    false,
                );
            }
            return (first, false);
        }

        // Comma-separated RHS becomes an implicit array
        let mut elements = vec![first];
        while self.accept(TokenKind::Comma) {
            if self.current.kind == TokenKind::UStar {
                let star = self.advance();
                let value = self.parse_expression(
                    level::COMMAND_ARGUMENT,
                    false,
                    DiagnosticId::ExpressionExpected,
                );
                let span = ByteSpan::new(star.start, value.location.end);
                elements
                    .push(Node::new(NodeKind::Splat { expression: Some(Box::new(value)) }, span));
            } else {
                elements.push(self.parse_expression(
                    level::COMMAND_ARGUMENT,
                    false,
                    DiagnosticId::ExpressionExpected,
                ));
            }
        }
        let span = elements
            .first()
            .map(|e| e.location)
            .unwrap_or_else(|| ByteSpan::empty(self.previous.end));
        let span = elements.iter().fold(span, |acc, e| acc.join(e.location));
        (Node::new(NodeKind::Array { elements }, span), true)
    }

    /// Builds the kind-specific write node for `target = value`.
    fn build_write(&mut self, target: Node, value: Node, implicit_array: bool) -> Node {
        let span = target.location.join(value.location);
        let target_location = target.location;
        let flags = if implicit_array { NodeFlags::IMPLICIT_ARRAY } else { NodeFlags::empty() };
        let value = Box::new(value);
        let kind = match target.kind {
            NodeKind::LocalVariableTarget { name } => {
                NodeKind::LocalVariableWrite { name, value }
            }
            NodeKind::InstanceVariableTarget { name } => {
                NodeKind::InstanceVariableWrite { name, value }
            }
            NodeKind::ClassVariableTarget { name } => {
                NodeKind::ClassVariableWrite { name, value }
            }
            NodeKind::GlobalVariableTarget { name } => {
                NodeKind::GlobalVariableWrite { name, value }
            }
            NodeKind::ConstantTarget { name } => NodeKind::ConstantWrite { name, value },
            NodeKind::ConstantPathTarget { target } => {
                NodeKind::ConstantPathWrite { target, value }
            }
            NodeKind::CallTarget { receiver, name } => {
                // Attribute write: the method name gains a trailing `=`
                NodeKind::Call {
                    receiver: Some(receiver),
                    name: format!("{name}="),
                    arguments: vec![*value],
                    block: None,
                }
            }
            NodeKind::IndexTarget { receiver, mut arguments } => {
                arguments.push(*value);
                NodeKind::Call {
                    receiver: Some(receiver),
                    name: "[]=".into(),
                    arguments,
                    block: None,
                }
            }
            NodeKind::MultiTarget { targets } => NodeKind::MultiWrite { targets, value },
            NodeKind::Splat { expression } => {
                // `*a = list` is a one-target multiple assignment
                let splat =
                    Node::new(NodeKind::Splat { expression }, target_location);
                NodeKind::MultiWrite { targets: vec![splat], value }
            }
            NodeKind::Missing => NodeKind::Missing,
            other => {
                // parse_target already diagnosed
                other
            }
        };
        Node::with_flags(kind, span, flags)
    }

    /// `target op= value` family.
    fn parse_operator_assignment_tail(&mut self, target: Node, op: Token) -> Node {
        if let NodeKind::IndexTarget { ref arguments, .. } = target.kind {
            let location = target.location;
            let arguments = arguments.clone();
            self.check_index_target_arguments(&arguments, location);
        }
        let (value, _) = self.parse_assignment_value();
        let span = target.location.join(value.location);
        let kind = match op.kind {
            TokenKind::PipePipeEqual => NodeKind::OrWrite {
                target: Box::new(target),
                value: Box::new(value),
            },
            TokenKind::AmpAmpEqual => NodeKind::AndWrite {
                target: Box::new(target),
                value: Box::new(value),
            },
            _ => {
                // Strip the trailing '=' from the operator text
                let text = self.token_text(op);
                let operator =
                    String::from_utf8_lossy(&text[..text.len() - 1]).into_owned();
                NodeKind::OperatorWrite {
                    target: Box::new(target),
                    operator,
                    value: Box::new(value),
                }
            }
        };
        Node::new(kind, span)
    }

    /// `a, b = …` once the first comma is seen after a target-able
    /// expression.
    fn parse_multi_write(&mut self, first: Node) -> Node {
        let start = first.location.start;
        let mut targets = vec![self.parse_target(first)];
        while self.accept(TokenKind::Comma) {
            match self.current.kind {
                TokenKind::UStar => {
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
                }
                TokenKind::ParenLeft => {
                    // Nested destructuring target
                    let open = self.advance();
                    let mut nested = Vec::new();
                    loop {
                        let value = self.parse_expression(
                            level::TERNARY,
                            false,
                            DiagnosticId::ExpressionExpected,
                        );
                        nested.push(self.parse_target(value));
                        if !self.accept(TokenKind::Comma) {
                            break;
                        }
                    }
                    let close =
                        self.expect(TokenKind::ParenRight, DiagnosticId::ParenCloseExpected);
                    targets.push(Node::new(
                        NodeKind::MultiTarget { targets: nested },
                        ByteSpan::new(open.start, close.end.max(open.end)),
                    ));
                }
                TokenKind::Equal => break, // trailing comma: `a, = list`
                _ => {
                    let value = self.parse_expression(
                        level::TERNARY,
                        false,
                        DiagnosticId::ExpressionExpected,
                    );
                    targets.push(self.parse_target(value));
                }
            }
        }

        self.expect(TokenKind::Equal, DiagnosticId::UnexpectedToken);
        let (value, implicit_array) = self.parse_assignment_value();
        let end = value.location.end;
        let flags =
            if implicit_array { NodeFlags::IMPLICIT_ARRAY } else { NodeFlags::empty() };
        Node::with_flags(
            NodeKind::MultiWrite { targets, value: Box::new(value) },
            ByteSpan::new(start, end),
            flags,
        )
    }
}
