//! Compact S-expression rendering for tests and tooling.

use crate::ast::{GuardKind, Node, NodeFlags, NodeKind};

impl Node {
    /// Render the tree as a compact S-expression.
    ///
    /// The format is stable for tests within this workspace, not a public
    /// serialization contract.
    pub fn to_sexp(&self) -> String {
        let mut out = String::new();
        self.write_sexp(&mut out);
        out
    }

    fn write_sexp(&self, out: &mut String) {
        use NodeKind::*;
        match &self.kind {
            Program { statements, .. } => wrap(out, "program", |out| child(out, statements)),
            Statements { body } => wrap(out, "statements", |out| children(out, body)),
            Parentheses { body } => wrap(out, "parens", |out| child_opt(out, body)),
            Missing => out.push_str("(missing)"),

            Integer { value } => {
                out.push_str(&format!("(integer {value})"));
            }
            Float { value } => {
                out.push_str(&format!("(float {value})"));
            }
            Rational { numeric } => wrap(out, "rational", |out| child(out, numeric)),
            Imaginary { numeric } => wrap(out, "imaginary", |out| child(out, numeric)),
            Nil => out.push_str("(nil)"),
            True => out.push_str("(true)"),
            False => out.push_str("(false)"),
            SelfExpression => out.push_str("(self)"),
            SourceFile { filepath } => out.push_str(&format!("(source_file {})", quoted(filepath))),
            SourceLine { line } => out.push_str(&format!("(source_line {line})")),
            SourceEncoding => out.push_str("(source_encoding)"),

            String { value } => out.push_str(&format!("(string {})", quoted(value))),
            InterpolatedString { parts } => {
                wrap(out, "interpolated_string", |out| children(out, parts))
            }
            XString { value } => out.push_str(&format!("(xstring {})", quoted(value))),
            InterpolatedXString { parts } => {
                wrap(out, "interpolated_xstring", |out| children(out, parts))
            }
            Symbol { name } => out.push_str(&format!("(symbol {name})")),
            InterpolatedSymbol { parts } => {
                wrap(out, "interpolated_symbol", |out| children(out, parts))
            }
            Regexp { source, .. } => out.push_str(&format!("(regexp {})", quoted(source))),
            InterpolatedRegexp { parts, .. } => {
                wrap(out, "interpolated_regexp", |out| children(out, parts))
            }
            MatchWrite { call, targets } => wrap(out, "match_write", |out| {
                child(out, call);
                children(out, targets);
            }),
            EmbeddedStatements { statements } => {
                wrap(out, "embedded_statements", |out| child_opt(out, statements))
            }
            EmbeddedVariable { variable } => {
                wrap(out, "embedded_variable", |out| child(out, variable))
            }
            Array { elements } => wrap(out, "array", |out| children(out, elements)),
            Hash { elements } => wrap(out, "hash", |out| children(out, elements)),
            KeywordHash { elements } => wrap(out, "keyword_hash", |out| children(out, elements)),
            Assoc { key, value } => wrap(out, "assoc", |out| {
                child(out, key);
                child_opt(out, value);
            }),
            AssocSplat { value } => wrap(out, "assoc_splat", |out| child_opt(out, value)),
            Range { left, right } => {
                let name = if self.flags.contains(NodeFlags::EXCLUDE_END) {
                    "erange"
                } else {
                    "irange"
                };
                wrap(out, name, |out| {
                    child_opt(out, left);
                    child_opt(out, right);
                });
            }

            LocalVariableRead { name } => out.push_str(&format!("(local_variable_read {name})")),
            LocalVariableWrite { name, value } => {
                wrap(out, &format!("local_variable_write {name}"), |out| child(out, value))
            }
            LocalVariableTarget { name } => {
                out.push_str(&format!("(local_variable_target {name})"))
            }
            InstanceVariableRead { name } => {
                out.push_str(&format!("(instance_variable_read {name})"))
            }
            InstanceVariableWrite { name, value } => {
                wrap(out, &format!("instance_variable_write {name}"), |out| child(out, value))
            }
            InstanceVariableTarget { name } => {
                out.push_str(&format!("(instance_variable_target {name})"))
            }
            ClassVariableRead { name } => out.push_str(&format!("(class_variable_read {name})")),
            ClassVariableWrite { name, value } => {
                wrap(out, &format!("class_variable_write {name}"), |out| child(out, value))
            }
            ClassVariableTarget { name } => {
                out.push_str(&format!("(class_variable_target {name})"))
            }
            GlobalVariableRead { name } => out.push_str(&format!("(global_variable_read {name})")),
            GlobalVariableWrite { name, value } => {
                wrap(out, &format!("global_variable_write {name}"), |out| child(out, value))
            }
            GlobalVariableTarget { name } => {
                out.push_str(&format!("(global_variable_target {name})"))
            }
            NumberedReferenceRead { number } => {
                out.push_str(&format!("(numbered_reference ${number})"))
            }
            BackReferenceRead { name } => out.push_str(&format!("(back_reference {name})")),
            ConstantRead { name } => out.push_str(&format!("(constant_read {name})")),
            ConstantWrite { name, value } => {
                wrap(out, &format!("constant_write {name}"), |out| child(out, value))
            }
            ConstantTarget { name } => out.push_str(&format!("(constant_target {name})")),
            ConstantPath { parent, name } => {
                wrap(out, &format!("constant_path {name}"), |out| child_opt(out, parent))
            }
            ConstantPathWrite { target, value } => wrap(out, "constant_path_write", |out| {
                child(out, target);
                child(out, value);
            }),
            ConstantPathTarget { target } => {
                wrap(out, "constant_path_target", |out| child(out, target))
            }

            OrWrite { target, value } => wrap(out, "or_write", |out| {
                child(out, target);
                child(out, value);
            }),
            AndWrite { target, value } => wrap(out, "and_write", |out| {
                child(out, target);
                child(out, value);
            }),
            OperatorWrite { target, operator, value } => {
                wrap(out, &format!("operator_write {operator}"), |out| {
                    child(out, target);
                    child(out, value);
                })
            }
            MultiWrite { targets, value } => wrap(out, "multi_write", |out| {
                out.push(' ');
                wrap(out, "targets", |out| children(out, targets));
                child(out, value);
            }),
            MultiTarget { targets } => wrap(out, "multi_target", |out| children(out, targets)),
            Splat { expression } => wrap(out, "splat", |out| child_opt(out, expression)),

            Call { receiver, name, arguments, block } => {
                wrap(out, &format!("call {name}"), |out| {
                    child_opt(out, receiver);
                    if !arguments.is_empty() {
                        out.push(' ');
                        wrap(out, "arguments", |out| children(out, arguments));
                    }
                    child_opt(out, block);
                })
            }
            CallTarget { receiver, name } => {
                wrap(out, &format!("call_target {name}"), |out| child(out, receiver))
            }
            IndexTarget { receiver, arguments } => wrap(out, "index_target", |out| {
                child(out, receiver);
                children(out, arguments);
            }),
            BlockArgument { expression } => {
                wrap(out, "block_argument", |out| child_opt(out, expression))
            }
            ForwardingArguments => out.push_str("(forwarding_arguments)"),
            Block { parameters, body, .. } => wrap(out, "block", |out| {
                child_opt(out, parameters);
                child_opt(out, body);
            }),
            Lambda { parameters, body, .. } => wrap(out, "lambda", |out| {
                child_opt(out, parameters);
                child_opt(out, body);
            }),
            BlockParameters { parameters, locals } => wrap(out, "block_parameters", |out| {
                child_opt(out, parameters);
                children(out, locals);
            }),
            Super { arguments, block } => wrap(out, "super", |out| {
                children(out, arguments);
                child_opt(out, block);
            }),
            ZSuper => out.push_str("(zsuper)"),
            Yield { arguments } => wrap(out, "yield", |out| children(out, arguments)),

            If { predicate, statements, subsequent } => wrap(out, "if", |out| {
                child(out, predicate);
                child(out, statements);
                child_opt(out, subsequent);
            }),
            Unless { predicate, statements, else_clause } => wrap(out, "unless", |out| {
                child(out, predicate);
                child(out, statements);
                child_opt(out, else_clause);
            }),
            Else { statements } => wrap(out, "else", |out| child(out, statements)),
            While { predicate, statements } => wrap(out, "while", |out| {
                child(out, predicate);
                child(out, statements);
            }),
            Until { predicate, statements } => wrap(out, "until", |out| {
                child(out, predicate);
                child(out, statements);
            }),
            For { index, collection, statements } => wrap(out, "for", |out| {
                child(out, index);
                child(out, collection);
                child(out, statements);
            }),
            Case { predicate, conditions, else_clause } => wrap(out, "case", |out| {
                child_opt(out, predicate);
                children(out, conditions);
                child_opt(out, else_clause);
            }),
            When { conditions, statements } => wrap(out, "when", |out| {
                children(out, conditions);
                child(out, statements);
            }),
            CaseMatch { predicate, conditions, else_clause } => wrap(out, "case_match", |out| {
                child(out, predicate);
                children(out, conditions);
                child_opt(out, else_clause);
            }),
            In { pattern, statements, guard } => wrap(out, "in", |out| {
                child(out, pattern);
                child(out, statements);
                if let Some((kind, predicate)) = guard {
                    let name = match kind {
                        GuardKind::If => "guard_if",
                        GuardKind::Unless => "guard_unless",
                    };
                    out.push(' ');
                    wrap(out, name, |out| child(out, predicate));
                }
            }),
            MatchRequired { value, pattern } => wrap(out, "match_required", |out| {
                child(out, value);
                child(out, pattern);
            }),
            MatchPredicate { value, pattern } => wrap(out, "match_predicate", |out| {
                child(out, value);
                child(out, pattern);
            }),
            Begin { statements, rescue_clauses, else_clause, ensure_clause } => {
                wrap(out, "begin", |out| {
                    child_opt(out, statements);
                    children(out, rescue_clauses);
                    child_opt(out, else_clause);
                    child_opt(out, ensure_clause);
                })
            }
            Rescue { exceptions, reference, statements } => wrap(out, "rescue", |out| {
                children(out, exceptions);
                child_opt(out, reference);
                child(out, statements);
            }),
            RescueModifier { expression, rescue_expression } => {
                wrap(out, "rescue_modifier", |out| {
                    child(out, expression);
                    child(out, rescue_expression);
                })
            }
            Ensure { statements } => wrap(out, "ensure", |out| child(out, statements)),
            Return { arguments } => wrap(out, "return", |out| children(out, arguments)),
            Break { arguments } => wrap(out, "break", |out| children(out, arguments)),
            Next { arguments } => wrap(out, "next", |out| children(out, arguments)),
            Redo => out.push_str("(redo)"),
            Retry => out.push_str("(retry)"),
            And { left, right } => wrap(out, "and", |out| {
                child(out, left);
                child(out, right);
            }),
            Or { left, right } => wrap(out, "or", |out| {
                child(out, left);
                child(out, right);
            }),
            Not { expression } => wrap(out, "not", |out| child(out, expression)),
            Defined { expression } => wrap(out, "defined", |out| child(out, expression)),

            Def { name, receiver, parameters, body, .. } => {
                wrap(out, &format!("def {name}"), |out| {
                    child_opt(out, receiver);
                    child_opt(out, parameters);
                    child_opt(out, body);
                })
            }
            Parameters { requireds, optionals, rest, posts, keywords, keyword_rest, block } => {
                wrap(out, "parameters", |out| {
                    children(out, requireds);
                    children(out, optionals);
                    child_opt(out, rest);
                    children(out, posts);
                    children(out, keywords);
                    child_opt(out, keyword_rest);
                    child_opt(out, block);
                })
            }
            RequiredParameter { name } => out.push_str(&format!("(required {name})")),
            OptionalParameter { name, value } => {
                wrap(out, &format!("optional {name}"), |out| child(out, value))
            }
            RestParameter { name } => {
                out.push_str(&format!("(rest {})", name.as_deref().unwrap_or("*")))
            }
            KeywordParameter { name, value } => {
                wrap(out, &format!("keyword {name}"), |out| child_opt(out, value))
            }
            KeywordRestParameter { name } => {
                out.push_str(&format!("(keyword_rest {})", name.as_deref().unwrap_or("**")))
            }
            NoKeywordsParameter => out.push_str("(no_keywords)"),
            BlockParameter { name } => {
                out.push_str(&format!("(block_parameter {})", name.as_deref().unwrap_or("&")))
            }
            ForwardingParameter => out.push_str("(forwarding_parameter)"),
            Class { constant_path, superclass, body, .. } => wrap(out, "class", |out| {
                child(out, constant_path);
                child_opt(out, superclass);
                child_opt(out, body);
            }),
            SingletonClass { expression, body, .. } => wrap(out, "singleton_class", |out| {
                child(out, expression);
                child_opt(out, body);
            }),
            Module { constant_path, body, .. } => wrap(out, "module", |out| {
                child(out, constant_path);
                child_opt(out, body);
            }),
            Alias { new_name, old_name } => wrap(out, "alias", |out| {
                child(out, new_name);
                child(out, old_name);
            }),
            Undef { names } => wrap(out, "undef", |out| children(out, names)),
            PreExecution { statements } => {
                wrap(out, "pre_execution", |out| child(out, statements))
            }
            PostExecution { statements } => {
                wrap(out, "post_execution", |out| child(out, statements))
            }

            ArrayPattern { constant, requireds, rest, posts } => {
                wrap(out, "array_pattern", |out| {
                    child_opt(out, constant);
                    children(out, requireds);
                    child_opt(out, rest);
                    children(out, posts);
                })
            }
            FindPattern { constant, left, requireds, right } => wrap(out, "find_pattern", |out| {
                child_opt(out, constant);
                child(out, left);
                children(out, requireds);
                child(out, right);
            }),
            HashPattern { constant, elements, rest } => wrap(out, "hash_pattern", |out| {
                child_opt(out, constant);
                children(out, elements);
                child_opt(out, rest);
            }),
            AlternationPattern { left, right } => wrap(out, "alternation_pattern", |out| {
                child(out, left);
                child(out, right);
            }),
            CapturePattern { value, target } => wrap(out, "capture_pattern", |out| {
                child(out, value);
                child(out, target);
            }),
            PinnedVariable { variable } => {
                wrap(out, "pinned_variable", |out| child(out, variable))
            }
            PinnedExpression { expression } => {
                wrap(out, "pinned_expression", |out| child(out, expression))
            }
        }
    }
}

fn wrap(out: &mut String, head: &str, body: impl FnOnce(&mut String)) {
    out.push('(');
    out.push_str(head);
    body(out);
    out.push(')');
}

fn child(out: &mut String, node: &Node) {
    out.push(' ');
    node.write_sexp(out);
}

fn child_opt(out: &mut String, node: &Option<Box<Node>>) {
    if let Some(node) = node {
        child(out, node);
    }
}

fn children(out: &mut String, nodes: &[Node]) {
    for node in nodes {
        child(out, node);
    }
}

fn quoted(value: &str) -> String {
    format!("{:?}", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::IntegerValue;
    use ruby_position_tracking::SourceLocation;

    fn node(kind: NodeKind) -> Node {
        Node::new(kind, SourceLocation::empty(0))
    }

    #[test]
    fn write_renders_with_name_and_value() {
        let write = node(NodeKind::LocalVariableWrite {
            name: "a".into(),
            value: Box::new(node(NodeKind::Integer { value: IntegerValue::Small(1) })),
        });
        assert_eq!(write.to_sexp(), "(local_variable_write a (integer 1))");
    }

    #[test]
    fn call_children_are_separated() {
        let call = node(NodeKind::Call {
            receiver: Some(Box::new(node(NodeKind::Integer {
                value: IntegerValue::Small(1),
            }))),
            name: "+".into(),
            arguments: vec![node(NodeKind::Integer { value: IntegerValue::Small(2) })],
            block: None,
        });
        assert_eq!(call.to_sexp(), "(call + (integer 1) (arguments (integer 2)))");
    }

    #[test]
    fn range_exclusivity_changes_head() {
        let one = || Box::new(node(NodeKind::Integer { value: IntegerValue::Small(1) }));
        let inclusive = node(NodeKind::Range { left: Some(one()), right: Some(one()) });
        assert_eq!(inclusive.to_sexp(), "(irange (integer 1) (integer 1))");

        let exclusive = Node::with_flags(
            NodeKind::Range { left: Some(one()), right: Some(one()) },
            SourceLocation::empty(0),
            NodeFlags::EXCLUDE_END,
        );
        assert_eq!(exclusive.to_sexp(), "(erange (integer 1) (integer 1))");
    }

    #[test]
    fn string_values_are_escaped() {
        let string = node(NodeKind::String { value: "a\"b".into() });
        assert_eq!(string.to_sexp(), "(string \"a\\\"b\")");
    }
}
