//! The recursive Pratt parser.
//!
//! The parser pulls tokens from the context-aware lexer on demand, holding a
//! two-token window (`previous`, `current`) and never rewinding. Expression
//! parsing is driven by the per-token binding-power table in
//! [`crate::precedence`]; statements, definitions, patterns, and literal
//! aggregation live in the included submodule files, all extending the one
//! `Parser` impl the way the engine is organized.
//!
//! Every syntax error produces a diagnostic plus a synthesized `Missing`
//! token or node; parsing always runs to the end of input and always returns
//! a tree.

use crate::context::{Context, ContextStack};
use crate::precedence::{binding_power, level};
use crate::scope::{ParameterBits, Scope, ScopeStack};
use crate::{CommandLine, Options, RegexpParser, SyntaxVersion};
use ruby_ast::{GuardKind, IntegerValue, Node, NodeFlags, NodeKind, RegexpEncoding, RegexpOptions};
use ruby_error::{Diagnostic, DiagnosticId};
use ruby_heredoc::{HeredocIndent, HeredocQuote};
use ruby_interner::{ConstantId, ConstantPool};
use ruby_lexer::escape::{self, UnescapeMode};
use ruby_lexer::{encoding::ExplicitEncoding, numbers, Lexer, LexerConfig};
use ruby_position_tracking::ByteSpan;
use ruby_token::{Token, TokenKind};

/// Hard cap on recursive descent depth; exceeding it yields a diagnostic and
/// a missing node instead of a stack overflow.
const MAX_PARSE_DEPTH: usize = 1000;

/// A frame of the block-exit stack (`break`/`next`/`redo` legality).
#[derive(Debug)]
enum ExitFrame {
    /// Inside a loop or block body: exits are legal
    Loop,
    /// Inside a method/class/module body: exits cannot escape
    Barrier,
    /// Inside an expression that a trailing `while`/`until` modifier could
    /// still turn into a loop; exits are pending until the expression ends
    Candidate(Vec<(ByteSpan, DiagnosticId)>),
}

/// Ruby parser over a complete source buffer.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    source: &'src [u8],
    previous: Token,
    current: Token,
    pool: ConstantPool<'src>,
    scopes: ScopeStack,
    contexts: ContextStack,
    filepath: String,
    start_line: i32,
    frozen_string_literal: Option<bool>,
    command_line: CommandLine,
    version: SyntaxVersion,
    depth: usize,
    block_exits: Vec<ExitFrame>,
    regexp_parser: Box<dyn RegexpParser>,
    seeded_scope_count: usize,
    /// Capture names declared by the pattern arm being parsed
    pattern_captures: Vec<ConstantId>,
}

impl<'src> Parser<'src> {
    /// Create a parser for `source` with the given options.
    pub fn new(source: &'src [u8], options: &Options) -> Self {
        let mut lexer = Lexer::with_config(
            source,
            LexerConfig {
                encoding_locked: options.encoding_locked,
                search_shebang: options.command_line.has(CommandLine::X),
                suppress_minor_warnings: options.command_line.has(CommandLine::E),
            },
        );
        let mut scopes = ScopeStack::new();
        let mut pool = ConstantPool::with_source_len(source.len());
        // Seed outer scopes (eval-style parses)
        for outer in &options.scopes {
            let mut scope = Scope::new(true);
            if outer.implicit_disallowed {
                scope.parameters.set(ParameterBits::IMPLICIT_DISALLOWED);
            }
            scope.parameters.set(outer.forwarding);
            for name in &outer.locals {
                let id = pool.insert_owned(name.clone().into_bytes());
                scope.declare(id, ByteSpan::empty(0));
            }
            scopes.push(scope);
        }
        let seeded_scope_count = scopes.depth();

        if let Some(name) = &options.encoding {
            match ruby_lexer::encoding::find(name.as_bytes()) {
                Some(record) => lexer.set_encoding(record),
                None => lexer
                    .diagnostics
                    .error(ByteSpan::empty(0), DiagnosticId::EncodingUnknown),
            }
        }

        Parser {
            lexer,
            source,
            previous: Token::missing(0),
            current: Token::missing(0),
            pool,
            scopes,
            contexts: ContextStack::new(),
            filepath: options.filepath.clone(),
            start_line: options.line,
            frozen_string_literal: options.frozen_string_literal,
            command_line: options.command_line,
            version: options.version,
            depth: 0,
            block_exits: Vec::new(),
            regexp_parser: Box::new(crate::BasicRegexpParser),
            seeded_scope_count,
            pattern_captures: Vec::new(),
        }
    }

    /// Replace the regexp sub-parser implementation.
    pub fn set_regexp_parser(&mut self, parser: Box<dyn RegexpParser>) {
        self.regexp_parser = parser;
    }

    /// Register a shebang callback on the underlying lexer.
    pub fn on_shebang(&mut self, callback: Box<dyn FnMut(&[u8])>) {
        self.lexer.on_shebang(callback);
    }

    /// Register an encoding-change callback on the underlying lexer.
    pub fn on_encoding_change(
        &mut self,
        callback: Box<dyn FnMut(&'static ruby_lexer::encoding::Encoding)>,
    ) {
        self.lexer.on_encoding_change(callback);
    }

    /// Parse the source to completion. Always returns a tree; syntax
    /// problems surface through [`Parser::errors`].
    pub fn parse(&mut self) -> Node {
        // Prime the token window; magic comments ahead of the first token
        // are processed as a side effect.
        self.current = self.lexer.next_token();

        // The program scope is transparent to seeded eval scopes, opaque
        // otherwise.
        let mut program_scope = Scope::new(self.seeded_scope_count == 0);
        if let Some(setting) = self.lexer.magic.shareable_constant_value {
            program_scope.shareable_constant = setting;
        }
        self.scopes.push(program_scope);
        self.block_exits.push(ExitFrame::Barrier);
        self.contexts.push(Context::Main);
        let statements = self.parse_statements();
        self.contexts.pop();
        self.block_exits.pop();
        // Program scope was pushed above the seeded frames.
        let scope = self.scopes.pop();
        let locals = self.scope_local_names(scope);
        // Unbalanced literal modes at EOF drain one per token request, so
        // the mode stack ends at its initial depth even for invalid input.
        let mut drain_guard = 0;
        while self.lexer.mode_depth() > 1 && drain_guard < 64 {
            let _ = self.lexer.next_token();
            drain_guard += 1;
        }
        // Stack balance: every push matched a pop on every path
        debug_assert_eq!(self.scopes.depth(), self.seeded_scope_count);
        debug_assert_eq!(self.contexts.depth(), 0);
        debug_assert!(self.block_exits.is_empty());
        debug_assert_eq!(self.lexer.mode_depth(), 1);

        let statements = self.apply_command_line_wrapping(statements);
        let span = ByteSpan::new(0, self.source.len());
        Node::new(NodeKind::Program { locals, statements: Box::new(statements) }, span)
    }

    /// Errors collected so far.
    pub fn errors(&self) -> &[Diagnostic] {
        self.lexer.diagnostics.errors()
    }

    /// Warnings collected so far.
    pub fn warnings(&self) -> &[Diagnostic] {
        self.lexer.diagnostics.warnings()
    }

    /// The `__END__` data range, if any.
    pub fn data_span(&self) -> Option<ByteSpan> {
        self.lexer.data_span()
    }

    /// Magic-comment settings observed during the parse.
    pub fn magic(&self) -> &ruby_lexer::MagicState {
        &self.lexer.magic
    }

    /// Line/column (1-based line) of a byte offset, for consumers rendering
    /// diagnostics.
    pub fn line_col(&self, offset: usize) -> (i32, usize) {
        self.lexer.newlines.line_col(offset, self.start_line)
    }

    /// Offsets of every `\n` crossed during the scan.
    pub fn newline_offsets(&self) -> Vec<usize> {
        self.lexer.newlines.offsets().to_vec()
    }

    /// Wraps top-level statements per `-n` / `-p` / `-a`.
    fn apply_command_line_wrapping(&mut self, statements: Node) -> Node {
        if !self.command_line.has(CommandLine::N) && !self.command_line.has(CommandLine::P) {
            return statements;
        }
        let span = statements.location;
        let mut body = match statements.kind {
            NodeKind::Statements { body } => body,
            _ => vec![statements],
        };
        if self.command_line.has(CommandLine::P) {
            // print $_
            let print_underscore = Node::new(
                NodeKind::Call {
                    receiver: None,
                    name: "print".into(),
                    arguments: vec![Node::new(
                        NodeKind::GlobalVariableRead { name: "$_".into() },
                        span,
                    )],
                    block: None,
                },
                span,
            );
            body.push(print_underscore);
        }
        if self.command_line.has(CommandLine::A) {
            // $F = $_.split($;)
            let split = Node::new(
                NodeKind::Call {
                    receiver: Some(Box::new(Node::new(
                        NodeKind::GlobalVariableRead { name: "$_".into() },
                        span,
                    ))),
                    name: "split".into(),
                    arguments: vec![Node::new(
                        NodeKind::GlobalVariableRead { name: "$;".into() },
                        span,
                    )],
                    block: None,
                },
                span,
            );
            body.insert(
                0,
                Node::new(
                    NodeKind::GlobalVariableWrite { name: "$F".into(), value: Box::new(split) },
                    span,
                ),
            );
        }
        // while gets(...) ; body ; end
        let gets_arguments = if self.command_line.has(CommandLine::L) {
            vec![Node::new(
                NodeKind::KeywordHash {
                    elements: vec![Node::new(
                        NodeKind::Assoc {
                            key: Box::new(Node::new(
                                NodeKind::Symbol { name: "chomp".into() },
                                span,
                            )),
                            value: Some(Box::new(Node::new(NodeKind::True, span))),
                        },
                        span,
                    )],
                },
                span,
            )]
        } else {
            Vec::new()
        };
        let gets = Node::new(
            NodeKind::Call { receiver: None, name: "gets".into(), arguments: gets_arguments, block: None },
            span,
        );
        Node::new(
            NodeKind::Statements {
                body: vec![Node::new(
                    NodeKind::While {
                        predicate: Box::new(gets),
                        statements: Box::new(Node::new(NodeKind::Statements { body }, span)),
                    },
                    span,
                )],
            },
            span,
        )
    }
}

include!("helpers.rs");
include!("statements.rs");
include!("definitions.rs");
include!("expressions.rs");
include!("primary.rs");
include!("calls.rs");
include!("targets.rs");
include!("strings.rs");
include!("pattern.rs");

#[cfg(test)]
mod tests;
