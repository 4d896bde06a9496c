#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::*;
use pretty_assertions::assert_eq;

/// Collects `(kind, text)` pairs up to and excluding EOF.
fn lex(source: &str) -> Vec<(TokenKind, String)> {
    let mut lexer = Lexer::new(source.as_bytes());
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        if token.kind == TokenKind::Eof {
            break;
        }
        let text = String::from_utf8_lossy(token.text(source.as_bytes())).into_owned();
        tokens.push((token.kind, text));
        if tokens.len() > 4096 {
            panic!("runaway lexer on {source:?}");
        }
    }
    tokens
}

fn kinds(source: &str) -> Vec<TokenKind> {
    lex(source).into_iter().map(|(kind, _)| kind).collect()
}

#[test]
fn simple_assignment() {
    use TokenKind::*;
    assert_eq!(
        lex("a = 1"),
        vec![
            (Identifier, "a".into()),
            (Equal, "=".into()),
            (IntegerLiteral, "1".into()),
        ]
    );
}

#[test]
fn star_is_binary_after_value() {
    use TokenKind::*;
    assert_eq!(kinds("a * b"), vec![Identifier, Star, Identifier]);
    assert_eq!(kinds("a*b"), vec![Identifier, Star, Identifier]);
}

#[test]
fn star_is_splat_with_asymmetric_spacing() {
    use TokenKind::*;
    let mut lexer = Lexer::new(b"foo *bar");
    let mut seen = Vec::new();
    loop {
        let t = lexer.next_token();
        if t.kind == Eof {
            break;
        }
        seen.push(t.kind);
    }
    assert_eq!(seen, vec![Identifier, UStar, Identifier]);
    assert_eq!(lexer.diagnostics.warnings().len(), 1);
}

#[test]
fn star_is_splat_at_expression_start() {
    use TokenKind::*;
    assert_eq!(kinds("a = *b"), vec![Identifier, Equal, UStar, Identifier]);
}

#[test]
fn slash_division_vs_regexp() {
    use TokenKind::*;
    assert_eq!(kinds("a / b"), vec![Identifier, Slash, Identifier]);
    assert_eq!(
        kinds("x = /ab/"),
        vec![Identifier, Equal, RegexpBegin, StringContent, RegexpEnd]
    );
    // Spaced argument position: regexp
    assert_eq!(
        kinds("foo /ab/"),
        vec![Identifier, RegexpBegin, StringContent, RegexpEnd]
    );
}

#[test]
fn regexp_flags_lex_into_the_end_token() {
    let tokens = lex("/ab/imx");
    assert_eq!(tokens.last().unwrap(), &(TokenKind::RegexpEnd, "/imx".to_string()));
}

#[test]
fn string_with_interpolation() {
    use TokenKind::*;
    assert_eq!(
        kinds(r#""a#{1}b""#),
        vec![
            StringBegin,
            StringContent,
            EmbexprBegin,
            IntegerLiteral,
            EmbexprEnd,
            StringContent,
            StringEnd,
        ]
    );
}

#[test]
fn string_short_interpolation() {
    use TokenKind::*;
    assert_eq!(
        kinds(r##""a#@foo""##),
        vec![StringBegin, StringContent, EmbVar, InstanceVariable, StringEnd]
    );
}

#[test]
fn nested_braces_inside_interpolation() {
    use TokenKind::*;
    assert_eq!(
        kinds(r##""#{ {a: 1} }""##),
        vec![
            StringBegin,
            EmbexprBegin,
            BraceLeft,
            Label,
            IntegerLiteral,
            BraceRight,
            EmbexprEnd,
            StringEnd,
        ]
    );
}

#[test]
fn percent_literals() {
    use TokenKind::*;
    assert_eq!(
        kinds("%w[a b]"),
        vec![PercentLowerW, StringContent, WordsSep, StringContent, StringEnd]
    );
    assert_eq!(kinds("%i(x)"), vec![PercentLowerI, StringContent, StringEnd]);
    assert_eq!(kinds("%q{a}"), vec![StringBegin, StringContent, StringEnd]);
    assert_eq!(kinds("%r{a}i"), vec![RegexpBegin, StringContent, RegexpEnd]);
    assert_eq!(kinds("%x(ls)"), vec![XStringBegin, StringContent, StringEnd]);
}

#[test]
fn percent_nested_paired_delimiters() {
    use TokenKind::*;
    assert_eq!(lex("%q(a(b)c)")[1], (StringContent, "a(b)c".into()));
}

#[test]
fn labels_and_symbols_and_ternary() {
    use TokenKind::*;
    assert_eq!(kinds("{a: 1}"), vec![BraceLeft, Label, IntegerLiteral, BraceRight]);
    assert_eq!(kinds("x = :foo"), vec![Identifier, Equal, SymbolBegin, MethodName]);
    assert_eq!(
        kinds("a ? b : c"),
        vec![Identifier, Question, Identifier, Colon, Identifier]
    );
}

#[test]
fn character_literal_vs_ternary() {
    use TokenKind::*;
    assert_eq!(kinds("x = ?a"), vec![Identifier, Equal, CharacterLiteral]);
    assert_eq!(kinds("x = ?\\n"), vec![Identifier, Equal, CharacterLiteral]);
    // `?ab` cannot be a character literal
    assert_eq!(kinds("x ? ab : c").contains(&CharacterLiteral), false);
}

#[test]
fn global_variable_families() {
    use TokenKind::*;
    assert_eq!(kinds("$foo"), vec![GlobalVariable]);
    assert_eq!(kinds("$1"), vec![NthReference]);
    assert_eq!(kinds("$&"), vec![BackReference]);
    assert_eq!(kinds("$:"), vec![GlobalVariable]);
}

#[test]
fn instance_and_class_variables() {
    use TokenKind::*;
    assert_eq!(kinds("@a"), vec![InstanceVariable]);
    assert_eq!(kinds("@@a"), vec![ClassVariable]);
}

#[test]
fn method_names_after_dot_and_def() {
    use TokenKind::*;
    assert_eq!(kinds("a.class"), vec![Identifier, Dot, MethodName]);
    assert_eq!(kinds("def foo="), vec![KeywordDef, MethodName]);
    assert_eq!(kinds("def <=>"), vec![KeywordDef, LessEqualGreater]);
    assert_eq!(kinds("def []="), vec![KeywordDef, BracketLeftRightEqual]);
}

#[test]
fn do_loop_depends_on_parser_hook() {
    use TokenKind::*;
    let mut lexer = Lexer::new(b"do");
    lexer.do_loop_push(true);
    assert_eq!(lexer.next_token().kind, KeywordDoLoop);

    let mut lexer = Lexer::new(b"do");
    assert_eq!(lexer.next_token().kind, KeywordDo);
}

#[test]
fn newline_significance() {
    use TokenKind::*;
    // Significant between statements
    assert_eq!(kinds("a\nb"), vec![Identifier, Newline, Identifier]);
    // Ignored after an operator (BEG state)
    assert_eq!(kinds("a +\nb"), vec![Identifier, Plus, Identifier]);
    // Ignored before a leading-dot method call
    assert_eq!(kinds("a\n.b"), vec![Identifier, Dot, MethodName]);
    assert_eq!(kinds("a\n&.b"), vec![Identifier, AmpDot, MethodName]);
    // But `..` is a beginless range on the next line, so the newline stands
    assert_eq!(kinds("a\n..b")[1], Newline);
}

#[test]
fn heredoc_basic_token_order() {
    use TokenKind::*;
    assert_eq!(
        kinds("x = <<EOS\nbody\nEOS\n"),
        vec![Identifier, Equal, HeredocStart, StringContent, HeredocEnd, Newline]
    );
}

#[test]
fn heredoc_interleaves_with_opener_line_code() {
    use TokenKind::*;
    // Two heredocs opened on one line: bodies follow in order
    let tokens = lex("<<A + <<B\nx\nA\ny\nB\nz");
    let expected = vec![
        (HeredocStart, "<<A".to_string()),
        (StringContent, "x\n".to_string()),
        (HeredocEnd, "A".to_string()),
        (Plus, "+".to_string()),
        (HeredocStart, "<<B".to_string()),
        (StringContent, "y\n".to_string()),
        (HeredocEnd, "B".to_string()),
        (Newline, "\n".to_string()),
        (Identifier, "z".to_string()),
    ];
    assert_eq!(tokens, expected);
}

#[test]
fn heredoc_single_quoted_has_no_interpolation() {
    use TokenKind::*;
    assert_eq!(
        kinds("<<'EOS'\n#{x}\nEOS\n"),
        vec![HeredocStart, StringContent, HeredocEnd, Newline]
    );
}

#[test]
fn heredoc_squiggly_tracks_dedent() {
    let mut lexer = Lexer::new(b"<<~EOS\n    a\n  b\nEOS\n");
    loop {
        let token = lexer.next_token();
        if token.kind == TokenKind::HeredocEnd {
            break;
        }
        assert_ne!(token.kind, TokenKind::Eof, "terminator never found");
    }
    assert_eq!(lexer.heredoc_dedent(), 2);
}

#[test]
fn heredoc_unterminated_is_diagnosed() {
    let mut lexer = Lexer::new(b"x = <<EOS\nbody");
    loop {
        if lexer.next_token().kind == TokenKind::Eof {
            break;
        }
    }
    assert!(lexer
        .diagnostics
        .errors()
        .iter()
        .any(|d| d.id == ruby_error::DiagnosticId::HeredocUnterminated));
}

#[test]
fn shift_operator_still_works() {
    use TokenKind::*;
    assert_eq!(kinds("a << b"), vec![Identifier, LessLess, Identifier]);
    assert_eq!(kinds("1 << 2"), vec![IntegerLiteral, LessLess, IntegerLiteral]);
}

#[test]
fn end_marker_records_data_span() {
    let source = b"a = 1\n__END__\nraw data";
    let mut lexer = Lexer::new(source);
    let mut last = lexer.next_token();
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::Eof;
        last = token;
        if done {
            break;
        }
    }
    assert_eq!(last.kind, TokenKind::Eof);
    let data = lexer.data_span().unwrap();
    assert_eq!(&source[data.start..data.end], b"__END__\nraw data");
}

#[test]
fn end_marker_must_own_the_line() {
    let mut lexer = Lexer::new(b"__END__ = 1");
    let token = lexer.next_token();
    assert_eq!(token.kind, TokenKind::Identifier);
    assert!(lexer.data_span().is_none());
}

#[test]
fn magic_comments_are_collected() {
    let source = b"# frozen_string_literal: true\n# warn_indent: false\na = 1";
    let mut lexer = Lexer::new(source);
    let _ = lexer.next_token();
    assert_eq!(lexer.magic.frozen_string_literal, Some(true));
    assert_eq!(lexer.magic.warn_indent, Some(false));
}

#[test]
fn magic_comment_after_code_warns() {
    let source = b"a = 1\n# frozen_string_literal: true\nb";
    let mut lexer = Lexer::new(source);
    loop {
        if lexer.next_token().kind == TokenKind::Eof {
            break;
        }
    }
    assert!(lexer
        .diagnostics
        .warnings()
        .iter()
        .any(|d| d.id == ruby_error::DiagnosticId::MagicCommentIgnoredWarning));
    assert_eq!(lexer.magic.frozen_string_literal, None);
}

#[test]
fn encoding_magic_comment_switches_encoding() {
    let source = b"# encoding: ascii-8bit\na";
    let mut lexer = Lexer::new(source);
    let _ = lexer.next_token();
    assert_eq!(lexer.encoding().name, "ASCII-8BIT");

    let mut locked = Lexer::with_config(
        source,
        LexerConfig { encoding_locked: true, ..LexerConfig::default() },
    );
    let _ = locked.next_token();
    assert_eq!(locked.encoding().name, "UTF-8");
}

#[test]
fn shebang_switches_are_forwarded() {
    use std::cell::RefCell;
    use std::rc::Rc;
    let seen: Rc<RefCell<Vec<u8>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let mut lexer = Lexer::new(b"#!/usr/bin/ruby -w\na");
    lexer.on_shebang(Box::new(move |line| sink.borrow_mut().extend_from_slice(line)));
    let token = lexer.next_token();
    assert_eq!(token.kind, TokenKind::Identifier);
    assert!(seen.borrow().windows(2).any(|w| w == b"-w"));
}

#[test]
fn embedded_docs_are_skipped() {
    use TokenKind::*;
    assert_eq!(kinds("=begin\ndoc\n=end\na"), vec![Identifier]);
    let mut lexer = Lexer::new(b"=begin\nnever closed");
    loop {
        if lexer.next_token().kind == TokenKind::Eof {
            break;
        }
    }
    assert!(lexer
        .diagnostics
        .errors()
        .iter()
        .any(|d| d.id == ruby_error::DiagnosticId::EmbDocUnterminated));
}

#[test]
fn newline_index_covers_all_line_feeds() {
    let source = "a = 1\n\"s\ntring\"\n<<EOS\nbody\nEOS\nb\n";
    let mut lexer = Lexer::new(source.as_bytes());
    loop {
        if lexer.next_token().kind == TokenKind::Eof {
            break;
        }
    }
    let expected: Vec<usize> = source
        .bytes()
        .enumerate()
        .filter(|(_, b)| *b == b'\n')
        .map(|(i, _)| i)
        .collect();
    assert_eq!(lexer.newlines.offsets(), expected.as_slice());
}

#[test]
fn mode_stack_balances_on_accepted_input() {
    let mut lexer = Lexer::new(br#"x = "a#{%w[b c].first}d""#);
    loop {
        if lexer.next_token().kind == TokenKind::Eof {
            break;
        }
    }
    assert_eq!(lexer.mode_depth(), 1);
}

#[test]
fn lambda_brace_is_a_lambda_begin() {
    use TokenKind::*;
    assert_eq!(
        kinds("-> { 1 }"),
        vec![MinusGreater, LambdaBegin, IntegerLiteral, BraceRight]
    );
    assert_eq!(kinds("x = { }"), vec![Identifier, Equal, BraceLeft, BraceRight]);
}

#[test]
fn unary_minus_fuses_with_numbers() {
    use TokenKind::*;
    assert_eq!(kinds("x = -1"), vec![Identifier, Equal, UMinusNum, IntegerLiteral]);
    assert_eq!(kinds("x - 1"), vec![Identifier, Minus, IntegerLiteral]);
    assert_eq!(kinds("-x"), vec![UMinus, Identifier]);
}

#[test]
fn colon_colon_beg_vs_path() {
    use TokenKind::*;
    assert_eq!(kinds("::Foo"), vec![UColonColon, Constant]);
    assert_eq!(kinds("Foo::Bar"), vec![Constant, ColonColon, MethodName]);
}

#[test]
fn carriage_return_alone_warns() {
    let mut lexer = Lexer::new(b"a \r b");
    loop {
        if lexer.next_token().kind == TokenKind::Eof {
            break;
        }
    }
    assert!(lexer
        .diagnostics
        .warnings()
        .iter()
        .any(|d| d.id == ruby_error::DiagnosticId::CarriageReturnWarning));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The lexer terminates and the newline index matches the source for
        /// arbitrary printable input.
        #[test]
        fn lexer_terminates_and_indexes_newlines(
            source in "[ -~\n]{0,200}"
        ) {
            let mut lexer = Lexer::new(source.as_bytes());
            let mut count = 0;
            loop {
                let token = lexer.next_token();
                if token.kind == TokenKind::Eof {
                    break;
                }
                count += 1;
                prop_assert!(count < 2048, "runaway lexer");
            }
            // Every recorded offset is a real newline (the lexer may stop
            // early at __END__, so equality is checked only up to the range
            // it scanned).
            for &offset in lexer.newlines.offsets() {
                prop_assert_eq!(source.as_bytes()[offset], b'\n');
            }
        }
    }
}
