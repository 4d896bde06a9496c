#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::unreachable)]

use crate::{parse, parse_stream, parse_success, CommandLine, Options, ParseResult};
use pretty_assertions::assert_eq;
use ruby_ast::{Node, NodeFlags, NodeKind};
use ruby_error::DiagnosticId;

fn parse_default(source: &str) -> ParseResult {
    parse(source.as_bytes(), &Options::default())
}

/// The S-expression of the whole program.
fn program_sexp(source: &str) -> String {
    parse_default(source).node.to_sexp()
}

/// The S-expression of the first top-level statement.
fn sexp(source: &str) -> String {
    first_statement(&parse_default(source)).to_sexp()
}

fn first_statement(result: &ParseResult) -> &Node {
    match &result.node.kind {
        NodeKind::Program { statements, .. } => match &statements.kind {
            NodeKind::Statements { body } => body.first().expect("empty program"),
            _ => unreachable!(),
        },
        _ => unreachable!(),
    }
}

fn error_ids(source: &str) -> Vec<DiagnosticId> {
    parse_default(source).errors.iter().map(|d| d.id).collect()
}

fn assert_no_errors(source: &str) {
    let result = parse_default(source);
    assert!(
        result.errors.is_empty(),
        "unexpected errors for {source:?}: {:?}",
        result.errors
    );
}

// ===== the end-to-end table =====

#[test]
fn simple_local_write() {
    assert_eq!(sexp("a = 1"), "(local_variable_write a (integer 1))");
}

#[test]
fn multiple_assignment() {
    assert_eq!(
        sexp("a, b = 1, 2"),
        "(multi_write (targets (local_variable_target a) (local_variable_target b)) \
         (array (integer 1) (integer 2)))"
    );
}

#[test]
fn def_with_full_parameter_list() {
    assert_eq!(
        sexp("def f(x, *y, **z, &b); end"),
        "(def f (parameters (required x) (rest y) (keyword_rest z) (block_parameter b)))"
    );
    assert_no_errors("def f(x, *y, **z, &b); end");
}

#[test]
fn interpolated_string_shape() {
    assert_eq!(
        sexp(r#""a#{1+2}b""#),
        "(interpolated_string (string \"a\") (embedded_statements (statements \
         (call + (integer 1) (arguments (integer 2))))) (string \"b\"))"
    );
}

#[test]
fn case_in_array_pattern() {
    assert_eq!(
        sexp("case x; in [a, *, b] then a; end"),
        "(case_match (call x) (in (array_pattern (local_variable_target a) (splat) \
         (local_variable_target b)) (statements (local_variable_read a))))"
    );
}

#[test]
fn integer_receiver_with_block() {
    assert_eq!(
        sexp("1.upto(10) { |i| i }"),
        "(call upto (integer 1) (arguments (integer 10)) (block (block_parameters \
         (parameters (required i))) (statements (local_variable_read i))))"
    );
}

// ===== precedence =====

#[test]
fn multiplication_binds_tighter_than_addition() {
    assert_eq!(
        sexp("a + b * c"),
        "(call + (call a) (arguments (call * (call b) (arguments (call c)))))"
    );
}

#[test]
fn subtraction_is_left_associative() {
    assert_eq!(
        sexp("a - b - c"),
        "(call - (call - (call a) (arguments (call b))) (arguments (call c)))"
    );
}

#[test]
fn power_is_right_associative() {
    assert_eq!(
        sexp("2 ** 3 ** 2"),
        "(call ** (integer 2) (arguments (call ** (integer 3) (arguments (integer 2)))))"
    );
}

#[test]
fn logical_operators_nest_correctly() {
    assert_eq!(sexp("a || b && c"), "(or (call a) (and (call b) (call c)))");
}

#[test]
fn keyword_and_binds_looser_than_assignment() {
    assert_eq!(
        sexp("x = 1 and y"),
        "(and (local_variable_write x (integer 1)) (call y))"
    );
}

#[test]
fn modifier_if_is_loosest() {
    assert_eq!(
        sexp("x = 1 if y"),
        "(if (call y) (statements (local_variable_write x (integer 1))))"
    );
}

#[test]
fn equality_is_non_associative() {
    assert!(error_ids("1 == 2 == 3").contains(&DiagnosticId::NonAssociativeOperator));
}

#[test]
fn range_is_non_associative() {
    assert!(error_ids("1..2..3").contains(&DiagnosticId::NonAssociativeOperator));
}

#[test]
fn unary_minus_over_multiplication() {
    assert_eq!(
        sexp("-a * b"),
        "(call * (call -@ (call a)) (arguments (call b)))"
    );
}

#[test]
fn negative_literal_power_negates_the_power() {
    // -2 ** 2 == -(2 ** 2)
    assert_eq!(
        sexp("-2 ** 2"),
        "(call -@ (call ** (integer 2) (arguments (integer 2))))"
    );
}

#[test]
fn ternary_shares_the_if_node() {
    assert_eq!(
        sexp("a ? 1 : 2"),
        "(if (call a) (statements (integer 1)) (else (statements (integer 2))))"
    );
}

#[test]
fn not_and_bang() {
    assert_eq!(sexp("!a"), "(not (call a))");
    assert_eq!(sexp("not a and b"), "(and (not (call a)) (call b))");
}

// ===== ranges =====

#[test]
fn range_forms() {
    assert_eq!(sexp("1..5"), "(irange (integer 1) (integer 5))");
    assert_eq!(sexp("1...5"), "(erange (integer 1) (integer 5))");
    assert_eq!(sexp("..5"), "(irange (integer 5))");
}

#[test]
fn static_literal_ranges_are_flagged() {
    let result = parse_default("1..5");
    assert!(first_statement(&result).flags.contains(NodeFlags::STATIC_LITERAL));
    let result = parse_default("a..b");
    assert!(!first_statement(&result).flags.contains(NodeFlags::STATIC_LITERAL));
}

// ===== assignment family =====

#[test]
fn operator_assignments() {
    assert_eq!(sexp("x ||= 1"), "(or_write (local_variable_target x) (integer 1))");
    assert_eq!(sexp("x &&= 1"), "(and_write (local_variable_target x) (integer 1))");
    assert_eq!(sexp("x += 1"), "(operator_write + (local_variable_target x) (integer 1))");
    assert_eq!(
        sexp("a.b += 1"),
        "(operator_write + (call_target b (call a)) (integer 1))"
    );
}

#[test]
fn attribute_and_index_writes_become_calls() {
    assert_eq!(sexp("a.b = 1"), "(call b= (call a) (arguments (integer 1)))");
    assert_eq!(
        sexp("a[0] = 1"),
        "(call []= (call a) (arguments (integer 0) (integer 1)))"
    );
}

#[test]
fn splat_in_multiple_assignment() {
    assert_eq!(
        sexp("a, *b = 1, 2, 3"),
        "(multi_write (targets (local_variable_target a) (splat (local_variable_target b))) \
         (array (integer 1) (integer 2) (integer 3)))"
    );
}

#[test]
fn nested_destructuring_target() {
    assert_eq!(
        sexp("a, (b, c) = x"),
        "(multi_write (targets (local_variable_target a) (multi_target \
         (local_variable_target b) (local_variable_target c))) (call x))"
    );
}

#[test]
fn implicit_array_flag_on_multi_value_rhs() {
    let result = parse_default("a = 1, 2");
    assert!(first_statement(&result).flags.contains(NodeFlags::IMPLICIT_ARRAY));
}

#[test]
fn assignment_scoped_rescue_modifier() {
    assert_eq!(
        sexp("x = risky rescue nil"),
        "(local_variable_write x (rescue_modifier (call risky) (nil)))"
    );
}

#[test]
fn constant_assignment_inside_method_is_an_error() {
    assert!(error_ids("def f; X = 1; end")
        .contains(&DiagnosticId::ConstantAssignmentInMethod));
    assert!(!error_ids("X = 1").contains(&DiagnosticId::ConstantAssignmentInMethod));
}

// ===== control flow =====

#[test]
fn if_elsif_else_chain() {
    assert_eq!(
        sexp("if a; 1; elsif b; 2; else; 3; end"),
        "(if (call a) (statements (integer 1)) (if (call b) (statements (integer 2)) \
         (else (statements (integer 3)))))"
    );
}

#[test]
fn while_loop_with_do() {
    assert_eq!(
        sexp("while x do; y; end"),
        "(while (call x) (statements (call y)))"
    );
    assert_no_errors("while x do; y; end");
}

#[test]
fn for_loop() {
    assert_eq!(
        sexp("for i in 1..3; i; end"),
        "(for (local_variable_target i) (irange (integer 1) (integer 3)) \
         (statements (local_variable_read i)))"
    );
}

#[test]
fn case_when_with_else() {
    assert_eq!(
        sexp("case x; when 1, 2 then :a; else; :b; end"),
        "(case (call x) (when (integer 1) (integer 2) (statements (symbol a))) \
         (else (statements (symbol b))))"
    );
}

#[test]
fn duplicate_when_literals_warn() {
    let result = parse_default("case x; when 1; when 1; end");
    assert!(result
        .warnings
        .iter()
        .any(|d| d.id == DiagnosticId::WhenClauseDuplicate));
}

#[test]
fn begin_rescue_ensure() {
    assert_eq!(
        sexp("begin; a; rescue E => e; b; ensure; c; end"),
        "(begin (statements (call a)) (rescue (constant_read E) (local_variable_target e) \
         (statements (call b))) (ensure (statements (call c))))"
    );
}

#[test]
fn rescue_modifier_infix() {
    assert_eq!(sexp("foo rescue nil"), "(rescue_modifier (call foo) (nil))");
}

#[test]
fn begin_end_while_is_a_post_test_loop() {
    let result = parse_default("begin; a; end while b");
    let stmt = first_statement(&result);
    assert!(stmt.flags.contains(NodeFlags::BEGIN_MODIFIER));
    assert_eq!(
        stmt.to_sexp(),
        "(while (call b) (statements (begin (statements (call a)))))"
    );
}

// ===== block exits =====

#[test]
fn break_legality() {
    assert!(error_ids("break").contains(&DiagnosticId::BreakOutsideLoop));
    assert!(error_ids("begin; break; end").contains(&DiagnosticId::BreakOutsideLoop));
    assert_no_errors("while x; break; end");
    assert_no_errors("loop { break }");
    assert_no_errors("begin; break; end while x");
}

#[test]
fn next_and_redo_legality() {
    assert!(error_ids("next").contains(&DiagnosticId::NextOutsideLoop));
    assert!(error_ids("redo").contains(&DiagnosticId::RedoOutsideLoop));
    assert_no_errors("until x; next; end");
}

#[test]
fn retry_needs_a_rescue_clause() {
    assert!(error_ids("retry").contains(&DiagnosticId::RetryOutsideRescue));
    assert_no_errors("begin; a; rescue; retry; end");
}

#[test]
fn yield_needs_a_method() {
    assert!(error_ids("yield").contains(&DiagnosticId::YieldOutsideMethod));
    assert_no_errors("def f; yield 1; end");
}

#[test]
fn return_in_class_body_is_an_error() {
    assert!(error_ids("class C; return; end").contains(&DiagnosticId::ReturnOutsideMethod));
    assert_no_errors("def f; return 1; end");
    assert_no_errors("return"); // toplevel return is legal
}

// ===== definitions =====

#[test]
fn singleton_method_definition() {
    assert_eq!(sexp("def self.f; end"), "(def f (self))");
    assert_eq!(sexp("def Foo.f; end"), "(def f (constant_read Foo))");
}

#[test]
fn operator_and_setter_definitions() {
    assert_eq!(
        sexp("def <=>(other); end"),
        "(def <=> (parameters (required other)))"
    );
    assert_eq!(sexp("def foo=(v); end"), "(def foo= (parameters (required v)))");
    assert_eq!(sexp("def []=(k, v); end"), "(def []= (parameters (required k) (required v)))");
}

#[test]
fn endless_method_definition() {
    assert_eq!(
        sexp("def f(x) = x * 2"),
        "(def f (parameters (required x)) (call * (local_variable_read x) \
         (arguments (integer 2))))"
    );
}

#[test]
fn keyword_and_optional_parameters() {
    assert_eq!(
        sexp("def f(a = 1, b:, c: 2); end"),
        "(def f (parameters (optional a (integer 1)) (keyword b) (keyword c (integer 2))))"
    );
}

#[test]
fn destructured_parameter() {
    assert_eq!(
        sexp("def f((a, b)); end"),
        "(def f (parameters (multi_target (required a) (required b))))"
    );
}

#[test]
fn duplicate_parameter_names_error() {
    assert!(error_ids("def f(a, a); end").contains(&DiagnosticId::ParameterNameDuplicate));
    assert!(error_ids("def f(_1); end").contains(&DiagnosticId::ParameterNameReserved));
}

#[test]
fn method_rescue_tail() {
    assert_eq!(
        sexp("def f; a; rescue; b; end"),
        "(def f (begin (statements (call a)) (rescue (statements (call b)))))"
    );
}

#[test]
fn class_definitions() {
    assert_eq!(sexp("class Foo < Bar; end"), "(class (constant_read Foo) (constant_read Bar))");
    assert_eq!(sexp("module A::B; end"), "(module (constant_path B (constant_read A)))");
    assert_eq!(sexp("class << self; end"), "(singleton_class (self))");
}

#[test]
fn alias_and_undef_are_statement_only() {
    assert_eq!(sexp("alias a b"), "(alias (symbol a) (symbol b))");
    assert_eq!(sexp("undef a, b"), "(undef (symbol a) (symbol b))");
    assert_eq!(
        sexp("alias a b if c"),
        "(if (call c) (statements (alias (symbol a) (symbol b))))"
    );
}

#[test]
fn pre_and_post_execution_blocks() {
    assert_eq!(sexp("BEGIN { 1 }"), "(pre_execution (statements (integer 1)))");
    assert_eq!(sexp("END { 2 }"), "(post_execution (statements (integer 2)))");
    assert!(error_ids("def f; BEGIN { }; end")
        .contains(&DiagnosticId::BeginUpcaseNotAtTopLevel));
}

// ===== calls and blocks =====

#[test]
fn command_call_without_parens() {
    assert_eq!(sexp("puts 1, 2"), "(call puts (arguments (integer 1) (integer 2)))");
    let result = parse_default("puts 1");
    assert!(first_statement(&result).flags.contains(NodeFlags::COMMAND_CALL));
}

#[test]
fn nested_command_arguments() {
    assert_eq!(
        sexp("puts foo 1"),
        "(call puts (arguments (call foo (arguments (integer 1)))))"
    );
}

#[test]
fn chaining_on_a_command_result_errors() {
    assert!(error_ids("foo a do; end.bar").contains(&DiagnosticId::CommandChained));
}

#[test]
fn safe_navigation() {
    let result = parse_default("a&.b");
    assert!(first_statement(&result).flags.contains(NodeFlags::SAFE_NAVIGATION));
}

#[test]
fn do_block_attaches_to_call() {
    assert_eq!(
        sexp("foo do |x| x end"),
        "(call foo (block (block_parameters (parameters (required x))) \
         (statements (local_variable_read x))))"
    );
}

#[test]
fn lambda_literal() {
    assert_eq!(
        sexp("f = ->(x) { x }"),
        "(local_variable_write f (lambda (parameters (required x)) \
         (statements (local_variable_read x))))"
    );
}

#[test]
fn super_forms() {
    assert_eq!(sexp("super"), "(zsuper)");
    assert_eq!(sexp("def f; super(1); end"), "(def f (statements (super (integer 1))))");
}

#[test]
fn defined_operator() {
    assert_eq!(sexp("defined?(x)"), "(defined (call x))");
}

#[test]
fn block_argument_and_splat_arguments() {
    assert_eq!(
        sexp("foo(*a, &b)"),
        "(call foo (arguments (splat (call a)) (block_argument (call b))))"
    );
}

#[test]
fn forwarding_requires_a_forwarding_definition() {
    assert_no_errors("def f(...); g(...); end");
    assert!(error_ids("def f(x); g(...); end")
        .contains(&DiagnosticId::ForwardingOutsideDefinition));
}

#[test]
fn keyword_hash_argument() {
    assert_eq!(
        sexp("foo(a: 1)"),
        "(call foo (arguments (keyword_hash (assoc (symbol a) (integer 1)))))"
    );
}

// ===== literals =====

#[test]
fn hash_literal_forms() {
    assert_eq!(
        sexp(r#"h = { a: 1, "b" => 2 }"#),
        "(local_variable_write h (hash (assoc (symbol a) (integer 1)) \
         (assoc (string \"b\") (integer 2))))"
    );
}

#[test]
fn quoted_label_key() {
    assert_eq!(
        sexp(r#"{ "k": 1 }"#),
        "(hash (assoc (symbol k) (integer 1)))"
    );
}

#[test]
fn duplicate_hash_keys_warn() {
    let result = parse_default("{ a: 1, a: 2 }");
    assert!(result
        .warnings
        .iter()
        .any(|d| d.id == DiagnosticId::HashKeyDuplicateWarning));
}

#[test]
fn array_with_splat() {
    assert_eq!(
        sexp("[1, *a, 2]"),
        "(array (integer 1) (splat (call a)) (integer 2))"
    );
}

#[test]
fn word_and_symbol_lists() {
    assert_eq!(sexp("%w[a b]"), "(array (string \"a\") (string \"b\"))");
    assert_eq!(sexp("%i[a b]"), "(array (symbol a) (symbol b))");
}

#[test]
fn string_escapes_are_cooked() {
    assert_eq!(sexp(r#""a\nb""#), "(string \"a\\nb\")");
    assert_eq!(sexp(r"'a\nb'"), "(string \"a\\\\nb\")");
}

#[test]
fn adjacent_strings_concatenate() {
    assert_eq!(sexp(r#""a" "b""#), "(string \"ab\")");
}

#[test]
fn character_literal_is_a_string() {
    assert_eq!(sexp("?a"), "(string \"a\")");
    assert_eq!(sexp(r"?\n"), "(string \"\\n\")");
}

#[test]
fn xstring_literal() {
    assert_eq!(sexp("`ls`"), "(xstring \"ls\")");
}

#[test]
fn numeric_literal_families() {
    assert_eq!(sexp("3r"), "(rational (integer 3))");
    assert_eq!(sexp("2i"), "(imaginary (integer 2))");
    assert_eq!(sexp("0xFF"), "(integer 255)");
    assert_eq!(sexp("1.5"), "(float 1.5)");
}

#[test]
fn frozen_string_literal_option_flags_strings() {
    let options = Options { frozen_string_literal: Some(true), ..Options::default() };
    let result = parse(br#""s""#, &options);
    assert!(first_statement(&result).flags.contains(NodeFlags::FROZEN));

    let result = parse(b"# frozen_string_literal: true\n\"s\"", &Options::default());
    assert!(first_statement(&result).flags.contains(NodeFlags::FROZEN));
    assert_eq!(result.magic.frozen_string_literal, Some(true));
}

#[test]
fn unicode_escape_forces_utf8() {
    let result = parse(br#""\u{3042}""#, &Options::default());
    assert!(first_statement(&result).flags.contains(NodeFlags::FORCED_UTF8));
}

// ===== heredocs =====

#[test]
fn basic_heredoc() {
    assert_eq!(
        sexp("x = <<EOS\nline\nEOS\n"),
        "(local_variable_write x (string \"line\\n\"))"
    );
}

#[test]
fn squiggly_heredoc_dedents() {
    assert_eq!(
        sexp("x = <<~EOS\n    a\n  b\nEOS\n"),
        "(local_variable_write x (string \"  a\\nb\\n\"))"
    );
}

#[test]
fn single_quoted_heredoc_has_no_interpolation() {
    assert_eq!(
        sexp("x = <<'EOS'\n#{y}\nEOS\n"),
        "(local_variable_write x (string \"#{y}\\n\"))"
    );
}

#[test]
fn heredoc_bodies_interleave_in_order() {
    // Two heredocs opened on one line interleave with the opener code
    assert_eq!(
        sexp("a = <<A + <<B\nx\nA\ny\nB\n"),
        "(local_variable_write a (call + (string \"x\\n\") (arguments (string \"y\\n\"))))"
    );
}

#[test]
fn interpolated_heredoc() {
    assert_eq!(
        sexp("x = <<EOS\na#{1}b\nEOS\n"),
        "(local_variable_write x (interpolated_string (string \"a\") \
         (embedded_statements (statements (integer 1))) (string \"b\\n\")))"
    );
}

// ===== regexps =====

#[test]
fn regexp_literal_and_options() {
    assert_eq!(sexp("/ab+/"), "(regexp \"ab+\")");
    let result = parse_default("/a/imx");
    let NodeKind::Regexp { options, .. } = &first_statement(&result).kind else {
        panic!("expected a regexp");
    };
    assert!(options.ignore_case && options.multi_line && options.extended);
}

#[test]
fn regexp_named_captures_become_locals() {
    let result = parse_default("/(?<num>a+)/ =~ \"aa\"\nnum");
    assert!(result.errors.is_empty());
    let sexp = result.node.to_sexp();
    assert!(sexp.contains("(match_write"), "no match-write in {sexp}");
    assert!(sexp.contains("(local_variable_target num)"));
    assert!(sexp.contains("(local_variable_read num)"));
}

#[test]
fn interpolated_regexp() {
    assert_eq!(
        sexp("/a#{b}c/"),
        "(interpolated_regexp (string \"a\") (embedded_statements (statements (call b))) \
         (string \"c\"))"
    );
}

#[test]
fn invalid_regexp_structure_is_diagnosed() {
    assert!(!parse_default("/(a/").errors.is_empty());
}

// ===== pattern matching =====

#[test]
fn hash_pattern_with_shorthand_binding() {
    assert_eq!(
        sexp("case x; in {a: 1, b:}; b; end"),
        "(case_match (call x) (in (hash_pattern (assoc (symbol a) (integer 1)) \
         (assoc (symbol b))) (statements (local_variable_read b))))"
    );
}

#[test]
fn find_pattern() {
    assert_eq!(
        sexp("case x; in [*, 1, *post]; end"),
        "(case_match (call x) (in (find_pattern (splat) (integer 1) \
         (splat (local_variable_target post))) (statements)))"
    );
}

#[test]
fn alternation_and_capture_patterns() {
    assert_eq!(
        sexp("case x; in 1 | 2 => n; end"),
        "(case_match (call x) (in (capture_pattern (alternation_pattern (integer 1) \
         (integer 2)) (local_variable_target n)) (statements)))"
    );
}

#[test]
fn pin_patterns() {
    assert_eq!(
        sexp("y = 1\ncase x; in ^y; end"),
        "(local_variable_write y (integer 1))"
    );
    let full = program_sexp("y = 1\ncase x; in ^y; end");
    assert!(full.contains("(pinned_variable (local_variable_read y))"));
    let full = program_sexp("case x; in ^(1 + 2); end");
    assert!(full.contains("(pinned_expression (call + (integer 1) (arguments (integer 2))))"));
}

#[test]
fn pattern_guards() {
    let full = program_sexp("case x; in a if a; end");
    assert!(full.contains("(guard_if (local_variable_read a))"));
    let full = program_sexp("case x; in a unless a; end");
    assert!(full.contains("(guard_unless (local_variable_read a))"));
}

#[test]
fn match_predicate_and_match_required() {
    assert_eq!(
        sexp("x in [a]"),
        "(match_predicate (call x) (array_pattern (local_variable_target a)))"
    );
    assert_eq!(
        sexp("x => [a]"),
        "(match_required (call x) (array_pattern (local_variable_target a)))"
    );
}

#[test]
fn duplicate_pattern_captures_error() {
    assert!(error_ids("case x; in [a, a]; end")
        .contains(&DiagnosticId::PatternCaptureDuplicate));
    assert_no_errors("case x; in [_a, _a]; end");
}

#[test]
fn duplicate_pattern_keys_error() {
    assert!(error_ids("case x; in {a: 1, a: 2}; end")
        .contains(&DiagnosticId::PatternKeyDuplicate));
}

#[test]
fn extra_splats_in_array_pattern_error() {
    assert!(error_ids("case x; in [*a, 1, *b, *c]; end")
        .contains(&DiagnosticId::PatternRestDuplicate));
}

#[test]
fn pattern_range() {
    let full = program_sexp("case x; in 1..5; end");
    assert!(full.contains("(irange (integer 1) (integer 5))"));
}

// ===== implicit parameters =====

#[test]
fn numbered_parameters_bind_in_blocks() {
    let result = parse_default("foo { _1 + _2 }");
    assert!(result.errors.is_empty());
    assert!(result.node.to_sexp().contains("(local_variable_read _1)"));
}

#[test]
fn it_parameter_binds_in_blocks() {
    assert_no_errors("foo { it }");
}

#[test]
fn implicit_parameters_conflict_with_ordinary_ones() {
    assert!(error_ids("foo { |x| _1 }")
        .contains(&DiagnosticId::NumberedWithOrdinaryParameters));
    assert!(error_ids("foo { |x| it }").contains(&DiagnosticId::ItWithOrdinaryParameters));
}

#[test]
fn numbered_parameters_do_not_nest() {
    assert!(error_ids("foo { _1; bar { _1 } }")
        .contains(&DiagnosticId::NumberedInNestedBlocks));
}

#[test]
fn it_and_numbered_do_not_mix() {
    assert!(error_ids("foo { _1; it }").contains(&DiagnosticId::ItWithNumberedParameters));
}

// ===== scopes and warnings =====

#[test]
fn unused_local_warns() {
    let result = parse_default("x = 1");
    assert!(result
        .warnings
        .iter()
        .any(|d| d.id == DiagnosticId::UnusedLocalVariableWarning));

    // Underscore-prefixed names are exempt; -e suppresses the rest
    let result = parse_default("_x = 1");
    assert!(!result
        .warnings
        .iter()
        .any(|d| d.id == DiagnosticId::UnusedLocalVariableWarning));
    let options = Options {
        command_line: CommandLine::none().with(CommandLine::E),
        ..Options::default()
    };
    let result = parse(b"x = 1", &options);
    assert!(!result
        .warnings
        .iter()
        .any(|d| d.id == DiagnosticId::UnusedLocalVariableWarning));
}

#[test]
fn warn_indent_pragma_checks_end_columns() {
    let source = "# warn_indent: true\nif a\n  1\n  end";
    let result = parse_default(source);
    assert!(result
        .warnings
        .iter()
        .any(|d| d.id == DiagnosticId::IndentMismatchWarning));

    // Without the pragma the same source stays quiet
    let result = parse_default("if a\n  1\n  end");
    assert!(!result
        .warnings
        .iter()
        .any(|d| d.id == DiagnosticId::IndentMismatchWarning));
}

#[test]
fn block_scopes_see_outer_locals_method_scopes_do_not() {
    // Block reads the outer local: no "unused" warning for x
    let result = parse_default("x = 1\nfoo { x }");
    assert!(!result
        .warnings
        .iter()
        .any(|d| d.id == DiagnosticId::UnusedLocalVariableWarning));
    // Inside a def the outer x is invisible: x parses as a method call
    let full = program_sexp("x = 1\ndef f; x; end");
    assert!(full.contains("(def f (statements (call x)))"));
}

#[test]
fn seeded_outer_scopes_provide_locals() {
    let options = Options {
        scopes: vec![crate::OuterScope {
            locals: vec!["seeded".to_string()],
            ..crate::OuterScope::default()
        }],
        ..Options::default()
    };
    let result = parse(b"seeded", &options);
    assert_eq!(
        first_statement(&result).to_sexp(),
        "(local_variable_read seeded)"
    );
}

// ===== recovery =====

#[test]
fn missing_end_is_diagnosed_but_tree_survives() {
    let result = parse_default("if a; 1");
    assert!(result.errors.iter().any(|d| d.id == DiagnosticId::EndExpected));
    assert!(result.node.to_sexp().contains("(if (call a) (statements (integer 1)))"));
}

#[test]
fn unclosed_paren_recovers() {
    let result = parse_default("foo(1 +");
    assert!(!result.errors.is_empty());
    assert!(matches!(result.node.kind, NodeKind::Program { .. }));
}

#[test]
fn depth_cap_stops_descent() {
    // Deep recursion needs more stack than the default test thread provides
    let handle = std::thread::Builder::new()
        .stack_size(32 * 1024 * 1024)
        .spawn(|| {
            let mut source = String::new();
            for _ in 0..1100 {
                source.push('(');
            }
            source.push('1');
            for _ in 0..1100 {
                source.push(')');
            }
            parse_default(&source)
        })
        .expect("spawn");
    let result = handle.join().expect("join");
    assert!(result.errors.iter().any(|d| d.id == DiagnosticId::NestingTooDeep));
}

#[test]
fn garbage_still_returns_a_program() {
    let result = parse_default("@@@ ||| )))");
    assert!(!result.errors.is_empty());
    assert!(matches!(result.node.kind, NodeKind::Program { .. }));
}

// ===== entry points =====

#[test]
fn parse_success_reflects_errors() {
    assert!(parse_success(b"a = 1", &Options::default()));
    assert!(!parse_success(b"if a", &Options::default()));
}

#[test]
fn data_span_is_reported() {
    let source = b"a = 1\n__END__\npayload";
    let result = parse(source, &Options::default());
    let span = result.data_span.expect("__END__ span");
    assert_eq!(&source[span.start..span.end], b"__END__\npayload");
}

#[test]
fn newline_offsets_match_source() {
    let source = "a = 1\nb = <<EOS\nbody\nEOS\nc\n";
    let result = parse(source.as_bytes(), &Options::default());
    let expected: Vec<usize> = source
        .bytes()
        .enumerate()
        .filter(|(_, b)| *b == b'\n')
        .map(|(i, _)| i)
        .collect();
    assert_eq!(result.newline_offsets, expected);
}

#[test]
fn command_line_wrapping() {
    let options = Options {
        command_line: CommandLine::none().with(CommandLine::N),
        ..Options::default()
    };
    let result = parse(b"a", &options);
    assert_eq!(
        result.node.to_sexp(),
        "(program (statements (while (call gets) (statements (call a)))))"
    );

    let options = Options {
        command_line: CommandLine::none()
            .with(CommandLine::P)
            .with(CommandLine::A)
            .with(CommandLine::L),
        ..Options::default()
    };
    let result = parse(b"a", &options);
    let sexp = result.node.to_sexp();
    assert!(sexp.contains("(call print (arguments (global_variable_read $_)))"));
    assert!(sexp.contains("(global_variable_write $F"));
    assert!(sexp.contains("(assoc (symbol chomp) (true))"));
}

#[test]
fn parse_stream_waits_for_heredoc_terminator() {
    let lines = vec![
        b"x = <<EOS\n".to_vec(),
        b"body\n".to_vec(),
        b"EOS\n".to_vec(),
    ];
    let mut iter = lines.into_iter();
    let (buffer, result) = parse_stream(|| iter.next(), &Options::default());
    assert_eq!(buffer, b"x = <<EOS\nbody\nEOS\n".to_vec());
    assert!(result.errors.is_empty());
}

#[test]
fn parse_stream_stops_at_end_marker() {
    let lines = vec![b"a = 1\n".to_vec(), b"__END__\n".to_vec(), b"junk \" junk\n".to_vec()];
    let mut iter = lines.into_iter();
    let (_, result) = parse_stream(|| iter.next(), &Options::default());
    assert!(result.data_span.is_some());
}

// ===== properties =====

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Round trip: a double-quoted identifier-shaped slice parses to a
        /// single string node with the same bytes.
        #[test]
        fn string_literal_round_trip(word in "[A-Za-z_][A-Za-z0-9_]{0,20}") {
            let source = format!("\"{word}\"");
            let result = parse(source.as_bytes(), &Options::default());
            prop_assert!(result.errors.is_empty());
            let NodeKind::Program { statements, .. } = &result.node.kind else {
                return Err(TestCaseError::fail("no program"));
            };
            let NodeKind::Statements { body } = &statements.kind else {
                return Err(TestCaseError::fail("no statements"));
            };
            prop_assert_eq!(body.len(), 1);
            let NodeKind::String { value } = &body[0].kind else {
                return Err(TestCaseError::fail("not a string"));
            };
            prop_assert_eq!(value, &word);
        }

        /// The parser terminates on arbitrary printable input and always
        /// produces a program node. (Stack-balance invariants are enforced
        /// by debug assertions inside `parse`.)
        #[test]
        fn parser_always_returns_a_program(source in "[ -~\n]{0,160}") {
            let result = parse(source.as_bytes(), &Options::default());
            let is_program = matches!(result.node.kind, NodeKind::Program { .. });
            prop_assert!(is_program, "expected a Program node");
        }
    }
}
