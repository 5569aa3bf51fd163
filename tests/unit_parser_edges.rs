use askama_grammar::language::{ABI_VERSION, Grammar};
use askama_grammar::{Language, LanguageFn, ParseError, Parser, language, parse_template};

fn expect_error(src: &str, code: &str, needle: &str) {
    let errs = parse_template(src).expect_err("parse should fail");
    assert!(
        errs.iter().any(|d| d.code == code && d.message.contains(needle)),
        "expected {code} containing {needle:?}, got {errs:?}"
    );
}

#[test]
fn parser_rejects_unknown_statement() {
    expect_error("{% unknown %}", "E-PARSE", "statement keyword");
    expect_error("{% as %}", "E-PARSE", "unknown statement 'as'");
}

#[test]
fn parser_rejects_empty_block_tag() {
    expect_error("{% %}", "E-PARSE", "empty block tag");
}

#[test]
fn parser_rejects_incomplete_expression() {
    expect_error("{{ a + }}", "E-PARSE", "found end of tag");
    expect_error("{{ }}", "E-PARSE", "expected expression");
}

#[test]
fn parser_rejects_trailing_tokens() {
    expect_error("{% endblock a b %}", "E-PARSE", "expected end of tag");
}

#[test]
fn parser_rejects_unknown_characters() {
    expect_error("{{ a @ b }}", "E-PARSE", "unexpected character '@'");
}

#[test]
fn parser_rejects_call_without_macro_call() {
    expect_error("{% call foo %}", "E-PARSE", "call expects a macro call");
}

#[test]
fn lexer_reports_unclosed_constructs() {
    expect_error("{% if x", "E-LEX", "unclosed tag");
    expect_error("text {# never closed", "E-LEX", "unclosed comment");
    expect_error("{# a {# b #}", "E-LEX", "unclosed comment");
    expect_error(r#"{{ "abc }}"#, "E-LEX", "unterminated string literal");
}

#[test]
fn errors_carry_line_and_column() {
    let errs = parse_template("line one\n{{ a @ b }}").expect_err("parse should fail");
    let span = errs[0].span.as_ref().expect("span");
    assert_eq!(span.line, 2);
    assert_eq!(span.column, 6);
    assert!(errs[0].to_string().starts_with("E-PARSE: unexpected character '@' at 2:6"));
}

#[test]
fn malformed_tag_becomes_error_node_and_parsing_continues() {
    let mut parser = Parser::new();
    parser.set_language(&language()).expect("language");
    let src = "{{ + }} ok {{ x }}";
    let tree = parser.parse(src).expect("parse");

    assert_eq!(tree.to_sexp(), "(source (ERROR) (content) (render_expression (identifier)))");
    assert!(tree.has_error());
    assert!(tree.root_node().has_error());
    assert_eq!(tree.errors().len(), 1);

    let error = tree.root_node().named_child(0).expect("error node");
    assert!(error.is_error());
    assert_eq!(error.utf8_text(src), "{{ + }}");
}

#[test]
fn every_malformed_tag_gets_its_own_diagnostic() {
    let errs = parse_template("{% bogus %}{{ ok }}{{ ) }}").expect_err("parse should fail");
    assert_eq!(errs.len(), 2);
}

#[test]
fn parser_without_language_refuses_to_parse() {
    let mut parser = Parser::new();
    assert_eq!(parser.parse("x").expect_err("no language"), ParseError::NoLanguage);
}

#[test]
fn unterminated_string_recovers_at_closer() {
    let mut parser = Parser::new();
    parser.set_language(&language()).expect("language");
    let tree = parser.parse(r#"{{ "abc }} after"#).expect("parse");
    assert_eq!(tree.to_sexp(), "(source (ERROR) (content))");
}

#[test]
fn lexer_keeps_string_error_when_tag_runs_to_eof() {
    expect_error("{{ \"é", "E-LEX", "unterminated string literal");
    let errs = parse_template("{{ \"é").expect_err("parse should fail");
    assert_eq!(errs.len(), 1);
}

#[test]
fn deeply_nested_parentheses_fail_the_tag() {
    let depth = 100_000;
    let src = format!("{{{{ {}a{} }}}}", "(".repeat(depth), ")".repeat(depth));
    expect_error(&src, "E-PARSE", "expression nested too deeply");
}

#[test]
fn long_postfix_chain_fails_the_tag() {
    let src = format!("{{{{ a{} }}}}", ".b".repeat(200_000));
    expect_error(&src, "E-PARSE", "expression nested too deeply");

    let src = format!("{{{{ a{} }}}}", "::b".repeat(200_000));
    expect_error(&src, "E-PARSE", "expression nested too deeply");
}

#[test]
fn deeply_nested_patterns_fail_the_tag() {
    let depth = 50_000;
    let src = format!("{{% let {}x{} = y %}}", "(".repeat(depth), ")".repeat(depth));
    expect_error(&src, "E-PARSE", "expression nested too deeply");
}

#[test]
fn moderate_nesting_still_parses() {
    let src = format!("{{{{ {}a{} }}}}", "(".repeat(64), ")".repeat(64));
    let tree = parse_template(&src).expect("64 levels parse");
    assert!(!tree.has_error());
    assert_eq!(
        tree.root_node().walk().filter(|n| n.kind() == "parenthesized_expression").count(),
        64
    );
}

#[test]
fn nesting_error_is_local_to_its_tag() {
    let mut parser = Parser::new();
    parser.set_language(&language()).expect("language");
    let src = format!("{{{{ {}a }}}}{{{{ ok }}}}", "(".repeat(1_000));
    let tree = parser.parse(&src).expect("parse");
    assert_eq!(tree.to_sexp(), "(source (ERROR) (render_expression (identifier)))");
    assert_eq!(tree.language(), language());
}

static OLDER_ABI: Grammar = Grammar {
    name: "askama",
    abi_version: ABI_VERSION - 1,
    node_kinds: &[],
    fields: &[],
    node_fields: &[],
};

fn older_grammar() -> Option<&'static Grammar> {
    Some(&OLDER_ABI)
}

#[test]
fn parser_rejects_grammar_with_other_abi() {
    let older = Language::new(LanguageFn::from_raw(older_grammar)).expect("present grammar");
    let mut parser = Parser::new();
    assert_eq!(
        parser.set_language(&older),
        Err(ParseError::IncompatibleLanguage {
            found: ABI_VERSION - 1,
            expected: ABI_VERSION,
        })
    );
    assert_eq!(parser.parse("x").expect_err("no language"), ParseError::NoLanguage);
}
