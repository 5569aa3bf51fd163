use askama_grammar::{Config, Syntax, parse_template_with_syntax};

const ANGLE_CONFIG: &str = r##"
[general]
default_syntax = "angle"
dirs = ["templates"]

[[syntax]]
name = "angle"
block_start = "<%"
block_end = "%>"
expr_start = "<<"
expr_end = ">>"
comment_start = "<#"
comment_end = "#>"
"##;

fn expect_config_error(src: &str, needle: &str) {
    let errs = Config::from_toml_str(src).expect_err("config should fail");
    assert!(errs.iter().all(|d| d.code == "E-CONFIG"));
    assert!(
        errs.iter().any(|d| d.message.contains(needle)),
        "expected {needle:?} in {errs:?}"
    );
}

#[test]
fn empty_config_uses_default_syntax() {
    let config = Config::from_toml_str("").expect("empty config");
    assert_eq!(config.default_syntax(), &Syntax::default());
    assert_eq!(config.syntaxes().len(), 1);
}

#[test]
fn config_selects_custom_default_syntax() {
    let config = Config::from_toml_str(ANGLE_CONFIG).expect("config");
    let syntax = config.default_syntax();
    assert_eq!(syntax.name, "angle");
    assert_eq!(syntax.block_start, "<%");
    assert!(config.syntax("default").is_some());
}

#[test]
fn unset_delimiters_fall_back_to_defaults() {
    let config = Config::from_toml_str(
        r#"
        [[syntax]]
        name = "dollar"
        expr_start = "${"
        expr_end = "}$"
        "#,
    )
    .expect("config");
    let syntax = config.syntax("dollar").expect("dollar syntax");
    assert_eq!(syntax.expr_start, "${");
    assert_eq!(syntax.block_start, "{%");
    assert_eq!(config.default_syntax().name, "default");
}

#[test]
fn custom_syntax_drives_the_parser() {
    let config = Config::from_toml_str(ANGLE_CONFIG).expect("config");
    let src = "<% if x %>a<< y >><# note #>{{ literal }}";
    let tree = parse_template_with_syntax(src, config.default_syntax()).expect("parse");
    assert_eq!(
        tree.to_sexp(),
        "(source (control_tag (if_statement condition: (identifier))) (content) (render_expression (identifier)) (comment) (content))"
    );
}

#[test]
fn config_rejects_short_delimiters() {
    expect_config_error(
        "[[syntax]]\nname = \"x\"\nblock_start = \"<\"",
        "block_start must be at least 2 characters",
    );
}

#[test]
fn config_rejects_whitespace_in_delimiters() {
    expect_config_error(
        "[[syntax]]\nname = \"x\"\nexpr_end = \"} }\"",
        "must not contain whitespace",
    );
}

#[test]
fn config_rejects_ambiguous_start_delimiters() {
    expect_config_error(
        "[[syntax]]\nname = \"x\"\nblock_start = \"{{\"",
        "must not share a prefix",
    );
}

#[test]
fn config_rejects_reserved_and_duplicate_names() {
    expect_config_error("[[syntax]]\nname = \"default\"", "reserved");
    expect_config_error(
        "[[syntax]]\nname = \"a\"\n[[syntax]]\nname = \"a\"",
        "defined more than once",
    );
}

#[test]
fn config_rejects_unknown_default_syntax() {
    expect_config_error("[general]\ndefault_syntax = \"nope\"", "not a defined syntax");
}

#[test]
fn config_rejects_malformed_toml() {
    expect_config_error("[[syntax]\nname =", "invalid askama config");
    expect_config_error("[[syntax]]\nname = \"x\"\nbogus = 1", "invalid askama config");
}
