use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

#[test]
fn cli_load_reports_ok() {
    let mut cmd = cargo_bin_cmd!("askama-grammar");
    cmd.arg("load");
    cmd.assert().success().stdout(predicate::str::contains("ok"));
}

#[test]
fn cli_parse_prints_sexp() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("page.html");
    fs::write(&path, "<h1>{{ title|upper }}</h1>\n{% if user %}hi{% endif %}\n").expect("write");

    let mut cmd = cargo_bin_cmd!("askama-grammar");
    cmd.arg("parse").arg(&path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "(source (content) (render_expression (filter_expression",
        ))
        .stdout(predicate::str::contains("(if_statement condition: (identifier))"));
}

#[test]
fn cli_parse_fails_on_syntax_error() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.html");
    fs::write(&path, "{% frobnicate %}").expect("write");

    let mut cmd = cargo_bin_cmd!("askama-grammar");
    cmd.arg("parse").arg(&path);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("(source (ERROR))"))
        .stderr(predicate::str::contains("E-PARSE"))
        .stderr(predicate::str::contains("bad.html"));
}

#[test]
fn cli_check_accepts_multiple_files() {
    let dir = tempdir().expect("tempdir");
    let a = dir.path().join("a.html");
    let b = dir.path().join("b.html");
    fs::write(&a, "{% extends \"base.html\" %}").expect("write a");
    fs::write(&b, "{% for x in xs %}{{ x }}{% endfor %}").expect("write b");

    let mut cmd = cargo_bin_cmd!("askama-grammar");
    cmd.arg("check").arg(&a).arg(&b);
    cmd.assert().success().stdout(predicate::str::contains("ok"));
}

#[test]
fn cli_check_reports_errors_per_file() {
    let dir = tempdir().expect("tempdir");
    let good = dir.path().join("good.html");
    let bad = dir.path().join("bad.html");
    fs::write(&good, "{{ x }}").expect("write good");
    fs::write(&bad, "{{ x").expect("write bad");

    let mut cmd = cargo_bin_cmd!("askama-grammar");
    cmd.arg("check").arg(&good).arg(&bad);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("bad.html: E-LEX: unclosed tag"));
}

#[test]
fn cli_returns_one_for_missing_file() {
    let mut cmd = cargo_bin_cmd!("askama-grammar");
    cmd.arg("check").arg("/tmp/non-existent-askama-template.html");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("E-IO"));
}

#[test]
fn cli_uses_syntax_from_config() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("askama.toml");
    fs::write(
        &config,
        r#"
[[syntax]]
name = "angle"
block_start = "<%"
block_end = "%>"
expr_start = "<<"
expr_end = ">>"
"#,
    )
    .expect("write config");
    let path = dir.path().join("t.html");
    fs::write(&path, "<% if a %><< b >>").expect("write template");

    let mut cmd = cargo_bin_cmd!("askama-grammar");
    cmd.arg("parse")
        .arg(&path)
        .arg("--config")
        .arg(&config)
        .arg("--syntax")
        .arg("angle");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("(control_tag (if_statement"))
        .stdout(predicate::str::contains("(render_expression (identifier))"));
}

#[test]
fn cli_rejects_unknown_syntax_name() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("t.html");
    fs::write(&path, "{{ a }}").expect("write");

    let mut cmd = cargo_bin_cmd!("askama-grammar");
    cmd.arg("check").arg(&path).arg("--syntax").arg("angle");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("E-CONFIG: unknown syntax 'angle'"));
}

#[test]
fn cli_rejects_invalid_config() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("askama.toml");
    fs::write(&config, "[[syntax]]\nname = \"default\"\n").expect("write config");
    let path = dir.path().join("t.html");
    fs::write(&path, "{{ a }}").expect("write");

    let mut cmd = cargo_bin_cmd!("askama-grammar");
    cmd.arg("check").arg(&path).arg("--config").arg(&config);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("E-CONFIG"))
        .stderr(predicate::str::contains("askama.toml"));
}

#[test]
fn cli_node_types_prints_json() {
    let mut cmd = cargo_bin_cmd!("askama-grammar");
    let output = cmd.arg("node-types").output().expect("run");
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).expect("json");
    let kinds: Vec<&str> = value
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|e| e["type"].as_str())
        .collect();
    assert!(kinds.contains(&"render_expression"));
    assert!(kinds.contains(&"{{"));
}

#[test]
fn cli_verbose_logs_parse_summary() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("t.html");
    fs::write(&path, "{{ a }}").expect("write");

    let mut cmd = cargo_bin_cmd!("askama-grammar");
    cmd.arg("--verbose").arg("parse").arg(&path);
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("parsed template"));
}
