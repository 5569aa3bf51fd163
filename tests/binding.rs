use askama_grammar::language::Grammar;
use askama_grammar::{LANGUAGE, Language, LanguageFn, LoadError, load_check};

fn missing_grammar() -> Option<&'static Grammar> {
    None
}

#[test]
fn can_load_grammar() {
    assert!(
        Language::new(LANGUAGE).is_ok(),
        "Error loading Askama grammar"
    );
}

#[test]
fn absent_grammar_reports_load_failure() {
    let err = load_check(LanguageFn::from_raw(missing_grammar)).expect_err("load should fail");
    assert_eq!(err, LoadError::LoadFailure);
    assert_eq!(err.to_string(), "Error loading Askama grammar");
}

#[test]
fn repeated_loads_are_independent() {
    let first = load_check(LANGUAGE).expect("first load");
    let second = load_check(LANGUAGE).expect("second load");
    assert_eq!(first, second);
    assert_eq!(first, askama_grammar::language());
    assert_eq!(second.name(), "askama");
}
