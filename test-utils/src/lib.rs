//! In-process test harness for Dana source: builds an `Interpreter`, runs a
//! program, and asserts on its result or on the error it raises.

use dana::{Config, Interpreter, Value};

/// Runs `source` against a fresh interpreter and asserts the program's
/// final expression value matches `expected`.
pub fn check_run(source: &str, expected: Value) {
    let mut interp = Interpreter::new(Config::default());
    let result = interp
        .run(source)
        .unwrap_or_else(|e| panic!("program failed: {e}\nsource:\n{source}"));
    assert_eq!(result, expected, "source:\n{source}");
}

/// Runs `source` and asserts it fails with an error whose `kind()` matches
/// `expected_kind` (e.g. `"TypeError"`, `"ResourceNotActive"`).
pub fn check_error(source: &str, expected_kind: &str) {
    let mut interp = Interpreter::new(Config::default());
    match interp.run(source) {
        Ok(value) => panic!(
            "expected a '{expected_kind}' error, program returned {value:?}\nsource:\n{source}"
        ),
        Err(err) => assert_eq!(err.kind(), expected_kind, "source:\n{source}"),
    }
}

/// Builds an interpreter configured with a deterministic mock LLM response,
/// for scenarios that exercise `reason()` (spec.md section 8.4 Scenario E).
pub fn interpreter_with_mock_llm(response: &str) -> Interpreter {
    let mut config = Config::default();
    config.llm.mock = Some(response.to_string());
    Interpreter::new(config)
}
