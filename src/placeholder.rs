//! Deferred placeholders inside extra options.
//!
//! Two forms are recognised:
//!
//! - `%[[ env.KEY ]]` resolves to the environment variable `KEY`
//! - `%[[ secrets.KEY ]]` resolves to the entry `KEY` of the secrets table
//!
//! Whitespace around the dotted key is optional. A placeholder whose key is
//! unknown is emitted unchanged; option strings may legitimately contain the
//! syntax for unrelated reasons, so this never fails.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{PhasebookError, Result};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%\[\[\s*(env|secrets)\.(\w+)\s*\]\]").expect("placeholder pattern is valid")
});

/// Lookup tables placeholders resolve against.
///
/// The environment is captured once at run start and threaded through
/// explicitly, so resolution is a pure rewrite.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    env: HashMap<String, String>,
    secrets: HashMap<String, String>,
}

impl Placeholders {
    pub fn new(env: HashMap<String, String>, secrets: HashMap<String, String>) -> Self {
        Self { env, secrets }
    }

    /// Snapshot the current process environment alongside `secrets`.
    pub fn from_process_env(secrets: HashMap<String, String>) -> Self {
        Self::new(std::env::vars().collect(), secrets)
    }

    /// Replace every placeholder in `input` in one left-to-right pass.
    pub fn resolve(&self, input: &str) -> String {
        PLACEHOLDER
            .replace_all(input, |caps: &Captures| {
                let table = match &caps[1] {
                    "env" => &self.env,
                    _ => &self.secrets,
                };
                match table.get(&caps[2]) {
                    Some(value) => value.clone(),
                    None => {
                        tracing::debug!("Leaving unresolved placeholder {}", &caps[0]);
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }
}

/// Decode the JSON-encoded secrets object.
///
/// An empty input means "no secrets". Anything other than a flat object of
/// string values is rejected.
pub fn parse_secrets(json: &str) -> Result<HashMap<String, String>> {
    if json.trim().is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(json).map_err(|e| PhasebookError::Secrets(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholders() -> Placeholders {
        let env = HashMap::from([
            ("HOME".to_string(), "/home/runner".to_string()),
            ("EMPTY".to_string(), String::new()),
        ]);
        let secrets = HashMap::from([
            ("GCP_USER_1".to_string(), "b".to_string()),
            ("secret1".to_string(), "c".to_string()),
        ]);
        Placeholders::new(env, secrets)
    }

    #[test]
    fn test_resolves_env_and_secrets() {
        let p = placeholders();
        assert_eq!(
            p.resolve("-e user=%[[ secrets.GCP_USER_1 ]] -e home=%[[env.HOME]]"),
            "-e user=b -e home=/home/runner"
        );
    }

    #[test]
    fn test_resolves_repeated_occurrences() {
        let p = placeholders();
        assert_eq!(
            p.resolve("%[[ secrets.secret1 ]]-%[[ secrets.secret1 ]]"),
            "c-c"
        );
    }

    #[test]
    fn test_missing_secret_left_verbatim() {
        let p = placeholders();
        assert_eq!(
            p.resolve("-e token=%[[ secrets.MISSING ]]"),
            "-e token=%[[ secrets.MISSING ]]"
        );
    }

    #[test]
    fn test_missing_next_to_resolved() {
        let p = placeholders();
        assert_eq!(
            p.resolve("%[[ env.NOPE ]] %[[ secrets.secret1 ]]"),
            "%[[ env.NOPE ]] c"
        );
    }

    #[test]
    fn test_empty_env_value_counts_as_set() {
        let p = placeholders();
        assert_eq!(p.resolve("x=%[[ env.EMPTY ]]"), "x=");
    }

    #[test]
    fn test_unknown_namespace_untouched() {
        let p = placeholders();
        assert_eq!(p.resolve("%[[ vars.HOME ]]"), "%[[ vars.HOME ]]");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let secrets = HashMap::from([("A".to_string(), "%[[ secrets.B ]]".to_string())]);
        let secrets_b = HashMap::from([("B".to_string(), "no".to_string())]);
        let mut all = secrets;
        all.extend(secrets_b);
        let p = Placeholders::new(HashMap::new(), all);
        assert_eq!(p.resolve("%[[ secrets.A ]]"), "%[[ secrets.B ]]");
    }

    #[test]
    fn test_parse_secrets() {
        let secrets = parse_secrets(r#"{"GCP_USER_1": "b", "secret1": "c"}"#).unwrap();
        assert_eq!(secrets.get("secret1").map(String::as_str), Some("c"));
        assert!(parse_secrets("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_secrets_rejects_malformed() {
        assert!(matches!(
            parse_secrets("{not json"),
            Err(PhasebookError::Secrets(_))
        ));
        assert!(matches!(
            parse_secrets(r#"{"nested": {"a": 1}}"#),
            Err(PhasebookError::Secrets(_))
        ));
    }
}
