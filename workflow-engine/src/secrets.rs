// Secret handling
// Opaque credential values, resolved per instance and redacted from output

use std::collections::HashMap;
use std::fmt;

/// Environment prefix used to pick up secrets from the process environment
pub const SECRET_ENV_PREFIX: &str = "GANTRY_SECRET_";

/// A resolved secret. Display and Debug never reveal the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for injection into an instance environment
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue(***)")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

/// Read-only store of named secrets for one run
#[derive(Debug, Clone, Default)]
pub struct SecretStore {
    values: HashMap<String, SecretValue>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from explicit name/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), SecretValue::new(v)))
            .collect();
        Self { values }
    }

    /// Pick up GANTRY_SECRET_* variables from the process environment
    pub fn from_env() -> Self {
        let values = std::env::vars()
            .filter_map(|(k, v)| {
                k.strip_prefix(SECRET_ENV_PREFIX)
                    .map(|name| (name.to_string(), SecretValue::new(v)))
            })
            .collect();
        Self { values }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), SecretValue::new(value));
    }

    /// Resolve a secret by name
    pub fn resolve(&self, name: &str) -> Option<&SecretValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every secret value occurring in the text with `***`.
    /// Applied to all captured output before it reaches events or results.
    pub fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for secret in self.values.values() {
            if !secret.0.is_empty() {
                redacted = redacted.replace(&secret.0, "***");
            }
        }
        redacted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_value_never_prints() {
        let secret = SecretValue::new("hunter2");
        assert_eq!(format!("{}", secret), "***");
        assert_eq!(format!("{:?}", secret), "SecretValue(***)");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_resolve_and_redact() {
        let store = SecretStore::from_pairs([("REGISTRY_TOKEN", "tok-abc123")]);

        assert!(store.resolve("REGISTRY_TOKEN").is_some());
        assert!(store.resolve("OTHER").is_none());

        let output = "uploading with token tok-abc123 done";
        assert_eq!(store.redact(output), "uploading with token *** done");
    }

    #[test]
    fn test_redact_multiple_occurrences() {
        let mut store = SecretStore::new();
        store.insert("A", "aaa");
        store.insert("B", "bbb");

        assert_eq!(store.redact("aaa bbb aaa"), "*** *** ***");
    }

    #[test]
    fn test_empty_secret_does_not_corrupt_output() {
        let store = SecretStore::from_pairs([("EMPTY", "")]);
        assert_eq!(store.redact("plain text"), "plain text");
    }
}
