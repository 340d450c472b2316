//! Typed values of the configuration model.

use std::collections::HashSet;
use std::fmt;

/// Ordered list of values of a multi-value key.
///
/// Only built from TOML arrays, a scalar is rejected while loading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueList(Vec<String>);

impl ValueList {
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a ValueList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for ValueList {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<String> for ValueList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Non-empty list of unique database names.
///
/// Every name is usable as a file name: it contains no path separator.
/// Entries are expected trimmed and non-blank, as produced by loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseNames(ValueList);

impl DatabaseNames {
    pub fn new(names: ValueList) -> Result<Self, String> {
        if names.is_empty() {
            return Err("at least one database is required".to_string());
        }

        let mut seen = HashSet::new();
        for name in &names {
            if name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(format!("'{name}' is not a valid database name"));
            }
            if !seen.insert(name.as_str()) {
                return Err(format!("database '{name}' is listed twice"));
            }
        }

        Ok(Self(names))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a DatabaseNames {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A secret that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(values: &[&str]) -> ValueList {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn database_names_keep_their_order() {
        let names = DatabaseNames::new(list(&["wiki", "app", "blog"])).unwrap();

        let collected: Vec<_> = names.iter().map(String::as_str).collect();
        assert_eq!(collected, ["wiki", "app", "blog"]);
    }

    #[test]
    fn database_names_reject_empty_duplicates_and_paths() {
        assert!(DatabaseNames::new(list(&[])).is_err());
        assert!(DatabaseNames::new(list(&["app", "app"])).is_err());
        assert!(DatabaseNames::new(list(&["../etc"])).is_err());
        assert!(DatabaseNames::new(list(&[".."])).is_err());
    }

    #[test]
    fn secrets_are_redacted() {
        let secret = Secret::new("hunter2");

        assert_eq!(format!("{secret:?}"), "Secret(***)");
        assert_eq!(secret.expose(), "hunter2");
    }
}
