//! Symbolic path macros (`$APP_CONFIG$`, `$MODULE_DIR$`, ...).
//!
//! Macros are kept as a flat ordered list and resolved at lookup time, so a
//! macro value may reference other macros and a replaced table is visible
//! immediately.
use std::fmt;

use crate::kernel::error::Result;
use crate::storage::error::StorageSystemError;

/// One `key -> value` entry; `key` includes the surrounding `$` signs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub key: String,
    pub value: String,
}

impl Macro {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Expands and collapses macro-parameterized paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroPathResolver {
    macros: Vec<Macro>,
}

impl MacroPathResolver {
    pub fn new(macros: Vec<Macro>) -> Self {
        Self { macros }
    }

    pub fn macros(&self) -> &[Macro] {
        &self.macros
    }

    /// Replace the whole table
    pub fn set_macros(&mut self, macros: Vec<Macro>) {
        self.macros = macros;
    }

    /// Registered value of `key`, unexpanded
    pub fn get(&self, key: &str) -> Option<&str> {
        self.macros
            .iter()
            .find(|m| m.key == key)
            .map(|m| m.value.as_str())
    }

    /// Replace every `$NAME$` token in `path` with its (recursively expanded)
    /// value.
    ///
    /// An unknown token, or a macro whose value refers back to itself, fails
    /// with [`StorageSystemError::UnresolvedMacro`].
    pub fn expand(&self, path: &str) -> Result<String> {
        let mut stack = Vec::new();
        self.expand_with(path, path, &mut stack)
    }

    fn expand_with(&self, input: &str, origin: &str, stack: &mut Vec<String>) -> Result<String> {
        let mut expanded = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find('$') {
            expanded.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let token_end = after.find('$').filter(|end| is_macro_name(&after[..*end]));
            let Some(end) = token_end else {
                expanded.push('$');
                rest = after;
                continue;
            };

            let token = &rest[start..start + end + 2];
            if stack.iter().any(|open| open == token) {
                return Err(self.unresolved(token, origin));
            }
            let value = self.get(token).ok_or_else(|| self.unresolved(token, origin))?;

            stack.push(token.to_string());
            let value = self.expand_with(value, origin, stack)?;
            stack.pop();

            expanded.push_str(&value);
            rest = &after[end + 1..];
        }
        expanded.push_str(rest);
        Ok(expanded)
    }

    /// Replace the longest macro value that prefixes `path` (at a path
    /// component boundary) with its key. Paths no macro covers come back
    /// unchanged, with separators normalized to `/`.
    pub fn collapse(&self, path: &str) -> String {
        let path = normalize_separators(path);
        let mut best: Option<(&str, String)> = None;
        for entry in &self.macros {
            let Ok(value) = self.expand(&entry.value) else {
                continue;
            };
            let value = normalize_separators(&value);
            let value = value.trim_end_matches('/').to_string();
            if value.is_empty() || !covers(&value, &path) {
                continue;
            }
            let longer = best
                .as_ref()
                .map(|(_, current)| value.len() > current.len())
                .unwrap_or(true);
            if longer {
                best = Some((entry.key.as_str(), value));
            }
        }

        match best {
            Some((key, value)) => format!("{key}{}", &path[value.len()..]),
            None => path,
        }
    }

    fn unresolved(&self, token: &str, origin: &str) -> crate::kernel::error::Error {
        StorageSystemError::UnresolvedMacro {
            macro_name: token.to_string(),
            path: origin.to_string(),
            known: self.to_string(),
        }
        .into()
    }
}

impl fmt::Display for MacroPathResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.macros.is_empty() {
            return write!(f, "<none>");
        }
        for (index, entry) in self.macros.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", entry.key, entry.value)?;
        }
        Ok(())
    }
}

/// File specs are always `/`-separated and relative to their macro root
pub fn validate_file_spec(spec: &str) -> Result<()> {
    let reason = if spec.is_empty() {
        Some("file spec is empty")
    } else if spec.contains('\\') {
        Some("file specs must use '/' as separator")
    } else if spec.split('/').any(|part| part == "..") {
        Some("file specs must not escape their root")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(StorageSystemError::InvalidFileSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

/// True when `path` contains a `$NAME$` token
pub fn contains_macro(path: &str) -> bool {
    let mut rest = path;
    while let Some(start) = rest.find('$') {
        let after = &rest[start + 1..];
        match after.find('$') {
            Some(end) if is_macro_name(&after[..end]) => return true,
            Some(_) | None => rest = after,
        }
    }
    false
}

fn is_macro_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

fn covers(prefix: &str, path: &str) -> bool {
    path == prefix || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
}
