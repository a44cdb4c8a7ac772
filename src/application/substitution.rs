//! # Variable Substitution
//!
//! Resolves `${name}` tokens in rule templates and commands.
//! Message vars win over environment variables.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::domain::error::SubstitutionError;

static VAR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9_.]+)\}").expect("valid var regex"));

/// Replace every `${name}` in `template`, failing on the first name that resolves to nothing.
pub fn substitute(
    template: &str,
    vars: &HashMap<String, String>,
) -> Result<String, SubstitutionError> {
    let mut missing = None;
    let resolved = VAR_TOKEN.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match lookup(name, vars) {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(SubstitutionError { name }),
        None => Ok(resolved.into_owned()),
    }
}

/// Environment-only expansion. Unknown names expand to "" and are returned so the
/// caller can report them.
pub fn expand_env(text: &str) -> (String, Vec<String>) {
    let mut missing = Vec::new();
    let expanded = VAR_TOKEN.replace_all(text, |caps: &Captures| {
        let name = &caps[1];
        std::env::var(name).unwrap_or_else(|_| {
            missing.push(name.to_string());
            String::new()
        })
    });
    (expanded.into_owned(), missing)
}

fn lookup(name: &str, vars: &HashMap<String, String>) -> Option<String> {
    vars.get(name)
        .cloned()
        .or_else(|| std::env::var(name).ok())
}
