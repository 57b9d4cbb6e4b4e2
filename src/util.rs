//! Shared utility helpers.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest identifier the target database accepts.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Case-insensitive equality without allocating.
#[inline]
pub fn eq_ci(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().eq_ignore_ascii_case(b.as_bytes())
}

/// Key used for case-insensitive name sets.
#[inline]
pub fn name_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Check that `name` is usable as a target identifier.
///
/// Returns the reason when it is not.
pub fn check_identifier(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("name must not be empty");
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err("name is longer than 128 characters");
    }
    if !IDENTIFIER_RE.is_match(name) {
        return Err("name must start with a letter and contain only letters, digits and '_'");
    }
    Ok(())
}
