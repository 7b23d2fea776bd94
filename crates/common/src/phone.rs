//! Phone-number normalization for personal targets.
//!
//! Group identifiers are never normalized; callers must check
//! [`crate::is_group_address`] first.

/// Country code substituted for a local trunk prefix (`0...`).
pub const DEFAULT_COUNTRY_CODE: &str = "62";

/// Normalize a raw operator-supplied number to canonical digits.
///
/// Strips every non-digit character, then rewrites a leading `0` (the local
/// trunk prefix) to `country_code`. Already-canonical numbers pass through
/// unchanged.
pub fn normalize_number(raw: &str, country_code: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('0') {
        Some(rest) => format!("{country_code}{rest}"),
        None => digits,
    }
}
