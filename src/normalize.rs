//! Identifier canonicalization for meter numbers and fiber station ids.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Any spelling of the station marker at the start: "ТП", "тп-", "TP ", "ТП-"
    static ref STATION_MARKER: Regex =
        Regex::new(r"(?i)^\s*(?:тп|tp)[\s\-]*").expect("Station marker pattern should be valid");
}

/// Strip leading zeros from a meter number; an all-zero or empty input becomes `"0"`.
///
/// Used on both sides of a comparison, so `"007"`, `"7"` and `"0007"` all meet at `"7"`.
pub fn normalize_identifier(raw: &str) -> String {
    let stripped = raw.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

/// Whether the text looks like a meter number (ASCII digits only, after trimming)
pub fn is_numeric_identifier(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Canonical form of a fiber station id: upper-cased with exactly one `prefix`.
///
/// `"12"`, `"тп 12"`, `"ТП12"` and `"ТП-12"` all become `"ТП-12"` with the default prefix.
pub fn canonical_station_id(raw: &str, prefix: &str) -> String {
    let upper = raw.trim().to_uppercase();
    let prefix_upper = prefix.to_uppercase();
    if upper.starts_with(&prefix_upper) {
        return upper;
    }
    let body = STATION_MARKER.replace(&upper, "");
    format!("{}{}", prefix_upper, body.trim())
}
