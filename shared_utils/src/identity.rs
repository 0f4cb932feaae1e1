//! Contact identifier normalization.
//!
//! - [`normalize_phone`]: digits-only canonical form, US country code stripped.
//! - [`to_e164`]: `+1XXXXXXXXXX` form used on the wire and before hashing.
//! - [`hash_identity`]: trimmed, lowercased SHA-256 hex digest for
//!   privacy-preserving matching.
//!
//! Everything here is pure and never fails; unusable input yields an empty
//! string or `None`.

use sha2::{Digest, Sha256};

/// Canonicalize a phone number to its national digits.
///
/// Non-digits are dropped; an 11-digit number with a leading `1` loses the
/// country code. Input without any digit yields an empty string.
///
/// ```
/// use shared_utils::identity::normalize_phone;
///
/// assert_eq!(normalize_phone("(555) 123-4567"), "5551234567");
/// assert_eq!(normalize_phone("15551234567"), "5551234567");
/// assert_eq!(normalize_phone("n/a"), "");
/// ```
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('1') {
        Some(national) if digits.len() == 11 => national.to_string(),
        _ => digits,
    }
}

/// E.164 rendering of a phone number, or `None` when nothing is left after
/// normalization. Ten-digit national numbers get the `+1` prefix; anything
/// else is passed through with a bare `+`.
pub fn to_e164(raw: &str) -> Option<String> {
    let national = normalize_phone(raw);
    match national.len() {
        0 => None,
        10 => Some(format!("+1{national}")),
        _ => Some(format!("+{national}")),
    }
}

/// SHA-256 of the trimmed, lowercased value as lowercase hex.
///
/// Returns `None` for empty or whitespace-only input so callers can tell
/// "no identifier" apart from "digest of nothing".
pub fn hash_identity(value: &str) -> Option<String> {
    let normalized = value.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    Some(hex::encode(hasher.finalize()))
}
