//! Utility functions: phone normalization and subject hashing.

use sha2::{Digest, Sha256};

/// Number of digits in a canonical national mobile number.
pub const NATIONAL_PHONE_DIGITS: usize = 10;

/// Normalize a phone number to the canonical national mobile format.
///
/// Accepts separators (spaces, dashes, dots, parentheses) and the `+66` /
/// `66` country prefix. The result is ten digits starting with `06`, `08`
/// or `09`.
///
/// # Examples
///
/// ```
/// use voting_core::utils::normalize_phone;
///
/// assert_eq!(normalize_phone("081-234-5678").as_deref(), Some("0812345678"));
/// assert_eq!(normalize_phone("+66 81 234 5678").as_deref(), Some("0812345678"));
/// assert_eq!(normalize_phone("021234567"), None); // landline
/// ```
#[must_use]
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let has_plus = trimmed.starts_with('+');

    let mut digits = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            '+' if i == 0 => {}
            _ => return None,
        }
    }

    let national = if let Some(rest) = digits.strip_prefix("66") {
        if has_plus || digits.len() == NATIONAL_PHONE_DIGITS + 1 {
            format!("0{rest}")
        } else {
            digits
        }
    } else if has_plus {
        // Only the Thai country code is accepted
        return None;
    } else {
        digits
    };

    let valid_prefix = ["06", "08", "09"]
        .iter()
        .any(|prefix| national.starts_with(prefix));

    (national.len() == NATIONAL_PHONE_DIGITS && valid_prefix).then_some(national)
}

/// Count Unicode code points.
#[must_use]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Privacy-preserving digest of a client identifier (e.g. an IP address).
///
/// Returns lowercase hex SHA-256 of `salt || ":" || raw`.
///
/// # Examples
///
/// ```
/// use voting_core::utils::hash_subject;
///
/// let a = hash_subject("203.0.113.7", "salt");
/// assert_eq!(a.len(), 64);
/// assert_ne!(a, hash_subject("203.0.113.8", "salt"));
/// assert!(!a.contains("203.0.113.7"));
/// ```
#[must_use]
pub fn hash_subject(raw: &str, salt: &str) -> String {
    hex_digest(&[salt.as_bytes(), b":", raw.as_bytes()])
}

/// Lowercase hex SHA-256 over the concatenation of `parts`.
#[must_use]
pub fn hex_digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
