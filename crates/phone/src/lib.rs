//! Phone number normalization.
//!
//! Every recipient passes through [`normalize`] before it is handed to the
//! upstream provider or billed. Inbound sender numbers are normalized the same
//! way so conversation lookups compare like with like.
//!
//! # Example
//!
//! ```
//! let e164 = phone::normalize("(415) 555-1234", "+1");
//! assert_eq!(e164.as_deref(), Some("+14155551234"));
//!
//! let batch = phone::normalize_many(&["4155551234", "not-a-number"], "+1");
//! assert_eq!(batch.ok, vec!["+14155551234".to_string()]);
//! assert_eq!(batch.invalid, vec!["not-a-number".to_string()]);
//! ```

use std::collections::HashSet;

use serde::Serialize;

/// Minimum number of digits in an E.164 number (excluding `+`).
pub const MIN_E164_DIGITS: usize = 8;

/// Maximum number of digits in an E.164 number (excluding `+`).
pub const MAX_E164_DIGITS: usize = 15;

/// Bounds for a bare local number that gets the default prefix prepended.
const MIN_LOCAL_DIGITS: usize = 6;
const MAX_LOCAL_DIGITS: usize = 15;

/// International dialing escape codes rewritten to `+`.
const INTERNATIONAL_ESCAPES: [&str; 2] = ["011", "00"];

/// Result of normalizing a list of recipients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizedBatch {
    /// Unique E.164 numbers, in first-seen order.
    pub ok: Vec<String>,
    /// Inputs that failed normalization, verbatim.
    pub invalid: Vec<String>,
}

impl NormalizedBatch {
    /// True when no input normalized successfully.
    pub fn is_empty(&self) -> bool {
        self.ok.is_empty()
    }
}

/// Normalize a phone number into E.164 form.
///
/// `default_dial_prefix` is the country prefix applied to bare local numbers,
/// e.g. `"+1"` or `"44"`. Returns `None` when the input cannot be made into a
/// valid E.164 number.
pub fn normalize(input: &str, default_dial_prefix: &str) -> Option<String> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = rewrite_escape(&compact);

    if let Some(rest) = compact.strip_prefix('+') {
        return validated(digits_of(rest));
    }

    let digits = digits_of(&compact);
    let prefix = digits_of(default_dial_prefix);

    if !prefix.is_empty() && digits.starts_with(&prefix) {
        return validated(digits);
    }

    if (MIN_LOCAL_DIGITS..=MAX_LOCAL_DIGITS).contains(&digits.len()) {
        return validated(format!("{prefix}{digits}"));
    }

    None
}

/// Normalize many recipients, deduplicating valid results.
pub fn normalize_many<S: AsRef<str>>(inputs: &[S], default_dial_prefix: &str) -> NormalizedBatch {
    let mut seen = HashSet::new();
    let mut batch = NormalizedBatch::default();

    for input in inputs {
        let raw = input.as_ref();
        match normalize(raw, default_dial_prefix) {
            Some(number) => {
                if seen.insert(number.clone()) {
                    batch.ok.push(number);
                }
            }
            None => batch.invalid.push(raw.to_string()),
        }
    }

    batch
}

/// Check whether a string is already a valid E.164 number.
pub fn is_e164(candidate: &str) -> bool {
    match candidate.strip_prefix('+') {
        Some(digits) => digits.chars().all(|c| c.is_ascii_digit()) && valid_digits(digits),
        None => false,
    }
}

fn rewrite_escape(compact: &str) -> String {
    for escape in INTERNATIONAL_ESCAPES {
        if let Some(rest) = compact.strip_prefix(escape) {
            return format!("+{rest}");
        }
    }
    compact.to_string()
}

fn digits_of(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

fn valid_digits(digits: &str) -> bool {
    (MIN_E164_DIGITS..=MAX_E164_DIGITS).contains(&digits.len())
        && !digits.starts_with('0')
}

fn validated(digits: String) -> Option<String> {
    if valid_digits(&digits) {
        Some(format!("+{digits}"))
    } else {
        None
    }
}
