//! Deterministic, idempotent normalization of identifying fields.
//!
//! Every function here satisfies `f(f(x)) == f(x)`, so a key computed from an
//! already-normalized value is stable across runs.

use serde_json::Value;

/// Minimum number of digits for a phone number to be usable as a key.
const MIN_PHONE_DIGITS: usize = 7;

/// Vietnamese country calling code.
const VN_COUNTRY_CODE: &str = "84";

/// Normalize a phone number to `+<digits>` form.
///
/// Vietnamese local numbers (`0912 345 678`) and `84...`/`0084...` prefixes are
/// rewritten to `+84...`. Returns `None` when too few digits remain.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    while let Some(rest) = digits.strip_prefix("00") {
        digits = rest.to_string();
    }

    if digits.len() == 10 && digits.starts_with('0') {
        digits = format!("{}{}", VN_COUNTRY_CODE, &digits[1..]);
    }

    if digits.len() < MIN_PHONE_DIGITS {
        return None;
    }

    Some(format!("+{}", digits))
}

/// Normalize an email address: trimmed and lowercased. Returns `None` when the
/// value cannot be an address.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(email)
}

/// Normalize a SKU: whitespace removed, uppercased.
pub fn normalize_sku(raw: &str) -> Option<String> {
    let sku: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();
    if sku.is_empty() {
        None
    } else {
        Some(sku)
    }
}

/// Normalize a campaign or voucher code: trimmed, inner whitespace collapsed, lowercased.
pub fn normalize_code(raw: &str) -> Option<String> {
    let code = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

/// Compare two field values the way the target system would store them.
///
/// Strings are compared trimmed; numbers and numeric strings are compared by
/// value (`"150000"` equals `150000.0`); a missing value equals `null` or `""`.
pub fn values_equal(left: Option<&Value>, right: Option<&Value>) -> bool {
    let left = comparable(left);
    let right = comparable(right);

    match (&left, &right) {
        (Comparable::Number(a), Comparable::Number(b)) => (a - b).abs() < 1e-9,
        _ => left == right,
    }
}

#[derive(Debug, PartialEq)]
enum Comparable {
    Empty,
    Number(f64),
    Text(String),
    Other(Value),
}

fn comparable(value: Option<&Value>) -> Comparable {
    match value {
        None | Some(Value::Null) => Comparable::Empty,
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Comparable::Number)
            .unwrap_or_else(|| Comparable::Text(n.to_string())),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Comparable::Empty
            } else if let Ok(n) = trimmed.parse::<f64>() {
                Comparable::Number(n)
            } else {
                Comparable::Text(trimmed.to_string())
            }
        }
        Some(other) => Comparable::Other(other.clone()),
    }
}
