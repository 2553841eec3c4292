//! Kenyan mobile number validation and normalization.
//!
//! Accepted shapes: `07XXXXXXXX`, `01XXXXXXXX`, `+2547XXXXXXXX`,
//! `2547XXXXXXXX` and the bare subscriber number `7XXXXXXXX`.
//! Normalized form is always `+254` followed by the nine subscriber digits.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

/// Country calling code for Kenya.
pub const COUNTRY_CODE: &str = "254";

static KENYAN_MOBILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\+?254|0)?[17]\d{8}$").expect("static phone pattern is valid")
});

/// Returns true if `raw` is a Kenyan mobile number.
///
/// The check runs on the raw input, so separators such as spaces or dashes
/// make a number invalid.
pub fn validate(raw: &str) -> bool {
    KENYAN_MOBILE.is_match(raw)
}

/// Rewrites a phone number into `+254...` form.
///
/// Strips everything that is not a digit, replaces a leading trunk `0` with
/// the country code and prefixes `254...` with `+`. A bare nine digit
/// subscriber number also gets the country code. Applying it twice yields the
/// same string.
pub fn normalize(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let digits = if let Some(rest) = digits.strip_prefix('0') {
        format!("{}{}", COUNTRY_CODE, rest)
    } else if digits.len() == 9 && digits.starts_with(['7', '1']) {
        format!("{}{}", COUNTRY_CODE, digits)
    } else {
        digits
    };

    if digits.starts_with(COUNTRY_CODE) {
        format!("+{}", digits)
    } else {
        digits
    }
}

/// A phone number that passed [`validate`] and has been normalized.
///
/// The only way to build one is [`NormalizedPhone::parse`], so holding a value
/// means the number is safe to send to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPhone(String);

impl NormalizedPhone {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if !validate(trimmed) {
            return None;
        }
        Some(Self(normalize(trimmed)))
    }

    /// `+2547XXXXXXXX`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits only (`2547XXXXXXXX`), the shape the STK push endpoint expects.
    pub fn digits(&self) -> &str {
        self.0.trim_start_matches('+')
    }

    /// Log-safe form: country code and last four digits, `+254*****5678`.
    pub fn masked(&self) -> String {
        let subscriber = &self.digits()[COUNTRY_CODE.len()..];
        let visible = subscriber.len().saturating_sub(4);
        format!(
            "+{}{}{}",
            COUNTRY_CODE,
            "*".repeat(visible),
            &subscriber[visible..]
        )
    }
}

impl fmt::Display for NormalizedPhone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for NormalizedPhone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
