//! Validator codes (`AM0001`-style identifiers).
//!
//! A code is the primary key of a validator. Its textual form is always the
//! `AM` prefix followed by exactly four zero-padded decimal digits, so the
//! numeric range is `0..=9999`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed textual prefix of every code.
pub const PREFIX: &str = "AM";

/// Largest value that still renders as four digits.
pub const MAX_CODE: u16 = 9999;

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:AM)([0-9]{4})$").unwrap_or_else(|err| panic!("code regex: {err}"))
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    /// Text does not match `AM` + four digits.
    #[error("malformed code '{0}': expected 'AM' followed by 4 digits")]
    Malformed(String),
    /// Numeric value outside `0..=9999`.
    #[error("invalid code {0}: must be within 0..=9999")]
    Invalid(i64),
}

/// Identifier of a single validator.
///
/// Ordered by its numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Code(u16);

impl Code {
    /// Build a code from its numeric value.
    pub fn new(value: u16) -> Result<Self, CodeError> {
        if value > MAX_CODE {
            return Err(CodeError::Invalid(i64::from(value)));
        }
        Ok(Self(value))
    }

    /// Build a code from a signed value, rejecting negatives.
    pub fn try_from_raw(value: i64) -> Result<Self, CodeError> {
        let narrowed = u16::try_from(value).map_err(|_| CodeError::Invalid(value))?;
        Self::new(narrowed)
    }

    /// Parse `AM0001`-style text. The prefix is matched case-insensitively.
    pub fn parse(text: &str) -> Result<Self, CodeError> {
        let caps = CODE_RE
            .captures(text)
            .ok_or_else(|| CodeError::Malformed(text.to_string()))?;
        let value = caps[1]
            .parse::<u16>()
            .map_err(|_| CodeError::Malformed(text.to_string()))?;
        Ok(Self(value))
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{:04}", self.0)
    }
}

impl FromStr for Code {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Code {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Code> for String {
    fn from(code: Code) -> Self {
        code.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_zero_pads_to_four_digits() {
        assert_eq!(Code::new(1).expect("code").to_string(), "AM0001");
        assert_eq!(Code::new(42).expect("code").to_string(), "AM0042");
        assert_eq!(Code::new(9999).expect("code").to_string(), "AM9999");
    }

    #[test]
    fn parse_round_trips_display() {
        for value in [0, 1, 10, 123, 4567, MAX_CODE] {
            let code = Code::new(value).expect("code");
            assert_eq!(Code::parse(&code.to_string()), Ok(code));
        }
    }

    #[test]
    fn parse_is_case_insensitive_on_prefix() {
        assert_eq!(Code::parse("am0007"), Code::new(7));
        assert_eq!(Code::parse("Am0007"), Code::new(7));
        assert_eq!("aM0007".parse::<Code>(), Code::new(7));
    }

    /// Wrong length, wrong prefix, or non-digit suffix are all malformed.
    #[test]
    fn parse_rejects_malformed_text() {
        for text in [
            "", "AM", "AM001", "AM00001", "XX0001", "AM00a1", "AM-001", " AM0001", "AM0001 ",
            "AM٠٠٠١",
        ] {
            assert_eq!(
                Code::parse(text),
                Err(CodeError::Malformed(text.to_string())),
                "input {text:?}"
            );
        }
    }

    #[test]
    fn raw_values_outside_range_are_invalid() {
        assert_eq!(Code::try_from_raw(-1), Err(CodeError::Invalid(-1)));
        assert_eq!(Code::try_from_raw(10_000), Err(CodeError::Invalid(10_000)));
        assert_eq!(Code::try_from_raw(12), Code::new(12));
    }

    #[test]
    fn ordering_follows_numeric_value() {
        let mut codes = vec![
            Code::new(30).expect("code"),
            Code::new(2).expect("code"),
            Code::new(100).expect("code"),
        ];
        codes.sort();
        let rendered: Vec<String> = codes.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["AM0002", "AM0030", "AM0100"]);
    }

    #[test]
    fn serde_uses_textual_form() {
        let code = Code::new(5).expect("code");
        let json = serde_json::to_string(&code).expect("serialize");
        assert_eq!(json, "\"AM0005\"");
        let back: Code = serde_json::from_str("\"am0005\"").expect("deserialize");
        assert_eq!(back, code);
        assert!(serde_json::from_str::<Code>("\"AM5\"").is_err());
    }
}
