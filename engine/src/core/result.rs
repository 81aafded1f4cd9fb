//! Outcome of running one validator once.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::code::Code;

/// Classification of a [`ValidatorResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Success,
    Failure,
    Error,
    RetryableError,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResultKind::Success => "success",
            ResultKind::Failure => "failure",
            ResultKind::Error => "error",
            ResultKind::RetryableError => "retryable error",
        };
        f.write_str(label)
    }
}

/// Immutable record produced by a validator's terminal call.
///
/// Invariants:
/// - `success` implies no failure messages and no error.
/// - `retryable` implies `error` is present.
///
/// Build through the [`crate::validator::Base`] helpers rather than by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorResult {
    code: Code,
    name: String,
    description: String,
    success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    failure_messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default)]
    retryable: bool,
}

impl ValidatorResult {
    pub(crate) fn success(code: Code, name: &str, description: &str) -> Self {
        Self::blank(code, name, description, true)
    }

    pub(crate) fn failure(code: Code, name: &str, description: &str, messages: Vec<String>) -> Self {
        Self {
            failure_messages: messages,
            ..Self::blank(code, name, description, false)
        }
    }

    pub(crate) fn error(code: Code, name: &str, description: &str, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::blank(code, name, description, false)
        }
    }

    pub(crate) fn retryable_error(code: Code, name: &str, description: &str, error: String) -> Self {
        Self {
            retryable: true,
            ..Self::error(code, name, description, error)
        }
    }

    fn blank(code: Code, name: &str, description: &str, success: bool) -> Self {
        Self {
            code,
            name: name.to_string(),
            description: description.to_string(),
            success,
            failure_messages: Vec::new(),
            error: None,
            retryable: false,
        }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn failure_messages(&self) -> &[String] {
        &self.failure_messages
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn kind(&self) -> ResultKind {
        if self.success {
            ResultKind::Success
        } else if self.error.is_some() && self.retryable {
            ResultKind::RetryableError
        } else if self.error.is_some() {
            ResultKind::Error
        } else {
            ResultKind::Failure
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind() == ResultKind::Success
    }

    pub fn is_failure(&self) -> bool {
        self.kind() == ResultKind::Failure
    }

    /// True for both retryable and non-retryable errors.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ResultKind::RetryableError
    }

    /// Anything other than success, including an exhausted retryable error,
    /// counts as a failing outcome for reporting.
    pub fn counts_as_failure(&self) -> bool {
        !self.is_success()
    }
}

impl fmt::Display for ValidatorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.code, self.name, self.kind())?;
        match self.kind() {
            ResultKind::Success => Ok(()),
            ResultKind::Failure => write!(f, " ({})", self.failure_messages.join("; ")),
            ResultKind::Error | ResultKind::RetryableError => {
                write!(f, " ({})", self.error.as_deref().unwrap_or_default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> Code {
        Code::new(3).expect("code")
    }

    #[test]
    fn kinds_are_mutually_exclusive() {
        let ok = ValidatorResult::success(code(), "n", "d");
        assert!(ok.is_success() && !ok.is_error() && !ok.is_retryable());
        assert!(ok.failure_messages().is_empty());

        let failed = ValidatorResult::failure(code(), "n", "d", vec!["bad".to_string()]);
        assert_eq!(failed.kind(), ResultKind::Failure);
        assert!(failed.is_failure() && !failed.is_error());

        let errored = ValidatorResult::error(code(), "n", "d", "boom".to_string());
        assert_eq!(errored.kind(), ResultKind::Error);
        assert!(errored.is_error() && !errored.is_retryable());

        let retryable = ValidatorResult::retryable_error(code(), "n", "d", "503".to_string());
        assert_eq!(retryable.kind(), ResultKind::RetryableError);
        assert!(retryable.is_error() && retryable.is_retryable());
        assert_eq!(retryable.error_message(), Some("503"));
    }

    #[test]
    fn everything_but_success_counts_as_failure() {
        assert!(!ValidatorResult::success(code(), "n", "d").counts_as_failure());
        assert!(ValidatorResult::failure(code(), "n", "d", vec![]).counts_as_failure());
        assert!(ValidatorResult::retryable_error(code(), "n", "d", "x".into()).counts_as_failure());
    }

    #[test]
    fn display_includes_reasons() {
        let failed = ValidatorResult::failure(
            code(),
            "bundle versions",
            "d",
            vec!["a".to_string(), "b".to_string()],
        );
        assert_eq!(failed.to_string(), "AM0003 bundle versions: failure (a; b)");
        let errored = ValidatorResult::retryable_error(code(), "quota", "d", "503".to_string());
        assert_eq!(errored.to_string(), "AM0003 quota: retryable error (503)");
    }

    #[test]
    fn serializes_without_empty_fields() {
        let ok = ValidatorResult::success(code(), "n", "d");
        let json = serde_json::to_value(&ok).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "code": "AM0003",
                "name": "n",
                "description": "d",
                "success": true,
                "retryable": false,
            })
        );
    }
}
