//! Deterministic aggregation of a run's results.

use futures::StreamExt;
use serde::Serialize;

use crate::core::result::{ResultKind, ValidatorResult};
use crate::exit_codes;
use crate::runner::ResultStream;

/// Results of one run sorted by code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    results: Vec<ValidatorResult>,
}

/// Number of results per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub success: usize,
    pub failure: usize,
    pub error: usize,
    pub retryable_error: usize,
}

impl Report {
    pub fn new(mut results: Vec<ValidatorResult>) -> Self {
        results.sort_by_key(ValidatorResult::code);
        Self { results }
    }

    pub fn results(&self) -> &[ValidatorResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ValidatorResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results that did not succeed, including exhausted retryable errors.
    pub fn failing(&self) -> impl Iterator<Item = &ValidatorResult> {
        self.results.iter().filter(|result| result.counts_as_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failing().next().is_some()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for result in &self.results {
            match result.kind() {
                ResultKind::Success => summary.success += 1,
                ResultKind::Failure => summary.failure += 1,
                ResultKind::Error => summary.error += 1,
                ResultKind::RetryableError => summary.retryable_error += 1,
            }
        }
        summary
    }

    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            exit_codes::FAILED
        } else {
            exit_codes::OK
        }
    }
}

/// Drain `stream` and sort its results by code.
pub async fn collect_sorted(stream: ResultStream) -> Report {
    Report::new(stream.collect().await)
}
