//! The validator capability and the shared [`Base`] most checks build on.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::context::RunContext;
use crate::core::code::{Code, CodeError};
use crate::core::result::ValidatorResult;
use crate::deps::{ClientError, Dependencies};
use crate::input::AddonSubject;

pub const DEFAULT_NAME: &str = "unnamed";
pub const DEFAULT_DESCRIPTION: &str = "no description";

/// One independently runnable check.
///
/// `run` must return exactly one result and should stop waiting on its own I/O
/// once `ctx` is cancelled.
#[async_trait]
pub trait Validator: Send + Sync {
    fn code(&self) -> Code;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn run(&self, ctx: &RunContext, subject: &AddonSubject) -> ValidatorResult;
}

/// Builds a validator from the shared dependencies.
pub type Initializer = Arc<dyn Fn(&Dependencies) -> Result<Arc<dyn Validator>> + Send + Sync>;

/// Wrap a closure as an [`Initializer`].
pub fn initializer<F>(build: F) -> Initializer
where
    F: Fn(&Dependencies) -> Result<Arc<dyn Validator>> + Send + Sync + 'static,
{
    Arc::new(build)
}

/// Identity plus result helpers shared by concrete checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base {
    code: Code,
    name: String,
    description: String,
}

impl Base {
    /// Fails with [`CodeError::Invalid`] for negative or out-of-range codes.
    pub fn new(code: i64) -> Result<Self, CodeError> {
        Ok(Self {
            code: Code::try_from_raw(code)?,
            name: DEFAULT_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
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

    pub fn success(&self) -> ValidatorResult {
        ValidatorResult::success(self.code, &self.name, &self.description)
    }

    pub fn fail<I, S>(&self, messages: I) -> ValidatorResult
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let messages = messages.into_iter().map(Into::into).collect();
        ValidatorResult::failure(self.code, &self.name, &self.description, messages)
    }

    pub fn error(&self, err: impl fmt::Display) -> ValidatorResult {
        ValidatorResult::error(self.code, &self.name, &self.description, format!("{err:#}"))
    }

    pub fn retryable_error(&self, err: impl fmt::Display) -> ValidatorResult {
        ValidatorResult::retryable_error(
            self.code,
            &self.name,
            &self.description,
            format!("{err:#}"),
        )
    }

    /// Retryable for server-side faults, a plain error otherwise.
    pub fn client_error(&self, err: &ClientError) -> ValidatorResult {
        if err.is_server_side() {
            self.retryable_error(err)
        } else {
            self.error(err)
        }
    }
}

/// A check that gets its identity from a [`Base`] and only implements `check`.
#[async_trait]
pub trait Check: Send + Sync {
    fn base(&self) -> &Base;
    async fn check(&self, ctx: &RunContext, subject: &AddonSubject) -> ValidatorResult;
}

#[async_trait]
impl<T: Check> Validator for T {
    fn code(&self) -> Code {
        self.base().code()
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    fn description(&self) -> &str {
        self.base().description()
    }

    async fn run(&self, ctx: &RunContext, subject: &AddonSubject) -> ValidatorResult {
        self.check(ctx, subject).await
    }
}
