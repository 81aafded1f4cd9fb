//! Re-invokes a validator while it reports retryable errors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::context::RunContext;
use crate::core::delay::{Constant, Delayer, millis};
use crate::core::result::ValidatorResult;
use crate::input::AddonSubject;
use crate::middleware::{Middleware, RunFn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

/// Builds a fresh delayer for every wrapped invocation.
pub type DelayerFactory = Arc<dyn Fn() -> Box<dyn Delayer> + Send + Sync>;

/// Retries retryable results up to `max_attempts` total calls.
///
/// Success, plain failure and non-retryable errors are returned after the
/// first call. When attempts run out the last retryable result is returned
/// unchanged. A cancelled context stops the loop at the next pause.
#[derive(Clone)]
pub struct RetryMiddleware {
    max_attempts: u32,
    delayer: DelayerFactory,
}

impl Default for RetryMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RetryMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryMiddleware")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl RetryMiddleware {
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delayer: constant_factory(DEFAULT_DELAY),
        }
    }

    /// Total number of calls, including the first. Zero is treated as one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Fixed pause between attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delayer = constant_factory(delay);
        self
    }

    /// Backoff policy; each invocation starts from a clone of `prototype`.
    pub fn with_delayer<D>(mut self, prototype: D) -> Self
    where
        D: Delayer + Clone + Sync + 'static,
    {
        self.delayer = Arc::new(move || -> Box<dyn Delayer> { Box::new(prototype.clone()) });
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

fn constant_factory(delay: Duration) -> DelayerFactory {
    Arc::new(move || -> Box<dyn Delayer> { Box::new(Constant(delay)) })
}

impl Middleware for RetryMiddleware {
    fn wrap(&self, next: RunFn) -> RunFn {
        let max_attempts = self.max_attempts;
        let delayer = Arc::clone(&self.delayer);
        Arc::new(move |ctx: RunContext, subject: Arc<AddonSubject>| {
            let next = Arc::clone(&next);
            let fresh = delayer();
            run_with_retry(max_attempts, fresh, next, ctx, subject).boxed()
        })
    }
}

async fn run_with_retry(
    max_attempts: u32,
    mut delayer: Box<dyn Delayer>,
    next: RunFn,
    ctx: RunContext,
    subject: Arc<AddonSubject>,
) -> ValidatorResult {
    let mut attempt = 1;
    let mut result = next(ctx.clone(), Arc::clone(&subject)).await;

    while result.is_retryable() && attempt < max_attempts {
        let delay = delayer.next_delay();
        warn!(
            code = %result.code(),
            attempt,
            max_attempts,
            delay_ms = millis(delay),
            error = result.error_message().unwrap_or_default(),
            "retryable result, backing off"
        );
        tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                debug!(code = %result.code(), attempt, "run cancelled while backing off");
                return result;
            }
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
        result = next(ctx.clone(), Arc::clone(&subject)).await;
    }

    if result.is_retryable() {
        warn!(code = %result.code(), attempts = attempt, "retry attempts exhausted");
    }
    result
}
