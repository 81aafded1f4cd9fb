//! Decorators around a validator's run function.
//!
//! A [`Middleware`] turns one [`RunFn`] into another of the same shape. The
//! runner applies the configured chain once at construction so the first
//! middleware in the list ends up outermost.

pub mod retry;

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::RunContext;
use crate::core::result::ValidatorResult;
use crate::input::AddonSubject;
use crate::validator::Validator;

pub use retry::RetryMiddleware;

/// Owned-argument form of [`Validator::run`], cheap to clone into workers.
pub type RunFn =
    Arc<dyn Fn(RunContext, Arc<AddonSubject>) -> BoxFuture<'static, ValidatorResult> + Send + Sync>;

pub trait Middleware: Send + Sync {
    fn wrap(&self, next: RunFn) -> RunFn;
}

/// Run function that calls straight into `validator`.
pub fn run_fn(validator: Arc<dyn Validator>) -> RunFn {
    Arc::new(move |ctx: RunContext, subject: Arc<AddonSubject>| {
        let validator = Arc::clone(&validator);
        async move { validator.run(&ctx, &subject).await }.boxed()
    })
}

/// Wrap `base` so that `middleware[0]` runs first.
pub fn chain(middleware: &[Arc<dyn Middleware>], base: RunFn) -> RunFn {
    middleware
        .iter()
        .rev()
        .fold(base, |next, layer| layer.wrap(next))
}
