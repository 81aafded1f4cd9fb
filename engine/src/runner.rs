//! Builds the code-keyed validator table and runs it concurrently.
//!
//! # Lifecycle
//!
//! 1. [`Runner::new`] resolves config defaults, calls every initializer with
//!    the shared [`Dependencies`] and wraps each validator with the middleware
//!    chain. Any failure aborts construction; there is no partial runner.
//! 2. [`Runner::run`] spawns one task per selected validator. Each task sends
//!    its single result into a bounded channel that backs the returned stream.
//! 3. The stream ends once every task has either delivered or given up on
//!    cancellation: each task owns a sender clone and the channel closes when
//!    the last one drops.

use std::any::Any;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::{FutureExt, Stream};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::core::code::Code;
use crate::core::result::ValidatorResult;
use crate::deps::Dependencies;
use crate::exit_codes;
use crate::filter::Filter;
use crate::input::AddonSubject;
use crate::io::config::ClientSettings;
use crate::middleware::{Middleware, RetryMiddleware, RunFn, chain, run_fn};
use crate::registry;
use crate::report::{Report, collect_sorted};
use crate::validator::{Initializer, Validator};

/// Capacity of the result channel shared by a run's workers.
const RESULT_BUFFER: usize = 8;

/// Results of one run, in completion order. Single use.
pub type ResultStream = Pin<Box<dyn Stream<Item = ValidatorResult> + Send>>;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// Two validators report the same code. Indicates a registration bug.
    #[error("duplicate validator code {0}")]
    DuplicateCode(Code),
    #[error("validator initializer failed")]
    Initializer(#[source] anyhow::Error),
    #[error("build default dependencies")]
    Dependencies(#[source] anyhow::Error),
}

impl RunnerError {
    /// Every construction failure maps to [`exit_codes::INVALID`].
    pub fn exit_code(&self) -> i32 {
        exit_codes::INVALID
    }
}

/// Inputs to [`Runner::new`]. Unset fields fall back to defaults.
#[derive(Clone, Default)]
pub struct RunnerConfig {
    /// Empty means the global registration list.
    pub initializers: Vec<Initializer>,
    /// `None` builds the HTTP clients described by `clients`.
    pub dependencies: Option<Dependencies>,
    /// `None` installs a default [`RetryMiddleware`]; `Some(vec![])` disables middleware.
    pub middleware: Option<Vec<Arc<dyn Middleware>>>,
    pub clients: ClientSettings,
}

struct Registered {
    validator: Arc<dyn Validator>,
    run: RunFn,
}

/// Owns the validator table. Immutable after construction.
pub struct Runner {
    table: BTreeMap<Code, Registered>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Result<Self, RunnerError> {
        let initializers = if config.initializers.is_empty() {
            registry::registered()
        } else {
            config.initializers
        };
        let dependencies = match config.dependencies {
            Some(dependencies) => dependencies,
            None => Dependencies::from_settings(&config.clients)
                .map_err(RunnerError::Dependencies)?,
        };
        let middleware = config.middleware.unwrap_or_else(|| {
            let retry: Arc<dyn Middleware> = Arc::new(RetryMiddleware::default());
            vec![retry]
        });

        let mut table = BTreeMap::new();
        for initializer in &initializers {
            let validator = initializer(&dependencies).map_err(RunnerError::Initializer)?;
            let code = validator.code();
            match table.entry(code) {
                Entry::Occupied(_) => return Err(RunnerError::DuplicateCode(code)),
                Entry::Vacant(slot) => {
                    let run = chain(&middleware, run_fn(Arc::clone(&validator)));
                    slot.insert(Registered { validator, run });
                }
            }
        }

        info!(
            validators = table.len(),
            middleware = middleware.len(),
            "runner constructed"
        );
        Ok(Self { table })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn get(&self, code: Code) -> Option<Arc<dyn Validator>> {
        self.table
            .get(&code)
            .map(|entry| Arc::clone(&entry.validator))
    }

    /// Validators matching every filter, ascending by code.
    pub fn get_validators(&self, filters: &[Filter]) -> Vec<Arc<dyn Validator>> {
        self.selected(filters)
            .map(|entry| Arc::clone(&entry.validator))
            .collect()
    }

    fn selected<'a>(&'a self, filters: &'a [Filter]) -> impl Iterator<Item = &'a Registered> + 'a {
        self.table
            .values()
            .filter(move |entry| Filter::all(filters, entry.validator.as_ref()))
    }

    /// Run every matching validator concurrently. Must be called within a
    /// tokio runtime.
    ///
    /// Once `ctx` is cancelled, unfinished workers drop their results; results
    /// already queued are still yielded before the stream ends.
    pub fn run(
        &self,
        ctx: &RunContext,
        subject: Arc<AddonSubject>,
        filters: &[Filter],
    ) -> ResultStream {
        let (tx, mut rx) = mpsc::channel(RESULT_BUFFER);
        let mut launched = 0usize;

        for entry in self.selected(filters) {
            let code = entry.validator.code();
            let name = entry.validator.name().to_string();
            let description = entry.validator.description().to_string();
            let run = Arc::clone(&entry.run);
            let tx = tx.clone();
            let ctx = ctx.clone();
            let subject = Arc::clone(&subject);
            launched += 1;

            tokio::spawn(async move {
                debug!(code = %code, "validator started");
                let guarded = AssertUnwindSafe(async { run(ctx.clone(), subject).await });
                let result = tokio::select! {
                    biased;
                    _ = ctx.cancelled() => {
                        debug!(code = %code, "run cancelled before validator finished");
                        return;
                    }
                    outcome = guarded.catch_unwind() => match outcome {
                        Ok(result) => result,
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            warn!(code = %code, panic = %message, "validator panicked");
                            ValidatorResult::error(
                                code,
                                &name,
                                &description,
                                format!("validator panicked: {message}"),
                            )
                        }
                    },
                };
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => {
                        debug!(code = %code, "run cancelled, result dropped");
                    }
                    sent = tx.send(result) => {
                        if sent.is_err() {
                            debug!(code = %code, "result stream dropped by consumer");
                        }
                    }
                }
            });
        }
        drop(tx);
        debug!(launched, "validators launched");

        Box::pin(async_stream::stream! {
            while let Some(result) = rx.recv().await {
                yield result;
            }
        })
    }

    /// Run matching validators and collect their results sorted by code.
    pub async fn run_all(
        &self,
        ctx: &RunContext,
        subject: Arc<AddonSubject>,
        filters: &[Filter],
    ) -> Report {
        collect_sorted(self.run(ctx, subject, filters)).await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::StreamExt;

    use crate::core::result::ResultKind;
    use crate::filter::{matches_codes, not};
    use crate::test_support::{
        ScriptedValidator, code, fake_dependencies, failing_initializer, initializer_for,
        scripted, scripted_initializer,
    };
    use crate::validator::{Base, Check, initializer};

    fn config(initializers: Vec<Initializer>) -> RunnerConfig {
        RunnerConfig {
            initializers,
            dependencies: Some(fake_dependencies()),
            middleware: Some(Vec::new()),
            ..RunnerConfig::default()
        }
    }

    fn subject() -> Arc<AddonSubject> {
        Arc::new(AddonSubject::default())
    }

    fn codes(validators: &[Arc<dyn Validator>]) -> Vec<String> {
        validators.iter().map(|v| v.code().to_string()).collect()
    }

    fn runner(values: &[u16]) -> Runner {
        let initializers = values.iter().copied().map(scripted_initializer).collect();
        Runner::new(config(initializers)).expect("runner")
    }

    #[test]
    fn duplicate_codes_abort_construction() {
        let err = Runner::new(config(vec![
            scripted_initializer(1),
            scripted_initializer(2),
            scripted_initializer(1),
        ]))
        .err()
        .expect("duplicate");
        assert!(matches!(err, RunnerError::DuplicateCode(c) if c == code(1)));
        assert_eq!(err.to_string(), "duplicate validator code AM0001");
        assert_eq!(err.exit_code(), exit_codes::INVALID);
    }

    #[test]
    fn initializer_errors_propagate() {
        let err = Runner::new(config(vec![scripted_initializer(1), failing_initializer()]))
            .err()
            .expect("initializer failure");
        assert!(matches!(err, RunnerError::Initializer(_)));
    }

    #[test]
    fn get_validators_sorts_by_code() {
        let runner = runner(&[30, 2, 11]);
        assert_eq!(runner.len(), 3);
        assert_eq!(
            codes(&runner.get_validators(&[])),
            vec!["AM0002", "AM0011", "AM0030"]
        );
    }

    #[test]
    fn get_validators_applies_code_filters() {
        let runner = runner(&[1, 2, 3]);
        assert_eq!(
            codes(&runner.get_validators(&[matches_codes([code(2)])])),
            vec!["AM0002"]
        );
        assert!(runner.get_validators(&[matches_codes([code(9)])]).is_empty());
        assert_eq!(
            codes(&runner.get_validators(&[not(matches_codes([code(2)]))])),
            vec!["AM0001", "AM0003"]
        );
        assert!(runner.get(code(3)).is_some());
        assert!(runner.get(code(4)).is_none());
    }

    #[tokio::test]
    async fn run_delivers_one_result_per_selected_validator() {
        let runner = runner(&[1, 2, 3]);
        let results: Vec<ValidatorResult> = runner
            .run(&RunContext::new(), subject(), &[])
            .collect()
            .await;
        let mut delivered: Vec<Code> = results.iter().map(ValidatorResult::code).collect();
        delivered.sort();
        assert_eq!(delivered, vec![code(1), code(2), code(3)]);
    }

    #[tokio::test]
    async fn run_respects_filters() {
        let runner = runner(&[1, 2, 3]);
        let report = runner
            .run_all(&RunContext::new(), subject(), &[not(matches_codes([code(1)]))])
            .await;
        let delivered: Vec<Code> = report.results().iter().map(ValidatorResult::code).collect();
        assert_eq!(delivered, vec![code(2), code(3)]);
    }

    /// Each validator is wrapped once at construction and invoked once per run.
    #[tokio::test(start_paused = true)]
    async fn middleware_chain_applies_to_every_run() {
        let flaky = scripted(5, &[ResultKind::RetryableError, ResultKind::Success]);
        let retry: Arc<dyn Middleware> =
            Arc::new(RetryMiddleware::new().with_delay(Duration::from_millis(10)));
        let runner = Runner::new(RunnerConfig {
            middleware: Some(vec![retry]),
            ..config(vec![initializer_for(flaky.clone())])
        })
        .expect("runner");

        let report = runner.run_all(&RunContext::new(), subject(), &[]).await;
        assert_eq!(flaky.calls(), 2);
        assert!(report.results()[0].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_run_still_closes_stream() {
        let slow = |value: u16| {
            initializer_for(Arc::new(
                ScriptedValidator::new(value, &[ResultKind::Success])
                    .with_delay(Duration::from_secs(60)),
            ))
        };
        let runner = Runner::new(config(vec![slow(1), slow(2), slow(3)])).expect("runner");

        let ctx = RunContext::new();
        let stream = runner.run(&ctx, subject(), &[]);
        ctx.cancel();
        let results: Vec<ValidatorResult> = stream.collect().await;
        assert!(results.is_empty());
    }

    /// Results queued before cancellation are still delivered.
    #[tokio::test(start_paused = true)]
    async fn cancellation_keeps_already_queued_results() {
        let fast = scripted(1, &[ResultKind::Success]);
        let slow = Arc::new(
            ScriptedValidator::new(2, &[ResultKind::Success]).with_delay(Duration::from_secs(60)),
        );
        let runner = Runner::new(config(vec![initializer_for(fast), initializer_for(slow)]))
            .expect("runner");

        let ctx = RunContext::new();
        let mut stream = runner.run(&ctx, subject(), &[]);
        tokio::time::sleep(Duration::from_secs(1)).await;
        ctx.cancel();

        let first = stream.next().await.expect("queued result");
        assert_eq!(first.code(), code(1));
        assert!(stream.next().await.is_none());
    }

    struct Panicking {
        base: Base,
    }

    #[async_trait]
    impl Check for Panicking {
        fn base(&self) -> &Base {
            &self.base
        }

        async fn check(&self, _ctx: &RunContext, _subject: &AddonSubject) -> ValidatorResult {
            panic!("lookup table missing");
        }
    }

    /// A panicking validator is reported as an error instead of vanishing.
    #[tokio::test]
    async fn panicking_validator_becomes_error_result() {
        let panicking = initializer(|_| {
            let base = Base::new(2)?.with_name("panics");
            let validator: Arc<dyn Validator> = Arc::new(Panicking { base });
            Ok(validator)
        });
        let runner = Runner::new(config(vec![scripted_initializer(1), panicking]))
            .expect("runner");

        let report = runner.run_all(&RunContext::new(), subject(), &[]).await;
        assert_eq!(report.len(), 2);
        let failed = &report.results()[1];
        assert_eq!(failed.code(), code(2));
        assert_eq!(failed.name(), "panics");
        assert!(failed.is_error());
        assert_eq!(
            failed.error_message(),
            Some("validator panicked: lookup table missing")
        );
        assert_eq!(report.exit_code(), exit_codes::FAILED);
    }

    /// Writers blocked on a full buffer give up on cancellation; nothing
    /// refills the queue once the consumer starts draining.
    #[tokio::test(start_paused = true)]
    async fn blocked_writers_stop_on_cancel() {
        let values: Vec<u16> = (1..=12).collect();
        let runner = runner(&values);

        let ctx = RunContext::new();
        let stream = runner.run(&ctx, subject(), &[]);
        tokio::time::sleep(Duration::from_secs(1)).await;
        ctx.cancel();

        let results: Vec<ValidatorResult> = stream.collect().await;
        assert_eq!(results.len(), RESULT_BUFFER);
    }
}
