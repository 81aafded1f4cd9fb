//! Test-only validators and fake collaborators.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::context::RunContext;
use crate::core::code::Code;
use crate::core::result::{ResultKind, ValidatorResult};
use crate::deps::{ClientError, Dependencies, ImageClient, QuotaClient};
use crate::input::AddonSubject;
use crate::validator::{Base, Check, Initializer, Validator, initializer};

pub fn code(value: u16) -> Code {
    Code::new(value).expect("test code")
}

/// Validator that replays a script of result kinds, one per call.
///
/// The last entry repeats once the script runs out. Messages carry the call
/// number (`scripted failure #2`) so tests can tell attempts apart.
pub struct ScriptedValidator {
    base: Base,
    script: Vec<ResultKind>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedValidator {
    pub fn new(value: u16, script: &[ResultKind]) -> Self {
        Self {
            base: Base::new(i64::from(value))
                .expect("test base")
                .with_name(format!("scripted {value}")),
            script: script.to_vec(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering; the sleep gives up when the context is cancelled.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Check for ScriptedValidator {
    fn base(&self) -> &Base {
        &self.base
    }

    async fn check(&self, ctx: &RunContext, _subject: &AddonSubject) -> ValidatorResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return self.base.error("cancelled"),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
        let kind = self
            .script
            .get(call - 1)
            .or(self.script.last())
            .copied()
            .unwrap_or(ResultKind::Success);
        match kind {
            ResultKind::Success => self.base.success(),
            ResultKind::Failure => self.base.fail([format!("scripted failure #{call}")]),
            ResultKind::Error => self.base.error(format!("scripted error #{call}")),
            ResultKind::RetryableError => {
                self.base.retryable_error(format!("scripted retryable error #{call}"))
            }
        }
    }
}

pub fn scripted(value: u16, script: &[ResultKind]) -> Arc<ScriptedValidator> {
    Arc::new(ScriptedValidator::new(value, script))
}

pub fn scripted_success(value: u16) -> Arc<dyn Validator> {
    scripted(value, &[ResultKind::Success])
}

/// Initializer that builds a fresh always-successful validator.
pub fn scripted_initializer(value: u16) -> Initializer {
    initializer(move |_| Ok(scripted_success(value)))
}

/// Initializer that hands out a shared instance, so tests can read its call count.
pub fn initializer_for(validator: Arc<ScriptedValidator>) -> Initializer {
    initializer(move |_| {
        let shared: Arc<dyn Validator> = validator.clone();
        Ok(shared)
    })
}

pub fn failing_initializer() -> Initializer {
    initializer(|_| Err(anyhow!("initializer exploded")))
}

/// Scripted lookup answer: `Ok(exists)` or `Err(http status)`.
pub type Answer = Result<bool, u16>;

fn answer_to_result(answer: Answer, target: &str) -> Result<bool, ClientError> {
    answer.map_err(|status| {
        let url = format!("https://fake.test/{target}");
        if status >= 500 {
            ClientError::ServerSide { status, url }
        } else {
            ClientError::UnexpectedStatus { status, url }
        }
    })
}

/// Quota client answering from a queue, then from a fixed set of known names.
#[derive(Default)]
pub struct FakeQuota {
    queued: Mutex<VecDeque<Answer>>,
    known: BTreeSet<String>,
    calls: AtomicUsize,
}

impl FakeQuota {
    pub fn with_known<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Answers returned, in order, before falling back to the known set.
    pub fn with_queued(self, answers: &[Answer]) -> Self {
        self.queued
            .lock()
            .expect("queued answers")
            .extend(answers.iter().copied());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuotaClient for FakeQuota {
    async fn quota_exists(&self, _ctx: &RunContext, name: &str) -> Result<bool, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.queued.lock().expect("queued answers").pop_front();
        match queued {
            Some(answer) => answer_to_result(answer, name),
            None => Ok(self.known.contains(name)),
        }
    }
}

/// Image client that knows a fixed set of references.
#[derive(Default)]
pub struct FakeImages {
    known: BTreeSet<String>,
}

impl FakeImages {
    pub fn with_known<I, S>(references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: references.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ImageClient for FakeImages {
    async fn image_exists(&self, _ctx: &RunContext, reference: &str) -> Result<bool, ClientError> {
        Ok(self.known.contains(reference))
    }
}

/// Dependencies backed by empty fakes.
pub fn fake_dependencies() -> Dependencies {
    Dependencies::new(Arc::new(FakeQuota::default()), Arc::new(FakeImages::default()))
}

/// Sample check: the quota named by `metadata.quotaName` must exist.
pub struct QuotaCheck {
    base: Base,
    deps: Dependencies,
}

impl QuotaCheck {
    pub const CODE: i64 = 1;

    pub fn initializer() -> Initializer {
        initializer(|deps| {
            let base = Base::new(Self::CODE)?
                .with_name("quota exists")
                .with_description("metadata.quotaName resolves to a known SKU");
            let check: Arc<dyn Validator> = Arc::new(Self {
                base,
                deps: deps.clone(),
            });
            Ok(check)
        })
    }
}

#[async_trait]
impl Check for QuotaCheck {
    fn base(&self) -> &Base {
        &self.base
    }

    async fn check(&self, ctx: &RunContext, subject: &AddonSubject) -> ValidatorResult {
        let Some(name) = subject.metadata_str("quotaName") else {
            return self.base.fail(["metadata has no quotaName"]);
        };
        tracing::debug!(parent: self.deps.span(), quota = name, "checking quota");
        match self.deps.quota().quota_exists(ctx, name).await {
            Ok(true) => self.base.success(),
            Ok(false) => self.base.fail([format!("quota '{name}' does not exist")]),
            Err(err) => self.base.client_error(&err),
        }
    }
}

/// Sample check: every bundle manifest `image` field must resolve.
pub struct ImagesCheck {
    base: Base,
    deps: Dependencies,
}

impl ImagesCheck {
    pub const CODE: i64 = 2;

    pub fn initializer() -> Initializer {
        initializer(|deps| {
            let base = Base::new(Self::CODE)?.with_name("bundle images exist");
            let check: Arc<dyn Validator> = Arc::new(Self {
                base,
                deps: deps.clone(),
            });
            Ok(check)
        })
    }
}

#[async_trait]
impl Check for ImagesCheck {
    fn base(&self) -> &Base {
        &self.base
    }

    async fn check(&self, ctx: &RunContext, subject: &AddonSubject) -> ValidatorResult {
        let mut missing = Vec::new();
        for bundle in &subject.bundles {
            let images = bundle
                .manifests
                .iter()
                .filter_map(|manifest| manifest.get("image").and_then(|v| v.as_str()));
            for image in images {
                match self.deps.images().image_exists(ctx, image).await {
                    Ok(true) => {}
                    Ok(false) => missing.push(format!("{}: image '{image}' not found", bundle.version)),
                    Err(err) => return self.base.client_error(&err),
                }
            }
        }
        if missing.is_empty() {
            self.base.success()
        } else {
            self.base.fail(missing)
        }
    }
}
