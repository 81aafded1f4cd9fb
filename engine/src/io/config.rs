//! Engine settings stored as TOML (e.g. `check-engine.toml`).

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::delay::{self, ExponentialJitter, Jitter};
use crate::middleware::retry::{self, RetryMiddleware};
use crate::middleware::Middleware;
use crate::runner::RunnerConfig;

/// Engine settings (TOML).
///
/// Missing fields default to the built-in retry policy and the public
/// quota/registry endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineSettings {
    pub retry: RetrySettings,
    pub clients: ClientSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    /// Total calls per validator, including the first.
    pub max_attempts: u32,

    /// Fixed pause between attempts; ignored when `backoff` is set.
    pub delay_ms: u64,

    /// Exponential backoff instead of a fixed pause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackoffSettings {
    pub base_ms: u64,
    pub upper_limit_ms: u64,
    pub lower_limit_ms: u64,
    pub jitter: Jitter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientSettings {
    /// Base URL of the quota (accounts management) API.
    pub quota_url: String,

    /// Bearer token for the quota API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_token: Option<String>,

    /// Registry host used for image references without an explicit host.
    pub registry: String,

    /// Per-request timeout for both clients.
    pub request_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            delay_ms: delay::millis(retry::DEFAULT_DELAY),
            backoff: None,
        }
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_ms: delay::millis(delay::DEFAULT_BASE),
            upper_limit_ms: delay::millis(delay::DEFAULT_UPPER_LIMIT),
            lower_limit_ms: delay::millis(delay::DEFAULT_LOWER_LIMIT),
            jitter: Jitter::None,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            quota_url: "https://api.openshift.com".to_string(),
            quota_token: None,
            registry: "quay.io".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        self.clients.validate()
    }

    /// Runner configuration using these clients and this retry policy.
    pub fn runner_config(&self) -> RunnerConfig {
        let retry: Arc<dyn Middleware> = Arc::new(self.retry.middleware());
        RunnerConfig {
            middleware: Some(vec![retry]),
            clients: self.clients.clone(),
            ..RunnerConfig::default()
        }
    }
}

impl RetrySettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        if let Some(backoff) = &self.backoff {
            if backoff.lower_limit_ms > backoff.upper_limit_ms {
                return Err(anyhow!(
                    "retry.backoff.lower_limit_ms must be <= upper_limit_ms"
                ));
            }
            if backoff.base_ms > backoff.upper_limit_ms {
                return Err(anyhow!("retry.backoff.base_ms must be <= upper_limit_ms"));
            }
        }
        Ok(())
    }

    pub fn middleware(&self) -> RetryMiddleware {
        let middleware = RetryMiddleware::new().with_max_attempts(self.max_attempts);
        match &self.backoff {
            Some(backoff) => middleware.with_delayer(backoff.delayer()),
            None => middleware.with_delay(Duration::from_millis(self.delay_ms)),
        }
    }
}

impl BackoffSettings {
    pub fn delayer(&self) -> ExponentialJitter {
        ExponentialJitter::new()
            .with_upper_limit(Duration::from_millis(self.upper_limit_ms))
            .with_base(Duration::from_millis(self.base_ms))
            .with_lower_limit(Duration::from_millis(self.lower_limit_ms))
            .with_jitter(self.jitter)
    }
}

impl ClientSettings {
    pub fn validate(&self) -> Result<()> {
        if self.quota_url.trim().is_empty() {
            return Err(anyhow!("clients.quota_url must be non-empty"));
        }
        if self.registry.trim().is_empty() {
            return Err(anyhow!("clients.registry must be non-empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("clients.request_timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `EngineSettings::default()`.
pub fn load_settings(path: &Path) -> Result<EngineSettings> {
    if !path.exists() {
        let settings = EngineSettings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: EngineSettings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings.validate()?;
    Ok(settings)
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_settings(path: &Path, settings: &EngineSettings) -> Result<()> {
    settings.validate()?;
    let mut buf = toml::to_string_pretty(settings).context("serialize settings toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("settings path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp settings {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace settings {}", path.display()))?;
    Ok(())
}
