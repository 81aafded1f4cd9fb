//! Collaborators handed to every validator at construction time.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::Span;

use crate::context::RunContext;
use crate::io::config::ClientSettings;
use crate::io::http::{HttpQuotaClient, RegistryImageClient};

/// Errors returned by the quota and image lookups.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The remote service answered with a 5xx status.
    #[error("server error {status} from {url}")]
    ServerSide { status: u16, url: String },
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid image reference '{0}'")]
    InvalidReference(String),
    #[error("request cancelled")]
    Cancelled,
}

impl ClientError {
    /// Server-side faults are transient; validators report them as retryable.
    pub fn is_server_side(&self) -> bool {
        matches!(self, ClientError::ServerSide { .. })
    }
}

/// Looks up whether a quota (SKU) exists.
///
/// Implementations are shared across concurrent workers.
#[async_trait]
pub trait QuotaClient: Send + Sync {
    async fn quota_exists(&self, ctx: &RunContext, name: &str) -> Result<bool, ClientError>;
}

/// Looks up whether an image reference resolves in its registry.
#[async_trait]
pub trait ImageClient: Send + Sync {
    async fn image_exists(&self, ctx: &RunContext, reference: &str) -> Result<bool, ClientError>;
}

/// Read-only bundle of collaborators shared by all validators of a runner.
#[derive(Clone)]
pub struct Dependencies {
    quota: Arc<dyn QuotaClient>,
    images: Arc<dyn ImageClient>,
    span: Span,
}

impl Dependencies {
    pub fn new(quota: Arc<dyn QuotaClient>, images: Arc<dyn ImageClient>) -> Self {
        Self {
            quota,
            images,
            span: tracing::info_span!("validators"),
        }
    }

    /// Replace the span validators log under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Concrete HTTP clients configured from `settings`.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let quota = HttpQuotaClient::new(settings)?;
        let images = RegistryImageClient::new(settings)?;
        Ok(Self::new(Arc::new(quota), Arc::new(images)))
    }

    pub fn quota(&self) -> &dyn QuotaClient {
        self.quota.as_ref()
    }

    pub fn images(&self) -> &dyn ImageClient {
        self.images.as_ref()
    }

    /// Parent span for validator log events.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("span", &self.span)
            .finish_non_exhaustive()
    }
}
