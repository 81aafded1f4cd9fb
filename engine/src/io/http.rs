//! Default network implementations of the quota and image lookups.

use std::fmt;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use tracing::debug;
use url::Url;

use crate::context::RunContext;
use crate::deps::{ClientError, ImageClient, QuotaClient};
use crate::io::config::ClientSettings;

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
application/vnd.oci.image.manifest.v1+json, \
application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.docker.distribution.manifest.v2+json";

const DEFAULT_TAG: &str = "latest";

/// Map a lookup response status onto "exists" semantics.
fn classify(status: StatusCode, url: &Url) -> Result<bool, ClientError> {
    if status.is_success() {
        Ok(true)
    } else if status == StatusCode::NOT_FOUND {
        Ok(false)
    } else if status.is_server_error() {
        Err(ClientError::ServerSide {
            status: status.as_u16(),
            url: url.to_string(),
        })
    } else {
        Err(ClientError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

/// Send `request`, giving up as soon as `ctx` is cancelled.
async fn send(
    ctx: &RunContext,
    request: reqwest::RequestBuilder,
    url: &Url,
) -> Result<bool, ClientError> {
    let response = tokio::select! {
        biased;
        _ = ctx.cancelled() => return Err(ClientError::Cancelled),
        response = request.send() => response.map_err(|source| ClientError::Transport {
            url: url.to_string(),
            source,
        })?,
    };
    debug!(url = %url, status = response.status().as_u16(), "lookup response");
    classify(response.status(), url)
}

fn build_client(settings: &ClientSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .build()
        .context("build http client")
}

/// Quota lookups against the accounts management SKU endpoint.
#[derive(Clone)]
pub struct HttpQuotaClient {
    base: Url,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpQuotaClient {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let base = Url::parse(&settings.quota_url)
            .with_context(|| format!("parse quota url '{}'", settings.quota_url))?;
        if base.cannot_be_a_base() {
            bail!("quota url '{}' cannot be a base url", settings.quota_url);
        }
        Ok(Self {
            base,
            token: settings.quota_token.clone(),
            client: build_client(settings)?,
        })
    }

    /// `{base}/api/accounts_mgmt/v1/skus/{name}`
    pub fn sku_url(&self, name: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "accounts_mgmt", "v1", "skus", name]);
        }
        url
    }
}

impl fmt::Debug for HttpQuotaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpQuotaClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl QuotaClient for HttpQuotaClient {
    async fn quota_exists(&self, ctx: &RunContext, name: &str) -> Result<bool, ClientError> {
        let url = self.sku_url(name);
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        send(ctx, request, &url).await
    }
}

/// A parsed `registry/repository[:tag|@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    /// Tag or digest.
    pub reference: String,
}

impl ImageReference {
    /// Parse `text`, using `default_registry` when it has no registry host.
    pub fn parse(text: &str, default_registry: &str) -> Result<Self, ClientError> {
        let invalid = || ClientError::InvalidReference(text.to_string());
        if text.is_empty() || text.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let (name, reference) = match text.split_once('@') {
            Some((name, digest)) => (name, digest.to_string()),
            None => {
                let last_slash = text.rfind('/').map_or(0, |idx| idx + 1);
                match text[last_slash..].rfind(':') {
                    Some(idx) => {
                        let split = last_slash + idx;
                        (&text[..split], text[split + 1..].to_string())
                    }
                    None => (text, DEFAULT_TAG.to_string()),
                }
            }
        };

        let (registry, repository) = match name.split_once('/') {
            Some((host, rest)) if is_registry_host(host) => (host.to_string(), rest.to_string()),
            _ => (default_registry.to_string(), name.to_string()),
        };

        if repository.is_empty()
            || reference.is_empty()
            || repository.split('/').any(str::is_empty)
        {
            return Err(invalid());
        }

        Ok(Self {
            registry,
            repository,
            reference,
        })
    }

    /// Registry v2 manifest endpoint for this reference.
    pub fn manifest_url(&self) -> Result<Url, ClientError> {
        let raw = format!(
            "https://{}/v2/{}/manifests/{}",
            self.registry, self.repository, self.reference
        );
        Url::parse(&raw).map_err(|_| ClientError::InvalidReference(raw))
    }
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

/// Image lookups via `HEAD /v2/<repository>/manifests/<reference>`.
#[derive(Clone)]
pub struct RegistryImageClient {
    default_registry: String,
    client: reqwest::Client,
}

impl RegistryImageClient {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        Ok(Self {
            default_registry: settings.registry.clone(),
            client: build_client(settings)?,
        })
    }
}

impl fmt::Debug for RegistryImageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryImageClient")
            .field("default_registry", &self.default_registry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ImageClient for RegistryImageClient {
    async fn image_exists(&self, ctx: &RunContext, reference: &str) -> Result<bool, ClientError> {
        let parsed = ImageReference::parse(reference, &self.default_registry)?;
        let url = parsed.manifest_url()?;
        let request = self.client.head(url.clone()).header(ACCEPT, MANIFEST_ACCEPT);
        send(ctx, request, &url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://quay.io/v2/x/manifests/latest").expect("url")
    }

    #[test]
    fn classify_maps_statuses() {
        assert!(matches!(classify(StatusCode::OK, &url()), Ok(true)));
        assert!(matches!(classify(StatusCode::NOT_FOUND, &url()), Ok(false)));
        let server = classify(StatusCode::SERVICE_UNAVAILABLE, &url()).expect_err("503");
        assert!(server.is_server_side());
        let denied = classify(StatusCode::UNAUTHORIZED, &url()).expect_err("401");
        assert!(matches!(denied, ClientError::UnexpectedStatus { status: 401, .. }));
    }

    #[test]
    fn parse_full_reference_with_tag() {
        let parsed = ImageReference::parse("quay.io/osd-addons/reference-addon:v0.1.0", "quay.io")
            .expect("parse");
        assert_eq!(
            parsed,
            ImageReference {
                registry: "quay.io".to_string(),
                repository: "osd-addons/reference-addon".to_string(),
                reference: "v0.1.0".to_string(),
            }
        );
        assert_eq!(
            parsed.manifest_url().expect("url").as_str(),
            "https://quay.io/v2/osd-addons/reference-addon/manifests/v0.1.0"
        );
    }

    #[test]
    fn parse_defaults_registry_and_tag() {
        let parsed = ImageReference::parse("osd-addons/index", "quay.io").expect("parse");
        assert_eq!(parsed.registry, "quay.io");
        assert_eq!(parsed.repository, "osd-addons/index");
        assert_eq!(parsed.reference, DEFAULT_TAG);
    }

    #[test]
    fn parse_digest_and_registry_port() {
        let parsed =
            ImageReference::parse("localhost:5000/team/app@sha256:abc123", "quay.io").expect("parse");
        assert_eq!(parsed.registry, "localhost:5000");
        assert_eq!(parsed.repository, "team/app");
        assert_eq!(parsed.reference, "sha256:abc123");
    }

    #[test]
    fn parse_rejects_garbage() {
        for text in ["", "quay.io/", "a b", "repo:", "quay.io//x", "@sha256:1"] {
            assert!(
                matches!(
                    ImageReference::parse(text, "quay.io"),
                    Err(ClientError::InvalidReference(_))
                ),
                "input {text:?}"
            );
        }
    }

    #[test]
    fn sku_url_appends_segments() {
        let settings = ClientSettings {
            quota_url: "https://api.example.com/".to_string(),
            ..ClientSettings::default()
        };
        let client = HttpQuotaClient::new(&settings).expect("client");
        assert_eq!(
            client.sku_url("addon-reference").as_str(),
            "https://api.example.com/api/accounts_mgmt/v1/skus/addon-reference"
        );
    }

    #[test]
    fn invalid_quota_url_is_rejected() {
        let settings = ClientSettings {
            quota_url: "not a url".to_string(),
            ..ClientSettings::default()
        };
        assert!(HttpQuotaClient::new(&settings).is_err());
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits_lookup() {
        let client = RegistryImageClient::new(&ClientSettings::default()).expect("client");
        let ctx = RunContext::new();
        ctx.cancel();
        let err = client
            .image_exists(&ctx, "quay.io/osd-addons/reference-addon:latest")
            .await
            .expect_err("cancelled");
        assert!(matches!(err, ClientError::Cancelled));
    }
}
