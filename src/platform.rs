//! HTTP client for the control-plane platform.
//!
//! The platform holds the canonical copy of the cluster topology and
//! arbitrates concurrent writers through version-conditioned merge patches.
//! This client covers the topology fetch/patch pair used by the sync engine
//! plus the agent lifecycle operations: cluster linking, configuration fetch,
//! and liveness pings.
//!
//! # Retry semantics
//!
//! The topology GET is idempotent and is retried in place on transport
//! failures and server errors. The topology PATCH is never retried here: a
//! failed patch invalidates the version it was conditioned on, so the retry
//! belongs to the sync engine, which re-fetches a baseline first.

use std::fmt;
use std::io::Write as _;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::topology::state::Cluster;

/// Per-call timeout applied to every platform request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the version a conditional request is based on.
const LAST_KNOWN_VERSION: &str = "Last-Known-Version";

/// Opaque topology revision token issued by the platform.
///
/// The platform may serve the version as a JSON string or integer; either
/// way it is kept verbatim and echoed back in the `Last-Known-Version`
/// header exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(String);

impl Version {
    /// The token in its header form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Version {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VersionVisitor;

        impl Visitor<'_> for VersionVisitor {
            type Value = Version;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a version token (string or integer)")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Version, E> {
                Ok(Version(value.to_string()))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Version, E> {
                Ok(Version(value.to_string()))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Version, E> {
                Ok(Version(value.to_string()))
            }
        }

        deserializer.deserialize_any(VersionVisitor)
    }
}

/// Error returned by the platform API.
#[derive(Debug, Clone, Error)]
#[error("failed with code {status_code}: {message}")]
pub struct ApiError {
    /// HTTP status of the response.
    pub status_code: u16,
    /// Whether the sync engine may retry after re-fetching a baseline.
    pub retryable: bool,
    /// Server-provided error message, or the raw body if undecodable.
    pub message: String,
}

impl ApiError {
    fn from_response(status: StatusCode, body: &[u8], retryable: bool) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            error: String,
        }

        let message = serde_json::from_slice::<ErrorBody>(body)
            .map(|body| body.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());

        Self {
            status_code: status.as_u16(),
            retryable,
            message,
        }
    }
}

/// Errors produced by the platform client.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The base URL could not be parsed.
    #[error("parse client url: {0}")]
    InvalidBaseUrl(String),
    /// The platform answered with a non-success status.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The request never produced a usable response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// A response body could not be decoded.
    #[error("decode {what}: {source}")]
    Decode {
        /// What was being decoded.
        what: &'static str,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// The request body could not be gzip-compressed.
    #[error("gzip request body: {0}")]
    Compress(#[from] std::io::Error),
    /// The access token is already bound to another cluster.
    #[error("this token is already used by an agent in another Kubernetes cluster")]
    TokenAlreadyUsed,
}

impl PlatformError {
    /// Whether the sync engine may retry the operation after re-fetching a
    /// fresh baseline.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlatformError::Api(err) => err.retryable,
            PlatformError::Transport(_) => true,
            _ => false,
        }
    }
}

/// Platform operations needed by the topology sync engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TopologyClient: Send + Sync {
    /// Fetches the canonical topology and its current version.
    async fn fetch_topology(&self) -> Result<(Cluster, Version), PlatformError>;

    /// Submits a JSON Merge Patch conditioned on `last_known_version` and
    /// returns the new version on acceptance.
    async fn patch_topology(
        &self,
        patch: &[u8],
        last_known_version: &Version,
    ) -> Result<Version, PlatformError>;
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    version: Version,
    topology: Cluster,
}

#[derive(Debug, Deserialize)]
struct PatchResponse {
    version: Version,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkRequest<'a> {
    kube_id: &'a str,
    platform: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkResponse {
    cluster_id: String,
}

/// Agent configuration served by the platform.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Topology synchronization settings.
    pub topology: TopologyConfig,
}

/// Topology synchronization settings of an [`AgentConfig`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopologyConfig {
    /// Seconds between two topology synchronizations.
    pub sync_interval_seconds: u64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            sync_interval_seconds: 15,
        }
    }
}

/// Client for the control-plane platform.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    token: String,
    http: reqwest::Client,
    fetch_retry: RetryConfig,
}

impl Client {
    /// Creates a new client for the platform reachable at `base_url`.
    pub fn new(base_url: &str, token: &str) -> Result<Self, PlatformError> {
        let base_url =
            Url::parse(base_url).map_err(|err| PlatformError::InvalidBaseUrl(err.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .gzip(true)
            .user_agent(concat!("atlas-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url,
            token: token.to_string(),
            http,
            fetch_retry: RetryConfig {
                max_attempts: 4,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(2),
                backoff_multiplier: 2.0,
            },
        })
    }

    /// Links the agent to the cluster identified by `kube_id` and returns the
    /// platform-side cluster identifier.
    pub async fn link(&self, kube_id: &str) -> Result<String, PlatformError> {
        let url = self.endpoint("link")?;

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&LinkRequest {
                kube_id,
                platform: "kubernetes",
                version: env!("CARGO_PKG_VERSION"),
            })
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await?;

        match status {
            StatusCode::OK => {
                let resp: LinkResponse = serde_json::from_slice(&body).map_err(|source| {
                    PlatformError::Decode {
                        what: "link response",
                        source,
                    }
                })?;
                Ok(resp.cluster_id)
            }
            StatusCode::CONFLICT => Err(PlatformError::TokenAlreadyUsed),
            _ => Err(ApiError::from_response(status, &body, false).into()),
        }
    }

    /// Fetches the agent configuration.
    pub async fn get_config(&self) -> Result<AgentConfig, PlatformError> {
        let url = self.endpoint("config")?;

        let resp = self.http.get(url).bearer_auth(&self.token).send().await?;

        let status = resp.status();
        let body = resp.bytes().await?;

        if status != StatusCode::OK {
            return Err(ApiError::from_response(status, &body, false).into());
        }

        serde_json::from_slice(&body).map_err(|source| PlatformError::Decode {
            what: "config",
            source,
        })
    }

    /// Tells the platform the agent is alive.
    pub async fn ping(&self) -> Result<(), PlatformError> {
        let url = self.endpoint("ping")?;

        let resp = self.http.post(url).bearer_auth(&self.token).send().await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.bytes().await?;
            return Err(ApiError::from_response(status, &body, status.is_server_error()).into());
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, PlatformError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| PlatformError::InvalidBaseUrl("cannot be a base".to_string()))?
            .pop_if_empty()
            .push(path);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl TopologyClient for Client {
    async fn fetch_topology(&self) -> Result<(Cluster, Version), PlatformError> {
        let url = self.endpoint("topology")?;

        retry_with_backoff(&self.fetch_retry, "fetch_topology", transient_fetch, || {
            let url = url.clone();
            async move {
                // The gzip feature advertises Accept-Encoding and
                // decompresses transparently.
                let resp = self.http.get(url).bearer_auth(&self.token).send().await?;

                let status = resp.status();
                let body = resp.bytes().await?;

                if status != StatusCode::OK {
                    return Err(
                        ApiError::from_response(status, &body, status.is_server_error()).into(),
                    );
                }

                let resp: FetchResponse =
                    serde_json::from_slice(&body).map_err(|source| PlatformError::Decode {
                        what: "topology",
                        source,
                    })?;
                Ok((resp.topology, resp.version))
            }
        })
        .await
    }

    async fn patch_topology(
        &self,
        patch: &[u8],
        last_known_version: &Version,
    ) -> Result<Version, PlatformError> {
        let url = self.endpoint("topology")?;
        let body = gzip(patch)?;

        // This operation cannot be retried without an intervening fetch: a
        // rejected patch invalidates the version it was conditioned on.
        let resp = self
            .http
            .patch(url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/merge-patch+json")
            .header(CONTENT_ENCODING, "gzip")
            .header(LAST_KNOWN_VERSION, last_known_version.as_str())
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await?;

        if status != StatusCode::OK {
            let retryable = !matches!(
                status,
                StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY
            );
            return Err(ApiError::from_response(status, &body, retryable).into());
        }

        let resp: PatchResponse =
            serde_json::from_slice(&body).map_err(|source| PlatformError::Decode {
                what: "topology version",
                source,
            })?;
        Ok(resp.version)
    }
}

/// Whether a fetch failure is worth an in-place retry.
fn transient_fetch(err: &PlatformError) -> bool {
    match err {
        PlatformError::Transport(_) => true,
        PlatformError::Api(err) => err.status_code >= 500,
        _ => false,
    }
}

fn gzip(body: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}
