//! Topology synchronization engine.
//!
//! [`Store`] reconciles locally produced snapshots against the platform's
//! canonical copy using optimistic concurrency: every patch is conditioned on
//! the last version the platform acknowledged, and a rejected patch is
//! resolved by discarding the cached baseline, re-fetching, and diffing
//! again. The platform stays the ordering authority when several writers
//! race; the engine only guarantees it converges onto whatever version the
//! platform ends up at.
//!
//! Callers must serialize [`Store::write`] invocations; the cached baseline
//! is owned exclusively by the engine. Cancellation is structural: dropping
//! the `write` future aborts it at the current await point (an HTTP call or
//! a backoff sleep, both cancel-safe).

use thiserror::Error;
use tracing::warn;

use crate::platform::{PlatformError, TopologyClient, Version};
use crate::retry::{Backoff, BackoffConfig};
use crate::topology::patch::build_patch;
use crate::topology::state::Cluster;

/// Bound on retryable patch failures within a single write.
const DEFAULT_MAX_PATCH_RETRY: u32 = 3;

/// Errors surfaced by [`Store::write`].
#[derive(Debug, Error)]
pub enum WriteError {
    /// The baseline fetch failed; nothing was cached.
    #[error("fetch topology: {0}")]
    Fetch(#[source] PlatformError),
    /// A snapshot could not be encoded or diffed.
    #[error("build topology patch: {0}")]
    BuildPatch(#[source] serde_json::Error),
    /// The platform rejected the patch for good.
    #[error("patch topology: {0}")]
    Patch(#[source] PlatformError),
    /// Too many retryable patch failures in a row.
    #[error("patch topology: gave up after {attempts} retryable failures: {source}")]
    RetryBudgetExhausted {
        /// Consecutive retryable failures observed.
        attempts: u32,
        /// The last failure.
        #[source]
        source: PlatformError,
    },
}

/// Replicates topology snapshots onto the platform.
///
/// Between calls the store caches the canonical encoding of the last
/// synchronized snapshot together with the version the platform returned for
/// it. The cache is an optimization only: it keeps the steady-state cost at
/// one PATCH sized by the diff. Any fatal failure clears it, so the next
/// write re-establishes a baseline with a fetch.
pub struct Store<C> {
    platform: C,
    last_topology: Option<Vec<u8>>,
    last_known_version: Option<Version>,
    backoff: BackoffConfig,
    max_patch_retry: u32,
}

impl<C: TopologyClient> Store<C> {
    /// Creates a store writing through the given platform client.
    pub fn new(platform: C) -> Self {
        Self {
            platform,
            last_topology: None,
            last_known_version: None,
            backoff: BackoffConfig::default(),
            max_patch_retry: DEFAULT_MAX_PATCH_RETRY,
        }
    }

    /// Last version acknowledged by the platform, if a baseline is cached.
    pub fn last_known_version(&self) -> Option<&Version> {
        self.last_known_version.as_ref()
    }

    /// Writes the topology on the platform.
    ///
    /// Computes the merge patch between the cached baseline and `topology`
    /// and submits it conditioned on the cached version. On a retryable
    /// rejection (version conflict, server error, transport failure) the
    /// baseline is discarded and rebuilt from a fresh fetch before the next
    /// attempt, under an exponential backoff and a retry budget. A snapshot
    /// identical to the baseline returns immediately without any request.
    pub async fn write(&mut self, topology: &Cluster) -> Result<(), WriteError> {
        let mut backoff = Backoff::new(&self.backoff);
        let mut failures = 0u32;

        loop {
            let version = match self.last_known_version.clone() {
                Some(version) => version,
                None => {
                    // A failed fetch leaves the cache empty, so the next
                    // write starts from the fetch again.
                    let (remote, version) =
                        self.platform.fetch_topology().await.map_err(WriteError::Fetch)?;
                    let encoded = remote.encode().map_err(WriteError::BuildPatch)?;
                    self.last_topology = Some(encoded);
                    self.last_known_version = Some(version.clone());
                    version
                }
            };

            let baseline = self.last_topology.as_deref().unwrap_or_default();
            let (patch, next_encoded) = match build_patch(baseline, topology) {
                Ok(result) => result,
                Err(err) => {
                    self.reset();
                    return Err(WriteError::BuildPatch(err));
                }
            };
            let Some(patch) = patch else {
                return Ok(());
            };

            match self.platform.patch_topology(&patch, &version).await {
                Ok(new_version) => {
                    self.last_topology = Some(next_encoded);
                    self.last_known_version = Some(new_version);
                    return Ok(());
                }
                Err(err) if err.is_retryable() => {
                    // The version we conditioned on is stale or unknown;
                    // only a fresh fetch can tell.
                    self.reset();

                    failures += 1;
                    if failures >= self.max_patch_retry {
                        return Err(WriteError::RetryBudgetExhausted {
                            attempts: failures,
                            source: err,
                        });
                    }
                    let Some(delay) = backoff.next_delay() else {
                        return Err(WriteError::RetryBudgetExhausted {
                            attempts: failures,
                            source: err,
                        });
                    };

                    warn!(
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "Unable to patch topology, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.reset();
                    return Err(WriteError::Patch(err));
                }
            }
        }
    }

    fn reset(&mut self) {
        self.last_topology = None;
        self.last_known_version = None;
    }
}
