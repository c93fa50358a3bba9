//! Atlas - cluster-side agent that synchronizes ingress topology with the platform
//!
//! The agent watches the cluster's observable ingress surface (workloads,
//! services, ingresses, ingress controllers, access-control policies, TLS
//! options), assembles point-in-time snapshots, and replicates them onto the
//! remote control-plane platform.
//!
//! Replication is incremental: the platform holds the canonical copy, and the
//! agent submits version-conditioned JSON Merge Patches (RFC 7396) computed
//! against the last acknowledged state. Conflicts are resolved by re-fetching
//! the canonical copy and rebuilding the patch.
//!
//! # Modules
//!
//! - [`topology`] - snapshot model, patch builder, sync engine, and producer
//! - [`platform`] - HTTP client for the control-plane platform
//! - [`retry`] - backoff and retry utilities shared by the wire client and the
//!   sync engine

pub mod platform;
pub mod retry;
pub mod topology;
