//! Cluster topology snapshot model and its synchronization machinery.
//!
//! [`state`] defines the snapshot value and its canonical encoding, [`patch`]
//! turns two encodings into a minimal JSON Merge Patch, [`store`] replicates
//! snapshots onto the platform with optimistic concurrency, and [`watch`]
//! produces snapshots from the Kubernetes API.

pub mod patch;
pub mod state;
pub mod store;
pub mod watch;
