//! JSON Merge Patch construction (RFC 7396).
//!
//! Given the previously synchronized encoding and a new snapshot, produces
//! the minimal merge patch transforming one into the other. Objects merge
//! recursively, a `null` deletes a field, and arrays are replaced wholesale;
//! whole-array replacement is load-bearing for port and host lists, which the
//! platform treats as atomic values.

use serde_json::{Map, Value};

use super::state::Cluster;

/// Computes the merge patch turning the `prev` encoding into the canonical
/// encoding of `next`.
///
/// Returns `(patch, next_encoded)`. The patch is `None` when both encodings
/// are byte-equal, in which case the caller must skip submission.
pub fn build_patch(
    prev: &[u8],
    next: &Cluster,
) -> Result<(Option<Vec<u8>>, Vec<u8>), serde_json::Error> {
    let next_encoded = next.encode()?;
    if prev == next_encoded.as_slice() {
        return Ok((None, next_encoded));
    }

    let prev_value: Value = serde_json::from_slice(prev)?;
    let next_value: Value = serde_json::from_slice(&next_encoded)?;

    let patch = serde_json::to_vec(&merge_patch(&prev_value, &next_value))?;
    Ok((Some(patch), next_encoded))
}

/// Computes the RFC 7396 merge patch transforming `prev` into `next`.
///
/// Anything that is not a pair of objects is replaced wholesale; in
/// particular arrays never merge element-wise.
fn merge_patch(prev: &Value, next: &Value) -> Value {
    match (prev, next) {
        (Value::Object(prev), Value::Object(next)) => {
            let mut patch = Map::new();

            for (key, prev_value) in prev {
                match next.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(next_value) if next_value != prev_value => {
                        patch.insert(key.clone(), merge_patch(prev_value, next_value));
                    }
                    Some(_) => {}
                }
            }

            for (key, next_value) in next {
                if !prev.contains_key(key) {
                    patch.insert(key.clone(), next_value.clone());
                }
            }

            Value::Object(patch)
        }
        _ => next.clone(),
    }
}
