//! Deterministic cache key derivation for API responses.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Request parameters distinguishing entries that share an endpoint.
pub type Params = Map<String, Value>;

/// Derive the cache key for an endpoint and its parameters.
///
/// The key is the endpoint followed by the compact JSON of `params` with its
/// top-level keys sorted, so insertion order never changes the key.
pub fn generate_key(endpoint: &str, params: &Params) -> String {
    let sorted: BTreeMap<&String, &Value> = params.iter().collect();
    // Serializing a map of strings to JSON values cannot fail.
    let serialized = serde_json::to_string(&sorted).unwrap_or_else(|_| "{}".to_string());
    format!("{endpoint}{serialized}")
}
