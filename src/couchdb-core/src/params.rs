//! Query string encoding for CouchDB options.
//!
//! View and `_all_docs` keys are JSON values on the wire, so `key=abc` must
//! be sent as `key="abc"`. Everything else is passed as plain text.

use serde_json::Value;

/// Request options, e.g. `{"include_docs": true, "limit": 10}`
pub type Params = serde_json::Map<String, Value>;

const JSON_KEYS: &[&str] = &["key", "keys", "startkey", "start_key", "endkey", "end_key"];

/// Flatten params into query pairs
pub fn encode_params(params: &Params) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(name, value)))
        .collect()
}

fn encode_value(name: &str, value: &Value) -> String {
    match value {
        Value::String(s) if !JSON_KEYS.contains(&name) => s.clone(),
        _ => value.to_string(),
    }
}

/// Build params from `(name, value)` pairs
pub fn to_params<I, K>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
