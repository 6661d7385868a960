//! Decoding of the per-user config path segment.
//!
//! Addon clients embed the user's settings as the first path segment. It is
//! either the bare API key or the JSON object `{"rd_api_key": "..."}`,
//! possibly still percent-encoded.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct UserConfig {
    #[serde(default)]
    rd_api_key: Option<String>,
}

/// API key carried by a config segment, or `None` when it holds no usable key.
pub fn api_key_from_segment(segment: &str) -> Option<String> {
    let segment = segment.trim();
    if segment.is_empty() {
        return None;
    }

    let decoded = match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    };

    let key = if decoded.trim_start().starts_with('{') {
        serde_json::from_str::<UserConfig>(&decoded)
            .ok()
            .and_then(|config| config.rd_api_key)?
    } else {
        decoded
    };

    let key = key.trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}
