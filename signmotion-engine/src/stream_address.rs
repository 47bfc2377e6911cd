//! Stream address derivation.
//!
//! The backend reports the stream address as seen from its own host. The
//! client rewrites it to the public origin before connecting.

use crate::config::ApiConfig;
use crate::error::EngineError;
use tracing::debug;
use url::Url;

/// Resolve a backend-reported stream address:
///
/// 1. the development origin (`ws://localhost:8000`) becomes the public one;
/// 2. a bare path is made absolute against the public origin;
/// 3. the path gets a trailing `/`;
/// 4. the `token` query parameter is set when a token is available.
pub fn resolve(raw: &str, api: &ApiConfig, token: Option<&str>) -> Result<String, EngineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(EngineError::Config("Empty stream address".to_string()));
    }

    let origin = api.stream_origin.trim_end_matches('/');
    let mut address = if !api.local_stream_origin.is_empty() && raw.contains(&api.local_stream_origin) {
        raw.replacen(&api.local_stream_origin, origin, 1)
    } else {
        raw.to_string()
    };

    if address.starts_with('/') {
        address = format!("{}{}", origin, address);
    }

    let mut url = Url::parse(&address)?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(EngineError::Config(format!(
            "Stream address must use ws or wss: {}",
            url
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    if let Some(token) = token.filter(|t| !t.is_empty()) {
        set_query_param(&mut url, "token", token);
    }

    debug!("Resolved stream address for {}", url.host_str().unwrap_or("<no host>"));
    Ok(url.to_string())
}

/// Replace every `key` parameter with a single `key=value`, keeping the others.
fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &retained {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(key, value);
}
