//! Redaction of RPC endpoints in logs
//!
//! Hosted RPC providers put API keys in the URL path or query
//! (`https://mainnet.infura.io/v3/<key>`). Endpoints are logged through
//! [`redact_url`] so only scheme, host and port ever reach the logs.

use url::Url;

/// Strip path, query, fragment and credentials from a URL
///
/// Unparseable input is fully redacted.
pub fn redact_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return "<redacted>".to_string();
    };

    let mut out = format!("{}://", url.scheme());
    if let Some(host) = url.host_str() {
        out.push_str(host);
    }
    if let Some(port) = url.port() {
        out.push_str(&format!(":{}", port));
    }

    let has_secret_parts = (url.path() != "/" && !url.path().is_empty())
        || url.query().is_some()
        || url.fragment().is_some()
        || !url.username().is_empty()
        || url.password().is_some();
    if has_secret_parts {
        out.push_str("/<redacted>");
    }
    out
}
