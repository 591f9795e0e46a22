//! Shared HTTP plumbing
//!
//! Every adapter funnels responses through [`read_json`], which maps
//! transport errors, non-success statuses and undecodable bodies onto
//! [`RequestFailure`].

use serde_json::Value;
use tabula_core::{ConfigError, GatewayConfig, RequestFailure};
use url::Url;

/// Longest response body echoed back in a `Status` failure
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn build_client(config: &GatewayConfig) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {e}")))
}

pub(crate) fn parse_base(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid(format!("invalid base url `{raw}`: {e}")))
}

/// `{base}/{segments...}` with each segment percent-encoded
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

pub(crate) fn transport(err: &reqwest::Error) -> RequestFailure {
    if err.is_timeout() {
        RequestFailure::Transport(format!("request timed out: {err}"))
    } else {
        RequestFailure::Transport(err.to_string())
    }
}

/// Check the status and decode the body as JSON
///
/// An empty body decodes to `Value::Null`.
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value, RequestFailure> {
    let status = response.status();
    let url = response.url().clone();
    let body = response.text().await.map_err(|e| transport(&e))?;

    if !status.is_success() {
        tracing::debug!(%url, status = status.as_u16(), "request failed");
        let mut body = body;
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(RequestFailure::Status {
            status: status.as_u16(),
            body,
        });
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|e| RequestFailure::Malformed(format!("response from {url} is not JSON: {e}")))
}
