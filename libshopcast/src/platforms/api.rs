//! HTTP plumbing shared by the platform adapters

use std::time::Duration;

use reqwest::{Client, Response};
use serde_json::Value;

use crate::error::PlatformError;
use crate::types::Platform;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> Result<Client, PlatformError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("shopcast/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(PlatformError::from)
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Read a response body as JSON, turning error statuses into `PlatformError`
pub(crate) async fn read_json(
    platform: Platform,
    response: Response,
) -> Result<Value, PlatformError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(api_error(platform, Some(status.as_u16()), &body));
    }

    serde_json::from_str(&body).map_err(|e| PlatformError::Api {
        platform: platform.to_string(),
        status: Some(status.as_u16()),
        code: None,
        subcode: None,
        message: format!("unreadable response body: {}", e),
    })
}

/// Build an error from a platform error payload
///
/// Understands the Graph shape `{"error":{"message","code","error_subcode"}}`
/// and the Pinterest shape `{"code","message"}`. The platform's message is
/// kept verbatim; unparseable bodies are passed through as the message.
pub(crate) fn api_error(platform: Platform, status: Option<u16>, body: &str) -> PlatformError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let payload = parsed
        .as_ref()
        .map(|v| if v.get("error").map_or(false, Value::is_object) { &v["error"] } else { v });

    let message = payload
        .and_then(|p| p.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("HTTP {}", status.map_or_else(|| "error".to_string(), |s| s.to_string()))
            } else {
                trimmed.to_string()
            }
        });
    let code = payload.and_then(|p| p.get("code")).and_then(Value::as_i64);
    let subcode = payload.and_then(|p| p.get("error_subcode")).and_then(Value::as_i64);

    if status == Some(429) {
        return PlatformError::RateLimit(format!("{}: {}", platform, message));
    }

    PlatformError::Api {
        platform: platform.to_string(),
        status,
        code,
        subcode,
        message,
    }
}

/// Read an integer that platforms sometimes send as a string
pub(crate) fn count(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_payload() {
        let body = r#"{"error":{"message":"Media ID is not available","type":"OAuthException",
            "code":100,"error_subcode":33}}"#;
        match api_error(Platform::Instagram, Some(400), body) {
            PlatformError::Api {
                status,
                code,
                subcode,
                message,
                ..
            } => {
                assert_eq!(status, Some(400));
                assert_eq!(code, Some(100));
                assert_eq!(subcode, Some(33));
                assert_eq!(message, "Media ID is not available");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_pinterest_error_payload() {
        let body = r#"{"code":2,"message":"Board not found."}"#;
        let error = api_error(Platform::Pinterest, Some(404), body);
        assert_eq!(error.to_string(), "pinterest API error: Board not found.");
        assert!(error.indicates_deletion());
    }

    #[test]
    fn test_non_json_body_kept_verbatim() {
        let error = api_error(Platform::Facebook, Some(502), "Bad Gateway");
        assert_eq!(error.to_string(), "facebook API error: Bad Gateway");
    }

    #[test]
    fn test_rate_limit_status() {
        let body = r#"{"code":8,"message":"Too many requests"}"#;
        let error = api_error(Platform::Pinterest, Some(429), body);
        assert!(matches!(error, PlatformError::RateLimit(_)));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:1234/", "/1784/media"),
            "http://localhost:1234/1784/media"
        );
    }

    #[test]
    fn test_count_accepts_strings() {
        assert_eq!(count(&serde_json::json!(12)), 12);
        assert_eq!(count(&serde_json::json!("7")), 7);
        assert_eq!(count(&Value::Null), 0);
    }
}
