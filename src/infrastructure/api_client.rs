//! HTTP client for the download service
//!
//! Implements [`StatusSource`] and [`DownloadControl`] on top of one shared
//! `reqwest::Client`. Every request carries the bearer token from the
//! [`AuthProvider`]; responses are classified into [`MonitorError`] variants
//! so the monitor can tell "busy" from "gone" from "logged out".

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::domain::errors::MonitorError;
use crate::domain::ports::{AuthProvider, DownloadControl, StatusSource};
use crate::domain::snapshot::{ActionReply, DownloadState, ProgressSnapshot};
use crate::infrastructure::config::ApiConfig;

pub const PROGRESS_PATH: &str = "download-progress";
pub const STATE_PATH: &str = "download/state";
pub const CANCEL_PATH: &str = "download/cancel";
pub const RESUME_PATH: &str = "download/resume";
pub const CLEAR_COMPLETED_PATH: &str = "download/clear-completed";

const MAX_DETAIL_CHARS: usize = 200;

pub struct ApiClient {
    client: Client,
    base_url: Url,
    auth: Arc<dyn AuthProvider>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: normalize_base(&config.base_url)?,
            auth,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, MonitorError> {
        self.base_url
            .join(path)
            .map_err(|e| MonitorError::Config(format!("invalid endpoint {path}: {e}")))
    }

    async fn request<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T, MonitorError> {
        let endpoint = format!("/{path}");
        let url = self.endpoint(path)?;
        let token = self
            .auth
            .bearer_token()
            .ok_or_else(|| MonitorError::Auth {
                endpoint: endpoint.clone(),
            })?;

        trace!("{} {}", method, url);
        let response = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| MonitorError::transport(&endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MonitorError::transport(&endpoint, e))?;

        if !status.is_success() {
            return Err(classify_failure(status, &endpoint, &body));
        }

        debug!("{} -> {} ({} bytes)", endpoint, status, body.len());
        serde_json::from_str(&body).map_err(|e| MonitorError::protocol(&endpoint, e))
    }
}

/// Base URL with a trailing slash so relative joins keep any path prefix
fn normalize_base(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).with_context(|| format!("Invalid base URL: {raw}"))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Map a non-success status to the error taxonomy
pub fn classify_failure(status: StatusCode, endpoint: &str, body: &str) -> MonitorError {
    match status {
        StatusCode::UNAUTHORIZED => MonitorError::Auth {
            endpoint: endpoint.to_string(),
        },
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => {
            MonitorError::ServerBusy {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
            }
        }
        _ => MonitorError::Http {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
            detail: extract_detail(status, body),
        },
    }
}

/// `{detail}` then `{message}` from a JSON body, else the raw text
fn extract_detail(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "message"] {
            match value.get(key) {
                Some(serde_json::Value::String(text)) => {
                    if !text.is_empty() {
                        return text.clone();
                    }
                }
                Some(serde_json::Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }

    let text = body.trim();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        text.chars().take(MAX_DETAIL_CHARS).collect()
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_progress(&self) -> Result<ProgressSnapshot, MonitorError> {
        self.request(Method::GET, PROGRESS_PATH).await
    }
}

#[async_trait]
impl DownloadControl for ApiClient {
    async fn download_state(&self) -> Result<DownloadState, MonitorError> {
        self.request(Method::GET, STATE_PATH).await
    }

    async fn cancel(&self) -> Result<ActionReply, MonitorError> {
        self.request(Method::POST, CANCEL_PATH).await
    }

    async fn resume(&self) -> Result<ActionReply, MonitorError> {
        self.request(Method::POST, RESUME_PATH).await
    }

    async fn clear_completed(&self) -> Result<ActionReply, MonitorError> {
        self.request(Method::POST, CLEAR_COMPLETED_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::StaticToken;
    use rstest::rstest;

    fn client(base_url: &str, token: Option<&str>) -> ApiClient {
        let config = ApiConfig {
            base_url: base_url.to_string(),
            request_timeout_seconds: 2,
            ..ApiConfig::default()
        };
        ApiClient::new(&config, Arc::new(StaticToken::new(token.map(str::to_string)))).unwrap()
    }

    #[rstest]
    #[case(401, "", "auth_rejected")]
    #[case(503, "", "server_busy")]
    #[case(504, "", "server_busy")]
    #[case(408, "", "server_busy")]
    #[case(500, r#"{"detail": "boom"}"#, "http_error")]
    #[case(404, "", "http_error")]
    fn test_status_classification(#[case] status: u16, #[case] body: &str, #[case] reason: &str) {
        let status = StatusCode::from_u16(status).unwrap();
        assert_eq!(classify_failure(status, "/download-progress", body).reason(), reason);
    }

    #[rstest]
    #[case(r#"{"detail": "No saved session"}"#, "No saved session")]
    #[case(r#"{"message": "Already running"}"#, "Already running")]
    #[case(r#"{"detail": {"code": 7}}"#, r#"{"code":7}"#)]
    #[case("plain text failure", "plain text failure")]
    #[case("", "Bad Request")]
    fn test_detail_extraction(#[case] body: &str, #[case] expected: &str) {
        assert_eq!(extract_detail(StatusCode::BAD_REQUEST, body), expected);
    }

    #[rstest]
    #[case("http://localhost:8000", "http://localhost:8000/download-progress")]
    #[case("http://nas.local/api", "http://nas.local/api/download-progress")]
    #[case("http://nas.local/api/", "http://nas.local/api/download-progress")]
    fn test_endpoints_keep_base_path(#[case] base: &str, #[case] expected: &str) {
        let api = client(base, Some("t"));
        assert_eq!(api.endpoint(PROGRESS_PATH).unwrap().as_str(), expected);
    }

    #[tokio::test]
    async fn test_missing_token_is_auth_error_without_request() {
        let api = client("http://127.0.0.1:9", None);
        let error = api.fetch_progress().await.unwrap_err();
        assert_eq!(
            error,
            MonitorError::Auth {
                endpoint: "/download-progress".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let api = client("http://127.0.0.1:9", Some("token"));
        let error = api.download_state().await.unwrap_err();
        assert_eq!(error.reason(), "no_response");
        assert!(error.counts_toward_threshold());
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config = ApiConfig {
            base_url: "::not a url".into(),
            ..ApiConfig::default()
        };
        assert!(ApiClient::new(&config, Arc::new(StaticToken::new(None))).is_err());
    }
}
