//! Transport to the remote execution backend
//!
//! The transport only moves bytes: any HTTP response (including non-2xx)
//! comes back as a `RawResponse`. Only failures where no response was
//! obtained are reported as `TransportError`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::languages::Language;
use crate::session::Session;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Immutable snapshot of what to run, taken when the run starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub language: Language,
    pub code: String,
    pub input: String,
}

impl From<&Session> for RunRequest {
    fn from(session: &Session) -> Self {
        Self {
            language: session.language,
            code: session.code.clone(),
            input: session.input.clone(),
        }
    }
}

/// HTTP status and undecoded body as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },
    #[error("failed to read response body from {endpoint}: {reason}")]
    Body { endpoint: String, reason: String },
    #[error("request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },
}

/// Sends a run request and returns whatever the backend answered
#[async_trait]
pub trait Transport: Send + Sync {
    /// Address requests are sent to, used in troubleshooting messages
    fn endpoint(&self) -> &str;

    async fn send(&self, request: &RunRequest) -> Result<RawResponse, TransportError>;
}

/// reqwest based transport posting JSON to a fixed endpoint
pub struct HttpTransport {
    endpoint: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| TransportError::Request {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { endpoint, client })
    }

    fn classify(&self, e: reqwest::Error) -> TransportError {
        let endpoint = self.endpoint.clone();
        if e.is_timeout() {
            TransportError::Timeout { endpoint }
        } else if e.is_connect() {
            TransportError::Connect {
                endpoint,
                reason: e.to_string(),
            }
        } else if e.is_body() || e.is_decode() {
            TransportError::Body {
                endpoint,
                reason: e.to_string(),
            }
        } else {
            TransportError::Request {
                endpoint,
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: &RunRequest) -> Result<RawResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        debug!(
            "Backend answered HTTP {} with {} bytes",
            status,
            body.len()
        );

        Ok(RawResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_request() -> RunRequest {
        RunRequest {
            language: Language::Python,
            code: "print(input())".to_string(),
            input: "hello".to_string(),
        }
    }

    #[test]
    fn test_request_snapshot_from_session() {
        let session = Session {
            language: Language::Java,
            code: "class Main {}".to_string(),
            input: "3".to_string(),
            font_size: 14,
        };
        let request = RunRequest::from(&session);
        assert_eq!(request.language, Language::Java);
        assert_eq!(request.code, "class Main {}");
        assert_eq!(request.input, "3");
    }

    #[tokio::test]
    async fn test_posts_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/run"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "language": "python",
                "code": "print(input())",
                "input": "hello",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(format!("{}/api/run", server.uri())).unwrap();
        let raw = transport.send(&sample_request()).await.unwrap();

        assert_eq!(raw.status, 200);
        assert_eq!(raw.body, b"hello");
    }

    #[tokio::test]
    async fn test_non_success_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri()).unwrap();
        let raw = transport.send(&sample_request()).await.unwrap();

        assert_eq!(raw.status, 500);
        assert_eq!(raw.body, b"boom");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // Nothing listens on port 9 (discard) on test machines
        let transport = HttpTransport::new("http://127.0.0.1:9/api/run").unwrap();
        let err = transport.send(&sample_request()).await.unwrap_err();

        assert!(matches!(
            err,
            TransportError::Connect { .. } | TransportError::Request { .. }
        ));
    }
}
