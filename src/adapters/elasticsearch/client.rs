//! Elasticsearch HTTP client
//!
//! Thin JSON-over-HTTP wrapper shared by the source and the bulk sink.
//! Failures are reported as [`TransportError`], which each side converts into
//! its own error type so transient classification carries over.

use crate::config::SecretString;
use crate::domain::{AnonymizeError, Result, SinkError, SourceError};
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Connection parameters common to the source and the sink
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionParams {
    /// Base URL, e.g. `https://localhost:9200`
    pub host: String,

    /// Basic authentication user
    #[serde(default)]
    pub username: Option<String>,

    /// Basic authentication password
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Verify TLS certificates
    #[serde(default = "default_true")]
    pub tls_verify: bool,
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// Request failure before it is attributed to the source or the sink
#[derive(Debug)]
pub enum TransportError {
    /// The server could not be reached
    Connect(String),
    /// The request timed out
    Timeout(String),
    /// The server answered with a non-success status
    Status { status: StatusCode, body: String },
    /// The response body was not the expected JSON
    Decode(String),
}

impl From<TransportError> for SourceError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Connect(msg) => SourceError::ConnectionFailed(msg),
            TransportError::Timeout(msg) => SourceError::Timeout(msg),
            TransportError::Status { status, body } => match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    SourceError::AuthenticationFailed(format!("{status}: {body}"))
                }
                s if s.is_server_error() => SourceError::ServerError {
                    status: s.as_u16(),
                    message: body,
                },
                s => SourceError::ClientError {
                    status: s.as_u16(),
                    message: body,
                },
            },
            TransportError::Decode(msg) => SourceError::InvalidResponse(msg),
        }
    }
}

impl From<TransportError> for SinkError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Connect(msg) => SinkError::ConnectionFailed(msg),
            TransportError::Timeout(msg) => SinkError::Timeout(msg),
            TransportError::Status { status, body } if status.is_server_error() => {
                SinkError::ServerError {
                    status: status.as_u16(),
                    message: body,
                }
            }
            TransportError::Status { status, body } => SinkError::ClientError {
                status: status.as_u16(),
                message: body,
            },
            TransportError::Decode(msg) => SinkError::WriteFailed(msg),
        }
    }
}

/// Elasticsearch REST client
#[derive(Clone)]
pub struct ElasticsearchClient {
    base_url: String,
    client: Client,
    auth_header: Option<SecretString>,
}

impl ElasticsearchClient {
    /// Builds a client from connection parameters
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the host is not a valid URL or the
    /// HTTP client cannot be built.
    pub fn new(params: &ConnectionParams) -> Result<Self> {
        let base_url = params.host.trim_end_matches('/').to_string();
        url::Url::parse(&base_url).map_err(|e| {
            AnonymizeError::Configuration(format!("Invalid Elasticsearch host '{base_url}': {e}"))
        })?;

        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(params.timeout_seconds))
            .connect_timeout(Duration::from_secs(30));
        if !params.tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(|e| {
            AnonymizeError::Configuration(format!("Failed to build HTTP client: {e}"))
        })?;

        let auth_header = match (&params.username, &params.password) {
            (Some(username), Some(password)) => {
                let credentials = format!("{username}:{}", password.expose_secret().as_ref());
                let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
                Some(crate::config::secret_string(format!("Basic {encoded}")))
            }
            _ => None,
        };

        Ok(Self {
            base_url,
            client,
            auth_header,
        })
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a JSON request and decodes the JSON response
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<Value, TransportError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.execute(request).await
    }

    /// Sends a newline-delimited JSON body
    pub async fn send_ndjson(
        &self,
        path: &str,
        body: String,
    ) -> std::result::Result<Value, TransportError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let request = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-ndjson")
            .body(body);
        self.execute(request).await
    }

    async fn execute(
        &self,
        mut request: reqwest::RequestBuilder,
    ) -> std::result::Result<Value, TransportError> {
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth.expose_secret().as_ref());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(e.to_string())
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}
