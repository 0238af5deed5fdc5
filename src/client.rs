use std::io;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::{self, LineStream};

/// Server used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:1234";

/// Endpoint for chat completions, relative to the base URL.
pub const CHAT_COMPLETIONS_ENDPOINT: &str = "v1/chat/completions";

/// Connect and total request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// The boundary between the chat runtime and the network.
///
/// Implementations post a JSON body to an endpoint and return either the whole response body
/// or its lines.  Any HTTP status of 400 or above must surface as [`Error::Service`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts `body` and returns the full response body.
    async fn send(&self, endpoint: &str, body: &Value) -> Result<String>;

    /// Posts `body` and returns the response body as a stream of lines.
    async fn send_streaming(&self, endpoint: &str, body: &Value) -> Result<LineStream>;
}

/// [`Transport`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport for `base_url` with the default timeout.
    ///
    /// An empty API key is the same as none: no authorization header is sent.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        Self::with_options(base_url, api_key, None)
    }

    /// Creates a transport with a custom timeout.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::connection(
                    format!("failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;
        let api_key = api_key.filter(|key| !key.is_empty());
        if let Some(key) = &api_key {
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
                Error::validation(
                    "API key contains characters not allowed in a header",
                    Some("api_key".to_string()),
                )
            })?;
        }
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
            timeout,
        })
    }

    /// The base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Joins the base URL and an endpoint.  Absolute endpoints are used as-is.
    pub fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    fn headers(&self, accept: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        if let Some(key) = &self.api_key
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}"))
        {
            headers.insert(header::AUTHORIZATION, value);
        }
        headers
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else {
            Error::connection(format!("request failed: {e}"), Some(Box::new(e)))
        }
    }

    async fn post(&self, endpoint: &str, body: &Value, accept: &'static str) -> Result<Response> {
        let response = self
            .client
            .post(self.url(endpoint))
            .headers(self.headers(accept))
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::service(status.as_u16(), body));
        }
        Ok(response)
    }
}

fn observe<T>(start: Instant, result: Result<T>) -> Result<T> {
    CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
    if result.is_err() {
        CLIENT_REQUEST_ERRORS.click();
    }
    result
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &str, body: &Value) -> Result<String> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = match self.post(endpoint, body, "application/json").await {
            Ok(response) => response.text().await.map_err(|e| self.request_error(e)),
            Err(err) => Err(err),
        };
        observe(start, result)
    }

    async fn send_streaming(&self, endpoint: &str, body: &Value) -> Result<LineStream> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let response = observe(start, self.post(endpoint, body, "text/event-stream").await)?;
        let bytes = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| {
                let kind = if e.is_timeout() {
                    io::ErrorKind::TimedOut
                } else {
                    io::ErrorKind::Other
                };
                io::Error::new(kind, e)
            })
        });
        Ok(sse::lines(bytes))
    }
}
