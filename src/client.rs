// src/client.rs - HTTP transport and Moonraker endpoint helpers
use crate::telemetry::{PrinterTelemetry, STATUS_OBJECTS};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("HTTP {code} from {url}")]
    Status { code: u16, url: String },
    #[error("Invalid response: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether retrying the same request unchanged can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::Connect(_) => true,
            TransportError::Status { code, .. } => *code >= 500,
            TransportError::Decode(_) | TransportError::Other(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status {
                code: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else if e.is_decode() || e.is_body() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Minimal GET abstraction the status engine is written against.
///
/// Paths are relative to the printer base URL unless they already carry a
/// scheme.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, path: &str) -> Result<Value, TransportError>;

    /// Fetch at most `max_bytes` from the start of the resource.
    async fn get_bytes(&self, path: &str, max_bytes: usize) -> Result<Vec<u8>, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration, api_key: Option<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("krusty-overlay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// The API key only goes to the printer itself, never to absolute URLs
    /// on other hosts such as a camera.
    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.get(url).timeout(self.timeout);
        match &self.api_key {
            Some(key) if self.is_printer_url(url) => builder.header("X-Api-Key", key),
            _ => builder,
        }
    }

    fn is_printer_url(&self, url: &str) -> bool {
        url.strip_prefix(&self.base_url)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);
        let response = self.request(&url).send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }

    async fn get_bytes(&self, path: &str, max_bytes: usize) -> Result<Vec<u8>, TransportError> {
        let url = self.url(path);
        tracing::debug!("GET {} (first {} bytes)", url, max_bytes);
        let mut response = self
            .request(&url)
            .header(reqwest::header::RANGE, format!("bytes=0-{}", max_bytes.saturating_sub(1)))
            .send()
            .await?
            .error_for_status()?;
        // Servers that ignore Range still only get read up to the window.
        let mut body = Vec::with_capacity(max_bytes.min(1 << 20));
        while body.len() < max_bytes {
            match response.chunk().await? {
                Some(chunk) => body.extend_from_slice(&chunk),
                None => break,
            }
        }
        body.truncate(max_bytes);
        Ok(body)
    }
}

/// Moonraker endpoint layout on top of a [`Transport`].
#[derive(Debug, Clone)]
pub struct MoonrakerApi<T> {
    transport: T,
    catalog_timeout: Duration,
}

impl<T: Transport> MoonrakerApi<T> {
    pub fn new(transport: T, catalog_timeout: Duration) -> Self {
        Self { transport, catalog_timeout }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn status_query_path() -> String {
        format!("/printer/objects/query?{}", STATUS_OBJECTS.join("&"))
    }

    pub fn object_query_path(name: &str) -> String {
        format!("/printer/objects/query?{}", urlencoding::encode(name))
    }

    pub fn metadata_path(file: &str) -> String {
        format!("/server/files/metadata?filename={}", urlencoding::encode(file))
    }

    /// Download path for a file given relative to the file-manager roots,
    /// e.g. `gcodes/sub/part.gcode`.
    pub fn file_path(root_relative: &str) -> String {
        let encoded: Vec<_> = root_relative
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("/server/files/{}", encoded.join("/"))
    }

    /// Consolidated telemetry for every object in [`STATUS_OBJECTS`].
    pub async fn query_status(&self) -> Result<PrinterTelemetry, TransportError> {
        let response = self.transport.get_json(&Self::status_query_path()).await?;
        PrinterTelemetry::from_response(response)
    }

    /// Every object name the printer exposes.
    pub async fn list_objects(&self) -> Result<Vec<String>, TransportError> {
        let response = tokio::time::timeout(self.catalog_timeout, self.transport.get_json("/printer/objects/list"))
            .await
            .map_err(|_| TransportError::Timeout)??;
        let objects = response
            .get("result")
            .and_then(|r| r.get("objects"))
            .and_then(Value::as_array)
            .ok_or_else(|| TransportError::Decode("response has no result.objects".to_string()))?;
        Ok(objects.iter().filter_map(Value::as_str).map(str::to_string).collect())
    }

    /// Status fields of a single object, `None` if the printer returned
    /// nothing under that name.
    pub async fn query_object(&self, name: &str) -> Result<Option<Value>, TransportError> {
        let response = self.transport.get_json(&Self::object_query_path(name)).await?;
        Ok(response
            .get("result")
            .and_then(|r| r.get("status"))
            .and_then(|s| s.get(name))
            .filter(|v| v.is_object())
            .cloned())
    }

    /// File metadata as reported by the file manager.
    pub async fn file_metadata(&self, file: &str) -> Result<Option<Value>, TransportError> {
        let response = self.transport.get_json(&Self::metadata_path(file)).await?;
        Ok(response.get("result").filter(|v| v.is_object()).cloned())
    }

    /// The first `max_bytes` of a file, decoded lossily as text.
    pub async fn fetch_file_head(&self, root_relative: &str, max_bytes: usize) -> Result<String, TransportError> {
        let bytes = self.transport.get_bytes(&Self::file_path(root_relative), max_bytes).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
