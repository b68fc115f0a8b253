//! Request/response contract between the invocation dispatcher and the network layer.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpToolsError {
    #[error("invalid url '{url}': {message}")]
    InvalidUrl { url: String, message: String },
    #[error("http client error: {0}")]
    Client(String),
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("failed to read response body: {0}")]
    ReadBody(String),
}

pub type Result<T> = std::result::Result<T, HttpToolsError>;

impl From<reqwest::Error> for HttpToolsError {
    fn from(value: reqwest::Error) -> Self {
        // Drop the URL: forwarded query params may carry credentials.
        Self::Transport(value.without_url().to_string())
    }
}

/// How the request body is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyEncoding {
    #[default]
    Json,
    Form,
}

impl BodyEncoding {
    /// Map an `OpenAPI` media type to a body encoding.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            Self::Form
        } else {
            Self::Json
        }
    }
}

/// One outbound call, fully assembled by the dispatcher.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Absolute URL with path parameters already substituted.
    pub url: String,
    pub query: Map<String, Value>,
    pub body: Option<Value>,
    pub body_encoding: BodyEncoding,
    /// Headers of the request that triggered this call; the proxy decides which to forward.
    pub inbound_headers: HeaderMap,
}

impl ProxyRequest {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Map::new(),
            body: None,
            body_encoding: BodyEncoding::Json,
            inbound_headers: HeaderMap::new(),
        }
    }
}

/// Performs the network call for a tool invocation and returns the response body text.
#[async_trait]
pub trait HttpProxy: Send + Sync {
    async fn execute(&self, request: ProxyRequest) -> Result<String>;
}
