//! reqwest-backed [`HttpProxy`] with header and query forwarding.

use crate::proxy::{BodyEncoding, HttpProxy, HttpToolsError, ProxyRequest, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Which parts of the inbound request are passed through to the backend.
#[derive(Debug, Clone, Default)]
pub struct ForwardingPolicy {
    /// Inbound header names copied onto the outbound request (case-insensitive).
    pub headers: Vec<String>,
    /// Static query parameters appended to every outbound request.
    pub query_params: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct ReqwestProxy {
    client: Client,
    policy: Arc<ForwardingPolicy>,
    timeout: Option<Duration>,
}

impl ReqwestProxy {
    /// Build a proxy with its own client.
    ///
    /// A zero `timeout` disables the per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(policy: ForwardingPolicy, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| HttpToolsError::Client(e.to_string()))?;
        Ok(Self::with_client(client, policy, timeout))
    }

    #[must_use]
    pub fn with_client(client: Client, policy: ForwardingPolicy, timeout: Duration) -> Self {
        Self {
            client,
            policy: Arc::new(policy),
            timeout: (!timeout.is_zero()).then_some(timeout),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &ForwardingPolicy {
        &self.policy
    }
}

#[async_trait]
impl HttpProxy for ReqwestProxy {
    async fn execute(&self, request: ProxyRequest) -> Result<String> {
        let mut pairs = query_pairs(&request.query);
        pairs.extend(self.policy.query_params.iter().cloned());
        let url = build_url(&request.url, &pairs)?;

        debug!("{} {}", request.method, request.url);
        let mut builder = self.client.request(request.method.clone(), url);
        builder = apply_forwarded_headers(builder, &self.policy.headers, &request.inbound_headers);
        builder = apply_body(builder, request.body.as_ref(), request.body_encoding);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| HttpToolsError::ReadBody(e.without_url().to_string()))?;

        if !status.is_success() {
            warn!(
                "Backend returned {} for {} {}",
                status, request.method, request.url
            );
        }
        Ok(text)
    }
}

/// Flatten a query map into key/value pairs. Arrays explode into repeated keys.
fn query_pairs(query: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(query.len());
    for (key, value) in query {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                pairs.extend(items.iter().map(|v| (key.clone(), value_to_string(v))));
            }
            other => pairs.push((key.clone(), value_to_string(other))),
        }
    }
    pairs
}

fn build_url(url: &str, pairs: &[(String, String)]) -> Result<Url> {
    let mut parsed = Url::parse(url).map_err(|e| HttpToolsError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    if !pairs.is_empty() {
        let mut query = parsed.query().unwrap_or_default().to_string();
        for (key, value) in pairs {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(&percent_encode(key));
            query.push('=');
            query.push_str(&percent_encode(value));
        }
        parsed.set_query(Some(&query));
    }

    Ok(parsed)
}

fn apply_forwarded_headers(
    mut request: reqwest::RequestBuilder,
    names: &[String],
    inbound: &HeaderMap,
) -> reqwest::RequestBuilder {
    for name in names {
        let Ok(header) = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()) else {
            warn!("Ignoring invalid forward header name '{name}'");
            continue;
        };
        for value in inbound.get_all(&header) {
            request = request.header(header.clone(), value.clone());
        }
    }
    request
}

fn apply_body(
    request: reqwest::RequestBuilder,
    body: Option<&Value>,
    encoding: BodyEncoding,
) -> reqwest::RequestBuilder {
    let Some(body) = body else {
        return request;
    };
    match (encoding, body) {
        (BodyEncoding::Form, Value::Object(fields)) => request.form(&query_pairs(fields)),
        (BodyEncoding::Form, other) => request
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(value_to_string(other)),
        (BodyEncoding::Json, payload) => request.json(payload),
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
#[must_use]
pub fn percent_encode(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

/// Render a JSON value the way it appears in a query string or form field.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}
