//! Helpers for the server integration tests.

use anyhow::Context as _;
use axum::{
    Extension, Json, Router,
    body::Bytes,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeMap;
use std::net::TcpListener;
use std::process::Child;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Kills the spawned server when the test ends, pass or fail.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Pick an unused TCP port on localhost.
///
/// The port is not reserved; another process may still take it first.
///
/// # Errors
///
/// Returns an error if no ephemeral port can be bound.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// Poll `url` until it answers with a 2xx status.
///
/// # Errors
///
/// Returns an error if `timeout_dur` elapses first.
pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout_dur {
            anyhow::bail!("timed out waiting for {url}");
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
}

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Decoded query pairs in wire order; repeated keys appear repeatedly.
    pub query: Vec<(String, String)>,
    /// Lower-cased header names.
    pub headers: BTreeMap<String, String>,
    pub content_type: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    #[must_use]
    pub fn query_values(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// # Errors
    ///
    /// Returns an error if the body is not JSON.
    pub fn json_body(&self) -> anyhow::Result<serde_json::Value> {
        serde_json::from_str(&self.body).context("request body is not JSON")
    }
}

type RequestLog = Arc<Mutex<Vec<RecordedRequest>>>;

/// Mock HTTP backend that records every request.
///
/// Any path answers `200` with `{"ok": true, "method": .., "path": ..}`, except paths ending in
/// `/fail`, which answer `500` with the text `backend failure`.
pub struct RecordingBackend {
    base_url: String,
    requests: RequestLog,
    server: tokio::task::JoinHandle<()>,
}

impl RecordingBackend {
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind backend")?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let requests = RequestLog::default();

        let app = Router::new()
            .fallback(record)
            .layer(Extension(requests.clone()));
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url,
            requests,
            server,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<RecordedRequest> {
        self.requests.lock().last().cloned()
    }
}

impl Drop for RecordingBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn record(
    Extension(log): Extension<RequestLog>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let query = uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();
    let header_map: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();
    let path = uri.path().to_string();

    log.lock().push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        query,
        content_type: header_map.get("content-type").cloned(),
        headers: header_map,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    if path.ends_with("/fail") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "backend failure").into_response();
    }
    Json(json!({"ok": true, "method": method.as_str(), "path": path})).into_response()
}
