//! Plain HTTP listing endpoints.

use crate::registry::{Namespace, SharedRegistry};
use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use mcp_openapi_tools::descriptor::ToolParameter;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct ToolListing<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a [ToolParameter],
}

#[derive(Serialize)]
struct ToolSummary<'a> {
    name: &'a str,
    description: &'a str,
}

pub fn router(registry: SharedRegistry) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_all_tools))
        .route("/tools/{namespace}", get(list_namespace_tools))
        .layer(Extension(registry))
}

async fn health() -> &'static str {
    "ok"
}

fn listings(namespace: &Namespace) -> Vec<ToolListing<'_>> {
    namespace
        .tools
        .iter()
        .map(|t| ToolListing {
            name: &t.name,
            description: &t.description,
            parameters: &t.parameters,
        })
        .collect()
}

async fn list_all_tools(Extension(registry): Extension<SharedRegistry>) -> impl IntoResponse {
    let snapshot = registry.snapshot();
    let body: BTreeMap<&str, Vec<ToolListing<'_>>> = snapshot
        .namespaces()
        .map(|ns| (ns.namespace.as_str(), listings(ns)))
        .collect();
    Json(json!(body))
}

async fn list_namespace_tools(
    Extension(registry): Extension<SharedRegistry>,
    Path(namespace): Path<String>,
) -> impl IntoResponse {
    let Some(ns) = registry.snapshot().get(&namespace) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Namespace '{namespace}' not found") })),
        )
            .into_response();
    };
    let tools: Vec<ToolSummary<'_>> = ns
        .tools
        .iter()
        .map(|t| ToolSummary {
            name: &t.name,
            description: &t.description,
        })
        .collect();
    Json(json!(tools)).into_response()
}
