//! Invocation dispatch: map a tool call's arguments back onto an HTTP request.

use crate::descriptor::{ParamLocation, ToolDescriptor, ToolParameter};
use crate::error::{OpenApiToolsError, Result};
use mcp_openapi_http_tools::proxy::{BodyEncoding, HttpProxy, ProxyRequest};
use mcp_openapi_http_tools::runtime::{percent_encode, value_to_string};
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Everything an invocation needs besides the descriptor and its arguments.
#[derive(Clone)]
pub struct InvocationContext {
    pub base_url: String,
    pub proxy: Arc<dyn HttpProxy>,
    /// Headers of the inbound MCP request, offered to the proxy for forwarding.
    pub inbound_headers: HeaderMap,
}

impl InvocationContext {
    #[must_use]
    pub fn new(base_url: impl Into<String>, proxy: Arc<dyn HttpProxy>) -> Self {
        Self {
            base_url: base_url.into(),
            proxy,
            inbound_headers: HeaderMap::new(),
        }
    }

    #[must_use]
    pub fn with_inbound_headers(mut self, headers: HeaderMap) -> Self {
        self.inbound_headers = headers;
        self
    }
}

/// Invoke `tool` with `arguments` and return the backend's response text.
///
/// # Errors
///
/// Returns an error if the request cannot be assembled or the proxy fails before a response
/// is received. Non-2xx responses are not errors.
pub async fn invoke(
    tool: &ToolDescriptor,
    arguments: &Map<String, Value>,
    context: &InvocationContext,
) -> Result<String> {
    let mut request = build_request(tool, arguments, &context.base_url)?;
    request.inbound_headers = context.inbound_headers.clone();
    tracing::debug!(tool = %tool.name, "{} {}", request.method, request.url);
    Ok(context.proxy.execute(request).await?)
}

/// Assemble the outgoing request for one invocation.
///
/// An argument that is absent or `null` falls back to the parameter's default.
///
/// # Errors
///
/// Returns an error if a required argument has neither a value nor a default, or a path
/// placeholder is left unfilled.
pub fn build_request(
    tool: &ToolDescriptor,
    arguments: &Map<String, Value>,
    base_url: &str,
) -> Result<ProxyRequest> {
    let mut path = tool.path.clone();
    let mut query = Map::new();
    let mut fields = Map::new();
    let mut raw_body = None;

    for param in &tool.parameters {
        let Some(value) = argument_value(param, arguments) else {
            if param.required {
                return Err(OpenApiToolsError::MissingArgument {
                    tool: tool.name.clone(),
                    name: param.name.clone(),
                });
            }
            continue;
        };

        match param.location {
            ParamLocation::Path => {
                let placeholder = format!("{{{}}}", param.wire_name());
                path = path.replace(&placeholder, &percent_encode(&value_to_string(&value)));
            }
            ParamLocation::Query => {
                query.insert(param.wire_name().to_string(), value);
            }
            ParamLocation::Body => insert_body_field(&mut fields, param, value),
            ParamLocation::RawBody => raw_body = Some(value),
        }
    }

    if let Some(name) = unresolved_placeholder(&path) {
        return Err(OpenApiToolsError::UnresolvedPathParam {
            tool: tool.name.clone(),
            name: name.to_string(),
        });
    }

    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    let mut request = ProxyRequest::new(tool.method.clone(), url);
    request.query = query;
    request.body = raw_body.or_else(|| (!fields.is_empty()).then_some(Value::Object(fields)));
    request.body_encoding = tool
        .body_content_type
        .as_deref()
        .map(BodyEncoding::from_content_type)
        .unwrap_or_default();
    Ok(request)
}

fn argument_value(param: &ToolParameter, arguments: &Map<String, Value>) -> Option<Value> {
    let value = arguments
        .get(&param.name)
        .filter(|v| !v.is_null())
        .cloned()
        .or_else(|| param.default.clone())?;
    Some(if param.union { decode_union(value) } else { value })
}

/// Union leaves are typed as strings; a string holding a JSON object or array is sent as JSON.
fn decode_union(value: Value) -> Value {
    let Value::String(text) = &value else {
        return value;
    };
    match serde_json::from_str::<Value>(text) {
        Ok(decoded @ (Value::Object(_) | Value::Array(_))) => decoded,
        _ => value,
    }
}

fn insert_body_field(fields: &mut Map<String, Value>, param: &ToolParameter, value: Value) {
    let key = param.body_field().to_string();
    let Some(parent) = &param.request_body_parent else {
        fields.insert(key, value);
        return;
    };
    let slot = fields
        .entry(parent.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(nested) = slot {
        nested.insert(key, value);
    }
}

fn unresolved_placeholder(path: &str) -> Option<&str> {
    let start = path.find('{')?;
    let end = start + path[start..].find('}')?;
    Some(&path[start + 1..end])
}
