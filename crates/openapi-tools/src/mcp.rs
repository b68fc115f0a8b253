//! `rmcp` adapters for tool descriptors.

use crate::descriptor::ToolDescriptor;
use reqwest::Method;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool, ToolAnnotations};
use serde_json::{Value, json};
use std::sync::Arc;

/// JSON Schema for a tool's arguments.
///
/// A parameter is listed as required only when it is required and has no default; the
/// dispatcher fills defaults in.
#[must_use]
pub fn input_schema(tool: &ToolDescriptor) -> JsonObject {
    let mut properties = JsonObject::new();
    let mut required: Vec<Value> = Vec::new();

    for param in &tool.parameters {
        let mut schema = param.param_type.json_schema();
        if let Some(description) = &param.description {
            schema["description"] = json!(description);
        }
        if let Some(default) = &param.default {
            schema["default"] = default.clone();
        }
        if let Some(values) = &param.enum_values {
            schema["enum"] = json!(values);
        }
        properties.insert(param.name.clone(), schema);

        if param.required && param.default.is_none() {
            required.push(json!(param.name));
        }
    }

    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    schema
}

#[must_use]
pub fn to_mcp_tool(tool: &ToolDescriptor) -> Tool {
    let mut mcp_tool = Tool::new(
        tool.name.clone(),
        tool.description.clone(),
        Arc::new(input_schema(tool)),
    );
    mcp_tool.annotations = Some(annotations_for_method(&tool.method));
    mcp_tool
}

/// Tool hints from HTTP method semantics. Every HTTP tool reaches an external system.
#[must_use]
pub fn annotations_for_method(method: &Method) -> ToolAnnotations {
    let (read_only, destructive, idempotent) = match method.as_str() {
        "GET" | "HEAD" | "OPTIONS" => (Some(true), Some(false), Some(true)),
        "POST" => (Some(false), Some(false), Some(false)),
        "PUT" => (Some(false), Some(false), Some(true)),
        "DELETE" => (Some(false), Some(true), Some(true)),
        // PATCH may or may not be idempotent.
        "PATCH" => (Some(false), Some(false), None),
        _ => (None, None, None),
    };
    ToolAnnotations {
        title: None,
        read_only_hint: read_only,
        destructive_hint: destructive,
        idempotent_hint: idempotent,
        open_world_hint: Some(true),
    }
}

/// Backend response text as a successful tool result.
#[must_use]
pub fn text_result(text: String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ParamLocation, ParamType, ToolParameter};

    fn param(name: &str, param_type: ParamType) -> ToolParameter {
        ToolParameter {
            name: name.to_string(),
            param_type,
            description: None,
            default: None,
            required: false,
            enum_values: None,
            location: ParamLocation::Query,
            wire_name: None,
            request_body_field: None,
            request_body_parent: None,
            union: false,
        }
    }

    fn descriptor() -> ToolDescriptor {
        let mut city = param("city", ParamType::Str);
        city.required = true;
        city.description = Some("City name".to_string());
        let mut units = param("units", ParamType::Str);
        units.required = true;
        units.default = Some(json!("celsius"));
        units.enum_values = Some(vec![json!("celsius"), json!("fahrenheit")]);
        let days = param("days", ParamType::List(Box::new(ParamType::Int)));

        ToolDescriptor {
            name: "get_forecast".to_string(),
            description: "Get weather forecast".to_string(),
            method: Method::GET,
            path: "/v1/forecast".to_string(),
            parameters: vec![city, units, days],
            body_content_type: None,
        }
    }

    #[test]
    fn input_schema_requires_only_parameters_without_defaults() {
        let schema = Value::Object(input_schema(&descriptor()));
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["city"]));
        assert_eq!(
            schema["properties"]["city"],
            json!({"type": "string", "description": "City name"})
        );
        assert_eq!(schema["properties"]["units"]["default"], "celsius");
        assert_eq!(
            schema["properties"]["units"]["enum"],
            json!(["celsius", "fahrenheit"])
        );
        assert_eq!(
            schema["properties"]["days"],
            json!({"type": "array", "items": {"type": "integer"}})
        );

        let keys: Vec<&String> = schema["properties"]
            .as_object()
            .expect("properties")
            .keys()
            .collect();
        assert_eq!(keys, ["city", "units", "days"]);
    }

    #[test]
    fn input_schema_without_required_parameters_omits_the_list() {
        let mut tool = descriptor();
        tool.parameters.clear();
        let schema = input_schema(&tool);
        assert!(!schema.contains_key("required"));
        assert_eq!(schema["properties"], json!({}));
    }

    #[test]
    fn mcp_tool_carries_name_description_and_hints() {
        let tool = to_mcp_tool(&descriptor());
        assert_eq!(tool.name, "get_forecast");
        assert_eq!(tool.description.as_deref(), Some("Get weather forecast"));
        let annotations = tool.annotations.expect("annotations");
        assert_eq!(annotations.read_only_hint, Some(true));
        assert_eq!(annotations.open_world_hint, Some(true));
    }

    #[test]
    fn annotations_follow_method_semantics() {
        let delete = annotations_for_method(&Method::DELETE);
        assert_eq!(delete.destructive_hint, Some(true));
        assert_eq!(delete.idempotent_hint, Some(true));

        let put = annotations_for_method(&Method::PUT);
        assert_eq!(put.read_only_hint, Some(false));
        assert_eq!(put.idempotent_hint, Some(true));

        let post = annotations_for_method(&Method::POST);
        assert_eq!(post.idempotent_hint, Some(false));

        let patch = annotations_for_method(&Method::PATCH);
        assert_eq!(patch.idempotent_hint, None);

        let custom = Method::from_bytes(b"PURGE").expect("method");
        let a = annotations_for_method(&custom);
        assert_eq!(a.read_only_hint, None);
        assert_eq!(a.open_world_hint, Some(true));
    }

    #[test]
    fn text_result_wraps_response_text() {
        let result = text_result("hello".to_string());
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.content.len(), 1);
    }
}
