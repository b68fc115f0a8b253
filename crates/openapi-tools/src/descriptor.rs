//! Tool descriptors: one flat, uniquely named parameter list per `OpenAPI` operation.
//!
//! Query and path parameters map one-to-one. The request body is flattened one level:
//! top-level fields become parameters, and fields of a nested object become
//! `{parent}_{child}` parameters. JSON body parameters carry a `j_` prefix so they never
//! shadow a query parameter of the same name; form fields keep their bare names.

use crate::error::{OpenApiToolsError, Result};
use crate::model::{
    Operation, Parameter, ParameterLocation, ParsedSpec, RequestBody, SchemaProperty, SchemaShape,
    SchemaType,
};
use mcp_openapi_http_tools::runtime::value_to_string;
use reqwest::Method;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

pub const MAX_TOOL_NAME_LENGTH: usize = 64;
pub const MAX_ENUM_DESCRIPTION_LENGTH: usize = 100;
pub const JSON_BODY_PREFIX: &str = "j_";
const FORM_BODY_PREFIX: &str = "";
/// Name of the single parameter standing in for a union or array body.
const RAW_BODY_NAME: &str = "body";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    List(Box<ParamType>),
    Object,
}

impl ParamType {
    /// Map an `OpenAPI` primitive type (plus item type for arrays).
    #[must_use]
    pub fn from_openapi(type_name: Option<&str>, items: Option<&str>) -> Self {
        match type_name {
            Some("integer") => Self::Int,
            Some("number") => Self::Float,
            Some("boolean") => Self::Bool,
            Some("object") => Self::Object,
            Some("array") => Self::List(Box::new(Self::from_openapi(items, None))),
            _ => Self::Str,
        }
    }

    fn from_property(prop: &SchemaProperty) -> Self {
        match &prop.schema_type {
            SchemaType::Single(name) if name == "array" => Self::List(Box::new(
                prop.items
                    .as_deref()
                    .map_or(Self::Str, Self::from_property),
            )),
            SchemaType::Single(name) => Self::from_openapi(Some(name), None),
            SchemaType::Union(_) => Self::Str,
        }
    }

    /// JSON Schema fragment for an MCP input schema.
    #[must_use]
    pub fn json_schema(&self) -> Value {
        match self {
            Self::Str => json!({"type": "string"}),
            Self::Int => json!({"type": "integer"}),
            Self::Float => json!({"type": "number"}),
            Self::Bool => json!({"type": "boolean"}),
            Self::List(item) => json!({"type": "array", "items": item.json_schema()}),
            Self::Object => json!({"type": "object"}),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str => write!(f, "str"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Bool => write!(f, "bool"),
            Self::List(item) => write!(f, "list[{item}]"),
            Self::Object => write!(f, "object"),
        }
    }
}

impl Serialize for ParamType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where a parameter's value goes in the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamLocation {
    Query,
    Path,
    /// One field of the body object.
    Body,
    /// The whole body.
    RawBody,
}

impl ParamLocation {
    #[must_use]
    pub fn is_body(self) -> bool {
        matches!(self, Self::Body | Self::RawBody)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: Option<String>,
    pub default: Option<Value>,
    pub required: bool,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(skip)]
    pub location: ParamLocation,
    /// Original query/path parameter name, when `name` differs from it.
    #[serde(skip)]
    pub wire_name: Option<String>,
    /// Original body field name, when `name` differs from it.
    #[serde(skip)]
    pub request_body_field: Option<String>,
    /// Body field of the object this parameter was flattened out of.
    #[serde(skip)]
    pub request_body_parent: Option<String>,
    /// `anyOf` leaf: a string argument holding a JSON object or array is sent decoded.
    #[serde(skip)]
    pub union: bool,
}

impl ToolParameter {
    fn new(name: String, param_type: ParamType, location: ParamLocation) -> Self {
        Self {
            name,
            param_type,
            description: None,
            default: None,
            required: false,
            enum_values: None,
            location,
            wire_name: None,
            request_body_field: None,
            request_body_parent: None,
            union: false,
        }
    }

    /// Query key or path placeholder this parameter fills.
    #[must_use]
    pub fn wire_name(&self) -> &str {
        self.wire_name.as_deref().unwrap_or(&self.name)
    }

    /// Body key this parameter fills.
    #[must_use]
    pub fn body_field(&self) -> &str {
        self.request_body_field.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub method: Method,
    /// Path template, e.g. `/pets/{petId}`.
    pub path: String,
    pub parameters: Vec<ToolParameter>,
    /// Content type of the request body, when the operation has body parameters.
    pub body_content_type: Option<String>,
}

impl ToolDescriptor {
    /// Build a descriptor for one operation.
    ///
    /// Query parameters named in `forwarded_query_params` are left out; the proxy adds them.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool name or a parameter name cannot be turned into a valid
    /// identifier.
    pub fn from_operation(
        path: &str,
        method: &Method,
        operation: &Operation,
        forwarded_query_params: &[String],
    ) -> Result<Self> {
        let name = tool_name(&operation.id)?;
        let description = operation
            .summary
            .clone()
            .or_else(|| operation.description.clone())
            .unwrap_or_else(|| format!("{method} {path}"));

        let mut builder = ParameterList::new(&name);
        for param in &operation.parameters {
            let skip = match param.location {
                ParameterLocation::Header | ParameterLocation::Cookie => true,
                ParameterLocation::Query => forwarded_query_params.contains(&param.name),
                ParameterLocation::Path => false,
            };
            if !skip {
                builder.push_operation_parameter(param)?;
            }
        }

        let mut body_content_type = None;
        if let Some(body) = &operation.request_body {
            if builder.push_body(body)? {
                body_content_type = Some(body.content_type.clone());
            }
        }

        let parameters = builder.finish();
        Ok(Self {
            name,
            description,
            method: method.clone(),
            path: path.to_string(),
            parameters,
            body_content_type,
        })
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Query and path parameters, in declaration order.
    pub fn query_params(&self) -> impl Iterator<Item = &ToolParameter> {
        self.parameters.iter().filter(|p| !p.location.is_body())
    }

    pub fn body_params(&self) -> impl Iterator<Item = &ToolParameter> {
        self.parameters.iter().filter(|p| p.location.is_body())
    }

    /// Body parameters keyed by the body's content type.
    #[must_use]
    pub fn body_by_content_type(&self) -> BTreeMap<&str, Vec<&ToolParameter>> {
        let mut grouped = BTreeMap::new();
        if let Some(content_type) = &self.body_content_type {
            grouped.insert(content_type.as_str(), self.body_params().collect());
        }
        grouped
    }
}

/// Build descriptors for every operation of a parsed spec.
///
/// An operation whose descriptor cannot be built is logged and skipped. Tool names that
/// clash get a numeric suffix.
#[must_use]
pub fn tools_from_spec(spec: &ParsedSpec, forwarded_query_params: &[String]) -> Vec<ToolDescriptor> {
    let mut names = HashSet::new();
    let mut tools = Vec::new();
    for (path, entry) in spec.operations() {
        match ToolDescriptor::from_operation(
            path,
            &entry.method,
            &entry.operation,
            forwarded_query_params,
        ) {
            Ok(mut tool) => {
                tool.name = reserve_unique_name(&mut names, &tool.name);
                tools.push(tool);
            }
            Err(e) => {
                tracing::warn!(
                    "Skipping tool for {} {} in '{}': {}",
                    entry.method,
                    path,
                    spec.title,
                    e
                );
            }
        }
    }
    tools
}

/// Accumulates parameters for one tool, keeping names unique.
struct ParameterList<'t> {
    tool: &'t str,
    names: HashSet<String>,
    parameters: Vec<ToolParameter>,
}

impl<'t> ParameterList<'t> {
    fn new(tool: &'t str) -> Self {
        Self {
            tool,
            names: HashSet::new(),
            parameters: Vec::new(),
        }
    }

    fn finish(self) -> Vec<ToolParameter> {
        self.parameters
    }

    fn identifier(&self, raw: &str) -> Result<String> {
        identifier(raw).ok_or_else(|| OpenApiToolsError::InvalidParameterName {
            tool: self.tool.to_string(),
            name: raw.to_string(),
        })
    }

    /// Reserve a unique name for `param`. A renamed parameter keeps its wire key.
    fn push(&mut self, mut param: ToolParameter) {
        let wire_key = match param.location {
            ParamLocation::Query | ParamLocation::Path => Some(param.wire_name().to_string()),
            ParamLocation::Body => Some(param.body_field().to_string()),
            ParamLocation::RawBody => None,
        };
        param.name = reserve_unique_name(&mut self.names, &param.name);
        if let Some(key) = wire_key.filter(|key| *key != param.name) {
            if param.location == ParamLocation::Body {
                param.request_body_field = Some(key);
            } else {
                param.wire_name = Some(key);
            }
        }
        self.parameters.push(param);
    }

    fn push_operation_parameter(&mut self, param: &Parameter) -> Result<()> {
        // `tag[]` is not an identifier; expose it as `tags`.
        let (base, bracketed) = match param.name.strip_suffix("[]") {
            Some(stem) => (format!("{stem}s"), true),
            None => (param.name.clone(), false),
        };
        let name = self.identifier(&base)?;

        let declared =
            ParamType::from_openapi(param.param_type.as_deref(), param.items_type.as_deref());
        let param_type = match declared {
            ParamType::List(_) => declared,
            other if bracketed => ParamType::List(Box::new(other)),
            other => other,
        };
        let location = match param.location {
            ParameterLocation::Path => ParamLocation::Path,
            _ => ParamLocation::Query,
        };

        let mut tool_param = ToolParameter::new(name, param_type, location);
        tool_param.default.clone_from(&param.default);
        tool_param.required = param.required;
        tool_param.description.clone_from(&param.description);
        if let Some(values) = param.enum_values.as_ref().filter(|v| !v.is_empty()) {
            tool_param.required = true;
            tool_param.description =
                Some(enum_description(param.description.as_deref(), values));
            tool_param.enum_values = Some(values.clone());
        }
        if tool_param.name != param.name {
            tool_param.wire_name = Some(param.name.clone());
        }
        self.push(tool_param);
        Ok(())
    }

    /// Flatten a request body. Returns `false` if it produced no parameters.
    fn push_body(&mut self, body: &RequestBody) -> Result<bool> {
        let Some(schema) = &body.schema else {
            return Ok(false);
        };
        let prefix = if is_form(&body.content_type) {
            FORM_BODY_PREFIX
        } else {
            JSON_BODY_PREFIX
        };
        let before = self.parameters.len();

        match schema.shape() {
            SchemaShape::Fields(fields) => {
                for field in fields {
                    self.push_body_field(prefix, field, None, body.required)?;
                }
            }
            SchemaShape::Merged(merged) => {
                for field in merged.children() {
                    self.push_body_field(prefix, field, None, body.required)?;
                }
            }
            SchemaShape::Union(root) | SchemaShape::Array(root) => {
                let name = format!("{prefix}{RAW_BODY_NAME}");
                let param_type = if root.is_union() {
                    ParamType::Str
                } else {
                    ParamType::from_property(root)
                };
                let mut param = ToolParameter::new(name, param_type, ParamLocation::RawBody);
                param.required = body.required;
                param.union = root.is_union();
                param.description = if root.is_union() {
                    Some(union_description(root))
                } else {
                    root.description.clone().or_else(|| body.description.clone())
                };
                self.push(param);
            }
        }
        Ok(self.parameters.len() > before)
    }

    fn push_body_field(
        &mut self,
        prefix: &str,
        field: &SchemaProperty,
        parent: Option<&SchemaProperty>,
        body_required: bool,
    ) -> Result<()> {
        let nested = parent.is_none()
            && !field.is_union()
            && field.schema_type.is("object")
            && !field.children().is_empty();
        if nested {
            for child in field.children() {
                self.push_body_field(prefix, child, Some(field), body_required)?;
            }
            return Ok(());
        }

        let flat = match parent {
            Some(parent) => format!("{prefix}{}_{}", parent.name, field.name),
            None => format!("{prefix}{}", field.name),
        };
        let name = self.identifier(&flat)?;

        let mut param = if field.is_union() {
            let mut param = ToolParameter::new(name, ParamType::Str, ParamLocation::Body);
            param.union = true;
            param.description = Some(union_description(field));
            param
        } else {
            let mut param =
                ToolParameter::new(name, ParamType::from_property(field), ParamLocation::Body);
            param.description.clone_from(&field.description);
            param
        };
        param.required =
            body_required && field.required && parent.is_none_or(|p| p.required);
        if param.name != field.name {
            param.request_body_field = Some(field.name.clone());
        }
        param.request_body_parent = parent.map(|p| p.name.clone());
        self.push(param);
        Ok(())
    }
}

/// Snake-case an operation id (or path) into a tool name.
///
/// # Errors
///
/// Returns [`OpenApiToolsError::InvalidToolName`] if nothing usable remains, or the result
/// starts with a digit.
pub fn tool_name(raw: &str) -> Result<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && i > 0 {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(char::is_ascii_lowercase);
                let boundary = prev.is_ascii_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_ascii_uppercase() && next_lower);
                if boundary {
                    out.push('_');
                }
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }

    let mut name = collapse_underscores(&out);
    if name.len() > MAX_TOOL_NAME_LENGTH {
        name.truncate(MAX_TOOL_NAME_LENGTH);
        name = name.trim_end_matches('_').to_string();
    }
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(OpenApiToolsError::InvalidToolName(raw.to_string()));
    }
    Ok(name)
}

/// Replace characters that cannot appear in an identifier; `None` if nothing usable remains.
fn identifier(raw: &str) -> Option<String> {
    let replaced: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    // A lone leading underscore is legal (`_id`); only trailing separators are noise.
    let name = if raw.starts_with('_') {
        replaced.trim_end_matches('_').to_string()
    } else {
        collapse_underscores(&replaced)
    };
    let valid = !name.is_empty() && !name.starts_with(|c: char| c.is_ascii_digit());
    valid.then_some(name)
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for part in s.split('_').filter(|p| !p.is_empty()) {
        if !out.is_empty() {
            out.push('_');
        }
        out.push_str(part);
    }
    out
}

fn reserve_unique_name(names: &mut HashSet<String>, base: &str) -> String {
    let base = base.to_string();
    if names.insert(base.clone()) {
        return base;
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if names.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

/// `"{description} Options: a, b"`, capped at [`MAX_ENUM_DESCRIPTION_LENGTH`] characters.
fn enum_description(description: Option<&str>, values: &[Value]) -> String {
    let options: Vec<String> = values.iter().map(value_to_string).collect();
    let options = format!("Options: {}", options.join(", "));
    let text = match description {
        Some(d) if !d.is_empty() => format!("{d} {options}"),
        _ => options,
    };
    if text.chars().count() <= MAX_ENUM_DESCRIPTION_LENGTH {
        return text;
    }
    let mut cut: String = text.chars().take(MAX_ENUM_DESCRIPTION_LENGTH - 3).collect();
    cut.push_str("...");
    cut
}

/// `"{description} One of: (...) OR (...)"`.
fn union_description(prop: &SchemaProperty) -> String {
    let alternatives: Vec<String> = match (&prop.any_of, &prop.schema_type) {
        (Some(alternatives), _) => alternatives.iter().map(alternative_summary).collect(),
        (None, SchemaType::Union(types)) => types.clone(),
        (None, SchemaType::Single(name)) => vec![name.clone()],
    };
    let joined = alternatives
        .iter()
        .map(|a| format!("({a})"))
        .collect::<Vec<_>>()
        .join(" OR ");
    match prop.description.as_deref() {
        Some(d) if !d.is_empty() => format!("{d} One of: {joined}"),
        _ => format!("One of: {joined}"),
    }
}

fn alternative_summary(alt: &SchemaProperty) -> String {
    let children = alt.children();
    if children.is_empty() {
        return alt
            .description
            .clone()
            .unwrap_or_else(|| alt.schema_type.to_string());
    }
    let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
    format!("Object with properties: {}", names.join(", "))
}

fn is_form(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default();
    essence
        .trim()
        .eq_ignore_ascii_case("application/x-www-form-urlencoded")
}
