//! Normalized records produced from an `OpenAPI` document.
//!
//! Everything here is built once per spec load and never mutated afterwards.

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Synthetic property name for an `allOf` merge.
pub const MERGED: &str = "merged";
/// Synthetic property name for an `anyOf`/`oneOf` union.
pub const ANY_OF: &str = "any_of";
/// Synthetic name for inline (unreferenced) schemas and root arrays.
pub const INLINE: &str = "inline";
/// Synthetic name for array items that are not references.
pub const ITEM: &str = "item";

/// A primitive type name, or the list of alternatives of a union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SchemaType {
    Single(String),
    Union(Vec<String>),
}

impl SchemaType {
    #[must_use]
    pub fn single(name: &str) -> Self {
        Self::Single(name.to_string())
    }

    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        matches!(self, Self::Single(s) if s == name)
    }

    #[must_use]
    pub fn is_union(&self) -> bool {
        matches!(self, Self::Union(_))
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(name) => f.write_str(name),
            Self::Union(names) => f.write_str(&names.join(" | ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaProperty {
    pub name: String,
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaProperty>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<SchemaProperty>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<SchemaProperty>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<SchemaProperty>>,
    /// Listed in the parent object's `required` array.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

impl SchemaProperty {
    #[must_use]
    pub fn new(name: impl Into<String>, schema_type: SchemaType) -> Self {
        Self {
            name: name.into(),
            schema_type,
            items: None,
            properties: None,
            description: None,
            any_of: None,
            all_of: None,
            required: false,
        }
    }

    /// Union leaf: either composed alternatives or a list of alternative types.
    #[must_use]
    pub fn is_union(&self) -> bool {
        self.any_of.is_some() || self.schema_type.is_union()
    }

    /// Child properties, if any were resolved.
    #[must_use]
    pub fn children(&self) -> &[SchemaProperty] {
        self.properties.as_deref().unwrap_or_default()
    }
}

/// How the top level of a resolved [`Schema`] should be read.
#[derive(Debug, Clone, Copy)]
pub enum SchemaShape<'s> {
    /// Ordinary object fields.
    Fields(&'s [SchemaProperty]),
    /// `allOf` merge; the wrapper's children are the real fields.
    Merged(&'s SchemaProperty),
    /// `anyOf`/`oneOf` at the root.
    Union(&'s SchemaProperty),
    /// Root-level array.
    Array(&'s SchemaProperty),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    /// Reference name, or one of the synthetic markers. Not an identity.
    pub name: String,
    pub properties: Vec<SchemaProperty>,
}

impl Schema {
    #[must_use]
    pub fn new(name: impl Into<String>, properties: Vec<SchemaProperty>) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }

    #[must_use]
    pub fn shape(&self) -> SchemaShape<'_> {
        match self.properties.as_slice() {
            [only] if only.name == MERGED && only.all_of.is_some() => SchemaShape::Merged(only),
            [only]
                if only.name == ANY_OF
                    && (only.is_union()
                        || (only.schema_type.is("object") && only.properties.is_none())) =>
            {
                SchemaShape::Union(only)
            }
            [only] if only.name == INLINE && only.schema_type.is("array") => SchemaShape::Array(only),
            fields => SchemaShape::Fields(fields),
        }
    }

    /// Field list with a lone `allOf` wrapper unwrapped.
    #[must_use]
    pub fn into_fields(self) -> Vec<SchemaProperty> {
        if matches!(self.shape(), SchemaShape::Merged(_)) {
            return self
                .properties
                .into_iter()
                .next()
                .and_then(|merged| merged.properties)
                .unwrap_or_default();
        }
        self.properties
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Query,
    Path,
    Header,
    Cookie,
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Path => write!(f, "path"),
            Self::Header => write!(f, "header"),
            Self::Cookie => write!(f, "cookie"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    /// Declared primitive type, if any.
    pub param_type: Option<String>,
    /// Item type for array parameters.
    pub items_type: Option<String>,
    pub description: Option<String>,
    pub enum_values: Option<Vec<Value>>,
    pub default: Option<Value>,
}

/// Per-field encoding of a form body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldEncoding {
    pub content_type: Option<String>,
    pub style: Option<String>,
    pub explode: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    pub content_type: String,
    pub schema: Option<Schema>,
    pub required: bool,
    pub description: Option<String>,
    pub encoding: BTreeMap<String, FieldEncoding>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub description: String,
    /// `application/json` when a JSON schema was resolved, `text/plain` otherwise.
    pub format: String,
    pub schema: Option<Schema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// `operationId`, or the path when the document declares none.
    pub id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    /// Keyed by status code string (`"200"`, `"4XX"`, `"default"`).
    pub responses: BTreeMap<String, Response>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodOperation {
    pub method: Method,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathItem {
    pub path: String,
    pub operations: Vec<MethodOperation>,
}

/// Result of loading one spec through a route filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSpec {
    pub title: String,
    pub version: String,
    pub source: String,
    /// `sha256:` digest of the document text and route patterns.
    pub fingerprint: String,
    pub paths: Vec<PathItem>,
}

impl ParsedSpec {
    pub fn operations(&self) -> impl Iterator<Item = (&str, &MethodOperation)> {
        self.paths
            .iter()
            .flat_map(|p| p.operations.iter().map(move |op| (p.path.as_str(), op)))
    }
}

impl fmt::Display for ParsedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Spec: {} ({})", self.title, self.version)?;
        writeln!(f, "Source: {}", self.source)?;
        for item in &self.paths {
            writeln!(f, "  Path: {}", item.path)?;
            for entry in &item.operations {
                write_operation(f, &entry.method, &entry.operation)?;
            }
        }
        Ok(())
    }
}

fn write_operation(f: &mut fmt::Formatter<'_>, method: &Method, op: &Operation) -> fmt::Result {
    writeln!(f, "    {method} {}", op.id)?;
    if let Some(summary) = &op.summary {
        writeln!(f, "      Summary: {summary}")?;
    }
    if !op.parameters.is_empty() {
        writeln!(f, "      Parameters:")?;
        for p in &op.parameters {
            write!(
                f,
                "        - {} ({}, {}",
                p.name,
                p.location,
                p.param_type.as_deref().unwrap_or("any")
            )?;
            if p.required {
                write!(f, ", required")?;
            }
            if let Some(values) = &p.enum_values {
                let values: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, ", enum: [{}]", values.join(", "))?;
            }
            if let Some(default) = &p.default {
                write!(f, ", default: {default}")?;
            }
            writeln!(f, ")")?;
        }
    }
    if let Some(body) = &op.request_body {
        let required = if body.required { ", required" } else { "" };
        writeln!(f, "      Request body ({}{required}):", body.content_type)?;
        for (field, encoding) in &body.encoding {
            writeln!(
                f,
                "        encoding {field}: {}",
                encoding.content_type.as_deref().unwrap_or("-")
            )?;
        }
        if let Some(schema) = &body.schema {
            write_schema(f, schema, 8)?;
        }
    }
    if !op.responses.is_empty() {
        writeln!(f, "      Responses:")?;
        for (status, response) in &op.responses {
            writeln!(f, "        {status} ({})", response.format)?;
            if let Some(schema) = &response.schema {
                write_schema(f, schema, 10)?;
            }
        }
    }
    Ok(())
}

fn write_schema(f: &mut fmt::Formatter<'_>, schema: &Schema, indent: usize) -> fmt::Result {
    writeln!(f, "{:indent$}Schema: {}", "", schema.name)?;
    for prop in &schema.properties {
        write_property(f, prop, indent + 2)?;
    }
    Ok(())
}

fn write_property(f: &mut fmt::Formatter<'_>, prop: &SchemaProperty, indent: usize) -> fmt::Result {
    write!(f, "{:indent$}- {}: {}", "", prop.name, prop.schema_type)?;
    if prop.required {
        write!(f, " (required)")?;
    }
    if let Some(description) = &prop.description {
        write!(f, " -- {description}")?;
    }
    writeln!(f)?;
    if let Some(items) = &prop.items {
        write_property(f, items, indent + 2)?;
    }
    for child in prop.children() {
        write_property(f, child, indent + 2)?;
    }
    for (label, group) in [("anyOf", &prop.any_of), ("allOf", &prop.all_of)] {
        if let Some(group) = group {
            writeln!(f, "{:width$}{label}:", "", width = indent + 2)?;
            for alt in group {
                write_property(f, alt, indent + 4)?;
            }
        }
    }
    Ok(())
}
