//! Spec loading: fetch a document, keep the routes that match the configured patterns, and
//! turn every operation on them into a [`model::Operation`](crate::model::Operation).

use crate::document::{ApiDocument, SpecSource};
use crate::error::{OpenApiToolsError, Result};
use crate::model::{
    FieldEncoding, MethodOperation, Operation, Parameter, ParameterLocation, ParsedSpec,
    PathItem, RequestBody, Response,
};
use crate::schema::{DEFAULT_MAX_DEPTH, SchemaResolver, description_of, type_of};
use regex::Regex;
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain";

const METHODS: [(&str, Method); 5] = [
    ("get", Method::GET),
    ("post", Method::POST),
    ("put", Method::PUT),
    ("delete", Method::DELETE),
    ("patch", Method::PATCH),
];

/// Route patterns; each is a regex anchored at the start of the path.
#[derive(Debug, Clone)]
pub struct RouteFilter {
    patterns: Vec<Regex>,
}

impl RouteFilter {
    /// # Errors
    ///
    /// Returns an error if a pattern is not a valid regex.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(&format!("^(?:{p})")).map_err(|source| {
                    OpenApiToolsError::InvalidRoutePattern {
                        pattern: p.to_string(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }

    fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct SpecLoader {
    client: Client,
    max_depth: usize,
}

impl SpecLoader {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Fetch the document at `location` and parse the routes `filter` accepts.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be fetched or parsed. Individual operations
    /// that fail to resolve are skipped, not reported here.
    pub async fn load(&self, location: &str, filter: &RouteFilter) -> Result<ParsedSpec> {
        let source = SpecSource::parse(location)?;
        let content = source.fetch(&self.client).await?;
        self.parse(&content, &source.to_string(), filter)
    }

    /// Parse already-fetched document text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid `OpenAPI` document.
    pub fn parse(&self, content: &str, location: &str, filter: &RouteFilter) -> Result<ParsedSpec> {
        let document = ApiDocument::parse(content, location)?;
        let resolver = SchemaResolver::new(&document).with_max_depth(self.max_depth);
        let spec = document.spec();
        let raw_paths = document.root().get("paths");

        let mut paths = Vec::new();
        for path in spec.paths.paths.keys() {
            if !filter.matches(path) {
                continue;
            }
            let Some(raw_item) = raw_paths.and_then(|p| p.get(path.as_str())) else {
                continue;
            };
            let item = match document.target(raw_item) {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!("Skipping path {} in '{}': {}", path, spec.info.title, e);
                    continue;
                }
            };

            let mut operations = Vec::new();
            for (key, method) in &METHODS {
                let Some(raw_op) = item.get(*key) else {
                    continue;
                };
                match process_operation(&document, &resolver, path, item, raw_op) {
                    Ok(operation) => operations.push(MethodOperation {
                        method: method.clone(),
                        operation,
                    }),
                    Err(e) => {
                        tracing::warn!(
                            "Skipping {} {} in '{}': {}",
                            method,
                            path,
                            spec.info.title,
                            e
                        );
                    }
                }
            }

            if !operations.is_empty() {
                paths.push(PathItem {
                    path: path.clone(),
                    operations,
                });
            }
        }

        tracing::info!(
            "Parsed {} matching paths from '{}' ({})",
            paths.len(),
            spec.info.title,
            location
        );

        Ok(ParsedSpec {
            title: spec.info.title.clone(),
            version: spec.info.version.clone(),
            source: location.to_string(),
            fingerprint: fingerprint(content, filter),
            paths,
        })
    }
}

/// Content address of a load: the document text plus the route patterns applied to it.
fn fingerprint(content: &str, filter: &RouteFilter) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    for pattern in filter.sources() {
        hasher.update(b"\n");
        hasher.update(pattern.as_bytes());
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

fn process_operation(
    document: &ApiDocument,
    resolver: &SchemaResolver<'_>,
    path: &str,
    item: &Value,
    raw_op: &Value,
) -> Result<Operation> {
    let typed: openapiv3::Operation = document.typed(raw_op)?;
    Ok(Operation {
        id: typed.operation_id.unwrap_or_else(|| path.to_string()),
        summary: typed.summary,
        description: typed.description,
        parameters: merge_parameters(document, item, raw_op)?,
        request_body: request_body(document, resolver, raw_op)?,
        responses: responses(document, resolver, raw_op)?,
    })
}

/// Path-item parameters first; an operation parameter with the same location and name wins.
fn merge_parameters(
    document: &ApiDocument,
    item: &Value,
    raw_op: &Value,
) -> Result<Vec<Parameter>> {
    let mut merged: Vec<Parameter> = Vec::new();
    let mut index: HashMap<(ParameterLocation, String), usize> = HashMap::new();

    for raw in parameter_nodes(item).chain(parameter_nodes(raw_op)) {
        let param = convert_parameter(document, raw)?;
        let key = (param.location, param.name.clone());
        match index.get(&key) {
            Some(&i) => merged[i] = param,
            None => {
                index.insert(key, merged.len());
                merged.push(param);
            }
        }
    }
    Ok(merged)
}

fn parameter_nodes(node: &Value) -> impl Iterator<Item = &Value> {
    node.get("parameters")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn convert_parameter(document: &ApiDocument, raw: &Value) -> Result<Parameter> {
    use openapiv3::Parameter as P;

    let node = document.target(raw)?;
    let typed: P = document.typed(node)?;
    let (data, location) = match &typed {
        P::Query { parameter_data, .. } => (parameter_data, ParameterLocation::Query),
        P::Path { parameter_data, .. } => (parameter_data, ParameterLocation::Path),
        P::Header { parameter_data, .. } => (parameter_data, ParameterLocation::Header),
        P::Cookie { parameter_data, .. } => (parameter_data, ParameterLocation::Cookie),
    };

    let schema_node = node.get("schema").or_else(|| {
        node.get("content")
            .and_then(Value::as_object)
            .and_then(|content| content.values().next())
            .and_then(|media| media.get("schema"))
    });
    let schema = schema_node.map(|s| document.target(s)).transpose()?;
    let param_type = schema.and_then(type_of);
    let items_type = match (param_type, schema.and_then(|s| s.get("items"))) {
        (Some("array"), Some(items)) => type_of(document.target(items)?).map(str::to_string),
        _ => None,
    };

    Ok(Parameter {
        name: data.name.clone(),
        location,
        required: data.required,
        param_type: param_type.map(str::to_string),
        items_type,
        description: data
            .description
            .clone()
            .or_else(|| schema.and_then(description_of)),
        enum_values: schema
            .and_then(|s| s.get("enum"))
            .and_then(Value::as_array)
            .filter(|values| !values.is_empty())
            .cloned(),
        default: schema.and_then(|s| s.get("default")).cloned(),
    })
}

fn request_body(
    document: &ApiDocument,
    resolver: &SchemaResolver<'_>,
    raw_op: &Value,
) -> Result<Option<RequestBody>> {
    let Some(raw) = raw_op.get("requestBody") else {
        return Ok(None);
    };
    let node = document.target(raw)?;
    let typed: openapiv3::RequestBody = document.typed(node)?;
    let Some(content) = node.get("content").and_then(Value::as_object) else {
        return Ok(None);
    };

    // Form bodies win over JSON when both are offered.
    let Some((content_type, media)) =
        find_media(content, is_form).or_else(|| find_media(content, is_json))
    else {
        tracing::debug!(
            "No supported request body content type among {:?}",
            content.keys().collect::<Vec<_>>()
        );
        return Ok(None);
    };

    let schema = match media.get("schema") {
        Some(schema) => resolver.resolve(schema)?,
        None => None,
    };
    let encoding = media
        .get("encoding")
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .map(|(field, enc)| {
                    let text = |key: &str| enc.get(key).and_then(Value::as_str).map(str::to_string);
                    let encoding = FieldEncoding {
                        content_type: text("contentType"),
                        style: text("style"),
                        explode: enc.get("explode").and_then(Value::as_bool),
                    };
                    (field.clone(), encoding)
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Some(RequestBody {
        content_type: content_type.to_string(),
        schema,
        required: typed.required,
        description: typed.description,
        encoding,
    }))
}

fn responses(
    document: &ApiDocument,
    resolver: &SchemaResolver<'_>,
    raw_op: &Value,
) -> Result<BTreeMap<String, Response>> {
    let mut out = BTreeMap::new();
    let Some(raw) = raw_op.get("responses").and_then(Value::as_object) else {
        return Ok(out);
    };

    for (status, raw_response) in raw {
        if status.starts_with("x-") {
            continue;
        }
        let node = document.target(raw_response)?;
        let json_media = node
            .get("content")
            .and_then(Value::as_object)
            .and_then(|content| find_media(content, is_json));

        let (format, schema) = match json_media {
            Some((_, media)) => {
                let schema = match media.get("schema") {
                    Some(schema) => resolver.resolve(schema)?,
                    None => None,
                };
                (JSON_CONTENT_TYPE, schema)
            }
            None => (TEXT_CONTENT_TYPE, None),
        };
        out.insert(
            status.clone(),
            Response {
                description: description_of(node).unwrap_or_default(),
                format: format.to_string(),
                schema,
            },
        );
    }
    Ok(out)
}

fn find_media<'c>(
    content: &'c Map<String, Value>,
    accept: fn(&str) -> bool,
) -> Option<(&'c str, &'c Value)> {
    content
        .iter()
        .find(|(content_type, _)| accept(content_type))
        .map(|(content_type, media)| (content_type.as_str(), media))
}

fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

fn is_form(content_type: &str) -> bool {
    essence(content_type).eq_ignore_ascii_case(FORM_CONTENT_TYPE)
}

fn is_json(content_type: &str) -> bool {
    let essence = essence(content_type);
    essence.eq_ignore_ascii_case(JSON_CONTENT_TYPE) || essence.ends_with("+json")
}
