//! In-memory `OpenAPI` document with local `$ref` lookup.
//!
//! The typed [`OpenAPI`] model validates the document and drives path/operation traversal.
//! Schema trees are walked on the raw node tree (`serde_json::Value`, key order preserved) so
//! that mixed nodes such as `type: object` next to `anyOf` keep every key. `#/...`
//! references resolve against that tree by JSON pointer.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::{OpenAPI, ReferenceOr};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Where a spec comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    Url(Url),
    File(PathBuf),
}

impl SpecSource {
    /// Parse a spec location: `http(s)://` URL, `file://` URL, or a plain path.
    ///
    /// # Errors
    ///
    /// Returns an error if the location looks like a URL but does not parse as one.
    pub fn parse(location: &str) -> Result<Self> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let url = Url::parse(location).map_err(|e| {
                OpenApiToolsError::Config(format!("Invalid OpenAPI spec URL '{location}': {e}"))
            })?;
            Ok(Self::Url(url))
        } else if location.starts_with("file://") {
            let url = Url::parse(location).map_err(|e| {
                OpenApiToolsError::Config(format!(
                    "Invalid OpenAPI spec file URL '{location}': {e}"
                ))
            })?;
            let path = url.to_file_path().map_err(|()| {
                OpenApiToolsError::Config(format!(
                    "Invalid file URL (cannot convert to path): {location}"
                ))
            })?;
            Ok(Self::File(path))
        } else {
            Ok(Self::File(PathBuf::from(location)))
        }
    }

    /// Read the raw document text.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the URL cannot be fetched.
    pub async fn fetch(&self, client: &Client) -> Result<String> {
        match self {
            Self::Url(url) => {
                tracing::info!("Fetching OpenAPI spec from {url}");
                let response = client
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| OpenApiToolsError::OpenApiSpecFetch {
                        url: url.to_string(),
                        message: e.without_url().to_string(),
                    })?;
                response
                    .text()
                    .await
                    .map_err(|e| OpenApiToolsError::OpenApiSpecReadBody {
                        url: url.to_string(),
                        message: e.without_url().to_string(),
                    })
            }
            Self::File(path) => {
                tracing::info!("Loading OpenAPI spec from {}", path.display());
                std::fs::read_to_string(path).map_err(|e| OpenApiToolsError::OpenApiSpecReadFile {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        }
    }
}

impl fmt::Display for SpecSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A parsed document plus its raw node tree.
#[derive(Debug, Clone)]
pub struct ApiDocument {
    spec: OpenAPI,
    root: Value,
}

impl ApiDocument {
    /// Parse YAML or JSON text (JSON is a YAML subset).
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid `OpenAPI` 3.0 document.
    pub fn parse(content: &str, location: &str) -> Result<Self> {
        let parse_error = |source| OpenApiToolsError::OpenApiSpecParse {
            location: location.to_string(),
            source,
        };
        let spec: OpenAPI = serde_yaml::from_str(content).map_err(parse_error)?;
        let root: Value = serde_yaml::from_str(content).map_err(parse_error)?;
        Ok(Self { spec, root })
    }

    #[must_use]
    pub fn spec(&self) -> &OpenAPI {
        &self.spec
    }

    #[must_use]
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Look up the node a local `$ref` points at.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::UnresolvedRef`] for external refs and dangling pointers.
    pub fn lookup(&self, reference: &str) -> Result<&Value> {
        reference
            .strip_prefix('#')
            .filter(|pointer| pointer.is_empty() || pointer.starts_with('/'))
            .and_then(|pointer| self.root.pointer(pointer))
            .ok_or_else(|| OpenApiToolsError::UnresolvedRef {
                reference: reference.to_string(),
            })
    }

    /// Follow `$ref` hops from `node` until a concrete node is reached.
    ///
    /// # Errors
    ///
    /// Returns an error on dangling references or a reference chain that loops.
    pub fn target<'n>(&'n self, node: &'n Value) -> Result<&'n Value> {
        let mut current = node;
        let mut seen: HashSet<&str> = HashSet::new();
        while let Some(reference) = current.get("$ref").and_then(Value::as_str) {
            if !seen.insert(reference) {
                return Err(OpenApiToolsError::OpenApi(format!(
                    "Cyclic $ref alias detected while resolving: {reference}"
                )));
            }
            current = self.lookup(reference)?;
        }
        Ok(current)
    }

    /// Resolve a typed `ReferenceOr<T>` (parameters, request bodies, responses, path items).
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is dangling or the target has the wrong shape.
    pub fn resolve<T>(&self, item: &ReferenceOr<T>) -> Result<T>
    where
        T: Clone + DeserializeOwned,
    {
        match item {
            ReferenceOr::Item(value) => Ok(value.clone()),
            ReferenceOr::Reference { reference } => self.typed(self.lookup(reference)?),
        }
    }

    /// Deserialize a raw node (following `$ref` hops) into an `openapiv3` type.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is dangling or the target has the wrong shape.
    pub fn typed<T: DeserializeOwned>(&self, node: &Value) -> Result<T> {
        let value = self.target(node)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            let at = node.get("$ref").and_then(Value::as_str).unwrap_or("inline node");
            OpenApiToolsError::OpenApi(format!("'{at}' has an unexpected shape: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openapiv3::{Parameter, RequestBody};
    use serde_json::json;
    use tempfile::tempdir;

    const SPEC: &str = r##"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths: {}
components:
  parameters:
    Limit:
      name: limit
      in: query
      schema: { type: integer }
    LimitAlias:
      $ref: '#/components/parameters/Limit'
  requestBodies:
    Pet:
      content:
        application/json:
          schema: { $ref: '#/components/schemas/Pet' }
  schemas:
    Pet:
      type: object
      properties:
        name: { type: string }
"##;

    #[test]
    fn spec_source_parses_urls_and_paths() {
        assert!(matches!(
            SpecSource::parse("https://example.com/openapi.yaml"),
            Ok(SpecSource::Url(_))
        ));
        assert_eq!(
            SpecSource::parse("file:///tmp/spec.yaml").expect("file url"),
            SpecSource::File(PathBuf::from("/tmp/spec.yaml"))
        );
        assert_eq!(
            SpecSource::parse("specs/api.yaml").expect("path"),
            SpecSource::File(PathBuf::from("specs/api.yaml"))
        );
        assert!(SpecSource::parse("http://[::1").is_err());
    }

    #[tokio::test]
    async fn fetch_reads_spec_files() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("spec.yaml");
        std::fs::write(&path, SPEC).expect("write");

        let source = SpecSource::File(path);
        let content = source.fetch(&Client::new()).await.expect("fetch");
        assert!(content.contains("components"));

        let missing = SpecSource::File(dir.path().join("missing.yaml"));
        assert!(matches!(
            missing.fetch(&Client::new()).await,
            Err(OpenApiToolsError::OpenApiSpecReadFile { .. })
        ));
    }

    #[test]
    fn lookup_follows_json_pointers_and_rejects_dangling_refs() {
        let doc = ApiDocument::parse(SPEC, "inline").expect("parse");
        let pet = doc.lookup("#/components/schemas/Pet").expect("pet");
        assert_eq!(pet["properties"]["name"]["type"], "string");

        assert!(matches!(
            doc.lookup("#/components/schemas/Missing"),
            Err(OpenApiToolsError::UnresolvedRef { .. })
        ));
        assert!(matches!(
            doc.lookup("common.yaml#/components/schemas/Pet"),
            Err(OpenApiToolsError::UnresolvedRef { .. })
        ));
    }

    #[test]
    fn resolve_follows_reference_chains() {
        let doc = ApiDocument::parse(SPEC, "inline").expect("parse");
        let alias: ReferenceOr<Parameter> = ReferenceOr::Reference {
            reference: "#/components/parameters/LimitAlias".to_string(),
        };
        let param = doc.resolve(&alias).expect("resolve");
        assert_eq!(param.parameter_data_ref().name, "limit");

        let body: ReferenceOr<RequestBody> = ReferenceOr::Reference {
            reference: "#/components/requestBodies/Pet".to_string(),
        };
        let body = doc.resolve(&body).expect("body");
        assert!(body.content.contains_key("application/json"));
    }

    #[test]
    fn raw_tree_keeps_mixed_schema_keys_and_numeric_status_codes() {
        let doc = ApiDocument::parse(
            r##"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /x:
    get:
      responses:
        200: { description: ok }
components:
  schemas:
    Mixed:
      type: object
      anyOf:
        - type: string
"##,
            "inline",
        )
        .expect("doc");
        let mixed = doc.lookup("#/components/schemas/Mixed").expect("mixed");
        assert_eq!(mixed["type"], "object");
        assert!(mixed["anyOf"].is_array());
        assert!(doc.root().pointer("/paths/~1x/get/responses/200").is_some());
    }

    #[test]
    fn target_detects_alias_loops() {
        let doc = ApiDocument::parse(
            r##"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths: {}
components:
  schemas:
    A: { $ref: '#/components/schemas/B' }
    B: { $ref: '#/components/schemas/A' }
"##,
            "inline",
        )
        .expect("doc");
        let node = json!({"$ref": "#/components/schemas/A"});
        assert!(doc.target(&node).is_err());
    }
}
