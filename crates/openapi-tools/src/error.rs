//! Error types for `mcp-openapi-tools`.

use mcp_openapi_http_tools::proxy::HttpToolsError;
use thiserror::Error;

/// Main error type for `OpenAPI` tooling.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Configuration errors (bad spec location, invalid route pattern).
    #[error("Configuration error: {0}")]
    Config(String),

    /// `OpenAPI` errors (unsupported or malformed document content).
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    #[error("OpenAPI error: failed to fetch spec from '{url}': {message}")]
    OpenApiSpecFetch { url: String, message: String },

    #[error("OpenAPI error: failed to read spec body from '{url}': {message}")]
    OpenApiSpecReadBody { url: String, message: String },

    #[error("OpenAPI error: failed to read spec file '{path}': {source}")]
    OpenApiSpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OpenAPI error: failed to parse OpenAPI spec from '{location}': {source}")]
    OpenApiSpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A `$ref` that does not point at anything in the document.
    #[error("Unresolvable reference '{reference}'")]
    UnresolvedRef { reference: String },

    #[error("Invalid route pattern '{pattern}': {source}")]
    InvalidRoutePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Tool name that cannot be turned into an identifier.
    #[error("Invalid tool name derived from '{0}'")]
    InvalidToolName(String),

    #[error("Invalid parameter name '{name}' in tool '{tool}'")]
    InvalidParameterName { tool: String, name: String },

    #[error("Missing required argument '{name}' for tool '{tool}'")]
    MissingArgument { tool: String, name: String },

    #[error("Unresolved path parameter '{name}' for tool '{tool}'")]
    UnresolvedPathParam { tool: String, name: String },

    /// Outbound call failed before a response was received.
    #[error("Proxy error: {0}")]
    Proxy(#[from] HttpToolsError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
