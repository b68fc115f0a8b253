//! Error types for the tool server.

use mcp_openapi_http_tools::proxy::HttpToolsError;
use mcp_openapi_tools::error::OpenApiToolsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration errors (invalid YAML, missing fields, duplicate namespaces)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A namespace failed to start
    #[error("Startup error: {0}")]
    Startup(String),

    /// Spec loading or tool building failed
    #[error(transparent)]
    Tools(#[from] OpenApiToolsError),

    #[error("HTTP client error: {0}")]
    Http(#[from] HttpToolsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
