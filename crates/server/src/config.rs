//! Servers file: which `OpenAPI` specs to expose, and under which namespace.

use crate::error::{Result, ServerError};
use mcp_openapi_http_tools::runtime::ForwardingPolicy;
use mcp_openapi_tools::loader::RouteFilter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServersConfig {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// One spec exposed as one MCP server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Registry key and URL segment (`/{namespace}/mcp`).
    pub namespace: String,

    /// Display name.
    pub name: String,

    /// Spec location: `http(s)://` URL, `file://` URL, or a plain path.
    pub url: String,

    /// Backend every tool call is sent to.
    pub base_url: String,

    /// Route patterns; regexes anchored at the start of the path.
    pub paths: Vec<String>,

    /// Inbound header names copied onto backend requests.
    #[serde(default)]
    pub forward_headers: Vec<String>,

    /// Query parameters added to every backend request. Tools do not expose them.
    #[serde(default)]
    pub forward_query_params: BTreeMap<String, String>,
}

impl ServersConfig {
    /// Read and validate a servers file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse and validate servers YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or fails validation.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !seen.insert(server.namespace.as_str()) {
                return Err(ServerError::Config(format!(
                    "Duplicate namespace '{}'",
                    server.namespace
                )));
            }
        }
        Ok(())
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<()> {
        let ns = &self.namespace;
        let url_safe = ns
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if ns.is_empty() || !url_safe {
            return Err(ServerError::Config(format!(
                "Invalid namespace '{ns}': use letters, digits, '_' or '-'"
            )));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ServerError::Config(format!(
                "Server '{ns}': base_url must be an absolute http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.paths.is_empty() {
            return Err(ServerError::Config(format!(
                "Server '{ns}': at least one path pattern is required"
            )));
        }
        self.route_filter()?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if a path pattern is not a valid regex.
    pub fn route_filter(&self) -> Result<RouteFilter> {
        Ok(RouteFilter::new(&self.paths)?)
    }

    #[must_use]
    pub fn forwarding_policy(&self) -> ForwardingPolicy {
        ForwardingPolicy {
            headers: self.forward_headers.clone(),
            query_params: self
                .forward_query_params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Names of the forwarded query parameters.
    #[must_use]
    pub fn forwarded_query_names(&self) -> Vec<String> {
        self.forward_query_params.keys().cloned().collect()
    }
}
