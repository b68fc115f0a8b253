//! Serve `OpenAPI` operations as MCP tools.
//!
//! Each configured server becomes a namespace in the [`registry::Registry`]; its tools are
//! listed over plain HTTP by [`routes`] and served over MCP by [`mcp_server`] at
//! `/{namespace}/mcp`. [`manager::ServerManager`] owns the lifecycle.

pub mod config;
pub mod error;
pub mod manager;
pub mod mcp_server;
pub mod registry;
pub mod routes;

use axum::Router;
use manager::ServerManager;

/// Full HTTP surface for the namespaces currently configured.
pub fn app(manager: &ServerManager) -> Router {
    let registry = manager.registry();
    let namespaces = manager.config().servers.into_iter().map(|s| s.namespace);
    routes::router(registry.clone()).merge(mcp_server::router(&registry, namespaces))
}
