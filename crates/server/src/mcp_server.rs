//! One streamable-HTTP MCP server per namespace, backed by the live registry snapshot.

use crate::registry::{Namespace, SharedRegistry};
use axum::Router;
use axum::http::request::Parts;
use mcp_openapi_tools::dispatch::invoke;
use mcp_openapi_tools::error::OpenApiToolsError;
use mcp_openapi_tools::mcp::{text_result, to_mcp_tool};
use reqwest::header::HeaderMap;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use rmcp::{RoleServer, ServerHandler};
use std::future::Future;
use std::sync::Arc;

/// MCP handler for one namespace.
///
/// Holds only the namespace key. Each request resolves it against the current snapshot, so a
/// reload changes the tools seen by already-connected sessions.
#[derive(Clone)]
pub struct NamespaceServer {
    namespace: String,
    registry: SharedRegistry,
}

impl NamespaceServer {
    #[must_use]
    pub fn new(namespace: impl Into<String>, registry: SharedRegistry) -> Self {
        Self {
            namespace: namespace.into(),
            registry,
        }
    }

    fn current(&self) -> Result<Arc<Namespace>, ErrorData> {
        self.registry.snapshot().get(&self.namespace).ok_or_else(|| {
            ErrorData::internal_error(
                format!("Namespace '{}' is not running", self.namespace),
                None,
            )
        })
    }

    async fn call(
        &self,
        request: CallToolRequestParams,
        inbound_headers: HeaderMap,
    ) -> Result<CallToolResult, ErrorData> {
        let namespace = self.current()?;
        let tool = namespace.tool(&request.name).ok_or_else(|| {
            ErrorData::invalid_params(format!("Unknown tool '{}'", request.name), None)
        })?;
        let arguments = request.arguments.unwrap_or_default();
        let context = namespace.invocation_context(inbound_headers);

        match invoke(tool, &arguments, &context).await {
            Ok(text) => Ok(text_result(text)),
            Err(
                e @ (OpenApiToolsError::MissingArgument { .. }
                | OpenApiToolsError::UnresolvedPathParam { .. }),
            ) => Err(ErrorData::invalid_params(e.to_string(), None)),
            Err(e) => {
                tracing::warn!(
                    namespace = %self.namespace,
                    tool = %tool.name,
                    "Tool call failed: {e}"
                );
                Err(ErrorData::internal_error(e.to_string(), None))
            }
        }
    }
}

impl ServerHandler for NamespaceServer {
    fn get_info(&self) -> ServerInfo {
        let title = self
            .registry
            .snapshot()
            .get(&self.namespace)
            .map_or_else(|| self.namespace.clone(), |ns| ns.name.clone());
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.namespace.clone(),
                title: Some(title.clone()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(format!(
                "Each tool calls one operation of the {title} HTTP API and returns the response body."
            )),
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        let tools = self
            .registry
            .snapshot()
            .get(&self.namespace)
            .map(|ns| ns.tools.iter().map(to_mcp_tool).collect())
            .unwrap_or_default();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        let inbound_headers = context
            .extensions
            .get::<Parts>()
            .map(|parts| parts.headers.clone())
            .unwrap_or_default();
        self.call(request, inbound_headers)
    }
}

/// Mount `/{namespace}/mcp` for every namespace given.
///
/// Routes are fixed when the router is built; the tools behind them follow the registry.
pub fn router(registry: &SharedRegistry, namespaces: impl IntoIterator<Item = String>) -> Router {
    let mut router = Router::new();
    for namespace in namespaces {
        let path = format!("/{namespace}/mcp");
        let server = NamespaceServer::new(namespace, registry.clone());
        let service = StreamableHttpService::new(
            move || Ok(server.clone()),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig::default(),
        );
        tracing::info!("MCP endpoint mounted at {path}");
        router = router.nest_service(&path, service);
    }
    router
}
