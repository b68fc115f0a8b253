//! Tool registry snapshots.
//!
//! A [`Registry`] is immutable once built. [`SharedRegistry`] swaps whole snapshots, so a
//! request that grabbed a snapshot sees either the old or the new set of tools, never a mix.

use mcp_openapi_http_tools::proxy::HttpProxy;
use mcp_openapi_tools::descriptor::ToolDescriptor;
use mcp_openapi_tools::dispatch::InvocationContext;
use parking_lot::RwLock;
use reqwest::header::HeaderMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tools built from one spec, plus what is needed to call them.
pub struct Namespace {
    pub namespace: String,
    pub name: String,
    pub base_url: String,
    pub proxy: Arc<dyn HttpProxy>,
    pub tools: Vec<ToolDescriptor>,
    /// Fingerprint of the spec load these tools came from.
    pub fingerprint: String,
}

impl Namespace {
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn invocation_context(&self, inbound_headers: HeaderMap) -> InvocationContext {
        InvocationContext::new(self.base_url.clone(), self.proxy.clone())
            .with_inbound_headers(inbound_headers)
    }
}

#[derive(Default)]
pub struct Registry {
    namespaces: BTreeMap<String, Arc<Namespace>>,
}

impl Registry {
    /// Later entries replace earlier ones with the same namespace.
    #[must_use]
    pub fn new(namespaces: impl IntoIterator<Item = Namespace>) -> Self {
        Self {
            namespaces: namespaces
                .into_iter()
                .map(|ns| (ns.namespace.clone(), Arc::new(ns)))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, namespace: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get(namespace).cloned()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.values().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

#[derive(Clone, Default)]
pub struct SharedRegistry {
    current: Arc<RwLock<Arc<Registry>>>,
}

impl SharedRegistry {
    /// The current snapshot. Hold it for the whole request.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Registry> {
        self.current.read().clone()
    }

    /// Install `registry` and return the snapshot it replaced.
    pub fn replace(&self, registry: Registry) -> Arc<Registry> {
        std::mem::replace(&mut *self.current.write(), Arc::new(registry))
    }
}
