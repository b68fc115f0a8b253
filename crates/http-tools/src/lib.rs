//! HTTP proxy runtime for `OpenAPI`-derived tools.
//!
//! The dispatcher in `mcp-openapi-tools` assembles a [`proxy::ProxyRequest`]; an
//! [`proxy::HttpProxy`] implementation performs the network call. [`runtime::ReqwestProxy`]
//! is the production implementation and applies the header / query forwarding policy.

pub mod proxy;
pub mod runtime;
