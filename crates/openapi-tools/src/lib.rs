//! `OpenAPI` -> MCP tooling.
//!
//! Pipeline: [`loader`] reads a document and filters its routes, [`schema`] resolves schema
//! trees into [`model`] records, [`descriptor`] flattens each operation into a
//! [`descriptor::ToolDescriptor`], and [`dispatch`] turns an invocation back into an HTTP call.
//! [`mcp`] adapts descriptors to `rmcp` tool definitions.

pub mod descriptor;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod loader;
pub mod mcp;
pub mod model;
pub mod schema;
