mod common;
mod common_mcp;

use anyhow::Context as _;
use common::{RecordingBackend, start_server, write_fixture};
use common_mcp::{McpStreamableHttpSession, tool_call_text};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};
use std::time::Duration;
use tempfile::tempdir;

const TIMEOUT: Duration = Duration::from_secs(10);

async fn call(
    mcp: &McpStreamableHttpSession,
    id: u64,
    name: &str,
    arguments: Value,
) -> anyhow::Result<Value> {
    mcp.request(
        id,
        "tools/call",
        json!({"name": name, "arguments": arguments}),
        TIMEOUT,
    )
    .await
}

#[tokio::test]
#[allow(clippy::too_many_lines)]
async fn tools_round_trip_through_the_backend() -> anyhow::Result<()> {
    let backend = RecordingBackend::start().await?;
    let dir = tempdir()?;
    let config_path = write_fixture(dir.path(), backend.base_url())?;
    let (_server, base) = start_server(&config_path).await?;

    let mut headers = HeaderMap::new();
    headers.insert("x-tenant", HeaderValue::from_static("acme"));
    headers.insert("x-ignored", HeaderValue::from_static("nope"));
    let mcp = McpStreamableHttpSession::connect_with_headers(&format!("{base}/pets"), headers)
        .await?;

    // tools/list
    let listed = mcp.request(1, "tools/list", json!({}), TIMEOUT).await?;
    let tools = listed["result"]["tools"]
        .as_array()
        .context("tools/list missing result.tools")?;
    assert_eq!(tools.len(), 5);
    let create = tools
        .iter()
        .find(|t| t["name"] == "create_pet")
        .context("create_pet listed")?;
    assert_eq!(create["inputSchema"]["required"], json!(["j_name"]));
    assert_eq!(
        create["inputSchema"]["properties"]["j_owner_email"]["type"],
        "string"
    );
    assert_eq!(create["annotations"]["readOnlyHint"], false);
    let get_pet = tools
        .iter()
        .find(|t| t["name"] == "get_pet")
        .context("get_pet listed")?;
    assert_eq!(get_pet["annotations"]["readOnlyHint"], true);

    // Query parameters: default filled, array exploded, forwarding applied.
    let listed = call(&mcp, 2, "list_pets", json!({"tags": ["a", "b"]})).await?;
    let echoed: Value = serde_json::from_str(tool_call_text(&listed)?)?;
    assert_eq!(echoed["path"], "/v1/pets");
    let req = backend.last().context("list_pets request")?;
    assert_eq!(req.method, "GET");
    assert_eq!(req.query_values("limit"), ["20"]);
    assert_eq!(req.query_values("tag[]"), ["a", "b"]);
    assert_eq!(req.query_values("api_key"), ["SECRET"]);
    assert_eq!(req.header("x-tenant"), Some("acme"));
    assert_eq!(req.header("x-ignored"), None);

    // JSON body with one level of nesting.
    call(
        &mcp,
        3,
        "create_pet",
        json!({"j_name": "Rex", "j_owner_email": "o@example.com"}),
    )
    .await?;
    let req = backend.last().context("create_pet request")?;
    assert_eq!(req.method, "POST");
    assert_eq!(req.path, "/v1/pets");
    assert!(
        req.content_type
            .as_deref()
            .is_some_and(|c| c.starts_with("application/json"))
    );
    assert_eq!(
        req.json_body()?,
        json!({"name": "Rex", "owner": {"email": "o@example.com"}})
    );

    // Path parameter is percent-encoded; form body is urlencoded.
    call(&mcp, 4, "add_note", json!({"petId": "a b", "text": "hi there"})).await?;
    let req = backend.last().context("add_note request")?;
    assert_eq!(req.path, "/v1/pets/a%20b/notes");
    assert!(
        req.content_type
            .as_deref()
            .is_some_and(|c| c.starts_with("application/x-www-form-urlencoded"))
    );
    assert_eq!(req.body, "text=hi+there");

    // Non-2xx responses come back as text.
    let failed = call(&mcp, 5, "failing_call", json!({})).await?;
    assert_eq!(tool_call_text(&failed)?, "backend failure");

    // Missing required argument never reaches the backend.
    let before = backend.requests().len();
    let missing = call(&mcp, 6, "get_pet", json!({})).await?;
    assert_eq!(missing["error"]["code"], -32602);
    let unknown = call(&mcp, 7, "no_such_tool", json!({})).await?;
    assert_eq!(unknown["error"]["code"], -32602);
    assert_eq!(backend.requests().len(), before);

    Ok(())
}

#[tokio::test]
async fn unconfigured_namespace_has_no_mcp_endpoint() -> anyhow::Result<()> {
    let backend = RecordingBackend::start().await?;
    let dir = tempdir()?;
    let config_path = write_fixture(dir.path(), backend.base_url())?;
    let (_server, base) = start_server(&config_path).await?;

    let resp = reqwest::Client::new()
        .post(format!("{base}/other/mcp"))
        .header("Accept", "application/json, text/event-stream")
        .json(&json!({"jsonrpc": "2.0", "id": 0, "method": "initialize", "params": {}}))
        .send()
        .await?;
    assert_eq!(resp.status(), 404);
    Ok(())
}
