use anyhow::Context as _;
use std::path::Path;
use std::process::{Child, Command};
use std::time::Duration;

pub use mcp_openapi_test_support::{
    KillOnDrop, RecordingBackend, pick_unused_port, wait_http_ok,
};

/// Petstore-shaped fixture covering path, query, JSON body, form body and error routes.
pub const PETSTORE_SPEC: &str = r"
openapi: 3.0.3
info:
  title: Petstore
  version: 1.0.0
paths:
  /pets:
    get:
      operationId: listPets
      summary: List pets
      parameters:
        - name: limit
          in: query
          schema:
            type: integer
            default: 20
        - name: tag[]
          in: query
          schema:
            type: string
        - name: api_key
          in: query
          schema:
            type: string
      responses:
        '200':
          description: OK
    post:
      operationId: createPet
      summary: Create a pet
      requestBody:
        required: true
        content:
          application/json:
            schema:
              $ref: '#/components/schemas/NewPet'
      responses:
        '201':
          description: Created
  /pets/{petId}:
    parameters:
      - name: petId
        in: path
        required: true
        schema:
          type: string
    get:
      operationId: getPet
      summary: Get one pet
      responses:
        '200':
          description: OK
  /pets/{petId}/notes:
    post:
      operationId: addNote
      parameters:
        - name: petId
          in: path
          required: true
          schema:
            type: string
      requestBody:
        content:
          application/x-www-form-urlencoded:
            schema:
              type: object
              properties:
                text:
                  type: string
      responses:
        '204':
          description: Added
  /pets/fail:
    get:
      operationId: failingCall
      responses:
        '500':
          description: Always fails
  /internal/stats:
    get:
      operationId: stats
      responses:
        '200':
          description: OK
components:
  schemas:
    NewPet:
      type: object
      required: [name]
      properties:
        name:
          type: string
        tag:
          type: string
        owner:
          type: object
          required: [email]
          properties:
            email:
              type: string
";

/// Write the spec and a servers file exposing it as namespace `pets` against `backend_url`.
pub fn write_fixture(dir: &Path, backend_url: &str) -> anyhow::Result<std::path::PathBuf> {
    let spec_path = dir.join("petstore.yaml");
    std::fs::write(&spec_path, PETSTORE_SPEC).context("write spec")?;

    let config_path = dir.join("servers.yaml");
    std::fs::write(
        &config_path,
        format!(
            r"servers:
  - namespace: pets
    name: Petstore
    url: {}
    base_url: {backend_url}/v1
    paths: ['/pets']
    forward_headers: [x-tenant]
    forward_query_params:
      api_key: SECRET
",
            spec_path.display()
        ),
    )
    .context("write config")?;
    Ok(config_path)
}

pub fn spawn_server(config_path: &Path, port: u16) -> anyhow::Result<Child> {
    let bin = env!("CARGO_BIN_EXE_mcp-openapi-server");
    Command::new(bin)
        .arg("--config")
        .arg(config_path)
        .arg("--bind")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--log-level")
        .arg("info")
        .spawn()
        .context("spawn server")
}

/// Start the server binary on a fresh port and wait for `/health`.
pub async fn start_server(config_path: &Path) -> anyhow::Result<(KillOnDrop, String)> {
    let port = pick_unused_port()?;
    let child = KillOnDrop(spawn_server(config_path, port)?);
    let base = format!("http://127.0.0.1:{port}");
    wait_http_ok(&format!("{base}/health"), Duration::from_secs(30)).await?;
    Ok((child, base))
}
