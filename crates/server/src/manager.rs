//! Server lifecycle: build namespaces from the servers file and swap them into the registry.

use crate::config::{ServerConfig, ServersConfig};
use crate::error::{Result, ServerError};
use crate::registry::{Namespace, Registry, SharedRegistry};
use mcp_openapi_http_tools::runtime::ReqwestProxy;
use mcp_openapi_tools::descriptor::tools_from_spec;
use mcp_openapi_tools::loader::SpecLoader;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct ServerManager {
    config_path: PathBuf,
    config: RwLock<ServersConfig>,
    registry: SharedRegistry,
    loader: SpecLoader,
    request_timeout: Duration,
    reload_lock: tokio::sync::Mutex<()>,
}

impl ServerManager {
    /// Read the servers file. Nothing is started until [`Self::start_servers`].
    ///
    /// # Errors
    ///
    /// Returns an error if the servers file is invalid or the spec HTTP client cannot be built.
    pub fn new(config_path: impl Into<PathBuf>, request_timeout: Duration) -> Result<Self> {
        let config_path = config_path.into();
        let config = ServersConfig::load(&config_path)?;

        let mut builder = reqwest::Client::builder();
        if !request_timeout.is_zero() {
            builder = builder.timeout(request_timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ServerError::Startup(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config_path,
            config: RwLock::new(config),
            registry: SharedRegistry::default(),
            loader: SpecLoader::new(client),
            request_timeout,
            reload_lock: tokio::sync::Mutex::new(()),
        })
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    #[must_use]
    pub fn config(&self) -> ServersConfig {
        self.config.read().clone()
    }

    #[must_use]
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Re-read the servers file. The previous config stays in place on error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails validation.
    pub fn load_config(&self) -> Result<()> {
        let config = ServersConfig::load(&self.config_path)?;
        info!(
            "Loaded {} server(s) from {}",
            config.servers.len(),
            self.config_path.display()
        );
        *self.config.write() = config;
        Ok(())
    }

    /// Build every configured namespace and install them as one snapshot.
    ///
    /// A namespace whose spec cannot be loaded is logged and left out. Returns how many
    /// namespaces were started.
    pub async fn start_servers(&self) -> usize {
        let servers = self.config.read().servers.clone();

        let mut namespaces = Vec::with_capacity(servers.len());
        for server in &servers {
            match self.start_server(server).await {
                Ok(namespace) => namespaces.push(namespace),
                Err(e) => error!("Failed to start server '{}': {}", server.namespace, e),
            }
        }

        let started = namespaces.len();
        self.registry.replace(Registry::new(namespaces));
        info!("Started {started}/{} server(s)", servers.len());
        started
    }

    async fn start_server(&self, server: &ServerConfig) -> Result<Namespace> {
        let filter = server.route_filter()?;
        let spec = self.loader.load(&server.url, &filter).await?;
        let tools = tools_from_spec(&spec, &server.forwarded_query_names());
        let proxy = ReqwestProxy::new(server.forwarding_policy(), self.request_timeout)?;

        info!(
            namespace = %server.namespace,
            "Loaded '{}' {} with {} tool(s)",
            spec.title,
            spec.version,
            tools.len()
        );
        for tool in &tools {
            info!(
                namespace = %server.namespace,
                "  {} -> {} {}",
                tool.name,
                tool.method,
                tool.path
            );
        }

        Ok(Namespace {
            namespace: server.namespace.clone(),
            name: server.name.clone(),
            base_url: server.base_url.clone(),
            proxy: Arc::new(proxy),
            tools,
            fingerprint: spec.fingerprint,
        })
    }

    /// Drop every namespace. Requests already holding a snapshot finish against it.
    pub fn stop_servers(&self) -> usize {
        let previous = self.registry.replace(Registry::default());
        info!("Stopped {} server(s)", previous.len());
        previous.len()
    }

    /// Stop, re-read the servers file, start again. Concurrent calls queue.
    ///
    /// When the servers file is invalid the previous config is started again and the error
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns the config error, if any.
    pub async fn reload(&self) -> Result<usize> {
        let _guard = self.reload_lock.lock().await;
        info!("Reloading servers from {}", self.config_path.display());

        self.stop_servers();
        let loaded = self.load_config();
        if let Err(e) = &loaded {
            error!("Keeping previous config: {e}");
        }
        let started = self.start_servers().await;
        loaded.map(|()| started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WEATHER_SPEC: &str = r"
openapi: 3.0.0
info:
  title: Weather
  version: 1.0.0
paths:
  /forecast:
    get:
      operationId: getForecast
      parameters:
        - name: city
          in: query
          required: true
          schema:
            type: string
        - name: api_key
          in: query
          schema:
            type: string
      responses:
        '200':
          description: OK
  /admin:
    delete:
      operationId: purge
      responses:
        '204':
          description: Gone
";

    struct Fixture {
        dir: TempDir,
        config_path: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().expect("tempdir");
            std::fs::write(dir.path().join("weather.yaml"), WEATHER_SPEC).expect("spec");
            let config_path = dir.path().join("servers.yaml");
            Self { dir, config_path }
        }

        fn server(&self, namespace: &str, spec_file: &str, paths: &str) -> String {
            format!(
                "  - namespace: {namespace}\n    name: {namespace}\n    url: {}\n    base_url: http://127.0.0.1:9\n    paths: {paths}\n    forward_query_params: {{api_key: KEY}}\n",
                self.dir.path().join(spec_file).display()
            )
        }

        fn write_config(&self, servers: &[String]) {
            let content = format!("servers:\n{}", servers.concat());
            std::fs::write(&self.config_path, content).expect("config");
        }

        fn manager(&self) -> ServerManager {
            ServerManager::new(&self.config_path, Duration::from_secs(5)).expect("manager")
        }
    }

    fn tool_names(registry: &Registry, namespace: &str) -> Vec<String> {
        registry
            .get(namespace)
            .expect("namespace")
            .tools
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    #[tokio::test]
    async fn start_builds_filtered_tools_per_namespace() {
        let fx = Fixture::new();
        fx.write_config(&[
            fx.server("weather", "weather.yaml", "['/forecast']"),
            fx.server("all", "weather.yaml", "['/']"),
        ]);
        let manager = fx.manager();
        assert!(manager.registry().snapshot().is_empty());

        assert_eq!(manager.start_servers().await, 2);
        let snapshot = manager.registry().snapshot();
        assert_eq!(tool_names(&snapshot, "weather"), ["get_forecast"]);
        assert_eq!(tool_names(&snapshot, "all"), ["get_forecast", "purge"]);

        let forecast = snapshot.get("weather").expect("weather");
        let tool = forecast.tool("get_forecast").expect("tool");
        assert!(tool.parameter("city").is_some());
        assert!(tool.parameter("api_key").is_none());
        assert!(forecast.fingerprint.starts_with("sha256:"));
    }

    #[tokio::test]
    async fn namespace_with_missing_spec_is_omitted() {
        let fx = Fixture::new();
        fx.write_config(&[
            fx.server("weather", "weather.yaml", "['/forecast']"),
            fx.server("broken", "missing.yaml", "['/']"),
        ]);
        let manager = fx.manager();

        assert_eq!(manager.start_servers().await, 1);
        let snapshot = manager.registry().snapshot();
        assert!(snapshot.get("weather").is_some());
        assert!(snapshot.get("broken").is_none());
    }

    #[tokio::test]
    async fn stop_empties_the_registry() {
        let fx = Fixture::new();
        fx.write_config(&[fx.server("weather", "weather.yaml", "['/']")]);
        let manager = fx.manager();
        manager.start_servers().await;

        let held = manager.registry().snapshot();
        assert_eq!(manager.stop_servers(), 1);
        assert!(manager.registry().snapshot().is_empty());
        assert_eq!(held.len(), 1);
    }

    #[tokio::test]
    async fn reload_picks_up_config_changes() {
        let fx = Fixture::new();
        fx.write_config(&[fx.server("weather", "weather.yaml", "['/forecast']")]);
        let manager = fx.manager();
        manager.start_servers().await;

        fx.write_config(&[fx.server("weather", "weather.yaml", "['/admin']")]);
        assert_eq!(manager.reload().await.expect("reload"), 1);
        assert_eq!(tool_names(&manager.registry().snapshot(), "weather"), ["purge"]);
    }

    #[tokio::test]
    async fn failed_reload_restarts_previous_config() {
        let fx = Fixture::new();
        fx.write_config(&[fx.server("weather", "weather.yaml", "['/forecast']")]);
        let manager = fx.manager();
        manager.start_servers().await;

        std::fs::write(&fx.config_path, "servers: [{namespace: x}]").expect("config");
        assert!(manager.reload().await.is_err());
        assert_eq!(manager.config().servers[0].namespace, "weather");
        assert_eq!(
            tool_names(&manager.registry().snapshot(), "weather"),
            ["get_forecast"]
        );
    }

    #[tokio::test]
    async fn overlapping_reloads_both_complete() {
        let fx = Fixture::new();
        fx.write_config(&[fx.server("weather", "weather.yaml", "['/']")]);
        let manager = fx.manager();

        let (a, b) = tokio::join!(manager.reload(), manager.reload());
        assert_eq!(a.expect("first"), 1);
        assert_eq!(b.expect("second"), 1);
        assert_eq!(manager.registry().snapshot().len(), 1);
    }
}
