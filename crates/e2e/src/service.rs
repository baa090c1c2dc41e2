//! Backing service management - one container of the application per worker

use std::process::Command as StdCommand;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{E2eError, E2eResult};

/// Port the application listens on inside the container
pub const INTERNAL_PORT: u16 = 5678;

/// Container runtime used to run the backing service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Detect available container runtime
    pub async fn detect() -> Option<Self> {
        for runtime in [Self::Docker, Self::Podman] {
            let available = Command::new(runtime.command())
                .arg("--version")
                .output()
                .await
                .map(|o| o.status.success())
                .unwrap_or(false);
            if available {
                return Some(runtime);
            }
        }
        None
    }

    /// Get the CLI command name
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

/// Configuration for provisioning the backing service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Image of the application build under test
    pub image: String,

    /// Port inside the container, published on a random host port
    pub internal_port: u16,

    /// Path that must answer 200 before the service counts as ready
    pub health_path: String,

    /// Upper bound on the readiness wait
    pub startup_timeout: Duration,

    /// Environment passed to the container
    pub env: Vec<(String, String)>,

    /// Runtime to use (None = detect)
    pub runtime: Option<ContainerRuntime>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            image: "n8nio/n8n:latest".to_string(),
            internal_port: INTERNAL_PORT,
            health_path: "/favicon.ico".to_string(),
            startup_timeout: Duration::from_secs(120),
            env: vec![("E2E_TESTS".to_string(), "true".to_string())],
            runtime: None,
        }
    }
}

/// A running container of the application
#[derive(Debug)]
pub struct ServiceContainer {
    runtime: ContainerRuntime,
    container_id: String,
    host: String,
    port: u16,
    stopped: AtomicBool,
}

impl ServiceContainer {
    /// Start a container and wait until it is ready
    pub async fn start(config: &ServiceConfig) -> E2eResult<Self> {
        let runtime = match config.runtime {
            Some(runtime) => runtime,
            None => ContainerRuntime::detect().await.ok_or_else(|| {
                E2eError::Provisioning("no container runtime found (docker or podman)".to_string())
            })?,
        };

        info!("Starting container from image {}", config.image);

        let name = format!("conductor-e2e-{}", Uuid::new_v4());
        let publish = format!("127.0.0.1::{}", config.internal_port);
        let mut cmd = Command::new(runtime.command());
        cmd.args(["run", "-d", "--name", name.as_str(), "-p", publish.as_str()]);
        for (key, value) in &config.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(&config.image);

        let output = cmd.output().await.map_err(|e| {
            E2eError::Provisioning(format!("failed to run {}: {}", runtime.command(), e))
        })?;
        if !output.status.success() {
            return Err(E2eError::Provisioning(format!(
                "{} run failed: {}",
                runtime.command(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();

        let mut container = Self {
            runtime,
            container_id,
            host: "127.0.0.1".to_string(),
            port: 0,
            stopped: AtomicBool::new(false),
        };

        match container.mapped_port(config.internal_port).await {
            Ok((host, port)) => {
                container.host = host;
                container.port = port;
            }
            Err(e) => {
                let _ = container.stop().await;
                return Err(e);
            }
        }

        let base_url = container.base_url();
        if let Err(e) = wait_until_ready(&base_url, &config.health_path, config.startup_timeout).await
        {
            error!("Container failed to become ready. Fetching logs...");
            if let Ok(logs) = container.logs(100).await {
                error!("Container logs:\n{}", logs);
            }
            let _ = container.stop().await;
            return Err(E2eError::Provisioning(e.to_string()));
        }

        info!("Container started on port {}", container.port);
        Ok(container)
    }

    async fn mapped_port(&self, internal_port: u16) -> E2eResult<(String, u16)> {
        let output = Command::new(self.runtime.command())
            .args(["port", self.container_id.as_str(), &format!("{internal_port}/tcp")])
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .find_map(parse_port_mapping)
            .ok_or_else(|| {
                E2eError::Provisioning(format!(
                    "no host port published for {internal_port}/tcp: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ))
            })
    }

    async fn logs(&self, tail: usize) -> E2eResult<String> {
        let output = Command::new(self.runtime.command())
            .args(["logs", "--tail", &tail.to_string(), self.container_id.as_str()])
            .output()
            .await?;
        let mut logs = String::from_utf8_lossy(&output.stdout).to_string();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    pub fn id(&self) -> &str {
        &self.container_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Stop and remove the container; later calls are no-ops
    pub async fn stop(&self) -> E2eResult<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Stopping container {}", short_id(&self.container_id));

        let output = Command::new(self.runtime.command())
            .args(["rm", "-f", self.container_id.as_str()])
            .output()
            .await?;
        if !output.status.success() {
            return Err(E2eError::Provisioning(format!(
                "failed to remove container {}: {}",
                short_id(&self.container_id),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl Drop for ServiceContainer {
    fn drop(&mut self) {
        // Best-effort cleanup if the worker never reached teardown
        if !self.stopped.swap(true, Ordering::SeqCst) {
            warn!("Removing container {} on drop", short_id(&self.container_id));
            let _ = StdCommand::new(self.runtime.command())
                .args(["rm", "-f", self.container_id.as_str()])
                .output();
        }
    }
}

/// The application under test, either provisioned here or hosted elsewhere
#[derive(Debug)]
pub enum BackingService {
    Container(ServiceContainer),
    External { base_url: String },
}

impl BackingService {
    /// Provision a container, or point at `base_url_override` when set
    pub async fn provision(
        config: &ServiceConfig,
        base_url_override: Option<&str>,
    ) -> E2eResult<Self> {
        match base_url_override {
            Some(url) => {
                info!("Using externally hosted service at {}", url);
                Ok(Self::External {
                    base_url: url.trim_end_matches('/').to_string(),
                })
            }
            None => Ok(Self::Container(ServiceContainer::start(config).await?)),
        }
    }

    pub fn base_url(&self) -> String {
        match self {
            Self::Container(container) => container.base_url(),
            Self::External { base_url } => base_url.clone(),
        }
    }

    pub async fn stop(&self) -> E2eResult<()> {
        match self {
            Self::Container(container) => container.stop().await,
            Self::External { .. } => Ok(()),
        }
    }
}

/// Wait until the service accepts connections and `health_path` answers 200
pub async fn wait_until_ready(
    base_url: &str,
    health_path: &str,
    timeout_duration: Duration,
) -> E2eResult<()> {
    let authority = base_url
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_end_matches('/')
        .to_string();
    let health_url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        health_path.trim_start_matches('/')
    );
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    while start.elapsed() < timeout_duration {
        attempts += 1;

        if TcpStream::connect(authority.as_str()).await.is_err() {
            if attempts == 1 {
                info!("Waiting for service to listen on {}...", authority);
            }
            sleep(Duration::from_millis(100)).await;
            continue;
        }

        match client.get(&health_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("Service ready after {} attempt(s)", attempts);
                return Ok(());
            }
            Ok(resp) => {
                debug!("Health check returned {}", resp.status());
            }
            Err(e) => {
                debug!("Health check error: {}", e);
            }
        }

        sleep(Duration::from_millis(100)).await;
    }

    Err(E2eError::ServiceNotReady {
        attempts,
        waited_ms: start.elapsed().as_millis() as u64,
    })
}

/// Parse one line of `docker port` output (`0.0.0.0:49153`, `[::]:49153`)
fn parse_port_mapping(line: &str) -> Option<(String, u16)> {
    let line = line.trim();
    let (host, port) = line.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = match host.trim_start_matches('[').trim_end_matches(']') {
        "0.0.0.0" | "::" | "" => "127.0.0.1".to_string(),
        other => other.to_string(),
    };
    Some((host, port))
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_mapping() {
        assert_eq!(
            parse_port_mapping("127.0.0.1:49153"),
            Some(("127.0.0.1".to_string(), 49153))
        );
        assert_eq!(
            parse_port_mapping("0.0.0.0:32768\n"),
            Some(("127.0.0.1".to_string(), 32768))
        );
        assert_eq!(
            parse_port_mapping("[::]:32768"),
            Some(("127.0.0.1".to_string(), 32768))
        );
        assert_eq!(parse_port_mapping("garbage"), None);
    }

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.internal_port, 5678);
        assert_eq!(config.health_path, "/favicon.ico");
        assert_eq!(config.startup_timeout, Duration::from_secs(120));
        assert!(config.env.contains(&("E2E_TESTS".to_string(), "true".to_string())));
    }

    #[tokio::test]
    async fn test_external_service_skips_provisioning() {
        let service = BackingService::provision(&ServiceConfig::default(), Some("http://host:1/"))
            .await
            .unwrap();
        assert_eq!(service.base_url(), "http://host:1");
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_not_ready_within_timeout() {
        // reserve a port and release it so nothing is listening there
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let err = wait_until_ready(
            &format!("http://127.0.0.1:{port}"),
            "/favicon.ico",
            Duration::from_millis(300),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, E2eError::ServiceNotReady { attempts, .. } if attempts >= 1));
    }
}
