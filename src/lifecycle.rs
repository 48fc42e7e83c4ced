//! Bringing the Docker Compose deployment up and down.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

use crate::cli_commands::CommandRunner;
use crate::error::LifecycleError;
use crate::progress::ProgressHelper;

pub const HEALTH_PATH: &str = "/api/health";

/// Start/stop of the container deployment.
#[async_trait]
pub trait Compose: Send + Sync {
    async fn start(&self) -> Result<(), LifecycleError>;

    /// Stops containers. Volumes are kept.
    async fn stop(&self) -> Result<(), LifecycleError>;
}

/// Something that can tell whether the platform accepts requests.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> bool;
}

/// `docker compose` (plugin) or the standalone `docker-compose` binary.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    compose_file: PathBuf,
    program: String,
    prefix: Vec<String>,
}

impl DockerCompose {
    pub fn new(compose_file: impl Into<PathBuf>) -> Self {
        Self::with_program(compose_file, "docker", &["compose"])
    }

    /// Runs `program prefix.. -f <file> <action>` instead of `docker compose`.
    pub fn with_program(
        compose_file: impl Into<PathBuf>,
        program: impl Into<String>,
        prefix: &[&str],
    ) -> Self {
        Self {
            compose_file: compose_file.into(),
            program: program.into(),
            prefix: prefix.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Uses the compose plugin when available, the legacy binary otherwise.
    pub async fn detect(compose_file: impl Into<PathBuf>) -> Self {
        let legacy = tokio::task::spawn_blocking(|| {
            !CommandRunner::probe("docker", &["compose", "version"])
                && CommandRunner::probe("docker-compose", &["--version"])
        })
        .await
        .unwrap_or(false);

        if legacy {
            Self::with_program(compose_file, "docker-compose", &[])
        } else {
            Self::new(compose_file)
        }
    }

    pub fn compose_file(&self) -> &Path {
        &self.compose_file
    }

    fn command_line(&self, action: &[&str]) -> Vec<String> {
        let file_name = self
            .compose_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.compose_file.display().to_string());

        let mut args = self.prefix.clone();
        args.push("-f".to_string());
        args.push(file_name);
        args.extend(action.iter().map(|a| a.to_string()));
        args
    }

    async fn run(&self, action: &[&str]) -> Result<(), LifecycleError> {
        if !self.compose_file.is_file() {
            return Err(LifecycleError::ComposeFileMissing(self.compose_file.clone()));
        }

        let args = self.command_line(action);
        let display = format!("{} {}", self.program, args.join(" "));
        let dir = self
            .compose_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);

        let mut runner = CommandRunner::new();
        let output = runner
            .run_command(self.program.clone(), args, dir)
            .await
            .map_err(|e| LifecycleError::Command {
                command: display.clone(),
                stderr: e.to_string(),
            })?;

        if output.success() {
            if !output.stdout.is_empty() {
                tracing::debug!("{}", output.stdout);
            }
            Ok(())
        } else {
            Err(LifecycleError::Command {
                command: display,
                stderr: output.stderr,
            })
        }
    }
}

#[async_trait]
impl Compose for DockerCompose {
    async fn start(&self) -> Result<(), LifecycleError> {
        self.run(&["up", "-d"]).await
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        self.run(&["down"]).await
    }
}

/// `GET <base>/api/health`, healthy on 200.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .user_agent(concat!("formbricks-seeder/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), HEALTH_PATH),
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::debug!("Health check failed: {}", e);
                false
            }
        }
    }
}

/// Bounded retry for the health poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Probes until healthy or until `policy.timeout` has elapsed.
///
/// The probe always runs at least once. Returns the number of attempts made.
pub async fn wait_until_ready(
    probe: &dyn HealthProbe,
    policy: PollPolicy,
) -> Result<u32, LifecycleError> {
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if probe.check().await {
            tracing::debug!("Healthy after {} attempt(s)", attempts);
            return Ok(attempts);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(LifecycleError::HealthTimeout {
                waited: now - started,
            });
        }
        tokio::time::sleep(policy.interval.min(deadline - now)).await;
    }
}

/// Starts the deployment and blocks until it answers health checks.
///
/// `progress` spins only while polling; the start command shows its own.
pub async fn up(
    compose: &dyn Compose,
    probe: &dyn HealthProbe,
    policy: PollPolicy,
    progress: &mut ProgressHelper,
) -> Result<u32, LifecycleError> {
    compose.start().await?;
    progress
        .track("Waiting for Formbricks to become healthy", wait_until_ready(probe, policy))
        .await
}

/// Stops the deployment. Safe to call when it is already stopped.
pub async fn down(compose: &dyn Compose) -> Result<(), LifecycleError> {
    compose.stop().await
}
