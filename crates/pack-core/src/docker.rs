//! Docker daemon integration
//!
//! Every daemon interaction shells out to the `docker` CLI binary, the same
//! way the original `pack` talks to `github.com/docker/docker/client` but
//! re-expressed against a subprocess instead of a socket client, following
//! this workspace's own convention (grounded on `CliDocker` in this crate's
//! `docker.rs`: a thin struct wrapping `std::process::Command`, with each
//! async trait method wrapping its blocking `Command::output()` call in
//! `tokio::task::spawn_blocking`).

use crate::errors::{PackError, Result};
use std::collections::HashMap;
use std::process::Command;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Bind-mount a host path or named volume into a container.
#[derive(Debug, Clone)]
pub struct Bind {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl Bind {
    pub fn rw(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }
}

/// Everything needed to run one lifecycle phase (or any other) container.
#[derive(Debug, Clone, Default)]
pub struct ContainerRunSpec {
    pub image: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub binds: Vec<Bind>,
    pub network: Option<String>,
    pub user: Option<String>,
    pub entrypoint: Option<String>,
}

/// The outcome of running a container to completion.
#[derive(Debug)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Docker client abstraction. Implemented by `CliDocker` in production and
/// by an in-memory fake in tests (see `lifecycle::tests`). Boxed via
/// `async_trait` so it stays usable as `Arc<dyn Docker>` across the crate.
#[async_trait::async_trait]
pub trait Docker: Send + Sync {
    /// Health check for daemon availability, used by `pack config` commands
    /// and acceptance-test setup.
    async fn ping(&self) -> Result<()>;

    /// Run a container to completion (`docker run --rm`) and collect its
    /// exit code plus captured stdout/stderr. This is the primitive every
    /// lifecycle phase executes through.
    async fn run(&self, spec: &ContainerRunSpec) -> Result<RunResult>;

    /// Pull an image, honoring registry auth already configured in the
    /// daemon's credential store.
    async fn pull_image(&self, reference: &str) -> Result<()>;

    /// Whether an image exists in the daemon's local store.
    async fn image_exists(&self, reference: &str) -> Result<bool>;

    /// Inspect an image, returning its raw `docker inspect` JSON.
    async fn inspect_image(&self, reference: &str) -> Result<serde_json::Value>;

    /// Remove an image from the daemon's local store.
    async fn remove_image(&self, reference: &str) -> Result<()>;

    /// Whether a named volume exists.
    async fn volume_exists(&self, name: &str) -> Result<bool>;

    /// Create a named volume if it does not already exist.
    async fn create_volume(&self, name: &str) -> Result<()>;

    /// Remove a named volume.
    async fn remove_volume(&self, name: &str) -> Result<()>;

    /// Run a lifecycle phase container under a known name, streaming its
    /// combined stdout/stderr to `on_log` as it arrives and stopping early
    /// if `cancel` fires. The container is removed unconditionally before
    /// this returns, whether it finished, failed, or was cancelled: cleanup
    /// runs unconditionally on every exit path, and cancellation signals the
    /// current phase container before removing it.
    async fn run_phase(
        &self,
        container_name: &str,
        spec: &ContainerRunSpec,
        on_log: Arc<dyn Fn(&str) + Send + Sync>,
        cancel: CancellationToken,
    ) -> Result<RunResult>;

    /// Load an image tarball (`docker save`/`docker load` wire format) into
    /// the daemon's local store, materializing whatever `reference` its
    /// embedded manifest names.
    async fn load_image_tar(&self, tar_bytes: Vec<u8>) -> Result<()>;
}

/// CLI-based Docker implementation shelling out to the `docker` binary.
#[derive(Debug, Clone)]
pub struct CliDocker {
    docker_path: String,
}

impl Default for CliDocker {
    fn default() -> Self {
        Self::new()
    }
}

impl CliDocker {
    pub fn new() -> Self {
        Self {
            docker_path: "docker".to_string(),
        }
    }

    pub fn with_path(docker_path: impl Into<String>) -> Self {
        Self {
            docker_path: docker_path.into(),
        }
    }

    fn build_run_args(spec: &ContainerRunSpec) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];

        if let Some(network) = &spec.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        if let Some(user) = &spec.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }
        if let Some(entrypoint) = &spec.entrypoint {
            args.push("--entrypoint".to_string());
            args.push(entrypoint.clone());
        }
        for bind in &spec.binds {
            let mut mount = format!("{}:{}", bind.source, bind.target);
            if bind.read_only {
                mount.push_str(":ro");
            }
            args.push("-v".to_string());
            args.push(mount);
        }
        let mut env_keys: Vec<&String> = spec.env.keys().collect();
        env_keys.sort();
        for key in env_keys {
            args.push("-e".to_string());
            args.push(format!("{key}={}", spec.env[key]));
        }
        args.push(spec.image.clone());
        args.extend(spec.args.iter().cloned());
        args
    }

    /// Same flags as `build_run_args`, but detached with a stable name
    /// instead of `--rm`, so the container can be waited on, logged, and
    /// killed by name from separate invocations.
    fn build_detached_args(name: &str, spec: &ContainerRunSpec) -> Vec<String> {
        let mut args = vec!["run".to_string(), "-d".to_string(), "--name".to_string(), name.to_string()];
        if let Some(network) = &spec.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        if let Some(user) = &spec.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }
        if let Some(entrypoint) = &spec.entrypoint {
            args.push("--entrypoint".to_string());
            args.push(entrypoint.clone());
        }
        for bind in &spec.binds {
            let mut mount = format!("{}:{}", bind.source, bind.target);
            if bind.read_only {
                mount.push_str(":ro");
            }
            args.push("-v".to_string());
            args.push(mount);
        }
        let mut env_keys: Vec<&String> = spec.env.keys().collect();
        env_keys.sort();
        for key in env_keys {
            args.push("-e".to_string());
            args.push(format!("{key}={}", spec.env[key]));
        }
        args.push(spec.image.clone());
        args.extend(spec.args.iter().cloned());
        args
    }

    fn run_blocking(docker_path: &str, args: &[String]) -> Result<std::process::Output> {
        Command::new(docker_path)
            .args(args)
            .output()
            .map_err(|e| PackError::docker(format!("executing 'docker {}': {e}", args.join(" "))))
    }
}

#[async_trait::async_trait]
impl Docker for CliDocker {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        let docker_path = self.docker_path.clone();
        tokio::task::spawn_blocking(move || {
            let output = Self::run_blocking(&docker_path, &["version".into(), "--format".into(), "json".into()])?;
            if output.status.success() {
                Ok(())
            } else {
                Err(PackError::docker(format!(
                    "docker daemon unreachable: {}",
                    String::from_utf8_lossy(&output.stderr)
                )))
            }
        })
        .await
        .map_err(|e| PackError::docker(format!("join error: {e}")))?
    }

    #[instrument(skip(self, spec), fields(image = %spec.image))]
    async fn run(&self, spec: &ContainerRunSpec) -> Result<RunResult> {
        let docker_path = self.docker_path.clone();
        let args = Self::build_run_args(spec);
        let redacted_args: Vec<String> = args
            .iter()
            .map(|a| crate::redaction::global_registry().redact_text(a))
            .collect();
        debug!(args = ?redacted_args, "running container");

        tokio::task::spawn_blocking(move || {
            let output = Self::run_blocking(&docker_path, &args)?;
            Ok(RunResult {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        })
        .await
        .map_err(|e| PackError::docker(format!("join error: {e}")))?
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        let docker_path = self.docker_path.clone();
        let reference = reference.to_string();
        tokio::task::spawn_blocking(move || {
            let output = Self::run_blocking(&docker_path, &["pull".into(), reference.clone()])?;
            if output.status.success() {
                Ok(())
            } else {
                Err(PackError::docker(format!(
                    "pulling '{reference}': {}",
                    String::from_utf8_lossy(&output.stderr)
                )))
            }
        })
        .await
        .map_err(|e| PackError::docker(format!("join error: {e}")))?
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        match self.inspect_image(reference).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn inspect_image(&self, reference: &str) -> Result<serde_json::Value> {
        let docker_path = self.docker_path.clone();
        let reference = reference.to_string();
        tokio::task::spawn_blocking(move || {
            let output = Self::run_blocking(&docker_path, &["inspect".into(), reference.clone()])?;
            if !output.status.success() {
                return Err(PackError::docker(format!(
                    "inspecting '{reference}': {}",
                    String::from_utf8_lossy(&output.stderr)
                )));
            }
            let stdout = String::from_utf8_lossy(&output.stdout);
            let parsed: Vec<serde_json::Value> = serde_json::from_str(&stdout)
                .map_err(|e| PackError::docker(format!("parsing inspect output: {e}")))?;
            parsed
                .into_iter()
                .next()
                .ok_or_else(|| PackError::docker(format!("'{reference}' not found")))
        })
        .await
        .map_err(|e| PackError::docker(format!("join error: {e}")))?
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        let docker_path = self.docker_path.clone();
        let reference = reference.to_string();
        tokio::task::spawn_blocking(move || {
            let output = Self::run_blocking(&docker_path, &["rmi".into(), reference])?;
            if output.status.success() {
                Ok(())
            } else {
                Err(PackError::docker(String::from_utf8_lossy(&output.stderr).to_string()))
            }
        })
        .await
        .map_err(|e| PackError::docker(format!("join error: {e}")))?
    }

    async fn volume_exists(&self, name: &str) -> Result<bool> {
        let docker_path = self.docker_path.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            let output = Self::run_blocking(&docker_path, &["volume".into(), "inspect".into(), name])?;
            Ok(output.status.success())
        })
        .await
        .map_err(|e| PackError::docker(format!("join error: {e}")))?
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        if self.volume_exists(name).await? {
            return Ok(());
        }
        let docker_path = self.docker_path.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            let output = Self::run_blocking(&docker_path, &["volume".into(), "create".into(), name])?;
            if output.status.success() {
                Ok(())
            } else {
                Err(PackError::docker(String::from_utf8_lossy(&output.stderr).to_string()))
            }
        })
        .await
        .map_err(|e| PackError::docker(format!("join error: {e}")))?
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        let docker_path = self.docker_path.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            let output = Self::run_blocking(&docker_path, &["volume".into(), "rm".into(), name])?;
            if output.status.success() {
                Ok(())
            } else {
                Err(PackError::docker(String::from_utf8_lossy(&output.stderr).to_string()))
            }
        })
        .await
        .map_err(|e| PackError::docker(format!("join error: {e}")))?
    }

    #[instrument(skip(self, spec, on_log, cancel), fields(container = %container_name))]
    async fn run_phase(
        &self,
        container_name: &str,
        spec: &ContainerRunSpec,
        on_log: Arc<dyn Fn(&str) + Send + Sync>,
        cancel: CancellationToken,
    ) -> Result<RunResult> {
        let args = Self::build_detached_args(container_name, spec);
        let create = tokio::process::Command::new(&self.docker_path)
            .args(&args)
            .output()
            .await
            .map_err(|e| PackError::docker(format!("starting container '{container_name}': {e}")))?;
        if !create.status.success() {
            return Err(PackError::docker(format!(
                "starting container '{container_name}': {}",
                String::from_utf8_lossy(&create.stderr)
            )));
        }

        let captured = Arc::new(Mutex::new(String::new()));
        let log_task = {
            let docker_path = self.docker_path.clone();
            let name = container_name.to_string();
            let captured = Arc::clone(&captured);
            tokio::spawn(async move {
                let mut child = match tokio::process::Command::new(&docker_path)
                    .args(["logs", "-f", &name])
                    .stdout(std::process::Stdio::piped())
                    .stderr(std::process::Stdio::piped())
                    .spawn()
                {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("failed to follow logs for '{name}': {e}");
                        return;
                    }
                };
                let stdout = child.stdout.take();
                let mut lines = stdout.map(|s| BufReader::new(s).lines());
                if let Some(lines) = lines.as_mut() {
                    while let Ok(Some(line)) = lines.next_line().await {
                        let line = crate::redaction::global_registry().redact_text(&line);
                        captured.lock().unwrap().push_str(&line);
                        captured.lock().unwrap().push('\n');
                        on_log(&line);
                    }
                }
                let _ = child.wait().await;
            })
        };

        let wait_cmd = tokio::process::Command::new(&self.docker_path)
            .args(["wait", container_name])
            .output();

        let cancelled;
        let exit_code;
        tokio::select! {
            result = wait_cmd => {
                cancelled = false;
                let output = result.map_err(|e| PackError::docker(format!("waiting for '{container_name}': {e}")))?;
                exit_code = String::from_utf8_lossy(&output.stdout)
                    .trim()
                    .parse::<i32>()
                    .unwrap_or(-1);
            }
            _ = cancel.cancelled() => {
                cancelled = true;
                exit_code = -1;
                let docker_path = self.docker_path.clone();
                let name = container_name.to_string();
                let _ = tokio::process::Command::new(&docker_path)
                    .args(["kill", "--signal", "SIGINT", &name])
                    .output()
                    .await;
            }
        }

        log_task.abort();
        let docker_path = self.docker_path.clone();
        let name = container_name.to_string();
        let _ = tokio::task::spawn_blocking(move || {
            Self::run_blocking(&docker_path, &["rm".into(), "-f".into(), name])
        })
        .await;

        if cancelled {
            return Err(PackError::Cancelled);
        }

        let stdout = captured.lock().unwrap().clone();
        Ok(RunResult {
            exit_code,
            stdout,
            stderr: String::new(),
        })
    }

    async fn load_image_tar(&self, tar_bytes: Vec<u8>) -> Result<()> {
        let docker_path = self.docker_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut tmp = std::env::temp_dir();
            tmp.push(format!("pack-load-{}.tar", fastrand::u64(..)));
            std::fs::write(&tmp, &tar_bytes).map_err(|e| PackError::io("writing image tar for load".to_string(), e))?;
            let result = Self::run_blocking(&docker_path, &["load".into(), "-i".into(), tmp.to_string_lossy().into_owned()]);
            let _ = std::fs::remove_file(&tmp);
            let output = result?;
            if output.status.success() {
                Ok(())
            } else {
                Err(PackError::docker(format!(
                    "loading image: {}",
                    String::from_utf8_lossy(&output.stderr)
                )))
            }
        })
        .await
        .map_err(|e| PackError::docker(format!("join error: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_args_sort_env_for_deterministic_invocation() {
        let mut spec = ContainerRunSpec {
            image: "cnbs/lifecycle".into(),
            args: vec!["-app".into(), "/workspace".into()],
            network: Some("host".into()),
            user: Some("1000:1000".into()),
            ..Default::default()
        };
        spec.env.insert("B".into(), "2".into());
        spec.env.insert("A".into(), "1".into());
        spec.binds.push(Bind::rw("cache-vol", "/cache"));

        let args = CliDocker::build_run_args(&spec);
        let a_pos = args.iter().position(|a| a == "A=1").unwrap();
        let b_pos = args.iter().position(|a| a == "B=2").unwrap();
        assert!(a_pos < b_pos);
        assert!(args.contains(&"--network".to_string()));
        assert!(args.contains(&"cnbs/lifecycle".to_string()));
        assert_eq!(args.last().unwrap(), "/workspace");
    }

    #[test]
    fn read_only_bind_appends_ro_suffix() {
        let mut spec = ContainerRunSpec {
            image: "img".into(),
            ..Default::default()
        };
        spec.binds.push(Bind {
            source: "src".into(),
            target: "/dst".into(),
            read_only: true,
        });
        let args = CliDocker::build_run_args(&spec);
        assert!(args.contains(&"src:/dst:ro".to_string()));
    }
}
