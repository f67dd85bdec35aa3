//! Lifecycle Orchestrator
//!
//! Drives the phase state machine (detect → restore → analyze → build →
//! export, plus a single-phase rebase variant) by composing
//! `phase::PhaseConfig` via the Phase Factory and running each one through
//! `Docker::run_phase`. Grounded on the upstream `internal/build/phases.go`
//! for the exact per-phase arg/bind/env wiring and on this crate's
//! `container_lifecycle.rs` for the Rust shape (progress-callback pattern,
//! `#[instrument]`-annotated async functions, an aggregate result type).

use crate::cache::CacheHandle;
use crate::docker::{Bind, ContainerRunSpec, Docker};
use crate::errors::{PackError, Result};
use crate::phase::{self, PhaseConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// A single phase's outcome, retained for the caller's summary/log replay.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub phase: String,
    pub exit_code: i32,
    pub logs: String,
}

/// Everything the orchestrator needs to run a full build, independent of
/// where `repo_name`/`run_image` etc. were resolved from (CLI flags,
/// `project.toml`, or `$PACK_HOME/config.toml` defaults).
pub struct BuildPlan {
    pub repo_name: String,
    pub run_image: String,
    pub publish: bool,
    pub clear_cache: bool,
    pub network_mode: String,
    pub user_volumes: Vec<Bind>,
    pub cache: Arc<dyn CacheHandle>,
    pub launch_cache: Arc<dyn CacheHandle>,
    /// Pre-built `CNB_REGISTRY_AUTH` JSON value; empty when `!publish`.
    pub registry_auth_json: String,
}

/// The orchestrator itself: bound to one builder image and its two
/// lifecycle-scoped volumes (`/layers`, `/workspace`) for the duration of a
/// single build invocation.
pub struct Lifecycle {
    docker: Arc<dyn Docker>,
    builder_image: String,
    layers_volume: String,
    app_volume: String,
    lifecycle_version_newer_than_0_4: bool,
    verbose: bool,
}

static PHASE_COUNTER: AtomicU64 = AtomicU64::new(0);

impl Lifecycle {
    pub fn new(
        docker: Arc<dyn Docker>,
        builder_image: impl Into<String>,
        layers_volume: impl Into<String>,
        app_volume: impl Into<String>,
        lifecycle_version_newer_than_0_4: bool,
        verbose: bool,
    ) -> Self {
        Lifecycle {
            docker,
            builder_image: builder_image.into(),
            layers_volume: layers_volume.into(),
            app_volume: app_volume.into(),
            lifecycle_version_newer_than_0_4,
            verbose,
        }
    }

    fn seed(&self, phase: &str) -> PhaseConfig {
        PhaseConfig::new(&self.builder_image, phase, &self.layers_volume, &self.app_volume)
            .with_log_level(self.lifecycle_version_newer_than_0_4, self.verbose)
    }

    /// Run `plan`'s full build: detect → (restore, unless clearing cache) →
    /// analyze → build → export. Stops and returns the first error,
    /// including cancellation, without running subsequent phases — the
    /// state machine never parallelizes phases of a single build.
    #[instrument(skip(self, plan, cancel))]
    pub async fn run_build(&self, plan: &BuildPlan, cancel: CancellationToken) -> Result<Vec<PhaseOutcome>> {
        let mut outcomes = Vec::new();

        outcomes.push(self.detect(&plan.network_mode, &plan.user_volumes, cancel.clone()).await?);

        if plan.clear_cache {
            info!("Skipping 'restore' due to clearing cache");
        } else {
            outcomes.push(self.restore(plan.cache.name(), cancel.clone()).await?);
        }

        outcomes.push(
            self.analyze(
                &plan.repo_name,
                plan.cache.name(),
                plan.publish,
                plan.clear_cache,
                &plan.registry_auth_json,
                cancel.clone(),
            )
            .await?,
        );

        outcomes.push(self.build(&plan.network_mode, &plan.user_volumes, cancel.clone()).await?);

        outcomes.push(
            self.export(
                &plan.repo_name,
                &plan.run_image,
                plan.publish,
                plan.launch_cache.name(),
                plan.cache.name(),
                &plan.registry_auth_json,
                cancel,
            )
            .await?,
        );

        Ok(outcomes)
    }

    /// Offline iff `network_mode == "none"`. Binds layers + app + any
    /// user-supplied volumes.
    #[instrument(skip(self, cancel))]
    pub async fn detect(
        &self,
        network_mode: &str,
        user_volumes: &[Bind],
        cancel: CancellationToken,
    ) -> Result<PhaseOutcome> {
        let config = self.seed("detector");
        let config = phase::with_args(config, &["-app", "/workspace", "-platform", "/platform"])?;
        let config = phase::with_network(config, network_mode)?;
        let config = phase::with_binds(config, user_volumes)?;
        self.run_phase(config, cancel).await
    }

    #[instrument(skip(self, cancel))]
    pub async fn restore(&self, cache_name: &str, cancel: CancellationToken) -> Result<PhaseOutcome> {
        let config = self.seed("restorer");
        let config = phase::with_daemon_access(config)?;
        let config = phase::with_args(config, &["-cache-dir", "/cache", "-layers", "/layers"])?;
        let config = phase::with_binds(config, &[Bind::rw(cache_name, "/cache")])?;
        self.run_phase(config, cancel).await
    }

    #[instrument(skip(self, registry_auth_json, cancel))]
    pub async fn analyze(
        &self,
        repo_name: &str,
        cache_name: &str,
        publish: bool,
        clear_cache: bool,
        registry_auth_json: &str,
        cancel: CancellationToken,
    ) -> Result<PhaseOutcome> {
        let mut config = self.seed("analyzer");
        config = phase::with_binds(config, &[Bind::rw(cache_name, "/cache")])?;

        if publish {
            config = phase::with_registry_access(config, &[repo_name], registry_auth_json)?;
            config = phase::with_root(config)?;
            config = phase::with_args(config, &["-layers", "/layers", repo_name])?;
        } else {
            config = phase::with_daemon_access(config)?;
            config = phase::with_args(config, &["-daemon", "-layers", "/layers", repo_name])?;
        }

        if clear_cache {
            config = phase::prepend_arg(config, "-skip-layers")?;
        } else {
            config = phase::prepend_arg(config, "/cache")?;
            config = phase::prepend_arg(config, "-cache-dir")?;
        }

        self.run_phase(config, cancel).await
    }

    #[instrument(skip(self, cancel))]
    pub async fn build(
        &self,
        network_mode: &str,
        user_volumes: &[Bind],
        cancel: CancellationToken,
    ) -> Result<PhaseOutcome> {
        let config = self.seed("builder");
        let config = phase::with_args(config, &["-layers", "/layers", "-app", "/workspace", "-platform", "/platform"])?;
        let config = phase::with_network(config, network_mode)?;
        let config = phase::with_binds(config, user_volumes)?;
        self.run_phase(config, cancel).await
    }

    #[instrument(skip(self, registry_auth_json, cancel))]
    pub async fn export(
        &self,
        repo_name: &str,
        run_image: &str,
        publish: bool,
        launch_cache_name: &str,
        cache_name: &str,
        registry_auth_json: &str,
        cancel: CancellationToken,
    ) -> Result<PhaseOutcome> {
        let mut config = self.seed("exporter");
        config = phase::with_binds(config, &[Bind::rw(cache_name, "/cache")])?;

        if publish {
            config = phase::with_registry_access(config, &[repo_name, run_image], registry_auth_json)?;
            config = phase::with_root(config)?;
            config = phase::with_args(
                config,
                &["-image", run_image, "-cache-dir", "/cache", "-layers", "/layers", "-app", "/workspace", repo_name],
            )?;
        } else {
            config = phase::with_daemon_access(config)?;
            config = phase::with_binds(config, &[Bind::rw(launch_cache_name, "/launch-cache")])?;
            config = phase::with_args(
                config,
                &[
                    "-daemon",
                    "-launch-cache",
                    "/launch-cache",
                    "-image",
                    run_image,
                    "-cache-dir",
                    "/cache",
                    "-layers",
                    "/layers",
                    "-app",
                    "/workspace",
                    repo_name,
                ],
            )?;
        }

        self.run_phase(config, cancel).await
    }

    /// Rebase is a single phase with no cache volumes: registry or daemon
    /// access depending on `publish`, args `-image {run_image} {repo}`.
    #[instrument(skip(self, registry_auth_json, cancel))]
    pub async fn rebase(
        &self,
        repo_name: &str,
        run_image: &str,
        publish: bool,
        registry_auth_json: &str,
        cancel: CancellationToken,
    ) -> Result<PhaseOutcome> {
        let mut config = self.seed("rebaser");
        if publish {
            config = phase::with_registry_access(config, &[repo_name, run_image], registry_auth_json)?;
            config = phase::with_root(config)?;
        } else {
            config = phase::with_daemon_access(config)?;
        }
        config = phase::with_args(config, &["-image", run_image, repo_name])?;
        self.run_phase(config, cancel).await
    }

    async fn run_phase(&self, config: PhaseConfig, cancel: CancellationToken) -> Result<PhaseOutcome> {
        let phase_name = config.phase.clone();
        let container_name = format!(
            "pack-{phase_name}-{}",
            PHASE_COUNTER.fetch_add(1, Ordering::Relaxed)
        );

        let spec = ContainerRunSpec {
            image: config.image,
            args: config.args,
            env: config.env,
            binds: config.binds,
            network: config.network,
            user: config.user,
            entrypoint: Some(format!("/cnb/lifecycle/{phase_name}")),
        };

        let log_phase = phase_name.clone();
        let on_log: Arc<dyn Fn(&str) + Send + Sync> =
            Arc::new(move |line: &str| info!(phase = %log_phase, "{line}"));

        let result = self
            .docker
            .run_phase(&container_name, &spec, on_log, cancel)
            .await?;

        if !result.success() {
            return Err(PackError::PhaseFailure {
                phase: phase_name,
                exit_code: result.exit_code as i64,
            });
        }

        Ok(PhaseOutcome {
            phase: phase_name,
            exit_code: result.exit_code,
            logs: result.stdout,
        })
    }
}
