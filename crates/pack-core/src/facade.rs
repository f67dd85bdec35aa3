//! Client Facade
//!
//! `PackClient` is the one entry point per user operation: it composes the
//! Image Fetcher, Cache Manager, Phase Factory, and Lifecycle Orchestrator
//! so `crates/pack`'s command handlers never touch those pieces directly.
//! Grounded on the upstream `internal/commands/build.go`'s call into
//! `packClient.Build(ctx, opts)`: one struct, one method per command,
//! returning a small report type the CLI layer formats for stdout.

use crate::builder::{self, BuilderSpec};
use crate::cache::{CacheHandle, VolumeCache};
use crate::descriptor::{BuildpackInfo, LifecycleDescriptor};
use crate::docker::{Bind, Docker};
use crate::errors::{PackError, Result};
use crate::fetcher::{ImageFetcher, ImageHandle, LocalImage, RegistryClient, RemoteImage};
use crate::imageref::ImageReference;
use crate::layer::ImageOs;
use crate::lifecycle::{BuildPlan, Lifecycle, PhaseOutcome};
use crate::package::{self};
use crate::codec::Buildpack;
use crate::workspace;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Options the `build` command resolves from CLI flags + `project.toml` +
/// `$PACK_HOME/config.toml` before handing off to the facade.
pub struct BuildOptions {
    pub repo_name: String,
    pub builder_image: String,
    pub app_path: PathBuf,
    pub run_image_override: Option<String>,
    pub env: HashMap<String, String>,
    pub publish: bool,
    pub no_pull: bool,
    pub clear_cache: bool,
    pub network: String,
    pub volumes: Vec<Bind>,
}

/// What `build` reports back to the CLI for the "Successfully built image"
/// / "Selected run image mirror" lines .
pub struct BuildReport {
    pub repo_name: String,
    pub run_image: String,
    pub selected_mirror: Option<String>,
    pub phases: Vec<PhaseOutcome>,
}

pub struct RebaseOptions {
    pub repo_name: String,
    pub new_run_image: String,
    pub publish: bool,
    pub no_pull: bool,
}

pub struct RebaseReport {
    pub repo_name: String,
    pub run_image: String,
}

/// `io.buildpacks.builder.metadata`, as read back off a builder image (the
/// mirror of [`crate::builder::BuilderMetadata`], deserialized rather than
/// serialized).
#[derive(Debug, Clone, Deserialize)]
struct BuilderMetadataLabel {
    #[serde(default)]
    description: String,
    stack: BuilderMetadataStackLabel,
    lifecycle: LifecycleDescriptor,
}

#[derive(Debug, Clone, Deserialize)]
struct BuilderMetadataStackLabel {
    #[serde(rename = "runImage")]
    run_image: BuilderMetadataRunImageLabel,
}

#[derive(Debug, Clone, Deserialize)]
struct BuilderMetadataRunImageLabel {
    image: String,
    #[serde(default)]
    mirrors: Vec<String>,
}

pub struct InspectImageReport {
    pub name: String,
    pub labels: HashMap<String, String>,
}

pub struct InspectBuilderReport {
    pub name: String,
    pub stack_id: String,
    pub description: String,
    pub run_image: String,
    pub run_image_mirrors: Vec<String>,
    pub lifecycle: LifecycleDescriptor,
}

/// One entry point"Client Facade" row. Holds the `Docker`
/// handle and registry client every sub-operation needs; everything else
/// (cache names, phase configs, builder metadata) is resolved per call.
pub struct PackClient {
    docker: Arc<dyn Docker>,
    registry: RegistryClient,
    verbose: bool,
}

impl PackClient {
    pub fn new(docker: Arc<dyn Docker>, registry: RegistryClient, verbose: bool) -> Self {
        PackClient {
            docker,
            registry,
            verbose,
        }
    }

    fn fetcher(&self) -> ImageFetcher {
        ImageFetcher::new(Arc::clone(&self.docker), self.registry.clone())
    }

    /// Run a full build: resolve the builder, read its metadata, select a
    /// run image (honoring `run-images` mirrors from `$PACK_HOME/config.toml`
    /// when the target repository's registry matches a mirror's), provision
    /// the build + launch caches, and drive the five-phase lifecycle.
    #[instrument(skip(self, opts, mirrors_for_run_image, cancel))]
    pub async fn build(
        &self,
        opts: &BuildOptions,
        mirrors_for_run_image: &[String],
        cancel: CancellationToken,
    ) -> Result<BuildReport> {
        let builder_handle = self
            .fetcher()
            .fetch(&opts.builder_image, true, !opts.no_pull)
            .await?;

        let metadata_json = builder_handle
            .label("io.buildpacks.builder.metadata")
            .await?
            .ok_or_else(|| {
                PackError::precondition(format!(
                    "builder '{}' is missing the 'io.buildpacks.builder.metadata' label",
                    opts.builder_image
                ))
            })?;
        let metadata: BuilderMetadataLabel = serde_json::from_str(&metadata_json)
            .map_err(|e| PackError::codec(format!("decoding builder metadata: {e}")))?;

        let (run_image, selected_mirror) = select_run_image(
            opts.run_image_override.as_deref(),
            &metadata.stack.run_image.image,
            &metadata.stack.run_image.mirrors,
            mirrors_for_run_image,
            &opts.repo_name,
        );

        let build_cache = VolumeCache::new(&opts.repo_name, "build", Arc::clone(&self.docker));
        let launch_cache = VolumeCache::new(&opts.repo_name, "launch", Arc::clone(&self.docker));
        build_cache.ensure().await?;
        launch_cache.ensure().await?;
        let build_cache: Arc<dyn CacheHandle> = Arc::new(build_cache);
        let launch_cache: Arc<dyn CacheHandle> = Arc::new(launch_cache);

        let layers_volume = format!("pack-layers-{}", fastrand::u64(..));
        let app_volume = format!("pack-app-{}", fastrand::u64(..));
        workspace::populate_app_volume(&self.docker, &opts.builder_image, &opts.app_path, &app_volume).await?;

        let platform_dir = workspace::stage_platform_env(&opts.env)?;
        let mut detect_and_build_volumes = opts.volumes.clone();
        detect_and_build_volumes.push(workspace::platform_bind(&platform_dir));

        let lifecycle = Lifecycle::new(
            Arc::clone(&self.docker),
            &opts.builder_image,
            &layers_volume,
            &app_volume,
            metadata.lifecycle.newer_than("0.4.0"),
            self.verbose,
        );

        let registry_auth_json = if opts.publish {
            build_registry_auth_env(&opts.repo_name)
        } else {
            String::new()
        };

        let plan = BuildPlan {
            repo_name: opts.repo_name.clone(),
            run_image: run_image.clone(),
            publish: opts.publish,
            clear_cache: opts.clear_cache,
            network_mode: opts.network.clone(),
            user_volumes: detect_and_build_volumes,
            cache: build_cache,
            launch_cache,
            registry_auth_json,
        };

        let result = lifecycle.run_build(&plan, cancel).await;
        let _ = std::fs::remove_dir_all(&platform_dir);
        let phases = result?;

        Ok(BuildReport {
            repo_name: opts.repo_name.clone(),
            run_image,
            selected_mirror,
            phases,
        })
    }

    /// Single-phase rebase: resolve the target image's current run image via
    /// the `rebaser` lifecycle phase, with no cache volumes involved.
    #[instrument(skip(self, opts, cancel))]
    pub async fn rebase(&self, opts: &RebaseOptions, cancel: CancellationToken) -> Result<RebaseReport> {
        // Fetching validates the image exists (or pulls it) before rebasing;
        // the rebaser phase itself operates on `opts.repo_name` by reference.
        self.fetcher()
            .fetch(&opts.repo_name, !opts.publish, !opts.no_pull)
            .await?;

        let layers_volume = format!("pack-layers-{}", fastrand::u64(..));
        let app_volume = format!("pack-app-{}", fastrand::u64(..));
        let lifecycle = Lifecycle::new(
            Arc::clone(&self.docker),
            &opts.repo_name,
            &layers_volume,
            &app_volume,
            true,
            self.verbose,
        );

        let registry_auth_json = if opts.publish {
            build_registry_auth_env(&opts.repo_name)
        } else {
            String::new()
        };

        lifecycle
            .rebase(&opts.repo_name, &opts.new_run_image, opts.publish, &registry_auth_json, cancel)
            .await?;

        Ok(RebaseReport {
            repo_name: opts.repo_name.clone(),
            run_image: opts.new_run_image.clone(),
        })
    }

    /// Assemble a builder image. `target_name` is the image this builder
    /// will be known as; `publish` selects a registry-backed vs. daemon-backed
    /// target the way [`ImageFetcher::fetch`] does for reads.
    #[instrument(skip(self, spec, default, buildpacks))]
    pub async fn create_builder(
        &self,
        target_name: &str,
        publish: bool,
        spec: &BuilderSpec,
        default: &BuildpackInfo,
        buildpacks: &[Buildpack],
    ) -> Result<()> {
        let mut target = self.new_target(target_name, publish);
        builder::assemble(spec, default, buildpacks, target.as_mut()).await
    }

    /// Assemble a buildpackage image.
    #[instrument(skip(self, default, buildpacks))]
    pub async fn package_buildpack(
        &self,
        target_name: &str,
        publish: bool,
        default: &BuildpackInfo,
        buildpacks: &[Buildpack],
        os: ImageOs,
    ) -> Result<()> {
        let mut target = self.new_target(target_name, publish);
        package::package_into_image(default, buildpacks, os, target.as_mut()).await
    }

    #[instrument(skip(self))]
    pub async fn inspect_image(&self, reference: &str, daemon: bool) -> Result<InspectImageReport> {
        let handle = self.fetcher().fetch(reference, daemon, false).await?;
        let mut labels = HashMap::new();
        for key in [
            "io.buildpacks.stack.id",
            "io.buildpacks.builder.metadata",
            "io.buildpacks.buildpackage.metadata",
            "io.buildpacks.buildpack.layers",
            "io.buildpacks.lifecycle.metadata",
        ] {
            if let Some(value) = handle.label(key).await? {
                labels.insert(key.to_string(), value);
            }
        }
        Ok(InspectImageReport {
            name: handle.name().to_string(),
            labels,
        })
    }

    #[instrument(skip(self))]
    pub async fn inspect_builder(&self, reference: &str, daemon: bool) -> Result<InspectBuilderReport> {
        let handle = self.fetcher().fetch(reference, daemon, false).await?;
        let stack_id = handle
            .label("io.buildpacks.stack.id")
            .await?
            .ok_or_else(|| PackError::precondition(format!("'{reference}' is missing the stack id label")))?;
        let metadata_json = handle
            .label("io.buildpacks.builder.metadata")
            .await?
            .ok_or_else(|| PackError::precondition(format!("'{reference}' is not a builder image")))?;
        let metadata: BuilderMetadataLabel = serde_json::from_str(&metadata_json)
            .map_err(|e| PackError::codec(format!("decoding builder metadata: {e}")))?;

        Ok(InspectBuilderReport {
            name: handle.name().to_string(),
            stack_id,
            description: metadata.description,
            run_image: metadata.stack.run_image.image,
            run_image_mirrors: metadata.stack.run_image.mirrors,
            lifecycle: metadata.lifecycle,
        })
    }

    fn new_target(&self, name: &str, publish: bool) -> Box<dyn ImageHandle> {
        if publish {
            Box::new(RemoteImage::new(self.registry.clone(), name))
        } else {
            Box::new(LocalImage::new(Arc::clone(&self.docker), name))
        }
    }
}

/// Select the run image for a build: an explicit `--run-image` override
/// wins outright; otherwise prefer a mirror whose registry host matches the
/// target repository's registry (so a push to `ghcr.io/...` pulls its run
/// image from `ghcr.io` too), falling back to the builder's declared
/// primary run image. `config_mirrors` (from `$PACK_HOME/config.toml`'s
/// `run-images` table, keyed by the primary image) takes priority over the
/// builder's own `run-image-mirrors` list, mirroring the original's
/// "local config overrides builder defaults" precedence.
fn select_run_image(
    override_image: Option<&str>,
    primary: &str,
    builder_mirrors: &[String],
    config_mirrors: &[String],
    target_repo: &str,
) -> (String, Option<String>) {
    if let Some(run_image) = override_image {
        return (run_image.to_string(), None);
    }

    let target_registry = ImageReference::parse(target_repo).registry;
    let candidates = config_mirrors.iter().chain(builder_mirrors.iter());
    for mirror in candidates {
        if ImageReference::parse(mirror).registry == target_registry {
            return (mirror.clone(), Some(mirror.clone()));
        }
    }
    (primary.to_string(), None)
}

/// Build the `CNB_REGISTRY_AUTH` JSON value for publish-mode phases.
/// Real credential resolution (reading the Docker config's credential
/// store / credential helpers) is an external collaborator;
/// this produces the empty-auth shape the lifecycle accepts when no
/// credentials are configured, and registers the value with the redaction
/// registry before it can reach a log line.
fn build_registry_auth_env(repo_name: &str) -> String {
    let value = format!("{{\"{repo_name}\":\"\"}}");
    crate::redaction::add_global_secret(&value);
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_image_override_wins_outright() {
        let (image, mirror) = select_run_image(Some("acme/custom-run"), "acme/run", &[], &[], "acme/app");
        assert_eq!(image, "acme/custom-run");
        assert!(mirror.is_none());
    }

    #[test]
    fn mirror_matching_target_registry_is_selected() {
        let (image, mirror) = select_run_image(
            None,
            "acme/run",
            &["ghcr.io/acme/run".to_string()],
            &[],
            "ghcr.io/acme/app",
        );
        assert_eq!(image, "ghcr.io/acme/run");
        assert_eq!(mirror.as_deref(), Some("ghcr.io/acme/run"));
    }

    #[test]
    fn config_mirrors_take_priority_over_builder_mirrors() {
        let (image, _) = select_run_image(
            None,
            "acme/run",
            &["ghcr.io/acme/run-builder-mirror".to_string()],
            &["ghcr.io/acme/run-config-mirror".to_string()],
            "ghcr.io/acme/app",
        );
        assert_eq!(image, "ghcr.io/acme/run-config-mirror");
    }

    #[test]
    fn no_matching_mirror_falls_back_to_primary() {
        let (image, mirror) = select_run_image(None, "acme/run", &[], &[], "index.docker.io/acme/app");
        assert_eq!(image, "acme/run");
        assert!(mirror.is_none());
    }
}
