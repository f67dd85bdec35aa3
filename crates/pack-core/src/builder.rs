//! Builder Assembler
//!
//! Turns a build image plus a set of buildpacks and a lifecycle binary into
//! a builder image: a package image (per [`crate::package`]) based on the
//! build image, carrying the additional labels a builder needs so the
//! Lifecycle Orchestrator can run phases against it. Grounded on the
//! upstream `internal/builder/creator.go`'s `Creator.Create(config)` shape
//! and `commands/create_builder.go`'s validation sequence, generalized
//! since the original stub predates the actual metadata-writing logic.

use crate::codec::Buildpack;
use crate::descriptor::{BuildpackInfo, LifecycleDescriptor, OrderGroup};
use crate::errors::{PackError, Result};
use crate::fetcher::ImageHandle;
use crate::layer::ImageOs;
use crate::package::{self, PreparedLayer};
use serde::Serialize;
use std::io::Cursor;
use tracing::{info, instrument, warn};

/// `io.buildpacks.builder.metadata`: everything a client needs to describe
/// this builder without pulling every buildpack individually. Mirrors the
/// `builder.toml` input it's derived from, the label list.
#[derive(Debug, Clone, Serialize)]
pub struct BuilderMetadata {
    pub description: String,
    pub stack: BuilderMetadataStack,
    pub lifecycle: LifecycleDescriptor,
    pub buildpacks: Vec<BuildpackInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuilderMetadataStack {
    #[serde(rename = "runImage")]
    pub run_image: BuilderMetadataRunImage,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuilderMetadataRunImage {
    pub image: String,
    #[serde(default)]
    pub mirrors: Vec<String>,
}

/// Everything `assemble` needs beyond the buildpacks themselves: the stack
/// this builder targets, the run-image it'll pair with, the lifecycle
/// descriptor + its binary layer tar, and the resolved order.
pub struct BuilderSpec {
    pub description: String,
    pub stack_id: String,
    pub stack_mixins: Vec<String>,
    pub run_image: String,
    pub run_image_mirrors: Vec<String>,
    pub lifecycle: LifecycleDescriptor,
    pub lifecycle_layer_tar: Vec<u8>,
    pub order: Vec<OrderGroup>,
}

/// Validate that every non-meta buildpack in `buildpacks` supports
/// `spec.stack_id`: every buildpack in a builder must declare support for
/// the builder's stack id, unless the buildpack is a meta-buildpack.
fn validate_stack_support(spec: &BuilderSpec, buildpacks: &[Buildpack]) -> Result<()> {
    for bp in buildpacks {
        let descriptor = bp.descriptor();
        if descriptor.is_meta_buildpack() {
            continue;
        }
        if !descriptor.supports_stack(&spec.stack_id, &spec.stack_mixins) {
            return Err(PackError::precondition(format!(
                "buildpack '{}' does not support stack '{}'",
                descriptor.info.full_name(),
                spec.stack_id
            )));
        }
    }
    Ok(())
}

/// Warn (non-fatally) when an order group references a buildpack id
/// without a version while more than one version of that id is present
/// among `buildpacks`.
fn warn_on_ambiguous_order_versions(spec: &BuilderSpec, buildpacks: &[Buildpack]) {
    for group in &spec.order {
        for entry in &group.group {
            if entry.version.is_empty() {
                let versions: Vec<&str> = buildpacks
                    .iter()
                    .filter(|bp| bp.descriptor().info.id == entry.id)
                    .map(|bp| bp.descriptor().info.version.as_str())
                    .collect();
                if versions.len() > 1 {
                    warn!(
                        buildpack = %entry.id,
                        "order group references '{}' without a version but {} versions are available",
                        entry.id,
                        versions.len()
                    );
                }
            }
        }
    }
}

/// Warn when the lifecycle version is older than the minimum feature gate
/// (0.4.0) the Phase Factory consumes,.
fn warn_on_old_lifecycle(spec: &BuilderSpec) {
    if !spec.lifecycle.newer_than("0.4.0") {
        warn!(
            version = %spec.lifecycle.version,
            "lifecycle version is at or below the minimum feature gate (0.4.0); some phase options will be unavailable"
        );
    }
}

/// Assemble `buildpacks` plus the lifecycle binary onto `target` (already
/// constructed against the build image) and write
/// every builder label. Mirrors `Creator.Create`'s sequence: validate, add
/// buildpack layers, add the lifecycle layer, write labels, save.
#[instrument(skip(buildpacks, target))]
pub async fn assemble(
    spec: &BuilderSpec,
    default: &BuildpackInfo,
    buildpacks: &[Buildpack],
    target: &mut dyn ImageHandle,
) -> Result<()> {
    if buildpacks.is_empty() {
        return Err(PackError::usage("builder must contain at least one buildpack"));
    }
    validate_stack_support(spec, buildpacks)?;
    warn_on_ambiguous_order_versions(spec, buildpacks);
    warn_on_old_lifecycle(spec);

    let prepared: Vec<PreparedLayer> = package::prepare_layers(buildpacks, ImageOs::Linux)?;
    for layer in &prepared {
        let tar_path = stage_layer_tar(&layer.tar)?;
        target.add_layer(&tar_path, &layer.diff_id).await?;
    }

    let lifecycle_diff_id = crate::codec::layer_diff_id(Cursor::new(&spec.lifecycle_layer_tar))?;
    let lifecycle_tar_path = stage_layer_tar(&spec.lifecycle_layer_tar)?;
    target.add_layer(&lifecycle_tar_path, &lifecycle_diff_id).await?;

    target.set_label("io.buildpacks.stack.id", &spec.stack_id).await?;

    let package_metadata = package::buildpackage_metadata(default, buildpacks);
    let package_metadata_json = serde_json::to_string(&package_metadata)
        .map_err(|e| PackError::codec(format!("encoding buildpackage metadata: {e}")))?;
    target
        .set_label("io.buildpacks.buildpackage.metadata", &package_metadata_json)
        .await?;

    let layers_label = package::buildpack_layers_label(buildpacks, &prepared);
    let layers_json = serde_json::to_string(&layers_label)
        .map_err(|e| PackError::codec(format!("encoding buildpack layers label: {e}")))?;
    target
        .set_label("io.buildpacks.buildpack.layers", &layers_json)
        .await?;

    let lifecycle_json = serde_json::to_string(&spec.lifecycle)
        .map_err(|e| PackError::codec(format!("encoding lifecycle metadata: {e}")))?;
    target
        .set_label("io.buildpacks.lifecycle.metadata", &lifecycle_json)
        .await?;

    let builder_metadata = BuilderMetadata {
        description: spec.description.clone(),
        stack: BuilderMetadataStack {
            run_image: BuilderMetadataRunImage {
                image: spec.run_image.clone(),
                mirrors: spec.run_image_mirrors.clone(),
            },
        },
        lifecycle: spec.lifecycle.clone(),
        buildpacks: buildpacks.iter().map(|bp| bp.descriptor().info.clone()).collect(),
    };
    let builder_metadata_json = serde_json::to_string(&builder_metadata)
        .map_err(|e| PackError::codec(format!("encoding builder metadata: {e}")))?;
    target
        .set_label("io.buildpacks.builder.metadata", &builder_metadata_json)
        .await?;

    target.save().await?;
    info!(stack = %spec.stack_id, buildpacks = buildpacks.len(), "assembled builder image");
    Ok(())
}

fn stage_layer_tar(tar_bytes: &[u8]) -> Result<String> {
    let dir = std::env::temp_dir().join("pack-builder-layers");
    std::fs::create_dir_all(&dir).map_err(|e| PackError::io(format!("creating '{}'", dir.display()), e))?;
    let digest = crate::codec::layer_diff_id(Cursor::new(tar_bytes))?;
    let file_name = digest.trim_start_matches("sha256:");
    let path = dir.join(format!("{file_name}.tar"));
    std::fs::write(&path, tar_bytes).map_err(|e| PackError::io(format!("writing '{}'", path.display()), e))?;
    Ok(path.to_string_lossy().to_string())
}
