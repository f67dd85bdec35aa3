//! `pack create-builder` — assemble a builder image from `builder.toml`.

use crate::cli::CreateBuilderArgs;
use crate::commands::shared::{self, terminal};
use pack_core::builder::BuilderSpec;
use pack_core::codec::Buildpack;
use pack_core::config::BuilderBuildpackEntry;
use pack_core::descriptor::{LifecycleDescriptor, OrderGroup, OrderGroupEntry};
use pack_core::errors::{PackError, Result};
use std::path::Path;
use tracing::warn;

pub async fn run(args: CreateBuilderArgs, no_color: bool, verbose: bool) -> Result<()> {
    let config = shared::load_builder_config(&args.builder_config)?;

    let buildpacks = resolve_buildpacks(&config.buildpacks)?;
    if buildpacks.is_empty() {
        return Err(PackError::usage(format!(
            "'{}' declares no resolvable buildpacks",
            args.builder_config.display()
        )));
    }
    let default = buildpacks[0].descriptor().info.clone();

    let lifecycle_dir = config.lifecycle.uri.as_ref().ok_or_else(|| {
        PackError::usage(
            "fetching a lifecycle release by version is not implemented; \
             set [lifecycle].uri to a local directory containing the lifecycle binaries",
        )
    })?;
    let lifecycle_layer_tar = shared::build_lifecycle_layer_tar(Path::new(lifecycle_dir))?;
    let lifecycle = LifecycleDescriptor {
        version: config.lifecycle.version.clone().unwrap_or_default(),
        buildpack_api_version: String::new(),
        platform_api_version: String::new(),
    };

    let order = config
        .order
        .iter()
        .map(|entry| OrderGroup {
            group: entry
                .group
                .iter()
                .map(|member| OrderGroupEntry {
                    id: member.id.clone(),
                    version: member.version.clone(),
                    optional: member.optional,
                })
                .collect(),
        })
        .collect();

    let spec = BuilderSpec {
        description: config.description.clone(),
        stack_id: config.stack.id.clone(),
        stack_mixins: Vec::new(),
        run_image: config.stack.run_image.clone(),
        run_image_mirrors: config.stack.run_image_mirrors.clone(),
        lifecycle,
        lifecycle_layer_tar,
        order,
    };

    let client = shared::client(verbose);
    client
        .create_builder(&args.image, args.publish, &spec, &default, &buildpacks)
        .await?;

    terminal::success(no_color, &format!("Successfully created builder image '{}'", args.image));
    Ok(())
}

fn resolve_buildpacks(entries: &[BuilderBuildpackEntry]) -> Result<Vec<Buildpack>> {
    let mut buildpacks = Vec::new();
    for entry in entries {
        match &entry.uri {
            Some(uri) if !uri.starts_with("http://") && !uri.starts_with("https://") => {
                let path = uri.strip_prefix("file://").unwrap_or(uri);
                buildpacks.push(shared::buildpack_from_path(Path::new(path))?);
            }
            Some(uri) => {
                warn!(uri = %uri, "remote buildpack fetch is not implemented; skipping");
            }
            None => {
                warn!("buildpack entry with no 'uri' (image-referenced buildpacks are not implemented); skipping");
            }
        }
    }
    Ok(buildpacks)
}
