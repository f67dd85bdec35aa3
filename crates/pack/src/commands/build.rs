//! `pack build` — run detect/restore/analyze/build/export against a builder.
//!
//! Grounded on `commands/build.go`'s option-resolution
//! order: CLI flags first, falling back to `project.toml`, falling back to
//! `$PACK_HOME/config.toml`'s `default-builder-image`.

use crate::cli::BuildArgs;
use crate::commands::shared::{self, terminal};
use pack_core::errors::{PackError, Result};
use pack_core::facade::BuildOptions;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub async fn run(args: BuildArgs, no_color: bool, verbose: bool, cancel: CancellationToken) -> Result<()> {
    let config = shared::load_pack_config()?;
    let project = shared::load_project_descriptor(args.descriptor.as_deref(), &args.path)?;

    let builder_image = args
        .builder
        .clone()
        .or_else(|| config.default_builder_image.clone())
        .ok_or_else(|| {
            PackError::usage("no builder specified: pass -B/--builder or run 'pack set-default-builder'")
        })?;

    let mut env: HashMap<String, String> = HashMap::new();
    if let Some(project) = &project {
        env.extend(project.build.env.clone());
    }
    if let Some(env_file) = &args.env_file {
        env.extend(shared::parse_env_file(env_file)?);
    }
    for pair in &args.env {
        let (key, value) = shared::parse_env_pair(pair)?;
        env.insert(key, value);
    }

    if !args.buildpack.is_empty() {
        warn!(
            "--buildpack overlays are not applied by this build's detect phase; \
             add the buildpack to the builder image instead"
        );
    }
    if let Some(project) = &project {
        if !project.build.buildpacks.is_empty() {
            warn!("project.toml [[build.buildpacks]] entries are not applied by this build's detect phase");
        }
    }

    let volumes = args
        .volume
        .iter()
        .map(|v| shared::parse_volume(v))
        .collect::<Result<Vec<_>>>()?;

    let mirrors = config.mirrors_for(args.run_image.as_deref().unwrap_or(&builder_image));

    let opts = BuildOptions {
        repo_name: args.image.clone(),
        builder_image,
        app_path: args.path.clone(),
        run_image_override: args.run_image.clone(),
        env,
        publish: args.publish,
        no_pull: args.no_pull,
        clear_cache: args.clear_cache,
        network: args.network.clone(),
        volumes,
    };

    let client = shared::client(verbose);
    let report = client.build(&opts, &mirrors, cancel).await?;

    if let Some(mirror) = &report.selected_mirror {
        terminal::info(no_color, &format!("Selected run image mirror '{mirror}'"));
    }
    terminal::success(
        no_color,
        &format!("Successfully built image '{}'", report.repo_name),
    );
    Ok(())
}
