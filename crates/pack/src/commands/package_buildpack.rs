//! `pack package-buildpack` — assemble a buildpackage from `package.toml`,
//! either as an image or as a standalone `.cnb` file.

use crate::cli::PackageBuildpackArgs;
use crate::commands::shared::{self, terminal};
use pack_core::codec::Buildpack;
use pack_core::config::PackageBuildpackEntry;
use pack_core::errors::{PackError, Result};
use pack_core::layer::ImageOs;
use std::path::Path;
use tracing::warn;

pub async fn run(args: PackageBuildpackArgs, no_color: bool, verbose: bool) -> Result<()> {
    let config = shared::load_package_config(&args.config)?;

    if !config.packages.is_empty() {
        for package in &config.packages {
            warn!(
                reference = %package.reference,
                "composing buildpacks from a referenced package image is not implemented; skipping"
            );
        }
    }

    let buildpacks = resolve_buildpacks(&config.buildpacks)?;
    if buildpacks.is_empty() {
        return Err(PackError::usage(format!(
            "'{}' declares no resolvable buildpacks",
            args.config.display()
        )));
    }

    if let Some(cnb_file) = &args.cnb_file {
        pack_core::package::write_cnb_file(&config.default, &buildpacks, ImageOs::Linux, cnb_file)?;
        terminal::success(no_color, &format!("Successfully wrote '{}'", cnb_file.display()));
        return Ok(());
    }

    let client = shared::client(verbose);
    client
        .package_buildpack(&args.name, args.publish, &config.default, &buildpacks, ImageOs::Linux)
        .await?;

    terminal::success(no_color, &format!("Successfully created package '{}'", args.name));
    Ok(())
}

fn resolve_buildpacks(entries: &[PackageBuildpackEntry]) -> Result<Vec<Buildpack>> {
    let mut buildpacks = Vec::new();
    for entry in entries {
        let path = entry.uri.strip_prefix("file://").unwrap_or(&entry.uri);
        buildpacks.push(shared::buildpack_from_path(Path::new(path))?);
    }
    Ok(buildpacks)
}
