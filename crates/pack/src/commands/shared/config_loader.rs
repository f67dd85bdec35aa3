//! Shared configuration-file loading for CLI commands.
//!
//! Centralizes `$PACK_HOME/config.toml`, `builder.toml`, `package.toml`, and
//! `project.toml` resolution so every subcommand shares the same error
//! mapping, mirroring this crate's `commands/shared/config_loader.rs`
//! "centralize discovery so all subcommands share the same error mapping"
//! rationale.

use pack_core::config::{BuilderConfig, PackConfig, PackageConfig, ProjectDescriptor};
use pack_core::errors::{PackError, Result};
use std::path::Path;

/// Load `$PACK_HOME/config.toml`, falling back to the empty default when the
/// file does not yet exist (first run on a machine with no pack state).
pub fn load_pack_config() -> Result<PackConfig> {
    PackConfig::load()
}

/// Read and parse a `builder.toml` at `path`.
pub fn load_builder_config(path: &Path) -> Result<BuilderConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| PackError::io(format!("reading builder config '{}'", path.display()), e))?;
    BuilderConfig::parse(&contents)
}

/// Read and parse a `package.toml` at `path`.
pub fn load_package_config(path: &Path) -> Result<PackageConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| PackError::io(format!("reading package config '{}'", path.display()), e))?;
    PackageConfig::parse(&contents)
}

/// Load a `project.toml` at an explicit path (`-d/--descriptor`), or, when
/// none is given, a `project.toml` sitting next to the app directory if
/// present. Absence is not an error: `project.toml` is optional.
pub fn load_project_descriptor(
    explicit_path: Option<&Path>,
    app_dir: &Path,
) -> Result<Option<ProjectDescriptor>> {
    let candidate = match explicit_path {
        Some(path) => path.to_path_buf(),
        None => app_dir.join("project.toml"),
    };
    if !candidate.exists() {
        if explicit_path.is_some() {
            return Err(PackError::usage(format!(
                "descriptor file '{}' does not exist",
                candidate.display()
            )));
        }
        return Ok(None);
    }
    Ok(Some(ProjectDescriptor::load(&candidate)?))
}
