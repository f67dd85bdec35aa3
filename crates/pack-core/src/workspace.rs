//! App-content staging.
//!
//! Copies application source into the ephemeral volume each lifecycle phase
//! mounts at `/workspace`, grounded on `internal/build/
//! lifecycle_execution.go`'s app-content handling (the original bind-mounts
//! a per-build temp directory it has already populated; this re-expression
//! stages the same content into a named Docker volume via a throwaway
//! container based on the builder image, which always carries a POSIX shell
//! per the CNB builder image contract). Keeping app content in an owned
//! volume rather than bind-mounting the host path directly matches
//! the `Phase Config` invariant ("Binds always include
//! `{app_volume}:/workspace`").

use crate::docker::{Bind, ContainerRunSpec, Docker};
use crate::errors::{PackError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// Write `env` out as one file per variable under a fresh temp directory, in
/// the shape the lifecycle's `-platform /platform` flag expects
/// (`/platform/env/<KEY>` containing the value). Grounded on
/// `internal/build/lifecycle_execution.go`'s platform-dir
/// staging: the original writes these files straight into the temp dir it
/// then bind-mounts read-only, which this mirrors directly rather than
/// routing through a named volume (unlike the app/layers volumes, nothing
/// else needs to see this directory again after the phase exits).
pub fn stage_platform_env(env: &HashMap<String, String>) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("pack-platform-{}", fastrand::u64(..)));
    let env_dir = dir.join("env");
    std::fs::create_dir_all(&env_dir).map_err(|e| PackError::io(format!("creating '{}'", env_dir.display()), e))?;
    for (key, value) in env {
        std::fs::write(env_dir.join(key), value)
            .map_err(|e| PackError::io(format!("writing platform env var '{key}'"), e))?;
    }
    Ok(dir)
}

/// Bind-mount the directory [`stage_platform_env`] produced, read-only, at
/// `/platform`.
pub fn platform_bind(platform_dir: &Path) -> Bind {
    Bind {
        source: platform_dir.to_string_lossy().to_string(),
        target: "/platform".to_string(),
        read_only: true,
    }
}

/// Copy `app_path`'s contents into `app_volume`.
#[instrument(skip(docker))]
pub async fn populate_app_volume(
    docker: &Arc<dyn Docker>,
    builder_image: &str,
    app_path: &Path,
    app_volume: &str,
) -> Result<()> {
    if !app_path.exists() {
        return Err(PackError::usage(format!(
            "app path '{}' does not exist",
            app_path.display()
        )));
    }
    docker.create_volume(app_volume).await?;
    let spec = ContainerRunSpec {
        image: builder_image.to_string(),
        entrypoint: Some("/bin/sh".to_string()),
        args: vec![
            "-c".to_string(),
            "cp -a /pack-app-src/. /workspace/".to_string(),
        ],
        binds: vec![
            Bind {
                source: app_path.to_string_lossy().to_string(),
                target: "/pack-app-src".to_string(),
                read_only: true,
            },
            Bind::rw(app_volume, "/workspace"),
        ],
        user: Some("root".to_string()),
        ..Default::default()
    };
    let result = docker.run(&spec).await?;
    if !result.success() {
        return Err(PackError::precondition(format!(
            "staging app source '{}' into the build volume failed: {}",
            app_path.display(),
            result.stderr
        )));
    }
    Ok(())
}
