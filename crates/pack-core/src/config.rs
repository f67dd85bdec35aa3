//! Configuration file models
//!
//! `$PACK_HOME/config.toml`, `builder.toml` (create-builder input),
//! `package.toml` (package-buildpack input), and `project.toml` (the
//! supplemented per-app descriptor `build -d` reads). Deserialization style
//! mirrors this crate's `config.rs`: plain structs with `#[serde(default)]`
//! for optional fields, plus an explicit validation pass that turns missing
//! required fields into `PackError::Configuration` rather than relying on
//! serde alone.

use crate::errors::{PackError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// `$PACK_HOME/config.toml`. `$PACK_HOME` defaults to `$HOME/.pack`,
/// resolved with `directories-next` the way this crate's `workspace.rs`
/// locates devcontainer state dirs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackConfig {
    #[serde(rename = "default-builder-image", default)]
    pub default_builder_image: Option<String>,
    #[serde(rename = "default-registry-url", default)]
    pub default_registry_url: Option<String>,
    #[serde(rename = "run-images", default)]
    pub run_images: Vec<RunImageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunImageConfig {
    pub image: String,
    #[serde(default)]
    pub mirrors: Vec<String>,
}

impl PackConfig {
    /// Resolve `$PACK_HOME`, honoring the `PACK_HOME` env var and falling
    /// back to `$HOME/.pack`.
    pub fn home_dir() -> Result<PathBuf> {
        if let Ok(explicit) = std::env::var("PACK_HOME") {
            return Ok(PathBuf::from(explicit));
        }
        directories_next::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".pack"))
            .ok_or_else(|| PackError::configuration("could not determine home directory"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Load `config.toml`, returning the default (empty) config when the
    /// file doesn't exist yet — `pack` runs fine with no prior configuration.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PackError::io(format!("reading '{}'", path.display()), e))?;
        toml::from_str(&contents).map_err(|e| PackError::configuration(format!("parsing '{}': {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PackError::io(format!("creating '{}'", parent.display()), e))?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| PackError::configuration(format!("encoding config: {e}")))?;
        std::fs::write(path, contents).map_err(|e| PackError::io(format!("writing '{}'", path.display()), e))
    }

    /// Mirrors configured for `image`, in declaration order, used by
    /// `build`'s "Selected run image mirror" selection .
    pub fn mirrors_for(&self, image: &str) -> Vec<String> {
        self.run_images
            .iter()
            .find(|r| r.image == image)
            .map(|r| r.mirrors.clone())
            .unwrap_or_default()
    }
}

/// `builder.toml`: the input to `create-builder`.
#[derive(Debug, Clone, Deserialize)]
pub struct BuilderConfig {
    #[serde(default)]
    pub description: String,
    pub stack: StackConfig,
    #[serde(default)]
    pub buildpacks: Vec<BuilderBuildpackEntry>,
    #[serde(default)]
    pub order: Vec<OrderEntry>,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StackConfig {
    pub id: String,
    #[serde(rename = "run-image")]
    pub run_image: String,
    #[serde(rename = "run-image-mirrors", default)]
    pub run_image_mirrors: Vec<String>,
    #[serde(rename = "build-image")]
    pub build_image: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuilderBuildpackEntry {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OrderEntry {
    #[serde(default)]
    pub group: Vec<OrderGroupMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderGroupMember {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl BuilderConfig {
    pub fn parse(toml_contents: &str) -> Result<Self> {
        let config: BuilderConfig = toml::from_str(toml_contents)
            .map_err(|e| PackError::configuration(format!("decoding builder.toml: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.stack.id.is_empty() {
            return Err(PackError::configuration("'stack.id' is required"));
        }
        if self.lifecycle.uri.is_none() && self.lifecycle.version.is_none() {
            return Err(PackError::configuration(
                "'lifecycle' must specify either 'uri' or 'version'",
            ));
        }
        Ok(())
    }
}

/// `package.toml`: the input to `package-buildpack`.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageConfig {
    pub default: crate::descriptor::BuildpackInfo,
    #[serde(default)]
    pub buildpacks: Vec<PackageBuildpackEntry>,
    #[serde(default)]
    pub packages: Vec<PackageRefEntry>,
    #[serde(default)]
    pub stacks: Vec<crate::descriptor::Stack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageBuildpackEntry {
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageRefEntry {
    #[serde(rename = "ref")]
    pub reference: String,
}

impl PackageConfig {
    pub fn parse(toml_contents: &str) -> Result<Self> {
        let config: PackageConfig = toml::from_str(toml_contents)
            .map_err(|e| PackError::configuration(format!("decoding package.toml: {e}")))?;
        if config.default.id.is_empty() {
            return Err(PackError::configuration("'default.id' is required"));
        }
        Ok(config)
    }
}

/// `project.toml`: supplemented per-app descriptor (), read
/// by `build` when `-d/--descriptor` is given or a `project.toml` is found
/// at the app root. Grounded on
/// `commands/build.go`'s `parseProjectToml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectDescriptor {
    #[serde(default)]
    pub build: ProjectBuildSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectBuildSection {
    #[serde(default)]
    pub buildpacks: Vec<ProjectBuildpackRef>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectBuildpackRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

impl ProjectDescriptor {
    pub fn parse(toml_contents: &str) -> Result<Self> {
        toml::from_str(toml_contents)
            .map_err(|e| PackError::configuration(format!("decoding project.toml: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PackError::io(format!("reading '{}'", path.display()), e))?;
        Self::parse(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_config_mirrors_for_known_image() {
        let mut config = PackConfig::default();
        config.run_images.push(RunImageConfig {
            image: "acme/run".into(),
            mirrors: vec!["ghcr.io/acme/run".into()],
        });
        assert_eq!(config.mirrors_for("acme/run"), vec!["ghcr.io/acme/run".to_string()]);
        assert!(config.mirrors_for("acme/other").is_empty());
    }

    #[test]
    fn pack_config_round_trips_through_toml() {
        let mut config = PackConfig::default();
        config.default_builder_image = Some("pack-test/builder".into());
        let encoded = toml::to_string_pretty(&config).unwrap();
        let decoded: PackConfig = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded.default_builder_image.as_deref(), Some("pack-test/builder"));
    }

    const SAMPLE_BUILDER_TOML: &str = r#"
description = "test builder"

[stack]
id = "io.buildpacks.stacks.bionic"
run-image = "acme/run"
run-image-mirrors = ["ghcr.io/acme/run"]
build-image = "acme/build"

[[buildpacks]]
uri = "./bp"

[[order]]
[[order.group]]
id = "acme/node"
version = "1.0.0"

[lifecycle]
version = "0.17.0"
"#;

    #[test]
    fn builder_config_parses_sample() {
        let config = BuilderConfig::parse(SAMPLE_BUILDER_TOML).unwrap();
        assert_eq!(config.stack.id, "io.buildpacks.stacks.bionic");
        assert_eq!(config.order[0].group[0].id, "acme/node");
        assert_eq!(config.lifecycle.version.as_deref(), Some("0.17.0"));
    }

    #[test]
    fn builder_config_requires_lifecycle_uri_or_version() {
        let toml = SAMPLE_BUILDER_TOML.replace("version = \"0.17.0\"", "");
        let err = BuilderConfig::parse(&toml).unwrap_err();
        assert!(err.to_string().contains("lifecycle"));
    }

    #[test]
    fn package_config_requires_default_id() {
        let err = PackageConfig::parse("[default]\nversion = \"1.0.0\"\n").unwrap_err();
        assert!(err.to_string().contains("default.id"));
    }

    #[test]
    fn project_descriptor_parses_buildpacks_and_env() {
        let toml = r#"
[build]
buildpacks = [{ id = "acme/node", version = "1.0.0" }]

[build.env]
NODE_ENV = "production"
"#;
        let descriptor = ProjectDescriptor::parse(toml).unwrap();
        assert_eq!(descriptor.build.buildpacks[0].id.as_deref(), Some("acme/node"));
        assert_eq!(descriptor.build.env.get("NODE_ENV").map(String::as_str), Some("production"));
    }
}
