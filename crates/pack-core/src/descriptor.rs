//! Buildpack descriptor: the parsed shape of `buildpack.toml`.
//!
//! Grounded on `buildpack.go`'s `BuildpackDescriptor`/`BuildpackInfo`/`Stack`
//! and `validateDescriptor` in the original `pack` source.

use crate::errors::{PackError, Result};
use serde::{Deserialize, Serialize};

/// `buildpack.toml` assumes this buildpack API version when `api` is absent.
pub const ASSUMED_BUILDPACK_API_VERSION: &str = "0.1";

/// Root directory under which buildpacks are laid out in a distribution layer.
pub const BUILDPACKS_DIR: &str = "/cnb/buildpacks";

/// Identity + version of a buildpack, as it appears in `[buildpack]` and in
/// order groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildpackInfo {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
}

impl BuildpackInfo {
    /// `"{id}@{version}"`, or bare `id` when no version is set — used in
    /// user-facing messages and as the canonical key for dedup maps.
    pub fn full_name(&self) -> String {
        if self.version.is_empty() {
            self.id.clone()
        } else {
            format!("{}@{}", self.id, self.version)
        }
    }

    /// The id with `/` replaced by `_`, used wherever the id appears in a
    /// filesystem path (`/cnb/buildpacks/{escaped_id}/{version}`).
    pub fn escaped_id(&self) -> String {
        self.id.replace('/', "_")
    }
}

/// A stack a buildpack declares support for, with any mixins it requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Stack {
    pub id: String,
    #[serde(default)]
    pub mixins: Vec<String>,
}

/// One group entry in an `[[order]]` table: a buildpack reference plus
/// whether it's optional within the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderGroupEntry {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub optional: bool,
}

/// One `[[order]]` table: an alternative ordered set of buildpacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OrderGroup {
    #[serde(rename = "group", default)]
    pub group: Vec<OrderGroupEntry>,
}

/// The parsed contents of `buildpack.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildpackDescriptor {
    #[serde(default = "default_api")]
    pub api: String,
    #[serde(rename = "buildpack")]
    pub info: BuildpackInfo,
    #[serde(default)]
    pub stacks: Vec<Stack>,
    #[serde(default)]
    pub order: Vec<OrderGroup>,
}

fn default_api() -> String {
    ASSUMED_BUILDPACK_API_VERSION.to_string()
}

impl BuildpackDescriptor {
    /// Parse `buildpack.toml` contents, assuming `ASSUMED_BUILDPACK_API_VERSION`
    /// when `api` is absent, then validate it.
    pub fn parse(toml_contents: &str) -> Result<Self> {
        let descriptor: BuildpackDescriptor = toml::from_str(toml_contents)
            .map_err(|e| PackError::codec(format!("decoding buildpack.toml: {e}")))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// `escaped_id` convenience forwarded from `info`.
    pub fn escaped_id(&self) -> String {
        self.info.escaped_id()
    }

    /// A meta-buildpack composes other buildpacks via `order` and declares
    /// no stacks of its own.
    pub fn is_meta_buildpack(&self) -> bool {
        !self.order.is_empty()
    }

    /// Whether this buildpack declares support for `stack_id`, honoring any
    /// required mixins against the stack's available mixin set.
    pub fn supports_stack(&self, stack_id: &str, available_mixins: &[String]) -> bool {
        self.stacks.iter().any(|s| {
            s.id == stack_id
                && s.mixins
                    .iter()
                    .all(|required| available_mixins.iter().any(|m| m == required))
        })
    }

    /// Mirrors `validateDescriptor`: exactly one of `{stacks, order}` must be
    /// non-empty, and `id`/`version` must be present. Error text matches the
    /// original's wording .
    fn validate(&self) -> Result<()> {
        if self.info.id.is_empty() {
            return Err(PackError::codec("'buildpack.id' is required"));
        }
        if self.info.version.is_empty() {
            return Err(PackError::codec("'buildpack.version' is required"));
        }
        match (self.order.is_empty(), self.stacks.is_empty()) {
            (true, true) => Err(PackError::codec(format!(
                "buildpack '{}': must have either 'stacks' or an 'order' defined",
                self.info.full_name()
            ))),
            (false, false) => Err(PackError::codec(format!(
                "buildpack '{}': cannot have both 'stacks' and an 'order' defined",
                self.info.full_name()
            ))),
            _ => Ok(()),
        }
    }
}

/// `{version, buildpack_api_version, platform_api_version}` embedded in a
/// builder image's lifecycle metadata label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleDescriptor {
    pub version: String,
    pub buildpack_api_version: String,
    pub platform_api_version: String,
}

impl LifecycleDescriptor {
    /// Parsed semantic version, used for the feature gates at 0.4.0/0.5.0/0.6.0.
    pub fn semver(&self) -> std::result::Result<semver::Version, semver::Error> {
        semver::Version::parse(self.version.trim_start_matches('v'))
    }

    /// `true` when this lifecycle's version is strictly newer than `gate`
    /// (e.g. `"0.4.0"`), matching the original's
    /// `semver.MustParse("0.4.0").LessThan(version)` comparison.
    pub fn newer_than(&self, gate: &str) -> bool {
        match (self.semver(), semver::Version::parse(gate)) {
            (Ok(v), Ok(g)) => v > g,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toml_with(body: &str) -> String {
        format!("[buildpack]\nid = \"acme/node\"\nversion = \"1.0.0\"\n{body}")
    }

    #[test]
    fn missing_id_is_rejected() {
        let err = BuildpackDescriptor::parse(
            "[buildpack]\nversion = \"1.0.0\"\n[[stacks]]\nid = \"io.buildpacks.stacks.bionic\"\n",
        );
        assert!(err.is_err());
    }

    #[test]
    fn missing_version_is_rejected() {
        let err = BuildpackDescriptor::parse(
            "[buildpack]\nid = \"acme/node\"\n[[stacks]]\nid = \"io.buildpacks.stacks.bionic\"\n",
        );
        let e = err.unwrap_err();
        assert_eq!(e.to_string(), "'buildpack.version' is required");
    }

    #[test]
    fn neither_stacks_nor_order_is_rejected() {
        let toml = toml_with("");
        let err = BuildpackDescriptor::parse(&toml).unwrap_err();
        assert!(err.to_string().contains("must have either"));
    }

    #[test]
    fn both_stacks_and_order_is_rejected() {
        let toml = toml_with(
            "[[stacks]]\nid = \"io.buildpacks.stacks.bionic\"\n\n[[order]]\n[[order.group]]\nid = \"acme/other\"\nversion = \"1\"\n",
        );
        let err = BuildpackDescriptor::parse(&toml).unwrap_err();
        assert!(err.to_string().contains("cannot have both"));
    }

    #[test]
    fn api_defaults_to_assumed_version() {
        let toml = toml_with("[[stacks]]\nid = \"io.buildpacks.stacks.bionic\"\n");
        let bp = BuildpackDescriptor::parse(&toml).unwrap();
        assert_eq!(bp.api, ASSUMED_BUILDPACK_API_VERSION);
    }

    #[test]
    fn escaped_id_replaces_slash_with_underscore() {
        let info = BuildpackInfo {
            id: "acme/node".into(),
            version: "1.0.0".into(),
            name: None,
            homepage: None,
        };
        assert_eq!(info.escaped_id(), "acme_node");
        assert_eq!(info.full_name(), "acme/node@1.0.0");
    }

    #[test]
    fn meta_buildpack_has_order_and_no_stacks() {
        let toml = toml_with(
            "[[order]]\n[[order.group]]\nid = \"acme/other\"\nversion = \"1\"\noptional = true\n",
        );
        let bp = BuildpackDescriptor::parse(&toml).unwrap();
        assert!(bp.is_meta_buildpack());
        assert_eq!(bp.order[0].group[0].id, "acme/other");
        assert!(bp.order[0].group[0].optional);
    }

    #[test]
    fn stack_support_requires_all_mixins_present() {
        let toml = toml_with(
            "[[stacks]]\nid = \"io.buildpacks.stacks.bionic\"\nmixins = [\"build:jq\"]\n",
        );
        let bp = BuildpackDescriptor::parse(&toml).unwrap();
        assert!(!bp.supports_stack("io.buildpacks.stacks.bionic", &[]));
        assert!(bp.supports_stack(
            "io.buildpacks.stacks.bionic",
            &["build:jq".to_string()]
        ));
        assert!(!bp.supports_stack("io.buildpacks.stacks.focal", &["build:jq".to_string()]));
    }

    #[test]
    fn lifecycle_version_gate_is_strict_greater_than() {
        let lifecycle = LifecycleDescriptor {
            version: "0.4.0".into(),
            buildpack_api_version: "0.2".into(),
            platform_api_version: "0.3".into(),
        };
        assert!(!lifecycle.newer_than("0.4.0"));

        let newer = LifecycleDescriptor {
            version: "0.9.0".into(),
            ..lifecycle
        };
        assert!(newer.newer_than("0.4.0"));
    }
}
