//! Package Builder
//!
//! Assembles one or more buildpacks into a single "buildpackage" — either a
//! local image (each buildpack as its own layer, labelled with
//! `io.buildpacks.buildpackage.metadata` and `io.buildpacks.buildpack.layers`)
//! or a `.cnb` file (the same layers written to a local tar instead of
//! pushed to a daemon/registry). Grounded on `create_buildpackage.go`; the
//! per-layer tar/diffID mechanics reuse [`crate::codec`] and [`crate::layer`]
//! exactly as the Builder Assembler does.

use crate::codec::{layer_diff_id, write_buildpack_layer_tar, Buildpack};
use crate::descriptor::{BuildpackInfo, Stack};
use crate::errors::{PackError, Result};
use crate::fetcher::ImageHandle;
use crate::layer::ImageOs;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Cursor;
use tracing::{info, instrument};

/// `io.buildpacks.buildpackage.metadata`: identity of the package as a
/// whole, plus the stacks it supports (the union, for a multi-buildpack
/// package, of its buildpacks' stacks).
#[derive(Debug, Clone, Serialize)]
pub struct BuildpackageMetadata {
    pub id: String,
    pub version: String,
    pub stacks: Vec<Stack>,
}

/// One entry of `io.buildpacks.buildpack.layers`: where to find a
/// buildpack's layer within the image, keyed `{id: {version: entry}}` at
/// the call site building the full label.
#[derive(Debug, Clone, Serialize)]
pub struct BuildpackLayerInfo {
    pub api: String,
    pub stacks: Vec<Stack>,
    pub order: Vec<crate::descriptor::OrderGroup>,
    pub layer_diff_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub homepage: Vec<String>,
}

/// One buildpack layer, ready to be added to an image or written into a
/// `.cnb` file: the rewritten distribution tar bytes plus their diffID.
pub struct PreparedLayer {
    pub info: BuildpackInfo,
    pub tar: Vec<u8>,
    pub diff_id: String,
}

/// Rewrite every `buildpack` into a distribution-layout layer tar and
/// compute its diffID. Mirrors the per-buildpack loop in
/// `CreateBuildpackage`, split out so callers (image packaging, `.cnb` file
/// packaging) share identical layer bytes.
#[instrument(skip(buildpacks))]
pub fn prepare_layers(buildpacks: &[Buildpack], os: ImageOs) -> Result<Vec<PreparedLayer>> {
    buildpacks
        .iter()
        .map(|bp| {
            let mut tar = Vec::new();
            write_buildpack_layer_tar(bp, &mut tar, os)?;
            let diff_id = layer_diff_id(Cursor::new(&tar))?;
            Ok(PreparedLayer {
                info: bp.descriptor().info.clone(),
                tar,
                diff_id,
            })
        })
        .collect()
}

/// Build the `io.buildpacks.buildpackage.metadata` label value for a
/// package whose primary identity is `default`, with the stack set being
/// the union across every buildpack that isn't itself a meta-buildpack
/// (meta-buildpacks declare `order`, not `stacks`, and contribute none).
pub fn buildpackage_metadata(default: &BuildpackInfo, buildpacks: &[Buildpack]) -> BuildpackageMetadata {
    let mut stacks = Vec::new();
    for bp in buildpacks {
        for stack in &bp.descriptor().stacks {
            if !stacks.iter().any(|s: &Stack| s.id == stack.id) {
                stacks.push(stack.clone());
            }
        }
    }
    BuildpackageMetadata {
        id: default.id.clone(),
        version: default.version.clone(),
        stacks,
    }
}

/// Build the `io.buildpacks.buildpack.layers` label value: `{id: {version:
/// info}}`,/// Assembler).
pub fn buildpack_layers_label(
    buildpacks: &[Buildpack],
    prepared: &[PreparedLayer],
) -> HashMap<String, HashMap<String, BuildpackLayerInfo>> {
    let mut label: HashMap<String, HashMap<String, BuildpackLayerInfo>> = HashMap::new();
    for (bp, layer) in buildpacks.iter().zip(prepared.iter()) {
        let descriptor = bp.descriptor();
        let entry = BuildpackLayerInfo {
            api: descriptor.api.clone(),
            stacks: descriptor.stacks.clone(),
            order: descriptor.order.clone(),
            layer_diff_id: layer.diff_id.clone(),
            homepage: descriptor.info.homepage.clone().into_iter().collect(),
        };
        label
            .entry(descriptor.info.id.clone())
            .or_default()
            .insert(descriptor.info.version.clone(), entry);
    }
    label
}

/// Assemble `buildpacks` (plus any already-packaged dependencies reachable
/// only as image references, per `package.toml`'s `[[packages]]`) into
/// `target`: add every prepared layer, set the metadata and layers labels,
/// then save. Mirrors `CreateBuildpackage`'s control flow; publishing vs.
/// local save is whatever `target` was constructed with (a `LocalImage` or
/// `RemoteImage` from [`crate::fetcher`]).
#[instrument(skip(buildpacks, target))]
pub async fn package_into_image(
    default: &BuildpackInfo,
    buildpacks: &[Buildpack],
    os: ImageOs,
    target: &mut dyn ImageHandle,
) -> Result<()> {
    if buildpacks.is_empty() {
        return Err(PackError::usage("package must contain at least one buildpack"));
    }
    let prepared = prepare_layers(buildpacks, os)?;
    for layer in &prepared {
        let tar_path = stage_layer_tar(&layer.tar)?;
        target.add_layer(&tar_path, &layer.diff_id).await?;
    }

    let metadata = buildpackage_metadata(default, buildpacks);
    let metadata_json = serde_json::to_string(&metadata)
        .map_err(|e| PackError::codec(format!("encoding buildpackage metadata: {e}")))?;
    target
        .set_label("io.buildpacks.buildpackage.metadata", &metadata_json)
        .await?;

    let layers_label = buildpack_layers_label(buildpacks, &prepared);
    let layers_json = serde_json::to_string(&layers_label)
        .map_err(|e| PackError::codec(format!("encoding buildpack layers label: {e}")))?;
    target
        .set_label("io.buildpacks.buildpack.layers", &layers_json)
        .await?;

    target.save().await?;
    info!(id = %default.id, version = %default.version, buildpacks = buildpacks.len(), "packaged buildpackage");
    Ok(())
}

/// Write `buildpacks` to a standalone `.cnb` file at `path`: a plain tar
/// concatenating each buildpack's distribution layer alongside a
/// `metadata.toml` describing the package, so it can be referenced later by
/// `package.toml`'s `[[packages]] ref = "file://..."` without a daemon.
#[instrument(skip(buildpacks))]
pub fn write_cnb_file(
    default: &BuildpackInfo,
    buildpacks: &[Buildpack],
    os: ImageOs,
    path: &std::path::Path,
) -> Result<()> {
    if buildpacks.is_empty() {
        return Err(PackError::usage("package must contain at least one buildpack"));
    }
    let file = std::fs::File::create(path).map_err(|e| PackError::io(format!("creating '{}'", path.display()), e))?;
    let mut builder = tar::Builder::new(file);

    let metadata = buildpackage_metadata(default, buildpacks);
    let metadata_toml = toml::to_string_pretty(&CnbMetadataToml {
        id: metadata.id,
        version: metadata.version,
    })
    .map_err(|e| PackError::codec(format!("encoding metadata.toml: {e}")))?;
    append_tar_entry(&mut builder, "metadata.toml", metadata_toml.as_bytes())?;

    let prepared = prepare_layers(buildpacks, os)?;
    for (bp, layer) in buildpacks.iter().zip(prepared.iter()) {
        let entry_name = format!("blobs/sha256/{}", layer.diff_id.trim_start_matches("sha256:"));
        append_tar_entry(&mut builder, &entry_name, &layer.tar)?;
        let _ = bp;
    }
    builder
        .finish()
        .map_err(|e| PackError::io(format!("finishing '{}'", path.display()), e))?;
    Ok(())
}

#[derive(Serialize)]
struct CnbMetadataToml {
    id: String,
    version: String,
}

fn append_tar_entry<W: std::io::Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name).map_err(|e| PackError::io(format!("writing tar entry '{name}'"), e))?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .map_err(|e| PackError::io(format!("writing tar entry '{name}'"), e))
}

/// Materialize a layer tar to a temp file so it can be handed to
/// [`ImageHandle::add_layer`], which (per [`crate::fetcher::LocalImage`])
/// stages it for a `docker load` at `save()` time.
fn stage_layer_tar(tar_bytes: &[u8]) -> Result<String> {
    let dir = std::env::temp_dir().join("pack-package-layers");
    std::fs::create_dir_all(&dir).map_err(|e| PackError::io(format!("creating '{}'", dir.display()), e))?;
    let digest = layer_diff_id(Cursor::new(tar_bytes))?;
    let file_name = digest.trim_start_matches("sha256:");
    let path = dir.join(format!("{file_name}.tar"));
    std::fs::write(&path, tar_bytes).map_err(|e| PackError::io(format!("writing '{}'", path.display()), e))?;
    Ok(path.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{buildpack_from_root_blob, Blob};
    use std::io::{Cursor, Read};
    use std::sync::Mutex;

    struct InMemoryBlob(Mutex<Vec<u8>>);

    impl Blob for InMemoryBlob {
        fn open(&self) -> Result<Box<dyn Read + Send>> {
            Ok(Box::new(Cursor::new(self.0.lock().unwrap().clone())))
        }
    }

    fn buildpack_with(id: &str, stack: &str) -> Buildpack {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let toml = format!(
                "[buildpack]\nid = \"{id}\"\nversion = \"1.0.0\"\n[[stacks]]\nid = \"{stack}\"\n"
            );
            let mut header = tar::Header::new_gnu();
            header.set_path("buildpack.toml").unwrap();
            header.set_size(toml.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, toml.as_bytes()).unwrap();
            builder.finish().unwrap();
        }
        buildpack_from_root_blob(Arc::new(InMemoryBlob(Mutex::new(tar_bytes)))).unwrap()
    }

    use std::sync::Arc;

    struct FakeImage {
        labels: HashMap<String, String>,
        layers: Vec<(String, String)>,
        saved: bool,
    }

    impl FakeImage {
        fn new() -> Self {
            Self {
                labels: HashMap::new(),
                layers: Vec::new(),
                saved: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl ImageHandle for FakeImage {
        fn name(&self) -> &str {
            "fake/package"
        }
        async fn label(&self, key: &str) -> Result<Option<String>> {
            Ok(self.labels.get(key).cloned())
        }
        async fn get_layer(&self, _diff_id: &str) -> Result<Vec<u8>> {
            unimplemented!()
        }
        async fn add_layer(&mut self, tar_path: &str, diff_id: &str) -> Result<()> {
            self.layers.push((tar_path.to_string(), diff_id.to_string()));
            Ok(())
        }
        async fn set_label(&mut self, key: &str, value: &str) -> Result<()> {
            self.labels.insert(key.to_string(), value.to_string());
            Ok(())
        }
        async fn save(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn buildpackage_metadata_unions_stacks_across_buildpacks() {
        let bps = vec![
            buildpack_with("acme/node", "io.buildpacks.stacks.bionic"),
            buildpack_with("acme/npm", "io.buildpacks.stacks.bionic"),
        ];
        let default = BuildpackInfo {
            id: "acme/node".into(),
            version: "1.0.0".into(),
            name: None,
            homepage: None,
        };
        let metadata = buildpackage_metadata(&default, &bps);
        assert_eq!(metadata.stacks.len(), 1);
        assert_eq!(metadata.stacks[0].id, "io.buildpacks.stacks.bionic");
    }

    #[test]
    fn buildpack_layers_label_keys_by_id_then_version() {
        let bps = vec![buildpack_with("acme/node", "io.buildpacks.stacks.bionic")];
        let prepared = prepare_layers(&bps, ImageOs::Linux).unwrap();
        let label = buildpack_layers_label(&bps, &prepared);
        assert!(label.contains_key("acme/node"));
        assert!(label["acme/node"].contains_key("1.0.0"));
    }

    #[tokio::test]
    async fn package_into_image_adds_layer_and_sets_both_labels() {
        let bps = vec![buildpack_with("acme/node", "io.buildpacks.stacks.bionic")];
        let default = bps[0].descriptor().info.clone();
        let mut target = FakeImage::new();
        package_into_image(&default, &bps, ImageOs::Linux, &mut target)
            .await
            .unwrap();
        assert_eq!(target.layers.len(), 1);
        assert!(target.labels.contains_key("io.buildpacks.buildpackage.metadata"));
        assert!(target.labels.contains_key("io.buildpacks.buildpack.layers"));
    }

    #[tokio::test]
    async fn package_into_image_rejects_empty_buildpack_list() {
        let default = BuildpackInfo {
            id: "acme/node".into(),
            version: "1.0.0".into(),
            name: None,
            homepage: None,
        };
        let mut target = FakeImage::new();
        let err = package_into_image(&default, &[], ImageOs::Linux, &mut target)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at least one buildpack"));
    }

    #[test]
    fn write_cnb_file_produces_readable_tar() {
        let bps = vec![buildpack_with("acme/node", "io.buildpacks.stacks.bionic")];
        let default = bps[0].descriptor().info.clone();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme-node.cnb");
        write_cnb_file(&default, &bps, ImageOs::Linux, &path).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let mut archive = tar::Archive::new(file);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"metadata.toml".to_string()));
        assert!(names.iter().any(|n| n.starts_with("blobs/sha256/")));
    }
}
