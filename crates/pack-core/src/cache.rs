//! Cache Manager
//!
//! Content-addressed per-image caches used by the build/launch/kaniko-cache
//! lifecycle phases. Grounded on the upstream `acceptance/acceptance_test.go`'s
//! constructor call shape (`cache.NewImageCache(ref, dockerCli)`,
//! `cache.NewVolumeCache(ref, "build"|"launch", dockerCli)`): two cache
//! kinds over the same `Docker`
//! handle, keyed off the target image reference rather than a free-form
//! name, so repeated builds of the same image reuse the same cache without
//! any caller-side bookkeeping.

use crate::docker::Docker;
use crate::errors::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// A cache backing a build: either a named Docker volume or a secondary
/// image pushed alongside the build output.
#[async_trait::async_trait]
pub trait CacheHandle {
    /// The identifier used in `-cache-dir`/`-cache-image` lifecycle args.
    fn name(&self) -> &str;

    /// Remove the underlying storage. Used by `--clear-cache`.
    async fn clear(&self) -> Result<()>;
}

/// First 12 hex characters of the SHA-256 of the (stringified) image
/// reference, matching the `pack-cache-{sha256(image_ref)[:12]}`.
fn short_hash(image_ref: &str) -> String {
    let digest = Sha256::digest(image_ref.as_bytes());
    format!("{digest:x}")[..12].to_string()
}

/// A named Docker volume scoped to one target image and one cache
/// "kind" (`build` or `launch`), e.g. `pack-cache-bb6176a5e24a.build`.
pub struct VolumeCache {
    docker: Arc<dyn Docker>,
    volume_name: String,
}

impl VolumeCache {
    pub fn new(image_ref: &str, kind: &str, docker: Arc<dyn Docker>) -> Self {
        let volume_name = format!("pack-cache-{}.{kind}", short_hash(image_ref));
        Self { docker, volume_name }
    }

    /// Ensure the backing volume exists before it's bind-mounted into a
    /// phase container.
    pub async fn ensure(&self) -> Result<()> {
        self.docker.create_volume(&self.volume_name).await
    }
}

#[async_trait::async_trait]
impl CacheHandle for VolumeCache {
    fn name(&self) -> &str {
        &self.volume_name
    }

    async fn clear(&self) -> Result<()> {
        if self.docker.volume_exists(&self.volume_name).await? {
            self.docker.remove_volume(&self.volume_name).await?;
        }
        Ok(())
    }
}

/// A secondary image used as a cache, e.g. `acme/app-cache`. Used when
/// `--cache type=build;format=image` (or the registry-publish build path)
/// asks for a cache that survives without a local Docker volume.
pub struct ImageCache {
    docker: Arc<dyn Docker>,
    image_name: String,
}

impl ImageCache {
    pub fn new(image_ref: &str, docker: Arc<dyn Docker>) -> Self {
        Self {
            docker,
            image_name: format!("{image_ref}-cache"),
        }
    }
}

#[async_trait::async_trait]
impl CacheHandle for ImageCache {
    fn name(&self) -> &str {
        &self.image_name
    }

    async fn clear(&self) -> Result<()> {
        if self.docker.image_exists(&self.image_name).await? {
            self.docker.remove_image(&self.image_name).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::{ContainerRunSpec, RunResult};
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakeDocker {
        volumes: Mutex<HashSet<String>>,
        images: Mutex<HashSet<String>>,
    }

    impl FakeDocker {
        fn new() -> Self {
            Self {
                volumes: Mutex::new(HashSet::new()),
                images: Mutex::new(HashSet::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Docker for FakeDocker {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn run(&self, _spec: &ContainerRunSpec) -> Result<RunResult> {
            unimplemented!()
        }
        async fn pull_image(&self, _reference: &str) -> Result<()> {
            Ok(())
        }
        async fn image_exists(&self, reference: &str) -> Result<bool> {
            Ok(self.images.lock().unwrap().contains(reference))
        }
        async fn inspect_image(&self, _reference: &str) -> Result<serde_json::Value> {
            unimplemented!()
        }
        async fn remove_image(&self, reference: &str) -> Result<()> {
            self.images.lock().unwrap().remove(reference);
            Ok(())
        }
        async fn volume_exists(&self, name: &str) -> Result<bool> {
            Ok(self.volumes.lock().unwrap().contains(name))
        }
        async fn create_volume(&self, name: &str) -> Result<()> {
            self.volumes.lock().unwrap().insert(name.to_string());
            Ok(())
        }
        async fn remove_volume(&self, name: &str) -> Result<()> {
            self.volumes.lock().unwrap().remove(name);
            Ok(())
        }
        async fn run_phase(
            &self,
            _container_name: &str,
            _spec: &ContainerRunSpec,
            _on_log: std::sync::Arc<dyn Fn(&str) + Send + Sync>,
            _cancel: tokio_util::sync::CancellationToken,
        ) -> Result<RunResult> {
            unimplemented!()
        }
        async fn load_image_tar(&self, _tar_bytes: Vec<u8>) -> Result<()> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn volume_cache_name_matches_spec_pattern() {
        let docker = Arc::new(FakeDocker::new());
        let cache = VolumeCache::new("acme/app:latest", "build", docker);
        let expected_hash = short_hash("acme/app:latest");
        assert_eq!(cache.name(), format!("pack-cache-{expected_hash}.build"));
        assert_eq!(expected_hash.len(), 12);
    }

    #[tokio::test]
    async fn build_and_launch_caches_for_the_same_image_differ() {
        let docker = Arc::new(FakeDocker::new());
        let build = VolumeCache::new("acme/app:latest", "build", Arc::clone(&docker) as Arc<dyn Docker>);
        let launch = VolumeCache::new("acme/app:latest", "launch", docker);
        assert_ne!(build.name(), launch.name());
    }

    #[tokio::test]
    async fn clearing_volume_cache_removes_existing_volume_only() {
        let docker = Arc::new(FakeDocker::new());
        let cache = VolumeCache::new("acme/app:latest", "build", Arc::clone(&docker) as Arc<dyn Docker>);
        cache.ensure().await.unwrap();
        assert!(docker.volume_exists(cache.name()).await.unwrap());
        cache.clear().await.unwrap();
        assert!(!docker.volume_exists(cache.name()).await.unwrap());
        // clearing again is a no-op, not an error
        cache.clear().await.unwrap();
    }

    #[tokio::test]
    async fn image_cache_name_appends_cache_suffix() {
        let docker = Arc::new(FakeDocker::new());
        let cache = ImageCache::new("ghcr.io/acme/app:latest", docker);
        assert_eq!(cache.name(), "ghcr.io/acme/app:latest-cache");
    }
}
