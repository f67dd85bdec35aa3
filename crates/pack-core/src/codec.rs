//! Buildpack codec: turning a raw buildpack blob into the distribution-spec
//! tar layout (`/cnb/buildpacks/{escaped_id}/{version}/*`), and computing the
//! resulting layer's diffID.
//!
//! Grounded on `internal/dist/buildpack.go` (`BuildpackFromRootBlob`,
//! `toDistBlob`, `calcFileMode`) and `internal/dist/layers.go`
//! (`BuildpackToLayerTar`, `LayerDiffID`) in the original `pack` source. The
//! Go side streams the rewritten tar through an `io.Pipe` fed by a
//! goroutine; here a dedicated producer thread feeds an `os_pipe` pair, and
//! a `OnceCell` captures the producer's terminal error so a read past EOF on
//! the consumer side surfaces the real cause instead of a bare "broken
//! pipe".

use crate::descriptor::BuildpackDescriptor;
use crate::errors::{PackError, Result};
use crate::layer::{ImageOs, LayerWriter};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};
use std::io::{self, Read};
use std::sync::Arc;
use std::thread;

/// Anything that can hand back a fresh reader over a buildpack's raw
/// contents. A local directory, a downloaded `.tgz`, or a package image
/// layer all implement this the same way.
pub trait Blob: Send + Sync {
    fn open(&self) -> Result<Box<dyn Read + Send>>;
}

/// A buildpack ready to be placed into a distribution layer: its parsed
/// descriptor, plus a `Blob` whose `open()` yields the already-rewritten
/// `/cnb/buildpacks/...` tar stream.
pub struct Buildpack {
    descriptor: BuildpackDescriptor,
    blob: Arc<dyn Blob>,
}

impl Buildpack {
    pub fn descriptor(&self) -> &BuildpackDescriptor {
        &self.descriptor
    }

    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        self.blob.open()
    }
}

/// Construct a buildpack from a blob whose contents sit at the blob's root
/// (i.e. `buildpack.toml` is the first entry, not nested under an id/version
/// path). Reads `buildpack.toml` out of the blob to build the descriptor,
/// then wraps `blob` in a `Blob` that rewrites every entry under
/// `/cnb/buildpacks/{escaped_id}/{version}` on each `open()`.
pub fn buildpack_from_root_blob(blob: Arc<dyn Blob>) -> Result<Buildpack> {
    let descriptor = read_descriptor(blob.as_ref())?;
    let dist_blob = Arc::new(DistBlob {
        descriptor: descriptor.clone(),
        source: blob,
    });
    Ok(Buildpack {
        descriptor,
        blob: dist_blob,
    })
}

/// Construct a buildpack from a blob whose contents are already laid out per
/// the distribution spec (e.g. extracted from a package image layer).
/// Mirrors `BuildpackFromTarBlob`: no rewriting, the descriptor is supplied
/// directly because it was already recovered from the image's metadata
/// label.
pub fn buildpack_from_tar_blob(descriptor: BuildpackDescriptor, blob: Arc<dyn Blob>) -> Buildpack {
    Buildpack { descriptor, blob }
}

fn read_descriptor(blob: &dyn Blob) -> Result<BuildpackDescriptor> {
    let reader = blob.open()?;
    let mut archive = tar::Archive::new(reader);
    for entry in archive
        .entries()
        .map_err(|e| PackError::io("reading buildpack blob", e))?
    {
        let mut entry = entry.map_err(|e| PackError::io("reading buildpack blob entry", e))?;
        let path = entry
            .path()
            .map_err(|e| PackError::io("reading entry path", e))?
            .to_string_lossy()
            .to_string();
        if path == "buildpack.toml" {
            let mut contents = String::new();
            entry
                .read_to_string(&mut contents)
                .map_err(|e| PackError::io("reading buildpack.toml", e))?;
            return BuildpackDescriptor::parse(&contents);
        }
    }
    Err(PackError::codec("reading buildpack.toml: not found in blob"))
}

/// A `Blob` that rewrites a source blob's tar entries into the distribution
/// layout, on demand, streamed through a pipe.
struct DistBlob {
    descriptor: BuildpackDescriptor,
    source: Arc<dyn Blob>,
}

impl Blob for DistBlob {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let (reader, writer) = os_pipe::pipe().map_err(|e| PackError::io("creating pipe", e))?;
        let descriptor = self.descriptor.clone();
        let source = Arc::clone(&self.source);
        let failure: Arc<OnceCell<PackError>> = Arc::new(OnceCell::new());
        let producer_failure = Arc::clone(&failure);

        thread::spawn(move || {
            if let Err(e) = produce_dist_tar(&descriptor, source.as_ref(), writer) {
                let _ = producer_failure.set(e);
            }
        });

        Ok(Box::new(FailureAwareReader { reader, failure }))
    }
}

fn produce_dist_tar(
    descriptor: &BuildpackDescriptor,
    source: &dyn Blob,
    sink: os_pipe::PipeWriter,
) -> Result<()> {
    let mut writer = LayerWriter::new(sink, ImageOs::Linux);

    let id_dir = format!("{}/{}", crate::descriptor::BUILDPACKS_DIR, descriptor.escaped_id());
    writer.write_entry(&id_dir, true, 0o755, &[])?;

    let base_dir = format!("{id_dir}/{}", descriptor.info.version);
    writer.write_entry(&base_dir, true, 0o755, &[])?;

    let source_reader = source.open()?;
    let source_archive = tar::Archive::new(source_reader);
    writer.copy_from(source_archive, &base_dir)?;
    writer.finish()?;
    Ok(())
}

/// Wraps the read end of the producer's pipe. Once the pipe is exhausted, if
/// the producer thread recorded a failure, that failure is surfaced instead
/// of a plain EOF — this is the "close with cause" mechanism.
struct FailureAwareReader {
    reader: os_pipe::PipeReader,
    failure: Arc<OnceCell<PackError>>,
}

impl Read for FailureAwareReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n == 0 {
            if let Some(err) = self.failure.get() {
                return Err(io::Error::new(io::ErrorKind::Other, err.to_string()));
            }
        }
        Ok(n)
    }
}

/// Write a buildpack's distribution-layer tar to `dest`, returning the bytes
/// written (SHA-256 is computed separately by `layer_diff_id`). Mirrors
/// `BuildpackToLayerTar`, minus the filesystem path bookkeeping which lives
/// in the caller (the Package Builder / Builder Assembler know where their
/// layer tars live).
pub fn write_buildpack_layer_tar<W: io::Write>(bp: &Buildpack, dest: W, os: ImageOs) -> Result<()> {
    let reader = bp.open()?;
    let archive = tar::Archive::new(reader);
    let mut writer = LayerWriter::new(dest, os);
    for entry_result in archive_entries(archive)? {
        let (path, is_dir, mode, data) = entry_result?;
        writer.write_entry(&path, is_dir, mode, &data)?;
    }
    writer.finish()?;
    Ok(())
}

type RawEntry = (String, bool, u32, Vec<u8>);

fn archive_entries<R: Read>(mut archive: tar::Archive<R>) -> Result<Vec<Result<RawEntry>>> {
    let mut out = Vec::new();
    let entries = archive
        .entries()
        .map_err(|e| PackError::io("reading buildpack layer entries", e))?;
    for entry in entries {
        out.push((|| {
            let mut entry = entry.map_err(|e| PackError::io("reading buildpack layer entry", e))?;
            let path = entry
                .path()
                .map_err(|e| PackError::io("reading entry path", e))?
                .to_string_lossy()
                .to_string();
            let is_dir = entry.header().entry_type().is_dir();
            let mode = entry.header().mode().unwrap_or(0o644);
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| PackError::io(format!("reading contents of '{path}'"), e))?;
            Ok((path, is_dir, mode, data))
        })());
    }
    Ok(out)
}

/// The diffID of a (uncompressed) layer tar: the hex-encoded SHA-256 of its
/// bytes, prefixed `sha256:`. Mirrors `LayerDiffID`, computed directly
/// rather than via a registry-client layer abstraction since the tar is
/// already materialized locally.
pub fn layer_diff_id<R: Read>(mut layer_tar: R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = layer_tar
            .read(&mut buf)
            .map_err(|e| PackError::io("hashing layer tar", e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    struct InMemoryBlob(Mutex<Vec<u8>>);

    impl Blob for InMemoryBlob {
        fn open(&self) -> Result<Box<dyn Read + Send>> {
            Ok(Box::new(Cursor::new(self.0.lock().unwrap().clone())))
        }
    }

    fn sample_blob() -> Arc<dyn Blob> {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let toml = b"[buildpack]\nid = \"acme/node\"\nversion = \"1.2.3\"\n[[stacks]]\nid = \"io.buildpacks.stacks.bionic\"\n";
            let mut header = tar::Header::new_gnu();
            header.set_path("buildpack.toml").unwrap();
            header.set_size(toml.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, &toml[..]).unwrap();

            let detect = b"#!/bin/bash\nexit 0\n";
            let mut header = tar::Header::new_gnu();
            header.set_path("bin/detect").unwrap();
            header.set_size(detect.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, &detect[..]).unwrap();
            builder.finish().unwrap();
        }
        Arc::new(InMemoryBlob(Mutex::new(tar_bytes)))
    }

    #[test]
    fn from_root_blob_recovers_descriptor() {
        let bp = buildpack_from_root_blob(sample_blob()).unwrap();
        assert_eq!(bp.descriptor().info.id, "acme/node");
        assert_eq!(bp.descriptor().info.version, "1.2.3");
    }

    #[test]
    fn from_root_blob_rewrites_entries_under_distribution_path() {
        let bp = buildpack_from_root_blob(sample_blob()).unwrap();
        let reader = bp.open().unwrap();
        let mut archive = tar::Archive::new(reader);
        let paths: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();

        assert!(paths.contains(&"/cnb/buildpacks/acme_node".to_string()));
        assert!(paths.contains(&"/cnb/buildpacks/acme_node/1.2.3".to_string()));
        assert!(paths.contains(&"/cnb/buildpacks/acme_node/1.2.3/buildpack.toml".to_string()));
        assert!(paths.contains(&"/cnb/buildpacks/acme_node/1.2.3/bin/detect".to_string()));
    }

    #[test]
    fn bin_detect_gets_executable_mode_regardless_of_source_mode() {
        let bp = buildpack_from_root_blob(sample_blob()).unwrap();
        let reader = bp.open().unwrap();
        let mut archive = tar::Archive::new(reader);
        let entry = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap())
            .find(|e| {
                e.path()
                    .unwrap()
                    .to_string_lossy()
                    .ends_with("bin/detect")
            })
            .unwrap();
        assert_eq!(entry.header().mode().unwrap(), 0o755);
    }

    #[test]
    fn missing_buildpack_toml_is_a_codec_error() {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let data = b"hi";
            let mut header = tar::Header::new_gnu();
            header.set_path("README.md").unwrap();
            header.set_size(data.len() as u64);
            header.set_cksum();
            builder.append(&header, &data[..]).unwrap();
            builder.finish().unwrap();
        }
        let blob: Arc<dyn Blob> = Arc::new(InMemoryBlob(Mutex::new(tar_bytes)));
        let err = buildpack_from_root_blob(blob).unwrap_err();
        assert!(err.to_string().contains("buildpack.toml"));
    }

    #[test]
    fn layer_diff_id_is_stable_for_identical_contents() {
        let a = layer_diff_id(Cursor::new(b"hello world".to_vec())).unwrap();
        let b = layer_diff_id(Cursor::new(b"hello world".to_vec())).unwrap();
        let c = layer_diff_id(Cursor::new(b"different".to_vec())).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("sha256:"));
    }
}
