//! Turning CLI-level buildpack/lifecycle references into `pack_core::codec::Blob`s.
//!
//! Grounded on `internal/dist/buildpack.go`'s
//! `BuildpackFromRootBlob(blob)` call sites in `commands/build.go`, which
//! accept either a local directory or a downloaded/extracted tarball as the
//! blob source. Here a buildpack reference is always a filesystem path (URL
//! download is the external HTTP-fetch collaborator); this
//! module only has to turn that path into a tar byte stream.

use pack_core::codec::{buildpack_from_root_blob, Blob, Buildpack};
use pack_core::errors::{PackError, Result};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A `Blob` over a directory tree, read fresh on every `open()` into an
/// in-memory tar (buildpack directories are small; streaming a directory
/// walk through a pipe the way the distribution codec does for the
/// *rewritten* tar isn't worth the complexity here).
pub struct DirBlob {
    root: PathBuf,
}

impl DirBlob {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirBlob { root: root.into() }
    }
}

impl Blob for DirBlob {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let mut bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut bytes);
            append_dir(&mut builder, &self.root, &self.root)?;
            builder
                .finish()
                .map_err(|e| PackError::io(format!("building tar for '{}'", self.root.display()), e))?;
        }
        Ok(Box::new(Cursor::new(bytes)))
    }
}

fn append_dir(builder: &mut tar::Builder<&mut Vec<u8>>, base: &Path, dir: &Path) -> Result<()> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| PackError::io(format!("reading '{}'", dir.display()), e))?;
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| PackError::io(format!("reading '{}'", dir.display()), e))?;
        entries.push(entry.path());
    }
    entries.sort();
    for path in entries {
        let rel = path
            .strip_prefix(base)
            .expect("walked path is always under base");
        if path.is_dir() {
            builder
                .append_dir(rel, &path)
                .map_err(|e| PackError::io(format!("adding '{}' to tar", path.display()), e))?;
            append_dir(builder, base, &path)?;
        } else {
            let mut file = std::fs::File::open(&path)
                .map_err(|e| PackError::io(format!("opening '{}'", path.display()), e))?;
            builder
                .append_file(rel, &mut file)
                .map_err(|e| PackError::io(format!("adding '{}' to tar", path.display()), e))?;
        }
    }
    Ok(())
}

/// A `Blob` over an on-disk tar, transparently gzip-decompressing `.tgz`/
/// `.tar.gz` files.
pub struct TarFileBlob {
    path: PathBuf,
}

impl TarFileBlob {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TarFileBlob { path: path.into() }
    }

    fn is_gzip(&self) -> bool {
        matches!(
            self.path.extension().and_then(|e| e.to_str()),
            Some("tgz") | Some("gz")
        )
    }
}

impl Blob for TarFileBlob {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let file = std::fs::File::open(&self.path)
            .map_err(|e| PackError::io(format!("opening '{}'", self.path.display()), e))?;
        if self.is_gzip() {
            Ok(Box::new(flate2::read::GzDecoder::new(file)))
        } else {
            Ok(Box::new(file))
        }
    }
}

/// Resolve a `-b/--buildpack` (or `builder.toml`/`package.toml` `uri`) value
/// that names a local path into a parsed `Buildpack`, choosing between
/// [`DirBlob`] and [`TarFileBlob`] by whether the path is a directory.
pub fn buildpack_from_path(path: &Path) -> Result<Buildpack> {
    let blob: Arc<dyn Blob> = if path.is_dir() {
        Arc::new(DirBlob::new(path.to_path_buf()))
    } else {
        Arc::new(TarFileBlob::new(path.to_path_buf()))
    };
    buildpack_from_root_blob(blob)
}

/// Build the lifecycle binary layer tar from a directory containing the six
/// `detector`/`analyzer`/`restorer`/`builder`/`exporter`/`rebaser`
/// executables. Lifecycle binaries live at `/cnb/lifecycle/{name}` with
/// mode 0755.
pub fn build_lifecycle_layer_tar(dir: &Path) -> Result<Vec<u8>> {
    use pack_core::layer::{ImageOs, LayerWriter};

    const BINARIES: [&str; 6] = [
        "detector", "analyzer", "restorer", "builder", "exporter", "rebaser",
    ];

    let mut writer = LayerWriter::new(Vec::new(), ImageOs::Linux);
    writer.write_entry("/cnb/lifecycle", true, 0o755, &[])?;
    for name in BINARIES {
        let bin_path = dir.join(name);
        let data = std::fs::read(&bin_path)
            .map_err(|e| PackError::io(format!("reading lifecycle binary '{}'", bin_path.display()), e))?;
        writer.write_entry(&format!("/cnb/lifecycle/{name}"), false, 0o755, &data)?;
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn dir_blob_tars_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("buildpack.toml"), b"[buildpack]\n").unwrap();
        std::fs::create_dir(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin/detect"), b"#!/bin/sh\n").unwrap();

        let blob = DirBlob::new(dir.path());
        let mut reader = blob.open().unwrap();
        let mut archive = tar::Archive::new(&mut reader);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "buildpack.toml"));
        assert!(names.iter().any(|n| n.contains("bin/detect")));
    }

    #[test]
    fn tar_file_blob_reads_plain_tar() {
        let dir = tempfile::tempdir().unwrap();
        let tar_path = dir.path().join("bp.tar");
        {
            let file = std::fs::File::create(&tar_path).unwrap();
            let mut builder = tar::Builder::new(file);
            let data = b"[buildpack]\nid=\"x\"\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_cksum();
            builder.append_data(&mut header, "buildpack.toml", &data[..]).unwrap();
            builder.finish().unwrap();
        }
        let blob = TarFileBlob::new(&tar_path);
        let mut reader = blob.open().unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert!(!buf.is_empty());
    }

    #[test]
    fn buildpack_from_path_parses_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("buildpack.toml"),
            b"[buildpack]\nid = \"acme/node\"\nversion = \"1.0.0\"\n[[stacks]]\nid = \"acme.stack\"\n",
        )
        .unwrap();
        std::fs::create_dir(dir.path().join("bin")).unwrap();
        let mut detect = std::fs::File::create(dir.path().join("bin/detect")).unwrap();
        detect.write_all(b"#!/bin/sh\n").unwrap();

        let bp = buildpack_from_path(dir.path()).unwrap();
        assert_eq!(bp.descriptor().info.id, "acme/node");
    }
}
