//! Tar Layer Writer
//!
//! Grounded on `internal/layer/{writer,linux_writer,windows_writer}.go` in
//! the original `pack` source. Two variants of the same contract
//! (`write_header`/`write`/`add_file`/`copy_from`): a Linux pass-through and
//! a Windows variant that injects the `Files/`/`Hives/` roots a Windows
//! container layer requires and emits missing parent directories before
//! their children.

use crate::errors::{PackError, Result};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;
use tar::{Builder, Header};

/// Fixed epoch every layer entry is timestamped to, for reproducible digests.
pub const NORMALIZED_MTIME: u64 = 0;

/// UID/GID every layer entry is normalized to.
pub const NORMALIZED_OWNER: u32 = 0;

/// Directory mode per the permission policy below.
pub const DIR_MODE: u32 = 0o755;

/// Image OS, used to choose the tar layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOs {
    Linux,
    Windows,
}

impl ImageOs {
    pub fn from_label(os: &str) -> Self {
        if os.eq_ignore_ascii_case("windows") {
            ImageOs::Windows
        } else {
            ImageOs::Linux
        }
    }
}

/// Compute the permission mode for a tar entry per the spec's policy:
/// directories are 0755, `bin/detect`/`bin/build` are 0755, anything with an
/// execute bit set in the source is 0755, everything else is 0644.
pub fn calc_file_mode(entry_path: &str, is_dir: bool, source_mode: u32) -> u32 {
    if is_dir {
        return DIR_MODE;
    }
    if entry_path == "bin/detect" || entry_path == "bin/build" {
        return 0o755;
    }
    if source_mode & 0o111 != 0 {
        return 0o755;
    }
    0o644
}

fn normalized_header(path: &str, is_dir: bool, mode: u32, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_path(path).expect("tar path must be valid");
    header.set_mode(mode);
    header.set_uid(NORMALIZED_OWNER as u64);
    header.set_gid(NORMALIZED_OWNER as u64);
    header.set_mtime(NORMALIZED_MTIME);
    header.set_size(size);
    header.set_entry_type(if is_dir {
        tar::EntryType::Directory
    } else {
        tar::EntryType::Regular
    });
    header.set_cksum();
    header
}

/// A platform-aware layer writer. Constructed from the target image's OS
/// label (`ImageOs::from_label`), then used uniformly regardless of which
/// variant was chosen.
pub enum LayerWriter<W: Write> {
    Linux(Builder<W>),
    Windows(WindowsLayerWriter<W>),
}

impl<W: Write> LayerWriter<W> {
    pub fn new(sink: W, os: ImageOs) -> Self {
        match os {
            ImageOs::Linux => LayerWriter::Linux(Builder::new(sink)),
            ImageOs::Windows => LayerWriter::Windows(WindowsLayerWriter::new(sink)),
        }
    }

    /// Write a directory or file header plus its contents (empty for dirs).
    pub fn write_entry(&mut self, path: &str, is_dir: bool, mode: u32, data: &[u8]) -> Result<()> {
        match self {
            LayerWriter::Linux(builder) => {
                let header = normalized_header(path, is_dir, mode, data.len() as u64);
                builder
                    .append(&header, data)
                    .map_err(|e| PackError::io(format!("writing tar entry '{path}'"), e))
            }
            LayerWriter::Windows(writer) => writer.write_entry(path, is_dir, mode, data),
        }
    }

    /// Add a small text file at `path` (used for generated metadata files).
    pub fn add_file(&mut self, path: &str, text: &str) -> Result<()> {
        self.write_entry(path, false, 0o644, text.as_bytes())
    }

    /// Re-emit every entry from a source tar underneath `base_dir`, applying
    /// the permission policy and zeroing uid/gid/mtime. This is the engine
    /// behind `Codec::from_root_blob`'s "write each source entry with path
    /// rewritten beneath the version directory" step.
    pub fn copy_from<R: Read>(&mut self, mut reader: tar::Archive<R>, base_dir: &str) -> Result<()> {
        for entry in reader
            .entries()
            .map_err(|e| PackError::io("reading tar entries", e))?
        {
            let mut entry = entry.map_err(|e| PackError::io("reading tar entry", e))?;
            let entry_path = entry
                .path()
                .map_err(|e| PackError::io("reading tar entry path", e))?
                .to_string_lossy()
                .to_string();
            let cleaned = clean_relative_path(&entry_path);
            if cleaned.is_empty() || cleaned == "." {
                continue;
            }
            let is_dir = entry.header().entry_type().is_dir();
            let source_mode = entry.header().mode().unwrap_or(0);
            let mode = calc_file_mode(&cleaned, is_dir, source_mode);
            let dest_path = format!("{base_dir}/{cleaned}");

            let mut data = Vec::new();
            if !is_dir {
                entry
                    .read_to_end(&mut data)
                    .map_err(|e| PackError::io(format!("reading contents of '{dest_path}'"), e))?;
            }
            self.write_entry(&dest_path, is_dir, mode, &data)?;
        }
        Ok(())
    }

    pub fn finish(self) -> Result<W> {
        match self {
            LayerWriter::Linux(builder) => builder
                .into_inner()
                .map_err(|e| PackError::io("closing tar layer", e)),
            LayerWriter::Windows(writer) => writer.finish(),
        }
    }
}

fn clean_relative_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    out.join("/")
}

/// Windows layer writer. Lazily emits `Files` and `Hives` top-level
/// directory entries on the first write, rewrites every subsequent path to
/// live under `Files/`, and emits missing intermediate directories
/// shallowest-first before their children. A duplicate destination path is a
/// hard (codec) error.
pub struct WindowsLayerWriter<W: Write> {
    builder: Builder<W>,
    initialized: bool,
    existing_paths: HashSet<String>,
}

impl<W: Write> WindowsLayerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            builder: Builder::new(sink),
            initialized: false,
            existing_paths: HashSet::new(),
        }
    }

    fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        for root in ["Files", "Hives"] {
            let header = normalized_header(root, true, DIR_MODE, 0);
            self.builder
                .append(&header, std::io::empty())
                .map_err(|e| PackError::io(format!("writing '{root}' root"), e))?;
            self.existing_paths.insert(root.to_string());
        }
        self.initialized = true;
        Ok(())
    }

    fn write_parent_dirs(&mut self, child_path: &str) -> Result<()> {
        let mut parents = Vec::new();
        let mut current = child_path.to_string();
        loop {
            let parent = match Path::new(&current).parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().to_string(),
                _ => break,
            };
            if parent == "." || parent.is_empty() {
                break;
            }
            parents.push(parent.clone());
            current = parent;
        }
        parents.reverse();
        for parent in parents {
            if self.existing_paths.contains(&parent) {
                continue;
            }
            let header = normalized_header(&parent, true, DIR_MODE, 0);
            self.builder
                .append(&header, std::io::empty())
                .map_err(|e| PackError::io(format!("writing parent dir '{parent}'"), e))?;
            self.existing_paths.insert(parent);
        }
        Ok(())
    }

    fn write_entry(&mut self, path: &str, is_dir: bool, mode: u32, data: &[u8]) -> Result<()> {
        self.initialize()?;
        let dest_path = format!("Files/{}", path.trim_start_matches('/'));
        self.write_parent_dirs(&dest_path)?;

        if self.existing_paths.contains(&dest_path) {
            return Err(PackError::codec(format!(
                "attempted write of duplicate entry to layer: {dest_path}"
            )));
        }
        self.existing_paths.insert(dest_path.clone());

        let header = normalized_header(&dest_path, is_dir, mode, data.len() as u64);
        self.builder
            .append(&header, data)
            .map_err(|e| PackError::io(format!("writing tar entry '{dest_path}'"), e))
    }

    fn finish(mut self) -> Result<W> {
        self.initialize()?;
        self.builder
            .into_inner()
            .map_err(|e| PackError::io("closing windows tar layer", e))
    }
}
