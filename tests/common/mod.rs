//! Common test utilities for zipmount integration tests.
//!
//! This module provides shared helper functions used across multiple test files.
//! Not every test file uses every helper, hence the `dead_code` allowance.

#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use zipmount::codec::{
    ArchiveCodec, CodecError, CodecResult, CodecStats, EntryMeta, EntryPath, ZipArchive,
    ZipCodec, ZipWriter,
};
use zipmount::{MountOptions, MountRegistry};

/// Writes a ZIP archive at `path` containing the given entries.
///
/// Entry names ending in `/` become directory entries; every other name is a
/// file with the paired content. Parent directories of `path` are created.
///
/// # Panics
///
/// Panics if the archive cannot be written.
///
/// # Example
///
/// ```ignore
/// create_zip(&dir.join("a.zip"), &[("docs/", b""), ("docs/readme.txt", b"hi")]);
/// ```
pub fn create_zip(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create archive parent directory");
    }
    let file = File::create(path).expect("Failed to create archive file");
    let mut writer = ZipWriter::new(file);
    for (name, data) in entries {
        if let Some(dir) = name.strip_suffix('/') {
            let entry = EntryPath::new(dir).expect("Invalid directory name");
            writer
                .add_directory(&entry, EntryMeta::directory())
                .expect("Failed to add directory");
        } else {
            let entry = EntryPath::new(name).expect("Invalid file name");
            writer
                .add_bytes(&entry, data, EntryMeta::file())
                .expect("Failed to add file");
        }
    }
    writer.finish().expect("Failed to finish archive");
}

/// Reads every file entry of the archive at `path` into `(name, data)` pairs,
/// sorted by name. Directory entries are omitted.
///
/// # Panics
///
/// Panics if the archive cannot be opened or an entry fails to decode.
pub fn read_zip(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = File::open(path).expect("Failed to open archive");
    let mut archive = ZipArchive::new(file).expect("Failed to parse archive");
    let mut out = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.entries()[index].clone();
        if entry.is_dir {
            continue;
        }
        let data = archive
            .read_entry(index)
            .unwrap_or_else(|e| panic!("Failed to read '{}': {}", entry.path, e));
        out.push((entry.path.as_str().to_string(), data));
    }
    out.sort();
    out
}

/// Creates a registry whose scratch directories live under `scratch_root`.
///
/// Keeping scratch directories inside the test's own temporary directory
/// lets tests check that nothing is left behind.
pub fn registry(scratch_root: &Path) -> MountRegistry {
    MountRegistry::with_options(MountOptions::new().scratch_root(scratch_root))
}

/// Returns the names of all entries directly inside `dir`, sorted.
///
/// Returns an empty list if `dir` does not exist.
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.expect("Failed to read dir entry").file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

/// A test workspace: a temporary directory with an `archives/` area and a
/// separate `scratch/` root for mounts.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Path of `name` inside the archives area.
    pub fn archive(&self, name: &str) -> PathBuf {
        self.dir.path().join("archives").join(name)
    }

    /// Root directory for scratch directories.
    pub fn scratch_root(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    /// A registry using this workspace's scratch root.
    pub fn registry(&self) -> MountRegistry {
        registry(&self.scratch_root())
    }
}

/// Wraps [`ZipCodec`] and counts calls to `extract` and `pack`.
#[derive(Debug, Clone, Default)]
pub struct CountingCodec {
    pub extracts: Arc<AtomicUsize>,
    pub packs: Arc<AtomicUsize>,
}

impl CountingCodec {
    pub fn extracts(&self) -> usize {
        self.extracts.load(Ordering::SeqCst)
    }

    pub fn packs(&self) -> usize {
        self.packs.load(Ordering::SeqCst)
    }
}

impl ArchiveCodec for CountingCodec {
    fn extract(&self, archive: &Path, target: &Path) -> CodecResult<CodecStats> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        ZipCodec::default().extract(archive, target)
    }

    fn pack(&self, source: &Path, archive: &Path) -> CodecResult<CodecStats> {
        self.packs.fetch_add(1, Ordering::SeqCst);
        ZipCodec::default().pack(source, archive)
    }
}

/// Extracts normally, but packing writes garbage to the destination and
/// then fails, as an archiver would when the disk fills up mid-write.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingPackCodec;

impl ArchiveCodec for FailingPackCodec {
    fn extract(&self, archive: &Path, target: &Path) -> CodecResult<CodecStats> {
        ZipCodec::default().extract(archive, target)
    }

    fn pack(&self, _source: &Path, archive: &Path) -> CodecResult<CodecStats> {
        fs::write(archive, b"PK\x03\x04 truncated")?;
        Err(CodecError::Io(std::io::Error::other("simulated disk full")))
    }
}
