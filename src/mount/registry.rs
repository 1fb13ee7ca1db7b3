//! The mount registry: load, unload and write-back of archives.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::shutdown;
use super::{MountEntry, MountMode, MountOptions, MountState, OpenMode};
use crate::canonical::{self, CanonicalPath};
use crate::codec::{ArchiveCodec, CodecStats, ZipCodec};
use crate::{Error, Result};

/// Result of loading an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct LoadResult {
    /// Canonical identity of the archive.
    pub identity: CanonicalPath,
    /// Directory the archive was extracted into.
    pub scratch_dir: PathBuf,
    /// Extraction statistics (all zero for a newly created archive).
    pub stats: CodecStats,
}

/// Result of unloading an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct UnloadResult {
    /// Canonical identity of the archive.
    pub identity: CanonicalPath,
    /// Packing statistics if the archive was written back.
    pub written: Option<CodecStats>,
}

impl UnloadResult {
    /// Returns true if the archive file was rewritten.
    pub fn was_written(&self) -> bool {
        self.written.is_some()
    }
}

/// A borrowed view of one mount, as yielded by [`MountRegistry::mounts`].
#[derive(Debug, Clone, Copy)]
pub struct MountInfo<'a> {
    /// Canonical identity of the archive.
    pub identity: &'a CanonicalPath,
    /// Directory holding the extracted contents.
    pub scratch_dir: &'a Path,
    /// Mount mode.
    pub mode: MountMode,
    /// Whether the mount has unsaved changes.
    pub dirty: bool,
}

/// Tracks the archives currently mounted and owns their scratch directories.
///
/// A registry is an ordinary value: several can coexist, and each mount
/// belongs to exactly one of them. Dropping a registry unloads whatever is
/// still mounted (see [`MountOptions::flush_on_drop`]).
///
/// # Example
///
/// ```rust,no_run
/// use zipmount::{MountMode, MountRegistry};
///
/// let mut registry = MountRegistry::new();
/// registry.load("photos.zip", MountMode::ReadWrite)?;
///
/// zipmount::fs::write(&mut registry, "photos.zip/notes.txt", "hello")?;
/// let listing = zipmount::fs::read_dir(&registry, "photos.zip")?;
/// println!("{:?}", listing);
///
/// // Packs the modified tree back into photos.zip.
/// registry.unload("photos.zip")?;
/// # Ok::<(), zipmount::Error>(())
/// ```
pub struct MountRegistry {
    pub(crate) mounts: BTreeMap<CanonicalPath, MountEntry>,
    pub(crate) codec: Box<dyn ArchiveCodec + Send + Sync>,
    pub(crate) options: MountOptions,
}

impl fmt::Debug for MountRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountRegistry")
            .field("mounts", &self.mounts)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for MountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MountRegistry {
    /// Creates an empty registry using the ZIP codec and default options.
    pub fn new() -> Self {
        Self::with_options(MountOptions::default())
    }

    /// Creates an empty registry using the ZIP codec.
    pub fn with_options(options: MountOptions) -> Self {
        Self::with_codec(ZipCodec::default(), options)
    }

    /// Creates an empty registry using a custom codec.
    pub fn with_codec<C>(codec: C, options: MountOptions) -> Self
    where
        C: ArchiveCodec + Send + Sync + 'static,
    {
        shutdown::register();
        Self {
            mounts: BTreeMap::new(),
            codec: Box::new(codec),
            options,
        }
    }

    /// Returns the options this registry was created with.
    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    /// Mounts the archive at `path`.
    ///
    /// The archive is extracted into a fresh scratch directory; its contents
    /// are then reachable through virtual paths beginning with `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyMounted`] if the archive is already mounted here,
    /// - [`Error::ArchiveNotFound`] if no file exists at `path`,
    /// - [`Error::Codec`] if extraction fails. Nothing is left behind in
    ///   that case: the scratch directory is removed and no mount is added.
    pub fn load(&mut self, path: impl AsRef<Path>, mode: MountMode) -> Result<LoadResult> {
        let identity = canonical::canonicalize(path)?;
        if self.mounts.contains_key(&identity) {
            return Err(Error::AlreadyMounted {
                path: identity.into_path_buf(),
            });
        }
        if !identity.as_path().is_file() {
            return Err(Error::ArchiveNotFound {
                path: identity.into_path_buf(),
            });
        }

        let scratch = self.create_scratch_dir(&identity)?;
        let stats = match self.codec.extract(identity.as_path(), scratch.path()) {
            Ok(stats) => stats,
            Err(source) => {
                if let Err(e) = scratch.close() {
                    log::warn!(
                        "Failed to remove scratch directory for '{}': {}",
                        identity,
                        e
                    );
                }
                return Err(Error::Codec {
                    archive: identity.into_path_buf(),
                    source,
                });
            }
        };

        let entry = MountEntry::new(identity.clone(), scratch, mode, false);
        let scratch_dir = entry.scratch_dir().to_path_buf();
        log::debug!(
            "Mounted '{}' ({:?}, {} entries) at '{}'",
            identity,
            mode,
            stats.entries(),
            scratch_dir.display()
        );
        self.mounts.insert(identity.clone(), entry);

        Ok(LoadResult {
            identity,
            scratch_dir,
            stats,
        })
    }

    /// Mounts a new, empty archive at `path` in read-write mode.
    ///
    /// The archive file is written when the mount is unloaded or saved.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyMounted`] if the path is already mounted,
    /// - [`Error::ArchiveExists`] if a file already exists at `path`,
    /// - [`Error::Io`] if the parent directory does not exist.
    pub fn create(&mut self, path: impl AsRef<Path>) -> Result<LoadResult> {
        let identity = canonical::canonicalize(path)?;
        if self.mounts.contains_key(&identity) {
            return Err(Error::AlreadyMounted {
                path: identity.into_path_buf(),
            });
        }
        if fs::symlink_metadata(identity.as_path()).is_ok() {
            return Err(Error::ArchiveExists {
                path: identity.into_path_buf(),
            });
        }
        let parent_is_dir = identity.as_path().parent().is_some_and(Path::is_dir);
        if !parent_is_dir {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("parent directory of '{}' does not exist", identity),
            )));
        }

        let scratch = self.create_scratch_dir(&identity)?;
        let entry = MountEntry::new(identity.clone(), scratch, MountMode::ReadWrite, true);
        let scratch_dir = entry.scratch_dir().to_path_buf();
        log::debug!("Created new mount '{}' at '{}'", identity, scratch_dir.display());
        self.mounts.insert(identity.clone(), entry);

        Ok(LoadResult {
            identity,
            scratch_dir,
            stats: CodecStats::default(),
        })
    }

    /// Unmounts the archive at `path`.
    ///
    /// A read-write mount with changes is packed into a temporary file next
    /// to the archive, which then atomically replaces it. Read-only mounts
    /// and unchanged mounts are dropped without touching the archive.
    ///
    /// # Errors
    ///
    /// - [`Error::NotMounted`] if the archive is not mounted,
    /// - [`Error::Codec`] or [`Error::Io`] if write-back fails. The original
    ///   archive is then unchanged and the mount stays loaded with its
    ///   scratch directory intact, so the unload can be retried.
    pub fn unload(&mut self, path: impl AsRef<Path>) -> Result<UnloadResult> {
        let identity = self.mounted_identity(path.as_ref())?;

        let written = {
            let entry = self
                .mounts
                .get_mut(&identity)
                .ok_or_else(|| not_mounted(&identity))?;
            if entry.needs_write_back() {
                entry.state = MountState::Unloading;
                match write_back(&*self.codec, entry) {
                    Ok(stats) => Some(stats),
                    Err(e) => {
                        entry.state = MountState::Loaded;
                        return Err(e);
                    }
                }
            } else {
                None
            }
        };

        self.remove_entry(&identity);
        log::debug!(
            "Unmounted '{}'{}",
            identity,
            if written.is_some() { " (written back)" } else { "" }
        );
        Ok(UnloadResult { identity, written })
    }

    /// Unmounts the archive at `path` without writing anything back.
    pub fn discard(&mut self, path: impl AsRef<Path>) -> Result<UnloadResult> {
        let identity = self.mounted_identity(path.as_ref())?;
        self.remove_entry(&identity);
        log::debug!("Discarded mount '{}'", identity);
        Ok(UnloadResult {
            identity,
            written: None,
        })
    }

    /// Writes a dirty read-write mount back to its archive and keeps it
    /// mounted.
    ///
    /// Returns `None` when there was nothing to write.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<Option<CodecStats>> {
        let identity = self.mounted_identity(path.as_ref())?;
        let entry = self
            .mounts
            .get_mut(&identity)
            .ok_or_else(|| not_mounted(&identity))?;
        if !entry.needs_write_back() {
            return Ok(None);
        }
        let stats = write_back(&*self.codec, entry)?;
        entry.dirty = false;
        Ok(Some(stats))
    }

    /// Marks the mount containing `path` as modified.
    ///
    /// `path` may be the archive itself or any virtual path inside it.
    pub fn mark_dirty(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let canonical = canonical::canonicalize(path)?;
        let identity = match self.find_mount(canonical.as_path()) {
            Some((identity, _)) => identity.clone(),
            None => {
                return Err(Error::NotMounted {
                    path: canonical.into_path_buf(),
                });
            }
        };
        self.touch(&identity);
        Ok(())
    }

    /// Returns a snapshot of the identities currently mounted.
    pub fn active_mounts(&self) -> BTreeSet<CanonicalPath> {
        self.mounts.keys().cloned().collect()
    }

    /// Returns an iterator over the current mounts in identity order.
    pub fn mounts(&self) -> impl Iterator<Item = MountInfo<'_>> {
        self.mounts.values().map(|entry| MountInfo {
            identity: entry.identity(),
            scratch_dir: entry.scratch_dir(),
            mode: entry.mode(),
            dirty: entry.is_dirty(),
        })
    }

    /// Returns the mount entry for the archive at `path`.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&MountEntry> {
        let identity = canonical::canonicalize(path).ok()?;
        self.mounts.get(&identity)
    }

    /// Returns true if the archive at `path` is mounted.
    pub fn is_mounted(&self, path: impl AsRef<Path>) -> bool {
        self.get(path).is_some()
    }

    /// Returns the mode of the archive mounted at `path`.
    pub fn mode(&self, path: impl AsRef<Path>) -> Option<MountMode> {
        self.get(path).map(MountEntry::mode)
    }

    /// Returns whether the archive mounted at `path` has unsaved changes.
    pub fn is_dirty(&self, path: impl AsRef<Path>) -> Option<bool> {
        self.get(path).map(MountEntry::is_dirty)
    }

    /// Returns the scratch directory of the archive mounted at `path`.
    pub fn scratch_dir(&self, path: impl AsRef<Path>) -> Option<&Path> {
        self.get(path).map(MountEntry::scratch_dir)
    }

    /// Returns the number of mounted archives.
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Returns true if nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Opens the file that `path` resolves to.
    ///
    /// The handle refers to the physical file, so it can be passed to any
    /// code expecting a [`File`]. Opening for writing marks the containing
    /// mount dirty.
    pub fn open_physical(&mut self, path: impl AsRef<Path>, mode: OpenMode) -> Result<File> {
        let resolved = self.resolve(path)?;
        let file = mode.to_open_options().open(&resolved.physical)?;
        if mode.writes() {
            if let Some(identity) = &resolved.mount {
                self.touch(identity);
            }
        }
        Ok(file)
    }

    /// Sets the dirty flag of a mount known by its identity.
    pub(crate) fn touch(&mut self, identity: &CanonicalPath) {
        if let Some(entry) = self.mounts.get_mut(identity) {
            if !entry.dirty {
                log::debug!("Mount '{}' modified", entry.identity);
            }
            entry.dirty = true;
        }
    }

    fn mounted_identity(&self, path: &Path) -> Result<CanonicalPath> {
        let identity = canonical::canonicalize(path)?;
        if self.mounts.contains_key(&identity) {
            Ok(identity)
        } else {
            Err(Error::NotMounted {
                path: identity.into_path_buf(),
            })
        }
    }

    /// Removes an entry and deletes its scratch directory.
    fn remove_entry(&mut self, identity: &CanonicalPath) {
        if let Some(entry) = self.mounts.remove(identity) {
            let scratch_path = entry.scratch_path;
            if let Err(e) = entry.scratch.close() {
                log::warn!(
                    "Failed to remove scratch directory '{}': {}",
                    scratch_path.display(),
                    e
                );
            }
        }
    }

    fn create_scratch_dir(&self, identity: &CanonicalPath) -> Result<TempDir> {
        let stem = identity
            .as_path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = format!("{}{}-", self.options.scratch_prefix, stem);
        let root = self.options.scratch_root_or_default();
        fs::create_dir_all(&root)?;
        Ok(tempfile::Builder::new().prefix(&prefix).tempdir_in(root)?)
    }
}

fn not_mounted(identity: &CanonicalPath) -> Error {
    Error::NotMounted {
        path: identity.as_path().to_path_buf(),
    }
}

/// Packs a mount's scratch directory over its archive.
///
/// The new archive is written to a temporary file in the archive's own
/// directory and renamed into place, so the original is either fully
/// replaced or left untouched.
fn write_back(codec: &(dyn ArchiveCodec + Send + Sync), entry: &MountEntry) -> Result<CodecStats> {
    let archive = entry.identity.as_path();
    let dir = archive.parent().ok_or_else(|| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("archive '{}' has no parent directory", entry.identity),
        ))
    })?;
    let name = entry
        .identity
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".tmp")
        .tempfile_in(dir)?
        .into_temp_path();

    let stats = codec
        .pack(&entry.scratch_path, &temp)
        .map_err(|source| Error::Codec {
            archive: archive.to_path_buf(),
            source,
        })?;

    if let Ok(metadata) = fs::metadata(archive) {
        if let Err(e) = fs::set_permissions(&temp, metadata.permissions()) {
            log::warn!(
                "Failed to copy permissions of '{}' to new archive: {}",
                archive.display(),
                e
            );
        }
    }

    // Data reaches the disk before the rename
    fs::OpenOptions::new().write(true).open(&temp)?.sync_all()?;
    temp.persist(archive).map_err(|e| Error::Io(e.error))?;
    #[cfg(unix)]
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        log::debug!("Failed to sync directory '{}': {}", dir.display(), e);
    }
    log::debug!(
        "Wrote back '{}' ({} entries, {} bytes)",
        entry.identity,
        stats.entries(),
        stats.compressed_bytes
    );
    Ok(stats)
}
