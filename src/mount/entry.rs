//! Mount records and the modes they are created with.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::canonical::CanonicalPath;

/// How an archive is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MountMode {
    /// Changes made under the mount are discarded on unload.
    #[default]
    ReadOnly,
    /// Changes made under the mount are written back to the archive on
    /// unload.
    ReadWrite,
}

impl MountMode {
    /// Returns true for [`MountMode::ReadWrite`].
    pub fn is_writable(self) -> bool {
        self == Self::ReadWrite
    }
}

/// Lifecycle state of a mount.
///
/// There is no `Unloaded` state: an unloaded mount is removed from its
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    /// Extracted and usable.
    Loaded,
    /// Write-back in progress.
    Unloading,
}

/// File access requested from
/// [`MountRegistry::open_physical`](crate::MountRegistry::open_physical).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing file for reading.
    Read,
    /// Create or truncate a file for writing.
    Write,
    /// Create a file if needed and append to it.
    Append,
    /// Open an existing file for reading and writing.
    ReadWrite,
}

impl OpenMode {
    /// Returns true if this mode can modify the file.
    pub fn writes(self) -> bool {
        !matches!(self, Self::Read)
    }

    /// Returns the equivalent [`OpenOptions`].
    pub fn to_open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            Self::Read => options.read(true),
            Self::Write => options.write(true).create(true).truncate(true),
            Self::Append => options.append(true).create(true),
            Self::ReadWrite => options.read(true).write(true),
        };
        options
    }
}

/// One active archive.
///
/// Entries are owned by a [`MountRegistry`](crate::MountRegistry); the
/// scratch directory lives exactly as long as the entry.
#[derive(Debug)]
pub struct MountEntry {
    pub(crate) identity: CanonicalPath,
    pub(crate) scratch: TempDir,
    /// Canonical form of the scratch directory path.
    pub(crate) scratch_path: PathBuf,
    pub(crate) mode: MountMode,
    pub(crate) dirty: bool,
    pub(crate) state: MountState,
}

impl MountEntry {
    pub(crate) fn new(
        identity: CanonicalPath,
        scratch: TempDir,
        mode: MountMode,
        dirty: bool,
    ) -> Self {
        let scratch_path = std::fs::canonicalize(scratch.path())
            .unwrap_or_else(|_| scratch.path().to_path_buf());
        Self {
            identity,
            scratch,
            scratch_path,
            mode,
            dirty,
            state: MountState::Loaded,
        }
    }

    /// Canonical path of the archive.
    pub fn identity(&self) -> &CanonicalPath {
        &self.identity
    }

    /// Directory holding the extracted contents.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_path
    }

    /// Mode fixed at load time.
    pub fn mode(&self) -> MountMode {
        self.mode
    }

    /// Whether a mutating operation has touched this mount since it was
    /// loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MountState {
        self.state
    }

    /// Returns true if unloading would write the archive back.
    pub fn needs_write_back(&self) -> bool {
        self.mode.is_writable() && self.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_default_is_read_only() {
        assert_eq!(MountMode::default(), MountMode::ReadOnly);
        assert!(!MountMode::ReadOnly.is_writable());
        assert!(MountMode::ReadWrite.is_writable());
    }

    #[test]
    fn test_open_mode_writes() {
        assert!(!OpenMode::Read.writes());
        assert!(OpenMode::Write.writes());
        assert!(OpenMode::Append.writes());
        assert!(OpenMode::ReadWrite.writes());
    }

    #[test]
    fn test_needs_write_back() {
        let identity = crate::canonical::canonicalize_from("a.zip", "/zipmount-test").unwrap();
        let mut entry = MountEntry::new(identity, TempDir::new().unwrap(), MountMode::ReadOnly, true);
        assert!(!entry.needs_write_back());

        entry.mode = MountMode::ReadWrite;
        entry.dirty = false;
        assert!(!entry.needs_write_back());

        entry.dirty = true;
        assert!(entry.needs_write_back());
        assert_eq!(entry.state(), MountState::Loaded);
        assert!(entry.scratch_dir().is_dir());
    }
}
