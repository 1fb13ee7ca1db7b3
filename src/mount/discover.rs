//! Recursive discovery of archives on the real filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{DiscoverPolicy, MountMode, MountRegistry};
use crate::canonical::{self, CanonicalPath};
use crate::{Error, Result};

/// An archive that could not be loaded during discovery.
#[derive(Debug)]
pub struct DiscoverFailure {
    /// Path of the archive or directory that failed.
    pub path: PathBuf,
    /// Why it failed.
    pub error: Error,
}

/// What [`MountRegistry::discover_and_load`] found.
#[derive(Debug, Default)]
pub struct DiscoverReport {
    /// Archives mounted by this call, in walk order.
    pub loaded: Vec<CanonicalPath>,
    /// Archives found that were already mounted; they are left as they are.
    pub already_mounted: Vec<CanonicalPath>,
    /// Archives or directories that could not be processed.
    ///
    /// Always empty under [`DiscoverPolicy::Abort`].
    pub failures: Vec<DiscoverFailure>,
}

impl DiscoverReport {
    /// Returns true if every archive found was processed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl MountRegistry {
    /// Walks `root` and mounts every archive found, read-only.
    ///
    /// Only the real filesystem is walked: archives inside archives are not
    /// discovered, symbolic links are not followed, and scratch directories
    /// of active mounts are skipped.
    ///
    /// What happens when an archive fails to load depends on
    /// [`MountOptions::discover_policy`](crate::MountOptions::discover_policy).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if `root` cannot be read. Under
    /// [`DiscoverPolicy::Abort`], also returns the first load or walk
    /// failure; archives loaded before it stay mounted.
    pub fn discover_and_load(&mut self, root: impl AsRef<Path>) -> Result<DiscoverReport> {
        let root = fs::canonicalize(root.as_ref())?;
        let policy = self.options.discover_policy;
        let mut report = DiscoverReport::default();

        let mut walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    let error = Error::Io(e.into());
                    match policy {
                        DiscoverPolicy::Abort => return Err(error),
                        DiscoverPolicy::SkipAndContinue => {
                            log::warn!("Skipping '{}' during discovery: {}", path.display(), error);
                            report.failures.push(DiscoverFailure { path, error });
                            continue;
                        }
                    }
                }
            };

            // Mounts loaded earlier in this walk count too
            if entry.file_type().is_dir() && self.is_scratch_dir(entry.path()) {
                log::debug!("Skipping scratch directory '{}'", entry.path().display());
                walker.skip_current_dir();
                continue;
            }

            if !entry.file_type().is_file() || !self.options.is_archive_name(entry.path()) {
                continue;
            }

            let identity = canonical::canonicalize(entry.path())?;
            if self.mounts.contains_key(&identity) {
                report.already_mounted.push(identity);
                continue;
            }

            match self.load(&identity, MountMode::ReadOnly) {
                Ok(loaded) => report.loaded.push(loaded.identity),
                Err(error) => match policy {
                    DiscoverPolicy::Abort => return Err(error),
                    DiscoverPolicy::SkipAndContinue => {
                        log::warn!("Skipping archive '{}': {}", identity, error);
                        report.failures.push(DiscoverFailure {
                            path: identity.into_path_buf(),
                            error,
                        });
                    }
                },
            }
        }

        log::debug!(
            "Discovered {} archives under '{}' ({} failed)",
            report.loaded.len(),
            root.display(),
            report.failures.len()
        );
        Ok(report)
    }

    fn is_scratch_dir(&self, path: &Path) -> bool {
        self.mounts.values().any(|entry| entry.scratch_dir() == path)
    }
}
