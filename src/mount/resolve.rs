//! Virtual path resolution.
//!
//! A path resolves to a mount when one of its ancestors (or the path itself)
//! is the identity of a mounted archive. Ancestors are tried from the longest
//! to the shortest, so the innermost matching mount wins. Matching is done on
//! whole path components: `data.zip` never matches `data.zip.bak/x`.

use std::path::{Path, PathBuf};

use super::{MountEntry, MountRegistry};
use crate::canonical::{self, CanonicalPath};
use crate::{Error, Result};

/// The outcome of resolving a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// The path on disk to operate on.
    pub physical: PathBuf,
    /// The mount the path belongs to, if any.
    pub mount: Option<CanonicalPath>,
    /// The canonical form of the path that was resolved.
    ///
    /// A symlink in the final component is not followed. When the path
    /// reaches a nested mount through the outer archive, this is its
    /// spelling inside the outer scratch tree, under the nested mount's
    /// identity.
    pub canonical: CanonicalPath,
}

impl Resolved {
    /// Returns true if the path lies inside a mounted archive.
    pub fn is_virtual(&self) -> bool {
        self.mount.is_some()
    }

    /// Returns true if the path names a mounted archive itself, whose
    /// physical path is the scratch directory root.
    pub fn is_mount_root(&self) -> bool {
        self.mount
            .as_ref()
            .is_some_and(|identity| identity == &self.canonical)
    }
}

impl MountRegistry {
    /// Resolves `path` to the file it refers to.
    ///
    /// Paths inside a mounted archive map into that archive's scratch
    /// directory; every other path maps to its canonical real form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathResolution`] if the path goes through an archive
    /// that is not mounted (a component with an archive extension that is
    /// not a real directory), and [`Error::Io`] if the current directory
    /// cannot be determined.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use zipmount::{MountMode, MountRegistry};
    ///
    /// let mut registry = MountRegistry::new();
    /// let loaded = registry.load("data.zip", MountMode::ReadOnly)?;
    ///
    /// let resolved = registry.resolve("data.zip/images/a.png")?;
    /// assert_eq!(resolved.physical, loaded.scratch_dir.join("images/a.png"));
    /// assert_eq!(resolved.mount, Some(loaded.identity));
    /// # Ok::<(), zipmount::Error>(())
    /// ```
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<Resolved> {
        let path = path.as_ref();
        let mut canonical = canonical::canonicalize_entry(path)?;

        let Some((mut identity, mut entry)) = self.find_mount(canonical.as_path()) else {
            let unmounted_archive = canonical
                .as_path()
                .ancestors()
                .skip(1)
                .find(|a| self.options.is_archive_name(a) && !a.is_dir());
            if let Some(archive) = unmounted_archive {
                return Err(Error::PathResolution {
                    path: path.to_path_buf(),
                    archive: archive.to_path_buf(),
                });
            }
            return Ok(Resolved {
                physical: canonical.as_path().to_path_buf(),
                mount: None,
                canonical,
            });
        };

        let mut physical = map_into(canonical.as_path(), identity, entry);

        // An archive inside this scratch tree may be mounted by its scratch path
        for _ in 0..self.mounts.len() {
            let Some((inner, inner_entry)) = self.find_mount(&physical) else {
                break;
            };
            canonical = CanonicalPath::from_resolved(physical);
            physical = map_into(canonical.as_path(), inner, inner_entry);
            identity = inner;
            entry = inner_entry;
        }

        let scratch = entry.scratch_dir();
        let remainder = physical.strip_prefix(scratch).unwrap_or(Path::new(""));
        let unmounted_archive = remainder
            .ancestors()
            .skip(1)
            .filter(|a| !a.as_os_str().is_empty())
            .map(|a| scratch.join(a))
            .find(|a| self.options.is_archive_name(a) && !a.is_dir());
        if let Some(archive) = unmounted_archive {
            return Err(Error::PathResolution {
                path: path.to_path_buf(),
                archive,
            });
        }

        Ok(Resolved {
            physical,
            mount: Some(identity.clone()),
            canonical,
        })
    }

    /// Finds the innermost mount whose identity is `canonical` or one of
    /// its ancestors.
    pub(crate) fn find_mount(&self, canonical: &Path) -> Option<(&CanonicalPath, &MountEntry)> {
        canonical
            .ancestors()
            .find_map(|ancestor| self.mounts.get_key_value(ancestor))
    }
}

/// Maps `canonical`, which lies at or below `identity`, into the mount's
/// scratch directory.
fn map_into(canonical: &Path, identity: &CanonicalPath, entry: &MountEntry) -> PathBuf {
    match canonical.strip_prefix(identity) {
        Ok(inner) if !inner.as_os_str().is_empty() => entry.scratch_dir().join(inner),
        _ => entry.scratch_dir().to_path_buf(),
    }
}
