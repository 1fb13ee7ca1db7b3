//! Filesystem operations that understand mounted archives.
//!
//! Every function mirrors its [`std::fs`] counterpart but takes a
//! [`MountRegistry`] and a path that may point inside a mounted archive. The
//! path is resolved first; the operation then runs on the physical file, and
//! operations that change content mark the containing mount dirty so the
//! archive is written back on unload.
//!
//! # Example
//!
//! ```rust,no_run
//! use zipmount::{MountMode, MountRegistry, fs};
//!
//! let mut registry = MountRegistry::new();
//! registry.load("site.zip", MountMode::ReadWrite)?;
//!
//! fs::create_dir_all(&mut registry, "site.zip/assets/css")?;
//! fs::copy(&mut registry, "style.css", "site.zip/assets/css/style.css")?;
//!
//! for entry in fs::walk(&registry, "site.zip")? {
//!     let entry = entry?;
//!     println!("{}: {:?} {:?}", entry.path.display(), entry.dirs, entry.files);
//! }
//!
//! registry.unload("site.zip")?;
//! # Ok::<(), zipmount::Error>(())
//! ```
//!
//! # Path Handling
//!
//! Virtual paths are ordinary paths whose prefix is a mounted archive, such
//! as `site.zip/assets/css`. Relative and absolute spellings are equivalent.
//! Addressing the inside of an archive that is not mounted is an error
//! ([`Error::PathResolution`](crate::Error::PathResolution)).

use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};

use crate::Result;
use crate::canonical;
use crate::mount::{MountRegistry, Resolved};

/// An entry returned by [`read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    name: OsString,
    path: PathBuf,
    is_dir: bool,
    is_mount: bool,
}

impl DirEntry {
    /// Returns the file name of this entry.
    pub fn name(&self) -> &OsString {
        &self.name
    }

    /// Returns the path of this entry, under the directory as it was given
    /// to [`read_dir`].
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true for directories and for mounted archives.
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Returns true for anything that is not a directory.
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    /// Returns true if this entry is an archive mounted in the registry.
    pub fn is_mount(&self) -> bool {
        self.is_mount
    }
}

/// Lists a directory, sorted by name.
///
/// Archives mounted in `registry` are reported as directories.
pub fn read_dir(registry: &MountRegistry, path: impl AsRef<Path>) -> Result<Vec<DirEntry>> {
    let path = path.as_ref();
    let resolved = registry.resolve(path)?;
    let mut entries = Vec::new();
    for child in fs::read_dir(&resolved.physical)? {
        let child = child?;
        let name = child.file_name();
        let is_mount = registry
            .mounts
            .contains_key(resolved.canonical.as_path().join(&name).as_path());
        let is_dir = is_mount || child.path().is_dir();
        entries.push(DirEntry {
            path: path.join(&name),
            name,
            is_dir,
            is_mount,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Returns true if `path` exists.
///
/// Paths that cannot be resolved do not exist.
pub fn exists(registry: &MountRegistry, path: impl AsRef<Path>) -> bool {
    registry
        .resolve(path)
        .is_ok_and(|resolved| resolved.physical.exists())
}

/// Returns true if `path` is a directory. A mounted archive is a directory.
pub fn is_dir(registry: &MountRegistry, path: impl AsRef<Path>) -> bool {
    registry
        .resolve(path)
        .is_ok_and(|resolved| resolved.physical.is_dir())
}

/// Returns true if `path` is a regular file. A mounted archive is not.
pub fn is_file(registry: &MountRegistry, path: impl AsRef<Path>) -> bool {
    registry
        .resolve(path)
        .is_ok_and(|resolved| resolved.physical.is_file())
}

/// Returns the metadata of the file `path` resolves to.
pub fn metadata(registry: &MountRegistry, path: impl AsRef<Path>) -> Result<Metadata> {
    let resolved = registry.resolve(path)?;
    Ok(fs::metadata(&resolved.physical)?)
}

/// Reads an entire file.
pub fn read(registry: &MountRegistry, path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let resolved = registry.resolve(path)?;
    Ok(fs::read(&resolved.physical)?)
}

/// Reads an entire file into a string.
pub fn read_to_string(registry: &MountRegistry, path: impl AsRef<Path>) -> Result<String> {
    let resolved = registry.resolve(path)?;
    Ok(fs::read_to_string(&resolved.physical)?)
}

/// Writes a file, replacing its contents.
pub fn write(
    registry: &mut MountRegistry,
    path: impl AsRef<Path>,
    contents: impl AsRef<[u8]>,
) -> Result<()> {
    let resolved = registry.resolve(path)?;
    fs::write(&resolved.physical, contents)?;
    touch(registry, &resolved);
    Ok(())
}

/// Creates a directory.
pub fn create_dir(registry: &mut MountRegistry, path: impl AsRef<Path>) -> Result<()> {
    let resolved = registry.resolve(path)?;
    fs::create_dir(&resolved.physical)?;
    touch(registry, &resolved);
    Ok(())
}

/// Creates a directory and all missing parents.
pub fn create_dir_all(registry: &mut MountRegistry, path: impl AsRef<Path>) -> Result<()> {
    let resolved = registry.resolve(path)?;
    fs::create_dir_all(&resolved.physical)?;
    touch(registry, &resolved);
    Ok(())
}

/// Removes a file.
pub fn remove_file(registry: &mut MountRegistry, path: impl AsRef<Path>) -> Result<()> {
    let resolved = registry.resolve(path)?;
    fs::remove_file(&resolved.physical)?;
    touch(registry, &resolved);
    Ok(())
}

/// Removes an empty directory.
///
/// The root of a mounted archive cannot be removed; unload the archive
/// instead.
pub fn remove_dir(registry: &mut MountRegistry, path: impl AsRef<Path>) -> Result<()> {
    let resolved = registry.resolve(path)?;
    reject_mount_root(&resolved)?;
    fs::remove_dir(&resolved.physical)?;
    touch(registry, &resolved);
    Ok(())
}

/// Removes a directory and everything below it.
///
/// The root of a mounted archive cannot be removed; unload the archive
/// instead.
pub fn remove_dir_all(registry: &mut MountRegistry, path: impl AsRef<Path>) -> Result<()> {
    let resolved = registry.resolve(path)?;
    reject_mount_root(&resolved)?;
    fs::remove_dir_all(&resolved.physical)?;
    touch(registry, &resolved);
    Ok(())
}

/// Renames a file or directory.
///
/// Both paths may be virtual; moving between two mounts, or between a
/// mount and the real filesystem, is subject to the same restrictions as
/// [`std::fs::rename`] across directories.
pub fn rename(
    registry: &mut MountRegistry,
    from: impl AsRef<Path>,
    to: impl AsRef<Path>,
) -> Result<()> {
    let from = registry.resolve(from)?;
    let to = registry.resolve(to)?;
    reject_mount_root(&from)?;
    reject_mount_root(&to)?;
    fs::rename(&from.physical, &to.physical)?;
    touch(registry, &from);
    touch(registry, &to);
    Ok(())
}

/// Copies a file, returning the number of bytes copied.
pub fn copy(
    registry: &mut MountRegistry,
    from: impl AsRef<Path>,
    to: impl AsRef<Path>,
) -> Result<u64> {
    let from = registry.resolve(from)?;
    let to = registry.resolve(to)?;
    let copied = fs::copy(&from.physical, &to.physical)?;
    touch(registry, &to);
    Ok(copied)
}

fn touch(registry: &mut MountRegistry, resolved: &Resolved) {
    if let Some(identity) = &resolved.mount {
        registry.touch(identity);
    }
}

fn reject_mount_root(resolved: &Resolved) -> Result<()> {
    if resolved.is_mount_root() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!(
                "'{}' is a mounted archive; unload it instead",
                resolved.canonical
            ),
        )
        .into());
    }
    Ok(())
}

/// One directory visited by [`walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// The directory, spelled under the path given to [`walk`].
    pub path: PathBuf,
    /// Names of subdirectories (including mounted archives), sorted.
    pub dirs: Vec<OsString>,
    /// Names of other entries, sorted.
    pub files: Vec<OsString>,
}

/// Walks a directory tree top-down.
///
/// Mounted archives encountered in real directories are treated as
/// directories and descended into, so the walk crosses transparently from
/// the real filesystem into archives. Symbolic links to directories are
/// listed in [`WalkEntry::dirs`] but not followed.
///
/// The returned iterator is lazy: each directory is read when it is reached.
/// A directory that cannot be read yields an error and the walk continues
/// with the next one.
pub fn walk(registry: &MountRegistry, top: impl AsRef<Path>) -> Result<Walk<'_>> {
    let top = top.as_ref();
    let resolved = registry.resolve(top)?;
    // A symlinked top directory is walked under its target's identity
    let canonical = if resolved.is_virtual() {
        resolved.canonical.into_path_buf()
    } else {
        canonical::canonicalize(top)?.into_path_buf()
    };
    Ok(Walk {
        registry,
        stack: vec![PendingDir {
            path: top.to_path_buf(),
            canonical,
            physical: resolved.physical,
        }],
    })
}

/// Iterator returned by [`walk`].
#[derive(Debug)]
pub struct Walk<'a> {
    registry: &'a MountRegistry,
    stack: Vec<PendingDir>,
}

#[derive(Debug)]
struct PendingDir {
    path: PathBuf,
    canonical: PathBuf,
    physical: PathBuf,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, dir: PendingDir) -> Result<WalkEntry> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let mut descend = Vec::new();

        for child in fs::read_dir(&dir.physical)? {
            let child = child?;
            let name = child.file_name();
            let canonical = dir.canonical.join(&name);
            let file_type = child.file_type()?;

            if let Some(entry) = self.registry.mounts.get(canonical.as_path()) {
                descend.push(PendingDir {
                    path: dir.path.join(&name),
                    canonical,
                    physical: entry.scratch_dir().to_path_buf(),
                });
                dirs.push(name);
            } else if file_type.is_dir() {
                descend.push(PendingDir {
                    path: dir.path.join(&name),
                    canonical,
                    physical: child.path(),
                });
                dirs.push(name);
            } else if file_type.is_symlink() && child.path().is_dir() {
                dirs.push(name);
            } else {
                files.push(name);
            }
        }

        dirs.sort();
        files.sort();
        descend.sort_by(|a, b| a.path.cmp(&b.path));
        // Pushed in reverse so the first subdirectory is visited next.
        self.stack.extend(descend.into_iter().rev());

        Ok(WalkEntry {
            path: dir.path,
            dirs,
            files,
        })
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let dir = self.stack.pop()?;
        Some(self.visit(dir))
    }
}
