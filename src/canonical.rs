//! Canonical path identities for archives.
//!
//! Every archive known to a [`MountRegistry`](crate::MountRegistry) is keyed
//! by a [`CanonicalPath`]: the absolute, normalized form of its path. Two
//! spellings of the same archive (relative or absolute, with `.` or `..`
//! segments, with trailing or repeated separators, through a symlinked
//! directory) produce the same identity.
//!
//! Canonicalization proceeds in two steps:
//!
//! 1. The path is made absolute against a base directory (the current working
//!    directory by default) and normalized lexically.
//! 2. The longest prefix that exists on disk is resolved by the operating
//!    system (following symlinks), and the non-existing remainder is appended
//!    back unchanged.
//!
//! Step 2 lets virtual paths such as `data.zip/images/a.png`, whose tail only
//! exists inside a scratch directory, canonicalize to the same prefix as the
//! archive itself.
//!
//! [`canonicalize_entry`] is the variant used for paths handed to filesystem
//! operations. It leaves a symlink in the final component unresolved.

use std::borrow::Borrow;
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::Result;

/// An absolute, normalized path used as the identity of an archive.
///
/// `CanonicalPath` borrows as [`Path`], so maps keyed by it can be queried
/// with any `&Path`.
///
/// # Examples
///
/// ```
/// use zipmount::canonical::canonicalize_from;
///
/// let a = canonicalize_from("data/./a.zip/", "/nonexistent-base").unwrap();
/// let b = canonicalize_from("/nonexistent-base/data/x/../a.zip", "/").unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalPath(PathBuf);

impl CanonicalPath {
    /// Returns the path as a [`Path`] slice.
    #[inline]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Wraps a path that is already absolute and resolved.
    pub(crate) fn from_resolved(path: PathBuf) -> Self {
        Self(path)
    }

    /// Consumes the identity and returns the inner [`PathBuf`].
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Returns the final component of the path, if any.
    pub fn file_name(&self) -> Option<&OsStr> {
        self.0.file_name()
    }

    /// Returns true if the file extension matches one of `extensions`
    /// (ASCII case-insensitive, without the leading dot).
    pub fn has_extension(&self, extensions: &[String]) -> bool {
        has_archive_extension(&self.0, extensions)
    }
}

impl AsRef<Path> for CanonicalPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Borrow<Path> for CanonicalPath {
    fn borrow(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<CanonicalPath> for PathBuf {
    fn from(path: CanonicalPath) -> Self {
        path.0
    }
}

/// Canonicalizes `path` against the current working directory.
///
/// # Errors
///
/// Returns an error if `path` is empty or the current directory cannot be
/// determined.
pub fn canonicalize(path: impl AsRef<Path>) -> Result<CanonicalPath> {
    let cwd = std::env::current_dir()?;
    canonicalize_from(path, cwd)
}

/// Canonicalizes `path`, resolving relative paths against `base`.
///
/// `base` is itself expected to be absolute; a relative base is accepted but
/// then only the lexical normalization applies to it.
///
/// # Errors
///
/// Returns an error if `path` is empty.
pub fn canonicalize_from(path: impl AsRef<Path>, base: impl AsRef<Path>) -> Result<CanonicalPath> {
    let normalized = absolute_normalized(path.as_ref(), base.as_ref())?;
    Ok(CanonicalPath(resolve_existing_prefix(normalized)))
}

/// Canonicalizes `path` against the current working directory without
/// following a symbolic link in its final component.
///
/// Symlinks in the directories leading to `path` are resolved as in
/// [`canonicalize`], but when `path` itself is a link the result names the
/// link rather than its target, the way [`std::fs::symlink_metadata`] does.
/// This is the form filesystem operations act on.
///
/// # Errors
///
/// Returns an error if `path` is empty or the current directory cannot be
/// determined.
pub fn canonicalize_entry(path: impl AsRef<Path>) -> Result<CanonicalPath> {
    let cwd = std::env::current_dir()?;
    canonicalize_entry_from(path, cwd)
}

/// Like [`canonicalize_entry`], with relative paths resolved against `base`.
///
/// # Errors
///
/// Returns an error if `path` is empty.
pub fn canonicalize_entry_from(
    path: impl AsRef<Path>,
    base: impl AsRef<Path>,
) -> Result<CanonicalPath> {
    let normalized = absolute_normalized(path.as_ref(), base.as_ref())?;
    let resolved = match (normalized.parent(), normalized.file_name()) {
        (Some(parent), Some(name)) => {
            let mut resolved = resolve_existing_prefix(parent.to_path_buf());
            resolved.push(name);
            resolved
        }
        _ => resolve_existing_prefix(normalized),
    };
    Ok(CanonicalPath(resolved))
}

fn absolute_normalized(path: &Path, base: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty path").into());
    }
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    Ok(normalize_lexically(&joined))
}

/// Returns true if the extension of `path` is one of `extensions`.
pub(crate) fn has_archive_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension().and_then(OsStr::to_str) {
        Some(ext) => extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Removes `.` segments and folds `..` segments without touching the disk.
///
/// `..` at the root stays at the root, matching how the OS treats `/..`.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// Resolves the longest existing prefix of `path` through the OS and
/// re-appends the remainder.
fn resolve_existing_prefix(path: PathBuf) -> PathBuf {
    let mut existing = path.as_path();
    let mut rest: Vec<&OsStr> = Vec::new();

    loop {
        if let Ok(mut real) = fs::canonicalize(existing) {
            for name in rest.iter().rev() {
                real.push(name);
            }
            return real;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name);
                existing = parent;
            }
            _ => break,
        }
    }

    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BASE: &str = "/zipmount-test-nonexistent";

    #[test]
    fn test_relative_joins_base() {
        let p = canonicalize_from("a/b.zip", BASE).unwrap();
        assert_eq!(p.as_path(), Path::new("/zipmount-test-nonexistent/a/b.zip"));
    }

    #[test]
    fn test_absolute_ignores_base() {
        let p = canonicalize_from("/zipmount-test-nonexistent/x.zip", "/elsewhere").unwrap();
        assert_eq!(p.as_path(), Path::new("/zipmount-test-nonexistent/x.zip"));
    }

    #[test]
    fn test_dot_segments_and_separators() {
        let expected = canonicalize_from("a/b.zip", BASE).unwrap();
        for spelling in ["a/b.zip/", "./a/b.zip", "a//b.zip", "a/c/../b.zip", "a/./b.zip//"] {
            assert_eq!(canonicalize_from(spelling, BASE).unwrap(), expected, "{}", spelling);
        }
    }

    #[test]
    fn test_parent_at_root_stays_at_root() {
        let p = canonicalize_from("/../../zipmount-test-nonexistent", "/").unwrap();
        assert_eq!(p.as_path(), Path::new("/zipmount-test-nonexistent"));
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(canonicalize_from("", BASE).is_err());
    }

    #[test]
    fn test_existing_prefix_is_resolved() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.zip"), b"").unwrap();

        let archive = canonicalize_from("a.zip", dir.path()).unwrap();
        let inner = canonicalize_from("a.zip/images/x.png", dir.path()).unwrap();

        assert_eq!(archive.as_path(), dir.path().canonicalize().unwrap().join("a.zip"));
        assert_eq!(inner.as_path(), archive.as_path().join("images/x.png"));
        assert!(inner.as_path().starts_with(archive.as_path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_same_identity() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        std::fs::write(real.join("a.zip"), b"").unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("link")).unwrap();

        let direct = canonicalize_from("real/a.zip", dir.path()).unwrap();
        let through_link = canonicalize_from("link/a.zip", dir.path()).unwrap();
        assert_eq!(direct, through_link);
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_form_keeps_final_symlink() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        std::fs::write(real.join("t.txt"), b"").unwrap();
        std::os::unix::fs::symlink(real.join("t.txt"), real.join("l.txt")).unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("link")).unwrap();
        let base = dir.path().canonicalize().unwrap();

        // The final component stays a link
        let entry = canonicalize_entry_from("real/l.txt", dir.path()).unwrap();
        assert_eq!(entry.as_path(), base.join("real/l.txt"));
        let entry = canonicalize_entry_from("link", dir.path()).unwrap();
        assert_eq!(entry.as_path(), base.join("link"));

        // Links before it are still resolved
        let entry = canonicalize_entry_from("link/l.txt", dir.path()).unwrap();
        assert_eq!(entry.as_path(), base.join("real/l.txt"));

        // The full form follows every link
        let full = canonicalize_from("link/l.txt", dir.path()).unwrap();
        assert_eq!(full.as_path(), base.join("real/t.txt"));
    }

    #[test]
    fn test_entry_form_matches_full_form_without_links() {
        for spelling in ["a/b.zip", "./a/b.zip/", "a/c/../b.zip", "/"] {
            assert_eq!(
                canonicalize_entry_from(spelling, BASE).unwrap(),
                canonicalize_from(spelling, BASE).unwrap(),
                "{}",
                spelling
            );
        }
        assert!(canonicalize_entry_from("", BASE).is_err());
    }

    #[test]
    fn test_has_extension_case_insensitive() {
        let exts = vec!["zip".to_string()];
        assert!(canonicalize_from("a.ZIP", BASE).unwrap().has_extension(&exts));
        assert!(canonicalize_from("a.zip", BASE).unwrap().has_extension(&exts));
        assert!(!canonicalize_from("a.zipx", BASE).unwrap().has_extension(&exts));
        assert!(!canonicalize_from("zip", BASE).unwrap().has_extension(&exts));
    }

    #[test]
    fn test_borrow_as_path_for_lookup() {
        use std::collections::BTreeMap;

        let key = canonicalize_from("a.zip", BASE).unwrap();
        let mut map = BTreeMap::new();
        map.insert(key, 1);
        assert_eq!(map.get(Path::new("/zipmount-test-nonexistent/a.zip")), Some(&1));
    }
}
