//! Validated entry names for secure extraction.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use super::{CodecError, CodecResult};

/// Maximum length for entry names (in bytes).
///
/// The ZIP format stores name lengths in 16 bits.
const MAX_NAME_LENGTH: usize = u16::MAX as usize;

/// A validated, `/`-separated path of an entry inside an archive.
///
/// `EntryPath` guarantees that joining it onto an extraction directory never
/// escapes that directory:
/// - No NUL bytes are present
/// - The path is not absolute (no leading `/`, no drive letter)
/// - No empty segments exist (no `//`)
/// - No `.` or `..` segments are present
///
/// Backslashes written by some Windows archivers are normalized to `/`.
/// Directory entries carry a trailing `/` in the archive; that marker is not
/// part of the `EntryPath` and is reported separately by [`EntryPath::parse`].
///
/// # Examples
///
/// ```
/// use zipmount::codec::EntryPath;
///
/// let path = EntryPath::new("dir/file.txt").unwrap();
/// assert_eq!(path.as_str(), "dir/file.txt");
///
/// assert!(EntryPath::new("../secret").is_err());
/// assert!(EntryPath::new("/absolute/path").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryPath(String);

impl EntryPath {
    /// Creates a new `EntryPath`, normalizing separators and validating it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidEntryPath`] if the path is empty, too long,
    /// absolute, contains NUL bytes, empty segments, `.` or `..`.
    pub fn new(s: &str) -> CodecResult<Self> {
        let normalized = s.replace('\\', "/");
        validate(&normalized)?;
        Ok(Self(normalized))
    }

    /// Parses a raw entry name as stored in an archive.
    ///
    /// Returns the validated path and whether the name denoted a directory
    /// (had a trailing separator).
    pub fn parse(raw: &str) -> CodecResult<(Self, bool)> {
        let normalized = raw.replace('\\', "/");
        let is_dir = normalized.ends_with('/');
        let trimmed = normalized.trim_end_matches('/');
        validate(trimmed).map_err(|e| match e {
            CodecError::InvalidEntryPath { reason, .. } => CodecError::InvalidEntryPath {
                path: raw.to_string(),
                reason,
            },
            other => other,
        })?;
        Ok((Self(trimmed.to_string()), is_dir))
    }

    /// Builds an entry path from a relative filesystem path.
    ///
    /// Used when packing a directory: `relative` is the path of a file
    /// relative to the directory being packed.
    ///
    /// # Errors
    ///
    /// Returns an error if `relative` is not valid UTF-8 or is not a plain
    /// relative path.
    pub fn from_relative(relative: &Path) -> CodecResult<Self> {
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => match name.to_str() {
                    Some(name) => segments.push(name),
                    None => {
                        return Err(CodecError::InvalidEntryPath {
                            path: relative.to_string_lossy().into_owned(),
                            reason: "not valid UTF-8",
                        });
                    }
                },
                Component::CurDir => {}
                _ => {
                    return Err(CodecError::InvalidEntryPath {
                        path: relative.to_string_lossy().into_owned(),
                        reason: "not a plain relative path",
                    });
                }
            }
        }
        let joined = segments.join("/");
        validate(&joined)?;
        Ok(Self(joined))
    }

    /// Returns the path as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name as it is stored in an archive: directories get a
    /// trailing `/`.
    pub fn stored_name(&self, is_dir: bool) -> String {
        if is_dir {
            format!("{}/", self.0)
        } else {
            self.0.clone()
        }
    }

    /// Returns the file name (last segment) of this path.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Joins the segments onto `base` using native separators.
    pub fn to_native(&self, base: &Path) -> PathBuf {
        let mut out = base.to_path_buf();
        for segment in self.0.split('/') {
            out.push(segment);
        }
        out
    }
}

impl AsRef<str> for EntryPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate(s: &str) -> CodecResult<()> {
    let invalid = |reason| {
        Err(CodecError::InvalidEntryPath {
            path: s.to_string(),
            reason,
        })
    };

    if s.is_empty() {
        return invalid("empty path");
    }
    if s.len() > MAX_NAME_LENGTH {
        return invalid("path exceeds maximum length");
    }
    if s.contains('\0') {
        return invalid("contains NUL byte");
    }
    if s.starts_with('/') {
        return invalid("absolute path not allowed");
    }
    // Drive-relative names such as `C:foo` or `C:/foo`
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return invalid("drive prefix not allowed");
    }

    for segment in s.split('/') {
        match segment {
            "" => return invalid("empty segment (consecutive slashes)"),
            "." => return invalid("'.' segment not allowed"),
            ".." => return invalid("'..' segment not allowed (path traversal)"),
            _ => {}
        }
    }

    Ok(())
}
