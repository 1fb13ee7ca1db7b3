//! Configuration for [`MountRegistry`](crate::MountRegistry).

use std::path::{Path, PathBuf};

use super::MountMode;

/// What [`discover_and_load`](crate::MountRegistry::discover_and_load) does
/// when an archive found during the walk cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoverPolicy {
    /// Record the failure in the report and keep walking.
    #[default]
    SkipAndContinue,
    /// Stop at the first failure and return it.
    Abort,
}

/// Options controlling how a registry mounts archives.
///
/// # Example
///
/// ```rust
/// use zipmount::{DiscoverPolicy, MountMode, MountOptions};
///
/// let options = MountOptions::new()
///     .extensions(["zip", "jar"])
///     .sync_mode(MountMode::ReadWrite)
///     .discover_policy(DiscoverPolicy::Abort);
/// assert!(options.is_archive_name("lib.JAR".as_ref()));
/// ```
#[derive(Debug, Clone)]
pub struct MountOptions {
    /// File extensions recognized as archives, without the dot.
    ///
    /// Matching is ASCII case-insensitive. Default: `["zip"]`.
    pub extensions: Vec<String>,

    /// Directory in which scratch directories are created.
    ///
    /// Default: `None` (the OS temporary directory).
    pub scratch_root: Option<PathBuf>,

    /// Prefix of scratch directory names. Default: `"zipmount-"`.
    pub scratch_prefix: String,

    /// Mode used for archives loaded by [`sync`](crate::MountRegistry::sync).
    ///
    /// Default: [`MountMode::ReadOnly`].
    pub sync_mode: MountMode,

    /// Failure handling during discovery.
    ///
    /// Default: [`DiscoverPolicy::SkipAndContinue`].
    pub discover_policy: DiscoverPolicy,

    /// Whether dropping the registry unloads every mount, writing back
    /// dirty read-write archives. Default: `true`.
    ///
    /// When disabled, dropping the registry deletes scratch directories
    /// without writing anything back.
    pub flush_on_drop: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["zip".to_string()],
            scratch_root: None,
            scratch_prefix: "zipmount-".to_string(),
            sync_mode: MountMode::ReadOnly,
            discover_policy: DiscoverPolicy::SkipAndContinue,
            flush_on_drop: true,
        }
    }
}

impl MountOptions {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the recognized archive extensions.
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    /// Sets the directory for scratch directories.
    pub fn scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Sets the scratch directory name prefix.
    pub fn scratch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scratch_prefix = prefix.into();
        self
    }

    /// Sets the mode for archives loaded by sync.
    pub fn sync_mode(mut self, mode: MountMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Sets the discovery failure policy.
    pub fn discover_policy(mut self, policy: DiscoverPolicy) -> Self {
        self.discover_policy = policy;
        self
    }

    /// Sets whether dropping the registry flushes mounts.
    pub fn flush_on_drop(mut self, flush: bool) -> Self {
        self.flush_on_drop = flush;
        self
    }

    /// Returns true if `path` has one of the archive extensions.
    pub fn is_archive_name(&self, path: &Path) -> bool {
        crate::canonical::has_archive_extension(path, &self.extensions)
    }

    pub(crate) fn scratch_root_or_default(&self) -> PathBuf {
        self.scratch_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = MountOptions::default();
        assert_eq!(options.extensions, ["zip"]);
        assert_eq!(options.sync_mode, MountMode::ReadOnly);
        assert_eq!(options.discover_policy, DiscoverPolicy::SkipAndContinue);
        assert!(options.flush_on_drop);
        assert_eq!(options.scratch_root_or_default(), std::env::temp_dir());
    }

    #[test]
    fn test_extensions_strip_leading_dot() {
        let options = MountOptions::new().extensions([".zip", "cbz"]);
        assert_eq!(options.extensions, ["zip", "cbz"]);
        assert!(options.is_archive_name(Path::new("comic.CBZ")));
        assert!(!options.is_archive_name(Path::new("notes.txt")));
    }
}
