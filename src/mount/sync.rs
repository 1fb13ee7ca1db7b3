//! Declarative synchronization of the mounted set.

use std::collections::BTreeSet;
use std::path::Path;

use super::{MountMode, MountRegistry};
use crate::Result;
use crate::canonical::{self, CanonicalPath};

/// What [`MountRegistry::sync`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Archives that were newly mounted.
    pub loaded: Vec<CanonicalPath>,
    /// Archives that were unmounted (and written back if dirty read-write).
    pub unloaded: Vec<CanonicalPath>,
    /// Archives that stayed mounted untouched.
    pub retained: Vec<CanonicalPath>,
}

impl SyncReport {
    /// Returns true if nothing was loaded or unloaded.
    pub fn is_noop(&self) -> bool {
        self.loaded.is_empty() && self.unloaded.is_empty()
    }
}

impl MountRegistry {
    /// Makes the mounted set exactly `targets`.
    ///
    /// Archives mounted but not listed are unloaded, listed archives not yet
    /// mounted are loaded with [`MountOptions::sync_mode`], and archives in
    /// both sets are left alone: they keep their scratch directory, mode and
    /// unsaved changes.
    ///
    /// Unloads happen before loads. The first failure stops the operation
    /// and is returned; changes made before it remain in effect.
    ///
    /// [`MountOptions::sync_mode`]: crate::MountOptions::sync_mode
    pub fn sync<I, P>(&mut self, targets: I) -> Result<SyncReport>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mode = self.options.sync_mode;
        self.sync_with_mode(targets, mode)
    }

    /// Like [`sync`](Self::sync), loading new archives with `mode`.
    pub fn sync_with_mode<I, P>(&mut self, targets: I, mode: MountMode) -> Result<SyncReport>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let target = targets
            .into_iter()
            .map(|p| canonical::canonicalize(p))
            .collect::<Result<BTreeSet<_>>>()?;
        let current = self.active_mounts();

        let mut report = SyncReport {
            retained: current.intersection(&target).cloned().collect(),
            ..SyncReport::default()
        };

        for identity in current.difference(&target) {
            let _ = self.unload(identity)?;
            report.unloaded.push(identity.clone());
        }
        for identity in target.difference(&current) {
            let loaded = self.load(identity, mode)?;
            report.loaded.push(loaded.identity);
        }

        log::debug!(
            "Sync: {} loaded, {} unloaded, {} retained",
            report.loaded.len(),
            report.unloaded.len(),
            report.retained.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MountOptions;
    use crate::codec::ZipWriter;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_sync_converges() {
        let dir = TempDir::new().unwrap();
        let [a, b, c] = ["a.zip", "b.zip", "c.zip"].map(|n| {
            let p = dir.path().join(n);
            ZipWriter::new(File::create(&p).unwrap()).finish().unwrap();
            p
        });

        let mut reg =
            MountRegistry::with_options(MountOptions::new().scratch_root(dir.path().join("s")));
        let first = reg.sync([&a, &b]).unwrap();
        assert_eq!(first.loaded.len(), 2);

        let scratch_b = reg.scratch_dir(&b).unwrap().to_path_buf();
        let report = reg.sync([&b, &c]).unwrap();

        assert_eq!(report.unloaded, [canonical::canonicalize(&a).unwrap()]);
        assert_eq!(report.loaded, [canonical::canonicalize(&c).unwrap()]);
        assert_eq!(report.retained, [canonical::canonicalize(&b).unwrap()]);
        assert_eq!(reg.scratch_dir(&b), Some(scratch_b.as_path()));
        assert_eq!(reg.mode(&c), Some(MountMode::ReadOnly));
        assert!(!reg.is_mounted(&a));

        assert!(reg.sync([&b, &c]).unwrap().is_noop());
        let cleared = reg.sync(Vec::<&Path>::new()).unwrap();
        assert_eq!(cleared.unloaded.len(), 2);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_sync_with_mode() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.zip");
        ZipWriter::new(File::create(&a).unwrap()).finish().unwrap();

        let mut reg =
            MountRegistry::with_options(MountOptions::new().scratch_root(dir.path().join("s")));
        let _ = reg.sync_with_mode([&a], MountMode::ReadWrite).unwrap();
        assert_eq!(reg.mode(&a), Some(MountMode::ReadWrite));
    }
}
