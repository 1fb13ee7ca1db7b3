//! Flushing mounts when a registry goes away.
//!
//! Dropping a [`MountRegistry`] unloads every remaining mount, writing back
//! dirty read-write archives, unless [`MountOptions::flush_on_drop`] is off.
//! A registry owned by `main` is therefore flushed when the program returns
//! normally. Failures cannot be reported to anyone at that point; they are
//! logged, and the scratch directory of a mount that could not be written
//! back is left on disk so its contents are not lost.
//!
//! [`MountOptions::flush_on_drop`]: crate::MountOptions::flush_on_drop

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{MountRegistry, UnloadResult};
use crate::Error;
use crate::canonical::CanonicalPath;

static LIVE_REGISTRIES: AtomicUsize = AtomicUsize::new(0);

/// Returns the number of registries currently alive in this process.
pub fn live_registries() -> usize {
    LIVE_REGISTRIES.load(Ordering::SeqCst)
}

pub(crate) fn register() {
    LIVE_REGISTRIES.fetch_add(1, Ordering::SeqCst);
}

fn unregister() {
    LIVE_REGISTRIES.fetch_sub(1, Ordering::SeqCst);
}

/// A mount that could not be unloaded during shutdown.
#[derive(Debug)]
pub struct ShutdownFailure {
    /// The archive that stayed mounted.
    pub identity: CanonicalPath,
    /// Why unloading failed.
    pub error: Error,
}

/// Outcome of [`MountRegistry::shutdown`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Mounts that were unloaded.
    pub unloaded: Vec<UnloadResult>,
    /// Mounts that are still loaded because unloading failed.
    pub failures: Vec<ShutdownFailure>,
}

impl ShutdownReport {
    /// Returns true if every mount was unloaded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl MountRegistry {
    /// Unloads every mount, writing back dirty read-write archives.
    ///
    /// Unlike [`unload`](Self::unload), failures do not stop the operation:
    /// each one is logged and recorded, and the failed mount stays loaded.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        for identity in self.active_mounts() {
            match self.unload(&identity) {
                Ok(result) => report.unloaded.push(result),
                Err(error) => {
                    log::warn!("Failed to unload '{}' during shutdown: {}", identity, error);
                    report.failures.push(ShutdownFailure { identity, error });
                }
            }
        }
        report
    }
}

impl Drop for MountRegistry {
    fn drop(&mut self) {
        if !self.mounts.is_empty() {
            if self.options.flush_on_drop {
                let report = self.shutdown();
                for failure in &report.failures {
                    if let Some(entry) = self.mounts.remove(&failure.identity) {
                        let kept = entry.scratch.keep();
                        log::warn!(
                            "Changes to '{}' were not written back; kept at '{}'",
                            failure.identity,
                            kept.display()
                        );
                    }
                }
            } else {
                log::debug!(
                    "Dropping {} mounts without write-back",
                    self.mounts.len()
                );
            }
        }
        unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ArchiveCodec, CodecError, CodecResult, CodecStats, ZipCodec, ZipWriter};
    use crate::{MountMode, MountOptions};
    use std::fs::{self, File};
    use std::path::Path;
    use tempfile::TempDir;

    /// Extracts normally but refuses to pack.
    struct NoPack;

    impl ArchiveCodec for NoPack {
        fn extract(&self, archive: &Path, target: &Path) -> CodecResult<CodecStats> {
            ZipCodec::default().extract(archive, target)
        }

        fn pack(&self, _source: &Path, _archive: &Path) -> CodecResult<CodecStats> {
            Err(CodecError::UnsupportedFeature("packing"))
        }
    }

    fn empty_zip(path: &Path) {
        ZipWriter::new(File::create(path).unwrap()).finish().unwrap();
    }

    #[test]
    fn test_shutdown_unloads_everything() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.zip");
        let b = dir.path().join("b.zip");
        empty_zip(&a);
        empty_zip(&b);

        let mut reg =
            MountRegistry::with_options(MountOptions::new().scratch_root(dir.path().join("s")));
        let _ = reg.load(&a, MountMode::ReadOnly).unwrap();
        let _ = reg.load(&b, MountMode::ReadWrite).unwrap();
        reg.mark_dirty(&b).unwrap();

        let report = reg.shutdown();
        assert!(report.is_clean());
        assert_eq!(report.unloaded.len(), 2);
        assert_eq!(report.unloaded.iter().filter(|r| r.was_written()).count(), 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_shutdown_failure_keeps_mount() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.zip");
        empty_zip(&a);

        let mut reg = MountRegistry::with_codec(
            NoPack,
            MountOptions::new().scratch_root(dir.path().join("s")),
        );
        let _ = reg.load(&a, MountMode::ReadWrite).unwrap();
        reg.mark_dirty(&a).unwrap();

        let report = reg.shutdown();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].error.is_codec());
        assert!(reg.is_mounted(&a));
    }

    #[test]
    fn test_drop_keeps_scratch_of_failed_mount() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.zip");
        empty_zip(&a);

        let scratch = {
            let mut reg = MountRegistry::with_codec(
                NoPack,
                MountOptions::new().scratch_root(dir.path().join("s")),
            );
            let loaded = reg.load(&a, MountMode::ReadWrite).unwrap();
            fs::write(loaded.scratch_dir.join("keep.txt"), b"precious").unwrap();
            reg.mark_dirty(&a).unwrap();
            loaded.scratch_dir
        };

        assert_eq!(fs::read(scratch.join("keep.txt")).unwrap(), b"precious");
    }

    #[test]
    fn test_drop_without_flush_discards() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.zip");
        empty_zip(&a);
        let before = fs::read(&a).unwrap();

        let scratch = {
            let mut reg = MountRegistry::with_options(
                MountOptions::new()
                    .scratch_root(dir.path().join("s"))
                    .flush_on_drop(false),
            );
            let loaded = reg.load(&a, MountMode::ReadWrite).unwrap();
            fs::write(loaded.scratch_dir.join("new.txt"), b"x").unwrap();
            reg.mark_dirty(&a).unwrap();
            loaded.scratch_dir
        };

        assert!(!scratch.exists());
        assert_eq!(fs::read(&a).unwrap(), before);
    }

    #[test]
    fn test_live_registry_count() {
        // Other tests create registries concurrently, so only check that a
        // live registry is counted.
        let reg = MountRegistry::new();
        assert!(live_registries() >= 1);
        drop(reg);
    }
}
