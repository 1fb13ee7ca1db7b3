//! Error types for mount operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes of the mount registry, the path resolver and the
//! filesystem facade, along with a convenient [`Result<T>`] type alias.
//!
//! Archive format failures are reported by the codec as
//! [`CodecError`](crate::codec::CodecError) and wrapped in [`Error::Codec`]
//! together with the archive they occurred in.
//!
//! # Example
//!
//! ```rust,no_run
//! use zipmount::{Error, MountMode, MountRegistry};
//!
//! let mut registry = MountRegistry::new();
//! match registry.load("data.zip", MountMode::ReadOnly) {
//!     Ok(_) => {}
//!     Err(Error::ArchiveNotFound { path }) => eprintln!("missing: {}", path.display()),
//!     Err(Error::AlreadyMounted { .. }) => {}
//!     Err(Error::Codec { archive, source }) => {
//!         eprintln!("{} is not a usable archive: {}", archive.display(), source);
//!     }
//!     Err(e) => eprintln!("error: {}", e),
//! }
//! ```

use std::io;
use std::path::PathBuf;

use crate::codec::CodecError;

/// The main error type for mount operations.
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | Lifecycle | [`ArchiveNotFound`][Self::ArchiveNotFound], [`ArchiveExists`][Self::ArchiveExists], [`AlreadyMounted`][Self::AlreadyMounted], [`NotMounted`][Self::NotMounted] | Calling load/unload out of order |
/// | Resolution | [`PathResolution`][Self::PathResolution] | Addressing the inside of an archive that is not loaded |
/// | Format | [`Codec`][Self::Codec] | Corrupt archive, failed write-back |
/// | I/O | [`Io`][Self::Io] | Scratch directory or facade operations |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred on the real filesystem or inside a scratch directory.
    ///
    /// Facade operations surface the underlying [`io::Error`] unchanged
    /// through this variant.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive file does not exist at load time.
    #[error("Archive not found: {}", path.display())]
    ArchiveNotFound {
        /// Canonical path of the missing archive.
        path: PathBuf,
    },

    /// An archive was to be created but a file already exists at that path.
    #[error("Archive already exists: {}", path.display())]
    ArchiveExists {
        /// Canonical path of the existing file.
        path: PathBuf,
    },

    /// The archive is already loaded in this registry.
    ///
    /// Loading twice would either discard uncommitted changes or leave two
    /// scratch copies of the same archive, so it is rejected.
    #[error("Archive is already mounted: {}", path.display())]
    AlreadyMounted {
        /// Canonical identity of the mounted archive.
        path: PathBuf,
    },

    /// The archive has no active mount in this registry.
    #[error("Archive is not mounted: {}", path.display())]
    NotMounted {
        /// Canonical identity that was looked up.
        path: PathBuf,
    },

    /// Extracting or packing an archive failed.
    ///
    /// When this is returned from an unload, the original archive file is
    /// unchanged and the mount stays loaded, so the unload may be retried.
    #[error("Archive codec failed for {}: {source}", archive.display())]
    Codec {
        /// Canonical path of the archive being extracted or packed.
        archive: PathBuf,
        /// Underlying codec failure.
        #[source]
        source: CodecError,
    },

    /// A path points inside an archive that is not loaded.
    ///
    /// The path is neither under an active mount nor a valid real path
    /// (the archive component is a file, not a directory).
    #[error("Path {} is inside archive {} which is not mounted", path.display(), archive.display())]
    PathResolution {
        /// The path as given by the caller.
        path: PathBuf,
        /// The archive component of the path.
        archive: PathBuf,
    },
}

/// A specialized Result type for mount operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error came from the archive codec.
    pub fn is_codec(&self) -> bool {
        matches!(self, Self::Codec { .. })
    }

    /// Returns true if this is a lifecycle error (mount state mismatch).
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::ArchiveNotFound { .. }
                | Self::ArchiveExists { .. }
                | Self::AlreadyMounted { .. }
                | Self::NotMounted { .. }
        )
    }
}
