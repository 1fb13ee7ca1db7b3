//! # zipmount
//!
//! Mount archives as ordinary directories for the duration of a session.
//!
//! Loading an archive extracts it into a private scratch directory. From then
//! on, paths that start with the archive's own path (`data.zip/images/a.png`)
//! resolve into that directory, so the contents can be read, written, listed
//! and removed with ordinary file operations, or handed to any library that
//! accepts a path or a [`File`](std::fs::File). Unloading a read-write mount
//! packs the scratch directory back into the archive in one atomic step.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zipmount::{MountMode, MountRegistry, Result, fs};
//!
//! fn main() -> Result<()> {
//!     let mut registry = MountRegistry::new();
//!     registry.load("dataset.zip", MountMode::ReadWrite)?;
//!
//!     // Read and modify archive contents through virtual paths
//!     let csv = fs::read_to_string(&registry, "dataset.zip/train.csv")?;
//!     fs::write(&mut registry, "dataset.zip/train.csv", csv.to_uppercase())?;
//!
//!     // Or resolve to a real path for code that does its own I/O
//!     let resolved = registry.resolve("dataset.zip/images")?;
//!     println!("images live in {}", resolved.physical.display());
//!
//!     // Write the changes back into dataset.zip
//!     registry.unload("dataset.zip")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Bulk Operations
//!
//! [`MountRegistry::sync`] makes the mounted set match a list of archives,
//! loading and unloading only the difference. [`MountRegistry::discover_and_load`]
//! walks a directory tree and mounts every archive it finds, read-only.
//!
//! ```rust,no_run
//! use zipmount::MountRegistry;
//!
//! let mut registry = MountRegistry::new();
//! let report = registry.discover_and_load("./archives")?;
//! for failure in &report.failures {
//!     eprintln!("skipped {}: {}", failure.path.display(), failure.error);
//! }
//!
//! // Keep b.zip mounted, drop everything else, mount c.zip
//! registry.sync(["./archives/b.zip", "./c.zip"])?;
//! # Ok::<(), zipmount::Error>(())
//! ```
//!
//! ## Lifetime
//!
//! A [`MountRegistry`] owns its scratch directories. Dropping it unloads every
//! remaining mount and writes back dirty read-write archives (configurable
//! with [`MountOptions::flush_on_drop`]).
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `deflate` | Yes | Deflate compression for ZIP entries |
//!
//! Without `deflate`, only Stored entries can be read and archives are
//! written uncompressed.
//!
//! ## Limitations
//!
//! Registries are process-local. When two processes mount the same archive
//! read-write, the last one to unload overwrites the other's changes.
//!
//! The bundled [`ZipCodec`] does not implement ZIP64. Archives larger than
//! 4 GiB, with an entry larger than 4 GiB, or with 65,535 entries or more
//! fail to load with [`CodecError::UnsupportedFeature`], and a scratch
//! directory that outgrows these limits fails to write back (the original
//! archive is kept). Entry data is streamed in both directions, so memory
//! use does not grow with entry size.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Default buffer size for read operations (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod canonical;
pub mod codec;
pub mod error;
pub mod fs;
pub mod mount;

pub use canonical::{CanonicalPath, canonicalize};
pub use codec::{ArchiveCodec, CodecError, CodecStats, ZipCodec, ZipOptions};
pub use error::{Error, Result};
pub use mount::shutdown::live_registries;
pub use mount::{
    DiscoverFailure, DiscoverPolicy, DiscoverReport, LoadResult, MountEntry, MountInfo,
    MountMode, MountOptions, MountRegistry, MountState, OpenMode, Resolved, ShutdownFailure,
    ShutdownReport, SyncReport, UnloadResult,
};
