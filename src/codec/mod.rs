//! Archive codecs: extracting an archive into a directory and packing a
//! directory back into an archive.
//!
//! The mount registry only ever talks to a codec through the
//! [`ArchiveCodec`] trait, so any format can be mounted by plugging in an
//! implementation. The crate ships [`ZipCodec`], a ZIP implementation that
//! reads Stored and Deflate entries and writes Deflate (or Stored, when the
//! `deflate` feature is disabled).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use zipmount::codec::{ArchiveCodec, ZipCodec};
//!
//! let codec = ZipCodec::default();
//! let stats = codec.extract(Path::new("data.zip"), Path::new("./out"))?;
//! println!("{} files, {} bytes", stats.files, stats.bytes);
//!
//! codec.pack(Path::new("./out"), Path::new("copy.zip"))?;
//! # Ok::<(), zipmount::codec::CodecError>(())
//! ```

mod entry_path;
pub mod format;
mod reader;
mod timestamp;
mod writer;
mod zip;

use std::io;
use std::path::Path;

pub use entry_path::EntryPath;
pub use reader::{ZipArchive, ZipEntry};
pub use timestamp::DosDateTime;
pub use writer::{EntryMeta, ZipWriter};
pub use zip::{CompressionMethod, ZipCodec, ZipOptions};

/// Errors produced by archive codecs.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    /// An I/O error occurred while reading or writing archive data.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The data is not a valid archive of the expected format.
    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    /// An entry uses a compression method this codec cannot decode.
    #[error("Unsupported compression method {method} for entry '{path}'")]
    UnsupportedMethod {
        /// Method identifier from the entry header.
        method: u16,
        /// Entry name.
        path: String,
    },

    /// The archive uses a feature this codec does not implement.
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    /// Extracted data does not match the stored checksum or size.
    #[error("CRC mismatch for entry '{path}': expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// Entry name.
        path: String,
        /// Checksum stored in the archive.
        expected: u32,
        /// Checksum of the extracted data.
        actual: u32,
    },

    /// An entry name is unsafe or cannot be represented.
    #[error("Invalid entry path '{path}': {reason}")]
    InvalidEntryPath {
        /// The offending name.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// A specialized Result type for codec operations.
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Statistics reported by [`ArchiveCodec::extract`] and [`ArchiveCodec::pack`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecStats {
    /// Number of regular files processed.
    pub files: usize,
    /// Number of directory entries processed.
    pub directories: usize,
    /// Total uncompressed size of file data.
    pub bytes: u64,
    /// Total compressed size of file data.
    pub compressed_bytes: u64,
}

impl CodecStats {
    /// Returns the total number of entries.
    pub fn entries(&self) -> usize {
        self.files + self.directories
    }
}

/// Extracts and packs archives of one format.
///
/// Implementations must be pure with respect to their arguments: `extract`
/// writes only below `target`, and `pack` writes only to `archive`.
pub trait ArchiveCodec {
    /// Extracts every entry of `archive` into the existing directory `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `archive` is corrupt, uses unsupported features,
    /// or contains entries that would escape `target`.
    fn extract(&self, archive: &Path, target: &Path) -> CodecResult<CodecStats>;

    /// Packs the contents of directory `source` into a new archive written to
    /// `archive`, replacing whatever `archive` contained.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` cannot be read or `archive` cannot be
    /// written.
    fn pack(&self, source: &Path, archive: &Path) -> CodecResult<CodecStats>;
}

impl<C: ArchiveCodec + ?Sized> ArchiveCodec for Box<C> {
    fn extract(&self, archive: &Path, target: &Path) -> CodecResult<CodecStats> {
        (**self).extract(archive, target)
    }

    fn pack(&self, source: &Path, archive: &Path) -> CodecResult<CodecStats> {
        (**self).pack(source, archive)
    }
}
