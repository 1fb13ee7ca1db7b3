//! The default ZIP codec.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use walkdir::WalkDir;

use super::{ArchiveCodec, CodecResult, CodecStats, EntryPath, ZipArchive, ZipWriter};

/// Compression method used when writing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompressionMethod {
    /// No compression.
    Stored,
    /// Deflate. Requires the `deflate` feature; without it entries are stored.
    Deflate,
}

/// Options for writing ZIP archives.
///
/// # Example
///
/// ```rust
/// use zipmount::codec::{CompressionMethod, ZipCodec, ZipOptions};
///
/// let options = ZipOptions::new().method(CompressionMethod::Deflate).level(9);
/// let codec = ZipCodec::new(options);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipOptions {
    /// Compression method for file entries.
    pub method: CompressionMethod,
    /// Compression level (0-9).
    pub level: u32,
}

impl Default for ZipOptions {
    fn default() -> Self {
        Self {
            method: if cfg!(feature = "deflate") {
                CompressionMethod::Deflate
            } else {
                CompressionMethod::Stored
            },
            level: 6,
        }
    }
}

impl ZipOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that store every entry uncompressed.
    pub fn stored() -> Self {
        Self {
            method: CompressionMethod::Stored,
            level: 0,
        }
    }

    /// Sets the compression method.
    pub fn method(mut self, method: CompressionMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets the compression level, clamped to 0-9.
    pub fn level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }
}

/// [`ArchiveCodec`] for ZIP archives.
#[derive(Debug, Clone, Default)]
pub struct ZipCodec {
    options: ZipOptions,
}

impl ZipCodec {
    /// Creates a codec writing with `options`.
    pub fn new(options: ZipOptions) -> Self {
        Self { options }
    }

    /// Returns the write options.
    pub fn options(&self) -> &ZipOptions {
        &self.options
    }
}

impl ArchiveCodec for ZipCodec {
    fn extract(&self, archive: &Path, target: &Path) -> CodecResult<CodecStats> {
        let file = BufReader::new(File::open(archive)?);
        let mut zip = ZipArchive::new(file)?;
        let stats = zip.extract(target)?;
        log::debug!(
            "Extracted {} entries ({} bytes) from '{}'",
            stats.entries(),
            stats.bytes,
            archive.display()
        );
        Ok(stats)
    }

    fn pack(&self, source: &Path, archive: &Path) -> CodecResult<CodecStats> {
        let file = File::create(archive)?;
        let mut writer = ZipWriter::new(BufWriter::new(file)).options(self.options);

        let walker = WalkDir::new(source)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            let relative = entry.path().strip_prefix(source).map_err(|_| {
                std::io::Error::other(format!(
                    "walked path '{}' is outside '{}'",
                    entry.path().display(),
                    source.display()
                ))
            })?;
            let name = EntryPath::from_relative(relative)?;
            let file_type = entry.file_type();

            if file_type.is_dir() || file_type.is_file() {
                writer.add_path(entry.path(), &name)?;
            } else if file_type.is_symlink() && entry.path().is_file() {
                writer.add_path(entry.path(), &name)?;
            } else {
                log::warn!(
                    "Skipping '{}': not a regular file or directory",
                    entry.path().display()
                );
            }
        }

        let (stats, buffered) = writer.finish()?;
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        log::debug!(
            "Packed {} entries ({} -> {} bytes) into '{}'",
            stats.entries(),
            stats.bytes,
            stats.compressed_bytes,
            archive.display()
        );
        Ok(stats)
    }
}
