//! ZIP archive writing.

use std::fs::{self, File, Metadata};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use super::format::{
    self, CentralHeader, DataDescriptor, EndOfCentralDirectory, LocalHeader,
    VERSION_MADE_BY_UNIX, VERSION_NEEDED, flags, method,
};
use super::reader::copy_with_crc;
use super::{CodecError, CodecResult, CodecStats, CompressionMethod, DosDateTime, EntryPath, ZipOptions};

/// Entry count limit of the classic (non-ZIP64) end record.
const MAX_ENTRIES: usize = u16::MAX as usize - 1;

/// Per-entry metadata recorded in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    /// Modification time.
    pub modified: DosDateTime,
    /// Unix mode including the file type bits.
    pub unix_mode: u32,
}

impl EntryMeta {
    /// Metadata for a regular file with mode `0644` and the DOS epoch as
    /// modification time.
    pub fn file() -> Self {
        Self {
            modified: DosDateTime::default(),
            unix_mode: format::unix_mode::REGULAR | 0o644,
        }
    }

    /// Metadata for a directory with mode `0755`.
    pub fn directory() -> Self {
        Self {
            modified: DosDateTime::default(),
            unix_mode: format::unix_mode::DIRECTORY | 0o755,
        }
    }

    /// Sets the modification time.
    pub fn modified(mut self, modified: DosDateTime) -> Self {
        self.modified = modified;
        self
    }

    /// Takes modification time and permissions from filesystem metadata.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let base = if metadata.is_dir() {
            Self::directory()
        } else {
            Self::file()
        };
        let modified = metadata
            .modified()
            .map(DosDateTime::from_system_time)
            .unwrap_or_default();

        #[cfg(unix)]
        let unix_mode = {
            use std::os::unix::fs::PermissionsExt;
            (base.unix_mode & format::unix_mode::TYPE_MASK)
                | (metadata.permissions().mode() & 0o7777)
        };
        #[cfg(not(unix))]
        let unix_mode = if metadata.permissions().readonly() {
            base.unix_mode & !0o222
        } else {
            base.unix_mode
        };

        Self {
            modified,
            unix_mode,
        }
    }

    fn is_dir(&self) -> bool {
        self.unix_mode & format::unix_mode::TYPE_MASK == format::unix_mode::DIRECTORY
    }
}

/// Writes a ZIP archive entry by entry.
///
/// The output only needs [`Write`], not [`Seek`](std::io::Seek). Entries
/// added with [`add_bytes`](Self::add_bytes) are compressed in memory and
/// written with their sizes in the local header. Entries added from a reader
/// or a file are streamed, and their sizes follow the data in a data
/// descriptor.
///
/// # Example
///
/// ```rust
/// use zipmount::codec::{EntryMeta, EntryPath, ZipWriter};
///
/// let mut writer = ZipWriter::new(Vec::new());
/// writer.add_directory(&EntryPath::new("docs")?, EntryMeta::directory())?;
/// writer.add_bytes(&EntryPath::new("docs/readme.txt")?, b"hello", EntryMeta::file())?;
/// let (stats, bytes) = writer.finish()?;
/// assert_eq!(stats.files, 1);
/// assert!(!bytes.is_empty());
/// # Ok::<(), zipmount::codec::CodecError>(())
/// ```
pub struct ZipWriter<W: Write> {
    sink: CountingWriter<W>,
    options: ZipOptions,
    central: Vec<CentralHeader>,
    comment: Vec<u8>,
    stats: CodecStats,
}

impl<W: Write> ZipWriter<W> {
    /// Creates a writer with default options.
    pub fn new(sink: W) -> Self {
        Self {
            sink: CountingWriter {
                inner: sink,
                written: 0,
            },
            options: ZipOptions::default(),
            central: Vec::new(),
            comment: Vec::new(),
            stats: CodecStats::default(),
        }
    }

    /// Sets the compression options for subsequent entries.
    pub fn options(mut self, options: ZipOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the archive comment.
    pub fn comment(mut self, comment: Vec<u8>) -> Self {
        self.comment = comment;
        self
    }

    /// Adds a directory entry.
    pub fn add_directory(&mut self, path: &EntryPath, meta: EntryMeta) -> CodecResult<()> {
        let meta = EntryMeta {
            unix_mode: format::unix_mode::DIRECTORY | (meta.unix_mode & 0o7777),
            ..meta
        };
        self.write_entry(path, &[], method::STORED, 0, 0, meta)?;
        self.stats.directories += 1;
        Ok(())
    }

    /// Adds a file entry with the given contents.
    pub fn add_bytes(&mut self, path: &EntryPath, data: &[u8], meta: EntryMeta) -> CodecResult<()> {
        let crc = crc32fast::hash(data);
        let compressed = compress(data, &self.options)?;
        let (method, payload) = match compressed.as_deref() {
            Some(packed) if packed.len() < data.len() => (method::DEFLATE, packed),
            _ => (method::STORED, data),
        };

        self.write_entry(path, payload, method, crc, data.len(), meta)?;
        self.stats.files += 1;
        self.stats.bytes += data.len() as u64;
        self.stats.compressed_bytes += payload.len() as u64;
        Ok(())
    }

    /// Adds a file entry whose contents are streamed from `reader`.
    ///
    /// Memory use does not depend on the entry size. With Deflate enabled the
    /// entry is always compressed, even when that does not make it smaller.
    pub fn add_reader<R: Read>(
        &mut self,
        path: &EntryPath,
        reader: R,
        meta: EntryMeta,
    ) -> CodecResult<()> {
        if self.central.len() >= MAX_ENTRIES {
            return Err(CodecError::UnsupportedFeature("ZIP64"));
        }
        let name = path.stored_name(false).into_bytes();
        let offset = self.offset32()?;
        let entry_flags = flags::UTF8 | flags::DATA_DESCRIPTOR;
        let method = stream_method(&self.options);

        LocalHeader {
            flags: entry_flags,
            method,
            modified: meta.modified,
            crc32: 0,
            compressed_size: 0,
            size: 0,
            name: name.clone(),
        }
        .write(&mut self.sink)?;

        let data_start = self.sink.written;
        let (size, crc32) = stream_entry(reader, &mut self.sink, method, &self.options)?;
        let compressed = self.sink.written - data_start;

        let size = u32::try_from(size).map_err(|_| CodecError::UnsupportedFeature("ZIP64"))?;
        let compressed_size =
            u32::try_from(compressed).map_err(|_| CodecError::UnsupportedFeature("ZIP64"))?;
        DataDescriptor {
            crc32,
            compressed_size,
            size,
        }
        .write(&mut self.sink)?;

        self.central.push(CentralHeader {
            version_made_by: VERSION_MADE_BY_UNIX,
            version_needed: VERSION_NEEDED,
            flags: entry_flags,
            method,
            modified: meta.modified,
            crc32,
            compressed_size,
            size,
            disk_start: 0,
            internal_attributes: 0,
            external_attributes: meta.unix_mode << 16,
            local_header_offset: offset,
            name,
            extra: Vec::new(),
            comment: Vec::new(),
        });
        self.stats.files += 1;
        self.stats.bytes += u64::from(size);
        self.stats.compressed_bytes += compressed;
        Ok(())
    }

    /// Adds a file or directory from the filesystem.
    ///
    /// Symbolic links are followed; the link target's contents are stored.
    /// File contents are streamed, see [`add_reader`](Self::add_reader).
    pub fn add_path(&mut self, source: &Path, path: &EntryPath) -> CodecResult<()> {
        let metadata = fs::metadata(source)?;
        let meta = EntryMeta::from_metadata(&metadata);
        if metadata.is_dir() {
            return self.add_directory(path, meta);
        }

        if metadata.len() > u64::from(u32::MAX) {
            return Err(CodecError::UnsupportedFeature("ZIP64"));
        }
        if metadata.len() == 0 {
            return self.add_bytes(path, &[], meta);
        }
        let file = BufReader::new(File::open(source)?);
        self.add_reader(path, file, meta)
    }

    /// Writes the central directory and end record.
    ///
    /// Returns the accumulated statistics and the underlying writer.
    pub fn finish(mut self) -> CodecResult<(CodecStats, W)> {
        if self.comment.len() > u16::MAX as usize {
            return Err(CodecError::InvalidFormat("archive comment too long".into()));
        }
        let cd_offset = self.offset32()?;
        for header in &self.central {
            header.write(&mut self.sink)?;
        }
        let cd_size = u32::try_from(self.sink.written - u64::from(cd_offset))
            .map_err(|_| CodecError::UnsupportedFeature("ZIP64"))?;

        let count = self.central.len() as u16;
        EndOfCentralDirectory {
            disk_number: 0,
            central_directory_disk: 0,
            entries_on_disk: count,
            total_entries: count,
            central_directory_size: cd_size,
            central_directory_offset: cd_offset,
            comment: std::mem::take(&mut self.comment),
        }
        .write(&mut self.sink)?;

        self.sink.flush()?;
        Ok((self.stats, self.sink.inner))
    }

    fn write_entry(
        &mut self,
        path: &EntryPath,
        payload: &[u8],
        method: u16,
        crc32: u32,
        size: usize,
        meta: EntryMeta,
    ) -> CodecResult<()> {
        if self.central.len() >= MAX_ENTRIES {
            return Err(CodecError::UnsupportedFeature("ZIP64"));
        }
        let size = u32::try_from(size).map_err(|_| CodecError::UnsupportedFeature("ZIP64"))?;
        let compressed_size =
            u32::try_from(payload.len()).map_err(|_| CodecError::UnsupportedFeature("ZIP64"))?;
        let is_dir = meta.is_dir();
        let name = path.stored_name(is_dir).into_bytes();
        let offset = self.offset32()?;

        LocalHeader {
            flags: flags::UTF8,
            method,
            modified: meta.modified,
            crc32,
            compressed_size,
            size,
            name: name.clone(),
        }
        .write(&mut self.sink)?;
        self.sink.write_all(payload)?;

        let mut external_attributes = meta.unix_mode << 16;
        if is_dir {
            external_attributes |= format::DOS_DIRECTORY_ATTRIBUTE;
        }

        self.central.push(CentralHeader {
            version_made_by: VERSION_MADE_BY_UNIX,
            version_needed: VERSION_NEEDED,
            flags: flags::UTF8,
            method,
            modified: meta.modified,
            crc32,
            compressed_size,
            size,
            disk_start: 0,
            internal_attributes: 0,
            external_attributes,
            local_header_offset: offset,
            name,
            extra: Vec::new(),
            comment: Vec::new(),
        });
        Ok(())
    }

    fn offset32(&self) -> CodecResult<u32> {
        u32::try_from(self.sink.written).map_err(|_| CodecError::UnsupportedFeature("ZIP64"))
    }
}

/// Compresses `data` according to `options`.
///
/// Returns `None` when the entry should be stored.
#[cfg(feature = "deflate")]
fn compress(data: &[u8], options: &ZipOptions) -> io::Result<Option<Vec<u8>>> {
    use flate2::Compression;
    use flate2::write::DeflateEncoder;

    if options.method != CompressionMethod::Deflate || data.is_empty() {
        return Ok(None);
    }
    let mut encoder = DeflateEncoder::new(
        Vec::with_capacity(data.len() / 2),
        Compression::new(options.level),
    );
    encoder.write_all(data)?;
    encoder.finish().map(Some)
}

#[cfg(not(feature = "deflate"))]
fn compress(_data: &[u8], options: &ZipOptions) -> io::Result<Option<Vec<u8>>> {
    if options.method == CompressionMethod::Deflate {
        log::debug!("Deflate support is disabled, storing entry uncompressed");
    }
    Ok(None)
}

/// Method used for streamed entries.
fn stream_method(options: &ZipOptions) -> u16 {
    if cfg!(feature = "deflate") && options.method == CompressionMethod::Deflate {
        method::DEFLATE
    } else {
        method::STORED
    }
}

/// Copies `reader` into `sink` with `method`.
///
/// Returns the uncompressed length and its CRC-32.
#[cfg(feature = "deflate")]
fn stream_entry<R: Read, W: Write>(
    reader: R,
    sink: &mut W,
    method: u16,
    options: &ZipOptions,
) -> io::Result<(u64, u32)> {
    use flate2::Compression;
    use flate2::write::DeflateEncoder;

    if method != method::DEFLATE {
        return copy_with_crc(reader, sink);
    }
    let mut encoder = DeflateEncoder::new(sink, Compression::new(options.level));
    let result = copy_with_crc(reader, &mut encoder)?;
    encoder.finish()?;
    Ok(result)
}

#[cfg(not(feature = "deflate"))]
fn stream_entry<R: Read, W: Write>(
    reader: R,
    sink: &mut W,
    _method: u16,
    _options: &ZipOptions,
) -> io::Result<(u64, u32)> {
    copy_with_crc(reader, sink)
}

/// Tracks the number of bytes written so header offsets are known without
/// seeking.
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
