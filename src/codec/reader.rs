//! ZIP archive reading and extraction.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::format::{
    self, CentralHeader, EOCD_SIGNATURE, EOCD_SIZE, EndOfCentralDirectory, LocalHeader,
    ZIP64_LOCATOR_SIGNATURE, ZIP64_LOCATOR_SIZE, flags, method, unix_mode,
};
use super::{CodecError, CodecResult, CodecStats, DosDateTime, EntryPath};
use crate::READ_BUFFER_SIZE;

/// Largest possible distance of the end of central directory record from
/// the end of the file (fixed record plus a maximal comment).
const MAX_EOCD_SEARCH: u64 = EOCD_SIZE as u64 + u16::MAX as u64;

/// An entry of a ZIP archive, as described by the central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Validated entry path.
    pub path: EntryPath,
    /// Whether this is a directory entry.
    pub is_dir: bool,
    /// Compression method.
    pub method: u16,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size in bytes.
    pub compressed_size: u64,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: DosDateTime,
    /// Unix mode bits, if the entry was written on a Unix host.
    pub unix_mode: Option<u32>,
    /// Whether the entry is encrypted.
    pub is_encrypted: bool,
    header_offset: u64,
}

impl ZipEntry {
    /// Returns true if the entry is a symbolic link.
    ///
    /// Links are extracted as regular files holding the link target, so a
    /// mounted archive never points outside its scratch directory.
    pub fn is_symlink(&self) -> bool {
        self.unix_mode
            .is_some_and(|mode| mode & unix_mode::TYPE_MASK == unix_mode::SYMLINK)
    }
}

/// A ZIP archive opened for reading.
///
/// Opening parses the central directory; entry data is only read by
/// [`extract`](Self::extract).
///
/// # Example
///
/// ```rust,no_run
/// use std::fs::File;
/// use std::io::BufReader;
/// use zipmount::codec::ZipArchive;
///
/// let file = BufReader::new(File::open("data.zip")?);
/// let mut archive = ZipArchive::new(file)?;
/// for entry in archive.entries() {
///     println!("{} ({} bytes)", entry.path, entry.size);
/// }
/// archive.extract("./out".as_ref())?;
/// # Ok::<(), zipmount::codec::CodecError>(())
/// ```
pub struct ZipArchive<R> {
    reader: R,
    entries: Vec<ZipEntry>,
    comment: Vec<u8>,
}

impl<R> std::fmt::Debug for ZipArchive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipArchive")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Opens an archive by reading its central directory.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidFormat`] if no valid end of central
    /// directory record is found or the directory is inconsistent,
    /// [`CodecError::UnsupportedFeature`] for ZIP64 and multi-disk archives,
    /// and [`CodecError::InvalidEntryPath`] for unsafe entry names.
    pub fn new(mut reader: R) -> CodecResult<Self> {
        let (eocd_offset, eocd) = find_end_of_central_directory(&mut reader)?;

        if eocd.disk_number != 0 || eocd.central_directory_disk != 0 {
            return Err(CodecError::UnsupportedFeature("multi-disk archives"));
        }
        if eocd.needs_zip64() {
            return Err(CodecError::UnsupportedFeature("ZIP64"));
        }

        let cd_offset = u64::from(eocd.central_directory_offset);
        let cd_end = cd_offset + u64::from(eocd.central_directory_size);
        if cd_end > eocd_offset {
            return Err(CodecError::InvalidFormat(format!(
                "central directory ({}..{}) overlaps end record at {}",
                cd_offset, cd_end, eocd_offset
            )));
        }

        reader.seek(SeekFrom::Start(cd_offset))?;
        let mut entries = Vec::with_capacity(eocd.total_entries as usize);
        for idx in 0..eocd.total_entries {
            let header = CentralHeader::read(&mut reader).map_err(|e| {
                CodecError::InvalidFormat(format!("central directory entry {}: {}", idx, e))
            })?;
            entries.push(entry_from_header(&header)?);
        }

        Ok(Self {
            reader,
            entries,
            comment: eocd.comment,
        })
    }

    /// Returns the entries in central directory order.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the archive comment.
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Reads the uncompressed data of the entry at `index` into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of range, the entry is a
    /// directory, or decoding fails.
    pub fn read_entry(&mut self, index: usize) -> CodecResult<Vec<u8>> {
        let entry = self
            .entries
            .get(index)
            .cloned()
            .ok_or_else(|| CodecError::InvalidFormat(format!("no entry at index {}", index)))?;
        let mut data = Vec::with_capacity(entry.size.min(1 << 20) as usize);
        self.decode_entry(&entry, &mut data)?;
        Ok(data)
    }

    /// Extracts every entry into `dest`, creating it if needed.
    ///
    /// Files get their modification time restored and, for archives written
    /// on Unix, their permission bits (owner read/write is always kept so
    /// extracted content stays editable).
    pub fn extract(&mut self, dest: &Path) -> CodecResult<CodecStats> {
        fs::create_dir_all(dest)?;
        let mut stats = CodecStats::default();

        for idx in 0..self.entries.len() {
            let entry = self.entries[idx].clone();
            let target = entry.path.to_native(dest);

            if entry.is_dir {
                fs::create_dir_all(&target)?;
                stats.directories += 1;
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut out = BufWriter::new(File::create(&target)?);
            self.decode_entry(&entry, &mut out)?;
            out.into_inner().map_err(|e| e.into_error())?;

            restore_metadata(&target, &entry);
            stats.files += 1;
            stats.bytes += entry.size;
            stats.compressed_bytes += entry.compressed_size;
        }

        Ok(stats)
    }

    /// Decodes one entry into `out`, verifying size and CRC.
    fn decode_entry<W: Write>(&mut self, entry: &ZipEntry, out: &mut W) -> CodecResult<()> {
        if entry.is_dir {
            return Err(CodecError::InvalidFormat(format!(
                "'{}' is a directory entry",
                entry.path
            )));
        }
        if entry.is_encrypted {
            return Err(CodecError::UnsupportedFeature("encrypted entries"));
        }

        self.reader.seek(SeekFrom::Start(entry.header_offset))?;
        LocalHeader::read_skip(&mut self.reader).map_err(|e| {
            CodecError::InvalidFormat(format!("local header of '{}': {}", entry.path, e))
        })?;

        let packed = (&mut self.reader).take(entry.compressed_size);
        // One byte of slack so an oversized stream is detected rather than truncated.
        let limit = entry.size + 1;
        let (written, crc) = match entry.method {
            method::STORED => copy_with_crc(packed.take(limit), out)?,
            method::DEFLATE => inflate_with_crc(packed, limit, out, entry)?,
            other => {
                return Err(CodecError::UnsupportedMethod {
                    method: other,
                    path: entry.path.to_string(),
                });
            }
        };

        if written != entry.size {
            return Err(CodecError::InvalidFormat(format!(
                "entry '{}' decoded to {} bytes, expected {}",
                entry.path, written, entry.size
            )));
        }
        if crc != entry.crc32 {
            return Err(CodecError::CrcMismatch {
                path: entry.path.to_string(),
                expected: entry.crc32,
                actual: crc,
            });
        }
        Ok(())
    }
}

#[cfg(feature = "deflate")]
fn inflate_with_crc<R: Read, W: Write>(
    packed: R,
    limit: u64,
    out: &mut W,
    _entry: &ZipEntry,
) -> CodecResult<(u64, u32)> {
    let decoder = flate2::read::DeflateDecoder::new(packed);
    Ok(copy_with_crc(decoder.take(limit), out)?)
}

#[cfg(not(feature = "deflate"))]
fn inflate_with_crc<R: Read, W: Write>(
    _packed: R,
    _limit: u64,
    _out: &mut W,
    entry: &ZipEntry,
) -> CodecResult<(u64, u32)> {
    Err(CodecError::UnsupportedMethod {
        method: method::DEFLATE,
        path: entry.path.to_string(),
    })
}

/// Copies `src` into `dst`, returning the byte count and CRC-32.
pub(super) fn copy_with_crc<R: Read, W: Write>(mut src: R, dst: &mut W) -> io::Result<(u64, u32)> {
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        dst.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok((total, hasher.finalize()))
}

/// Locates and parses the end of central directory record.
///
/// Returns the record's offset together with the record.
fn find_end_of_central_directory<R: Read + Seek>(
    reader: &mut R,
) -> CodecResult<(u64, EndOfCentralDirectory)> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    if file_len < EOCD_SIZE as u64 {
        return Err(CodecError::InvalidFormat(format!(
            "file is too small ({} bytes) to be a ZIP archive",
            file_len
        )));
    }

    let window = file_len.min(MAX_EOCD_SEARCH);
    let start = file_len - window;
    reader.seek(SeekFrom::Start(start))?;
    let mut tail = vec![0u8; window as usize];
    reader.read_exact(&mut tail)?;

    let signature = EOCD_SIGNATURE.to_le_bytes();
    for pos in (0..=tail.len() - EOCD_SIZE).rev() {
        if tail[pos..pos + 4] != signature {
            continue;
        }
        let Some(eocd) = EndOfCentralDirectory::parse(&tail[pos..]) else {
            continue;
        };

        let eocd_offset = start + pos as u64;
        if has_zip64_locator(reader, eocd_offset)? {
            return Err(CodecError::UnsupportedFeature("ZIP64"));
        }
        return Ok((eocd_offset, eocd));
    }

    Err(CodecError::InvalidFormat(
        "end of central directory record not found".into(),
    ))
}

fn has_zip64_locator<R: Read + Seek>(reader: &mut R, eocd_offset: u64) -> io::Result<bool> {
    if eocd_offset < ZIP64_LOCATOR_SIZE as u64 {
        return Ok(false);
    }
    reader.seek(SeekFrom::Start(eocd_offset - ZIP64_LOCATOR_SIZE as u64))?;
    let mut sig = [0u8; 4];
    reader.read_exact(&mut sig)?;
    Ok(u32::from_le_bytes(sig) == ZIP64_LOCATOR_SIGNATURE)
}

fn entry_from_header(header: &CentralHeader) -> CodecResult<ZipEntry> {
    if header.needs_zip64() {
        return Err(CodecError::UnsupportedFeature("ZIP64"));
    }

    let (path, trailing_slash) = EntryPath::parse(&header.decoded_name())?;
    let unix_mode = header.unix_mode();
    let is_dir = trailing_slash
        || unix_mode.is_some_and(|m| m & format::unix_mode::TYPE_MASK == format::unix_mode::DIRECTORY)
        || (header.size == 0
            && header.external_attributes & format::DOS_DIRECTORY_ATTRIBUTE != 0
            && header.version_made_by >> 8 == 0);

    Ok(ZipEntry {
        path,
        is_dir,
        method: header.method,
        crc32: header.crc32,
        compressed_size: u64::from(header.compressed_size),
        size: u64::from(header.size),
        modified: header.modified,
        unix_mode,
        is_encrypted: header.flags & flags::ENCRYPTED != 0,
        header_offset: u64::from(header.local_header_offset),
    })
}

/// Restores the modification time and permissions of an extracted file.
///
/// Failures are logged and otherwise ignored.
fn restore_metadata(path: &Path, entry: &ZipEntry) {
    let mtime = filetime::FileTime::from_system_time(entry.modified.as_system_time());
    if let Err(e) = filetime::set_file_mtime(path, mtime) {
        log::warn!(
            "Failed to set modification time on '{}': {}",
            path.display(),
            e
        );
    }

    #[cfg(unix)]
    if let Some(mode) = entry.unix_mode {
        use std::os::unix::fs::PermissionsExt;

        let perm = (mode & 0o7777) | 0o600;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(perm)) {
            log::warn!("Failed to set permissions on '{}': {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{EntryMeta, ZipOptions, ZipWriter};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn build(entries: &[(&str, &[u8])], options: ZipOptions) -> Vec<u8> {
        let mut writer = ZipWriter::new(Vec::new()).options(options);
        for (name, data) in entries {
            let path = EntryPath::new(name).unwrap();
            writer.add_bytes(&path, data, EntryMeta::file()).unwrap();
        }
        writer.finish().unwrap().1
    }

    #[test]
    fn test_open_lists_entries() {
        let bytes = build(&[("a.txt", b"alpha"), ("d/b.txt", b"beta")], ZipOptions::stored());
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<_> = archive.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(names, ["a.txt", "d/b.txt"]);
        assert_eq!(archive.len(), 2);
        assert!(!archive.is_empty());
    }

    #[test]
    fn test_read_entry_stored() {
        let bytes = build(&[("a.txt", b"alpha")], ZipOptions::stored());
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.read_entry(0).unwrap(), b"alpha");
        assert!(archive.read_entry(1).is_err());
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn test_read_entry_deflate() {
        let data = b"compressible ".repeat(200);
        let bytes = build(&[("big.txt", &data)], ZipOptions::default());
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.entries()[0].method, method::DEFLATE);
        assert!(archive.entries()[0].compressed_size < data.len() as u64);
        assert_eq!(archive.read_entry(0).unwrap(), data);
    }

    #[test]
    fn test_empty_input_is_invalid() {
        let err = ZipArchive::new(Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, CodecError::InvalidFormat(_)));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let err = ZipArchive::new(Cursor::new(vec![0x42u8; 4096])).unwrap_err();
        assert!(matches!(err, CodecError::InvalidFormat(_)));
    }

    #[test]
    fn test_crc_mismatch_detected() {
        let mut bytes = build(&[("a.txt", b"hello world")], ZipOptions::stored());
        // Stored data starts right after the 30-byte local header and the name.
        let data_start = format::LOCAL_HEADER_SIZE + "a.txt".len();
        bytes[data_start] ^= 0xFF;

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let err = archive.read_entry(0).unwrap_err();
        assert!(matches!(err, CodecError::CrcMismatch { .. }));
    }

    #[test]
    fn test_unsupported_method() {
        let mut bytes = build(&[("a.txt", b"hello")], ZipOptions::stored());
        // Patch the method field of the central header (offset 10) to 14 (LZMA).
        let cd_start = bytes.len()
            - EOCD_SIZE
            - (format::CENTRAL_HEADER_SIZE + "a.txt".len());
        bytes[cd_start + 10] = 14;

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let err = archive.read_entry(0).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedMethod { method: 14, .. }));
    }

    #[test]
    fn test_traversal_name_rejected() {
        let mut bytes = build(&[("aa/b.txt", b"x")], ZipOptions::stored());
        // Rewrite the central directory name "aa/b.txt" to "../b.txt".
        let cd_name = bytes.len() - EOCD_SIZE - "aa/b.txt".len();
        bytes[cd_name..cd_name + 2].copy_from_slice(b"..");

        let err = ZipArchive::new(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, CodecError::InvalidEntryPath { .. }));
    }

    #[test]
    fn test_extract_creates_tree() {
        let bytes = build(
            &[("top.txt", b"top"), ("d/e/deep.txt", b"deep")],
            ZipOptions::default(),
        );
        let dir = TempDir::new().unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let stats = archive.extract(dir.path()).unwrap();

        assert_eq!(stats.files, 2);
        assert_eq!(stats.bytes, 7);
        assert_eq!(fs::read(dir.path().join("top.txt")).unwrap(), b"top");
        assert_eq!(fs::read(dir.path().join("d/e/deep.txt")).unwrap(), b"deep");
    }

    #[test]
    fn test_archive_comment_skipped_when_locating_end_record() {
        let mut writer = ZipWriter::new(Vec::new())
            .options(ZipOptions::stored())
            .comment(b"PK\x05\x06 looks like a signature".to_vec());
        writer
            .add_bytes(&EntryPath::new("a.txt").unwrap(), b"a", EntryMeta::file())
            .unwrap();
        let bytes = writer.finish().unwrap().1;

        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
        assert!(archive.comment().starts_with(b"PK"));
    }

    #[test]
    fn test_extract_legacy_japanese_name() {
        // A DOS-host entry named "あ.txt" in CP932, without the UTF-8 flag
        let name = vec![0x82, 0xA0, b'.', b't', b'x', b't'];
        let data = b"kana";
        let crc32 = crc32fast::hash(data);

        let mut bytes = Vec::new();
        LocalHeader {
            flags: 0,
            method: method::STORED,
            modified: DosDateTime::default(),
            crc32,
            compressed_size: 4,
            size: 4,
            name: name.clone(),
        }
        .write(&mut bytes)
        .unwrap();
        bytes.extend_from_slice(data);

        let cd_offset = bytes.len() as u32;
        CentralHeader {
            version_made_by: 20,
            version_needed: 20,
            flags: 0,
            method: method::STORED,
            modified: DosDateTime::default(),
            crc32,
            compressed_size: 4,
            size: 4,
            disk_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset: 0,
            name,
            extra: Vec::new(),
            comment: Vec::new(),
        }
        .write(&mut bytes)
        .unwrap();
        let cd_size = bytes.len() as u32 - cd_offset;
        EndOfCentralDirectory {
            disk_number: 0,
            central_directory_disk: 0,
            entries_on_disk: 1,
            total_entries: 1,
            central_directory_size: cd_size,
            central_directory_offset: cd_offset,
            comment: Vec::new(),
        }
        .write(&mut bytes)
        .unwrap();

        let dir = TempDir::new().unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.entries()[0].path.as_str(), "あ.txt");
        archive.extract(dir.path()).unwrap();
        assert_eq!(fs::read(dir.path().join("あ.txt")).unwrap(), b"kana");
    }
}
