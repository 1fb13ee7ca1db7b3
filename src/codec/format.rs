//! ZIP record layouts and low-level binary helpers.
//!
//! Only the subset of the PKWARE APPNOTE needed to read and write ordinary
//! single-disk archives is covered: local file headers, central directory
//! headers and the end-of-central-directory record. ZIP64 and encryption
//! are detected and rejected by the reader.

use std::io::{self, Read, Write};

use super::timestamp::DosDateTime;

/// Local file header signature (`PK\x03\x04`).
pub const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

/// Central directory header signature (`PK\x01\x02`).
pub const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;

/// Data descriptor signature (`PK\x07\x08`).
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

/// End of central directory signature (`PK\x05\x06`).
pub const EOCD_SIGNATURE: u32 = 0x0605_4b50;

/// ZIP64 end of central directory locator signature (`PK\x06\x07`).
pub const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;

/// Fixed size of a local file header, without name and extra field.
pub const LOCAL_HEADER_SIZE: usize = 30;

/// Fixed size of a central directory header, without variable fields.
pub const CENTRAL_HEADER_SIZE: usize = 46;

/// Fixed size of the end of central directory record, without comment.
pub const EOCD_SIZE: usize = 22;

/// Size of the ZIP64 end of central directory locator.
pub const ZIP64_LOCATOR_SIZE: usize = 20;

/// Version needed to extract: 2.0 (deflate, directories).
pub const VERSION_NEEDED: u16 = 20;

/// Version made by: Unix host (high byte 3), APPNOTE version 2.0.
pub const VERSION_MADE_BY_UNIX: u16 = (3 << 8) | 20;

/// Compression method identifiers.
pub mod method {
    /// No compression.
    pub const STORED: u16 = 0;
    /// Deflate (RFC 1951).
    pub const DEFLATE: u16 = 8;
}

/// General purpose bit flags.
pub mod flags {
    /// Entry data is encrypted.
    pub const ENCRYPTED: u16 = 1 << 0;
    /// Sizes and CRC follow the data in a data descriptor.
    pub const DATA_DESCRIPTOR: u16 = 1 << 3;
    /// Name and comment are UTF-8.
    pub const UTF8: u16 = 1 << 11;
}

/// Unix file type bits stored in the high half of the external attributes.
pub mod unix_mode {
    /// File type mask.
    pub const TYPE_MASK: u32 = 0o170000;
    /// Directory.
    pub const DIRECTORY: u32 = 0o040000;
    /// Regular file.
    pub const REGULAR: u32 = 0o100000;
    /// Symbolic link.
    pub const SYMLINK: u32 = 0o120000;
}

/// MS-DOS directory attribute in the low byte of the external attributes.
pub const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

/// Marker value meaning "see ZIP64 extra field".
pub const ZIP64_MARKER_32: u32 = u32::MAX;

/// Marker value meaning "see ZIP64 end of central directory".
pub const ZIP64_MARKER_16: u16 = u16::MAX;

/// The end of central directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    /// Number of this disk.
    pub disk_number: u16,
    /// Disk where the central directory starts.
    pub central_directory_disk: u16,
    /// Number of central directory records on this disk.
    pub entries_on_disk: u16,
    /// Total number of central directory records.
    pub total_entries: u16,
    /// Size of the central directory in bytes.
    pub central_directory_size: u32,
    /// Offset of the central directory from the start of the archive.
    pub central_directory_offset: u32,
    /// Archive comment.
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    /// Parses the record from `buf`, which starts at the signature.
    ///
    /// Returns `None` if `buf` is too short or the comment length points past
    /// the end of `buf`.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < EOCD_SIZE || le_u32(buf, 0) != EOCD_SIGNATURE {
            return None;
        }
        let comment_len = le_u16(buf, 20) as usize;
        let comment = buf.get(EOCD_SIZE..EOCD_SIZE + comment_len)?.to_vec();
        Some(Self {
            disk_number: le_u16(buf, 4),
            central_directory_disk: le_u16(buf, 6),
            entries_on_disk: le_u16(buf, 8),
            total_entries: le_u16(buf, 10),
            central_directory_size: le_u32(buf, 12),
            central_directory_offset: le_u32(buf, 16),
            comment,
        })
    }

    /// Returns true if any field holds a ZIP64 marker value.
    pub fn needs_zip64(&self) -> bool {
        self.total_entries == ZIP64_MARKER_16
            || self.entries_on_disk == ZIP64_MARKER_16
            || self.central_directory_size == ZIP64_MARKER_32
            || self.central_directory_offset == ZIP64_MARKER_32
    }

    /// Writes the record.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u32(w, EOCD_SIGNATURE)?;
        write_u16(w, self.disk_number)?;
        write_u16(w, self.central_directory_disk)?;
        write_u16(w, self.entries_on_disk)?;
        write_u16(w, self.total_entries)?;
        write_u32(w, self.central_directory_size)?;
        write_u32(w, self.central_directory_offset)?;
        write_u16(w, self.comment.len() as u16)?;
        w.write_all(&self.comment)
    }
}

/// A central directory file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralHeader {
    /// Version made by (high byte: host system).
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flags.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// Last modification time.
    pub modified: DosDateTime,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u32,
    /// Uncompressed size.
    pub size: u32,
    /// Disk number where the entry starts.
    pub disk_start: u16,
    /// Internal file attributes.
    pub internal_attributes: u16,
    /// External file attributes (host dependent).
    pub external_attributes: u32,
    /// Offset of the local header.
    pub local_header_offset: u32,
    /// Raw entry name.
    pub name: Vec<u8>,
    /// Extra field.
    pub extra: Vec<u8>,
    /// Entry comment.
    pub comment: Vec<u8>,
}

impl CentralHeader {
    /// Reads one header, including its signature.
    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut fixed = [0u8; CENTRAL_HEADER_SIZE];
        r.read_exact(&mut fixed)?;
        if le_u32(&fixed, 0) != CENTRAL_HEADER_SIGNATURE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bad central directory header signature",
            ));
        }

        let name_len = le_u16(&fixed, 28) as usize;
        let extra_len = le_u16(&fixed, 30) as usize;
        let comment_len = le_u16(&fixed, 32) as usize;

        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let mut extra = vec![0u8; extra_len];
        r.read_exact(&mut extra)?;
        let mut comment = vec![0u8; comment_len];
        r.read_exact(&mut comment)?;

        Ok(Self {
            version_made_by: le_u16(&fixed, 4),
            version_needed: le_u16(&fixed, 6),
            flags: le_u16(&fixed, 8),
            method: le_u16(&fixed, 10),
            modified: DosDateTime::new(le_u16(&fixed, 14), le_u16(&fixed, 12)),
            crc32: le_u32(&fixed, 16),
            compressed_size: le_u32(&fixed, 20),
            size: le_u32(&fixed, 24),
            disk_start: le_u16(&fixed, 34),
            internal_attributes: le_u16(&fixed, 36),
            external_attributes: le_u32(&fixed, 38),
            local_header_offset: le_u32(&fixed, 42),
            name,
            extra,
            comment,
        })
    }

    /// Writes the header with its signature.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u32(w, CENTRAL_HEADER_SIGNATURE)?;
        write_u16(w, self.version_made_by)?;
        write_u16(w, self.version_needed)?;
        write_u16(w, self.flags)?;
        write_u16(w, self.method)?;
        write_u16(w, self.modified.time)?;
        write_u16(w, self.modified.date)?;
        write_u32(w, self.crc32)?;
        write_u32(w, self.compressed_size)?;
        write_u32(w, self.size)?;
        write_u16(w, self.name.len() as u16)?;
        write_u16(w, self.extra.len() as u16)?;
        write_u16(w, self.comment.len() as u16)?;
        write_u16(w, self.disk_start)?;
        write_u16(w, self.internal_attributes)?;
        write_u32(w, self.external_attributes)?;
        write_u32(w, self.local_header_offset)?;
        w.write_all(&self.name)?;
        w.write_all(&self.extra)?;
        w.write_all(&self.comment)
    }

    /// Returns the on-disk size of this header.
    pub fn encoded_len(&self) -> usize {
        CENTRAL_HEADER_SIZE + self.name.len() + self.extra.len() + self.comment.len()
    }

    /// Returns true if any size or offset holds a ZIP64 marker value.
    pub fn needs_zip64(&self) -> bool {
        self.compressed_size == ZIP64_MARKER_32
            || self.size == ZIP64_MARKER_32
            || self.local_header_offset == ZIP64_MARKER_32
    }

    /// Returns the Unix mode from the external attributes, if the entry was
    /// written on a Unix host and carries one.
    pub fn unix_mode(&self) -> Option<u32> {
        let host = self.version_made_by >> 8;
        let mode = self.external_attributes >> 16;
        (host == 3 && mode != 0).then_some(mode)
    }

    /// Decodes the entry name.
    ///
    /// Names flagged as UTF-8 are decoded strictly (lossily on error). Other
    /// names are tried as UTF-8, then as CP932 (Shift_JIS as written by
    /// Japanese Windows), and finally as IBM code page 437, which accepts
    /// any byte sequence.
    pub fn decoded_name(&self) -> String {
        if self.flags & flags::UTF8 != 0 {
            return String::from_utf8_lossy(&self.name).into_owned();
        }
        if let Ok(name) = std::str::from_utf8(&self.name) {
            return name.to_string();
        }
        let cp932 = encoding_rs::SHIFT_JIS;
        match cp932.decode_without_bom_handling_and_without_replacement(&self.name) {
            Some(name) => name.into_owned(),
            None => decode_cp437(&self.name),
        }
    }
}

/// A local file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHeader {
    /// General purpose bit flags.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// Last modification time.
    pub modified: DosDateTime,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u32,
    /// Uncompressed size.
    pub size: u32,
    /// Raw entry name.
    pub name: Vec<u8>,
}

impl LocalHeader {
    /// Reads the fixed part of a local header and skips its variable fields.
    ///
    /// Returns the header's name length plus extra length so the caller knows
    /// where the data begins. Sizes are not trusted by the reader; the
    /// central directory is authoritative.
    pub fn read_skip<R: Read>(r: &mut R) -> io::Result<u64> {
        let mut fixed = [0u8; LOCAL_HEADER_SIZE];
        r.read_exact(&mut fixed)?;
        if le_u32(&fixed, 0) != LOCAL_HEADER_SIGNATURE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bad local file header signature",
            ));
        }
        let variable = le_u16(&fixed, 26) as u64 + le_u16(&fixed, 28) as u64;
        io::copy(&mut r.take(variable), &mut io::sink())?;
        Ok(variable)
    }

    /// Writes the header with its signature and an empty extra field.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u32(w, LOCAL_HEADER_SIGNATURE)?;
        write_u16(w, VERSION_NEEDED)?;
        write_u16(w, self.flags)?;
        write_u16(w, self.method)?;
        write_u16(w, self.modified.time)?;
        write_u16(w, self.modified.date)?;
        write_u32(w, self.crc32)?;
        write_u32(w, self.compressed_size)?;
        write_u32(w, self.size)?;
        write_u16(w, self.name.len() as u16)?;
        write_u16(w, 0)?;
        w.write_all(&self.name)
    }

    /// Returns the on-disk size of this header.
    pub fn encoded_len(&self) -> usize {
        LOCAL_HEADER_SIZE + self.name.len()
    }
}

/// The optional record following entry data whose sizes were not known when
/// the local header was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u32,
    /// Uncompressed size.
    pub size: u32,
}

impl DataDescriptor {
    /// Encoded size including the signature.
    pub const SIZE: usize = 16;

    /// Writes the descriptor with its signature.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u32(w, DATA_DESCRIPTOR_SIGNATURE)?;
        write_u32(w, self.crc32)?;
        write_u32(w, self.compressed_size)?;
        write_u32(w, self.size)
    }
}

/// Reads a little-endian `u16` at `offset`.
#[inline]
pub fn le_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

/// Reads a little-endian `u32` at `offset`.
#[inline]
pub fn le_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn write_u16<W: Write>(w: &mut W, value: u16) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

fn write_u32<W: Write>(w: &mut W, value: u32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Upper half of IBM code page 437; the lower half is ASCII.
const CP437_HIGH: [char; 128] = [
    '\u{00C7}', '\u{00FC}', '\u{00E9}', '\u{00E2}', '\u{00E4}', '\u{00E0}', '\u{00E5}', '\u{00E7}',
    '\u{00EA}', '\u{00EB}', '\u{00E8}', '\u{00EF}', '\u{00EE}', '\u{00EC}', '\u{00C4}', '\u{00C5}',
    '\u{00C9}', '\u{00E6}', '\u{00C6}', '\u{00F4}', '\u{00F6}', '\u{00F2}', '\u{00FB}', '\u{00F9}',
    '\u{00FF}', '\u{00D6}', '\u{00DC}', '\u{00A2}', '\u{00A3}', '\u{00A5}', '\u{20A7}', '\u{0192}',
    '\u{00E1}', '\u{00ED}', '\u{00F3}', '\u{00FA}', '\u{00F1}', '\u{00D1}', '\u{00AA}', '\u{00BA}',
    '\u{00BF}', '\u{2310}', '\u{00AC}', '\u{00BD}', '\u{00BC}', '\u{00A1}', '\u{00AB}', '\u{00BB}',
    '\u{2591}', '\u{2592}', '\u{2593}', '\u{2502}', '\u{2524}', '\u{2561}', '\u{2562}', '\u{2556}',
    '\u{2555}', '\u{2563}', '\u{2551}', '\u{2557}', '\u{255D}', '\u{255C}', '\u{255B}', '\u{2510}',
    '\u{2514}', '\u{2534}', '\u{252C}', '\u{251C}', '\u{2500}', '\u{253C}', '\u{255E}', '\u{255F}',
    '\u{255A}', '\u{2554}', '\u{2569}', '\u{2566}', '\u{2560}', '\u{2550}', '\u{256C}', '\u{2567}',
    '\u{2568}', '\u{2564}', '\u{2565}', '\u{2559}', '\u{2558}', '\u{2552}', '\u{2553}', '\u{256B}',
    '\u{256A}', '\u{2518}', '\u{250C}', '\u{2588}', '\u{2584}', '\u{258C}', '\u{2590}', '\u{2580}',
    '\u{03B1}', '\u{00DF}', '\u{0393}', '\u{03C0}', '\u{03A3}', '\u{03C3}', '\u{00B5}', '\u{03C4}',
    '\u{03A6}', '\u{0398}', '\u{03A9}', '\u{03B4}', '\u{221E}', '\u{03C6}', '\u{03B5}', '\u{2229}',
    '\u{2261}', '\u{00B1}', '\u{2265}', '\u{2264}', '\u{2320}', '\u{2321}', '\u{00F7}', '\u{2248}',
    '\u{00B0}', '\u{2219}', '\u{00B7}', '\u{221A}', '\u{207F}', '\u{00B2}', '\u{25A0}', '\u{00A0}',
];

/// Decodes bytes as IBM code page 437.
pub fn decode_cp437(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                CP437_HIGH[(b - 0x80) as usize]
            }
        })
        .collect()
}
