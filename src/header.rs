//! The fixed 256-byte data-file header.
//!
//! Modeled after the teacher's `dbheader::get_header`/`DbfileHeader`: a
//! fixed-offset binary reader/writer pair with a dedicated `Error` enum,
//! using `byteorder` for the integer fields. Unlike the SQLite header this
//! substrate's header is self-describing about its own format (magic +
//! version) rather than pinned to one upstream format, since this is not
//! a SQLite-compatible file.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

pub const HEADER_BYTES: usize = 256;
const MAGIC: &[u8; 8] = b"RELASTR\0";
const CURRENT_VERSION: u32 = 1;

const FLAG_MODIFIED: u32 = 0x1;
const FLAG_MULTI_SPACE: u32 = 0x2;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    #[error("data file header has the wrong magic bytes")]
    WrongMagic,
    #[error("data file header version {0} is not supported")]
    UnsupportedVersion(u32),
    #[error("data file scale {0} is not one of {{1,2,4,8,16,32,64}}")]
    InvalidScale(u32),
    #[error("data file header has too many index roots for the 256-byte header")]
    TooManyIndexRoots,
    #[error("I/O error reading or writing data file header")]
    Io,
}

/// Scale `S`: a power-of-two multiplier applied to 32-bit row handles to
/// address files larger than 2^31 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale(u32);

impl Scale {
    pub const VALID: [u32; 7] = [1, 2, 4, 8, 16, 32, 64];

    pub fn new(s: u32) -> Result<Self, HeaderError> {
        if Self::VALID.contains(&s) {
            Ok(Scale(s))
        } else {
            Err(HeaderError::InvalidScale(s))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Converts a 32-bit row "cell position" into a byte file offset.
    pub fn to_offset(self, cell_position: u32) -> u64 {
        cell_position as u64 * self.0 as u64
    }

    /// Rounds a byte length up to a multiple of the scale.
    pub fn round_up(self, len: u64) -> u64 {
        let s = self.0 as u64;
        (len + s - 1) / s * s
    }
}

/// Up to this many index roots fit in the fixed 256-byte header alongside
/// the other fixed fields (8 magic + 4 version + 4 scale + 4 flags +
/// 8 fileFreePosition + 4 checksum + 8 * N roots <= 256).
pub const MAX_INDEX_ROOTS: usize = (HEADER_BYTES - 32) / 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    pub scale: Scale,
    pub modified: bool,
    pub multi_space: bool,
    pub file_free_position: u64,
    pub index_roots: Vec<u64>,
    /// CRC32 of the rest of the header, used as the "dirty shutdown"
    /// marker: a clean shutdown recomputes and stores it; a mismatch on
    /// open means the prior shutdown was not clean and the shadow log
    /// (if any) should be replayed before use.
    pub checksum: u32,
}

impl FileHeader {
    pub fn new(scale: Scale, num_indexes: usize) -> Self {
        FileHeader {
            version: CURRENT_VERSION,
            scale,
            modified: false,
            multi_space: false,
            file_free_position: HEADER_BYTES as u64,
            index_roots: vec![0; num_indexes],
            checksum: 0,
        }
    }

    fn flags(&self) -> u32 {
        let mut f = 0;
        if self.modified {
            f |= FLAG_MODIFIED;
        }
        if self.multi_space {
            f |= FLAG_MULTI_SPACE;
        }
        f
    }

    fn payload_for_checksum(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&self.scale.get().to_be_bytes());
        buf.extend_from_slice(&self.flags().to_be_bytes());
        buf.extend_from_slice(&self.file_free_position.to_be_bytes());
        for r in &self.index_roots {
            buf.extend_from_slice(&r.to_be_bytes());
        }
        buf
    }

    pub fn recompute_checksum(&mut self) {
        self.checksum = crc32fast::hash(&self.payload_for_checksum());
    }

    pub fn checksum_valid(&self) -> bool {
        crc32fast::hash(&self.payload_for_checksum()) == self.checksum
    }

    pub fn write<W: Write + Seek>(&self, w: &mut W) -> Result<(), HeaderError> {
        if self.index_roots.len() > MAX_INDEX_ROOTS {
            return Err(HeaderError::TooManyIndexRoots);
        }
        w.seek(SeekFrom::Start(0)).map_err(|_| HeaderError::Io)?;
        w.write_all(MAGIC).map_err(|_| HeaderError::Io)?;
        w.write_u32::<BigEndian>(self.version)
            .map_err(|_| HeaderError::Io)?;
        w.write_u32::<BigEndian>(self.scale.get())
            .map_err(|_| HeaderError::Io)?;
        w.write_u32::<BigEndian>(self.flags())
            .map_err(|_| HeaderError::Io)?;
        w.write_u64::<BigEndian>(self.file_free_position)
            .map_err(|_| HeaderError::Io)?;
        w.write_u32::<BigEndian>(self.checksum)
            .map_err(|_| HeaderError::Io)?;
        w.write_u32::<BigEndian>(self.index_roots.len() as u32)
            .map_err(|_| HeaderError::Io)?;
        for r in &self.index_roots {
            w.write_u64::<BigEndian>(*r).map_err(|_| HeaderError::Io)?;
        }
        let written = 8 + 4 + 4 + 4 + 8 + 4 + 4 + self.index_roots.len() * 8;
        if written < HEADER_BYTES {
            let pad = vec![0u8; HEADER_BYTES - written];
            w.write_all(&pad).map_err(|_| HeaderError::Io)?;
        }
        Ok(())
    }

    pub fn read<R: Read + Seek>(r: &mut R) -> Result<Self, HeaderError> {
        r.seek(SeekFrom::Start(0)).map_err(|_| HeaderError::Io)?;
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).map_err(|_| HeaderError::Io)?;
        if &magic != MAGIC {
            return Err(HeaderError::WrongMagic);
        }
        let version = r.read_u32::<BigEndian>().map_err(|_| HeaderError::Io)?;
        if version != CURRENT_VERSION {
            return Err(HeaderError::UnsupportedVersion(version));
        }
        let scale_raw = r.read_u32::<BigEndian>().map_err(|_| HeaderError::Io)?;
        let scale = Scale::new(scale_raw)?;
        let flags = r.read_u32::<BigEndian>().map_err(|_| HeaderError::Io)?;
        let file_free_position = r.read_u64::<BigEndian>().map_err(|_| HeaderError::Io)?;
        let checksum = r.read_u32::<BigEndian>().map_err(|_| HeaderError::Io)?;
        let n_roots = r.read_u32::<BigEndian>().map_err(|_| HeaderError::Io)? as usize;
        let mut index_roots = Vec::with_capacity(n_roots);
        for _ in 0..n_roots {
            index_roots.push(r.read_u64::<BigEndian>().map_err(|_| HeaderError::Io)?);
        }
        Ok(FileHeader {
            version,
            scale,
            modified: flags & FLAG_MODIFIED != 0,
            multi_space: flags & FLAG_MULTI_SPACE != 0,
            file_free_position,
            index_roots,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_roundtrip() {
        let mut h = FileHeader::new(Scale::new(1).unwrap(), 3);
        h.file_free_position = 4096;
        h.index_roots = vec![256, 512, 1024];
        h.recompute_checksum();

        let mut buf = vec![0u8; HEADER_BYTES];
        let mut c = Cursor::new(&mut buf[..]);
        h.write(&mut c).unwrap();

        let mut c2 = Cursor::new(&buf[..]);
        let h2 = FileHeader::read(&mut c2).unwrap();
        assert_eq!(h, h2);
        assert!(h2.checksum_valid());
    }

    #[test]
    fn wrong_magic_rejected() {
        let buf = vec![0u8; HEADER_BYTES];
        let mut c = Cursor::new(&buf[..]);
        assert_eq!(FileHeader::read(&mut c), Err(HeaderError::WrongMagic));
    }

    #[test]
    fn scale_rejects_non_power_of_two_set() {
        assert!(Scale::new(3).is_err());
        assert!(Scale::new(64).is_ok());
    }

    #[test]
    fn checksum_detects_corruption() {
        let mut h = FileHeader::new(Scale::new(1).unwrap(), 0);
        h.recompute_checksum();
        h.file_free_position += 1; // simulate a dirty shutdown: field changed, checksum stale
        assert!(!h.checksum_valid());
    }
}
