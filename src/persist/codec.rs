//! Low-level "tpl" binary primitives (`spec.md` §4.5): the self-describing
//! header (`MAGIC "tpl" FLAGS LEN FORMAT_STR '\0'`) plus endian-aware atom
//! readers/writers. Grounded on the teacher's `storage/chunk.rs`
//! (`ChunkReader::open`/`write_chunk`): manual header parsing at explicit
//! byte offsets, no serialization crate, atomic `.tmp`-then-`rename` writes.

use std::fs;
use std::path::Path;

use crate::error::{StoreError, StoreResult};

pub const MAGIC: &[u8; 3] = b"tpl";

/// Bit 0: producer was big-endian. Bit 1: "nul strings supported" (this
/// codec always sets it — every string this crate writes is UTF-8 without
/// interior NULs, but the bit documents the newer wire format, same as the
/// original's flag of the same name).
const FLAG_BIG_ENDIAN: u8 = 0b01;
const FLAG_NUL_STRINGS: u8 = 0b10;

/// Accumulates one tpl file's bytes: header first, then atoms in the order
/// `FORMAT_STR` describes.
pub struct TplWriter {
    buf: Vec<u8>,
}

impl TplWriter {
    pub fn new(format: &str) -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.push(FLAG_NUL_STRINGS);
        buf.extend_from_slice(&(format.len() as u32).to_le_bytes());
        buf.extend_from_slice(format.as_bytes());
        buf.push(0);
        Self { buf }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// A length-prefixed string: `u32` byte length, then raw UTF-8 bytes.
    pub fn write_string(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads a tpl file's atoms back in order, after verifying the header's
/// magic and format string.
#[derive(Debug)]
pub struct TplReader<'a> {
    data: &'a [u8],
    pos: usize,
    producer_big_endian: bool,
}

impl<'a> TplReader<'a> {
    pub fn open(data: &'a [u8], expected_format: &'static str) -> StoreResult<Self> {
        if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
            return Err(StoreError::BadMagic);
        }
        let flags = data[3];
        let producer_big_endian = flags & FLAG_BIG_ENDIAN != 0;

        let len_bytes: [u8; 4] = data
            .get(4..8)
            .and_then(|s| s.try_into().ok())
            .ok_or(StoreError::BadMagic)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        let format_start: usize = 8;
        let format_end = format_start
            .checked_add(len)
            .ok_or(StoreError::BadMagic)?;
        let format_bytes = data.get(format_start..format_end).ok_or(StoreError::BadMagic)?;
        let format =
            std::str::from_utf8(format_bytes).map_err(|_| StoreError::BadMagic)?;
        if format != expected_format {
            return Err(StoreError::FormatMismatch {
                expected: expected_format,
                found: format.to_string(),
            });
        }

        Ok(Self {
            data,
            pos: format_end + 1,
            producer_big_endian,
        })
    }

    fn take(&mut self, n: usize) -> StoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| StoreError::Io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> StoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> StoreResult<u16> {
        let b: [u8; 2] = self.take(2)?.try_into().unwrap();
        Ok(if self.producer_big_endian {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    }

    pub fn read_u32(&mut self) -> StoreResult<u32> {
        let b: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(if self.producer_big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        })
    }

    pub fn read_u64(&mut self) -> StoreResult<u64> {
        let b: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(if self.producer_big_endian {
            u64::from_be_bytes(b)
        } else {
            u64::from_le_bytes(b)
        })
    }

    pub fn read_i64(&mut self) -> StoreResult<i64> {
        let b: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(if self.producer_big_endian {
            i64::from_be_bytes(b)
        } else {
            i64::from_le_bytes(b)
        })
    }

    pub fn read_bytes(&mut self, n: usize) -> StoreResult<&'a [u8]> {
        self.take(n)
    }

    pub fn read_string(&mut self) -> StoreResult<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| StoreError::Io(std::io::Error::other("invalid utf-8 in tpl string")))
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }
}

/// Writes `bytes` to `path` via a sibling `.tmp` file followed by
/// `fs::rename`, so a crash mid-write never leaves a half-written file at
/// `path` (`storage/chunk.rs`'s `write_chunk` does the same).
pub fn write_file_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_atoms() {
        let mut w = TplWriter::new("uUs");
        w.write_u32(7);
        w.write_u64(9_000_000_000);
        w.write_string("hello");
        let bytes = w.into_bytes();

        let mut r = TplReader::open(&bytes, "uUs").unwrap();
        assert_eq!(r.read_u32().unwrap(), 7);
        assert_eq!(r.read_u64().unwrap(), 9_000_000_000);
        assert_eq!(r.read_string().unwrap(), "hello");
        assert!(r.at_end());
    }

    #[test]
    fn rejects_bad_magic() {
        let err = TplReader::open(b"nope", "u").unwrap_err();
        assert!(matches!(err, StoreError::BadMagic));
    }

    #[test]
    fn rejects_format_mismatch() {
        let w = TplWriter::new("u");
        let bytes = w.into_bytes();
        let err = TplReader::open(&bytes, "s").unwrap_err();
        assert!(matches!(err, StoreError::FormatMismatch { .. }));
    }
}
