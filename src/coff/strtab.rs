//! The COFF string table: a single size-prefixed ASCII blob following the
//! symbol table, referenced by 8-byte name slots in symbols and sections.
//!
//! Grounded on `picc/coff.py:_readstrtable`/`getstring`/`getstrfromoffset`.
//! Structurally a byte-offset indexed lookup like
//! `m4b-goblin/src/strtab.rs`'s `Strtab`, but the framing is COFF-specific:
//! a 4-byte little-endian length (including itself) followed by
//! NUL-terminated ASCII, not ELF's plain delimiter-scan blob.

use scroll::{Pread, LE};

use crate::error::{Error, Result};

/// The decoded string table, with the 4-byte size prefix stripped.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    bytes: Vec<u8>,
}

impl StringTable {
    /// Parse the string table located at `offset` within `data`.
    ///
    /// The first 4 bytes at `offset` are a little-endian size `S`
    /// (including those 4 bytes); the remaining `S - 4` bytes are ASCII
    /// and must end in a NUL byte.
    pub fn parse(data: &[u8], offset: usize) -> Result<StringTable> {
        if offset + 4 > data.len() {
            return Err(Error::Malformed("truncated string table size".into()));
        }
        let size: u32 = data.pread_with(offset, LE)?;
        let size = size as usize;
        if size < 4 {
            return Err(Error::Malformed("truncated string table size".into()));
        }
        let body_len = size - 4;
        let start = offset + 4;
        let end = start
            .checked_add(body_len)
            .filter(|&e| e <= data.len())
            .ok_or_else(|| Error::Malformed("truncated string table".into()))?;
        let body = &data[start..end];
        if !body.is_ascii() {
            return Err(Error::Malformed("non ASCII characters in string table".into()));
        }
        if body_len > 0 && body[body_len - 1] != 0 {
            return Err(Error::Malformed(
                "last character of string table is not NULL".into(),
            ));
        }
        Ok(StringTable {
            bytes: body.to_vec(),
        })
    }

    /// Resolve a string given its offset into the *original file's* string
    /// table (i.e. including the stripped 4-byte size prefix).
    pub fn get(&self, file_offset: u32) -> Result<String> {
        let index = (file_offset as i64) - 4;
        if index < 0 || index as usize >= self.bytes.len() {
            return Err(Error::Malformed("string table offset passed the end".into()));
        }
        let start = index as usize;
        let end = self.bytes[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|n| start + n)
            .ok_or_else(|| Error::Malformed("unterminated string in string table".into()))?;
        Ok(String::from_utf8_lossy(&self.bytes[start..end]).into_owned())
    }

    /// Resolve an 8-byte name slot (spec.md §4.1 "Name resolution").
    ///
    /// The slot is two little-endian `u32` words `(zeroes, offset)`. If
    /// `zeroes == 0`, the name lives in the string table at `offset`;
    /// otherwise the 8 bytes are the NUL-padded in-place name.
    pub fn resolve_name(&self, slot: &[u8; 8]) -> Result<String> {
        let zeroes: u32 = slot.pread_with(0, LE)?;
        if zeroes == 0 {
            let offset: u32 = slot.pread_with(4, LE)?;
            self.get(offset)
        } else {
            if !slot.is_ascii() {
                return Err(Error::Malformed("non ASCII characters in name".into()));
            }
            let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
            Ok(String::from_utf8_lossy(&slot[..end]).into_owned())
        }
    }
}
