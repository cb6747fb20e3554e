//! COFF file header and optional header (spec.md §4.1/§6).

use scroll::{Pread, LE};

use crate::error::{Error, Result};

/// Magic number identifying a Microchip COFF object (`picc/coff.py:_MAGIC`).
pub const MAGIC: u16 = 0x1240;

/// Size in bytes of the fixed file header.
pub const FILE_HEADER_SIZE: usize = 20;
/// Size in bytes of the optional header, when present.
pub const OPTIONAL_HEADER_SIZE: usize = 18;
/// Size in bytes of one symbol-table (or aux) entry.
pub const SYMENT_SIZE: usize = 20;
/// Size in bytes of one section header.
pub const SECTION_HEADER_SIZE: usize = 40;
/// Size in bytes of one relocation entry.
pub const RELOCATION_SIZE: usize = 12;
/// Size in bytes of one line-number entry.
pub const LINE_NUMBER_SIZE: usize = 16;

/// The fixed 20-byte file header at the start of every COFF object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u16,
    pub nsections: u16,
    pub timestamp: u32,
    pub symptr: u32,
    pub nsyms: u32,
    pub opthdrsize: u16,
    pub flags: u16,
}

impl FileHeader {
    /// Parse the file header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<FileHeader> {
        if data.len() < FILE_HEADER_SIZE {
            return Err(Error::Malformed("truncated header".into()));
        }
        let header = FileHeader {
            magic: data.pread_with(0, LE)?,
            nsections: data.pread_with(2, LE)?,
            timestamp: data.pread_with(4, LE)?,
            symptr: data.pread_with(8, LE)?,
            nsyms: data.pread_with(12, LE)?,
            opthdrsize: data.pread_with(16, LE)?,
            flags: data.pread_with(18, LE)?,
        };
        if header.magic != MAGIC {
            return Err(Error::Malformed("not a Microchip COFF file".into()));
        }
        Ok(header)
    }
}

/// Maps a COFF `proctype` code to the processor name string used to look
/// the part up in [`crate::processor::ProcessorTable`].
///
/// Grounded on `picc/coff.py:_PROCESSORS`.
fn proctype_name(proctype: u16) -> Option<&'static str> {
    match proctype {
        0x2550 => Some("18f2550"),
        0xd616 => Some("18f26j13"),
        _ => None,
    }
}

/// The optional header, present iff the file header's `opthdrsize != 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalHeader {
    pub magic: u16,
    pub vstamp: u16,
    /// Processor name, resolved from the raw `proctype` code.
    pub processor: String,
    pub romwidth: u32,
    pub ramwidth: u32,
}

impl OptionalHeader {
    /// Parse the optional header, which immediately follows the file
    /// header and is exactly `opthdrsize` bytes long.
    pub fn parse(data: &[u8], opthdrsize: u16) -> Result<OptionalHeader> {
        if (opthdrsize as usize) < OPTIONAL_HEADER_SIZE {
            return Err(Error::Malformed("truncated optional header".into()));
        }
        if data.len() < OPTIONAL_HEADER_SIZE {
            return Err(Error::Malformed("truncated optional header".into()));
        }
        let magic: u16 = data.pread_with(0, LE)?;
        let vstamp: u16 = data.pread_with(2, LE)?;
        // Bytes [4, 6) are reserved padding ('=HH2xHLL2x' in the original).
        let proctype: u16 = data.pread_with(6, LE)?;
        let romwidth: u32 = data.pread_with(8, LE)?;
        let ramwidth: u32 = data.pread_with(12, LE)?;
        let processor = proctype_name(proctype)
            .ok_or_else(|| Error::Malformed(format!("unknown processor type {:#06x}", proctype)))?
            .to_string();
        Ok(OptionalHeader {
            magic,
            vstamp,
            processor,
            romwidth,
            ramwidth,
        })
    }
}
