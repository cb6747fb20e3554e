//! Section headers, raw section data, relocations and line numbers
//! (spec.md §3 "Section"/"Relocation"/"Line number", §4.1).
//!
//! Grounded on `picc/coff.py:Section`/`Relocation`/`LineNumber` and the
//! `_readsections` loop; header-record style from
//! `m4b-goblin/src/pe/section_table.rs`.

use std::fmt;

use scroll::{Pread, LE};

use crate::coff::header::{LINE_NUMBER_SIZE, RELOCATION_SIZE, SECTION_HEADER_SIZE};
use crate::coff::strtab::StringTable;
use crate::error::{Error, Result};

/// Section contains executable code (spec.md §6 `STYP_TEXT`).
pub const STYP_TEXT: u32 = 0x0020;
/// Section is uninitialised data, occupies no file space (`STYP_BSS`).
pub const STYP_BSS: u32 = 0x0080;
/// Section is initialised data destined for program memory (`STYP_DATA_ROM`).
pub const STYP_DATA_ROM: u32 = 0x0100;
/// Section has a fixed, linker-unmovable address (`STYP_ABS`).
pub const STYP_ABS: u32 = 0x1000;
/// Section must be placed in the directly-addressable access bank
/// (`STYP_ACCESS`).
pub const STYP_ACCESS: u32 = 0x8000;

/// One relocation entry: patch the word at `address` within the owning
/// section using the symbol at flat symbol-table index `symbol_index`,
/// adding the constant `offset` before applying the relocation formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub address: u32,
    pub symbol_index: u32,
    pub offset: i16,
    pub reloc_type: u16,
}

/// One line-number entry: a source line for a given section/symbol pair,
/// carried through for debuggers but never consulted by placement or
/// relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub source_symbol_index: u32,
    pub line_number: u16,
    pub address: u32,
    pub flags: u16,
    pub function_symbol_index: u32,
}

/// A section: its header fields, raw bytes (empty for `BSS`), relocations
/// and line numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    /// Virtual address as recorded in the object file (not yet placed).
    pub paddress: u32,
    pub vaddress: u32,
    pub size: u32,
    pub flags: u32,
    pub data: Vec<u8>,
    pub relocations: Vec<Relocation>,
    pub line_numbers: Vec<LineNumber>,
}

impl Section {
    pub fn is_code(&self) -> bool {
        self.flags & STYP_TEXT != 0
    }

    pub fn is_bss(&self) -> bool {
        self.flags & STYP_BSS != 0
    }

    pub fn is_program_data(&self) -> bool {
        self.flags & STYP_DATA_ROM != 0
    }

    /// Uninitialised data: occupies RAM but carries no file bytes.
    pub fn is_udata(&self) -> bool {
        self.is_bss() && self.flags & STYP_DATA_ROM == 0
    }

    pub fn is_absolute(&self) -> bool {
        self.flags & STYP_ABS != 0
    }

    pub fn is_access(&self) -> bool {
        self.flags & STYP_ACCESS != 0
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Section Header")?;
        writeln!(f, "Name                    {}", self.name)?;
        writeln!(f, "Physical address        {:#x}", self.paddress)?;
        writeln!(f, "Virtual address         {:#x}", self.vaddress)?;
        writeln!(f, "Size of Section         {}", self.size)?;
        writeln!(f, "Number of Relocations   {}", self.relocations.len())?;
        writeln!(f, "Number of Line Numbers  {}", self.line_numbers.len())?;
        write!(f, "Flags                   {:#x}", self.flags)?;
        if self.is_code() {
            write!(f, "\nSTYP_TEXT")?;
        }
        if self.is_bss() {
            write!(f, "\nSTYP_BSS")?;
        }
        if self.is_program_data() {
            write!(f, "\nSTYP_DATA_ROM")?;
        }
        if self.is_absolute() {
            write!(f, "\nSTYP_ABS")?;
        }
        if self.is_access() {
            write!(f, "\nSTYP_ACCESS")?;
        }
        Ok(())
    }
}

struct RawSectionHeader {
    name_slot: [u8; 8],
    paddress: u32,
    vaddress: u32,
    size: u32,
    scnptr: u32,
    relptr: u32,
    lnnoptr: u32,
    nreloc: u16,
    nlnno: u16,
    flags: u32,
}

fn parse_section_header(data: &[u8], offset: usize) -> Result<RawSectionHeader> {
    if offset + SECTION_HEADER_SIZE > data.len() {
        return Err(Error::Malformed("truncated section header".into()));
    }
    Ok(RawSectionHeader {
        name_slot: data.pread(offset)?,
        paddress: data.pread_with(offset + 8, LE)?,
        vaddress: data.pread_with(offset + 12, LE)?,
        size: data.pread_with(offset + 16, LE)?,
        scnptr: data.pread_with(offset + 20, LE)?,
        relptr: data.pread_with(offset + 24, LE)?,
        lnnoptr: data.pread_with(offset + 28, LE)?,
        nreloc: data.pread_with(offset + 32, LE)?,
        nlnno: data.pread_with(offset + 34, LE)?,
        flags: data.pread_with(offset + 36, LE)?,
    })
}

/// Read the `nsections` section headers starting at `offset`, together
/// with each section's raw data, relocations and line numbers.
///
/// `nsyms` is the total size of the owning object's flat symbol table, used
/// to validate that every line number's source/function symbol index
/// actually resolves (`picc/coff.py:_readlinenumbers`).
pub fn parse_sections(
    data: &[u8],
    offset: usize,
    nsections: u16,
    strtab: &StringTable,
    nsyms: usize,
) -> Result<Vec<Section>> {
    let mut sections = Vec::with_capacity(nsections as usize);
    for i in 0..nsections as usize {
        let raw = parse_section_header(data, offset + i * SECTION_HEADER_SIZE)?;
        let name = strtab
            .resolve_name(&raw.name_slot)
            .map_err(|_| Error::Malformed(format!("in section {}: invalid name", i)))?;

        let is_code = raw.flags & STYP_TEXT != 0;
        if is_code && raw.size % 2 != 0 {
            return Err(Error::Malformed(format!(
                "in section '{}': code section data size must be multiple of 2",
                name
            )));
        }

        let is_udata = raw.flags & STYP_BSS != 0;
        let is_program_data = raw.flags & STYP_DATA_ROM != 0;

        let (section_data, relocations, line_numbers) = if is_udata {
            (Vec::new(), Vec::new(), Vec::new())
        } else if is_code || is_program_data {
            let section_data = if raw.scnptr == 0 {
                Vec::new()
            } else {
                let start = raw.scnptr as usize;
                let end = start
                    .checked_add(raw.size as usize)
                    .filter(|&e| e <= data.len())
                    .ok_or_else(|| Error::Malformed(format!("in section {}: data runs past end of file", name)))?;
                data[start..end].to_vec()
            };

            let mut relocations = Vec::with_capacity(raw.nreloc as usize);
            let mut rel_cursor = raw.relptr as usize;
            for _ in 0..raw.nreloc {
                if rel_cursor + RELOCATION_SIZE > data.len() {
                    return Err(Error::Malformed(format!(
                        "in section {}: truncated relocation table",
                        name
                    )));
                }
                let address: u32 = data.pread_with(rel_cursor, LE)?;
                let symbol_index: u32 = data.pread_with(rel_cursor + 4, LE)?;
                let offset: i16 = data.pread_with(rel_cursor + 8, LE)?;
                let reloc_type: u16 = data.pread_with(rel_cursor + 10, LE)?;
                relocations.push(Relocation {
                    address,
                    symbol_index,
                    offset,
                    reloc_type,
                });
                rel_cursor += RELOCATION_SIZE;
            }

            let mut line_numbers = Vec::with_capacity(raw.nlnno as usize);
            let mut ln_cursor = raw.lnnoptr as usize;
            for pos in 0..raw.nlnno as usize {
                if ln_cursor + LINE_NUMBER_SIZE > data.len() {
                    return Err(Error::Malformed(format!(
                        "in section {}: truncated line number table",
                        name
                    )));
                }
                let source_symbol_index: u32 = data.pread_with(ln_cursor, LE)?;
                let line_number: u16 = data.pread_with(ln_cursor + 4, LE)?;
                let address: u32 = data.pread_with(ln_cursor + 6, LE)?;
                let flags: u16 = data.pread_with(ln_cursor + 10, LE)?;
                let function_symbol_index: u32 = data.pread_with(ln_cursor + 12, LE)?;
                for idx in [source_symbol_index, function_symbol_index] {
                    if idx as usize >= nsyms {
                        return Err(Error::Malformed(format!(
                            "in section '{}': line number info at position {} points to nonexistent symbol with index {}",
                            name, pos, idx
                        )));
                    }
                }
                line_numbers.push(LineNumber {
                    source_symbol_index,
                    line_number,
                    address,
                    flags,
                    function_symbol_index,
                });
                ln_cursor += LINE_NUMBER_SIZE;
            }

            (section_data, relocations, line_numbers)
        } else {
            return Err(Error::Malformed(format!(
                "in section '{}': unimplemented section type",
                name
            )));
        };

        sections.push(Section {
            name,
            paddress: raw.paddress,
            vaddress: raw.vaddress,
            size: raw.size,
            flags: raw.flags,
            data: section_data,
            relocations,
            line_numbers,
        });
    }
    Ok(sections)
}
