//! Symbols and their auxiliary records (spec.md §3 "Symbol"/"Auxiliary
//! record", §4.1 "Symbol table").
//!
//! Grounded on `picc/coff.py:_readsymtable`/`Symbol`/`FileAuxSymbol`/
//! `SectionAuxSymbol`; record layout style from
//! `m4b-goblin/src/pe/symbol.rs`.

use std::fmt;

use scroll::{Pread, LE};

use crate::coff::header::SYMENT_SIZE;
use crate::coff::strtab::StringTable;
use crate::error::{Error, Result};

/// Storage classes consumed by this linker (spec.md §6).
pub mod storage_class {
    pub const EXT: i8 = 2;
    pub const STAT: i8 = 3;
    pub const LABEL: i8 = 6;
    pub const FILE: i8 = 103;
    pub const EOF: i8 = 107;
    pub const LIST: i8 = 108;
    pub const SECTION: i8 = 109;
}

/// How a symbol's `section` field is resolved, replacing the "int that
/// later becomes a pointer" pattern of the original with a tagged variant
/// (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolSection {
    /// `sectnum == 0`: undefined, resolved via the external symbol index.
    Undefined,
    /// `sectnum < 0`: debug symbol, never a relocation target.
    Debug,
    /// `sectnum > 0`: a one-based index into the owning object's section
    /// list (which keeps the file's sentinel at index 0, so this index can
    /// be used verbatim as `object.sections[index]`).
    InSection(usize),
}

impl SymbolSection {
    fn from_raw(sectnum: i16) -> SymbolSection {
        if sectnum > 0 {
            SymbolSection::InSection(sectnum as usize)
        } else if sectnum == 0 {
            SymbolSection::Undefined
        } else {
            SymbolSection::Debug
        }
    }
}

/// A primary symbol-table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub value: u32,
    pub section: SymbolSection,
    pub base_type: u16,
    pub derived_type: u16,
    pub storage_class: i8,
    /// Indices (into the owning object's flat `symbols` list) of this
    /// symbol's auxiliary records, in file order.
    pub aux: Vec<usize>,
}

impl Symbol {
    /// `storage_class == EXT` (spec.md §3 "Classification").
    pub fn is_external(&self) -> bool {
        self.storage_class == storage_class::EXT
    }

    /// The symbol's `section` has been resolved to a real section.
    pub fn is_defined(&self) -> bool {
        matches!(self.section, SymbolSection::InSection(_))
    }
}

impl fmt::Display for SymbolSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolSection::Undefined => write!(f, "UNDEFINED"),
            SymbolSection::Debug => write!(f, "DEBUG"),
            SymbolSection::InSection(idx) => write!(f, "{}", idx),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<24} {:<16} {:<#10x} storage_class={:<4} {} aux record(s)",
            self.name,
            self.section,
            self.value,
            self.storage_class,
            self.aux.len()
        )
    }
}

/// A `C_FILE` auxiliary record: source filename and include line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAuxRecord {
    pub filename: String,
    pub incline: u32,
    pub flags: u8,
}

/// A `C_SECTION` auxiliary record: length and relocation/line-number counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionAuxRecord {
    pub section_length: u32,
    pub num_relocations: u16,
    pub num_line_numbers: u16,
}

/// One entry of the auxiliary record variants this linker understands.
#[derive(Debug, Clone, PartialEq)]
pub enum AuxRecord {
    File(FileAuxRecord),
    Section(SectionAuxRecord),
}

/// One entry in the flat, index-preserving symbol-table list: either a
/// primary symbol or one of its auxiliary records, in original file order.
/// Relocations and line numbers reference this list by raw file index
/// (spec.md §9 "Symbol list heterogeneity").
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolTableEntry {
    Primary(Symbol),
    Aux(AuxRecord),
}

/// Read the whole flat symbol table (`nsyms` records, each possibly
/// followed by aux records of the same size) from `data` starting at
/// `offset`.
pub fn parse_symbol_table(
    data: &[u8],
    offset: usize,
    nsyms: u32,
    strtab: &StringTable,
) -> Result<Vec<SymbolTableEntry>> {
    let mut entries = Vec::with_capacity(nsyms as usize);
    let mut cursor = offset;
    let mut index: u32 = 0;
    while index < nsyms {
        if cursor + SYMENT_SIZE > data.len() {
            return Err(Error::Malformed(format!(
                "truncated symbol at position {}",
                index
            )));
        }
        let name_slot: [u8; 8] = data
            .pread(cursor)
            .map_err(|_| Error::Malformed(format!("truncated symbol at position {}", index)))?;
        let value: u32 = data.pread_with(cursor + 8, LE)?;
        let sectnum: i16 = data.pread_with(cursor + 12, LE)?;
        let base_type: u16 = data.pread_with(cursor + 14, LE)?;
        let derived_type: u16 = data.pread_with(cursor + 16, LE)?;
        let sclass: i8 = data.pread_with(cursor + 18, LE)?;
        let numaux: i8 = data.pread_with(cursor + 19, LE)?;
        let name = strtab.resolve_name(&name_slot).map_err(|_| {
            Error::Malformed(format!(
                "in symbol at position {}: non ASCII characters in symbol name",
                index
            ))
        })?;
        cursor += SYMENT_SIZE;
        index += 1;

        let mut aux_records = Vec::new();
        for _ in 0..numaux.max(0) {
            if index >= nsyms {
                break;
            }
            if cursor + SYMENT_SIZE > data.len() {
                return Err(Error::Malformed(format!(
                    "truncated symbol at position {}",
                    index
                )));
            }
            let aux = match sclass {
                storage_class::FILE => {
                    let x_offset: u32 = data.pread_with(cursor, LE)?;
                    let x_incline: u32 = data.pread_with(cursor + 4, LE)?;
                    let x_flags: u8 = data.pread_with(cursor + 8, LE)?;
                    let filename = strtab.get(x_offset).map_err(|_| {
                        Error::Malformed(format!(
                            "in symbol at position {}: invalid file aux filename offset",
                            index
                        ))
                    })?;
                    AuxRecord::File(FileAuxRecord {
                        filename,
                        incline: x_incline,
                        flags: x_flags,
                    })
                }
                storage_class::SECTION => {
                    let scnlen: u32 = data.pread_with(cursor, LE)?;
                    let nreloc: u16 = data.pread_with(cursor + 4, LE)?;
                    let nlinno: u16 = data.pread_with(cursor + 6, LE)?;
                    AuxRecord::Section(SectionAuxRecord {
                        section_length: scnlen,
                        num_relocations: nreloc,
                        num_line_numbers: nlinno,
                    })
                }
                _ => {
                    return Err(Error::Malformed(format!(
                        "in symbol at position {}: unexpected aux record for storage class {}",
                        index, sclass
                    )));
                }
            };
            aux_records.push(aux);
            cursor += SYMENT_SIZE;
            index += 1;
        }

        let primary_pos = entries.len();
        let aux_indices = (0..aux_records.len()).map(|i| primary_pos + 1 + i).collect();
        entries.push(SymbolTableEntry::Primary(Symbol {
            name,
            value,
            section: SymbolSection::from_raw(sectnum),
            base_type,
            derived_type,
            storage_class: sclass,
            aux: aux_indices,
        }));
        entries.extend(aux_records.into_iter().map(SymbolTableEntry::Aux));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    fn build_strtab_with(names: &[&str]) -> (Vec<u8>, StringTable) {
        let mut body = Vec::new();
        for n in names {
            body.extend_from_slice(n.as_bytes());
            body.push(0);
        }
        let size = (body.len() + 4) as u32;
        let mut out = vec![0u8; 4];
        out.pwrite_with(size, 0, LE).unwrap();
        out.extend_from_slice(&body);
        let table = StringTable::parse(&out, 0).unwrap();
        (out, table)
    }

    fn inline_name(name: &str) -> [u8; 8] {
        let mut slot = [0u8; 8];
        slot[..name.len()].copy_from_slice(name.as_bytes());
        slot
    }

    fn write_symbol(buf: &mut Vec<u8>, name: [u8; 8], value: u32, sectnum: i16, sclass: i8, numaux: i8) {
        let mut rec = vec![0u8; SYMENT_SIZE];
        rec[0..8].copy_from_slice(&name);
        rec.pwrite_with(value, 8, LE).unwrap();
        rec.pwrite_with(sectnum, 12, LE).unwrap();
        rec.pwrite_with(0u16, 14, LE).unwrap();
        rec.pwrite_with(0u16, 16, LE).unwrap();
        rec.pwrite_with(sclass, 18, LE).unwrap();
        rec.pwrite_with(numaux, 19, LE).unwrap();
        buf.extend_from_slice(&rec);
    }

    #[test]
    fn parses_plain_external_symbol() {
        let (_t, strtab) = build_strtab_with(&[]);
        let mut buf = Vec::new();
        write_symbol(&mut buf, inline_name("main"), 0, 1, storage_class::EXT, 0);
        let entries = parse_symbol_table(&buf, 0, 1, &strtab).unwrap();
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            SymbolTableEntry::Primary(sym) => {
                assert_eq!(sym.name, "main");
                assert!(sym.is_external());
                assert_eq!(sym.section, SymbolSection::InSection(1));
            }
            _ => panic!("expected primary symbol"),
        }
    }

    #[test]
    fn parses_symbol_with_section_aux() {
        let (_t, strtab) = build_strtab_with(&[]);
        let mut buf = Vec::new();
        write_symbol(&mut buf, inline_name(".code"), 0, 1, storage_class::SECTION, 1);
        let mut aux = vec![0u8; SYMENT_SIZE];
        aux.pwrite_with(16u32, 0, LE).unwrap();
        aux.pwrite_with(1u16, 4, LE).unwrap();
        aux.pwrite_with(0u16, 6, LE).unwrap();
        buf.extend_from_slice(&aux);

        let entries = parse_symbol_table(&buf, 0, 2, &strtab).unwrap();
        assert_eq!(entries.len(), 2);
        match &entries[0] {
            SymbolTableEntry::Primary(sym) => {
                assert_eq!(sym.aux, vec![1]);
            }
            _ => panic!("expected primary symbol first"),
        }
        match &entries[1] {
            SymbolTableEntry::Aux(AuxRecord::Section(sec)) => {
                assert_eq!(sec.section_length, 16);
                assert_eq!(sec.num_relocations, 1);
            }
            _ => panic!("expected section aux record"),
        }
    }

    #[test]
    fn undefined_and_debug_sections_classify_correctly() {
        assert_eq!(SymbolSection::from_raw(0), SymbolSection::Undefined);
        assert_eq!(SymbolSection::from_raw(-1), SymbolSection::Debug);
        assert_eq!(SymbolSection::from_raw(3), SymbolSection::InSection(3));
    }
}
