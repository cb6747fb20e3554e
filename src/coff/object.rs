//! A decoded COFF object file (spec.md §3 "Object", §4.1).
//!
//! Grounded on `picc/coff.py:readcoff`, which this module's `Object::parse`
//! follows step for step: file header, optional header, string table,
//! symbol table, then sections; top-level orchestration style from
//! `m4b-goblin/src/pe/mod.rs`'s `PE::parse`.

use std::fmt;

use crate::coff::header::{FileHeader, OptionalHeader};
use crate::coff::section::{parse_sections, Section};
use crate::coff::strtab::StringTable;
use crate::coff::symbol::{parse_symbol_table, Symbol, SymbolSection, SymbolTableEntry};
use crate::error::{Error, Result};

/// A fully decoded object file, as read from one `.o` produced by a PIC18
/// toolchain.
#[derive(Debug, Clone)]
pub struct Object {
    pub filename: String,
    pub timestamp: u32,
    pub processor: String,
    pub romwidth: u32,
    pub ramwidth: u32,
    /// Flat, index-preserving symbol table; relocations and line numbers
    /// reference entries here by their original file index.
    pub symbols: Vec<SymbolTableEntry>,
    /// Sections, one-based: index 0 is a sentinel so that the COFF file's
    /// one-based `sectnum` values index this list verbatim.
    pub sections: Vec<Section>,
}

impl Object {
    /// Parse a complete object file, validating that every symbol's
    /// section index (if any) refers to a section that actually exists.
    pub fn parse(data: &[u8], filename: impl Into<String>) -> Result<Object> {
        let filename = filename.into();
        let header = FileHeader::parse(data)?;
        if header.opthdrsize == 0 {
            return Err(Error::Malformed("missing optional header".into()));
        }
        let opt_offset = crate::coff::header::FILE_HEADER_SIZE;
        let opt_data = data
            .get(opt_offset..opt_offset + header.opthdrsize as usize)
            .ok_or_else(|| Error::Malformed("truncated optional header".into()))?;
        let optional = OptionalHeader::parse(opt_data, header.opthdrsize)?;

        let strtab_offset = header.symptr as usize + header.nsyms as usize * crate::coff::header::SYMENT_SIZE;
        let strtab = if strtab_offset < data.len() {
            StringTable::parse(data, strtab_offset)?
        } else {
            StringTable::default()
        };

        let symbols = parse_symbol_table(data, header.symptr as usize, header.nsyms, &strtab)?;

        let section_offset = opt_offset + header.opthdrsize as usize;
        let mut sections = Vec::with_capacity(header.nsections as usize + 1);
        sections.push(Section {
            name: String::new(),
            paddress: 0,
            vaddress: 0,
            size: 0,
            flags: 0,
            data: Vec::new(),
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        });
        sections.extend(parse_sections(
            data,
            section_offset,
            header.nsections,
            &strtab,
            symbols.len(),
        )?);

        for entry in &symbols {
            if let SymbolTableEntry::Primary(sym) = entry {
                if let SymbolSection::InSection(idx) = sym.section {
                    if idx >= sections.len() {
                        return Err(Error::Malformed(format!(
                            "symbol '{}' points to nonexistent section with index {}",
                            sym.name, idx
                        )));
                    }
                }
            }
        }

        Ok(Object {
            filename,
            timestamp: header.timestamp,
            processor: optional.processor,
            romwidth: optional.romwidth,
            ramwidth: optional.ramwidth,
            symbols,
            sections,
        })
    }

    /// Look up the primary symbol at flat index `idx`, failing if that
    /// entry is an auxiliary record instead.
    pub fn symbol_at(&self, idx: usize) -> Result<&Symbol> {
        match self.symbols.get(idx) {
            Some(SymbolTableEntry::Primary(sym)) => Ok(sym),
            Some(SymbolTableEntry::Aux(_)) => Err(Error::Malformed(format!(
                "symbol table index {} refers to an auxiliary record",
                idx
            ))),
            None => Err(Error::Malformed(format!(
                "symbol table index {} out of range",
                idx
            ))),
        }
    }

    /// Look up a section by its one-based file index (index 0 is the
    /// sentinel and is never a valid reference).
    pub fn section_at(&self, idx: usize) -> Result<&Section> {
        if idx == 0 || idx >= self.sections.len() {
            return Err(Error::Malformed(format!(
                "section index {} out of range",
                idx
            )));
        }
        Ok(&self.sections[idx])
    }

    /// Iterate over all real (non-sentinel) sections together with their
    /// one-based index.
    pub fn real_sections(&self) -> impl Iterator<Item = (usize, &Section)> {
        self.sections.iter().enumerate().skip(1)
    }

    /// Iterate over all primary (non-auxiliary) symbols.
    pub fn primary_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter_map(|e| match e {
            SymbolTableEntry::Primary(sym) => Some(sym),
            SymbolTableEntry::Aux(_) => None,
        })
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "COFF File and Optional Headers")?;
        writeln!(f, "Processor Type       {}", self.processor)?;
        writeln!(f, "Time Stamp           {}", self.timestamp)?;
        writeln!(f, "Number of Sections   {}", self.sections.len() - 1)?;
        writeln!(f, "Number of Symbols    {}", self.symbols.len())?;
        writeln!(f)?;
        for (_, section) in self.real_sections() {
            writeln!(f, "{}", section)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coff::header::{FILE_HEADER_SIZE, MAGIC, OPTIONAL_HEADER_SIZE, SECTION_HEADER_SIZE, SYMENT_SIZE};
    use scroll::{Pwrite, LE};

    fn build_minimal_object() -> Vec<u8> {
        // One EXT symbol "main" pointing at section 1, one code section
        // with no relocations, and a string table with no entries.
        let nsyms = 1u32;
        let nsections = 1u16;
        let symptr = FILE_HEADER_SIZE as u32 + OPTIONAL_HEADER_SIZE as u32 + SECTION_HEADER_SIZE as u32;
        let mut buf = vec![0u8; symptr as usize];

        buf.pwrite_with(MAGIC, 0, LE).unwrap();
        buf.pwrite_with(nsections, 2, LE).unwrap();
        buf.pwrite_with(0u32, 4, LE).unwrap();
        buf.pwrite_with(symptr, 8, LE).unwrap();
        buf.pwrite_with(nsyms, 12, LE).unwrap();
        buf.pwrite_with(OPTIONAL_HEADER_SIZE as u16, 16, LE).unwrap();
        buf.pwrite_with(0u16, 18, LE).unwrap();

        let opt_off = FILE_HEADER_SIZE;
        buf.pwrite_with(0u16, opt_off, LE).unwrap();
        buf.pwrite_with(0u16, opt_off + 2, LE).unwrap();
        buf.pwrite_with(0x2550u16, opt_off + 6, LE).unwrap();
        buf.pwrite_with(0x8000u32, opt_off + 8, LE).unwrap();
        buf.pwrite_with(0x800u32, opt_off + 12, LE).unwrap();

        let sect_off = opt_off + OPTIONAL_HEADER_SIZE;
        let name = b".code\0\0\0";
        buf[sect_off..sect_off + 8].copy_from_slice(name);
        buf.pwrite_with(4u32, sect_off + 16, LE).unwrap();
        buf.pwrite_with(0u32, sect_off + 20, LE).unwrap();
        buf.pwrite_with(crate::coff::section::STYP_TEXT, sect_off + 36, LE)
            .unwrap();

        let mut sym_rec = vec![0u8; SYMENT_SIZE];
        sym_rec[0..4].copy_from_slice(b"main");
        sym_rec.pwrite_with(0u32, 8, LE).unwrap();
        sym_rec.pwrite_with(1i16, 12, LE).unwrap();
        sym_rec.pwrite_with(0u16, 14, LE).unwrap();
        sym_rec.pwrite_with(0u16, 16, LE).unwrap();
        sym_rec.pwrite_with(2i8, 18, LE).unwrap();
        sym_rec.pwrite_with(0i8, 19, LE).unwrap();
        buf.extend_from_slice(&sym_rec);

        buf.extend_from_slice(&4u32.to_le_bytes());
        buf
    }

    #[test]
    fn parses_minimal_object_end_to_end() {
        let data = build_minimal_object();
        let obj = Object::parse(&data, "min.o").unwrap();
        assert_eq!(obj.processor, "18f2550");
        assert_eq!(obj.sections.len(), 2);
        assert_eq!(obj.section_at(1).unwrap().name, ".code");
        let main = obj.primary_symbols().find(|s| s.name == "main").unwrap();
        assert!(main.is_external());
        assert_eq!(main.section, SymbolSection::InSection(1));
    }

    #[test]
    fn rejects_symbol_pointing_past_section_list() {
        let mut data = build_minimal_object();
        let symptr = FILE_HEADER_SIZE + OPTIONAL_HEADER_SIZE + SECTION_HEADER_SIZE;
        data.pwrite_with(5i16, symptr + 12, LE).unwrap();
        let err = Object::parse(&data, "bad.o").unwrap_err();
        assert!(err.to_string().contains("nonexistent section"));
    }
}
