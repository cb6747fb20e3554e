//! Section placement: give every section in the link an absolute address
//! (spec.md §4.3).
//!
//! Grounded on `picc/linker.py`'s `_allocsections`/`_getallocator`: sections
//! are grouped object by object, then placed in three waves — absolute
//! first (pinned), then access-bank (bounded to `[0, picinfo.access)`),
//! then everything else (free-fit) — using a code allocator for code and
//! program-data sections and a data allocator for uninitialised data.

use crate::coff::object::Object;
use crate::diagnostics::Diagnostics;
use crate::memory::MemoryAllocator;
use crate::processor::ProcessorInfo;

enum Bank {
    Code,
    Data,
}

fn bank_for(object_index: usize, section_index: usize, objects: &[Object]) -> Option<Bank> {
    let section = &objects[object_index].sections[section_index];
    if section.is_code() || section.is_program_data() {
        Some(Bank::Code)
    } else if section.is_udata() {
        Some(Bank::Data)
    } else {
        None
    }
}

/// Assign `paddress` to every real section of every object, mutating them
/// in place; allocation failures are recorded on `diagnostics` and leave
/// the section at address 0.
pub fn allocate_sections(
    objects: &mut [Object],
    picinfo: ProcessorInfo,
    codemem: &mut MemoryAllocator,
    datamem: &mut MemoryAllocator,
    diagnostics: &mut Diagnostics,
) {
    let mut absolute = Vec::new();
    let mut access = Vec::new();
    let mut relocatable = Vec::new();
    for (oi, object) in objects.iter().enumerate() {
        for (si, section) in object.real_sections() {
            if section.is_absolute() {
                absolute.push((oi, si));
            } else if section.is_access() {
                access.push((oi, si));
            } else {
                relocatable.push((oi, si));
            }
        }
    }

    for (oi, si) in absolute {
        let (start, size, name, filename) = {
            let section = &objects[oi].sections[si];
            (section.paddress, section.size, section.name.clone(), objects[oi].filename.clone())
        };
        let allocator = match bank_for(oi, si, objects) {
            Some(Bank::Code) => &mut *codemem,
            Some(Bank::Data) => &mut *datamem,
            None => continue,
        };
        if allocator.alloc_at(size, start).is_none() {
            diagnostics.error(
                filename,
                format!("No target memory available for section '{}'", name),
            );
        }
    }

    for (oi, si) in access {
        let (size, name, filename) = {
            let section = &objects[oi].sections[si];
            (section.size, section.name.clone(), objects[oi].filename.clone())
        };
        match datamem.alloc_bounded(size, 0, picinfo.access) {
            Some(addr) => objects[oi].sections[si].paddress = addr,
            None => diagnostics.error(
                filename,
                format!("No target memory available for section '{}'", name),
            ),
        }
    }

    for (oi, si) in relocatable {
        let (size, name, filename) = {
            let section = &objects[oi].sections[si];
            (section.size, section.name.clone(), objects[oi].filename.clone())
        };
        let allocator = match bank_for(oi, si, objects) {
            Some(Bank::Code) => &mut *codemem,
            Some(Bank::Data) => &mut *datamem,
            None => continue,
        };
        match allocator.alloc(size) {
            Some(addr) => objects[oi].sections[si].paddress = addr,
            None => {
                diagnostics.error(
                    filename,
                    format!("No target memory available for section '{}'", name),
                );
                objects[oi].sections[si].paddress = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coff::section::{Section, STYP_ACCESS, STYP_TEXT, STYP_BSS};
    use crate::coff::symbol::SymbolTableEntry;

    fn object_with(sections: Vec<Section>) -> Object {
        let mut all = vec![Section {
            name: String::new(),
            paddress: 0,
            vaddress: 0,
            size: 0,
            flags: 0,
            data: Vec::new(),
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        }];
        all.extend(sections);
        Object {
            filename: "t.o".into(),
            timestamp: 0,
            processor: "18f2550".into(),
            romwidth: 0,
            ramwidth: 0,
            symbols: Vec::<SymbolTableEntry>::new(),
            sections: all,
        }
    }

    fn code_section(name: &str, size: u32) -> Section {
        Section {
            name: name.into(),
            paddress: 0,
            vaddress: 0,
            size,
            flags: STYP_TEXT,
            data: vec![0; size as usize],
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        }
    }

    #[test]
    fn places_relocatable_code_section_at_zero() {
        let mut objects = vec![object_with(vec![code_section(".code", 16)])];
        let picinfo = ProcessorInfo { ram: 0x800, access: 0x60, progmem: 0x8000 };
        let mut codemem = MemoryAllocator::new(picinfo.progmem);
        let mut datamem = MemoryAllocator::new(picinfo.ram);
        let mut diag = Diagnostics::new();
        allocate_sections(&mut objects, picinfo, &mut codemem, &mut datamem, &mut diag);
        assert_eq!(objects[0].sections[1].paddress, 0);
        assert!(!diag.has_errors());
    }

    #[test]
    fn places_access_section_within_access_window() {
        let mut access_section = Section {
            flags: STYP_BSS | STYP_ACCESS,
            ..code_section(".access_vars", 4)
        };
        access_section.data.clear();
        let mut objects = vec![object_with(vec![access_section])];
        let picinfo = ProcessorInfo { ram: 0x800, access: 0x60, progmem: 0x8000 };
        let mut codemem = MemoryAllocator::new(picinfo.progmem);
        let mut datamem = MemoryAllocator::new(picinfo.ram);
        let mut diag = Diagnostics::new();
        allocate_sections(&mut objects, picinfo, &mut codemem, &mut datamem, &mut diag);
        assert!(objects[0].sections[1].paddress + 4 <= picinfo.access);
    }

    #[test]
    fn absolute_conflict_is_reported() {
        let mut s1 = code_section(".a", 16);
        s1.flags |= crate::coff::section::STYP_ABS;
        s1.paddress = 0x100;
        let mut s2 = code_section(".b", 16);
        s2.flags |= crate::coff::section::STYP_ABS;
        s2.paddress = 0x100;
        let mut objects = vec![object_with(vec![s1, s2])];
        let picinfo = ProcessorInfo { ram: 0x800, access: 0x60, progmem: 0x8000 };
        let mut codemem = MemoryAllocator::new(picinfo.progmem);
        let mut datamem = MemoryAllocator::new(picinfo.ram);
        let mut diag = Diagnostics::new();
        allocate_sections(&mut objects, picinfo, &mut codemem, &mut datamem, &mut diag);
        assert_eq!(diag.error_count(), 1);
    }
}
