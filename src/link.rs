//! Top-level linking pipeline (spec.md §2 "System Overview", §6).
//!
//! Grounded on `picc/linker.py:link`: check the processor is consistent
//! across inputs, load its memory layout, place sections, resolve
//! external symbols, patch relocations, then stream the result into a
//! [`crate::hex::HexSink`].

use log::debug;

use crate::coff::object::Object;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::externs::collect_externals;
use crate::hex::HexSink;
use crate::memory::MemoryAllocator;
use crate::place::allocate_sections;
use crate::processor::ProcessorTable;
use crate::reloc::apply_relocations;

/// Link `objects` together, writing the result into `sink`.
///
/// `objects` must contain at least one object. The first object's
/// `processor` field is taken as authoritative; later objects that name a
/// different processor produce a warning on `diagnostics` but do not
/// abort the link (`picc/linker.py:link`).
///
/// Returns `Ok(())` on success (inspect `diagnostics.error_count()` for
/// the caller's exit status) or `Err` on a fatal decode/structural error.
pub fn link(
    objects: &mut [Object],
    processors: &ProcessorTable,
    sink: &mut dyn HexSink,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    if objects.is_empty() {
        return Err(Error::Malformed("nothing to link".into()));
    }

    let processor = objects[0].processor.clone();
    for object in objects.iter().skip(1) {
        if object.processor != processor {
            diagnostics.warn(object.filename.clone(), "processor mismatch");
        }
    }
    debug!("linking {} object(s) for processor '{}'", objects.len(), processor);

    let picinfo = processors
        .get(&processor)
        .ok_or_else(|| Error::Malformed(format!("info from processor '{}' not found", processor)))?;

    let mut codemem = MemoryAllocator::new(picinfo.progmem);
    let mut datamem = MemoryAllocator::new(picinfo.ram);

    allocate_sections(objects, picinfo, &mut codemem, &mut datamem, diagnostics);
    debug!(
        "placed sections: {} code bytes free, {} data bytes free",
        codemem.free_bytes(),
        datamem.free_bytes()
    );

    let externals = collect_externals(objects, diagnostics);
    debug!("{} external symbol(s) resolved", externals.len());

    apply_relocations(objects, &externals, picinfo, diagnostics)?;

    for object in objects.iter() {
        for (_, section) in object.real_sections() {
            if section.is_code() || section.is_program_data() {
                sink.put(section.paddress, &section.data);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coff::section::{Section, STYP_TEXT};
    use crate::coff::symbol::SymbolTableEntry;
    use crate::hex::IntelHexImage;

    fn sentinel() -> Section {
        Section {
            name: String::new(),
            paddress: 0,
            vaddress: 0,
            size: 0,
            flags: 0,
            data: Vec::new(),
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        }
    }

    #[test]
    fn links_a_single_trivial_object() {
        let code = Section {
            name: ".code".into(),
            paddress: 0,
            vaddress: 0,
            size: 2,
            flags: STYP_TEXT,
            data: vec![0x00, 0xef],
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        };
        let mut objects = vec![Object {
            filename: "a.o".into(),
            timestamp: 0,
            processor: "18f2550".into(),
            romwidth: 0,
            ramwidth: 0,
            symbols: Vec::<SymbolTableEntry>::new(),
            sections: vec![sentinel(), code],
        }];
        let processors = ProcessorTable::builtin();
        let mut sink = IntelHexImage::new();
        let mut diag = Diagnostics::new();
        link(&mut objects, &processors, &mut sink, &mut diag).unwrap();
        assert!(!sink.is_empty());
        assert!(!diag.has_errors());
    }

    #[test]
    fn rejects_empty_object_list() {
        let processors = ProcessorTable::builtin();
        let mut sink = IntelHexImage::new();
        let mut diag = Diagnostics::new();
        let err = link(&mut [], &processors, &mut sink, &mut diag).unwrap_err();
        assert!(err.to_string().contains("nothing to link"));
    }

    #[test]
    fn unknown_processor_is_fatal() {
        let mut objects = vec![Object {
            filename: "a.o".into(),
            timestamp: 0,
            processor: "totally-unknown".into(),
            romwidth: 0,
            ramwidth: 0,
            symbols: Vec::<SymbolTableEntry>::new(),
            sections: vec![sentinel()],
        }];
        let processors = ProcessorTable::builtin();
        let mut sink = IntelHexImage::new();
        let mut diag = Diagnostics::new();
        let err = link(&mut objects, &processors, &mut sink, &mut diag).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
