//! External symbol index (spec.md §3 "External symbol index", §4.4).
//!
//! Grounded on `picc/linker.py:_getexternals`: a `name -> Symbol` map built
//! from every external, defined symbol across all objects in the link,
//! reporting a diagnostic (rather than failing the whole link) on the
//! second and further definitions of the same name. The original keeps a
//! direct `Symbol` reference, whose `.section` is always the *defining*
//! object's own `Section`; since relocations are applied against a
//! different (referencing) object, this table stores the already-resolved
//! value and section base address instead of an index, so [`crate::reloc`]
//! never has to guess which object a `SymbolSection::InSection` index
//! belongs to.

use std::collections::HashMap;

use crate::coff::object::Object;
use crate::diagnostics::Diagnostics;

/// A defined external symbol resolved to an absolute, object-independent
/// position: its raw value plus the paddress of the section it lives in
/// (0 for absolute sections, matching [`crate::reloc`]'s local-symbol path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSymbol {
    pub value: u32,
    pub section_paddress: u32,
}

/// Build the external symbol table for a whole link.
///
/// Only symbols that are both external (`storage_class == EXT`) and
/// defined (resolved to a real section) are indexed; undefined externals
/// are left for [`crate::reloc`] to resolve against this table. Must run
/// after section placement so that `section_paddress` reflects each
/// section's final, allocated address.
pub fn collect_externals(
    objects: &[Object],
    diagnostics: &mut Diagnostics,
) -> HashMap<String, ResolvedSymbol> {
    let mut externals: HashMap<String, ResolvedSymbol> = HashMap::new();
    let mut defined_in: HashMap<String, String> = HashMap::new();
    for object in objects {
        for symbol in object.primary_symbols() {
            if symbol.is_external() && symbol.is_defined() {
                if let Some(first_filename) = defined_in.get(&symbol.name) {
                    diagnostics.error(
                        object.filename.clone(),
                        format!(
                            "duplicate symbol '{}' (first defined in '{}')",
                            symbol.name, first_filename
                        ),
                    );
                } else {
                    let section_paddress = match symbol.section {
                        crate::coff::symbol::SymbolSection::InSection(idx) => {
                            match object.section_at(idx) {
                                Ok(sec) if !sec.is_absolute() => sec.paddress,
                                _ => 0,
                            }
                        }
                        _ => 0,
                    };
                    defined_in.insert(symbol.name.clone(), object.filename.clone());
                    externals.insert(
                        symbol.name.clone(),
                        ResolvedSymbol {
                            value: symbol.value,
                            section_paddress,
                        },
                    );
                }
            }
        }
    }
    externals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coff::section::{Section, STYP_TEXT};
    use crate::coff::symbol::{storage_class, Symbol, SymbolSection, SymbolTableEntry};

    fn object_with_symbol(filename: &str, name: &str, storage_class: i8, section: SymbolSection) -> Object {
        let sentinel = Section {
            name: String::new(),
            paddress: 0,
            vaddress: 0,
            size: 0,
            flags: 0,
            data: Vec::new(),
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        };
        let code = Section {
            name: ".code".into(),
            paddress: 0,
            vaddress: 0,
            size: 4,
            flags: STYP_TEXT,
            data: vec![0; 4],
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        };
        Object {
            filename: filename.into(),
            timestamp: 0,
            processor: "18f2550".into(),
            romwidth: 0,
            ramwidth: 0,
            symbols: vec![SymbolTableEntry::Primary(Symbol {
                name: name.into(),
                value: 0,
                section,
                base_type: 0,
                derived_type: 0,
                storage_class,
                aux: Vec::new(),
            })],
            sections: vec![sentinel, code],
        }
    }

    #[test]
    fn collects_one_defined_external() {
        let objects = vec![object_with_symbol(
            "a.o",
            "main",
            storage_class::EXT,
            SymbolSection::InSection(1),
        )];
        let mut diag = Diagnostics::new();
        let externals = collect_externals(&objects, &mut diag);
        assert!(externals.contains_key("main"));
        assert!(!diag.has_errors());
    }

    #[test]
    fn undefined_externals_are_not_indexed() {
        let objects = vec![object_with_symbol(
            "a.o",
            "helper",
            storage_class::EXT,
            SymbolSection::Undefined,
        )];
        let mut diag = Diagnostics::new();
        let externals = collect_externals(&objects, &mut diag);
        assert!(!externals.contains_key("helper"));
    }

    #[test]
    fn duplicate_definitions_are_reported() {
        let objects = vec![
            object_with_symbol("a.o", "shared", storage_class::EXT, SymbolSection::InSection(1)),
            object_with_symbol("b.o", "shared", storage_class::EXT, SymbolSection::InSection(1)),
        ];
        let mut diag = Diagnostics::new();
        collect_externals(&objects, &mut diag);
        assert_eq!(diag.error_count(), 1);
    }
}
