//! Processor catalogue: target RAM/access-bank/program-memory sizes.
//!
//! spec.md §6 treats this as "an opaque key→record API"; the Python
//! original loads it from `/usr/share/picc/processors.xml`
//! (`picc/linker.py:_loadpicinfo`). This module keeps the same shape — a
//! name keyed lookup yielding three byte sizes — but as an in-memory table
//! a caller can seed from whatever external format they parse (XML, TOML,
//! a linker-script directive, ...) rather than hard-wiring a file format
//! into the core.

use std::collections::HashMap;

/// RAM, access-bank, and program-memory sizes for one PIC18 part, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorInfo {
    /// Size of general RAM (excluding SFRs), in bytes.
    pub ram: u32,
    /// Size of the directly-addressable access bank, in bytes.
    pub access: u32,
    /// Size of program memory (ROM/Flash), in bytes.
    pub progmem: u32,
}

/// A `name -> ProcessorInfo` lookup table.
///
/// [`ProcessorTable::default`] is seeded with the two processors the
/// original's `_PROCESSORS` COFF `proctype` table names explicitly
/// (`18f2550`, `18f26j13`); callers extend it with [`ProcessorTable::register`]
/// or build one from scratch with [`ProcessorTable::from_entries`].
#[derive(Debug, Clone, Default)]
pub struct ProcessorTable {
    entries: HashMap<String, ProcessorInfo>,
}

impl ProcessorTable {
    /// An empty table with no registered processors.
    pub fn empty() -> Self {
        ProcessorTable {
            entries: HashMap::new(),
        }
    }

    /// Build a table from an iterator of `(name, info)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, ProcessorInfo)>) -> Self {
        ProcessorTable {
            entries: entries.into_iter().collect(),
        }
    }

    /// Register (or overwrite) a processor's memory layout.
    pub fn register(&mut self, name: impl Into<String>, info: ProcessorInfo) {
        self.entries.insert(name.into(), info);
    }

    /// Look up a processor by name.
    pub fn get(&self, name: &str) -> Option<ProcessorInfo> {
        self.entries.get(name).copied()
    }

    /// The built-in catalogue: the processors named in the COFF `proctype`
    /// table of `picc/coff.py` (`0x2550 -> 18f2550`, `0xd616 -> 18f26j13`).
    ///
    /// Sizes are the documented PIC18F2550/PIC18F26J13 memory layouts:
    /// 2 KiB RAM / 96-byte access bank / 32 KiB flash for the 2550, and
    /// 3.8 KiB RAM / 96-byte access bank / 64 KiB flash for the 26J13.
    pub fn builtin() -> Self {
        let mut table = ProcessorTable::empty();
        table.register(
            "18f2550",
            ProcessorInfo {
                ram: 0x800,
                access: 0x60,
                progmem: 0x8000,
            },
        );
        table.register(
            "18f26j13",
            ProcessorInfo {
                ram: 0xF00,
                access: 0x60,
                progmem: 0x10000,
            },
        );
        table
    }
}
