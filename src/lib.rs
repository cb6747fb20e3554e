//! A linker core for relocatable COFF objects produced by PIC18
//! microcontroller toolchains.
//!
//! The pipeline is: decode one or more [`coff::Object`]s (optionally
//! pulled out of an `ar` [`archive`]), [`place`] their sections in the
//! target processor's code and data memories, build the whole link's
//! [`externs`] table, [`reloc`] the code sections against it, then stream
//! the result through a [`hex::HexSink`]. [`link::link`] drives all of
//! that end to end; the stages are also exposed individually for callers
//! that need to inspect or alter intermediate state.
//!
//! Fatal, structural failures (a file that is not valid COFF, a relocation
//! type this linker does not implement) are returned as [`error::Error`].
//! Everything else that the original treated as "print and keep going" is
//! recorded on a [`diagnostics::Diagnostics`] sink threaded through the
//! pipeline instead.

#[cfg(feature = "archive")]
pub mod archive;
pub mod coff;
pub mod diagnostics;
pub mod error;
pub mod externs;
pub mod hex;
pub mod link;
pub mod memory;
pub mod place;
pub mod processor;
pub mod reloc;

pub use coff::Object;
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{Error, Result};
pub use hex::{HexSink, IntelHexImage};
pub use link::link;
pub use processor::{ProcessorInfo, ProcessorTable};
