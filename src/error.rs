//! Crate-wide error type.
//!
//! Fatal failures (spec.md "§7 Fatal") surface as `Error`. Non-fatal
//! errors and warnings do not: they are recorded on a [`crate::diagnostics::Diagnostics`]
//! sink so that the link can continue.

use core::fmt;
use core::result;

/// The error type returned by fatal parsing and linking operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred while reading an object or archive.
    Io(std::io::Error),
    /// A `scroll` read/write failed (truncated record, bad alignment, ...).
    Scroll(scroll::Error),
    /// The input was structurally invalid in a way specific to this format
    /// (bad magic, unknown section type, out-of-range index, unimplemented
    /// relocation type, ...).
    Malformed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "{}", err),
            Error::Scroll(err) => write!(f, "{}", err),
            Error::Malformed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Scroll(err) => Some(err),
            Error::Malformed(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        Error::Scroll(err)
    }
}

/// A `Result` alias for fallible operations in this crate.
pub type Result<T> = result::Result<T, Error>;
