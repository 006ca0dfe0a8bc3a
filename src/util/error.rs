//! Error types for the Alembic library.

use thiserror::Error;

/// Main error type for archive parsing.
///
/// Parsing is read-only: a failure at one object or property does not
/// invalidate the rest of the archive. `Archive::parse` returns this type;
/// per-path lookups (`Archive::find`, `Object::find_property`) return
/// `Option` instead, since "not found" is an expected outcome rather than a
/// parse failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The 16-byte Ogawa header did not start with the expected magic bytes.
    #[error("bad Ogawa magic bytes")]
    BadMagic,

    /// A buffer was shorter than the minimum size required to hold a fixed
    /// structure (header, group count, data length, ...).
    #[error("buffer too short: needed {needed} bytes, have {actual}")]
    TooShort { needed: usize, actual: usize },

    /// A tagged offset, count, or length pointed outside the backing buffer.
    #[error("read of {len} bytes at offset {offset} exceeds buffer of {buffer_len} bytes")]
    OutOfBounds {
        offset: u64,
        len: u64,
        buffer_len: u64,
    },

    /// A node or record was not shaped the way a fixed layout requires, e.g.
    /// a positional archive child was a Data node where a Group was
    /// expected.
    #[error("expected {expected}, found {found}")]
    StructureMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A packed enum field held a value outside its known range.
    #[error("invalid {what} value: {value}")]
    BadEnum { what: &'static str, value: u32 },

    /// An index was outside the bound it is checked against (sample index,
    /// child index, metadata table slot, ...).
    #[error("{what} index {index} out of range (bound {bound})")]
    BadIndex {
        what: &'static str,
        index: u64,
        bound: u64,
    },

    /// The data is structurally valid Ogawa but uses a feature this reader
    /// does not implement.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Any other failure, with a human-readable description.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a structure-mismatch error.
    pub fn structure(expected: &'static str, found: &'static str) -> Self {
        Self::StructureMismatch { expected, found }
    }

    /// Create a bad-index error.
    pub fn bad_index(what: &'static str, index: u64, bound: u64) -> Self {
        Self::BadIndex { what, index, bound }
    }
}

/// Result type alias for Alembic operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::BadMagic;
        assert!(e.to_string().contains("magic"));

        let e = Error::bad_index("sample", 5, 3);
        assert!(e.to_string().contains('5'));
        assert!(e.to_string().contains('3'));
    }

    #[test]
    fn test_structure_mismatch() {
        let e = Error::structure("group", "data");
        assert_eq!(e.to_string(), "expected group, found data");
    }

    #[test]
    fn test_out_of_bounds_display() {
        let e = Error::OutOfBounds {
            offset: 100,
            len: 8,
            buffer_len: 50,
        };
        assert!(e.to_string().contains("100"));
    }
}
