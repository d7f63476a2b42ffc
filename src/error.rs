//! Error type shared by every fallible operation in the crate.

use core::fmt;

/// Everything that can go wrong while building, querying, or (un)flattening
/// a message. Recoverable conditions only; internal invariants are enforced
/// with assertions instead.
#[derive(Debug)]
pub enum Error {
    /// No field with the requested name exists.
    NameNotFound,
    /// A field with the name exists but holds a different value kind.
    BadType,
    /// The element index is at or beyond the field's count.
    BadIndex,
    /// A size mismatch on a fixed-size field, an over-long or malformed name,
    /// or a corrupt/rejected flattened buffer.
    BadValue,
    /// Allocation failure. The operation was rolled back and the message is
    /// unchanged.
    NoMemory,
    /// The destination buffer is smaller than `flattened_size()`.
    BufferOverflow,
    /// Propagated verbatim from the caller's sink or source.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NameNotFound => write!(f, "name not found"),
            Error::BadType => write!(f, "name exists with a different type"),
            Error::BadIndex => write!(f, "index out of range"),
            Error::BadValue => write!(f, "bad value"),
            Error::NoMemory => write!(f, "out of memory"),
            Error::BufferOverflow => write!(f, "destination buffer too small"),
            Error::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Io(a), Error::Io(b)) => a.kind() == b.kind(),
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::NoMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn display_is_stable() {
        assert_eq!(Error::NameNotFound.to_string(), "name not found");
        assert_eq!(Error::BadType.to_string(), "name exists with a different type");
        assert_eq!(Error::BufferOverflow.to_string(), "destination buffer too small");
    }

    #[test]
    fn equality_ignores_io_payload() {
        let a = Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "short"));
        let b = Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "other"));
        let c = Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(Error::BadType, Error::NameNotFound);
        assert_eq!(Error::BadIndex, Error::BadIndex);
    }

    #[test]
    fn io_source_is_preserved() {
        use std::error::Error as _;

        let err = Error::from(io::Error::new(io::ErrorKind::Other, "sink failed"));
        assert!(err.source().is_some());
        assert!(Error::BadValue.source().is_none());
    }
}
