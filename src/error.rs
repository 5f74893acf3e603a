
//! Error type for everything that can go wrong while converting an archive.

use std::borrow::Cow;
use std::io;
use std::fmt;

/// A result that may contain a tilebc error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains a tilebc error.
pub type UnitResult = Result<()>;


/// An error that may happen while reading, converting or writing an archive.
/// Distinguishes between invalid files, unsupported features and io errors.
#[derive(Debug)]
pub enum Error {

    /// The contents of the file are not supported by
    /// this version of the library or by the requested codec.
    NotSupported(Cow<'static, str>),

    /// The contents of the archive are contradicting, invalid or truncated.
    /// Also returned for `io::ErrorKind::UnexpectedEof` errors.
    Invalid(Cow<'static, str>),

    /// The underlying byte stream could not be read successfully,
    /// probably due to file system related errors.
    Io(io::Error),
}


impl Error {

    /// Create an error of the variant `Invalid`.
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Invalid(message.into())
    }

    /// Create an error of the variant `NotSupported`.
    pub(crate) fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Error::NotSupported(message.into())
    }
}

/// Enable using the `?` operator on `io::Result`.
impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            Error::invalid("reading more bytes than available")
        }
        else {
            Error::Io(error)
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(formatter, "io error: {}", err),
            Error::NotSupported(message) => write!(formatter, "not supported: {}", message),
            Error::Invalid(message) => write!(formatter, "invalid: {}", message),
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


// The following functions exist to avoid unexpected integer overflow in casts.

/// Panics on overflow. Archive headers are validated to smaller sizes long before this could overflow.
pub(crate) fn usize_to_u32(value: usize) -> u32 {
    u32::try_from(value).expect("(usize as u32) overflowed")
}

/// Panics on overflow. Tile dimensions are validated long before this could overflow.
pub(crate) fn usize_to_u16(value: usize) -> u16 {
    u16::try_from(value).expect("(usize as u16) overflowed")
}
