use std::borrow::Cow;
use std::error;
use std::fmt;
use std::io;
use std::result;

use num::ToPrimitive;

#[derive(Debug)]
pub enum Error {
    InvalidFormat(Cow<'static, str>),
    UnexpectedEndOfFile(Option<Cow<'static, str>>),
    /// The input could not be opened or read, or it is empty.
    NotFound(Cow<'static, str>),
    Io(io::Error)
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InvalidFormat(ref s) => write!(f, "invalid format: {}", s),
            Error::UnexpectedEndOfFile(None) => write!(f, "unexpected end of file"),
            Error::UnexpectedEndOfFile(Some(ref s)) => write!(f, "unexpected end of file: {}", s),
            Error::NotFound(ref s) => write!(f, "input not found: {}", s),
            Error::Io(ref e) => write!(f, "I/O error: {}", e)
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            _ => None
        }
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

pub type Result<T> = result::Result<T, Error>;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32
}

impl<T: ToPrimitive, U: ToPrimitive> From<(T, U)> for Dimensions {
    fn from((w, h): (T, U)) -> Dimensions {
        Dimensions {
            width: w.to_u32().unwrap_or(u32::MAX),
            height: h.to_u32().unwrap_or(u32::MAX)
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A non-fatal problem found while walking a container or decoding a payload.
///
/// Anomalies never abort extraction; they are attached to the part of the record
/// which was being built when they were found, next to whatever was decoded so far.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Anomaly {
    /// A structural read ran past the end of the available bytes.
    TruncatedContainer { offset: usize, context: Cow<'static, str> },
    /// A sync code, signature or required constant did not have its expected value.
    FormatInvariant { offset: usize, context: Cow<'static, str> },
    /// A byte expected to start a JPEG marker was not `0xFF`.
    MalformedMarkerStream { offset: usize, found: u8 },
    /// An offset inside a payload points outside of it or backwards into already visited data.
    InvalidOffset { offset: usize, context: Cow<'static, str> }
}

impl Anomaly {
    /// Converts a decoding error into a note; `offset` is where the failed read started.
    pub fn from_error(offset: usize, e: Error) -> Anomaly {
        match e {
            Error::UnexpectedEndOfFile(context) => Anomaly::TruncatedContainer {
                offset: offset,
                context: context.unwrap_or(Cow::Borrowed("unexpected end of data"))
            },
            Error::InvalidFormat(context) => Anomaly::FormatInvariant { offset: offset, context: context },
            e => Anomaly::FormatInvariant { offset: offset, context: e.to_string().into() }
        }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        match *self {
            Anomaly::TruncatedContainer { offset, .. } |
            Anomaly::FormatInvariant { offset, .. } |
            Anomaly::MalformedMarkerStream { offset, .. } |
            Anomaly::InvalidOffset { offset, .. } => offset
        }
    }

    pub fn set_offset(&mut self, new_offset: usize) {
        match *self {
            Anomaly::TruncatedContainer { ref mut offset, .. } |
            Anomaly::FormatInvariant { ref mut offset, .. } |
            Anomaly::MalformedMarkerStream { ref mut offset, .. } |
            Anomaly::InvalidOffset { ref mut offset, .. } => *offset = new_offset
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Anomaly::TruncatedContainer { offset, ref context } =>
                write!(f, "truncated data at offset {}: {}", offset, context),
            Anomaly::FormatInvariant { offset, ref context } =>
                write!(f, "format violation at offset {}: {}", offset, context),
            Anomaly::MalformedMarkerStream { offset, found } =>
                write!(f, "malformed marker stream at offset {}: expected 0xFF, found {:#04x}", offset, found),
            Anomaly::InvalidOffset { offset, ref context } =>
                write!(f, "invalid offset {}: {}", offset, context)
        }
    }
}
