//! Error types for endpoint setup and socket I/O.

use std::{error, fmt, io, result};

/// A convenience wrapper around `Result` for `netpipe_core::Error`.
pub type Result<T> = result::Result<T, Error>;

/// Set of errors that can occur while operating a TCP endpoint.
///
/// These never cross the public endpoint API: factories map them to `None`
/// and workers map them to a state transition, emitting one warning either
/// way.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error returned by an OS socket operation.
    Io(io::Error),
    /// Error parsing an IPv4 socket address.
    Addr(AddrError),
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<AddrError> for Error {
    fn from(err: AddrError) -> Error {
        Error::Addr(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref err) => fmt::Display::fmt(err, f),
            Error::Addr(ref err) => fmt::Display::fmt(err, f),
        }
    }
}

/// Error occurred while trying to parse an IPv4 socket address from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrError {
    input: String,
}

impl AddrError {
    pub(crate) fn new(input: &str) -> AddrError {
        AddrError {
            input: input.to_owned(),
        }
    }
}

impl error::Error for AddrError {}

impl fmt::Display for AddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid IPv4 socket address: {:?} (expected \"a.b.c.d:port\")",
            self.input
        )
    }
}
