//! Channel error codes
//!
//! Every channel operation reports one of these. Component errors convert
//! into [`Error`] so multi-step operations can short-circuit with `?`.

use core::fmt;

/// Result type used across the channel API
pub type Result<T> = core::result::Result<T, Error>;

/// Channel error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Missing or empty buffer where one is required
    Null,
    /// Payload larger than the channel or destination allows
    InvalidLength,
    /// Setter argument outside the supported range
    InvalidParam,
    /// Malformed data received from the peer
    InvalidData,
    /// Queue or staging buffer is full
    ResourceExhausted,
    /// Nothing to read
    NotFound,
    /// Operation not allowed in the current lifecycle or link state
    InvalidState,
    /// Operation has no meaning for this transport
    NotSupported,
    /// Unexpected failure in the radio stack
    Internal,
}

impl Error {
    /// True for errors that indicate a fault rather than a retryable condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Null | Error::Internal)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Error::Null => "null buffer",
            Error::InvalidLength => "invalid length",
            Error::InvalidParam => "invalid parameter",
            Error::InvalidData => "invalid data",
            Error::ResourceExhausted => "resources exhausted",
            Error::NotFound => "not found",
            Error::InvalidState => "invalid state",
            Error::NotSupported => "not supported",
            Error::Internal => "internal error",
        };
        f.write_str(text)
    }
}
