//! Decoder error types
//!
//! Only header-introspection failures are fatal for an interval; everything
//! else is counted or logged and decoding continues (see the per-session
//! statistics in the decoder module).

use thiserror::Error;

/// Fatal decode errors that abort the whole acquisition interval
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload framing cannot be determined from the packet header
    #[error("cannot determine padding format: unknown data_format {0}")]
    UnknownDataFormat(u8),

    /// A required header field could not be extracted
    #[error("packet header introspection failed: {0}")]
    HeaderIntrospection(String),
}

impl DecodeError {
    /// Create a header-introspection error
    pub fn header(msg: impl Into<String>) -> Self {
        Self::HeaderIntrospection(msg.into())
    }
}

/// Result type alias using DecodeError
pub type DecodeResult<T> = Result<T, DecodeError>;
