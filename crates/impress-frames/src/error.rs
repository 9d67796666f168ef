//! Error types for record parsing and decoding

use thiserror::Error;

/// Errors raised while parsing or decoding records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Text syntax error
    #[error("Parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// Input ended in the middle of a record
    #[error("Unexpected end of input")]
    UnexpectedEnd,

    /// Malformed LEB128 integer
    #[error("Invalid varint")]
    InvalidVarint,

    /// String data is not valid UTF-8
    #[error("Invalid UTF-8 in string data")]
    InvalidUtf8,

    /// Unknown value tag in binary input
    #[error("Unknown tag: {0:#04x}")]
    UnknownTag(u8),

    /// Payload does not start with a record marker
    #[error("Unrecognized payload format")]
    UnknownFormat,
}
