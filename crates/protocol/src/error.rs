//! Error types for the wire protocol.

/// Errors produced while encoding or decoding protocol data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed size: {0:?}")]
    MalformedSize(String),

    #[error("missing file name: {0:?}")]
    MissingFileName(String),

    #[error("field too long: {len} bytes (width {width})")]
    FieldTooLong { len: usize, width: usize },

    #[error("frame must be {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("invalid token: {0}")]
    InvalidToken(String),
}
