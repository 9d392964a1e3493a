//! Error types for the transfer roles.

use relaydrop_protocol::ProtocolError;

/// Errors produced by the sender and receiver.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("relay closed before pairing")]
    RelayClosed,

    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("connection closed after {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },

    #[error("local file changed while sending: read {read} of {expected} bytes")]
    SourceChanged { expected: u64, read: u64 },

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("connection timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}
