//! Wire protocol shared by the relaydrop relay, sender and receiver.
//!
//! # Wire format
//!
//! ```text
//! REGISTER (Sender/Receiver -> Relay): [16 bytes: hex token ASCII]
//! READY    (Relay -> Sender):          [4 bytes: "200\n"]
//!
//! METADATA (Sender -> Receiver, forwarded by the relay):
//!   [1024 bytes: file name, ':'-padded on both sides]
//!   [1024 bytes: decimal file size, ':'-padded on both sides]
//!
//! BODY: [file_size bytes: raw file data, any chunking]
//! ```
//!
//! The relay forwards everything after the token blindly; it never parses
//! the metadata frame. See [`wire`] for the framing rules.

pub mod error;
pub mod token;
pub mod wire;

pub use error::ProtocolError;
pub use token::{Token, generate_token};
pub use wire::FileMetadata;

/// Token length on the wire (16 hex characters).
pub const TOKEN_SIZE: usize = 16;

/// Random bytes behind each token (hex-encoded to [`TOKEN_SIZE`] characters).
pub const TOKEN_ENTROPY_BYTES: usize = TOKEN_SIZE / 2;

/// Literal status the relay writes to the sender once a receiver matched.
pub const READY_SIGNAL: &[u8; 4] = b"200\n";

/// Width of each padded metadata field.
pub const FIELD_WIDTH: usize = 1024;

/// Filler byte used to pad metadata fields.
pub const FILLER: u8 = b':';

/// Maximum chunk size for body writes, relay forwarding and receiver reads.
pub const CHUNK_SIZE: usize = 4 * 1024;

/// Default relay port.
pub const DEFAULT_RELAY_PORT: u16 = 9021;
