//! Cryptographically secure token generation and parsing.

use std::fmt;

use rand::Rng;

use crate::error::ProtocolError;
use crate::{TOKEN_ENTROPY_BYTES, TOKEN_SIZE};

/// Shared secret correlating one sender's registration with one receiver's claim.
///
/// Holds exactly [`TOKEN_SIZE`] raw bytes as they appear on the wire. Tokens
/// produced by [`generate_token`] are lowercase hex, but the relay accepts
/// any byte sequence of the right length.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token([u8; TOKEN_SIZE]);

impl Token {
    /// Wraps raw wire bytes.
    pub fn from_bytes(bytes: [u8; TOKEN_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses a token typed by a human (surrounding whitespace is ignored).
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();
        let bytes: [u8; TOKEN_SIZE] = text.as_bytes().try_into().map_err(|_| {
            ProtocolError::InvalidToken(format!(
                "expected {TOKEN_SIZE} characters, got {}",
                text.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_SIZE] {
        &self.0
    }

    /// Short prefix suitable for logs.
    pub fn redacted(&self) -> String {
        let prefix = String::from_utf8_lossy(&self.0[..4]);
        format!("{prefix}…")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.redacted())
    }
}

/// Generates a CSPRNG token as a 16-character lowercase hex string.
pub fn generate_token() -> Token {
    let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
    rand::thread_rng().fill(&mut bytes);

    let mut out = [0u8; TOKEN_SIZE];
    // Hex of TOKEN_ENTROPY_BYTES is always exactly TOKEN_SIZE bytes.
    out.copy_from_slice(hex::encode(bytes).as_bytes());
    Token(out)
}
