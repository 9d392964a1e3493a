//! Padded text framing for the per-transfer metadata frame.
//!
//! Each field is padded to exactly [`FIELD_WIDTH`] bytes with [`FILLER`],
//! one byte on the right, then one on the left, alternating until the width
//! is reached. Decoding trims the filler from both ends, so no length prefix
//! is transmitted. Names must not start or end with the filler byte.
//!
//! The body that follows the frame is raw bytes; only the declared
//! `file_size` decides where it ends.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::ProtocolError;
use crate::token::Token;
use crate::{FIELD_WIDTH, FILLER, READY_SIGNAL, TOKEN_SIZE};

/// Total size of an encoded metadata frame.
pub const FRAME_SIZE: usize = 2 * FIELD_WIDTH;

/// File description sent once per transfer, ahead of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Bare file name (no directory components).
    pub file_name: String,
    /// Exact number of body bytes that follow the frame.
    pub file_size: u64,
}

impl FileMetadata {
    /// Encodes the frame as `[name field][size field]`, [`FRAME_SIZE`] bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut frame = pad_field(self.file_name.as_bytes(), FIELD_WIDTH)?;
        frame.extend(pad_field(self.file_size.to_string().as_bytes(), FIELD_WIDTH)?);
        Ok(frame)
    }

    /// Decodes a frame produced by [`encode`](Self::encode).
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() != FRAME_SIZE {
            return Err(ProtocolError::FrameLength {
                expected: FRAME_SIZE,
                actual: frame.len(),
            });
        }
        let (name_field, size_field) = frame.split_at(FIELD_WIDTH);

        let size_text = std::str::from_utf8(unpad_field(size_field))
            .map_err(|_| ProtocolError::InvalidUtf8("size field"))?;
        let file_size = size_text
            .parse::<u64>()
            .map_err(|_| ProtocolError::MalformedSize(size_text.to_string()))?;

        let file_name = std::str::from_utf8(unpad_field(name_field))
            .map_err(|_| ProtocolError::InvalidUtf8("file name"))?;
        // The only sanity check that a real name was sent.
        if !file_name.contains('.') {
            return Err(ProtocolError::MissingFileName(file_name.to_string()));
        }

        Ok(Self {
            file_name: file_name.to_string(),
            file_size,
        })
    }
}

/// Pads `value` to exactly `width` bytes with [`FILLER`] on both sides.
///
/// Fails when `value` does not leave room for at least one filler byte.
pub fn pad_field(value: &[u8], width: usize) -> Result<Vec<u8>, ProtocolError> {
    if value.len() >= width {
        return Err(ProtocolError::FieldTooLong {
            len: value.len(),
            width,
        });
    }

    let missing = width - value.len();
    // Right side gets the odd byte: it is the first one appended.
    let right = missing.div_ceil(2);
    let left = missing - right;

    let mut field = Vec::with_capacity(width);
    field.resize(left, FILLER);
    field.extend_from_slice(value);
    field.resize(width, FILLER);
    Ok(field)
}

/// Strips every leading and trailing [`FILLER`] byte.
pub fn unpad_field(field: &[u8]) -> &[u8] {
    let start = field.iter().position(|&b| b != FILLER).unwrap_or(field.len());
    let end = field
        .iter()
        .rposition(|&b| b != FILLER)
        .map_or(start, |i| i + 1);
    &field[start..end]
}

/// Writes the raw token bytes (no framing).
pub async fn write_token<W: AsyncWrite + Unpin>(
    writer: &mut W,
    token: &Token,
) -> Result<(), ProtocolError> {
    writer.write_all(token.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads exactly [`TOKEN_SIZE`] bytes as a token.
pub async fn read_token<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Token, ProtocolError> {
    let mut buf = [0u8; TOKEN_SIZE];
    reader.read_exact(&mut buf).await?;
    Ok(Token::from_bytes(buf))
}

/// Writes the ready signal to the sender.
pub async fn write_ready<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<(), ProtocolError> {
    writer.write_all(READY_SIGNAL).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads fixed-size chunks until the ready signal shows up.
///
/// Chunks that do not match are logged and discarded. Returns `false` if
/// the peer closed the connection before the signal arrived.
pub async fn read_until_ready<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<bool, ProtocolError> {
    let mut buf = [0u8; READY_SIGNAL.len()];
    loop {
        match reader.read_exact(&mut buf).await {
            Ok(_) if &buf == READY_SIGNAL => return Ok(true),
            Ok(_) => {
                debug!(
                    message = %String::from_utf8_lossy(&buf),
                    "discarding unexpected message while waiting for ready"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Writes the metadata frame.
pub async fn write_metadata<W: AsyncWrite + Unpin>(
    writer: &mut W,
    metadata: &FileMetadata,
) -> Result<(), ProtocolError> {
    let frame = metadata.encode()?;
    writer.write_all(&frame).await?;
    Ok(())
}

/// Reads exactly [`FRAME_SIZE`] bytes and decodes the metadata frame.
pub async fn read_metadata<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<FileMetadata, ProtocolError> {
    let mut frame = vec![0u8; FRAME_SIZE];
    reader.read_exact(&mut frame).await?;
    FileMetadata::decode(&frame)
}
