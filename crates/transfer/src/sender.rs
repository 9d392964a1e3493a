//! Sender role: register a token, wait for the relay's go-ahead, stream a file.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use relaydrop_protocol::wire::{read_until_ready, write_metadata, write_token};
use relaydrop_protocol::{CHUNK_SIZE, FileMetadata, ProtocolError, Token};

use crate::error::TransferError;
use crate::progress::{Progress, report};
use crate::{CONNECT_TIMEOUT, target};

/// Where the sender is in its single transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Connecting,
    AwaitingReady,
    Streaming,
    Done,
}

/// Summary of a completed send.
#[derive(Debug, Clone)]
pub struct SendReport {
    pub file_name: String,
    pub bytes: u64,
    /// Hex SHA-256 of the bytes sent.
    pub sha256: String,
}

/// Sends one file through the relay under a token.
pub struct Sender {
    relay_addr: String,
    token: Token,
    state: SenderState,
}

impl Sender {
    pub fn new(relay_addr: impl Into<String>, token: Token) -> Self {
        Self {
            relay_addr: relay_addr.into(),
            token,
            state: SenderState::Connecting,
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    fn advance(&mut self, next: SenderState) {
        debug!(from = ?self.state, to = ?next, "sender state");
        self.state = next;
    }

    /// Runs the whole transfer for the file at `path`.
    ///
    /// Waits for a receiver for as long as the relay keeps the connection
    /// open. Closing the connection after the last byte is what tells the
    /// relay and the receiver that the transfer is complete.
    pub async fn send_file(
        &mut self,
        path: &Path,
        cancel: CancellationToken,
        progress_tx: mpsc::Sender<Progress>,
    ) -> Result<SendReport, TransferError> {
        // Resolve the file before touching the network.
        let (metadata, mut file) = open_source(path).await?;
        // Fail now on a name the receiver would reject after the whole upload.
        check_frame(&metadata)?;

        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            result = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.relay_addr)) => {
                match result {
                    Ok(Ok(s)) => s,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Err(TransferError::Timeout),
                }
            }
        };
        info!(relay = %self.relay_addr, "connected to relay");

        let (mut reader, writer) = stream.into_split();
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, writer);
        write_token(&mut writer, &self.token).await?;
        self.advance(SenderState::AwaitingReady);

        let ready = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            result = read_until_ready(&mut reader) => result?,
        };
        if !ready {
            return Err(TransferError::RelayClosed);
        }
        info!("receiver connected, sending");
        self.advance(SenderState::Streaming);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            result = write_metadata(&mut writer, &metadata) => result.map_err(|e| match e {
                ProtocolError::Io(io) => TransferError::WriteFailed(io),
                other => other.into(),
            })?,
        }

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut sent: u64 = 0;

        // Every await races `cancel`: a receiver that stops reading stalls the writes.
        while sent < metadata.file_size {
            let to_read = (metadata.file_size - sent).min(CHUNK_SIZE as u64) as usize;
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                result = file.read(&mut buf[..to_read]) => result?,
            };
            if n == 0 {
                return Err(TransferError::SourceChanged {
                    expected: metadata.file_size,
                    read: sent,
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                result = writer.write_all(&buf[..n]) => {
                    result.map_err(TransferError::WriteFailed)?
                }
            }
            hasher.update(&buf[..n]);
            sent += n as u64;
            report(&progress_tx, sent, metadata.file_size);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            result = async {
                writer.flush().await?;
                writer.shutdown().await
            } => result.map_err(TransferError::WriteFailed)?,
        }
        self.advance(SenderState::Done);

        info!(file = %metadata.file_name, bytes = sent, "file sent, connection closed");
        Ok(SendReport {
            file_name: metadata.file_name,
            bytes: sent,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

/// Checks that the frame encodes and that the receiver will decode the same
/// metadata back from it.
fn check_frame(metadata: &FileMetadata) -> Result<(), TransferError> {
    let decoded = FileMetadata::decode(&metadata.encode()?)?;
    if decoded != *metadata {
        return Err(TransferError::InvalidFileName(format!(
            "name does not survive framing: {}",
            metadata.file_name
        )));
    }
    Ok(())
}

/// Opens the source file and derives its metadata frame.
async fn open_source(path: &Path) -> Result<(FileMetadata, tokio::fs::File), TransferError> {
    let file = tokio::fs::File::open(path).await?;
    let stat = file.metadata().await?;
    if !stat.is_file() {
        return Err(TransferError::InvalidFileName(format!(
            "not a regular file: {}",
            path.display()
        )));
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            TransferError::InvalidFileName(format!("no usable file name: {}", path.display()))
        })?;
    target::validate_file_name(&file_name)?;

    Ok((
        FileMetadata {
            file_name,
            file_size: stat.len(),
        },
        file,
    ))
}
