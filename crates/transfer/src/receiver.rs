//! Receiver role: claim a token and save the file the relay forwards.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relaydrop_protocol::wire::{read_metadata, write_token};
use relaydrop_protocol::{CHUNK_SIZE, FileMetadata, ProtocolError, Token};

use crate::error::TransferError;
use crate::progress::{Progress, report};
use crate::{CONNECT_TIMEOUT, DRAIN_TIMEOUT, target};

/// Where the receiver is in its single transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Connecting,
    ReadingMetadata,
    ReadingBody,
    Done,
}

/// Summary of a completed receive.
#[derive(Debug, Clone)]
pub struct ReceiveReport {
    /// Where the file was saved (may differ from the sent name on collision).
    pub path: PathBuf,
    pub metadata: FileMetadata,
    /// Hex SHA-256 of the bytes received.
    pub sha256: String,
}

/// Receives one file through the relay by presenting a token.
pub struct Receiver {
    relay_addr: String,
    token: Token,
    state: ReceiverState,
}

impl Receiver {
    pub fn new(relay_addr: impl Into<String>, token: Token) -> Self {
        Self {
            relay_addr: relay_addr.into(),
            token,
            state: ReceiverState::Connecting,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    fn advance(&mut self, next: ReceiverState) {
        debug!(from = ?self.state, to = ?next, "receiver state");
        self.state = next;
    }

    /// Runs the whole transfer, saving the file under `dest_dir`.
    ///
    /// The metadata frame is validated before any file is created, and a
    /// body cut short removes the partial file.
    pub async fn receive_file(
        &mut self,
        dest_dir: &Path,
        cancel: CancellationToken,
        progress_tx: mpsc::Sender<Progress>,
    ) -> Result<ReceiveReport, TransferError> {
        let mut stream = tokio::select! {
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

        write_token(&mut stream, &self.token).await?;
        self.advance(ReceiverState::ReadingMetadata);

        let mut reader = BufReader::with_capacity(CHUNK_SIZE, stream);
        let metadata = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            result = read_metadata(&mut reader) => match result {
                Ok(m) => m,
                Err(ProtocolError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(TransferError::RelayClosed);
                }
                Err(e) => return Err(e.into()),
            },
        };
        info!(file = %metadata.file_name, size = metadata.file_size, "incoming file");

        let (path, file) = target::create_target(dest_dir, &metadata.file_name).await?;
        self.advance(ReceiverState::ReadingBody);

        match read_body(&mut reader, file, metadata.file_size, &cancel, &progress_tx).await {
            Ok(sha256) => {
                drain_trailing(&mut reader).await;
                self.advance(ReceiverState::Done);
                info!(path = %path.display(), bytes = metadata.file_size, "file received");
                Ok(ReceiveReport {
                    path,
                    metadata,
                    sha256,
                })
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), "failed to remove partial file: {rm}");
                }
                Err(e)
            }
        }
    }
}

/// Copies exactly `size` bytes into `file`, whatever the segmentation.
///
/// Returns the hex SHA-256 of the body.
async fn read_body<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
    mut file: tokio::fs::File,
    size: u64,
    cancel: &CancellationToken,
    progress_tx: &mpsc::Sender<Progress>,
) -> Result<String, TransferError> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received: u64 = 0;
    report(progress_tx, 0, size);

    while received < size {
        let to_read = (size - received).min(CHUNK_SIZE as u64) as usize;
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            result = reader.read(&mut buf[..to_read]) => result?,
        };
        if n == 0 {
            return Err(TransferError::Truncated {
                expected: size,
                received,
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            result = file.write_all(&buf[..n]) => result?,
        }
        hasher.update(&buf[..n]);
        received += n as u64;
        report(progress_tx, received, size);
    }

    file.flush().await?;
    Ok(hex::encode(hasher.finalize()))
}

/// One bounded read that discards anything the peer sent past the body.
async fn drain_trailing<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    match tokio::time::timeout(DRAIN_TIMEOUT, reader.read(&mut buf)).await {
        Ok(Ok(0)) | Err(_) => {}
        Ok(Ok(n)) => debug!(bytes = n, "discarded trailing bytes"),
        Ok(Err(e)) => debug!("drain read failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaydrop_protocol::wire::{FRAME_SIZE, pad_field, read_token, write_metadata};
    use relaydrop_protocol::{FIELD_WIDTH, generate_token};
    use tokio::net::TcpListener;

    /// Accepts one receiver, checks its token, writes `payload` and closes.
    async fn fake_relay(listener: TcpListener, expected: Token, payload: Vec<u8>) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let token = read_token(&mut stream).await.unwrap();
        assert_eq!(token, expected);
        stream.write_all(&payload).await.unwrap();
    }

    async fn framed(name: &str, body: &[u8]) -> Vec<u8> {
        let mut wire = Vec::new();
        let metadata = FileMetadata {
            file_name: name.into(),
            file_size: body.len() as u64,
        };
        write_metadata(&mut wire, &metadata).await.unwrap();
        wire.extend_from_slice(body);
        wire
    }

    async fn run_receiver(
        payload: Vec<u8>,
        dest: &Path,
    ) -> (Result<ReceiveReport, TransferError>, ReceiverState) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let token = generate_token();
        let relay = tokio::spawn(fake_relay(listener, token, payload));

        let (tx, _rx) = mpsc::channel(64);
        let mut receiver = Receiver::new(addr, token);
        let result = receiver
            .receive_file(dest, CancellationToken::new(), tx)
            .await;
        relay.await.unwrap();
        (result, receiver.state())
    }

    #[tokio::test]
    async fn saves_exact_body() {
        let dir = tempfile::tempdir().unwrap();
        let body: Vec<u8> = (0..5000u32).map(|i| (i % 253) as u8).collect();

        let (result, state) = run_receiver(framed("video.mkv", &body).await, dir.path()).await;
        let report = result.unwrap();
        assert_eq!(state, ReceiverState::Done);
        assert_eq!(report.path, dir.path().join("video.mkv"));
        assert_eq!(std::fs::read(&report.path).unwrap(), body);
    }

    #[tokio::test]
    async fn trailing_bytes_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut payload = framed("a.txt", b"exact").await;
        payload.extend_from_slice(b"EXTRA");

        let (result, _) = run_receiver(payload, dir.path()).await;
        let report = result.unwrap();
        assert_eq!(std::fs::read(&report.path).unwrap(), b"exact");
    }

    #[tokio::test]
    async fn empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let (result, _) = run_receiver(framed("empty.log", b"").await, dir.path()).await;
        let report = result.unwrap();
        assert_eq!(report.metadata.file_size, 0);
        assert!(std::fs::read(&report.path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_frame_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut payload = pad_field(b"no-extension", FIELD_WIDTH).unwrap();
        payload.extend(pad_field(b"3", FIELD_WIDTH).unwrap());
        payload.extend_from_slice(b"abc");

        let (result, state) = run_receiver(payload, dir.path()).await;
        assert!(matches!(
            result,
            Err(TransferError::Protocol(ProtocolError::MissingFileName(_)))
        ));
        assert_eq!(state, ReceiverState::ReadingMetadata);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn truncated_body_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut payload = framed("big.bin", &[7u8; 100]).await;
        payload.truncate(FRAME_SIZE + 40);

        let (result, state) = run_receiver(payload, dir.path()).await;
        assert!(matches!(
            result,
            Err(TransferError::Truncated {
                expected: 100,
                received: 40
            })
        ));
        assert_eq!(state, ReceiverState::ReadingBody);
        assert!(!dir.path().join("big.bin").exists());
    }

    #[tokio::test]
    async fn cancel_mid_body_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let token = generate_token();

        let payload = framed("stalled.bin", &[1u8; 10_000]).await;
        let relay = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_token(&mut stream).await.unwrap();
            stream.write_all(&payload[..FRAME_SIZE + 100]).await.unwrap();
            // The rest of the body never comes.
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            drop(stream);
        });

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let (tx, _rx) = mpsc::channel(64);
        let mut receiver = Receiver::new(addr, token);
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            receiver.receive_file(dir.path(), cancel, tx),
        )
        .await
        .expect("receive_file should return promptly once cancelled");
        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert_eq!(receiver.state(), ReceiverState::ReadingBody);
        assert!(!dir.path().join("stalled.bin").exists());
        relay.abort();
    }

    #[tokio::test]
    async fn relay_closing_before_frame() {
        let dir = tempfile::tempdir().unwrap();
        let (result, _) = run_receiver(Vec::new(), dir.path()).await;
        assert!(matches!(result, Err(TransferError::RelayClosed)));
    }

    #[tokio::test]
    async fn traversal_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inbox");
        let (result, _) = run_receiver(framed("../escape.txt", b"x").await, &inner).await;
        assert!(matches!(result, Err(TransferError::InvalidFileName(_))));
        assert!(!dir.path().join("escape.txt").exists());
    }
}
