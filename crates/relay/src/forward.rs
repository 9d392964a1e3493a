//! One-way byte forwarding from a paired sender to its receiver.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use relaydrop_protocol::CHUNK_SIZE;

/// How a forwarding run ended.
///
/// The sender closing its stream is the only successful completion.
#[derive(Debug)]
pub enum ForwardOutcome {
    /// Sender reached end of stream; everything read was delivered.
    SenderFinished { bytes: u64 },
    /// Writing to the receiver failed.
    ReceiverClosed { bytes: u64, error: std::io::Error },
    /// Reading from the sender failed before end of stream.
    SenderFailed { bytes: u64, error: std::io::Error },
}

impl ForwardOutcome {
    /// Bytes delivered to the receiver.
    pub fn bytes(&self) -> u64 {
        match self {
            Self::SenderFinished { bytes }
            | Self::ReceiverClosed { bytes, .. }
            | Self::SenderFailed { bytes, .. } => *bytes,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::SenderFinished { .. })
    }
}

/// Copies `from` into `to` in [`CHUNK_SIZE`] reads until `from` ends or
/// either side fails, then shuts down the write half of `to`.
pub async fn forward<R, W>(from: &mut R, to: &mut W) -> ForwardOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut bytes: u64 = 0;

    let outcome = loop {
        let n = match from.read(&mut buf).await {
            Ok(0) => break ForwardOutcome::SenderFinished { bytes },
            Ok(n) => n,
            Err(error) => break ForwardOutcome::SenderFailed { bytes, error },
        };
        if let Err(error) = to.write_all(&buf[..n]).await {
            break ForwardOutcome::ReceiverClosed { bytes, error };
        }
        bytes += n as u64;
    };

    // Best effort: the receiver may already be gone.
    let _ = to.shutdown().await;
    outcome
}
