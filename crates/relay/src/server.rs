//! Relay server: accept loop, per-connection pairing and background sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use relaydrop_protocol::Token;
use relaydrop_protocol::wire::{read_token, write_ready};

use crate::RelayError;
use crate::config::RelayConfig;
use crate::forward::{ForwardOutcome, forward};
use crate::registry::{Claim, PendingRegistration, PendingTable};

/// The rendezvous relay.
///
/// Holds the pending-registration table and hands it to one task per
/// accepted connection.
pub struct RelayServer {
    config: RelayConfig,
    table: Arc<PendingTable>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Arc<Self> {
        Arc::new(Self {
            table: Arc::new(PendingTable::new(config.pairing_timeout)),
            config,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available once [`run`](Self::run) or [`serve`](Self::serve) started.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// The shared pending-registration table.
    pub fn table(&self) -> &Arc<PendingTable> {
        &self.table
    }

    /// Stops the accept loop and the sweeper.
    ///
    /// Transfers already being forwarded run to completion.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(self: &Arc<Self>) -> Result<(), RelayError> {
        self.config.validate()?;
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener).await
    }

    /// Serves on an already-bound listener until shutdown.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<(), RelayError> {
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("relay listening on {local_addr}");

        let sweeper = tokio::spawn(sweep_loop(
            Arc::clone(&self.table),
            self.config.sweep_interval,
            self.cancel.clone(),
        ));

        let result = loop {
            // Cheap pass on the accept cadence as well, in addition to the timer.
            self.table.sweep().await;

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("relay shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let accepted_at = Instant::now();
                            tracing::debug!(%peer_addr, "connection accepted");
                            let table = Arc::clone(&self.table);
                            let pairing_timeout = self.config.pairing_timeout;
                            tokio::spawn(async move {
                                let result = handle_connection(
                                    table,
                                    stream,
                                    peer_addr,
                                    accepted_at,
                                    pairing_timeout,
                                )
                                .await;
                                if let Err(e) = result {
                                    tracing::warn!(%peer_addr, "connection abandoned: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        };

        sweeper.abort();
        result
    }
}

/// Evicts stale registrations every `interval` until cancelled.
async fn sweep_loop(table: Arc<PendingTable>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = table.sweep().await;
                if evicted > 0 {
                    tracing::debug!(evicted, "sweep evicted stale registrations");
                }
            }
        }
    }
}

/// Reads the token, then either registers the connection or pairs it.
///
/// The token read and the wait in the table share one deadline, counted
/// from `accepted_at`.
async fn handle_connection(
    table: Arc<PendingTable>,
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    accepted_at: Instant,
    pairing_timeout: Duration,
) -> Result<(), RelayError> {
    let deadline = tokio::time::Instant::from_std(accepted_at + pairing_timeout);
    let token = match tokio::time::timeout_at(deadline, read_token(&mut stream)).await {
        Ok(Ok(token)) => token,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(RelayError::PairingTimeout),
    };

    match table
        .register_or_claim(token, stream, peer_addr, accepted_at)
        .await
    {
        Claim::Registered => {
            tracing::info!(token = %token.redacted(), %peer_addr, "registered, waiting for partner");
            Ok(())
        }
        Claim::Rejected(stream) => {
            drop(stream);
            Err(RelayError::TokenCollision(token.redacted()))
        }
        Claim::Paired { sender, receiver } => {
            let result = relay_pair(token, sender, receiver, peer_addr).await;
            table.finish(&token).await;
            result
        }
    }
}

/// Signals the waiting sender and copies its stream to the receiver.
///
/// Both connections are closed when this returns.
async fn relay_pair(
    token: Token,
    sender: PendingRegistration,
    mut receiver: TcpStream,
    receiver_addr: SocketAddr,
) -> Result<(), RelayError> {
    let PendingRegistration {
        stream: mut sender_stream,
        peer_addr: sender_addr,
        ..
    } = sender;

    write_ready(&mut sender_stream).await?;
    tracing::info!(
        token = %token.redacted(),
        sender = %sender_addr,
        receiver = %receiver_addr,
        "paired, forwarding"
    );

    let outcome = forward(&mut sender_stream, &mut receiver).await;
    drop(sender_stream);
    drop(receiver);

    match outcome {
        ForwardOutcome::SenderFinished { bytes } => {
            tracing::info!(token = %token.redacted(), bytes, "transfer relayed");
            Ok(())
        }
        ForwardOutcome::ReceiverClosed { bytes, error }
        | ForwardOutcome::SenderFailed { bytes, error } => {
            Err(RelayError::Forward { bytes, source: error })
        }
    }
}
