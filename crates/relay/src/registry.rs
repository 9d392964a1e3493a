//! Pending-registration table.
//!
//! Every lookup, removal and insertion happens under one mutex, so for a
//! given token exactly one connection can take the pairing transition.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use tokio::io::ReadBuf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use relaydrop_protocol::Token;

/// A first-arriving connection waiting for its partner.
#[derive(Debug)]
pub struct PendingRegistration {
    pub token: Token,
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
    /// When the relay accepted the connection; the pairing deadline counts from here.
    pub accepted_at: Instant,
}

/// Result of a non-blocking liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Closed,
}

impl PendingRegistration {
    pub fn new(
        token: Token,
        stream: TcpStream,
        peer_addr: SocketAddr,
        accepted_at: Instant,
    ) -> Self {
        Self {
            token,
            stream,
            peer_addr,
            accepted_at,
        }
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.accepted_at.elapsed()
    }

    pub fn is_expired(&self, pairing_timeout: Duration) -> bool {
        self.age() >= pairing_timeout
    }

    /// Peeks one byte without waiting.
    ///
    /// End of stream or a socket error means the peer is gone; pending
    /// data or nothing to read yet both count as alive.
    pub fn probe(&self) -> Liveness {
        let mut byte = [0u8; 1];
        let mut buf = ReadBuf::new(&mut byte);
        let mut cx = Context::from_waker(Waker::noop());
        match self.stream.poll_peek(&mut cx, &mut buf) {
            Poll::Ready(Ok(0)) | Poll::Ready(Err(_)) => Liveness::Closed,
            Poll::Ready(Ok(_)) | Poll::Pending => Liveness::Alive,
        }
    }
}

/// What happened when a connection presented its token.
#[derive(Debug)]
pub enum Claim {
    /// No partner yet; the connection is now pending.
    Registered,
    /// A live partner was waiting. The token is now in flight until
    /// [`PendingTable::finish`] is called.
    Paired {
        sender: PendingRegistration,
        receiver: TcpStream,
    },
    /// The token is already being relayed; the connection is handed back
    /// to be closed.
    Rejected(TcpStream),
}

#[derive(Default)]
struct TableState {
    pending: HashMap<Token, PendingRegistration>,
    in_flight: HashSet<Token>,
}

/// Token-keyed table of pending registrations, shared by every connection
/// handler and the sweeper.
pub struct PendingTable {
    state: Mutex<TableState>,
    pairing_timeout: Duration,
}

impl PendingTable {
    pub fn new(pairing_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(TableState::default()),
            pairing_timeout,
        }
    }

    /// Registers `stream` under `token`, or pairs it with the connection
    /// already waiting there.
    ///
    /// A waiting entry that is dead or past its deadline is dropped and
    /// replaced by the newcomer instead of being paired.
    pub async fn register_or_claim(
        &self,
        token: Token,
        stream: TcpStream,
        peer_addr: SocketAddr,
        accepted_at: Instant,
    ) -> Claim {
        let mut state = self.state.lock().await;

        if state.in_flight.contains(&token) {
            warn!(token = %token.redacted(), %peer_addr, "token collision with an active transfer");
            return Claim::Rejected(stream);
        }

        if let Some(waiting) = state.pending.remove(&token) {
            if waiting.is_expired(self.pairing_timeout) || waiting.probe() == Liveness::Closed {
                info!(
                    token = %token.redacted(),
                    stale_peer = %waiting.peer_addr,
                    %peer_addr,
                    "replacing stale registration"
                );
            } else {
                state.in_flight.insert(token);
                debug!(
                    token = %token.redacted(),
                    waited_ms = waiting.age().as_millis() as u64,
                    "pairing"
                );
                return Claim::Paired {
                    sender: waiting,
                    receiver: stream,
                };
            }
        }

        let entry = PendingRegistration::new(token, stream, peer_addr, accepted_at);
        state.pending.insert(token, entry);
        Claim::Registered
    }

    /// Releases an in-flight token once its forwarding has ended.
    pub async fn finish(&self, token: &Token) {
        self.state.lock().await.in_flight.remove(token);
    }

    /// Evicts pending entries that timed out or whose peer went away.
    ///
    /// Dropping an entry closes its connection. Returns the number evicted.
    pub async fn sweep(&self) -> usize {
        let mut state = self.state.lock().await;
        let before = state.pending.len();
        let pairing_timeout = self.pairing_timeout;

        state.pending.retain(|token, entry| {
            if entry.is_expired(pairing_timeout) {
                info!(token = %token.redacted(), peer = %entry.peer_addr, "pairing timed out");
                return false;
            }
            if entry.probe() == Liveness::Closed {
                info!(token = %token.redacted(), peer = %entry.peer_addr, "pending sender disconnected");
                return false;
            }
            true
        });

        before - state.pending.len()
    }

    /// Number of pending registrations.
    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of tokens currently being forwarded.
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    pub async fn contains(&self, token: &Token) -> bool {
        self.state.lock().await.pending.contains_key(token)
    }
}
