//! Rendezvous relay for relaydrop transfers.
//!
//! Accepts TCP connections, reads a token from each, and pairs the first
//! and second connection presenting the same token. The first one is held
//! as a pending registration; when the second arrives the relay tells the
//! first to proceed and copies its bytes to the second until end of stream.
//! File content is never stored.

mod config;
mod forward;
mod registry;
mod server;

pub use config::RelayConfig;
pub use forward::{ForwardOutcome, forward};
pub use registry::{Claim, Liveness, PendingRegistration, PendingTable};
pub use server::RelayServer;

use std::time::Duration;

/// Deadline for a connection to be paired, counted from accept.
pub const PAIRING_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Cadence of the background stale-entry sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Errors produced by the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] relaydrop_protocol::ProtocolError),

    #[error("pairing timed out")]
    PairingTimeout,

    #[error("token {0} is already being relayed")]
    TokenCollision(String),

    #[error("forwarding stopped after {bytes} bytes: {source}")]
    Forward {
        bytes: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}
