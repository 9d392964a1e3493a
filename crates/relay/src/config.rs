//! Relay configuration.

use std::net::SocketAddr;
use std::time::Duration;

use relaydrop_protocol::DEFAULT_RELAY_PORT;

use crate::{PAIRING_TIMEOUT, RelayError, SWEEP_INTERVAL};

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to listen on (port 0 = OS-assigned).
    pub listen_addr: SocketAddr,
    /// How long a connection may wait for its partner.
    pub pairing_timeout: Duration,
    /// How often pending registrations are checked for staleness.
    pub sweep_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([127, 0, 0, 1], DEFAULT_RELAY_PORT).into(),
            pairing_timeout: PAIRING_TIMEOUT,
            sweep_interval: SWEEP_INTERVAL,
        }
    }
}

impl RelayConfig {
    /// Rejects zero durations.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.pairing_timeout.is_zero() {
            return Err(RelayError::Config("pairing timeout must be non-zero".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(RelayError::Config("sweep interval must be non-zero".into()));
        }
        Ok(())
    }
}
