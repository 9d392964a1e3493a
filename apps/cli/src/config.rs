//! relaydrop configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/relaydrop/config.toml`
//! - Windows: `%APPDATA%/relaydrop/config.toml`
//!
//! Every key is optional. Command-line arguments override the file.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use relaydrop_protocol::DEFAULT_RELAY_PORT;
use relaydrop_relay::RelayConfig;

/// User configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host the relay binds to.
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// Relay port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long an unpaired connection is kept, in seconds.
    #[serde(default = "default_pairing_timeout_secs")]
    pub pairing_timeout_secs: u64,

    /// Stale-registration sweep cadence, in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Directory received files are saved to when none is given.
    #[serde(default = "default_save_dir")]
    pub default_save_dir: String,
}

fn default_listen_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    DEFAULT_RELAY_PORT
}

fn default_pairing_timeout_secs() -> u64 {
    300
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_save_dir() -> String {
    ".".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            port: default_port(),
            pairing_timeout_secs: default_pairing_timeout_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            default_save_dir: default_save_dir(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from the default location.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file that was named explicitly is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_path(), false),
        };

        if !path.exists() {
            if explicit {
                bail!("config file not found: {}", path.display());
            }
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen_host.trim().is_empty() {
            bail!("listen_host must not be empty");
        }
        if self.default_save_dir.trim().is_empty() {
            bail!("default_save_dir must not be empty");
        }
        if self.pairing_timeout_secs == 0 {
            bail!("pairing_timeout_secs must be non-zero");
        }
        if self.sweep_interval_ms == 0 {
            bail!("sweep_interval_ms must be non-zero");
        }
        Ok(())
    }

    /// Builds the relay settings, with `port` overriding the configured one.
    pub fn relay_config(&self, port: Option<u16>) -> anyhow::Result<RelayConfig> {
        let port = port.unwrap_or(self.port);
        let listen_addr = resolve(&self.listen_host, port)?;
        Ok(RelayConfig {
            listen_addr,
            pairing_timeout: Duration::from_secs(self.pairing_timeout_secs),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
        })
    }

    /// Destination directory for received files.
    pub fn save_dir(&self, dest: Option<PathBuf>) -> PathBuf {
        dest.unwrap_or_else(|| PathBuf::from(&self.default_save_dir))
    }
}

fn resolve(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("resolving {host}"))?
        .next()
        .with_context(|| format!("no address for {host}"))
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("relaydrop").join("config.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("relaydrop")
            .join("config.toml")
    }
}
