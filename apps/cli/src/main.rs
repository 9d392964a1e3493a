//! relaydrop command-line entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relaydrop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (defaults to ~/.config/relaydrop/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the rendezvous relay
    Relay {
        /// Port to listen on
        port: Option<u16>,
    },

    /// Send a file; prints the token to give to the receiver
    Send {
        /// Relay address (host:port)
        server: String,

        /// File to send
        file: PathBuf,
    },

    /// Receive a file using the sender's token
    Receive {
        /// Relay address (host:port)
        server: String,

        /// Token printed by the sender
        token: String,

        /// Directory to save into
        dest: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = config::Config::load(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Command::Relay { port } => rt.block_on(app::relay(&config, port)),
        Command::Send { server, file } => rt.block_on(app::send(server, file)),
        Command::Receive {
            server,
            token,
            dest,
        } => rt.block_on(app::receive(server, &token, config.save_dir(dest))),
    }
}
