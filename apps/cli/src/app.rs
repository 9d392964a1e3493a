//! Subcommand runners: relay, send and receive.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use relaydrop_protocol::{Token, generate_token};
use relaydrop_relay::RelayServer;
use relaydrop_transfer::{Progress, Receiver, Sender, SpeedCalculator};

use crate::config::Config;

/// Runs the relay until Ctrl-C.
pub async fn relay(config: &Config, port: Option<u16>) -> anyhow::Result<()> {
    let relay_config = config.relay_config(port)?;
    let server = RelayServer::new(relay_config);

    let server_run = std::sync::Arc::clone(&server);
    let mut task = tokio::spawn(async move { server_run.run().await });

    tokio::select! {
        result = &mut task => {
            return result.context("relay task panicked")?.context("relay failed");
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("interrupt received");
        }
    }

    server.shutdown();
    task.await
        .context("relay task panicked")?
        .context("relay failed")
}

/// Sends `file` under a freshly generated token.
pub async fn send(server: String, file: PathBuf) -> anyhow::Result<()> {
    let token = generate_token();
    println!("Token: {token}");
    println!("Waiting for the receiver to connect...");

    let cancel = cancel_on_ctrl_c();
    let (tx, rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_progress(rx));

    let mut sender = Sender::new(server, token);
    let result = sender.send_file(&file, cancel, tx).await;
    let _ = printer.await;

    let report = result.with_context(|| format!("sending {}", file.display()))?;
    println!("Sent {} ({} bytes)", report.file_name, report.bytes);
    println!("SHA-256: {}", report.sha256);
    Ok(())
}

/// Receives the file registered under `token` into `dest`.
pub async fn receive(server: String, token: &str, dest: PathBuf) -> anyhow::Result<()> {
    let token = Token::parse(token).context("invalid token")?;

    let cancel = cancel_on_ctrl_c();
    let (tx, rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_progress(rx));

    let mut receiver = Receiver::new(server, token);
    let result = receiver.receive_file(&dest, cancel, tx).await;
    let _ = printer.await;

    let report = result.context("receiving file")?;
    println!(
        "Saved {} ({} bytes) to {}",
        report.metadata.file_name,
        report.metadata.file_size,
        report.path.display()
    );
    println!("SHA-256: {}", report.sha256);
    Ok(())
}

/// Returns a token that is cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

/// Prints a single-line progress meter until the sending side hangs up.
async fn print_progress(mut rx: mpsc::Receiver<Progress>) {
    let mut speed = SpeedCalculator::new(None);
    let mut printed = false;

    while let Some(p) = rx.recv().await {
        speed.add_sample(p.transferred);
        let eta = speed
            .eta(p.total.saturating_sub(p.transferred))
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "--".into());
        print!(
            "\r{:>6.1}%  {}/{} bytes  {:.1} KiB/s  eta {eta}   ",
            p.percent(),
            p.transferred,
            p.total,
            speed.bytes_per_second() / 1024.0
        );
        let _ = std::io::stdout().flush();
        printed = true;
    }

    if printed {
        println!();
    }
}
