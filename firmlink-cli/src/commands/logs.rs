//! Logs command: tail the device console
//!
//! Subscribes to the `ws` topic and prints decoded `log` events until the
//! device goes offline or the user hits Ctrl+C. The payload already carries
//! its own newlines, so chunks are printed as-is.

use std::io::Write as _;

use anyhow::Result;
use clap::Args;
use tokio::sync::mpsc;

use firmlink_core::{frame, topic};

use super::connect_device;

#[derive(Debug, Args)]
pub struct LogsArgs {
    /// Device address, host:port (defaults to the saved address)
    #[arg(short, long)]
    pub address: Option<String>,
}

pub async fn run(args: LogsArgs) -> Result<()> {
    let (bus, connection) = connect_device(args.address).await?;

    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    bus.subscribe(topic::WS, move |msg| {
        if let Some(text) = frame::decode_log(&msg) {
            let _ = line_tx.send(text);
        }
    });
    let (offline_tx, mut offline_rx) = mpsc::unbounded_channel();
    bus.subscribe(topic::OFFLINE, move |_| {
        let _ = offline_tx.send(());
    });

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            Some(text) = line_rx.recv() => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            _ = offline_rx.recv() => {
                eprintln!("device went offline");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                connection.disconnect().await;
                break;
            }
        }
    }
    Ok(())
}
