//! Exec command: run a JavaScript snippet on the device
//!
//! The firmware-side `exec` method replaces the running script with the
//! given code, the same way the IDE's execute button does.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::json;

use super::connect_device;

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Device address, host:port (defaults to the saved address)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Read the snippet from a file
    #[arg(short, long, conflicts_with = "code")]
    pub file: Option<PathBuf>,

    /// Inline snippet
    #[arg(short, long)]
    pub code: Option<String>,

    /// Per-call timeout in milliseconds (0 means the default)
    #[arg(long, default_value_t = 0)]
    pub timeout_ms: u64,
}

pub async fn run(args: ExecArgs) -> Result<()> {
    let code = match (args.file, args.code) {
        (Some(path), None) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, Some(code)) => code,
        _ => bail!("pass exactly one of --file or --code"),
    };

    let (_bus, connection) = connect_device(args.address).await?;
    let reply = connection
        .call_with_timeout("exec", json!({"code": code}), Duration::from_millis(args.timeout_ms))
        .await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    connection.disconnect().await;
    Ok(())
}
