//! Call command: raw RPC escape hatch
//!
//! Sends any method/params pair and prints the reply frame; useful for
//! poking at firmware methods the console has no dedicated command for.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use super::connect_device;

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Device address, host:port (defaults to the saved address)
    #[arg(short, long)]
    pub address: Option<String>,

    /// RPC method name
    pub method: String,

    /// Parameters as a JSON document
    #[arg(default_value = "null")]
    pub params: String,

    /// Per-call timeout in milliseconds (0 means the default)
    #[arg(long, default_value_t = 0)]
    pub timeout_ms: u64,
}

pub async fn run(args: CallArgs) -> Result<()> {
    let params: Value =
        serde_json::from_str(&args.params).context("params must be a valid JSON document")?;

    let (_bus, connection) = connect_device(args.address).await?;
    let reply = connection
        .call_with_timeout(&args.method, params, Duration::from_millis(args.timeout_ms))
        .await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    connection.disconnect().await;
    Ok(())
}
