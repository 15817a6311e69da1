//! Console subcommands

pub mod call;
pub mod config;
pub mod exec;
pub mod logs;

use anyhow::{Context, Result, bail};
use firmlink_client::Connection;
use firmlink_core::EventBus;
use tracing::warn;

use crate::config::ConfigLoader;

/// Connect to the device named by `--address`, falling back to the saved one
///
/// A successful connect becomes the new saved address.
pub(crate) async fn connect_device(address: Option<String>) -> Result<(EventBus, Connection)> {
    let mut config = ConfigLoader::load()?;
    let Some(address) = address.or_else(|| config.device.address.clone()) else {
        bail!("no device address; pass --address (it will be remembered)");
    };

    let bus = EventBus::new();
    let connection = Connection::connect(&address, bus.clone())
        .await
        .with_context(|| format!("failed to connect to {address}"))?;

    if config.device.address.as_deref() != Some(address.as_str()) {
        config.device.address = Some(address);
        if let Err(e) = ConfigLoader::save(&config) {
            warn!("could not remember device address: {e}");
        }
    }
    Ok((bus, connection))
}
