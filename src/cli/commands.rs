//! CLI commands for the DSNT tooling
//!
//! Implements all command handlers for the CLI interface.

use crate::core::{Script, TxId};
use crate::doublespend::{DoubleSpendConfig, DsCallbackMsg, HttpTransport, NotificationTransport};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Decode a DSNT output script and print the callback message
pub fn cmd_decode(script_hex: &str) -> CliResult<()> {
    let script = Script::from_hex(script_hex.trim())?;
    let payload = script
        .dsnt_payload()
        .ok_or("not a DSNT output script")?;
    let msg = DsCallbackMsg::decode(payload)?;

    println!("{}", serde_json::to_string_pretty(&msg)?);
    Ok(())
}

/// Build a DSNT output script
pub fn cmd_encode(addresses: &[IpAddr], inputs: &[u32]) -> CliResult<()> {
    if addresses.is_empty() {
        return Err("at least one callback address is required".into());
    }

    let msg = DsCallbackMsg::new(addresses.to_vec(), inputs.to_vec());
    let script = msg.output_script()?;

    println!("{}", script.to_hex());
    Ok(())
}

/// Ask an endpoint whether it wants proof for `txid`
pub async fn cmd_query(endpoint: SocketAddr, txid: &str, timeout: Duration) -> CliResult<()> {
    let txid: TxId = txid.trim().parse()?;
    let transport = HttpTransport::new()?;

    println!("📡 Querying {} for {}", endpoint, txid);
    let response = transport.query(endpoint, &txid, timeout).await?;

    println!("   ├─ Status: {}", response.status);
    match response.wants_proof {
        Some(true) => println!("   └─ Wants proof: yes"),
        Some(false) => println!("   └─ Wants proof: no"),
        None => println!("   └─ ⚠️  Interest header missing"),
    }
    Ok(())
}

/// Print the effective configuration as JSON
pub fn cmd_config(path: Option<&Path>) -> CliResult<()> {
    let config = match path {
        Some(p) => DoubleSpendConfig::load(p)?,
        None => DoubleSpendConfig::default(),
    };

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
