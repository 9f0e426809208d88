use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use streampick_service::config::Config;

/// Calls the `/healthcheck` endpoint of a running instance and prints `OK` or `ERROR`.
///
/// Without an explicit address, the instance is expected on the configured bind address.
pub fn healthcheck(config: &Config, addr: Option<SocketAddr>, timeout: Duration) -> Result<()> {
    let addr = match addr {
        Some(addr) => addr,
        None => config.bind.parse().context("invalid bind address")?,
    };

    let url = format!("http://{addr}/healthcheck");
    tracing::debug!("Sending request to: {url}");

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;
    let result = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status());

    match result {
        Ok(_) => {
            println!("OK");
            Ok(())
        }
        Err(error) => {
            println!("ERROR");
            Err(error).with_context(|| format!("StreamPick ({addr}) is unhealthy"))
        }
    }
}
