use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::{Context, Result};

use crate::config::Config;

/// Checks that a runner answers on its configured address.
///
/// Fails if the runner cannot be reached or `/health` does not answer with a success status.
pub async fn healthcheck(config: Config) -> Result<()> {
    let url = health_url(config.http_addr);
    tracing::debug!(%url, "checking runner health");

    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("runner not reachable at {url}"))?;

    let status = response.status();
    anyhow::ensure!(status.is_success(), "runner unhealthy: {status}");

    tracing::info!(%url, "runner is healthy");
    Ok(())
}

/// The health URL for a runner listening on `addr`.
///
/// Wildcard listen addresses are checked on the loopback interface.
fn health_url(mut addr: SocketAddr) -> String {
    if addr.ip().is_unspecified() {
        match addr {
            SocketAddr::V4(_) => addr.set_ip(Ipv4Addr::LOCALHOST.into()),
            SocketAddr::V6(_) => addr.set_ip(Ipv6Addr::LOCALHOST.into()),
        }
    }

    format!("http://{addr}/health")
}
