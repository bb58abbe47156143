use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal::unix::SignalKind;

use crate::config::Config;
use crate::runner;
use crate::state::State;
use crate::web::app::App;

/// The maximum backlog for TCP listen sockets before refusing connections.
const TCP_LISTEN_BACKLOG: u32 = 1024;

/// Runs the workload and the HTTP endpoints until termination is requested.
///
/// On shutdown, the endpoints stop first, then the workload is stopped and the runner state is
/// saved to the data directory.
pub async fn server(config: Config) -> Result<()> {
    tracing::info!("Starting runner");

    let listener = listen(&config).context("failed to start TCP listener")?;
    let state = State::new(config)?;
    state.engine.start()?;

    let poller = tokio::spawn(runner::poll_snapshots(state.clone()));

    let app = App::new(state.clone()).graceful_shutdown(true);
    let server_handle = tokio::spawn(app.serve(listener));

    tokio::spawn(async move {
        elegant_departure::get_shutdown_guard().wait().await;
        tracing::info!("Shutting down ...");
    });

    elegant_departure::tokio::depart()
        .on_termination()
        .on_sigint()
        .on_signal(SignalKind::hangup())
        .on_signal(SignalKind::quit())
        .await;

    let server_result = match server_handle.await {
        Ok(result) => result,
        Err(err) => Err(err.into()),
    };
    if let Err(err) = poller.await {
        tracing::error!(error = &err as &dyn std::error::Error, "snapshot poller failed");
    }

    tokio::task::spawn_blocking(move || state.shutdown()).await?;

    tracing::info!("Shutdown complete");
    server_result
}

fn listen(config: &Config) -> Result<TcpListener> {
    let addr = config.http_addr;
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;

    let listener = socket.listen(TCP_LISTEN_BACKLOG)?;
    tracing::info!("HTTP server listening on {addr}");

    Ok(listener)
}
