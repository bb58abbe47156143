//! Exposes an in-process test server for use in integration tests.
//!
//! ```
//! use storesim_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/health");
//!    // use the URL in tests...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use storesim_server::config::{Config, Workload};
use storesim_server::state::{ServiceState, State};
use storesim_server::web::App;
use tempfile::TempDir;

/// An in-process test server for use in integration tests.
///
/// The server runs the HTTP endpoints on a random port on localhost, with a small workload and a
/// temporary data directory that is deleted when the server is dropped. The workload is not
/// started and no snapshot is polled automatically, use [`state`](Self::state) to drive both.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: ServiceState,
    _tempdir: TempDir,
}

impl TestServer {
    /// Starts a server with a two-thread workload and default ratios.
    pub async fn new() -> Self {
        Self::with_config(Config {
            workload: Workload {
                threads: 2,
                ..Default::default()
            },
            ..Default::default()
        })
        .await
    }

    /// Starts a server with the given configuration.
    ///
    /// The HTTP address and the data directory are overridden.
    pub async fn with_config(mut config: Config) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let tempdir = tempfile::tempdir().unwrap();
        config.http_addr = socket;
        config.data_dir = tempdir.path().into();
        config.stop_timeout = Duration::from_secs(2);

        let state = State::new(config).unwrap();
        let app = App::new(state.clone());

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            app.serve(listener).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
            _tempdir: tempdir,
        }
    }

    /// The shared state behind the endpoints.
    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    /// The local address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
        self.state.engine.stop_with_timeout(Duration::from_secs(2));
    }
}
