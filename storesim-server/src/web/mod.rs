//! The HTTP surface of the runner.
//!
//! The application is implemented in the [`App`] struct, which sets up routing and middleware. To
//! run the workload together with the endpoints, use the [`server()`] function.
//!
//! # Testing
//!
//! For end-to-end tests, see the `storesim-test` crate, which starts the application on a random
//! local port.

mod app;
mod middleware;
mod server;

pub use app::App;
pub use server::server;
