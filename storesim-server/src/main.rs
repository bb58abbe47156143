//! The storesim runner binary.
//!
//! See the [`storesim_server`] library for the implementation.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use anyhow::Result;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    storesim_server::cli::execute()
}
