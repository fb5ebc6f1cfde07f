//! Side-by-side.
//!
//! Side-by-side is a small web service that shows the solutions of the same programming task in
//! two languages next to each other. Tasks and solutions are read from Rosetta Code, rendered code
//! blocks are kept in a shared cache.

#![warn(missing_debug_implementations, clippy::all)]

#[cfg(not(target_env = "msvc"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod cli;
mod endpoints;
mod healthcheck;
mod logging;
mod server;
mod service;
mod templates;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
