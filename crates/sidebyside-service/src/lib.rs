#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod retriever;
pub mod source;
pub mod tasks;
pub mod types;
pub mod utils;
