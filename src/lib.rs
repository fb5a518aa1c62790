pub mod client;
pub mod config;
pub mod errors;
pub mod executor;
pub mod loader;
pub mod plan;
pub mod report;
pub mod runner;
pub mod transport;
pub mod utils;
pub mod worker;
