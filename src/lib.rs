// Library crate for integration tests and the binary.

pub mod analysers;
pub mod collectors;
pub mod config;
pub mod detached;
pub mod error;
pub mod fallback;
pub mod job;
pub mod log_capture;
pub mod model;
pub mod pipeline;
pub mod pricing;
pub mod providers;
pub mod rate_limit;
pub mod report;
pub mod retry;
pub mod routes;
pub mod scoring;
pub mod server;
pub mod state;
pub mod storage;
pub mod synthesis;
pub mod unit;
