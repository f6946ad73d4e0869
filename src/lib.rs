//! Client-side monitor for remote model-training jobs.
/// Application directory resolution.
pub mod app_dirs;
/// Monitor configuration.
pub mod config;
/// Shared HTTP agent and bounded response reads.
pub mod http_client;
/// Tracing setup.
pub mod logging;
/// Session lifecycle, polling, and view projection.
pub mod training;
