//! Shared utilities
//!
use tracing_subscriber::EnvFilter;

pub fn setup_logging() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        // Setup from the environment (RUST_LOG)
        .with_env_filter(EnvFilter::from_default_env())
        // ANSI color codes render badly in CloudWatch logs.
        .with_ansi(false)
        // CloudWatch adds the ingestion time, so skip our own.
        .without_time()
        .init();
}
