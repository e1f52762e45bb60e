//! Medscribe: scanned medical document ingestion and structured extraction.
//!
//! The pipeline rasterizes an uploaded PDF, OCRs every page through a
//! rate-limited vision model gateway, and persists page text as it lands.
//! Two agents then run schema-constrained extraction passes over the
//! aggregated text: prescriptions (medications with computed end dates)
//! and category-based summaries driven by a versioned field template.
//!
//! The crate is a library: authentication, routing, and rendering belong
//! to the embedding application, which talks to [`service::DocumentService`].

pub mod agents;
pub mod config;
pub mod db;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod service;

use tracing_subscriber::EnvFilter;

/// Initialize tracing from `RUST_LOG`, falling back to the crate default.
/// Call once from the embedding application's startup.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("Medscribe v{}", config::APP_VERSION);
}
