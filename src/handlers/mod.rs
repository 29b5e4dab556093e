//! HTTP endpoint handlers for the exporter.
//!
//! - `/metrics`: Prometheus metrics endpoint
//! - `/health`: Poll loop health statistics
//! - `/`: Landing page

pub mod health;
pub mod metrics;
pub mod root;

use axum::{routing::get, Router};

use crate::state::SharedState;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use root::root_handler;

/// Builds the exporter's router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
