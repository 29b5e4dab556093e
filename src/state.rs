//! Application state management for the exporter.
//!
//! This module defines the state shared between the HTTP handlers and the
//! poll loop. The poll loop is the only writer of gauge values; handlers only
//! gather from the registry.

use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

use crate::health_stats::HealthStats;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// State shared across requests.
pub struct AppState {
    pub registry: Registry,
    pub health_stats: Arc<HealthStats>,
    /// Shortened vCenter name, shown on the landing page.
    pub vcenter_name: String,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
