//! Health check endpoint handler.
//!
//! Reports 200 once a poll cycle has completed successfully and 503 before
//! the first cycle or while the most recent one failed.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let last_cycle = state.health_stats.last_cycle();

    let (status, message) = match last_cycle {
        Some(c) if c.success => (StatusCode::OK, "OK"),
        Some(_) => (StatusCode::SERVICE_UNAVAILABLE, "Last poll cycle failed"),
        None => (StatusCode::SERVICE_UNAVAILABLE, "No poll cycle completed yet"),
    };

    let uptime_hours = state.health_stats.get_uptime_seconds() as f64 / SECONDS_PER_HOUR;
    let uptime_str = if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    };

    let table = state.health_stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "{message}\n\nvCenter: {}\nUptime: {uptime_str}\n\n{table}",
            state.vcenter_name
        ),
    )
}
