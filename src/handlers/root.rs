//! Root endpoint handler for the landing page.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");

    let version = env!("CARGO_PKG_VERSION");

    let uptime_secs = state.start_time.elapsed().as_secs();
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;
    let uptime_str = format!("{}h {}m {}s", hours, minutes, seconds);

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>vCenter Exporter</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 0; padding: 20px; background: #f5f5f5; }}
        .container {{ max-width: 700px; margin: 0 auto; background: white; padding: 30px; border-radius: 8px; }}
        h1 {{ color: #333; border-bottom: 3px solid #007bff; padding-bottom: 10px; }}
        li {{ margin: 12px 0; }}
        a {{ color: #007bff; font-weight: 600; }}
    </style>
</head>
<body>
<div class="container">
    <h1>vCenter Exporter</h1>
    <p>vCenter: <code>{vcenter}</code> | Version: {version} | Uptime: {uptime}</p>
    <ul>
        <li><a href="/metrics">/metrics</a> - Prometheus metrics endpoint</li>
        <li><a href="/health">/health</a> - Poll loop health statistics (text)</li>
    </ul>
</div>
</body>
</html>"#,
        vcenter = state.vcenter_name,
        version = version,
        uptime = uptime_str,
    );

    Html(html)
}
