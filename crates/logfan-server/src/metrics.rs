//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Sessions started (counter).
pub const WS_SESSIONS_TOTAL: &str = "ws_sessions_total";
/// Sessions currently running (gauge).
pub const WS_SESSIONS_ACTIVE: &str = "ws_sessions_active";
/// Sessions ended (counter, labels: reason).
pub const WS_SESSION_TERMINATIONS_TOTAL: &str = "ws_session_terminations_total";
/// Payloads written to subscribers (counter).
pub const WS_PAYLOADS_DELIVERED_TOTAL: &str = "ws_payloads_delivered_total";
/// Session lifetime in seconds (histogram).
pub const WS_SESSION_DURATION_SECONDS: &str = "ws_session_duration_seconds";
/// Payloads dropped on full subscriber queues (counter).
pub const HUB_PAYLOAD_DROPS_TOTAL: &str = "hub_payload_drops_total";
/// Upgrade requests rejected (counter, labels: status).
pub const WS_UPGRADE_REJECTIONS_TOTAL: &str = "ws_upgrade_rejections_total";
