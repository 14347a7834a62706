//! Prometheus metrics surface (`GET /metrics`).
//!
//! Counters are recorded at the call sites that already know the outcome
//! (`http.rs`'s query handlers); this module only owns the exporter and the
//! route that renders its registry.

use axum::http::StatusCode;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global recorder. Must run once, before any `metrics::counter!`
/// call site is reached, so `main` calls this ahead of `create_router`.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<crate::state::AppState>,
) -> Result<String, StatusCode> {
    match &state.metrics_handle {
        Some(handle) => Ok(handle.render()),
        None => Err(StatusCode::NOT_FOUND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_metrics_installs_a_renderable_handle() {
        let handle = init_metrics();
        // Rendering never panics even with an empty registry.
        let _ = handle.render();
    }
}
