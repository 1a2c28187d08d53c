// Main entry point - wires the session and runs it headless until Ctrl-C
use std::sync::Arc;
use std::time::Duration;

use pulsescope_dashboard::infrastructure::config::load_dashboard_config;
use pulsescope_dashboard::infrastructure::websocket_transport::WebSocketTransport;
use pulsescope_dashboard::presentation::app_state::AppState;

const SUMMARY_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = load_dashboard_config()?;

    // Create transport (infrastructure layer) and the session service
    let transport = Arc::new(WebSocketTransport::new());
    let state = AppState::new(config.endpoint.url.clone(), transport);

    tracing::info!("Starting pulsescope dashboard against {}", config.endpoint.url);
    state.start();

    let mut summary = tokio::time::interval(SUMMARY_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = summary.tick() => log_summary(&state),
        }
    }

    state.stop().await;
    Ok(())
}

fn log_summary(state: &AppState) {
    let status = state.connection_status();
    let session = state.session.read();
    let current = session.status().current();
    tracing::info!(
        state = ?status.state,
        fallback = status.fallback_active,
        retry = status.retry_attempt,
        series = session.catalog().len(),
        map_revision = session.map().revision(),
        cpu = current.nuc_cpu_load,
        temp = current.nuc_temp,
        "session summary"
    );
}
