//! This file defines the channel-stats binary entry point.

use channel_stats::app;
use channel_stats::app_state::AppState;
use channel_stats::cli;
use channel_stats::metrics;
use channel_stats::server;
use channel_stats::tracing;

use std::sync::Arc;

/// Application entry point
#[tokio::main]
async fn main() {
    let args = cli::parse();
    tracing::init_tracing(&args);
    metrics::register_metrics();
    app::init(&args);
    let state = Arc::new(AppState::new(&args));
    let service = app::service(state);
    server::serve(&args, service).await;
    tracing::shutdown_tracing();
}
