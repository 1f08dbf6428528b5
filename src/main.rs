//! Feedwright binary entry point

use feedwright::{AppState, config};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Load configuration from file and environment
/// 3. Initialize AppState
/// 4. Build Axum router
/// 5. Start background tasks (prune and rebuild schedulers)
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("FEEDWRIGHT__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let log_level =
        std::env::var("FEEDWRIGHT__LOGGING__LEVEL").unwrap_or_else(|_| "info".to_string());
    let default_filter = format!("feedwright={log_level},tower_http=debug");

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| default_filter.clone().into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| default_filter.clone().into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting Feedwright...");

    // 2. Initialize metrics
    feedwright::metrics::init_metrics();

    // 3. Load configuration
    let config = config::AppConfig::load()?;
    tracing::info!(
        database = %config.database.path.display(),
        retention_limit = config.timeline.retention_limit,
        "Configuration loaded"
    );

    // 4. Initialize application state
    let state = AppState::new(config.clone()).await?;

    // 5. Build Axum router
    let app = feedwright::build_router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // 6. Start background tasks
    if config.timeline.prune_interval_seconds > 0 {
        spawn_prune_task(state.clone());
    }
    if config.timeline.rebuild_interval_seconds > 0 {
        spawn_rebuild_task(state.clone());
    }

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn background retention prune task
fn spawn_prune_task(state: AppState) {
    tokio::spawn(async move {
        let interval_secs = state.config.timeline.prune_interval_seconds;
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

        // Consume the immediate first tick to delay the first prune by one interval.
        interval.tick().await;

        loop {
            interval.tick().await;

            tracing::debug!("Running scheduled prune...");
            if let Err(e) = state.timelines.prune_old_posts_from_timelines().await {
                tracing::error!(error = %e, "Scheduled prune failed");
            }
        }
    });

    tracing::info!("Prune task spawned");
}

/// Spawn background rebuild task
fn spawn_rebuild_task(state: AppState) {
    tokio::spawn(async move {
        let interval_secs = state.config.timeline.rebuild_interval_seconds;
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            tracing::info!("Running scheduled rebuild...");
            // Outcome and failures are logged by the service.
            let _ = state.timelines.rebuild_timelines(None).await;
        }
    });

    tracing::info!("Rebuild task spawned");
}
