// SPDX-License-Identifier: MIT

//! Athlete Hub API Server
//!
//! Access-control and activity-telemetry backend for the club management
//! dashboard: role hierarchy, switch-user sessions, activity logging, and
//! the audit trail.

use athlete_hub_api::{config::Config, db::ClubDb, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Athlete Hub API");

    // Initialize the record store. ATHLETE_HUB_IN_MEMORY runs without any
    // Firestore dependency, for local development.
    let db = if std::env::var("ATHLETE_HUB_IN_MEMORY").is_ok() {
        tracing::warn!("Using in-memory store; data will not persist");
        ClubDb::new_in_memory()
    } else {
        ClubDb::connect(&config.gcp_project_id)
            .await
            .expect("Failed to connect to Firestore")
    };
    tracing::info!(
        telemetry_enabled = db.telemetry_enabled(),
        "Record store initialized"
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
    });

    // Build router
    let app = athlete_hub_api::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("athlete_hub_api=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
