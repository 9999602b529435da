// SPDX-License-Identifier: MIT

//! Dashboard stats route.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::error::Result;
use crate::services::{ActingIdentity, Period, StatsAggregator};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/activity/stats", get(dashboard_stats))
}

#[derive(Deserialize)]
struct StatsQuery {
    #[serde(default)]
    period: Period,
}

/// Windowed dashboard analytics, available to any authenticated principal.
async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ActingIdentity>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<crate::services::stats::DashboardStats>> {
    tracing::debug!(
        user_id = %identity.acting().id,
        period = ?params.period,
        "Building dashboard stats"
    );

    let dashboard = StatsAggregator::new(state.db.clone())
        .dashboard(params.period)
        .await?;
    Ok(Json(dashboard))
}
