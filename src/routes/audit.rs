// SPDX-License-Identifier: MIT

//! Audit trail route.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Result;
use crate::models::{ActivityAction, Module, Severity};
use crate::services::audit::AuditPage;
use crate::services::{ActingIdentity, AuditQuery, AuditTrail};
use crate::AppState;

const MAX_AUDIT_LIMIT: u32 = 100;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/audit-trail", get(audit_trail))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditTrailQuery {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
    user_id: Option<String>,
    action: Option<ActivityAction>,
    module: Option<Module>,
    severity: Option<Severity>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    search: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Query the audit trail. 403 unless the resolved acting principal holds
/// the hidden role.
async fn audit_trail(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ActingIdentity>,
    Query(params): Query<AuditTrailQuery>,
) -> Result<Json<AuditPage>> {
    let limit = params.limit.clamp(1, MAX_AUDIT_LIMIT);

    let page = AuditTrail::new(state.db.clone())
        .query(
            &identity,
            AuditQuery {
                user_id: params.user_id,
                action: params.action,
                module: params.module,
                severity: params.severity,
                search: params.search,
                start: params.start_date,
                end: params.end_date,
                limit: limit as usize,
                offset: params.offset as usize,
            },
        )
        .await?;

    Ok(Json(page))
}
