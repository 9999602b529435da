// SPDX-License-Identifier: MIT

//! Activity and session routes.
//!
//! The POST endpoints resolve the principal from the request body or the
//! session cookie, because session ends arrive from page-unload beacons
//! that may not survive a full authenticated round trip.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

use crate::db::LogQuery;
use crate::error::{AppError, Result};
use crate::middleware::auth::{verify_principal_token, ACTING_COOKIE};
use crate::models::{
    ActivityAction, LogEntryView, Module, Session, User,
};
use crate::routes::{client_agent, client_ip};
use crate::services::{ActivityEvent, ActivityLogger, ActingIdentity, EndTarget, SessionTracker};
use crate::AppState;

const MAX_LOGS_PER_PAGE: u32 = 200;

/// Routes that resolve their principal from body or cookie.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/activity", post(record_activity))
        .route("/activity/sessions", post(session_action))
}

/// Routes behind the auth middleware.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/activity", get(list_activity))
        .route("/activity/sessions", get(current_session))
}

// ─── Principal Resolution ────────────────────────────────────

enum ResolvedPrincipal {
    Id(String),
    /// The cookie looked plausible but the store could not confirm it.
    /// Telemetry degrades rather than failing the caller.
    Unverifiable,
}

async fn resolve_event_principal(
    state: &AppState,
    jar: &CookieJar,
    body_user_id: Option<&str>,
) -> Result<ResolvedPrincipal> {
    if let Some(id) = body_user_id.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(ResolvedPrincipal::Id(id.to_string()));
    }

    let missing = || {
        AppError::BadRequest(
            "no principal resolvable from request body or session cookie".to_string(),
        )
    };

    let Some(token_id) = jar
        .get(ACTING_COOKIE)
        .and_then(|c| verify_principal_token(c.value(), &state.config.cookie_signing_key))
    else {
        return Err(missing());
    };

    match state.db.get_user(&token_id).await {
        Ok(Some(user)) if user.is_active => Ok(ResolvedPrincipal::Id(user.id)),
        Ok(_) => Err(missing()),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to cross-check principal cookie");
            Ok(ResolvedPrincipal::Unverifiable)
        }
    }
}

// ─── Record Activity ─────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct LogActivityRequest {
    action: ActivityAction,
    #[validate(length(max = 300))]
    page: Option<String>,
    module: Option<Module>,
    #[validate(length(max = 100))]
    target_id: Option<String>,
    #[validate(length(max = 100))]
    target_type: Option<String>,
    details: Option<HashMap<String, serde_json::Value>>,
    #[validate(length(max = 100))]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LogActivityResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl LogActivityResponse {
    fn ok() -> Self {
        Self {
            success: true,
            notice: None,
            warning: None,
        }
    }

    fn with_notice(notice: &str) -> Self {
        Self {
            notice: Some(notice.to_string()),
            ..Self::ok()
        }
    }

    fn with_warning(warning: &str) -> Self {
        Self {
            warning: Some(warning.to_string()),
            ..Self::ok()
        }
    }
}

/// Record a discrete user action. Always 200 once a principal is resolved;
/// storage trouble surfaces as a notice or warning, never as a failure.
async fn record_activity(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(body): Json<LogActivityRequest>,
) -> Result<Json<LogActivityResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let user_id = match resolve_event_principal(&state, &jar, body.user_id.as_deref()).await? {
        ResolvedPrincipal::Id(id) => id,
        ResolvedPrincipal::Unverifiable => {
            return Ok(Json(LogActivityResponse::with_warning(
                "principal could not be verified; event not recorded",
            )));
        }
    };

    let mut event = ActivityEvent::new(user_id, body.action);
    event.page = body.page;
    event.module = body.module;
    event.target_id = body.target_id;
    event.target_type = body.target_type;
    event.details = body.details;
    event.ip_address = client_ip(&headers);
    event.user_agent = client_agent(&headers);

    let outcome = ActivityLogger::new(state.db.clone()).record(event).await?;
    let response = match outcome {
        crate::services::LogOutcome::Recorded => LogActivityResponse::ok(),
        crate::services::LogOutcome::Disabled => {
            LogActivityResponse::with_notice("activity logging is not provisioned")
        }
        crate::services::LogOutcome::Degraded => {
            LogActivityResponse::with_warning("activity log write failed; the action completed")
        }
    };
    Ok(Json(response))
}

// ─── List Activity ───────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityLogsQuery {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
    user_id: Option<String>,
    action: Option<ActivityAction>,
    page: Option<String>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivityLogsResponse {
    pub logs: Vec<LogEntryView>,
    /// Count after filtering, before pagination
    pub total: u32,
    pub limit: u32,
    pub offset: u32,
}

/// List activity log entries, newest first. Principals without full access
/// only ever see their own entries, whatever filter they pass.
async fn list_activity(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ActingIdentity>,
    Query(params): Query<ActivityLogsQuery>,
) -> Result<Json<ActivityLogsResponse>> {
    let limit = params.limit.min(MAX_LOGS_PER_PAGE);
    let offset = params.offset;

    let empty = |limit, offset| ActivityLogsResponse {
        logs: vec![],
        total: 0,
        limit,
        offset,
    };

    if !state.db.telemetry_enabled() {
        return Ok(Json(empty(limit, offset)));
    }

    let user_filter = if identity.acting().role.has_full_access() {
        params.user_id
    } else {
        Some(identity.acting().id.clone())
    };

    let entries = match state
        .db
        .query_activity_logs(&LogQuery {
            user_id: user_filter,
            action: params.action,
            module: None,
            page: params.page,
            start: params.start_date,
            end: params.end_date,
        })
        .await
    {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to query activity logs");
            return Ok(Json(empty(limit, offset)));
        }
    };

    let users: HashMap<String, User> = match state.db.list_users().await {
        Ok(users) => users.into_iter().map(|u| (u.id.clone(), u)).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load users for log enrichment");
            HashMap::new()
        }
    };

    let total = entries.len() as u32;
    let logs: Vec<LogEntryView> = entries
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .map(|entry| {
            let user = users.get(&entry.user_id);
            LogEntryView::from_entry(entry, user)
        })
        .collect();

    Ok(Json(ActivityLogsResponse {
        logs,
        total,
        limit,
        offset,
    }))
}

// ─── Sessions ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SessionAction {
    Start,
    End,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SessionActionRequest {
    action: SessionAction,
    #[validate(length(max = 100))]
    user_id: Option<String>,
    #[validate(length(max = 100))]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Start or end a session.
async fn session_action(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(body): Json<SessionActionRequest>,
) -> Result<Json<SessionActionResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let tracker = SessionTracker::new(state.db.clone());

    match body.action {
        SessionAction::Start => {
            let user_id =
                match resolve_event_principal(&state, &jar, body.user_id.as_deref()).await? {
                    ResolvedPrincipal::Id(id) => id,
                    ResolvedPrincipal::Unverifiable => {
                        return Ok(Json(SessionActionResponse {
                            success: true,
                            session_id: None,
                        }));
                    }
                };
            let session_id = tracker
                .start(&user_id, client_ip(&headers), client_agent(&headers))
                .await?;
            Ok(Json(SessionActionResponse {
                success: true,
                session_id,
            }))
        }
        SessionAction::End => {
            let target = if let Some(session_id) = body
                .session_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                EndTarget::Session(session_id.to_string())
            } else {
                match resolve_event_principal(&state, &jar, body.user_id.as_deref()).await? {
                    ResolvedPrincipal::Id(id) => EndTarget::Principal(id),
                    ResolvedPrincipal::Unverifiable => {
                        return Ok(Json(SessionActionResponse {
                            success: true,
                            session_id: None,
                        }));
                    }
                }
            };
            tracker.end(target).await?;
            Ok(Json(SessionActionResponse {
                success: true,
                session_id: None,
            }))
        }
    }
}

/// Session as served on the wire.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionView {
    pub id: String,
    pub user_id: String,
    pub session_start: DateTime<Utc>,
    pub session_end: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub duration_minutes: Option<u32>,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            session_start: session.session_start,
            session_end: session.session_end,
            is_active: session.is_active,
            duration_minutes: session.duration_minutes,
        }
    }
}

/// The caller's current active session, or null.
async fn current_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ActingIdentity>,
) -> Result<Json<Option<SessionView>>> {
    let tracker = SessionTracker::new(state.db.clone());
    let session = tracker.current(&identity.acting().id).await?;
    Ok(Json(session.map(SessionView::from)))
}
