// SPDX-License-Identifier: MIT

//! Identity routes: cookie binding, impersonation, and logout.
//!
//! Credential verification happens upstream; these routes bind an
//! authenticated principal id to the browser context and manage the
//! switch-user state on top of it.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{
    identity_cookie, removal_cookie, resolve_identity, sign_principal_token, ACTING_COOKIE,
    ORIGINAL_COOKIE,
};
use crate::models::{ActivityAction, Role, User};
use crate::routes::{client_agent, client_ip};
use crate::services::{ActivityEvent, ActivityLogger, ActingIdentity, EndTarget, SessionTracker};
use crate::AppState;

/// Public identity routes (no resolved principal required).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

/// Identity routes behind the auth middleware.
pub fn identity_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/switch", post(switch_user))
        .route("/auth/switch-back", post(switch_back))
}

// ─── Responses ───────────────────────────────────────────────

/// Principal profile as served on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub is_active: bool,
    pub phone: Option<String>,
    pub assigned_sports: Vec<String>,
    pub assigned_squads: Vec<String>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            is_active: user.is_active,
            phone: user.phone.clone(),
            assigned_sports: user.assigned_sports.clone(),
            assigned_squads: user.assigned_squads.clone(),
        }
    }
}

/// The resolved identity, including any active impersonation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct IdentityResponse {
    pub user: UserView,
    pub original: Option<UserView>,
    pub impersonating: bool,
}

impl From<&ActingIdentity> for IdentityResponse {
    fn from(identity: &ActingIdentity) -> Self {
        Self {
            user: UserView::from(identity.acting()),
            original: identity.original().map(UserView::from),
            impersonating: identity.is_impersonating(),
        }
    }
}

// ─── Login / Logout ──────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    #[validate(length(min = 1, max = 100))]
    user_id: String,
}

/// Bind a principal to the browser context.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<IdentityResponse>)> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let user = state
        .db
        .get_user(&body.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::Unauthorized)?;

    let token = sign_principal_token(&user.id, &state.config.cookie_signing_key)?;
    let secure = state.config.cookies_secure();
    // A fresh binding always ends any impersonation.
    let jar = jar
        .add(identity_cookie(ACTING_COOKIE, token, secure))
        .add(removal_cookie(ORIGINAL_COOKIE, secure));

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "Principal bound to session");

    let identity = ActingIdentity::new(user);
    Ok((jar, Json(IdentityResponse::from(&identity))))
}

/// Clear the identity cookies and best-effort close the active session.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode)> {
    match resolve_identity(&state, &jar).await {
        Ok(Some(identity)) => {
            let tracker = SessionTracker::new(state.db.clone());
            if let Err(e) = tracker
                .end(EndTarget::Principal(identity.acting().id.clone()))
                .await
            {
                tracing::warn!(error = %e, "Failed to end session during logout");
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Failed to resolve identity during logout");
        }
    }

    let secure = state.config.cookies_secure();
    let jar = jar
        .add(removal_cookie(ACTING_COOKIE, secure))
        .add(removal_cookie(ORIGINAL_COOKIE, secure));

    Ok((jar, StatusCode::NO_CONTENT))
}

// ─── Identity & Switch-User ──────────────────────────────────

/// Current resolved identity.
async fn me(Extension(identity): Extension<ActingIdentity>) -> Json<IdentityResponse> {
    Json(IdentityResponse::from(&identity))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SwitchRequest {
    #[validate(length(min = 1, max = 100))]
    user_id: String,
}

/// Impersonate another principal. Only the system administrator's authority
/// passes the permission check; denial leaves acting/original untouched.
async fn switch_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ActingIdentity>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(body): Json<SwitchRequest>,
) -> Result<(CookieJar, Json<IdentityResponse>)> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let target = state
        .db
        .get_user(&body.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", body.user_id)))?;
    if !target.is_active {
        return Err(AppError::BadRequest(
            "cannot switch to a deactivated principal".to_string(),
        ));
    }

    let mut identity = identity;
    let from = identity.acting().id.clone();
    identity.switch_to(target)?;

    let jar = persist_identity(&state, jar, &identity)?;

    record_switch_event(&state, &identity, &headers, &from).await;

    tracing::info!(
        from = %from,
        to = %identity.acting().id,
        "Switched acting principal"
    );

    Ok((jar, Json(IdentityResponse::from(&identity))))
}

/// Restore the original principal. No-op without an active impersonation.
async fn switch_back(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<ActingIdentity>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, Json<IdentityResponse>)> {
    let mut identity = identity;
    let from = identity.acting().id.clone();

    if identity.switch_back() {
        record_switch_event(&state, &identity, &headers, &from).await;
        tracing::info!(
            from = %from,
            to = %identity.acting().id,
            "Restored original principal"
        );
    }

    let jar = persist_identity(&state, jar, &identity)?;
    Ok((jar, Json(IdentityResponse::from(&identity))))
}

/// Save the identity back to the cookie boundary.
fn persist_identity(
    state: &AppState,
    jar: CookieJar,
    identity: &ActingIdentity,
) -> Result<CookieJar> {
    let key = &state.config.cookie_signing_key;
    let secure = state.config.cookies_secure();

    let acting_token = sign_principal_token(&identity.acting().id, key)?;
    let jar = jar.add(identity_cookie(ACTING_COOKIE, acting_token, secure));

    let jar = match identity.original() {
        Some(original) => {
            let original_token = sign_principal_token(&original.id, key)?;
            jar.add(identity_cookie(ORIGINAL_COOKIE, original_token, secure))
        }
        None => jar.add(removal_cookie(ORIGINAL_COOKIE, secure)),
    };

    Ok(jar)
}

/// Record the switch as a critical activity event, best-effort.
async fn record_switch_event(
    state: &AppState,
    identity: &ActingIdentity,
    headers: &HeaderMap,
    from: &str,
) {
    let mut details: HashMap<String, serde_json::Value> = HashMap::new();
    details.insert("from".to_string(), serde_json::json!(from));
    details.insert(
        "to".to_string(),
        serde_json::json!(identity.acting().id.clone()),
    );

    let mut event = ActivityEvent::new(
        identity.authority().id.clone(),
        ActivityAction::UserSwitch,
    );
    event.details = Some(details);
    event.ip_address = client_ip(headers);
    event.user_agent = client_agent(headers);

    if let Err(e) = ActivityLogger::new(state.db.clone()).record(event).await {
        tracing::warn!(error = %e, "Failed to record user switch event");
    }
}
