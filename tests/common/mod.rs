// SPDX-License-Identifier: MIT

use athlete_hub_api::config::Config;
use athlete_hub_api::db::ClubDb;
use athlete_hub_api::middleware::auth::{sign_principal_token, ACTING_COOKIE};
use athlete_hub_api::models::{Role, User};
use athlete_hub_api::routes::create_router;
use athlete_hub_api::AppState;
use chrono::Utc;
use std::sync::Arc;

/// Build a user fixture.
#[allow(dead_code)]
pub fn user(id: &str, role: Role) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@club.test", id),
        display_name: format!("User {}", id),
        role,
        is_active: true,
        phone: None,
        assigned_sports: vec![],
        assigned_squads: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Seed the standard cast: the hidden root, an admin, a coach, an athlete,
/// and a deactivated user.
#[allow(dead_code)]
pub async fn seed_users(db: &ClubDb) {
    db.upsert_user(&user("root", Role::SystemAdmin)).await.unwrap();
    db.upsert_user(&user("admin", Role::Admin)).await.unwrap();
    db.upsert_user(&user("coach", Role::SportCoach)).await.unwrap();
    db.upsert_user(&user("athlete", Role::Athlete)).await.unwrap();

    let mut gone = user("gone", Role::Athlete);
    gone.is_active = false;
    db.upsert_user(&gone).await.unwrap();
}

/// Create a test app over a seeded in-memory store.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let db = ClubDb::new_in_memory();
    seed_users(&db).await;
    app_with_db(db)
}

/// Create a test app whose telemetry relations are not provisioned.
/// Users still exist so authentication works.
#[allow(dead_code)]
pub async fn create_test_app_unprovisioned() -> (axum::Router, Arc<AppState>) {
    let db = ClubDb::new_in_memory_unprovisioned();
    seed_users(&db).await;
    app_with_db(db)
}

fn app_with_db(db: ClubDb) -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let state = Arc::new(AppState { config, db });
    (create_router(state.clone()), state)
}

/// Cookie header value binding the given principal.
#[allow(dead_code)]
pub fn auth_cookie(state: &AppState, user_id: &str) -> String {
    let token = sign_principal_token(user_id, &state.config.cookie_signing_key).unwrap();
    format!("{}={}", ACTING_COOKIE, token)
}

/// Read a JSON response body.
#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
