// SPDX-License-Identifier: MIT

//! Activity endpoint tests: principal resolution, scoping, and the
//! soft-disable behavior when telemetry is not provisioned.

use athlete_hub_api::db::LogQuery;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;

mod common;

fn post_activity(body: serde_json::Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/activity")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_post_activity_without_principal_is_rejected() {
    let (app, _) = common::create_test_app().await;

    let response = app
        .oneshot(post_activity(
            serde_json::json!({"action": "page_view", "page": "/dashboard"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_post_activity_with_body_principal_records() {
    let (app, state) = common::create_test_app().await;

    let response = app
        .oneshot(post_activity(
            serde_json::json!({
                "action": "page_view",
                "page": "/athletes",
                "userId": "coach"
            }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["success"], true);

    let logs = state
        .db
        .query_activity_logs(&LogQuery::default())
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].user_id, "coach");

    let stats = state.db.get_user_stats("coach").await.unwrap().unwrap();
    assert_eq!(stats.total_actions, 1);
    assert_eq!(stats.pages_visited, 1);
}

#[tokio::test]
async fn test_post_activity_resolves_principal_from_cookie() {
    let (app, state) = common::create_test_app().await;
    let cookie = common::auth_cookie(&state, "athlete");

    let response = app
        .oneshot(post_activity(
            serde_json::json!({"action": "search", "page": "/athletes"}),
            Some(&cookie),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let logs = state
        .db
        .query_activity_logs(&LogQuery::default())
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].user_id, "athlete");
}

#[tokio::test]
async fn test_post_activity_unknown_action_is_rejected() {
    let (app, state) = common::create_test_app().await;

    let response = app
        .oneshot(post_activity(
            serde_json::json!({"action": "self_destruct", "userId": "coach"}),
            None,
        ))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    let logs = state
        .db
        .query_activity_logs(&LogQuery::default())
        .await
        .unwrap();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn test_post_activity_unprovisioned_store_soft_disables() {
    let (app, state) = common::create_test_app_unprovisioned().await;

    let response = app
        .oneshot(post_activity(
            serde_json::json!({"action": "create", "userId": "coach"}),
            None,
        ))
        .await
        .unwrap();

    // Logging is an optional capability: the caller still succeeds.
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["success"], true);
    assert!(body["notice"].is_string());

    // Provision afterwards and confirm nothing was written while disabled.
    state.db.set_telemetry_provisioned(true);
    let logs = state
        .db
        .query_activity_logs(&LogQuery::default())
        .await
        .unwrap();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn test_get_activity_requires_authentication() {
    let (app, _) = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/activity")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_get_activity_rejects_forged_cookie() {
    let (app, _) = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/activity")
                .header(header::COOKIE, "athlete_hub_user_id=coach")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_get_activity_scopes_non_admin_to_own_entries() {
    let (app, state) = common::create_test_app().await;

    for (user, page) in [("coach", "/fitness"), ("athlete", "/dashboard")] {
        app.clone()
            .oneshot(post_activity(
                serde_json::json!({"action": "page_view", "page": page, "userId": user}),
                None,
            ))
            .await
            .unwrap();
    }

    // The athlete asks for the coach's entries but only ever sees their own.
    let cookie = common::auth_cookie(&state, "athlete");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/activity?userId=coach")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["logs"][0]["userId"], "athlete");
    // Enriched with the joined profile.
    assert_eq!(body["logs"][0]["displayName"], "User athlete");
    assert_eq!(body["logs"][0]["severity"], "low");
}

#[tokio::test]
async fn test_get_activity_full_access_can_filter_by_user() {
    let (app, state) = common::create_test_app().await;

    for user in ["coach", "athlete"] {
        app.clone()
            .oneshot(post_activity(
                serde_json::json!({"action": "update", "userId": user}),
                None,
            ))
            .await
            .unwrap();
    }

    let cookie = common::auth_cookie(&state, "admin");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/activity?userId=coach&limit=10")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let body = common::body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["logs"][0]["userId"], "coach");
    assert_eq!(body["limit"], 10);
}

#[tokio::test]
async fn test_deactivated_principal_cannot_authenticate() {
    let (app, state) = common::create_test_app().await;
    let cookie = common::auth_cookie(&state, "gone");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/activity")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
