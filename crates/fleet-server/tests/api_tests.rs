// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end route tests against a live Postgres (§8's core scenarios).
//!
//! Gated `#[ignore]`: set `DATABASE_URL` to a scratch database (migrations
//! run automatically, nothing is torn down) and run with
//! `cargo test -- --ignored`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use fleet_server::{build_app, state::AppState};

async fn test_state() -> Arc<AppState> {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored DB tests");
    let config = fleet_config::FleetConfig {
        database_url,
        admin_token: Some("test-admin-token".to_string()),
        legacy_invite_token: None,
        smtp: None,
        base_url: "http://localhost:3000".to_string(),
        log_level: "error".to_string(),
        log_pretty: false,
        admin_role: "fleet_admin".to_string(),
        app_role: "fleet_app".to_string(),
        db_max_connections: 5,
        proposal_ttl_secs: 900,
    };

    let db = fleet_db::Db::connect(&config).await.expect("connect to test database");
    db.migrate(&config.app_role).await.expect("migrate test database");
    AppState::new(db, config)
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn req(method: &str, uri: &str, bearer: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri).header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap()
}

#[tokio::test]
#[ignore]
async fn signup_signin_me_round_trip() {
    let state = test_state().await;
    let email = format!("pilot-{}@example.test", uuid::Uuid::new_v4());

    let app = build_app(state.clone());
    let resp = app
        .oneshot(req(
            "POST",
            "/api/auth/signup",
            None,
            serde_json::json!({"email": email, "password": "correct horse battery staple", "display_name": "Test Pilot"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let app = build_app(state.clone());
    let resp = app
        .oneshot(req(
            "POST",
            "/api/auth/signin",
            None,
            serde_json::json!({"email": email, "password": "correct horse battery staple"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .expect("signin sets a session cookie")
        .to_str()
        .unwrap()
        .to_string();
    let token = cookie.split(';').next().unwrap().split('=').nth(1).unwrap().to_string();

    let app = build_app(state.clone());
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header("cookie", format!("majel_session={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp).await;
    assert_eq!(json["data"]["email_verified"], false);
}

#[tokio::test]
#[ignore]
async fn admin_token_can_apply_an_auto_tier_tool_immediately() {
    let state = test_state().await;
    let app = build_app(state.clone());

    let resp = app
        .oneshot(req(
            "POST",
            "/api/mutations/proposals",
            Some("test-admin-token"),
            serde_json::json!({
                "tool": "create_target",
                "args": {
                    "target_type": "ops",
                    "ref_id": null,
                    "loadout_id": null,
                    "target_tier": null,
                    "target_rank": null,
                    "target_level": null,
                    "priority": 2,
                },
            }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp).await;
    assert_eq!(json["data"]["status"], "applied");
    assert!(json["data"]["receipt"]["id"].is_string());
}

#[tokio::test]
#[ignore]
async fn approve_tier_tool_proposes_then_confirms() {
    let state = test_state().await;

    let app = build_app(state.clone());
    let resp = app
        .oneshot(req(
            "POST",
            "/api/mutations/proposals",
            Some("test-admin-token"),
            serde_json::json!({
                "tool": "create_loadout",
                "args": {"ship_ref_id": "ship_test", "name": "Strike wing"},
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp).await;
    assert_eq!(json["data"]["status"], "proposed");
    let proposal_id = json["data"]["proposal_id"].as_str().unwrap().to_string();

    let app = build_app(state.clone());
    let resp = app
        .oneshot(req(
            "POST",
            &format!("/api/mutations/proposals/{proposal_id}/apply"),
            Some("test-admin-token"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp).await;
    assert_eq!(json["data"]["proposal"]["status"], "applied");
}

#[tokio::test]
#[ignore]
async fn approve_tier_tool_can_be_declined() {
    let state = test_state().await;

    let app = build_app(state.clone());
    let resp = app
        .oneshot(req(
            "POST",
            "/api/mutations/proposals",
            Some("test-admin-token"),
            serde_json::json!({
                "tool": "create_loadout",
                "args": {"ship_ref_id": "ship_test", "name": "Abandoned wing"},
            }),
        ))
        .await
        .unwrap();
    let json = json_body(resp).await;
    let proposal_id = json["data"]["proposal_id"].as_str().unwrap().to_string();

    let app = build_app(state.clone());
    let resp = app
        .oneshot(req(
            "POST",
            &format!("/api/mutations/proposals/{proposal_id}/decline"),
            Some("test-admin-token"),
            serde_json::json!({"reason": "changed my mind"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp).await;
    assert_eq!(json["data"]["status"], "declined");
}

#[tokio::test]
#[ignore]
async fn block_tier_tool_is_rejected_outright() {
    let state = test_state().await;
    let app = build_app(state.clone());

    let resp = app
        .oneshot(req(
            "POST",
            "/api/mutations/proposals",
            Some("test-admin-token"),
            serde_json::json!({"tool": "activate_preset", "args": {"loadout_id": "l1"}}),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn catalog_overlay_round_trips() {
    let state = test_state().await;

    let app = build_app(state.clone());
    let resp = app
        .oneshot(req(
            "PATCH",
            "/api/catalog/officers/officer_test/overlay",
            Some("test-admin-token"),
            serde_json::json!({"favorite": true}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let app = build_app(state.clone());
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/catalog/officers/officer_test")
                .header("authorization", "Bearer test-admin-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp).await;
    assert_eq!(json["data"]["favorite"], true);
}
