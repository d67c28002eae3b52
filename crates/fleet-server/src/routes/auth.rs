// SPDX-License-Identifier: MIT OR Apache-2.0
//! Account lifecycle routes (§4.7, §8 scenario 1).

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, response::Response, Json};
use fleet_core::Role;
use serde::Deserialize;

use crate::identity::{require_rank, CurrentIdentity};
use crate::middleware::RequestId;
use crate::response::{err, ok, respond};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignUpBody {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    Json(body): Json<SignUpBody>,
) -> Response {
    let started = Instant::now();
    match state.auth.sign_up(&body.email, &body.password, &body.display_name).await {
        Ok((user, _verify_token)) => ok(request_id.0, started, user.into_public()),
        Err(e) => {
            let fleet_err: fleet_error::FleetError = e.into();
            err(request_id.0, started, fleet_err, None)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailBody {
    pub token: String,
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    Json(body): Json<VerifyEmailBody>,
) -> Response {
    let started = Instant::now();
    let result = state.auth.verify_email(&body.token).await.map(fleet_core::User::into_public);
    respond(request_id.0, started, result)
}

#[derive(Debug, Deserialize)]
pub struct SignInBody {
    pub email: String,
    pub password: String,
}

pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    headers: axum::http::HeaderMap,
    Json(body): Json<SignInBody>,
) -> Response {
    let started = Instant::now();
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state.auth.sign_in(&body.email, &body.password, ip, user_agent).await {
        Ok((user, session)) => {
            let mut resp = ok(
                request_id.0,
                started,
                serde_json::json!({"user": user.into_public(), "token": session.token.as_str()}),
            );
            let cookie = format!(
                "{}={}; Path=/; HttpOnly; SameSite=Lax",
                crate::identity::SESSION_COOKIE,
                session.token.as_str()
            );
            if let Ok(value) = axum::http::HeaderValue::from_str(&cookie) {
                resp.headers_mut().insert(axum::http::header::SET_COOKIE, value);
            }
            resp
        }
        Err(e) => {
            let fleet_err: fleet_error::FleetError = e.into();
            err(request_id.0, started, fleet_err, None)
        }
    }
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    headers: axum::http::HeaderMap,
) -> Response {
    let started = Instant::now();
    let session_token = headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookie| crate::identity::cookie_value(cookie, crate::identity::SESSION_COOKIE))
        .map(str::to_string);
    let Some(token) = session_token else {
        return ok(request_id.0, started, serde_json::json!({"loggedOut": true}));
    };
    let result = state.auth.logout(&identity.user_id, &token).await;
    respond(request_id.0, started, result.map(|_| serde_json::json!({"loggedOut": true})))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordBody {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
    headers: axum::http::HeaderMap,
    Json(body): Json<ChangePasswordBody>,
) -> Response {
    let started = Instant::now();
    let current_token = headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookie| crate::identity::cookie_value(cookie, crate::identity::SESSION_COOKIE))
        .map(str::to_string)
        .unwrap_or_default();

    let result = state
        .auth
        .change_password(&identity.user_id, &body.current_password, &body.new_password, &current_token)
        .await;
    respond(request_id.0, started, result.map(|_| serde_json::json!({"changed": true})))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordBody {
    pub email: String,
}

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    Json(body): Json<ForgotPasswordBody>,
) -> Response {
    let started = Instant::now();
    // Never reveal whether the address is registered (§4.7): always 200.
    let result = state.auth.forgot_password(&body.email).await;
    respond(request_id.0, started, result.map(|_| serde_json::json!({"sent": true})))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordBody {
    pub token: String,
    pub new_password: String,
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    Json(body): Json<ResetPasswordBody>,
) -> Response {
    let started = Instant::now();
    let result = state.auth.reset_password(&body.token, &body.new_password).await;
    respond(request_id.0, started, result.map(fleet_core::User::into_public))
}

pub async fn me(
    RequestId(request_id): RequestId,
    CurrentIdentity(identity): CurrentIdentity,
) -> Response {
    let started = Instant::now();
    if let Err(resp) = require_rank(&identity, Role::Ensign, request_id.0, started) {
        return resp;
    }
    ok(
        request_id.0,
        started,
        serde_json::json!({
            "user_id": identity.user_id.as_str(),
            "role": identity.role,
            "email_verified": identity.email_verified,
            "locked": identity.locked,
        }),
    )
}
