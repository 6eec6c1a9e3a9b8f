//! Local stand-in for the hosted auth and table API.
//!
//! Access tokens it issues are `fresh-<n>` and refresh tokens `refresh-<n>`.
//! Any other bearer is rejected with 401.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use aop_backend::{BackendConfig, CredentialStorage, RestBackend};
use aop_core::models::identity::{AuthSession, Identity};
use aop_core::models::session::Session;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "correct horse";

pub struct MockState {
    pub user: Identity,
    pub issued: u32,
    pub refresh_grants: u32,
    pub revoke_refresh: bool,
    pub logouts: u32,
    pub sessions: Vec<Session>,
}

impl MockState {
    fn issue(&mut self) -> Value {
        self.issued += 1;
        json!({
            "access_token": format!("fresh-{}", self.issued),
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": format!("refresh-{}", self.issued),
            "user": { "id": self.user.id, "email": self.user.email },
        })
    }
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockServer {
    pub url: String,
    state: Shared,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(MockState {
            user: Identity {
                id: Uuid::new_v4(),
                email: Some(EMAIL.into()),
            },
            issued: 0,
            refresh_grants: 0,
            revoke_refresh: false,
            logouts: 0,
            sessions: Vec::new(),
        }));

        let app = Router::new()
            .route("/auth/v1/user", get(current_user))
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/logout", post(logout))
            .route("/rest/v1/rpc/safe_create_session", post(create_session))
            .route(
                "/rest/v1/sessions",
                get(select_sessions).patch(update_sessions),
            )
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Failed to read local addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock server failed");
        });

        Self {
            url: format!("http://{addr}"),
            state,
            handle,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn user(&self) -> Identity {
        self.state().user.clone()
    }

    pub fn config(&self) -> BackendConfig {
        BackendConfig {
            url: self.url.clone(),
            anon_key: "anon".into(),
            storage_path: None,
            ..Default::default()
        }
    }

    pub fn backend(&self) -> RestBackend {
        RestBackend::new(self.config()).unwrap()
    }

    /// A client restored from storage holding `credential`.
    pub fn backend_with(&self, credential: &AuthSession) -> RestBackend {
        let storage = CredentialStorage::in_memory("aop");
        storage.store_session(credential);
        RestBackend::with_storage(self.config(), storage).unwrap()
    }

    /// A credential whose access token the server no longer accepts but
    /// whose refresh token is still good.
    pub fn stale_credential(&self, expires_in: Duration) -> AuthSession {
        AuthSession {
            access_token: "stale".into(),
            refresh_token: "refresh-0".into(),
            expires_at: Utc::now() + expires_in,
            user: self.user(),
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer fresh-"))
}

fn rejected_jwt() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "code": 401, "error_code": "bad_jwt", "msg": "invalid JWT: token is expired" })),
    )
        .into_response()
}

fn eq_filter<'a>(query: &'a HashMap<String, String>, column: &str) -> Option<&'a str> {
    query.get(column).and_then(|v| v.strip_prefix("eq."))
}

async fn current_user(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return rejected_jwt();
    }
    Json(state.lock().unwrap().user.clone()).into_response()
}

async fn token(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    match query.get("grant_type").map(String::as_str) {
        Some("refresh_token") => {
            let token = body["refresh_token"].as_str().unwrap_or_default();
            if state.revoke_refresh || !token.starts_with("refresh-") {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "code": 400,
                        "error_code": "refresh_token_not_found",
                        "msg": "Invalid Refresh Token: Refresh Token Not Found",
                    })),
                )
                    .into_response();
            }
            state.refresh_grants += 1;
            Json(state.issue()).into_response()
        }
        Some("password") => {
            if body["email"] == EMAIL && body["password"] == PASSWORD {
                Json(state.issue()).into_response()
            } else {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "code": 400,
                        "error_code": "invalid_credentials",
                        "msg": "Invalid login credentials",
                    })),
                )
                    .into_response()
            }
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return rejected_jwt();
    }
    state.lock().unwrap().logouts += 1;
    StatusCode::NO_CONTENT.into_response()
}

fn parse_interval(literal: &str) -> Duration {
    let (amount, unit) = literal.split_once(' ').unwrap();
    let amount: i64 = amount.parse().unwrap();
    if unit.starts_with("hour") {
        Duration::hours(amount)
    } else {
        Duration::seconds(amount)
    }
}

async fn create_session(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return rejected_jwt();
    }
    let now = Utc::now();
    let row = Session {
        id: Uuid::new_v4(),
        user_id: serde_json::from_value(body["p_user_id"].clone()).unwrap(),
        created_at: now,
        last_activity: now,
        expires_at: now + parse_interval(body["p_expires_in"].as_str().unwrap()),
        is_active: true,
        device_info: body["p_device_info"].as_str().map(str::to_string),
        ip_address: None,
        metadata: None,
    };
    let id = row.id;
    state.lock().unwrap().sessions.push(row);
    Json(id).into_response()
}

async fn select_sessions(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return rejected_jwt();
    }
    let state = state.lock().unwrap();

    if let Some(id) = eq_filter(&query, "id") {
        return match state.sessions.iter().find(|s| s.id.to_string() == id) {
            Some(row) => Json(row.clone()).into_response(),
            None => (
                StatusCode::NOT_ACCEPTABLE,
                Json(json!({
                    "code": "PGRST116",
                    "message": "JSON object requested, multiple (or no) rows returned",
                })),
            )
                .into_response(),
        };
    }

    let active_only = eq_filter(&query, "is_active") == Some("true");
    let expires_after: Option<DateTime<Utc>> = query
        .get("expires_at")
        .and_then(|v| v.strip_prefix("gt."))
        .map(|ts| DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc));
    let mut rows: Vec<Session> = state
        .sessions
        .iter()
        .filter(|s| eq_filter(&query, "user_id") == Some(s.user_id.to_string().as_str()))
        .filter(|s| !active_only || s.is_active)
        .filter(|s| expires_after.is_none_or(|after| s.expires_at > after))
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    if let Some(limit) = query.get("limit").and_then(|l| l.parse().ok()) {
        rows.truncate(limit);
    }
    Json(rows).into_response()
}

async fn update_sessions(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return rejected_jwt();
    }
    let mut state = state.lock().unwrap();
    let active_only = eq_filter(&query, "is_active") == Some("true");
    for row in state.sessions.iter_mut() {
        let matches_id = eq_filter(&query, "id").is_none_or(|id| row.id.to_string() == id);
        let matches_user =
            eq_filter(&query, "user_id").is_none_or(|user| row.user_id.to_string() == user);
        if !(matches_id && matches_user) || (active_only && !row.is_active) {
            continue;
        }
        if let Some(at) = body.get("last_activity") {
            row.last_activity = serde_json::from_value(at.clone()).unwrap();
        }
        if let Some(active) = body.get("is_active").and_then(Value::as_bool) {
            row.is_active = active;
        }
    }
    StatusCode::NO_CONTENT.into_response()
}
