//! In-process fake of the backend's REST contract

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use conductor_e2e::credentials::DEFAULT_USER_PASSWORD;

/// A request the fake received
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: &'static str,
    pub path: String,
    pub body: Value,
    pub session: Option<String>,
}

#[derive(Debug)]
pub struct FakeState {
    requests: Mutex<Vec<Recorded>>,
    seeded: Mutex<HashSet<String>>,
    /// Answer logins with `{data: {}}`
    pub login_without_id: AtomicBool,
    /// Status the reset endpoint answers with
    pub reset_status: AtomicU16,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            requests: Mutex::default(),
            seeded: Mutex::default(),
            login_without_id: AtomicBool::new(false),
            reset_status: AtomicU16::new(200),
        }
    }
}

impl FakeState {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    fn record(&self, method: &'static str, path: &str, body: Value, headers: &HeaderMap) {
        self.requests.lock().unwrap().push(Recorded {
            method,
            path: path.to_string(),
            body,
            session: session_of(headers),
        });
    }
}

fn session_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == "n8n-auth")
        .map(|(_, value)| value.to_string())
}

pub struct FakeBackend {
    pub base_url: String,
    pub state: Arc<FakeState>,
    handle: JoinHandle<()>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new()
            .route("/favicon.ico", get(|| async { StatusCode::OK }))
            .route("/rest/login", post(login))
            .route("/rest/e2e/reset", post(reset))
            .route("/rest/e2e/feature", patch(feature))
            .route("/rest/e2e/quota", patch(quota))
            .route("/rest/e2e/queue-mode", patch(queue_mode))
            .route("/rest/users", get(users))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            handle,
        }
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn login(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("POST", "/rest/login", body.clone(), &headers);
    let email = body["emailOrLdapLoginId"].as_str().unwrap_or_default().to_string();

    if state.login_without_id.load(Ordering::SeqCst) {
        return Json(json!({ "data": {} })).into_response();
    }
    let known = state.seeded.lock().unwrap().contains(&email);
    if !known || body["password"] != DEFAULT_USER_PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Wrong username or password" })),
        )
            .into_response();
    }

    (
        [(header::SET_COOKIE, format!("n8n-auth={email}; Path=/; HttpOnly"))],
        Json(json!({ "data": { "id": format!("user-{email}"), "email": email } })),
    )
        .into_response()
}

async fn reset(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    state.record("POST", "/rest/e2e/reset", body.clone(), &headers);
    let status = StatusCode::from_u16(state.reset_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_success() {
        let mut seeded = state.seeded.lock().unwrap();
        seeded.clear();
        let users = [&body["owner"], &body["admin"]]
            .into_iter()
            .chain(body["members"].as_array().into_iter().flatten());
        for user in users {
            if let Some(email) = user["email"].as_str() {
                seeded.insert(email.to_string());
            }
        }
    }
    status
}

async fn feature(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("PATCH", "/rest/e2e/feature", body, &headers);
    Json(json!({ "data": { "success": true } }))
}

async fn quota(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("PATCH", "/rest/e2e/quota", body, &headers);
    Json(json!({ "data": { "success": true } }))
}

async fn queue_mode(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("PATCH", "/rest/e2e/queue-mode", body, &headers);
    Json(json!({ "data": { "success": true } }))
}

/// Lists the signed-in user only; 401 without a session
async fn users(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record("GET", "/rest/users", json!(query), &headers);
    match session_of(&headers) {
        Some(email) => Json(json!({
            "data": { "count": 1, "items": [{ "email": email }] }
        }))
        .into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}
