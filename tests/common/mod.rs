//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use noa_client::client::ApiClient;
use noa_client::config::ApiConfig;
use noa_client::session::{MemoryStore, SessionCredentials, SessionStore};

pub const USERNAME: &str = "ana@example.com";
pub const PASSWORD: &str = "hunter2";

/// Programmable state of the mock backend.
pub struct MockState {
    /// Access token currently accepted by protected routes.
    pub valid_token: Mutex<String>,
    /// Refresh token the refresh endpoint accepts.
    pub valid_refresh: Mutex<String>,
    /// Token pair handed out by the next successful refresh.
    pub next_access: Mutex<String>,
    pub next_refresh: Mutex<Option<String>>,
    pub refresh_delay: Mutex<Duration>,
    pub request_delay: Mutex<Duration>,

    pub refresh_calls: AtomicUsize,
    pub protected_calls: AtomicUsize,
    pub always_401_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    /// Authorization header of every request to a protected route.
    pub seen_auth: Mutex<Vec<Option<String>>>,
    /// (file name, size) of every accepted upload.
    pub uploads: Mutex<Vec<(String, usize)>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            valid_token: Mutex::new("access-1".into()),
            valid_refresh: Mutex::new("refresh-1".into()),
            next_access: Mutex::new("access-2".into()),
            next_refresh: Mutex::new(Some("refresh-2".into())),
            refresh_delay: Mutex::new(Duration::ZERO),
            request_delay: Mutex::new(Duration::ZERO),
            refresh_calls: AtomicUsize::new(0),
            protected_calls: AtomicUsize::new(0),
            always_401_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            seen_auth: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }
}

impl MockState {
    /// Invalidate the current access token, as if it had expired.
    pub fn expire_access_token(&self) {
        *self.valid_token.lock().unwrap() = "nobody-has-this".into();
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn set_request_delay(&self, delay: Duration) {
        *self.request_delay.lock().unwrap() = delay;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.seen_auth.lock().unwrap().push(auth.clone());
        let expected = format!("Bearer {}", self.valid_token.lock().unwrap());
        auth.as_deref() == Some(expected.as_str())
    }
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub fn base_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url(),
            timeout_secs: 5,
            ..ApiConfig::default()
        }
    }

    /// A client whose store already holds the mock's current session.
    pub fn logged_in_client(&self) -> (ApiClient, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_credentials(&SessionCredentials::new(
            self.state.valid_token.lock().unwrap().clone(),
            self.state.valid_refresh.lock().unwrap().clone(),
        )));
        let client = ApiClient::builder(self.api_config())
            .store(store.clone())
            .build()
            .unwrap();
        (client, store)
    }

    pub fn anonymous_client(&self) -> (ApiClient, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let client = ApiClient::builder(self.api_config())
            .store(store.clone() as Arc<dyn SessionStore>)
            .build()
            .unwrap();
        (client, store)
    }
}

/// Start the mock backend on an ephemeral port.
pub async fn start_mock_backend() -> MockBackend {
    let state = Arc::new(MockState::default());

    let api = Router::new()
        .route("/echo-auth", get(echo_auth))
        .route("/protected", get(protected))
        .route("/always-401", get(always_401))
        .route("/slow", get(slow))
        .route("/validation", get(validation))
        .route("/missing", get(missing))
        .route("/plain", get(plain))
        .route("/users/refresh", post(refresh))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/me", get(me))
        .route("/upload/file", post(upload))
        .route("/user-files", get(list_files))
        .route("/user-files/{id}", delete(delete_file));

    let app = Router::new().nest("/api/v1", api).with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockBackend { addr, state }
}

/// An address nothing is listening on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

type Shared = State<Arc<MockState>>;

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Token expired" }))).into_response()
}

pub const TRACE_HEADER: &str = "x-trace-id";

async fn echo_auth(headers: HeaderMap) -> Json<serde_json::Value> {
    let auth = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let trace = headers.get(TRACE_HEADER).and_then(|v| v.to_str().ok());
    Json(json!({ "authorization": auth, "trace": trace }))
}

async fn protected(State(state): Shared, headers: HeaderMap) -> Response {
    state.protected_calls.fetch_add(1, Ordering::SeqCst);
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let delay = *state.request_delay.lock().unwrap();
    tokio::time::sleep(delay).await;
    Json(json!({ "ok": true })).into_response()
}

async fn always_401(State(state): Shared) -> Response {
    state.always_401_calls.fetch_add(1, Ordering::SeqCst);
    unauthorized()
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "too late"
}

async fn validation() -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": "Invalid email" }))).into_response()
}

async fn missing() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn plain() -> &'static str {
    "hello"
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

async fn refresh(State(state): Shared, Json(body): Json<RefreshBody>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *state.refresh_delay.lock().unwrap();
    tokio::time::sleep(delay).await;

    if body.refresh_token != *state.valid_refresh.lock().unwrap() {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Invalid refresh token" }))).into_response();
    }

    let access = state.next_access.lock().unwrap().clone();
    let rotated = state.next_refresh.lock().unwrap().clone();
    *state.valid_token.lock().unwrap() = access.clone();
    if let Some(rotated) = &rotated {
        *state.valid_refresh.lock().unwrap() = rotated.clone();
    }

    Json(json!({ "access_token": access, "refresh_token": rotated })).into_response()
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(State(state): Shared, Form(form): Form<LoginForm>) -> Response {
    if form.username != USERNAME || form.password != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Incorrect username or password" })),
        )
            .into_response();
    }
    Json(json!({
        "access_token": state.valid_token.lock().unwrap().clone(),
        "refresh_token": state.valid_refresh.lock().unwrap().clone(),
        "token_type": "bearer",
        "expires_at": "2030-01-01T00:00:00"
    }))
    .into_response()
}

async fn logout(State(state): Shared) -> StatusCode {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn me(State(state): Shared, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "id": "u-1",
        "email": USERNAME,
        "full_name": "Ana Example",
        "license_type": "BUILDER",
        "phone": null,
        "company_name": "Acme",
        "is_active": true,
        "created_at": "2024-01-01T00:00:00",
        "updated_at": "2024-01-01T00:00:00"
    }))
    .into_response()
}

async fn upload(State(state): Shared, headers: HeaderMap, mut multipart: Multipart) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let mut received = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let Ok(bytes) = field.bytes().await else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        received = Some((name, bytes.len()));
    }
    match received {
        Some((name, size)) => {
            state.uploads.lock().unwrap().push((name.clone(), size));
            Json(json!({ "filename": name, "size": size })).into_response()
        }
        None => (StatusCode::BAD_REQUEST, Json(json!({ "detail": "No file" }))).into_response(),
    }
}

async fn list_files(Query(query): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    Json(json!({ "section": query.get("section"), "files": [] }))
}

async fn delete_file(Path(_id): Path<u64>) -> StatusCode {
    StatusCode::NO_CONTENT
}
