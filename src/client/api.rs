//! Authenticated API client.
//!
//! # Responsibilities
//! - Resolve paths against the configured base URL
//! - Attach the stored access token to every request
//! - Recover from an expired access token by refreshing once and replaying
//! - Decode success bodies and normalize failures into [`ApiError`]

use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::client::error::{ApiError, ApiResult, ErrorKind, TRANSPORT_STATUS};
use crate::client::refresh::RefreshCoordinator;
use crate::client::request::{ApiResponse, FilePart, RequestBody, RequestDescriptor, RequestOptions};
use crate::client::upload::build_form;
use crate::client::X_REQUEST_ID;
use crate::config::{ApiConfig, ClientConfig, StoreKind};
use crate::observability::metrics;
use crate::session::{FileStore, MemoryStore, SessionEvents, SessionStore, StoreError};

/// Errors raised while constructing a client.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid base URL '{url}': {source}")]
    BaseUrl { url: String, source: url::ParseError },

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to open session store: {0}")]
    Store(#[from] StoreError),

    #[error("file session store configured without a path")]
    MissingSessionPath,
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    config: ApiConfig,
    store: Option<Arc<dyn SessionStore>>,
    events: Option<SessionEvents>,
}

impl ApiClientBuilder {
    /// Use a specific session store (defaults to an empty [`MemoryStore`]).
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Publish session events on an existing hub.
    pub fn events(mut self, events: SessionEvents) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<ApiClient, InitError> {
        let base_url = self.config.base_url.trim_end_matches('/').to_string();
        let refresh_path = normalize_path(&self.config.refresh_path);
        let refresh_url = Url::parse(&format!("{}{}", base_url, refresh_path)).map_err(|source| {
            InitError::BaseUrl {
                url: self.config.base_url.clone(),
                source,
            }
        })?;

        let http = reqwest::Client::builder()
            .timeout(self.config.timeout())
            .user_agent(self.config.user_agent.clone())
            .build()?;

        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let events = self.events.unwrap_or_default();
        let refresher = RefreshCoordinator::new(
            http.clone(),
            refresh_url,
            self.config.login_path.clone(),
            store.clone(),
            events.clone(),
        );

        tracing::debug!(
            base_url = %base_url,
            timeout_secs = self.config.timeout_secs,
            "API client initialized"
        );

        Ok(ApiClient {
            inner: Arc::new(Inner {
                http,
                base_url,
                refresh_path,
                store,
                events,
                refresher,
            }),
        })
    }
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    refresh_path: String,
    store: Arc<dyn SessionStore>,
    events: SessionEvents,
    refresher: RefreshCoordinator,
}

/// HTTP client for the N.O.A backend.
///
/// Cheap to clone; clones share the session store and the pending refresh.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    pub fn builder(config: ApiConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            store: None,
            events: None,
        }
    }

    /// Build a client and its session store from a loaded configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, InitError> {
        let store: Arc<dyn SessionStore> = match config.session.store {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::File => {
                let path = config.session.path.as_ref().ok_or(InitError::MissingSessionPath)?;
                let store = FileStore::open(path)?;
                tracing::debug!(path = %store.path().display(), "Using file session store");
                Arc::new(store)
            }
        };
        Self::builder(config.api.clone()).store(store).build()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.inner.store
    }

    pub fn events(&self) -> &SessionEvents {
        &self.inner.events
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Whether a token refresh is pending right now.
    pub fn is_refreshing(&self) -> bool {
        self.inner.refresher.is_refreshing()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<ApiResponse<T>> {
        self.send(RequestDescriptor::new(Method::GET, path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ApiResponse<T>> {
        self.send(RequestDescriptor::new(Method::POST, path).body(json_body(body)?)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ApiResponse<T>> {
        self.send(RequestDescriptor::new(Method::PUT, path).body(json_body(body)?)).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ApiResponse<T>> {
        self.send(RequestDescriptor::new(Method::PATCH, path).body(json_body(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<ApiResponse<T>> {
        self.send(RequestDescriptor::new(Method::DELETE, path)).await
    }

    /// POST `application/x-www-form-urlencoded` fields.
    pub async fn post_form<T: DeserializeOwned>(&self, path: &str, fields: Vec<(String, String)>) -> ApiResult<ApiResponse<T>> {
        self.send(RequestDescriptor::new(Method::POST, path).body(RequestBody::Form(fields))).await
    }

    /// POST a file as `multipart/form-data`.
    pub async fn upload_file<T: DeserializeOwned>(&self, path: &str, file: FilePart) -> ApiResult<ApiResponse<T>> {
        self.send(RequestDescriptor::new(Method::POST, path).body(RequestBody::File(file))).await
    }

    /// Like [`ApiClient::get`], with per-call headers and query parameters.
    pub async fn get_with<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> ApiResult<ApiResponse<T>> {
        self.send(RequestDescriptor::new(Method::GET, path).options(options)).await
    }

    /// Run a request through the pipeline.
    pub async fn send<T: DeserializeOwned>(&self, mut request: RequestDescriptor) -> ApiResult<ApiResponse<T>> {
        loop {
            let (status, body) = self.dispatch(&mut request).await?;
            if status != 401 {
                return finish(status, &body);
            }
            let token = self.recover(&mut request, &body).await?;
            request.token_override = Some(token);
        }
    }

    /// Decide what to do with a 401: fail, or return the token to replay with.
    async fn recover(&self, request: &mut RequestDescriptor, body: &[u8]) -> ApiResult<String> {
        let unauthorized = ApiError::from_response(401, body);

        if self.is_refresh_call(&request.path) {
            tracing::debug!(path = %request.path, "401 from refresh endpoint");
            return Err(unauthorized.into_session_invalid());
        }
        if request.retried {
            tracing::warn!(path = %request.path, "Still unauthorized after token refresh");
            return Err(unauthorized.into_session_invalid());
        }
        let Some(sent_token) = request.sent_token.clone() else {
            // Unauthenticated request; the backend's answer stands.
            return Err(unauthorized);
        };

        request.retried = true;

        match self.inner.store.access_token() {
            Some(current) if current != sent_token => {
                tracing::debug!(path = %request.path, "Token already refreshed, replaying");
                Ok(current)
            }
            Some(_) => self.inner.refresher.refresh(&sent_token).await,
            None => {
                tracing::debug!(path = %request.path, "Session already cleared");
                Err(unauthorized.into_session_invalid())
            }
        }
    }

    async fn dispatch(&self, request: &mut RequestDescriptor) -> ApiResult<(u16, Vec<u8>)> {
        let url = self.endpoint(&request.path)?;
        let token = request
            .token_override
            .clone()
            .or_else(|| self.inner.store.access_token());
        let request_id = Uuid::new_v4();

        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), url)
            .header(X_REQUEST_ID, request_id.to_string());
        if let Some(token) = &token {
            builder = builder.bearer_auth(token);
        }
        if !request.options.headers.is_empty() {
            // Authorization always comes from the session store.
            let mut headers = request.options.headers.clone();
            if headers.remove(AUTHORIZATION).is_some() {
                tracing::warn!(path = %request.path, "Ignoring per-call Authorization header");
            }
            builder = builder.headers(headers);
        }
        if !request.options.query.is_empty() {
            builder = builder.query(&request.options.query);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::File(part) => builder.multipart(build_form(part)?),
        };

        request.sent_token = token;

        tracing::debug!(
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
            authenticated = request.sent_token.is_some(),
            retried = request.retried,
            "Dispatching request"
        );

        let start_time = Instant::now();
        let method = request.method.as_str();

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(request_id = %request_id, path = %request.path, error = %e, "Request failed");
                metrics::record_request(method, TRANSPORT_STATUS, start_time);
                return Err(ApiError::transport(&e));
            }
        };

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "Failed to read response body");
            ApiError::transport(&e)
        })?;

        metrics::record_request(method, status, start_time);
        tracing::debug!(request_id = %request_id, status, "Response received");

        Ok((status, body.to_vec()))
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        let full = format!("{}{}", self.inner.base_url, normalize_path(path));
        Url::parse(&full).map_err(|e| ApiError {
            status: 400,
            message: format!("invalid request path '{}': {}", path, e),
            kind: ErrorKind::Client,
        })
    }

    fn is_refresh_call(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        normalize_path(path).trim_end_matches('/') == self.inner.refresh_path.trim_end_matches('/')
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .field("refresh_path", &self.inner.refresh_path)
            .finish()
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn json_body<B: Serialize + ?Sized>(body: &B) -> ApiResult<RequestBody> {
    match serde_json::to_value(body) {
        Ok(Value::Null) => Ok(RequestBody::Empty),
        Ok(value) => Ok(RequestBody::Json(value)),
        Err(e) => Err(ApiError {
            status: 400,
            message: format!("request body could not be serialized: {}", e),
            kind: ErrorKind::Client,
        }),
    }
}

/// Turn a final (non-401-recoverable) response into the caller's result.
fn finish<T: DeserializeOwned>(status: u16, body: &[u8]) -> ApiResult<ApiResponse<T>> {
    if !(200..300).contains(&status) {
        return Err(ApiError::from_response(status, body));
    }
    Ok(ApiResponse {
        data: decode_body(status, body)?,
        status,
    })
}

/// Empty bodies decode as `null`; non-JSON bodies as a JSON string.
fn decode_body<T: DeserializeOwned>(status: u16, body: &[u8]) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_value(Value::Null).map_err(|e| ApiError::decode(status, &e));
    }
    match serde_json::from_slice(body) {
        Ok(data) => Ok(data),
        Err(json_err) if serde_json::from_slice::<Value>(body).is_err() => {
            let text = Value::String(String::from_utf8_lossy(body).into_owned());
            serde_json::from_value(text).map_err(|_| ApiError::decode(status, &json_err))
        }
        Err(e) => Err(ApiError::decode(status, &e)),
    }
}
