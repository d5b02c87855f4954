//! Single-flight access token refresh.
//!
//! # Responsibilities
//! - Exchange the stored refresh token for a new access token
//! - Collapse concurrent refresh requests into one backend call
//! - Tear the session down when the refresh fails
//!
//! # Design Decisions
//! - The pending refresh is a `Shared` future keyed by the access token it
//!   replaces; every caller holding that token awaits the same handle
//! - The refresh call bypasses the request pipeline, so a 401 from the
//!   refresh endpoint can never start another refresh
//! - Teardown (clear store, publish `SessionEvent::Expired`) happens inside
//!   the shared future, so it runs once per failed refresh no matter how many
//!   callers are waiting

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use url::Url;
use uuid::Uuid;

use crate::client::error::{ApiError, ApiResult};
use crate::client::X_REQUEST_ID;
use crate::observability::metrics;
use crate::session::{SessionEvent, SessionEvents, SessionStore, StorageKey};

type RefreshFuture = Shared<BoxFuture<'static, ApiResult<String>>>;

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Body returned by the refresh endpoint.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    /// Present when the backend rotates refresh tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

struct InFlight {
    /// Access token this refresh replaces.
    stale_token: String,
    future: RefreshFuture,
}

/// Coordinates token refreshes for one client.
pub struct RefreshCoordinator {
    http: reqwest::Client,
    refresh_url: Url,
    login_path: String,
    store: Arc<dyn SessionStore>,
    events: SessionEvents,
    inflight: Mutex<Option<InFlight>>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        refresh_url: Url,
        login_path: String,
        store: Arc<dyn SessionStore>,
        events: SessionEvents,
    ) -> Self {
        Self {
            http,
            refresh_url,
            login_path,
            store,
            events,
            inflight: Mutex::new(None),
        }
    }

    /// Obtain a replacement for `stale_token`.
    ///
    /// Joins the pending refresh for the same token if there is one,
    /// otherwise starts it. Resolves with the new access token.
    pub async fn refresh(&self, stale_token: &str) -> ApiResult<String> {
        let future = {
            let mut slot = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(inflight) if inflight.stale_token == stale_token => {
                    tracing::debug!("Joining in-flight token refresh");
                    inflight.future.clone()
                }
                _ => {
                    // A refresh for this token may have finished since the caller looked.
                    match self.store.access_token() {
                        Some(current) if current != stale_token => return Ok(current),
                        None => return Err(ApiError::session_invalid(401, "session has ended")),
                        Some(_) => {}
                    }
                    let future = self.start().boxed().shared();
                    *slot = Some(InFlight {
                        stale_token: stale_token.to_string(),
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        let result = future.clone().await;

        let mut slot = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|inflight| inflight.future.ptr_eq(&future)) {
            *slot = None;
        }

        result
    }

    /// Whether a refresh is currently pending.
    pub fn is_refreshing(&self) -> bool {
        self.inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|inflight| inflight.future.peek().is_none())
    }

    fn start(&self) -> impl std::future::Future<Output = ApiResult<String>> + Send + 'static {
        let http = self.http.clone();
        let url = self.refresh_url.clone();
        let login_path = self.login_path.clone();
        let store = self.store.clone();
        let events = self.events.clone();

        async move {
            let result = match store.refresh_token() {
                Some(refresh_token) => {
                    tracing::info!("Refreshing access token");
                    match request_tokens(&http, url, &refresh_token).await {
                        Ok(tokens) => persist(store.as_ref(), tokens),
                        Err(err) => Err(err),
                    }
                }
                None => Err(ApiError::session_invalid(401, "no refresh token available")),
            };

            match result {
                Ok(access_token) => {
                    tracing::info!("Access token refreshed");
                    metrics::record_refresh("success");
                    Ok(access_token)
                }
                Err(err) => {
                    let err = err.into_session_invalid();
                    tracing::warn!(status = err.status, error = %err.message, "Token refresh failed, ending session");
                    metrics::record_refresh("failure");
                    teardown(store.as_ref(), &events, &login_path, &err);
                    Err(err)
                }
            }
        }
    }
}

async fn request_tokens(http: &reqwest::Client, url: Url, refresh_token: &str) -> ApiResult<RefreshResponse> {
    let response = http
        .post(url)
        .header(X_REQUEST_ID, Uuid::new_v4().to_string())
        .json(&RefreshRequest { refresh_token })
        .send()
        .await
        .map_err(|e| ApiError::transport(&e))?;

    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(|e| ApiError::transport(&e))?;

    if !(200..300).contains(&status) {
        return Err(ApiError::from_response(status, &body));
    }

    serde_json::from_slice(&body).map_err(|e| ApiError::decode(status, &e))
}

fn persist(store: &dyn SessionStore, tokens: RefreshResponse) -> ApiResult<String> {
    let stored = (|| {
        if let Some(refresh_token) = &tokens.refresh_token {
            store.set(StorageKey::RefreshToken, refresh_token)?;
        }
        if let Some(expires_at) = &tokens.expires_at {
            store.set(StorageKey::ExpiresAt, expires_at)?;
        }
        store.set(StorageKey::AccessToken, &tokens.access_token)
    })();

    stored.map_err(|e| ApiError::session_invalid(500, format!("failed to store refreshed session: {}", e)))?;
    Ok(tokens.access_token)
}

fn teardown(store: &dyn SessionStore, events: &SessionEvents, login_path: &str, err: &ApiError) {
    if let Err(e) = store.clear() {
        tracing::error!(error = %e, "Failed to clear session store");
    }
    metrics::record_session_expired();
    events.publish(SessionEvent::Expired {
        login_path: login_path.to_string(),
        reason: err.message.clone(),
    });
}
