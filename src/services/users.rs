//! User and authentication endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{ApiClient, ApiResponse, ApiResult, ApiError};
use crate::session::SessionCredentials;

/// Body returned by `POST /users/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl LoginResponse {
    pub fn credentials(&self) -> SessionCredentials {
        SessionCredentials {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at.clone(),
        }
    }
}

/// Fields accepted by `POST /users/register`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registration {
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    #[serde(rename = "company_name", skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// The authenticated user as returned by `/users/me`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub license_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub phone: String,
    #[serde(default, rename = "company_name", deserialize_with = "null_as_empty")]
    pub company: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub country: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub division: String,
    pub is_active: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub api_key: String,
    pub created_at: String,
    pub updated_at: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Editable profile fields for `PUT /users/profile`. Unset fields are omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "company_name", skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
}

#[derive(Serialize)]
struct PasswordResetRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct PasswordReset<'a> {
    token: &'a str,
    new_password: &'a str,
}

/// User account operations.
#[derive(Debug, Clone)]
pub struct UserService {
    client: ApiClient,
}

impl UserService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Exchange username/password for a session and persist it.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<ApiResponse<LoginResponse>> {
        let response: ApiResponse<LoginResponse> = self
            .client
            .post_form(
                "/users/login",
                vec![
                    ("username".to_string(), username.to_string()),
                    ("password".to_string(), password.to_string()),
                ],
            )
            .await?;

        self.client
            .store()
            .save_credentials(&response.data.credentials())
            .map_err(|e| ApiError::session_invalid(500, format!("failed to store session: {}", e)))?;

        tracing::info!(username = %username, "Logged in");
        Ok(response)
    }

    pub async fn register(&self, registration: &Registration) -> ApiResult<ApiResponse<Value>> {
        self.client.post("/users/register", registration).await
    }

    pub async fn current_user(&self) -> ApiResult<ApiResponse<UserProfile>> {
        self.client.get("/users/me").await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<ApiResponse<UserProfile>> {
        self.client.put("/users/profile", update).await
    }

    /// Ask the backend whether the stored token is still accepted.
    pub async fn validate_session(&self) -> ApiResult<ApiResponse<Value>> {
        self.client.get("/users/validate-session").await
    }

    /// Notify the backend (best effort) and drop the local session.
    pub async fn logout(&self) -> ApiResult<()> {
        if let Err(e) = self.client.post::<Value, _>("/users/logout", &()).await {
            tracing::warn!(status = e.status, error = %e.message, "Server-side logout failed, clearing local session anyway");
        }

        self.client
            .store()
            .clear()
            .map_err(|e| ApiError::session_invalid(500, format!("failed to clear session: {}", e)))?;

        tracing::info!("Logged out");
        Ok(())
    }

    pub async fn request_password_reset(&self, email: &str) -> ApiResult<ApiResponse<Value>> {
        self.client
            .post("/users/password-reset-request", &PasswordResetRequest { email })
            .await
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> ApiResult<ApiResponse<Value>> {
        self.client
            .post("/users/password-reset", &PasswordReset { token, new_password })
            .await
    }
}
