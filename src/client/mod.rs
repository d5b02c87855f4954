//! API client subsystem.
//!
//! # Data Flow
//! ```text
//! caller (get/post/put/patch/delete/upload_file)
//!     → request.rs (RequestDescriptor)
//!     → api.rs dispatch (attach bearer token from session store)
//!     → backend
//!
//! On 401 for an authenticated, not-yet-retried request:
//!     → refresh.rs (join or start the single in-flight refresh)
//!     → api.rs dispatch again with the new token (once)
//!
//! On failure:
//!     → error.rs (status + resolved message)
//! ```
//!
//! # Design Decisions
//! - A request is replayed at most once
//! - Transport errors are never retried
//! - Every request carries an `X-Request-Id` for correlation with backend logs

pub mod api;
pub mod error;
pub mod refresh;
pub mod request;
pub mod upload;

pub use api::{ApiClient, ApiClientBuilder, InitError};
pub use error::{ApiError, ApiResult, ErrorKind};
pub use request::{ApiResponse, FilePart, RequestBody, RequestDescriptor, RequestOptions};
pub use upload::ProgressCallback;

/// Correlation header attached to every outbound request.
pub const X_REQUEST_ID: &str = "x-request-id";
