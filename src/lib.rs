//! N.O.A API client library.
//!
//! # Architecture Overview
//!
//! ```text
//!     caller / services
//!            │
//!            ▼
//!     ┌──────────────┐  read token  ┌───────────────┐
//!     │  ApiClient   │─────────────▶│ SessionStore  │
//!     │  (pipeline)  │              │ memory / file │
//!     └──────┬───────┘              └───────▲───────┘
//!            │ 401                          │ replace / clear
//!            ▼                              │
//!     ┌──────────────┐──────────────────────┘
//!     │   Refresh    │
//!     │ Coordinator  │──────▶ SessionEvents (Expired → host redirects to login)
//!     └──────────────┘
//! ```

pub mod client;
pub mod config;
pub mod observability;
pub mod services;
pub mod session;

pub use client::{ApiClient, ApiError, ApiResponse, ErrorKind};
pub use config::ClientConfig;
pub use session::{SessionEvent, SessionEvents, SessionStore};
