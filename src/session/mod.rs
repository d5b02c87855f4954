//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! login (services::users)
//!     → store.rs (persist access/refresh token + expiry)
//!
//! every request (client::api)
//!     → store.rs (read access token at dispatch time)
//!
//! refresh (client::refresh)
//!     → store.rs (replace tokens, or clear on failure)
//!     → events.rs (SessionEvent::Expired on failure)
//! ```
//!
//! # Design Decisions
//! - The store is the only shared mutable state of the client
//! - Navigation is the host's job; the client only publishes an event

pub mod credentials;
pub mod events;
pub mod store;

pub use credentials::{SessionCredentials, StorageKey};
pub use events::{SessionEvent, SessionEvents};
pub use store::{FileStore, MemoryStore, SessionStore, StoreError};
