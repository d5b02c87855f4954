//! Typed wrappers over the backend endpoints.
//!
//! Each service holds a clone of the shared [`ApiClient`](crate::client::ApiClient),
//! so they all see the same session and the same pending refresh.

pub mod sources;
pub mod users;

pub use sources::SourceService;
pub use users::{LoginResponse, ProfileUpdate, Registration, UserProfile, UserService};
