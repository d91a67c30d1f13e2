//! The Quillvault manifest service.
//!
//! A stateless HTTP API over an [`ObjectStore`](quillvault_store::ObjectStore):
//! manifest read and conditional write, presigned transfer URLs, bulk
//! delete. All coordination between devices happens through the store's
//! ETag discipline; the service holds no locks and no sessions.

pub mod auth;
pub mod error;
pub mod presign;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use presign::Presigner;
pub use routes::router;
pub use state::AppState;
