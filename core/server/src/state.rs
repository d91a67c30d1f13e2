//! Shared service state.

use std::sync::Arc;

use quillvault_store::ObjectStore;

use crate::presign::Presigner;

/// Everything a request handler needs.
#[derive(Clone)]
pub struct AppState {
    /// The backing object store.
    pub store: Arc<dyn ObjectStore>,
    /// Shared secret for device-token verification.
    pub secret: Arc<str>,
    /// Signer for short-lived transfer URLs.
    pub presigner: Arc<Presigner>,
}

impl AppState {
    /// Build service state from a store, the shared secret, and the base
    /// URL presigned links are issued under.
    pub fn new(store: Arc<dyn ObjectStore>, secret: &str, base_url: &str) -> Self {
        Self {
            store,
            secret: Arc::from(secret),
            presigner: Arc::new(Presigner::new(secret, base_url)),
        }
    }
}
