//! Common types shared across Quillvault modules.
//!
//! This crate holds the pieces both sides of the wire agree on: the error
//! type, validated vault paths, the sync manifest data model, device token
//! construction and verification, and the request/response bodies of the
//! manifest API.

pub mod error;
pub mod manifest;
pub mod path;
pub mod protocol;
pub mod token;

pub use error::{Error, Result};
pub use manifest::{FileEntry, SyncManifest, FILES_PREFIX, MANIFEST_KEY, RESERVED_PREFIX};
pub use path::SyncPath;
