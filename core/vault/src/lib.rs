//! Vault access for Quillvault.
//!
//! The engine never touches the filesystem directly; it goes through the
//! [`VaultAdapter`] seam so hosts (desktop apps, editors, tests) can supply
//! their own file access. This crate provides the seam, a local filesystem
//! implementation, the exclude-pattern matcher, and the scanner that turns a
//! vault into a manifest.

pub mod adapter;
pub mod local;
pub mod memory;
pub mod pattern;
pub mod scanner;

pub use adapter::{VaultAdapter, VaultFileInfo};
pub use local::LocalVault;
pub use memory::MemoryVault;
pub use pattern::ExcludePatterns;
pub use scanner::{content_hash, VaultScanner};
