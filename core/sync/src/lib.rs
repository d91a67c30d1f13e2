//! Quillvault sync engine.
//!
//! This crate is the client side of the protocol:
//! - three-manifest diffing (local vs. remote vs. last-synced base)
//! - conflict resolution, including three-way text merge
//! - a bounded-concurrency transfer queue with exponential retry
//! - the cycle orchestrator that commits manifests under optimistic
//!   concurrency
//! - manual and interval scheduling

pub mod cache;
pub mod conflict;
pub mod diff;
pub mod engine;
pub mod merge;
pub mod queue;
pub mod remote;
pub mod scheduler;
pub mod state;

pub use cache::ContentCache;
pub use conflict::{
    ConflictChoice, ConflictPrompt, ConflictResolver, ConflictStrategy, NoPrompt, Resolution,
};
pub use diff::{apply_to_manifest, diff_manifests, ConflictEntry, DiffResult};
pub use engine::{SyncEngine, SyncOutcome, SyncSummary};
pub use merge::{merge_texts, MergeOutcome};
pub use queue::{TransferHandle, TransferQueue};
pub use remote::{HttpRemote, SyncRemote};
pub use scheduler::{SyncMode, SyncScheduler, SyncSchedulerHandle};
pub use state::{BaseState, StateStore, SyncSettings};
