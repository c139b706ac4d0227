//! # keepsake-sync
//!
//! Reconciliation and mutation-triggered sync for keepsake.
//!
//! - [`SyncOrchestrator`] owns the sync status, gates passes on session and
//!   reachability, runs full-sync backfills and the auto-sync timer.
//! - [`SyncDispatcher`] runs per-mutation work on a bounded background queue.
//! - [`SyncingRepository`] decorates a local repository so every successful
//!   mutation is mirrored without the caller waiting.
//! - [`SyncEngine`] wires all of the above for one process.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod orchestrator;
pub mod repository;

pub use config::SyncConfig;
pub use dispatch::{SyncDispatcher, SyncTask};
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use orchestrator::{KindReport, SkipReason, SyncOrchestrator, SyncOutcome, SyncReport};
pub use repository::SyncingRepository;
