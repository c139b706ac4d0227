//! # keepsake-core
//!
//! Core types, traits, and abstractions for the keepsake sync engine.
//!
//! This crate provides:
//! - Domain records (`Bookmark`, `Category`) and their remote row shape
//! - Collaborator traits for the local store, session, reachability and remote store
//! - Error types, defaults and the sync event bus
//! - Structured-logging field names and subscriber setup

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod memory;
pub mod models;
pub mod status;
pub mod traits;

pub use error::{Error, Result};
pub use events::{EventBus, EventEnvelope, SyncEvent};
pub use memory::{InMemoryRepository, StaticReachability, StaticSession};
pub use models::{
    Bookmark, Category, ContentSource, RecordKind, RecordRef, RecordSnapshot, RemoteRow,
    SyncableRecord,
};
pub use status::SyncStatus;
pub use traits::{LocalRepository, ReachabilityProbe, RemoteStore, SessionProvider};

// Re-export commonly used external types
pub use chrono::{DateTime, Utc};
pub use keepsake_crypto::FieldMap;
pub use uuid::Uuid;
