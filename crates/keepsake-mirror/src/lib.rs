//! # keepsake-mirror
//!
//! Encrypted remote mirror for keepsake records.
//!
//! [`MirrorClient`] upserts, deletes and lists rows keyed by
//! `(owner_id, client_id)`, encrypting sensitive fields on the way out.
//! Two stores are provided: [`RestRemoteStore`] for PostgREST-compatible
//! backends and [`MemoryRemoteStore`] for offline use and tests.

pub mod client;
pub mod memory;
pub mod payload;
pub mod rest;

pub use client::{MirrorClient, UpsertOutcome};
pub use memory::{CallCounts, MemoryRemoteStore, StoreFailure};
pub use payload::{build_row, open_row};
pub use rest::{RestConfig, RestRemoteStore, DEFAULT_REMOTE_URL};
