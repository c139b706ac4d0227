//! Process-wide sync status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Observable state of the sync engine.
///
/// Only the orchestrator drives transitions. `Uploading` and `Downloading`
/// are reserved for hosts that report finer-grained progress; a full-sync
/// pass is observed as `Syncing` from start to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Uploading,
    Downloading,
    Offline,
    Error,
}

impl SyncStatus {
    /// Whether a pass currently owns the engine.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SyncStatus::Syncing | SyncStatus::Uploading | SyncStatus::Downloading
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Uploading => "uploading",
            SyncStatus::Downloading => "downloading",
            SyncStatus::Offline => "offline",
            SyncStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(SyncStatus::default(), SyncStatus::Idle);
    }

    #[test]
    fn test_busy_states() {
        assert!(SyncStatus::Syncing.is_busy());
        assert!(SyncStatus::Uploading.is_busy());
        assert!(!SyncStatus::Idle.is_busy());
        assert!(!SyncStatus::Offline.is_busy());
        assert!(!SyncStatus::Error.is_busy());
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&SyncStatus::Offline).unwrap();
        assert_eq!(json, "\"offline\"");
        assert_eq!(SyncStatus::Downloading.to_string(), "downloading");
    }
}
