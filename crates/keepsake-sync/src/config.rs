//! Sync engine configuration.

use std::time::Duration;

use keepsake_core::defaults;

/// Configuration for the orchestrator and background dispatcher.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Whether mutations dispatch background sync at all.
    pub enabled: bool,
    /// Seconds between automatic full-sync passes.
    pub auto_sync_interval_secs: u64,
    /// Maximum background tasks in flight.
    pub dispatch_workers: usize,
    /// Queue capacity before new tasks are dropped.
    pub dispatch_queue_capacity: usize,
    /// Upper bound on one background task, in seconds.
    pub remote_timeout_secs: u64,
    /// Concurrent upserts while uploading one kind's diff.
    pub upload_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_sync_interval_secs: defaults::AUTO_SYNC_INTERVAL_SECS,
            dispatch_workers: defaults::DISPATCH_WORKERS,
            dispatch_queue_capacity: defaults::DISPATCH_QUEUE_CAPACITY,
            remote_timeout_secs: defaults::REMOTE_TIMEOUT_SECS,
            upload_concurrency: defaults::UPLOAD_CONCURRENCY,
        }
    }
}

impl SyncConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `KEEPSAKE_SYNC_ENABLED` | `true` | Enable/disable mutation-triggered sync |
    /// | `KEEPSAKE_AUTO_SYNC_INTERVAL_SECS` | `300` | Auto-sync period |
    /// | `KEEPSAKE_DISPATCH_WORKERS` | `4` | Max background tasks in flight |
    /// | `KEEPSAKE_DISPATCH_QUEUE_CAPACITY` | `256` | Background queue size |
    /// | `KEEPSAKE_REMOTE_TIMEOUT_SECS` | `30` | Per-task timeout |
    /// | `KEEPSAKE_UPLOAD_CONCURRENCY` | `4` | Concurrent full-sync uploads |
    pub fn from_env() -> Self {
        let enabled = std::env::var("KEEPSAKE_SYNC_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let auto_sync_interval_secs = env_parse("KEEPSAKE_AUTO_SYNC_INTERVAL_SECS")
            .unwrap_or(defaults::AUTO_SYNC_INTERVAL_SECS)
            .max(1);

        let dispatch_workers = env_parse("KEEPSAKE_DISPATCH_WORKERS")
            .unwrap_or(defaults::DISPATCH_WORKERS)
            .max(1);

        let dispatch_queue_capacity = env_parse("KEEPSAKE_DISPATCH_QUEUE_CAPACITY")
            .unwrap_or(defaults::DISPATCH_QUEUE_CAPACITY)
            .max(1);

        let remote_timeout_secs =
            env_parse("KEEPSAKE_REMOTE_TIMEOUT_SECS").unwrap_or(defaults::REMOTE_TIMEOUT_SECS);

        let upload_concurrency = env_parse("KEEPSAKE_UPLOAD_CONCURRENCY")
            .unwrap_or(defaults::UPLOAD_CONCURRENCY)
            .max(1);

        Self {
            enabled,
            auto_sync_interval_secs,
            dispatch_workers,
            dispatch_queue_capacity,
            remote_timeout_secs,
            upload_concurrency,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_auto_sync_interval(mut self, secs: u64) -> Self {
        self.auto_sync_interval_secs = secs;
        self
    }

    pub fn with_dispatch_workers(mut self, workers: usize) -> Self {
        self.dispatch_workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.dispatch_queue_capacity = capacity;
        self
    }

    pub fn with_remote_timeout(mut self, secs: u64) -> Self {
        self.remote_timeout_secs = secs;
        self
    }

    pub fn with_upload_concurrency(mut self, concurrency: usize) -> Self {
        self.upload_concurrency = concurrency;
        self
    }

    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.auto_sync_interval_secs.max(1))
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
