//! Structured logging schema and subscriber setup for keepsake.
//!
//! All crates use these constants for consistent structured logging fields,
//! so a log pipeline can follow one record from local mutation to remote row.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Sync work lost (dropped task, failed full sync) |
//! | WARN  | Recoverable issue, degraded payload, deferred work |
//! | INFO  | Lifecycle events (key generated, full sync completed, timers) |
//! | DEBUG | Decision points (gating, diff sizes, upsert branch) |
//! | TRACE | Per-field and per-row iteration |

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "crypto", "mirror", "sync", "dispatch"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "upsert", "delete", "full_sync", "list_client_ids"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Client identifier of the record being synced.
pub const CLIENT_ID: &str = "client_id";

/// Owner (signed-in user) the remote row belongs to.
pub const OWNER_ID: &str = "owner_id";

/// Record kind ("bookmark", "category").
pub const RECORD_KIND: &str = "record_kind";

/// Remote table affected.
pub const TABLE: &str = "table";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Local records considered by a pass.
pub const LOCAL_COUNT: &str = "local_count";

/// Client ids already present remotely.
pub const REMOTE_COUNT: &str = "remote_count";

/// Records uploaded by a pass.
pub const UPLOADED: &str = "uploaded";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "keepsake=info";

/// Install a global subscriber for the host application.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `RUST_LOG` | `keepsake=info` | Standard env filter |
/// | `LOG_FORMAT` | `text` | `json` or `text` |
/// | `LOG_ANSI` | auto | `true`/`false` override ANSI colors |
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing() -> Result<()> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        let mut layer = tracing_subscriber::fmt::layer();
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).try_init()
    };

    result.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {}", e)))?;
    tracing::info!(log_format = %log_format, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_are_snake_case() {
        for field in [CLIENT_ID, OWNER_ID, RECORD_KIND, TABLE, DURATION_MS, UPLOADED] {
            assert!(field.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn test_second_init_fails_instead_of_panicking() {
        let _ = init_tracing();
        let second = init_tracing();
        assert!(matches!(second, Err(Error::Config(_))));
    }
}
