//! Centralized default constants for keepsake.
//!
//! Crates reference these instead of defining their own magic numbers.

// =============================================================================
// SYNC
// =============================================================================

/// Interval between automatic full-sync passes (5 minutes).
pub const AUTO_SYNC_INTERVAL_SECS: u64 = 300;

/// Maximum concurrent upserts while uploading the diff of one record kind.
pub const UPLOAD_CONCURRENCY: usize = 4;

// =============================================================================
// BACKGROUND DISPATCH
// =============================================================================

/// Maximum background sync tasks in flight at once.
pub const DISPATCH_WORKERS: usize = 4;

/// Capacity of the mutation-triggered task queue.
pub const DISPATCH_QUEUE_CAPACITY: usize = 256;

// =============================================================================
// REMOTE
// =============================================================================

/// Per-call timeout for remote store requests.
pub const REMOTE_TIMEOUT_SECS: u64 = 30;

/// REST path prefix for PostgREST-compatible backends.
pub const REMOTE_REST_PATH: &str = "/rest/v1";

/// Remote table holding mirrored bookmarks.
pub const BOOKMARKS_TABLE: &str = "bookmarks";

/// Remote table holding mirrored categories.
pub const CATEGORIES_TABLE: &str = "categories";

// =============================================================================
// EVENTS
// =============================================================================

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;
