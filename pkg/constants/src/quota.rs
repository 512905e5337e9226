//! Quota admission engine defaults.

/// Number of workers draining namespace batches.
pub const DEFAULT_WORKERS: usize = 10;

/// Conflict retries after the first commit attempt of a batch.
pub const DEFAULT_MAX_UPDATE_RETRIES: u32 = 3;

/// How long a live (strongly consistent) lookup result is reused, in seconds.
pub const LIVE_LOOKUP_TTL_SECS: u64 = 30;

/// Maximum namespaces kept in the live lookup cache.
pub const LIVE_LOOKUP_CACHE_SIZE: usize = 100;

/// Maximum quota records kept in the recently-written override cache.
pub const UPDATED_QUOTA_CACHE_SIZE: usize = 100;

/// Deadline applied by the admission hook around a single evaluation, in seconds.
pub const ADMISSION_TIMEOUT_SECS: u64 = 10;
