use std::time::Duration;

/// Store key holding the serialized record list
pub const QUEUE_STORAGE_KEY: &str = "guardian_offline_data";

/// Advisory capacity used for storage usage reporting (5 MiB)
pub const DEFAULT_STORAGE_CAP_BYTES: u64 = 5 * 1024 * 1024;

/// How often the displayed unsynced count is refreshed
pub const DEFAULT_COUNT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// How often the connectivity probe checks the remote
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on a single remote insert
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_API_PORT: u16 = 3000;
