// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "fanout";

// =============================================================================
// Configuration Files
// =============================================================================

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "FANOUT_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "FANOUT_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "FANOUT_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "FANOUT_LOG";

/// Environment variable for the credential allow-list (comma-separated)
pub const ENV_API_KEYS: &str = "FANOUT_API_KEYS";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 7040;

/// Credentials admitted when no allow-list is configured
pub const DEFAULT_API_KEYS: &[&str] = &["plivo-test-key", "demo-key", "test-123"];

// =============================================================================
// Broker Defaults
// =============================================================================

/// Per-subscriber delivery queue capacity
pub const DEFAULT_QUEUE_SIZE: usize = 50;

/// Ring buffer capacity used when topic creation omits one
pub const DEFAULT_RING_SIZE: usize = 100;

/// Largest ring buffer a topic may request
pub const MAX_RING_SIZE: usize = 10_000;

/// Consecutive drops before a subscriber is evicted
pub const DEFAULT_SLOW_CONSUMER_THRESHOLD: u32 = 3;

/// Wall-clock budget for draining queues on graceful shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Maximum topic name length
pub const TOPIC_NAME_MAX_LEN: usize = 128;

/// How often the drain loop re-checks queue occupancy during shutdown
pub const DRAIN_POLL_INTERVAL_MS: u64 = 50;

// =============================================================================
// WebSocket Close Codes
// =============================================================================

/// Graceful shutdown ("going away")
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Slow-consumer eviction (policy violation)
pub const CLOSE_SLOW_CONSUMER: u16 = 1008;

/// Missing or invalid credential at admission
pub const CLOSE_UNAUTHORIZED: u16 = 4401;
