//! Allocator configuration.

use crate::util::size::{gb, mb};

/// Environment variable enabling stats collection in the default CPU allocator.
pub const ENV_COLLECT_STATS: &str = "TENSORALLOC_COLLECT_STATS";

/// Environment variable setting the default CPU allocator's byte limit.
pub const ENV_BYTES_LIMIT: &str = "TENSORALLOC_BYTES_LIMIT";

/// Environment variable setting the large allocation warning threshold.
pub const ENV_LARGE_ALLOC_WARNING_BYTES: &str = "TENSORALLOC_LARGE_ALLOC_WARNING_BYTES";

/// Configuration for the default host allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocConfig {
    /// Gather usage statistics (default: off)
    pub collect_stats: bool,

    /// Refuse allocations that would exceed this many live bytes (default: none)
    pub bytes_limit: Option<u64>,

    /// Warn about single allocations larger than this (default: 1 GB)
    pub large_allocation_warning_bytes: usize,

    /// Stop warning about large allocations after this many warnings
    pub max_large_allocation_warnings: u64,
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self {
            collect_stats: false,
            bytes_limit: None,
            large_allocation_warning_bytes: gb(1),
            max_large_allocation_warnings: 5,
        }
    }
}

impl AllocConfig {
    /// Create a minimal config for testing or constrained environments.
    pub fn minimal() -> Self {
        Self {
            collect_stats: false,
            bytes_limit: Some(mb(64) as u64),
            large_allocation_warning_bytes: mb(16),
            max_large_allocation_warnings: 1,
        }
    }

    /// Create a config that collects statistics on every call.
    pub fn full_stats() -> Self {
        Self {
            collect_stats: true,
            ..Self::default()
        }
    }

    /// Default config overridden by `TENSORALLOC_*` environment variables.
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enable) = env_var(ENV_COLLECT_STATS).as_deref().and_then(parse_flag) {
            config.collect_stats = enable;
        }
        if let Some(limit) = env_var(ENV_BYTES_LIMIT).and_then(|v| v.trim().parse().ok()) {
            config.bytes_limit = Some(limit);
        }
        if let Some(bytes) =
            env_var(ENV_LARGE_ALLOC_WARNING_BYTES).and_then(|v| v.trim().parse().ok())
        {
            config.large_allocation_warning_bytes = bytes;
        }

        config
    }

    /// Builder pattern: enable statistics collection.
    pub fn with_collect_stats(mut self, enable: bool) -> Self {
        self.collect_stats = enable;
        self
    }

    /// Builder pattern: set the byte limit.
    pub fn with_bytes_limit(mut self, limit: u64) -> Self {
        self.bytes_limit = Some(limit);
        self
    }

    /// Builder pattern: set the large allocation warning threshold.
    pub fn with_large_allocation_warning(mut self, bytes: usize) -> Self {
        self.large_allocation_warning_bytes = bytes;
        self
    }

    /// Builder pattern: cap the number of large allocation warnings.
    pub fn with_max_large_allocation_warnings(mut self, count: u64) -> Self {
        self.max_large_allocation_warnings = count;
        self
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Parse a boolean switch as written in environment variables.
pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
