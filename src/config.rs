//! Core configuration
//!
//! Defaults match the cache's operational envelope; each value can be
//! overridden through the environment.

use std::str::FromStr;
use std::time::Duration;

/// Session cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached sessions
    pub max_cache_size: usize,
    /// Idle TTL before a cached session is considered stale
    pub session_ttl: Duration,
    /// Deadline for connect + metadata fetch
    pub connect_timeout: Duration,
    /// Deadline for one-shot commands and event subscription
    pub command_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: env_or("MAX_CACHE_SIZE", 20),
            session_ttl: Duration::from_secs(env_or("SESSION_TTL_MINUTES", 30u64) * 60),
            connect_timeout: Duration::from_secs(env_or("CONNECT_TIMEOUT_SECS", 20)),
            command_timeout: Duration::from_secs(env_or("COMMAND_TIMEOUT_SECS", 10)),
        }
    }
}

impl CacheConfig {
    /// TTL in whole minutes, for the health/status view
    pub fn session_ttl_minutes(&self) -> u64 {
        self.session_ttl.as_secs() / 60
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
