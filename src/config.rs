//! Configuration Module
//!
//! Handles loading service configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name used to namespace lock and queue keys
    pub app_name: String,
    /// Redis connection URL
    pub redis_url: String,
    /// HTTP server port
    pub server_port: u16,
    /// Concurrent handler slots for the demo queue
    pub queue_max_concurrent: u32,
    /// Lifetime of task results in seconds
    pub result_ttl: u64,
    /// Lock record expiry in seconds
    pub lock_timeout: u64,
    /// How long the lock endpoint waits for the lock, in seconds
    pub lock_wait: u64,
    /// TTL of memoized responses in seconds
    pub cache_ttl: u64,
    /// Duration of the simulated slow operations in milliseconds
    pub simulated_work_ms: u64,
    /// Cron expression for the queue stats report
    pub stats_cron: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `APP_NAME` - Key namespace (default: coord)
    /// - `REDIS_URL` - Redis URL (default: redis://127.0.0.1:6379)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `QUEUE_MAX_CONCURRENT` - Demo queue concurrency (default: 3)
    /// - `RESULT_TTL` - Task result lifetime in seconds (default: 86400)
    /// - `LOCK_TIMEOUT` - Lock expiry in seconds (default: 30)
    /// - `LOCK_WAIT` - Lock wait budget in seconds (default: 5)
    /// - `CACHE_TTL` - Memoized response TTL in seconds (default: 30)
    /// - `SIMULATED_WORK_MS` - Simulated work duration (default: 2000)
    /// - `STATS_CRON` - Queue stats report schedule, UTC (default: */5 * * * *)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            app_name: env::var("APP_NAME").unwrap_or(defaults.app_name),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            server_port: parse_var("SERVER_PORT", defaults.server_port),
            queue_max_concurrent: parse_var("QUEUE_MAX_CONCURRENT", defaults.queue_max_concurrent),
            result_ttl: parse_var("RESULT_TTL", defaults.result_ttl),
            lock_timeout: parse_var("LOCK_TIMEOUT", defaults.lock_timeout),
            lock_wait: parse_var("LOCK_WAIT", defaults.lock_wait),
            cache_ttl: parse_var("CACHE_TTL", defaults.cache_ttl),
            simulated_work_ms: parse_var("SIMULATED_WORK_MS", defaults.simulated_work_ms),
            stats_cron: env::var("STATS_CRON").unwrap_or(defaults.stats_cron),
        }
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn simulated_work(&self) -> Duration {
        Duration::from_millis(self.simulated_work_ms)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "coord".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            server_port: 3000,
            queue_max_concurrent: 3,
            result_ttl: 86_400,
            lock_timeout: 30,
            lock_wait: 5,
            cache_ttl: 30,
            simulated_work_ms: 2000,
            stats_cron: "*/5 * * * *".to_string(),
        }
    }
}
