use dotenv::dotenv;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::warn;

use crate::domain::services::cache::{DEFAULT_CACHE_SIZE, MIN_CACHE_SIZE};
use crate::domain::services::dispatch::SyncDeliverTask;

pub const CACHE_SIZE: &str = "EVENT_ADMIN_CACHE_SIZE";
pub const THREAD_POOL_SIZE: &str = "EVENT_ADMIN_THREAD_POOL_SIZE";
pub const TIMEOUT: &str = "EVENT_ADMIN_TIMEOUT";
pub const REQUIRE_TOPIC: &str = "EVENT_ADMIN_REQUIRE_TOPIC";

pub const DEFAULT_THREAD_POOL_SIZE: usize = 20;
pub const MIN_THREAD_POOL_SIZE: usize = 2;
pub const DEFAULT_TIMEOUT_MS: i64 = 5000;
pub const DEFAULT_REQUIRE_TOPIC: bool = true;

/// Size of the asynchronous pool when the main pool is small.
const MIN_ASYNC_POOL_SIZE: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAdminConfig {
    pub cache_size: usize,
    pub thread_pool_size: usize,
    /// Per-handler timeout; values of 100 or less disable it
    pub timeout_ms: i64,
    /// Whether subscribers without declared topics are ignored
    pub require_topic: bool,
}

impl EventAdminConfig {
    /// Loads the configuration from `.env` and the process environment.
    ///
    /// Missing keys use their default. Malformed or too-small values are
    /// logged and replaced by the default.
    pub fn from_env() -> EventAdminConfig {
        // Load .env file
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from a property map using the same keys as
    /// [`EventAdminConfig::from_env`].
    pub fn from_properties(properties: &HashMap<String, String>) -> EventAdminConfig {
        Self::from_lookup(|key| properties.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> EventAdminConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache_size = match parse_integer(CACHE_SIZE, lookup(CACHE_SIZE)) {
            Some(size) if size >= MIN_CACHE_SIZE as i64 => size as usize,
            Some(size) => {
                warn!(
                    "{} of {} is below the minimum of {}, using {}",
                    CACHE_SIZE, size, MIN_CACHE_SIZE, DEFAULT_CACHE_SIZE
                );
                DEFAULT_CACHE_SIZE
            }
            None => DEFAULT_CACHE_SIZE,
        };

        let thread_pool_size = match parse_integer(THREAD_POOL_SIZE, lookup(THREAD_POOL_SIZE)) {
            Some(size) if size >= MIN_THREAD_POOL_SIZE as i64 => size as usize,
            Some(size) => {
                warn!(
                    "{} of {} is below the minimum of {}, using {}",
                    THREAD_POOL_SIZE, size, MIN_THREAD_POOL_SIZE, DEFAULT_THREAD_POOL_SIZE
                );
                DEFAULT_THREAD_POOL_SIZE
            }
            None => DEFAULT_THREAD_POOL_SIZE,
        };

        let timeout_ms = parse_integer(TIMEOUT, lookup(TIMEOUT)).unwrap_or(DEFAULT_TIMEOUT_MS);

        let require_topic = match lookup(REQUIRE_TOPIC) {
            None => DEFAULT_REQUIRE_TOPIC,
            Some(raw) => parse_flag(&raw).unwrap_or_else(|| {
                warn!(
                    "Invalid value {:?} for {}, using {}",
                    raw, REQUIRE_TOPIC, DEFAULT_REQUIRE_TOPIC
                );
                DEFAULT_REQUIRE_TOPIC
            }),
        };

        EventAdminConfig {
            cache_size,
            thread_pool_size,
            timeout_ms,
            require_topic,
        }
    }

    /// Returns the size of the pool running asynchronous deliveries.
    pub fn async_pool_size(&self) -> usize {
        if self.thread_pool_size > 5 {
            self.thread_pool_size / 2
        } else {
            MIN_ASYNC_POOL_SIZE
        }
    }

    /// Returns the effective per-handler timeout, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        SyncDeliverTask::timeout_from_millis(self.timeout_ms)
    }
}

impl Default for EventAdminConfig {
    fn default() -> Self {
        EventAdminConfig {
            cache_size: DEFAULT_CACHE_SIZE,
            thread_pool_size: DEFAULT_THREAD_POOL_SIZE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            require_topic: DEFAULT_REQUIRE_TOPIC,
        }
    }
}

fn parse_integer(key: &str, raw: Option<String>) -> Option<i64> {
    let raw = raw?;
    match raw.trim().parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Invalid value {:?} for {}, using the default", raw, key);
            None
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
