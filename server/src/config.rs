//! Server Configuration
//!
//! Loads configuration from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Limits applied by the channel topology.
///
/// A value of 0 disables the corresponding limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyConfig {
    /// Occupancy cap for channels whose own `max_users` is 0
    pub default_max_users: u32,

    /// Maximum distance of any channel from the root
    pub nesting_limit: usize,

    /// Maximum number of channels, root included
    pub channel_count_limit: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            default_max_users: 0,
            nesting_limit: 10,
            channel_count_limit: 1000,
        }
    }
}

impl TopologyConfig {
    /// No occupancy cap, no nesting or count limits.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            default_max_users: 0,
            nesting_limit: 0,
            channel_count_limit: 0,
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON file holding the persisted channel tree
    pub store_path: PathBuf,

    /// Channel tree limits
    pub topology: TopologyConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// - `CHANNEL_STORE_PATH`: channel tree file (default: `channels.json`)
    /// - `USERS_PER_CHANNEL`: default occupancy cap (default: 0 = unlimited)
    /// - `CHANNEL_NESTING_LIMIT`: maximum channel depth (default: 10)
    /// - `CHANNEL_COUNT_LIMIT`: maximum channel count (default: 1000)
    pub fn from_env() -> Result<Self> {
        let defaults = TopologyConfig::default();

        Ok(Self {
            store_path: env::var("CHANNEL_STORE_PATH")
                .unwrap_or_else(|_| "channels.json".into())
                .into(),
            topology: TopologyConfig {
                default_max_users: parse_var("USERS_PER_CHANNEL")?
                    .unwrap_or(defaults.default_max_users),
                nesting_limit: parse_var("CHANNEL_NESTING_LIMIT")?
                    .unwrap_or(defaults.nesting_limit),
                channel_count_limit: parse_var("CHANNEL_COUNT_LIMIT")?
                    .unwrap_or(defaults.channel_count_limit),
            },
        })
    }

    /// Create a default configuration for testing.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            store_path: "channels-test.json".into(),
            topology: TopologyConfig::unlimited(),
        }
    }
}

/// Parse an optional numeric variable, rejecting malformed values.
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be a non-negative integer")),
        Err(_) => Ok(None),
    }
}
