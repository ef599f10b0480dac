//! Runtime Configuration
//!
//! Everything is read from `CATALOG_*` environment variables (a `.env` file in the working
//! directory is loaded first) and validated once at startup. Command-line flags override the
//! bind address and the trigger parameters.

use crate::ingestion::{FetcherSettings, ImportParams};
use crate::queue::QueueSettings;
use crate::search::SearchSettings;
use crate::writer::ConsumerSettings;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Upper bounds of the consumer parameters: batches of at most 10 messages, a batching
/// window of at most 10 s, and 1 to 10 concurrent batches.
pub const MAX_BATCH_SIZE: usize = 10;
pub const MAX_BATCHING_WINDOW_MS: u64 = 10_000;
pub const MAX_CONCURRENCY: usize = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}={value:?} is not valid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key}={value} is out of range {min}..={max}")]
    OutOfRange {
        key: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,

    pub queue_journal: Option<PathBuf>,
    pub queue_max_depth: Option<usize>,
    pub visibility_timeout_secs: u64,
    pub journal_compaction_min_lines: u64,

    pub batch_size: usize,
    pub batching_window_ms: u64,
    pub max_concurrency: usize,
    pub max_deliveries: u32,
    pub store_write_capacity: Option<usize>,

    pub bulk_index_url: String,
    pub lookback_days: u32,

    pub search_default_limit: usize,
    pub search_max_limit: usize,
    pub search_per_partition_cap: usize,
    pub search_partition_timeout_ms: u64,

    pub stats_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            queue_journal: None,
            queue_max_depth: None,
            visibility_timeout_secs: 30,
            journal_compaction_min_lines: QueueSettings::default().journal_compaction_min_lines,
            batch_size: 10,
            batching_window_ms: 10_000,
            max_concurrency: 4,
            max_deliveries: 5,
            store_write_capacity: None,
            bulk_index_url: FetcherSettings::default().index_url,
            lookback_days: ImportParams::default().lookback_days,
            search_default_limit: 20,
            search_max_limit: 100,
            search_per_partition_cap: 100,
            search_partition_timeout_ms: 2_000,
            stats_interval_secs: 30,
        }
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

fn parse_optional<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        _ => Ok(None),
    }
}

fn check_range(key: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            key,
            value,
            min,
            max,
        });
    }
    Ok(())
}

impl AppConfig {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            bind_addr: parse(&lookup, "CATALOG_BIND", defaults.bind_addr)?,
            queue_journal: parse_optional(&lookup, "CATALOG_QUEUE_JOURNAL")?,
            queue_max_depth: parse_optional(&lookup, "CATALOG_QUEUE_MAX_DEPTH")?,
            visibility_timeout_secs: parse(
                &lookup,
                "CATALOG_VISIBILITY_TIMEOUT_SECS",
                defaults.visibility_timeout_secs,
            )?,
            journal_compaction_min_lines: parse(
                &lookup,
                "CATALOG_JOURNAL_COMPACTION_MIN_LINES",
                defaults.journal_compaction_min_lines,
            )?,
            batch_size: parse(&lookup, "CATALOG_BATCH_SIZE", defaults.batch_size)?,
            batching_window_ms: parse(
                &lookup,
                "CATALOG_BATCHING_WINDOW_MS",
                defaults.batching_window_ms,
            )?,
            max_concurrency: parse(&lookup, "CATALOG_MAX_CONCURRENCY", defaults.max_concurrency)?,
            max_deliveries: parse(&lookup, "CATALOG_MAX_DELIVERIES", defaults.max_deliveries)?,
            store_write_capacity: parse_optional(&lookup, "CATALOG_WRITE_CAPACITY")?,
            bulk_index_url: parse(&lookup, "CATALOG_BULK_INDEX_URL", defaults.bulk_index_url)?,
            lookback_days: parse(&lookup, "CATALOG_LOOKBACK_DAYS", defaults.lookback_days)?,
            search_default_limit: parse(
                &lookup,
                "CATALOG_SEARCH_DEFAULT_LIMIT",
                defaults.search_default_limit,
            )?,
            search_max_limit: parse(&lookup, "CATALOG_SEARCH_MAX_LIMIT", defaults.search_max_limit)?,
            search_per_partition_cap: parse(
                &lookup,
                "CATALOG_SEARCH_PER_PARTITION_CAP",
                defaults.search_per_partition_cap,
            )?,
            search_partition_timeout_ms: parse(
                &lookup,
                "CATALOG_SEARCH_PARTITION_TIMEOUT_MS",
                defaults.search_partition_timeout_ms,
            )?,
            stats_interval_secs: parse(
                &lookup,
                "CATALOG_STATS_INTERVAL_SECS",
                defaults.stats_interval_secs,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("CATALOG_BATCH_SIZE", self.batch_size as u64, 1, MAX_BATCH_SIZE as u64)?;
        check_range(
            "CATALOG_BATCHING_WINDOW_MS",
            self.batching_window_ms,
            0,
            MAX_BATCHING_WINDOW_MS,
        )?;
        check_range(
            "CATALOG_MAX_CONCURRENCY",
            self.max_concurrency as u64,
            1,
            MAX_CONCURRENCY as u64,
        )?;
        check_range("CATALOG_MAX_DELIVERIES", self.max_deliveries as u64, 1, 1_000)?;
        check_range(
            "CATALOG_VISIBILITY_TIMEOUT_SECS",
            self.visibility_timeout_secs,
            1,
            12 * 60 * 60,
        )?;
        // A window as long as the timeout would let batched messages reappear before
        // the batch is even handed out
        let visibility_ms = self.visibility_timeout_secs.saturating_mul(1_000);
        if visibility_ms <= self.batching_window_ms {
            return Err(ConfigError::Invalid {
                key: "CATALOG_VISIBILITY_TIMEOUT_SECS",
                value: self.visibility_timeout_secs.to_string(),
                reason: format!(
                    "must exceed the batching window of {} ms",
                    self.batching_window_ms
                ),
            });
        }
        check_range(
            "CATALOG_JOURNAL_COMPACTION_MIN_LINES",
            self.journal_compaction_min_lines,
            1,
            u64::MAX,
        )?;
        check_range(
            "CATALOG_SEARCH_PARTITION_TIMEOUT_MS",
            self.search_partition_timeout_ms,
            1,
            60_000,
        )?;
        check_range(
            "CATALOG_SEARCH_MAX_LIMIT",
            self.search_max_limit as u64,
            1,
            10_000,
        )?;
        check_range(
            "CATALOG_SEARCH_DEFAULT_LIMIT",
            self.search_default_limit as u64,
            1,
            self.search_max_limit as u64,
        )?;
        check_range(
            "CATALOG_SEARCH_PER_PARTITION_CAP",
            self.search_per_partition_cap as u64,
            1,
            10_000,
        )?;
        if let Some(capacity) = self.store_write_capacity {
            check_range("CATALOG_WRITE_CAPACITY", capacity as u64, 1, u32::MAX as u64)?;
        }
        if !self.bulk_index_url.starts_with("http://") && !self.bulk_index_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid {
                key: "CATALOG_BULK_INDEX_URL",
                value: self.bulk_index_url.clone(),
                reason: "must be an http(s) URL".to_string(),
            });
        }
        Ok(())
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            visibility_timeout: Duration::from_secs(self.visibility_timeout_secs),
            max_depth: self.queue_max_depth,
            journal_compaction_min_lines: self.journal_compaction_min_lines,
        }
    }

    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            batch_size: self.batch_size,
            batching_window: Duration::from_millis(self.batching_window_ms),
            max_concurrency: self.max_concurrency,
            max_deliveries: self.max_deliveries,
            // Three extensions per timeout keep a slow batch hidden with room to spare
            visibility_extension_interval: Duration::from_secs(self.visibility_timeout_secs)
                .div_f64(3.0),
        }
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            default_limit: self.search_default_limit,
            max_limit: self.search_max_limit,
            per_partition_cap: self.search_per_partition_cap,
            partition_timeout: Duration::from_millis(self.search_partition_timeout_ms),
        }
    }

    pub fn fetcher_settings(&self) -> FetcherSettings {
        FetcherSettings {
            index_url: self.bulk_index_url.clone(),
            ..FetcherSettings::default()
        }
    }

    pub fn import_params(&self) -> ImportParams {
        ImportParams {
            lookback_days: self.lookback_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_match_consumer_parameters() {
        let config = config_from(&[]).unwrap();
        let consumer = config.consumer_settings();

        assert_eq!(consumer.batch_size, 10);
        assert_eq!(consumer.batching_window, Duration::from_secs(10));
        assert_eq!(consumer.max_concurrency, 4);
        assert_eq!(consumer.max_deliveries, 5);
        assert_eq!(config.queue_settings().visibility_timeout, Duration::from_secs(30));
        assert_eq!(config.import_params().lookback_days, 30);
        assert!(config.queue_journal.is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let config = config_from(&[
            ("CATALOG_BIND", "0.0.0.0:9000"),
            ("CATALOG_BATCH_SIZE", "5"),
            ("CATALOG_MAX_CONCURRENCY", "10"),
            ("CATALOG_QUEUE_JOURNAL", "/var/lib/catalog/queue.jsonl"),
            ("CATALOG_WRITE_CAPACITY", "25"),
            ("CATALOG_LOOKBACK_DAYS", "0"),
            ("CATALOG_SEARCH_DEFAULT_LIMIT", " 50 "),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(
            config.queue_journal,
            Some(PathBuf::from("/var/lib/catalog/queue.jsonl"))
        );
        assert_eq!(config.store_write_capacity, Some(25));
        assert_eq!(config.import_params().lookback_days, 0);
        assert_eq!(config.search_settings().default_limit, 50);
    }

    #[test]
    fn test_consumer_limits_are_enforced() {
        assert!(matches!(
            config_from(&[("CATALOG_BATCH_SIZE", "11")]),
            Err(ConfigError::OutOfRange {
                key: "CATALOG_BATCH_SIZE",
                ..
            })
        ));
        assert!(config_from(&[("CATALOG_MAX_CONCURRENCY", "0")]).is_err());
        assert!(config_from(&[("CATALOG_MAX_CONCURRENCY", "11")]).is_err());
        assert!(config_from(&[("CATALOG_BATCHING_WINDOW_MS", "10001")]).is_err());
        assert!(config_from(&[("CATALOG_BATCHING_WINDOW_MS", "0")]).is_ok());
    }

    #[test]
    fn test_timeouts_must_leave_room_to_work() {
        assert!(matches!(
            config_from(&[("CATALOG_SEARCH_PARTITION_TIMEOUT_MS", "0")]),
            Err(ConfigError::OutOfRange {
                key: "CATALOG_SEARCH_PARTITION_TIMEOUT_MS",
                ..
            })
        ));
        assert!(config_from(&[("CATALOG_SEARCH_PARTITION_TIMEOUT_MS", "1")]).is_ok());

        // Visibility timeout must outlast the batching window
        assert!(matches!(
            config_from(&[("CATALOG_VISIBILITY_TIMEOUT_SECS", "10")]),
            Err(ConfigError::Invalid {
                key: "CATALOG_VISIBILITY_TIMEOUT_SECS",
                ..
            })
        ));
        assert!(config_from(&[
            ("CATALOG_VISIBILITY_TIMEOUT_SECS", "2"),
            ("CATALOG_BATCHING_WINDOW_MS", "1500"),
        ])
        .is_ok());
    }

    #[test]
    fn test_unparsable_values_are_reported() {
        let err = config_from(&[("CATALOG_BATCH_SIZE", "ten")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "CATALOG_BATCH_SIZE",
                ..
            }
        ));
        assert!(config_from(&[("CATALOG_BULK_INDEX_URL", "ftp://example.org")]).is_err());
        assert!(config_from(&[("CATALOG_SEARCH_DEFAULT_LIMIT", "500")]).is_err());
    }
}
