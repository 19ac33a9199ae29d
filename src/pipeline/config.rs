//! Tracker configuration from environment variables
//!
//! Loaded once at startup into an immutable `TrackerConfig`; each component
//! receives a clone of the section it needs.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Parse an environment variable, falling back to `default` when unset or invalid
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Per-source rate limit and retry settings
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLimits {
    pub requests_per_minute: u32,
    /// Minimum spacing between two requests to the same source
    pub min_delay_ms: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl SourceLimits {
    pub const fn new(requests_per_minute: u32, min_delay_ms: u64) -> Self {
        Self {
            requests_per_minute,
            min_delay_ms,
            max_attempts: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }

    /// Read `<PREFIX>_RPM`, `<PREFIX>_MIN_DELAY_MS`, `<PREFIX>_MAX_ATTEMPTS`,
    /// `<PREFIX>_BACKOFF_MS` and `<PREFIX>_MAX_BACKOFF_MS`
    pub fn from_env(prefix: &str, defaults: SourceLimits) -> Self {
        Self {
            requests_per_minute: env_parse(&format!("{}_RPM", prefix), defaults.requests_per_minute),
            min_delay_ms: env_parse(&format!("{}_MIN_DELAY_MS", prefix), defaults.min_delay_ms),
            max_attempts: env_parse(&format!("{}_MAX_ATTEMPTS", prefix), defaults.max_attempts),
            base_backoff_ms: env_parse(&format!("{}_BACKOFF_MS", prefix), defaults.base_backoff_ms),
            max_backoff_ms: env_parse(&format!("{}_MAX_BACKOFF_MS", prefix), defaults.max_backoff_ms),
        }
    }
}

/// Weights of the invest-score sub-scores (expected to sum to 1.0)
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreWeights {
    pub security: f64,
    pub momentum: f64,
    pub liquidity: f64,
    pub holders: f64,
    pub distribution: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            security: 0.30,
            momentum: 0.20,
            liquidity: 0.20,
            holders: 0.15,
            distribution: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    /// Tokens younger than this earn the early bonus
    pub early_age_hours: f64,
    pub early_bonus_max: f64,
    pub social_bonus_max: f64,
    pub holders_bonus_max: f64,
    /// Holder growth (percent) that earns the full holders bonus
    pub holder_growth_full_pct: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            early_age_hours: 24.0,
            early_bonus_max: 10.0,
            social_bonus_max: 5.0,
            holders_bonus_max: 10.0,
            holder_growth_full_pct: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhaleConfig {
    /// Absolute token amount (UI units) above which an event is large
    pub large_token_amount: f64,
    /// Percent of supply above which an event is large
    pub large_supply_pct: f64,
    pub critical_token_amount: f64,
    pub critical_supply_pct: f64,
    /// Window summarised into token activity flags
    pub summary_window: Duration,
}

impl Default for WhaleConfig {
    fn default() -> Self {
        Self {
            large_token_amount: 10_000_000.0,
            large_supply_pct: 1.0,
            critical_token_amount: 50_000_000.0,
            critical_supply_pct: 5.0,
            summary_window: Duration::from_secs(24 * 3600),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusConfig {
    /// No volume and no update for this long marks a token inactive
    pub inactive_after: Duration,
    /// Terminated tokens older than this are archived
    pub archive_after: Duration,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            inactive_after: Duration::from_secs(24 * 3600),
            archive_after: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Configuration for the tracker runtime
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Polling pass interval in milliseconds
    pub poll_interval_ms: u64,

    /// Maximum enrichment cycles in flight across addresses
    pub worker_count: usize,

    /// Per-address cycle timeout in milliseconds
    pub cycle_timeout_ms: u64,

    /// Newly launched tokens fetched per discovery pass
    pub discovery_limit: usize,

    /// Relative change (percent) that raises the significant-change flag
    pub significant_change_pct: f64,

    /// Unreachable across all sources for this long terminates a token
    pub unreachable_after: Duration,

    /// Cadence of scheduled snapshots per token
    pub snapshot_interval: Duration,

    /// History older than this is pruned
    pub snapshot_retention: Duration,

    pub scoring: ScoringConfig,
    pub whale: WhaleConfig,
    pub status: StatusConfig,

    pub pumpfun: SourceLimits,
    pub dexscreener: SourceLimits,
    pub rugcheck: SourceLimits,
    pub jupiter: SourceLimits,
    pub helius: SourceLimits,

    pub helius_api_key: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            db_path: "/var/lib/launchtrack/launchtrack.db".to_string(),
            poll_interval_ms: 30_000,
            worker_count: 8,
            cycle_timeout_ms: 20_000,
            discovery_limit: 50,
            significant_change_pct: 10.0,
            unreachable_after: Duration::from_secs(30 * 24 * 3600),
            snapshot_interval: Duration::from_secs(3600),
            snapshot_retention: Duration::from_secs(30 * 24 * 3600),
            scoring: ScoringConfig::default(),
            whale: WhaleConfig::default(),
            status: StatusConfig::default(),
            pumpfun: SourceLimits::new(60, 250),
            dexscreener: SourceLimits::new(300, 200),
            rugcheck: SourceLimits::new(60, 1_000),
            jupiter: SourceLimits::new(60, 500),
            helius: SourceLimits::new(120, 100),
            helius_api_key: None,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables (defaults in parentheses):
    /// - `LAUNCHTRACK_DB_PATH` (/var/lib/launchtrack/launchtrack.db)
    /// - `POLL_INTERVAL_MS` (30000), `WORKER_COUNT` (8), `CYCLE_TIMEOUT_MS` (20000)
    /// - `DISCOVERY_LIMIT` (50)
    /// - `SIGNIFICANT_CHANGE_PCT` (10)
    /// - `UNREACHABLE_AFTER_DAYS` (30)
    /// - `SNAPSHOT_INTERVAL_SECS` (3600), `SNAPSHOT_RETENTION_DAYS` (30)
    /// - `EARLY_BONUS_AGE_HOURS` (24)
    /// - `INACTIVE_AFTER_HOURS` (24), `ARCHIVE_AFTER_DAYS` (7)
    /// - `WHALE_LARGE_AMOUNT`, `WHALE_LARGE_SUPPLY_PCT`,
    ///   `WHALE_CRITICAL_AMOUNT`, `WHALE_CRITICAL_SUPPLY_PCT`
    /// - `PUMPFUN_*`, `DEXSCREENER_*`, `RUGCHECK_*`, `JUPITER_*`, `HELIUS_*`
    ///   rate limits (see `SourceLimits::from_env`)
    /// - `HELIUS_API_KEY` (unset disables the balance feed)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let scoring = ScoringConfig {
            early_age_hours: env_parse("EARLY_BONUS_AGE_HOURS", defaults.scoring.early_age_hours),
            ..defaults.scoring.clone()
        };

        let whale = WhaleConfig {
            large_token_amount: env_parse("WHALE_LARGE_AMOUNT", defaults.whale.large_token_amount),
            large_supply_pct: env_parse("WHALE_LARGE_SUPPLY_PCT", defaults.whale.large_supply_pct),
            critical_token_amount: env_parse(
                "WHALE_CRITICAL_AMOUNT",
                defaults.whale.critical_token_amount,
            ),
            critical_supply_pct: env_parse(
                "WHALE_CRITICAL_SUPPLY_PCT",
                defaults.whale.critical_supply_pct,
            ),
            ..defaults.whale.clone()
        };

        let status = StatusConfig {
            inactive_after: Duration::from_secs(env_parse("INACTIVE_AFTER_HOURS", 24u64) * 3600),
            archive_after: Duration::from_secs(env_parse("ARCHIVE_AFTER_DAYS", 7u64) * 24 * 3600),
        };

        Self {
            db_path: env::var("LAUNCHTRACK_DB_PATH").unwrap_or(defaults.db_path),
            poll_interval_ms: env_parse("POLL_INTERVAL_MS", defaults.poll_interval_ms),
            worker_count: env_parse("WORKER_COUNT", defaults.worker_count).max(1),
            cycle_timeout_ms: env_parse("CYCLE_TIMEOUT_MS", defaults.cycle_timeout_ms),
            discovery_limit: env_parse("DISCOVERY_LIMIT", defaults.discovery_limit),
            significant_change_pct: env_parse("SIGNIFICANT_CHANGE_PCT", defaults.significant_change_pct),
            unreachable_after: Duration::from_secs(env_parse("UNREACHABLE_AFTER_DAYS", 30u64) * 24 * 3600),
            snapshot_interval: Duration::from_secs(env_parse("SNAPSHOT_INTERVAL_SECS", 3600u64)),
            snapshot_retention: Duration::from_secs(env_parse("SNAPSHOT_RETENTION_DAYS", 30u64) * 24 * 3600),
            scoring,
            whale,
            status,
            pumpfun: SourceLimits::from_env("PUMPFUN", defaults.pumpfun),
            dexscreener: SourceLimits::from_env("DEXSCREENER", defaults.dexscreener),
            rugcheck: SourceLimits::from_env("RUGCHECK", defaults.rugcheck),
            jupiter: SourceLimits::from_env("JUPITER", defaults.jupiter),
            helius: SourceLimits::from_env("HELIUS", defaults.helius),
            helius_api_key: env::var("HELIUS_API_KEY").ok().filter(|k| !k.is_empty()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();

        assert_eq!(config.significant_change_pct, 10.0);
        assert_eq!(config.unreachable_after, Duration::from_secs(30 * 24 * 3600));
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.scoring.early_age_hours, 24.0);
        let weights = &config.scoring.weights;
        let sum = weights.security + weights.momentum + weights.liquidity + weights.holders + weights.distribution;
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(config.whale.critical_token_amount > config.whale.large_token_amount);
        assert!(config.whale.critical_supply_pct > config.whale.large_supply_pct);
    }

    #[test]
    fn test_source_limits_from_env() {
        // Prefix unique to this test so parallel tests don't interfere
        env::set_var("TESTSRC_RPM", "30");
        env::set_var("TESTSRC_MIN_DELAY_MS", "1500");
        env::set_var("TESTSRC_MAX_ATTEMPTS", "not-a-number");

        let limits = SourceLimits::from_env("TESTSRC", SourceLimits::new(60, 100));

        assert_eq!(limits.requests_per_minute, 30);
        assert_eq!(limits.min_delay_ms, 1_500);
        assert_eq!(limits.max_attempts, 3); // invalid value falls back
        assert_eq!(limits.base_backoff_ms, 500);

        env::remove_var("TESTSRC_RPM");
        env::remove_var("TESTSRC_MIN_DELAY_MS");
        env::remove_var("TESTSRC_MAX_ATTEMPTS");
    }

    #[test]
    fn test_custom_config() {
        env::set_var("LAUNCHTRACK_DB_PATH", "/tmp/launchtrack-test.db");
        env::set_var("SIGNIFICANT_CHANGE_PCT", "25");
        env::set_var("WORKER_COUNT", "0");

        let config = TrackerConfig::from_env();

        assert_eq!(config.db_path, "/tmp/launchtrack-test.db");
        assert_eq!(config.significant_change_pct, 25.0);
        assert_eq!(config.worker_count, 1); // clamped to at least one worker

        env::remove_var("LAUNCHTRACK_DB_PATH");
        env::remove_var("SIGNIFICANT_CHANGE_PCT");
        env::remove_var("WORKER_COUNT");
    }
}
