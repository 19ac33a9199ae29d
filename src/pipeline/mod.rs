//! Launch token tracker pipeline
//!
//! ```text
//! connectors ─▶ timestamp ─▶ aggregator ─▶ { lifecycle, scoring, whale, status }
//!                                  │
//!                                  ▼
//!                     tokens (SQLite) + TokenTable ─▶ snapshot ─▶ tokens_hist
//! ```
//!
//! ## Module Organization
//!
//! - `types` - Token, TokenSnapshot, BalanceChangeEvent and their enums
//! - `error` - `TrackerError` taxonomy
//! - `config` - Environment-driven `TrackerConfig`
//! - `timestamp` - Seconds/milliseconds normalizer
//! - `rate_limit`, `retry` - Per-source throttling and backoff
//! - `connectors` - Source adapters into fixed observation shapes
//! - `aggregator` - Precedence-table merge into the canonical Token
//! - `lifecycle` - Bonding-curve state machine
//! - `scoring` - `rug_score`, `invest_score` and bonuses
//! - `whale` - Balance-change classification and activity flags
//! - `status` - Operational status classifier
//! - `blocklist` - Blacklist trait consulted by the classifier
//! - `db` - SQLite store and schema migrations
//! - `table` - In-memory current Token table
//! - `snapshot` - Append-only history writer
//! - `query` - Read-only query interface
//! - `engine` - Per-address enrichment cycle
//! - `scheduler` - Polling, snapshot and retention tasks

pub mod aggregator;
pub mod blocklist;
pub mod config;
pub mod connectors;
pub mod db;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod query;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod scoring;
pub mod snapshot;
pub mod status;
pub mod table;
pub mod timestamp;
pub mod types;
pub mod whale;

pub use blocklist::BlocklistProvider;
pub use config::TrackerConfig;
pub use db::{SqliteTokenStore, TokenStore};
pub use engine::{CycleOutcome, SourceSet, TrackerEngine};
pub use error::{TrackerError, TrackerResult};
pub use query::{TokenFilter, TokenQuery};
pub use types::{BalanceChangeEvent, BondingCurveStatus, Token, TokenSnapshot, TokenStatus};
