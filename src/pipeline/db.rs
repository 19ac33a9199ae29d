//! SQLite persistence for tokens, history, balance events and the blacklist
//!
//! Tables (see `/sql/` directory):
//! - `tokens` - UPSERT on address (current state)
//! - `tokens_hist` - INSERT OR IGNORE on (address, snapshot_timestamp)
//! - `balance_change_events` - INSERT OR IGNORE on signature
//! - `token_blacklist` - UPSERT on address
//!
//! Two connections are held: a writer and a reader. With WAL enabled the
//! reader never blocks on the writer and only sees committed rows.

use super::blocklist::{BlacklistEntry, BlocklistProvider};
use super::error::{TrackerError, TrackerResult};
use super::query::EventFilter;
use super::types::{
    BalanceChangeEvent, BalanceEventKind, BondingCurveStatus, Severity, SnapshotReason, Token,
    TokenSnapshot, TokenStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, Row};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard};

/// Embedded schema, executed in order on every start
const MIGRATIONS: &[(&str, &str)] = &[
    ("01_tokens.sql", include_str!("../../sql/01_tokens.sql")),
    ("02_tokens_hist.sql", include_str!("../../sql/02_tokens_hist.sql")),
    ("03_balance_change_events.sql", include_str!("../../sql/03_balance_change_events.sql")),
    ("04_token_blacklist.sql", include_str!("../../sql/04_token_blacklist.sql")),
];

/// Persistence operations the pipeline needs
#[async_trait]
pub trait TokenStore: BlocklistProvider {
    /// UPSERT the current state of one token
    async fn upsert_token(&self, token: &Token) -> TrackerResult<()>;

    /// Every stored token, used to warm the in-memory table at startup
    async fn load_tokens(&self) -> TrackerResult<Vec<Token>>;

    /// Append a snapshot. Returns false when a row with the same
    /// (address, snapshot_timestamp) already exists.
    async fn insert_snapshot(&self, snapshot: &TokenSnapshot) -> TrackerResult<bool>;

    /// Snapshots of `address` with `from <= snapshot_timestamp <= to`, oldest first
    async fn snapshot_history(
        &self,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TrackerResult<Vec<TokenSnapshot>>;

    /// Delete snapshots older than `before`; returns rows removed
    async fn prune_snapshots(&self, before: DateTime<Utc>) -> TrackerResult<usize>;

    /// Store one event; `Err(DuplicateEvent)` if its signature is known
    async fn insert_balance_event(&self, event: &BalanceChangeEvent) -> TrackerResult<()>;

    /// Events matching `filter`, newest first
    async fn balance_events(&self, filter: &EventFilter) -> TrackerResult<Vec<BalanceChangeEvent>>;
}

/// Apply the embedded schema and enable WAL
///
/// All statements use IF NOT EXISTS, so this is safe on every start.
pub fn run_schema_migrations(conn: &mut Connection) -> TrackerResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    log::info!("📊 Enabled WAL mode for SQLite database");

    log::info!("🔧 Running {} schema migrations", MIGRATIONS.len());
    let tx = conn.transaction()?;
    for (filename, sql) in MIGRATIONS {
        log::debug!("   ├─ Executing: {}", filename);
        tx.execute_batch(sql)?;
    }
    tx.commit()?;
    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}

macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                <$ty>::parse(text).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} value '{}'", stringify!($ty), text).into())
                })
            }
        }
    };
}

text_enum_sql!(BondingCurveStatus);
text_enum_sql!(TokenStatus);
text_enum_sql!(SnapshotReason);
text_enum_sql!(BalanceEventKind);
text_enum_sql!(Severity);

fn unix_secs(instant: Option<DateTime<Utc>>) -> Option<i64> {
    instant.map(|t| t.timestamp())
}

fn from_unix_secs(secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| rusqlite::Error::IntegralValueOutOfRange(0, secs))
}

fn ts_col(row: &Row, name: &str) -> rusqlite::Result<DateTime<Utc>> {
    from_unix_secs(row.get(name)?)
}

fn opt_ts_col(row: &Row, name: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<i64>>(name)?.map(from_unix_secs).transpose()
}

fn json_col<T: DeserializeOwned>(row: &Row, name: &str) -> rusqlite::Result<T> {
    let text: String = row.get(name)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Column list shared by `tokens` and `tokens_hist`
const TOKEN_COLUMNS: &str = "address, symbol, name, decimals, total_supply, \
     price_usd, market_cap_usd, liquidity_usd, volume_24h_usd, price_change_json, \
     holder_count, holder_distribution_json, holder_growth_pct, \
     risk_json, has_social_links, whale_flags_json, \
     rug_score, invest_score, early_bonus, social_bonus, holders_bonus, \
     bonding_curve_status, raydium_pool_address, is_tradeable, status, \
     source_created_at, first_discovered_at, updated_at, last_activity_at, dex_first_seen_at";

const TOKEN_PLACEHOLDERS: &str =
    "?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
     ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30";

/// Bind values for `TOKEN_COLUMNS`, JSON columns pre-serialized
struct TokenRow<'a> {
    token: &'a Token,
    price_change: String,
    distribution: String,
    risk: String,
    whale_flags: String,
}

impl<'a> TokenRow<'a> {
    fn new(token: &'a Token) -> TrackerResult<Self> {
        Ok(Self {
            token,
            price_change: serde_json::to_string(&token.price_change)?,
            distribution: serde_json::to_string(&token.holder_distribution)?,
            risk: serde_json::to_string(&token.risk)?,
            whale_flags: serde_json::to_string(&token.whale_flags)?,
        })
    }

    fn values(&self) -> Vec<Box<dyn ToSql + '_>> {
        let t = self.token;
        vec![
            Box::new(&t.address),
            Box::new(&t.symbol),
            Box::new(&t.name),
            Box::new(t.decimals),
            Box::new(t.total_supply),
            Box::new(t.price_usd),
            Box::new(t.market_cap_usd),
            Box::new(t.liquidity_usd),
            Box::new(t.volume_24h_usd),
            Box::new(&self.price_change),
            Box::new(t.holder_count.map(|c| c.min(i64::MAX as u64) as i64)),
            Box::new(&self.distribution),
            Box::new(t.holder_growth_pct),
            Box::new(&self.risk),
            Box::new(t.has_social_links),
            Box::new(&self.whale_flags),
            Box::new(t.rug_score),
            Box::new(t.invest_score),
            Box::new(t.early_bonus),
            Box::new(t.social_bonus),
            Box::new(t.holders_bonus),
            Box::new(t.bonding_curve_status),
            Box::new(&t.raydium_pool_address),
            Box::new(t.is_tradeable),
            Box::new(t.status),
            Box::new(unix_secs(t.source_created_at)),
            Box::new(t.first_discovered_at.timestamp()),
            Box::new(t.updated_at.timestamp()),
            Box::new(unix_secs(t.last_activity_at)),
            Box::new(unix_secs(t.dex_first_seen_at)),
        ]
    }
}

fn token_from_row(row: &Row) -> rusqlite::Result<Token> {
    Ok(Token {
        address: row.get("address")?,
        symbol: row.get("symbol")?,
        name: row.get("name")?,
        decimals: row.get("decimals")?,
        total_supply: row.get("total_supply")?,
        price_usd: row.get("price_usd")?,
        market_cap_usd: row.get("market_cap_usd")?,
        liquidity_usd: row.get("liquidity_usd")?,
        volume_24h_usd: row.get("volume_24h_usd")?,
        price_change: json_col(row, "price_change_json")?,
        holder_count: row
            .get::<_, Option<i64>>("holder_count")?
            .map(|c| c.max(0) as u64),
        holder_distribution: json_col(row, "holder_distribution_json")?,
        holder_growth_pct: row.get("holder_growth_pct")?,
        risk: json_col(row, "risk_json")?,
        has_social_links: row.get("has_social_links")?,
        whale_flags: json_col(row, "whale_flags_json")?,
        rug_score: row.get("rug_score")?,
        invest_score: row.get("invest_score")?,
        early_bonus: row.get("early_bonus")?,
        social_bonus: row.get("social_bonus")?,
        holders_bonus: row.get("holders_bonus")?,
        bonding_curve_status: row.get("bonding_curve_status")?,
        raydium_pool_address: row.get("raydium_pool_address")?,
        is_tradeable: row.get("is_tradeable")?,
        status: row.get("status")?,
        source_created_at: opt_ts_col(row, "source_created_at")?,
        first_discovered_at: ts_col(row, "first_discovered_at")?,
        updated_at: ts_col(row, "updated_at")?,
        last_activity_at: opt_ts_col(row, "last_activity_at")?,
        dex_first_seen_at: opt_ts_col(row, "dex_first_seen_at")?,
    })
}

fn snapshot_from_row(row: &Row) -> rusqlite::Result<TokenSnapshot> {
    let millis: i64 = row.get("snapshot_timestamp")?;
    Ok(TokenSnapshot {
        token: token_from_row(row)?,
        snapshot_timestamp: Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(0, millis))?,
        snapshot_reason: row.get("snapshot_reason")?,
    })
}

fn event_from_row(row: &Row) -> rusqlite::Result<BalanceChangeEvent> {
    Ok(BalanceChangeEvent {
        signature: row.get("signature")?,
        wallet: row.get("wallet")?,
        token_mint: row.get("token_mint")?,
        token_amount: row.get("token_amount")?,
        sol_amount: row.get("sol_amount")?,
        block_time: ts_col(row, "block_time")?,
        kind: row.get("kind")?,
        is_large_token_amount: row.get("is_large_token_amount")?,
        severity: row.get("severity")?,
    })
}

fn blacklist_from_row(row: &Row) -> rusqlite::Result<BlacklistEntry> {
    Ok(BlacklistEntry {
        address: row.get("address")?,
        reason: row.get("reason")?,
        created_at: ts_col(row, "created_at")?,
        expires_at: opt_ts_col(row, "expires_at")?,
    })
}

/// SQLite implementation of `TokenStore`
pub struct SqliteTokenStore {
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
}

impl SqliteTokenStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn open(db_path: &str) -> TrackerResult<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TrackerError::Config(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let mut writer = Connection::open(db_path)?;
        writer.busy_timeout(std::time::Duration::from_secs(5))?;
        run_schema_migrations(&mut writer)?;

        let reader = Connection::open(db_path)?;
        reader.busy_timeout(std::time::Duration::from_secs(5))?;
        reader.pragma_update(None, "query_only", true)?;

        log::info!("🗄️  Opened token store at {}", db_path);

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(Mutex::new(reader)),
        })
    }

    fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reader(&self) -> MutexGuard<'_, Connection> {
        self.reader.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BlocklistProvider for SqliteTokenStore {
    async fn is_blocked(&self, address: &str, now: DateTime<Utc>) -> TrackerResult<bool> {
        let conn = self.reader();
        let mut stmt = conn.prepare_cached(
            "SELECT address FROM token_blacklist
             WHERE address = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
        )?;
        Ok(stmt.exists(params![address, now.timestamp()])?)
    }

    async fn block(&self, entry: BlacklistEntry) -> TrackerResult<()> {
        let conn = self.writer();
        conn.execute(
            "INSERT INTO token_blacklist (address, reason, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(address) DO UPDATE SET
                reason = excluded.reason,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
            params![
                entry.address,
                entry.reason,
                entry.created_at.timestamp(),
                unix_secs(entry.expires_at)
            ],
        )?;
        log::info!("🚫 Blacklisted {} ({})", entry.address, entry.reason);
        Ok(())
    }

    async fn unblock(&self, address: &str) -> TrackerResult<bool> {
        let conn = self.writer();
        let removed = conn.execute("DELETE FROM token_blacklist WHERE address = ?1", [address])?;
        Ok(removed > 0)
    }

    async fn active_entries(&self, now: DateTime<Utc>) -> TrackerResult<Vec<BlacklistEntry>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT address, reason, created_at, expires_at FROM token_blacklist
             WHERE expires_at IS NULL OR expires_at > ?1
             ORDER BY created_at DESC",
        )?;
        let entries = stmt
            .query_map([now.timestamp()], blacklist_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn upsert_token(&self, token: &Token) -> TrackerResult<()> {
        let bound = TokenRow::new(token)?;
        let values = bound.values();

        let updates = TOKEN_COLUMNS
            .split(',')
            .map(str::trim)
            .filter(|c| *c != "address" && *c != "first_discovered_at")
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "INSERT INTO tokens ({TOKEN_COLUMNS}) VALUES ({TOKEN_PLACEHOLDERS})
             ON CONFLICT(address) DO UPDATE SET {updates}"
        );

        let conn = self.writer();
        let mut stmt = conn.prepare_cached(&sql)?;
        stmt.execute(rusqlite::params_from_iter(values.iter()))?;
        Ok(())
    }

    async fn load_tokens(&self) -> TrackerResult<Vec<Token>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(&format!("SELECT {TOKEN_COLUMNS} FROM tokens"))?;
        let tokens = stmt
            .query_map([], token_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tokens)
    }

    async fn insert_snapshot(&self, snapshot: &TokenSnapshot) -> TrackerResult<bool> {
        let bound = TokenRow::new(&snapshot.token)?;
        let mut values = bound.values();
        values.push(Box::new(snapshot.snapshot_timestamp.timestamp_millis()));
        values.push(Box::new(snapshot.snapshot_reason));

        let sql = format!(
            "INSERT OR IGNORE INTO tokens_hist ({TOKEN_COLUMNS}, snapshot_timestamp, snapshot_reason)
             VALUES ({TOKEN_PLACEHOLDERS}, ?31, ?32)"
        );

        let conn = self.writer();
        let mut stmt = conn.prepare_cached(&sql)?;
        let inserted = stmt.execute(rusqlite::params_from_iter(values.iter()))?;
        Ok(inserted > 0)
    }

    async fn snapshot_history(
        &self,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TrackerResult<Vec<TokenSnapshot>> {
        let conn = self.reader();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {TOKEN_COLUMNS}, snapshot_timestamp, snapshot_reason FROM tokens_hist
             WHERE address = ?1 AND snapshot_timestamp BETWEEN ?2 AND ?3
             ORDER BY snapshot_timestamp ASC"
        ))?;
        let rows = stmt
            .query_map(
                params![address, from.timestamp_millis(), to.timestamp_millis()],
                snapshot_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn prune_snapshots(&self, before: DateTime<Utc>) -> TrackerResult<usize> {
        let conn = self.writer();
        let removed = conn.execute(
            "DELETE FROM tokens_hist WHERE snapshot_timestamp < ?1",
            [before.timestamp_millis()],
        )?;
        Ok(removed)
    }

    async fn insert_balance_event(&self, event: &BalanceChangeEvent) -> TrackerResult<()> {
        let conn = self.writer();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO balance_change_events (
                signature, wallet, token_mint, token_amount, sol_amount,
                block_time, kind, is_large_token_amount, severity
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.signature,
                event.wallet,
                event.token_mint,
                event.token_amount,
                event.sol_amount,
                event.block_time.timestamp(),
                event.kind,
                event.is_large_token_amount,
                event.severity,
            ],
        )?;

        if inserted == 0 {
            return Err(TrackerError::DuplicateEvent(event.signature.clone()));
        }
        Ok(())
    }

    async fn balance_events(&self, filter: &EventFilter) -> TrackerResult<Vec<BalanceChangeEvent>> {
        let mut sql = String::from(
            "SELECT signature, wallet, token_mint, token_amount, sol_amount,
                    block_time, kind, is_large_token_amount, severity
             FROM balance_change_events WHERE 1 = 1",
        );
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(mint) = &filter.token_mint {
            values.push(Box::new(mint.clone()));
            sql.push_str(&format!(" AND token_mint = ?{}", values.len()));
        }
        if filter.large_only {
            sql.push_str(" AND is_large_token_amount = 1");
        }
        if let Some(since) = filter.since {
            values.push(Box::new(since.timestamp()));
            sql.push_str(&format!(" AND block_time >= ?{}", values.len()));
        }
        if let Some(until) = filter.until {
            values.push(Box::new(until.timestamp()));
            sql.push_str(&format!(" AND block_time <= ?{}", values.len()));
        }
        sql.push_str(" ORDER BY block_time DESC, signature ASC");
        if let Some(limit) = filter.limit {
            values.push(Box::new(limit.min(i64::MAX as usize) as i64));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        let conn = self.reader();
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }
}
