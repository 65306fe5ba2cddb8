use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::{ensure_after, SnapshotStore};
use crate::error::StoreError;
use crate::models::{OiSnapshot, Symbol, SymbolKind};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stocks (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol  TEXT NOT NULL UNIQUE,
        kind    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS oi_data (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        stock_id            INTEGER NOT NULL REFERENCES stocks(id),
        date                TEXT NOT NULL,
        timestamp           TEXT NOT NULL,
        ltp                 REAL NOT NULL,
        change_in_ltp       REAL NOT NULL,
        volume              INTEGER NOT NULL,
        future_oi           INTEGER NOT NULL,
        change_in_future_oi INTEGER NOT NULL,
        call_oi             INTEGER NOT NULL,
        change_in_call_oi   INTEGER NOT NULL,
        put_oi              INTEGER NOT NULL,
        change_in_put_oi    INTEGER NOT NULL,
        pcr                 REAL,
        max_pain            REAL,
        oi_interpretation   TEXT NOT NULL,
        buy_sell_signal     TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_oi_data_stock ON oi_data(stock_id, id)",
];

const SNAPSHOT_COLUMNS: &str = "s.symbol, d.date, d.timestamp, d.ltp, d.change_in_ltp, d.volume, \
     d.future_oi, d.change_in_future_oi, d.call_oi, d.change_in_call_oi, d.put_oi, d.change_in_put_oi, \
     d.pcr, d.max_pain, d.oi_interpretation, d.buy_sell_signal";

/// SQLite-backed store with the `stocks` / `oi_data` tables
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and ensure the schema exists
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its single connection
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;

        info!(url, "SQLite store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn latest_in<'e, E>(executor: E, symbol: &Symbol) -> Result<Option<OiSnapshot>, StoreError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let sql = format!(
            "SELECT {} FROM oi_data d JOIN stocks s ON s.id = d.stock_id \
             WHERE d.stock_id = ? ORDER BY d.id DESC LIMIT 1",
            SNAPSHOT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(symbol.id)
            .fetch_optional(executor)
            .await?;

        row.map(|r| snapshot_from_row(&r)).transpose()
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn get_symbol(&self, name: &str) -> Result<Option<Symbol>, StoreError> {
        let row = sqlx::query("SELECT id, symbol, kind FROM stocks WHERE symbol = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| symbol_from_row(&r)).transpose()
    }

    async fn create_symbol(&self, name: &str, kind: SymbolKind) -> Result<Symbol, StoreError> {
        let id = sqlx::query_scalar::<_, i64>("INSERT INTO stocks(symbol, kind) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_unique_violation() => StoreError::DuplicateSymbol(name.to_string()),
                _ => StoreError::Database(e),
            })?;

        Ok(Symbol { id, name: name.to_string(), kind })
    }

    async fn latest_snapshot(&self, symbol: &Symbol) -> Result<Option<OiSnapshot>, StoreError> {
        Self::latest_in(&self.pool, symbol).await
    }

    async fn save_snapshot(&self, symbol: &Symbol, snapshot: &OiSnapshot) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let latest = Self::latest_in(&mut *tx, symbol).await?;
        ensure_after(latest.as_ref(), snapshot)?;

        sqlx::query(
            r#"
                INSERT INTO oi_data (
                    stock_id, date, timestamp, ltp, change_in_ltp, volume,
                    future_oi, change_in_future_oi, call_oi, change_in_call_oi,
                    put_oi, change_in_put_oi, pcr, max_pain, oi_interpretation, buy_sell_signal
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(symbol.id)
        .bind(snapshot.date.format(DATE_FORMAT).to_string())
        .bind(snapshot.time.format(TIME_FORMAT).to_string())
        .bind(snapshot.ltp)
        .bind(snapshot.change_in_ltp)
        .bind(snapshot.volume as i64)
        .bind(snapshot.future_oi as i64)
        .bind(snapshot.change_in_future_oi)
        .bind(snapshot.call_oi as i64)
        .bind(snapshot.change_in_call_oi)
        .bind(snapshot.put_oi as i64)
        .bind(snapshot.change_in_put_oi)
        .bind(snapshot.pcr)
        .bind(snapshot.max_pain)
        .bind(snapshot.interpretation.as_str())
        .bind(snapshot.signal.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_foreign_key_violation() => StoreError::UnknownSymbol(symbol.name.clone()),
            _ => StoreError::Database(e),
        })?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        let rows = sqlx::query("SELECT id, symbol, kind FROM stocks ORDER BY symbol")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(symbol_from_row).collect()
    }

    async fn recent_snapshots(&self, symbol: &Symbol, limit: usize) -> Result<Vec<OiSnapshot>, StoreError> {
        let sql = format!(
            "SELECT {} FROM oi_data d JOIN stocks s ON s.id = d.stock_id \
             WHERE d.stock_id = ? ORDER BY d.id DESC LIMIT ?",
            SNAPSHOT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(symbol.id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(snapshot_from_row).collect()
    }
}

// -----------------------------------------------
// ROW MAPPING
// -----------------------------------------------

fn symbol_from_row(row: &SqliteRow) -> Result<Symbol, StoreError> {
    let kind: String = row.try_get("kind")?;
    Ok(Symbol {
        id: row.try_get("id")?,
        name: row.try_get("symbol")?,
        kind: kind.parse().map_err(StoreError::Corrupt)?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> Result<OiSnapshot, StoreError> {
    let date: String = row.try_get("date")?;
    let time: String = row.try_get("timestamp")?;
    let interpretation: String = row.try_get("oi_interpretation")?;
    let signal: String = row.try_get("buy_sell_signal")?;

    Ok(OiSnapshot {
        symbol: row.try_get("symbol")?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|e| StoreError::Corrupt(format!("date '{}': {}", date, e)))?,
        time: NaiveTime::parse_from_str(&time, TIME_FORMAT)
            .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", time, e)))?,
        ltp: row.try_get("ltp")?,
        change_in_ltp: row.try_get("change_in_ltp")?,
        volume: count_column(row, "volume")?,
        future_oi: count_column(row, "future_oi")?,
        change_in_future_oi: row.try_get("change_in_future_oi")?,
        call_oi: count_column(row, "call_oi")?,
        change_in_call_oi: row.try_get("change_in_call_oi")?,
        put_oi: count_column(row, "put_oi")?,
        change_in_put_oi: row.try_get("change_in_put_oi")?,
        pcr: row.try_get("pcr")?,
        max_pain: row.try_get("max_pain")?,
        interpretation: interpretation.parse().map_err(StoreError::Corrupt)?,
        signal: signal.parse().map_err(StoreError::Corrupt)?,
    })
}

fn count_column(row: &SqliteRow, column: &str) -> Result<u64, StoreError> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {}: {}", column, value)))
}
