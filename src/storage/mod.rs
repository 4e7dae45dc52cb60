use async_trait::async_trait;
use log::info;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{PgPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::models::RateRecord;

/// Durable side of the pipeline: keep the latest snapshot, answer
/// "most recent" queries. Rows are append-only; "latest" is the newest
/// `last_updated`. Implementations must reject all-null records.
#[async_trait]
pub trait RateStore: Send + Sync {
    async fn upsert_latest(&self, record: &RateRecord) -> Result<()>;
    async fn read_latest(&self) -> Result<Option<RateRecord>>;
}

/// Pick the backend once at startup: Postgres when a connection URL is
/// configured, a local SQLite file otherwise. Nothing downstream branches
/// on which one is active.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn RateStore>> {
    match &config.url {
        Some(url) => {
            info!("using Postgres rate store");
            Ok(Arc::new(
                PostgresStore::connect(url, config.max_connections).await?,
            ))
        }
        None => {
            info!(
                "no database URL configured, using SQLite store at {}",
                config.sqlite_path
            );
            Ok(Arc::new(SqliteStore::connect(&config.sqlite_path).await?))
        }
    }
}

fn ensure_storable(record: &RateRecord) -> Result<()> {
    let empty = record.usd_official.is_none()
        && record.eur_official.is_none()
        && record.usdt_buy.is_none()
        && record.usdt_sell.is_none();
    if empty {
        return Err(Error::Persistence(
            "refusing to store a snapshot with no rates".to_string(),
        ));
    }
    Ok(())
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rates (
                id BIGSERIAL PRIMARY KEY,
                usd_official NUMERIC,
                eur_official NUMERIC,
                usdt_buy NUMERIC,
                usdt_sell NUMERIC,
                last_updated TIMESTAMPTZ NOT NULL,
                source TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RateStore for PostgresStore {
    async fn upsert_latest(&self, record: &RateRecord) -> Result<()> {
        ensure_storable(record)?;
        sqlx::query(
            "INSERT INTO rates
                (usd_official, eur_official, usdt_buy, usdt_sell, last_updated, source)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.usd_official)
        .bind(record.eur_official)
        .bind(record.usdt_buy)
        .bind(record.usdt_sell)
        .bind(record.last_updated)
        .bind(&record.source)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_latest(&self) -> Result<Option<RateRecord>> {
        let row = sqlx::query(
            "SELECT usd_official, eur_official, usdt_buy, usdt_sell, last_updated, source
             FROM rates ORDER BY last_updated DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(RateRecord {
                usd_official: row.try_get("usd_official")?,
                eur_official: row.try_get("eur_official")?,
                usdt_buy: row.try_get("usdt_buy")?,
                usdt_sell: row.try_get("usdt_sell")?,
                last_updated: row.try_get("last_updated")?,
                source: row.try_get("source")?,
            })),
            None => Ok(None),
        }
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::init(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init(&pool).await?;
        Ok(Self { pool })
    }

    async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                usd_official TEXT,
                eur_official TEXT,
                usdt_buy TEXT,
                usdt_sell TEXT,
                last_updated TEXT NOT NULL,
                source TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

// SQLite has no native decimal type, so rates round-trip through text.
fn decimal_to_text(value: Option<Decimal>) -> Option<String> {
    value.map(|v| v.to_string())
}

fn text_to_decimal(value: Option<String>) -> Result<Option<Decimal>> {
    match value {
        Some(text) => Decimal::from_str(&text)
            .map(Some)
            .map_err(|e| Error::Persistence(format!("corrupt rate value {:?}: {}", text, e))),
        None => Ok(None),
    }
}

#[async_trait]
impl RateStore for SqliteStore {
    async fn upsert_latest(&self, record: &RateRecord) -> Result<()> {
        ensure_storable(record)?;
        sqlx::query(
            "INSERT INTO rates
                (usd_official, eur_official, usdt_buy, usdt_sell, last_updated, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(decimal_to_text(record.usd_official))
        .bind(decimal_to_text(record.eur_official))
        .bind(decimal_to_text(record.usdt_buy))
        .bind(decimal_to_text(record.usdt_sell))
        .bind(record.last_updated)
        .bind(&record.source)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_latest(&self) -> Result<Option<RateRecord>> {
        let row = sqlx::query(
            "SELECT usd_official, eur_official, usdt_buy, usdt_sell, last_updated, source
             FROM rates ORDER BY last_updated DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(RateRecord {
                usd_official: text_to_decimal(row.try_get("usd_official")?)?,
                eur_official: text_to_decimal(row.try_get("eur_official")?)?,
                usdt_buy: text_to_decimal(row.try_get("usdt_buy")?)?,
                usdt_sell: text_to_decimal(row.try_get("usdt_sell")?)?,
                last_updated: row.try_get("last_updated")?,
                source: row.try_get("source")?,
            })),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn record(at_hour: u32) -> RateRecord {
        RateRecord {
            usd_official: Some(dec!(36.50)),
            eur_official: Some(dec!(39.87)),
            usdt_buy: Some(dec!(41.10)),
            usdt_sell: None,
            last_updated: Utc.with_ymd_and_hms(2024, 1, 3, at_hour, 0, 0).unwrap(),
            source: "OFFICIAL_SITE".to_string(),
        }
    }

    #[tokio::test]
    async fn sqlite_round_trip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let expected = record(12);

        store.upsert_latest(&expected).await.unwrap();
        let read = store.read_latest().await.unwrap().unwrap();

        assert_eq!(read, expected);
    }

    #[tokio::test]
    async fn read_latest_on_empty_store_is_none() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.read_latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn latest_means_newest_timestamp() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_latest(&record(15)).await.unwrap();
        store.upsert_latest(&record(9)).await.unwrap();

        let read = store.read_latest().await.unwrap().unwrap();
        assert_eq!(read.last_updated, record(15).last_updated);
    }

    #[tokio::test]
    async fn all_null_record_is_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        let empty = RateRecord {
            usd_official: None,
            eur_official: None,
            usdt_buy: None,
            usdt_sell: None,
            last_updated: Utc::now(),
            source: "OFFICIAL_SITE".to_string(),
        };

        let result = store.upsert_latest(&empty).await;
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(store.read_latest().await.unwrap(), None);
    }
}
