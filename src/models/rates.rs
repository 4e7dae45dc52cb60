use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How the served value was obtained, reported alongside every rate payload
/// so clients can tell fresh data from degraded data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    CacheHit,
    CacheWeekend,
    ScrapedAndUpdated,
    FallbackToOldCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotOrigin {
    OfficialSite,
    P2pMarket,
}

impl SnapshotOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotOrigin::OfficialSite => "OFFICIAL_SITE",
            SnapshotOrigin::P2pMarket => "P2P_MARKET",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "BUY",
            TradeDirection::Sell => "SELL",
        }
    }
}

/// One marketplace advert. Lives only for the duration of an averaging call.
#[derive(Debug, Clone)]
pub struct Listing {
    pub price: Decimal,
    pub direction: TradeDirection,
}

/// A point-in-time reading of the rates this service tracks.
#[derive(Debug, Clone, Serialize)]
pub struct RateSnapshot {
    pub usd_official: Option<Decimal>,
    pub eur_official: Option<Decimal>,
    pub usdt_buy: Option<Decimal>,
    pub usdt_sell: Option<Decimal>,
    pub captured_at: DateTime<Utc>,
    pub source: SnapshotOrigin,
}

impl RateSnapshot {
    /// A snapshot with every rate missing must never be cached as fresh or
    /// handed to the persistence gateway.
    pub fn has_any_rate(&self) -> bool {
        self.usd_official.is_some()
            || self.eur_official.is_some()
            || self.usdt_buy.is_some()
            || self.usdt_sell.is_some()
    }
}

/// Durable row shape exchanged with the persistence gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub usd_official: Option<Decimal>,
    pub eur_official: Option<Decimal>,
    pub usdt_buy: Option<Decimal>,
    pub usdt_sell: Option<Decimal>,
    pub last_updated: DateTime<Utc>,
    pub source: String,
}

impl From<RateSnapshot> for RateRecord {
    fn from(snapshot: RateSnapshot) -> Self {
        Self {
            usd_official: snapshot.usd_official,
            eur_official: snapshot.eur_official,
            usdt_buy: snapshot.usdt_buy,
            usdt_sell: snapshot.usdt_sell,
            last_updated: snapshot.captured_at,
            source: snapshot.source.as_str().to_string(),
        }
    }
}
