use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc, Weekday};
use log::{error, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::models::{CacheStatus, RateRecord, RateSnapshot, SnapshotOrigin};
use crate::scraper::{ExtractedRates, RateProvider};
use crate::storage::RateStore;

/// Wall-clock seam so tests can pin the day of week and hour.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    usd: Option<Decimal>,
    eur: Option<Decimal>,
    last_updated: Option<DateTime<Utc>>,
}

impl CacheState {
    fn has_value(&self) -> bool {
        self.usd.is_some() || self.eur.is_some()
    }
}

/// Payload served for every rate read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateQuote {
    pub usd: Option<Decimal>,
    pub eur: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    pub status: CacheStatus,
}

/// In-memory store of the last known good official rates, refreshed lazily
/// on read and proactively by the scheduler. One instance per process;
/// constructed and injected explicitly so tests can build isolated caches.
pub struct RateCache {
    state: Mutex<CacheState>,
    provider: Arc<dyn RateProvider>,
    store: Arc<dyn RateStore>,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    quiet_days: Vec<Weekday>,
    forced_hours: Vec<u32>,
    offset: FixedOffset,
}

impl RateCache {
    pub fn new(
        config: CacheConfig,
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn RateStore>,
    ) -> Self {
        Self::with_clock(config, provider, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: CacheConfig,
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn RateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
        Self {
            state: Mutex::new(CacheState::default()),
            provider,
            store,
            clock,
            freshness: Duration::hours(config.freshness_hours),
            quiet_days: config.quiet_weekdays(),
            forced_hours: config.forced_hours,
            offset,
        }
    }

    /// Serve the cached rates or refresh them, per the freshness protocol.
    /// `force` bypasses every freshness check and always scrapes.
    ///
    /// Request handlers and scheduler jobs all funnel through one lock held
    /// across the refresh, so overlapping triggers serialize: the first
    /// caller fetches, the rest re-evaluate under the lock and serve the
    /// winner's values instead of fetching again.
    pub async fn get_rates(&self, force: bool) -> Result<RateQuote> {
        let mut state = self.state.lock().await;

        let now = self.clock.now();
        let local = now.with_timezone(&self.offset);

        // upstream publishes nothing on quiet days; whatever we have stands
        if !force && state.has_value() && self.quiet_days.contains(&local.weekday()) {
            return Ok(Self::quote(&state, CacheStatus::CacheWeekend));
        }

        if !force && !self.needs_refresh(&state, now, local.hour()) {
            return Ok(Self::quote(&state, CacheStatus::CacheHit));
        }

        match self.provider.fetch_official().await {
            Ok(rates) if !rates.is_empty() => {
                self.apply_update(&mut state, rates, now);
                Ok(Self::quote(&state, CacheStatus::ScrapedAndUpdated))
            }
            Ok(_) => self.serve_stale(&state, Error::Extraction("page yielded no rates".into())),
            Err(e) => self.serve_stale(&state, e),
        }
    }

    fn needs_refresh(&self, state: &CacheState, now: DateTime<Utc>, local_hour: u32) -> bool {
        if !state.has_value() {
            return true;
        }
        let expired = match state.last_updated {
            Some(at) => now.signed_duration_since(at) > self.freshness,
            None => true,
        };
        expired || self.forced_hours.contains(&local_hour)
    }

    fn apply_update(&self, state: &mut CacheState, rates: ExtractedRates, now: DateTime<Utc>) {
        // partial results never clobber a still-valid sibling field
        match rates.usd {
            Some(usd) => state.usd = Some(usd),
            None => warn!("refresh resolved no USD value, keeping previous"),
        }
        match rates.eur {
            Some(eur) => state.eur = Some(eur),
            None => warn!("refresh resolved no EUR value, keeping previous"),
        }
        state.last_updated = Some(now);

        self.persist(RateSnapshot {
            usd_official: state.usd,
            eur_official: state.eur,
            usdt_buy: None,
            usdt_sell: None,
            captured_at: now,
            source: SnapshotOrigin::OfficialSite,
        });
    }

    /// Write-behind: the read path never waits on, or fails because of, the
    /// store.
    fn persist(&self, snapshot: RateSnapshot) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.upsert_latest(&RateRecord::from(snapshot)).await {
                error!("failed to persist rate snapshot: {}", e);
            }
        });
    }

    fn serve_stale(&self, state: &CacheState, cause: Error) -> Result<RateQuote> {
        if state.has_value() {
            warn!("refresh failed ({}), serving previous values", cause);
            Ok(Self::quote(state, CacheStatus::FallbackToOldCache))
        } else {
            Err(cause)
        }
    }

    fn quote(state: &CacheState, status: CacheStatus) -> RateQuote {
        RateQuote {
            usd: state.usd,
            eur: state.eur,
            timestamp: state.last_updated.unwrap_or(DateTime::<Utc>::MIN_UTC),
            status,
        }
    }
}
