use async_trait::async_trait;
use bcv_rates::cache::{Clock, RateCache};
use bcv_rates::config::CacheConfig;
use bcv_rates::models::{CacheStatus, RateRecord};
use bcv_rates::scraper::{ExtractedRates, RateProvider};
use bcv_rates::storage::RateStore;
use bcv_rates::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct FlakyProvider {
    healthy: AtomicBool,
    calls: AtomicUsize,
}

impl FlakyProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RateProvider for FlakyProvider {
    async fn fetch_official(&self) -> Result<ExtractedRates> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(ExtractedRates {
                usd: Some(dec!(36.50)),
                eur: Some(dec!(39.87)),
            })
        } else {
            Err(Error::Network("connection refused".to_string()))
        }
    }
}

struct RecordingStore {
    records: Mutex<Vec<RateRecord>>,
}

impl RecordingStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl RateStore for RecordingStore {
    async fn upsert_latest(&self, record: &RateRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn read_latest(&self) -> Result<Option<RateRecord>> {
        Ok(self.records.lock().unwrap().last().cloned())
    }
}

struct TestClock(Mutex<DateTime<Utc>>);

impl TestClock {
    fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn config() -> CacheConfig {
    CacheConfig {
        freshness_hours: 4,
        quiet_days: vec!["sat".to_string(), "sun".to_string()],
        forced_hours: vec![6, 19, 20, 21],
        utc_offset_hours: 0,
    }
}

#[tokio::test]
async fn outage_degrades_then_recovers() {
    // Wednesday mid-day
    let clock = TestClock::at(Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap());
    let provider = FlakyProvider::new();
    let cache = RateCache::with_clock(
        config(),
        provider.clone(),
        RecordingStore::new(),
        clock.clone(),
    );

    let fresh = cache.get_rates(false).await.unwrap();
    assert_eq!(fresh.status, CacheStatus::ScrapedAndUpdated);

    // upstream goes down, freshness window elapses: old values keep flowing
    provider.healthy.store(false, Ordering::SeqCst);
    clock.set(Utc.with_ymd_and_hms(2024, 1, 3, 17, 0, 0).unwrap());
    let degraded = cache.get_rates(false).await.unwrap();
    assert_eq!(degraded.status, CacheStatus::FallbackToOldCache);
    assert_eq!(degraded.usd, fresh.usd);
    assert_eq!(degraded.eur, fresh.eur);

    // upstream recovers: the next stale read scrapes again
    provider.healthy.store(true, Ordering::SeqCst);
    clock.set(Utc.with_ymd_and_hms(2024, 1, 3, 18, 0, 0).unwrap());
    let recovered = cache.get_rates(false).await.unwrap();
    assert_eq!(recovered.status, CacheStatus::ScrapedAndUpdated);
}

#[tokio::test]
async fn force_refresh_scrapes_every_time() {
    let clock = TestClock::at(Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap());
    let provider = FlakyProvider::new();
    let cache = RateCache::with_clock(
        config(),
        provider.clone(),
        RecordingStore::new(),
        clock,
    );

    cache.get_rates(false).await.unwrap();
    let forced = cache.get_rates(true).await.unwrap();

    assert_eq!(forced.status, CacheStatus::ScrapedAndUpdated);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}
