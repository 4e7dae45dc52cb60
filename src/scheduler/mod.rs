use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Timelike, Utc};
use log::{error, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::cache::{RateCache, RateQuote};
use crate::config::ScheduleConfig;
use crate::models::{RateRecord, RateSnapshot, SnapshotOrigin};
use crate::p2p::P2pClient;
use crate::storage::RateStore;

/// Background refresh triggers: a daily fixed-time run, a recurring backup
/// interval, and one catch-up shortly after startup. All three call the
/// same cache refresh routine, whose lock serializes overlapping firings.
pub struct Scheduler {
    cache: Arc<RateCache>,
    p2p: Arc<P2pClient>,
    store: Arc<dyn RateStore>,
    config: ScheduleConfig,
    offset: FixedOffset,
}

impl Scheduler {
    pub fn new(
        cache: Arc<RateCache>,
        p2p: Arc<P2pClient>,
        store: Arc<dyn RateStore>,
        config: ScheduleConfig,
        utc_offset_hours: i32,
    ) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
        Self {
            cache,
            p2p,
            store,
            config,
            offset,
        }
    }

    pub fn spawn(self: Arc<Self>) {
        let daily = Arc::clone(&self);
        tokio::spawn(async move {
            loop {
                let wait = daily.until_next_daily_run();
                info!("next daily rate update in {}s", wait.as_secs());
                sleep(wait).await;
                daily.run_update().await;
            }
        });

        let periodic = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker =
                interval(Duration::from_secs(periodic.config.interval_minutes.max(1) * 60));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately; startup already refreshed
            ticker.tick().await;
            loop {
                ticker.tick().await;
                periodic.run_update().await;
            }
        });

        let once = Arc::clone(&self);
        tokio::spawn(async move {
            sleep(Duration::from_secs(
                once.config.startup_delay_minutes * 60,
            ))
            .await;
            once.run_update().await;
        });

        info!(
            "scheduler started: daily at {:02}:00 local, every {} minutes, once in {} minutes",
            self.config.daily_hour, self.config.interval_minutes, self.config.startup_delay_minutes
        );
    }

    fn until_next_daily_run(&self) -> Duration {
        let now = Utc::now().with_timezone(&self.offset);
        until_hour(now, self.config.daily_hour)
    }

    /// One full refresh pass: official rates through the cache protocol,
    /// then the P2P averages, then a combined snapshot persisted
    /// best-effort.
    pub async fn run_update(&self) {
        let quote = match self.cache.get_rates(false).await {
            Ok(quote) => {
                info!("scheduled update served with status {:?}", quote.status);
                Some(quote)
            }
            Err(e) => {
                error!("scheduled official-rate update failed: {}", e);
                None
            }
        };

        let averages = self.p2p.fetch_averages().await;
        if averages.buy_sample_count == 0 && averages.sell_sample_count == 0 {
            warn!("no P2P samples this run");
        }

        let snapshot = combined_snapshot(quote, averages.buy_average, averages.sell_average,
            averages.buy_sample_count, averages.sell_sample_count);
        let Some(snapshot) = snapshot else {
            warn!("nothing to persist this run");
            return;
        };
        if let Err(e) = self.store.upsert_latest(&RateRecord::from(snapshot)).await {
            error!("failed to persist scheduled snapshot: {}", e);
        }
    }
}

/// Merge one run's results into a persistable snapshot, or nothing when
/// both sides came back empty.
fn combined_snapshot(
    quote: Option<RateQuote>,
    buy_average: Decimal,
    sell_average: Decimal,
    buy_samples: usize,
    sell_samples: usize,
) -> Option<RateSnapshot> {
    let sampled = |average: Decimal, count: usize| (count > 0).then_some(average);
    let source = if quote.is_some() {
        SnapshotOrigin::OfficialSite
    } else {
        SnapshotOrigin::P2pMarket
    };
    let snapshot = RateSnapshot {
        usd_official: quote.as_ref().and_then(|q| q.usd),
        eur_official: quote.as_ref().and_then(|q| q.eur),
        usdt_buy: sampled(buy_average, buy_samples),
        usdt_sell: sampled(sell_average, sell_samples),
        captured_at: Utc::now(),
        source,
    };
    snapshot.has_any_rate().then_some(snapshot)
}

/// Time left until the next local occurrence of `hour`:00.
fn until_hour(now: DateTime<FixedOffset>, hour: u32) -> Duration {
    let target = now
        .with_hour(hour)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0));
    let target = match target {
        Some(t) => t,
        None => return Duration::from_secs(24 * 3600),
    };
    let target = if target <= now {
        target + ChronoDuration::days(1)
    } else {
        target
    };
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CacheStatus;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn local(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(4 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 3, h, m, 0)
            .unwrap()
    }

    #[test]
    fn daily_run_later_today() {
        assert_eq!(until_hour(local(5, 0), 6), Duration::from_secs(3600));
    }

    #[test]
    fn daily_run_rolls_to_tomorrow() {
        assert_eq!(
            until_hour(local(7, 0), 6),
            Duration::from_secs(23 * 3600)
        );
    }

    #[test]
    fn daily_run_at_the_exact_hour_waits_a_day() {
        assert_eq!(
            until_hour(local(6, 0), 6),
            Duration::from_secs(24 * 3600)
        );
    }

    fn quote() -> RateQuote {
        RateQuote {
            usd: Some(dec!(36.50)),
            eur: Some(dec!(39.87)),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap(),
            status: CacheStatus::ScrapedAndUpdated,
        }
    }

    #[test]
    fn combined_snapshot_merges_both_sides() {
        let snapshot =
            combined_snapshot(Some(quote()), dec!(41.10), dec!(41.60), 5, 5).unwrap();
        assert_eq!(snapshot.usd_official, Some(dec!(36.50)));
        assert_eq!(snapshot.usdt_buy, Some(dec!(41.10)));
        assert_eq!(snapshot.usdt_sell, Some(dec!(41.60)));
        assert_eq!(snapshot.source, SnapshotOrigin::OfficialSite);
    }

    #[test]
    fn p2p_only_snapshot_is_tagged_with_its_market() {
        let snapshot = combined_snapshot(None, dec!(41.10), Decimal::ZERO, 5, 0).unwrap();
        assert_eq!(snapshot.usd_official, None);
        assert_eq!(snapshot.usdt_buy, Some(dec!(41.10)));
        assert_eq!(snapshot.usdt_sell, None);
        assert_eq!(snapshot.source, SnapshotOrigin::P2pMarket);
    }

    #[test]
    fn empty_run_produces_no_snapshot() {
        assert!(combined_snapshot(None, Decimal::ZERO, Decimal::ZERO, 0, 0).is_none());
    }
}
