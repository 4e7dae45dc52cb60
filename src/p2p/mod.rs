use log::warn;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::config::P2pConfig;
use crate::error::{Error, Result};
use crate::models::{Listing, TradeDirection};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdvSearchRequest<'a> {
    asset: &'a str,
    fiat: &'a str,
    trade_type: &'a str,
    page: u32,
    rows: u32,
    filter_type: &'a str,
    countries: &'a [String],
    pay_types: &'a [String],
}

#[derive(Debug, Deserialize)]
struct AdvSearchResponse {
    data: Option<Vec<AdvEntry>>,
}

#[derive(Debug, Deserialize)]
struct AdvEntry {
    adv: AdvDetail,
}

#[derive(Debug, Deserialize)]
struct AdvDetail {
    price: String,
}

/// Averages served by the P2P endpoint, with sample counts so clients can
/// judge how much market depth backs each figure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct P2pAverages {
    pub buy_average: Decimal,
    pub sell_average: Decimal,
    pub buy_sample_count: usize,
    pub sell_sample_count: usize,
}

/// Client for the marketplace's advert-search API.
pub struct P2pClient {
    client: Client,
    config: P2pConfig,
}

impl P2pClient {
    pub fn new(config: P2pConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Ranked adverts for one trade direction, with the sponsored head
    /// entry dropped and the rest capped at the configured sample size.
    pub async fn fetch_listings(&self, direction: TradeDirection) -> Result<Vec<Listing>> {
        let request = AdvSearchRequest {
            asset: &self.config.asset,
            fiat: &self.config.fiat,
            trade_type: direction.as_str(),
            page: 1,
            rows: self.config.rows,
            filter_type: "all",
            countries: &[],
            pay_types: &[],
        };
        let response = self
            .client
            .post(&self.config.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus(status.as_u16()));
        }
        let body: AdvSearchResponse = response.json().await?;
        Ok(sample_listings(
            body.data.unwrap_or_default(),
            direction,
            self.config.sample_size,
        ))
    }

    /// The two directions are independent, so both fetches run concurrently
    /// and are combined only once both complete. A failed side degrades to
    /// an empty sample rather than failing the whole call.
    pub async fn fetch_averages(&self) -> P2pAverages {
        let (buy, sell) = tokio::join!(
            self.fetch_listings(TradeDirection::Buy),
            self.fetch_listings(TradeDirection::Sell)
        );
        let buy = buy.unwrap_or_else(|e| {
            warn!("P2P buy-side fetch failed: {}", e);
            Vec::new()
        });
        let sell = sell.unwrap_or_else(|e| {
            warn!("P2P sell-side fetch failed: {}", e);
            Vec::new()
        });
        P2pAverages {
            buy_average: average(&buy),
            sell_average: average(&sell),
            buy_sample_count: buy.len(),
            sell_sample_count: sell.len(),
        }
    }
}

/// The first-ranked advert is a paid placement, not a market price; it is
/// always excluded before sampling.
fn sample_listings(
    entries: Vec<AdvEntry>,
    direction: TradeDirection,
    sample_size: usize,
) -> Vec<Listing> {
    entries
        .into_iter()
        .skip(1)
        .take(sample_size)
        .filter_map(|entry| match Decimal::from_str(&entry.adv.price) {
            Ok(price) => Some(Listing { price, direction }),
            Err(_) => {
                warn!("skipping advert with unparsable price {:?}", entry.adv.price);
                None
            }
        })
        .collect()
}

/// Unweighted arithmetic mean. An empty sample averages to zero.
pub fn average(listings: &[Listing]) -> Decimal {
    if listings.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = listings.iter().map(|l| l.price).sum();
    sum / Decimal::from(listings.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn listing(price: Decimal) -> Listing {
        Listing {
            price,
            direction: TradeDirection::Buy,
        }
    }

    fn entries(prices: &[&str]) -> Vec<AdvEntry> {
        prices
            .iter()
            .map(|p| AdvEntry {
                adv: AdvDetail {
                    price: p.to_string(),
                },
            })
            .collect()
    }

    #[test]
    fn average_of_empty_is_zero() {
        assert_eq!(average(&[]), Decimal::ZERO);
    }

    #[test]
    fn average_of_single_is_identity() {
        assert_eq!(average(&[listing(dec!(41.25))]), dec!(41.25));
    }

    #[test]
    fn average_is_order_independent() {
        let forward = vec![listing(dec!(40)), listing(dec!(41)), listing(dec!(45))];
        let backward = vec![listing(dec!(45)), listing(dec!(41)), listing(dec!(40))];
        assert_eq!(average(&forward), average(&backward));
        assert_eq!(average(&forward), dec!(42));
    }

    #[test]
    fn sponsored_head_entry_is_dropped() {
        let sampled = sample_listings(
            entries(&["99.99", "41.10", "41.20"]),
            TradeDirection::Buy,
            5,
        );
        let prices: Vec<Decimal> = sampled.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec!(41.10), dec!(41.20)]);
    }

    #[test]
    fn sample_is_capped_in_rank_order() {
        let sampled = sample_listings(
            entries(&["99", "1", "2", "3", "4", "5", "6", "7"]),
            TradeDirection::Sell,
            5,
        );
        let prices: Vec<Decimal> = sampled.iter().map(|l| l.price).collect();
        assert_eq!(
            prices,
            vec![dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)]
        );
    }

    #[test]
    fn unparsable_prices_are_skipped() {
        let sampled = sample_listings(
            entries(&["99", "41.10", "not-a-price", "41.30"]),
            TradeDirection::Buy,
            5,
        );
        assert_eq!(sampled.len(), 2);
    }

    #[test]
    fn empty_market_yields_no_sample() {
        assert!(sample_listings(Vec::new(), TradeDirection::Buy, 5).is_empty());
        // a lone sponsored advert leaves nothing to average
        assert!(sample_listings(entries(&["99"]), TradeDirection::Buy, 5).is_empty());
    }
}
