use async_trait::async_trait;
use log::{info, warn};

use crate::config::OfficialSourceConfig;
use crate::error::{Error, Result};

pub mod extract;
pub mod fetch;
pub mod numeric;

pub use extract::ExtractedRates;

use extract::extract;
use fetch::PageFetcher;

/// Source of the official USD/EUR quotes. The cache refreshes through this
/// seam, so tests can substitute a scripted implementation.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_official(&self) -> Result<ExtractedRates>;
}

/// Fetches the central-bank page and runs the extraction chain over it.
pub struct BcvScraper {
    fetcher: PageFetcher,
}

impl BcvScraper {
    pub fn new(config: &OfficialSourceConfig) -> Result<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(config)?,
        })
    }
}

#[async_trait]
impl RateProvider for BcvScraper {
    async fn fetch_official(&self) -> Result<ExtractedRates> {
        let markup = self.fetcher.fetch().await?;
        let rates = extract(&markup);
        if rates.is_empty() {
            return Err(Error::Extraction(
                "no USD or EUR value found in page".to_string(),
            ));
        }
        if rates.usd.is_none() {
            warn!("USD rate not found in page");
        }
        if rates.eur.is_none() {
            warn!("EUR rate not found in page");
        }
        info!(
            "scraped official rates: USD={:?} EUR={:?}",
            rates.usd, rates.eur
        );
        Ok(rates)
    }
}
