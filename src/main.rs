use anyhow::Result;
use clap::Parser;
use log::info;
use std::sync::Arc;

use bcv_rates::cache::RateCache;
use bcv_rates::cli::Cli;
use bcv_rates::config::Config;
use bcv_rates::p2p::P2pClient;
use bcv_rates::scheduler::Scheduler;
use bcv_rates::scraper::BcvScraper;
use bcv_rates::storage;
use bcv_rates::web::WebServer;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    if cli.debug {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    info!("Starting rate service...");

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .with_env_overrides();
    info!("Configuration loaded.");

    let store = storage::connect(&config.database).await?;
    let scraper = Arc::new(BcvScraper::new(&config.official)?);
    let cache = Arc::new(RateCache::new(
        config.cache.clone(),
        scraper,
        Arc::clone(&store),
    ));
    let p2p = Arc::new(P2pClient::new(config.p2p.clone())?);

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&cache),
        Arc::clone(&p2p),
        Arc::clone(&store),
        config.schedule.clone(),
        config.cache.utc_offset_hours,
    ));
    info!("Running initial rate update...");
    scheduler.run_update().await;
    scheduler.spawn();

    let server = WebServer::new(cache, p2p, store);
    server.start(&config.server.host, config.server.port).await?;

    Ok(())
}
