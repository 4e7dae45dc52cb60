pub mod rates;

pub use rates::{CacheStatus, Listing, RateRecord, RateSnapshot, SnapshotOrigin, TradeDirection};
