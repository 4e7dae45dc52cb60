pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod p2p;
pub mod scheduler;
pub mod scraper;
pub mod storage;
pub mod web;

pub use error::{Error, Result};
