use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use log::info;
use std::sync::Arc;

use crate::cache::RateCache;
use crate::p2p::P2pClient;
use crate::storage::RateStore;

use super::api;

/// Shared handler state.
pub struct AppState {
    pub cache: Arc<RateCache>,
    pub p2p: Arc<P2pClient>,
    pub store: Arc<dyn RateStore>,
}

pub struct WebServer {
    state: web::Data<AppState>,
}

impl WebServer {
    pub fn new(cache: Arc<RateCache>, p2p: Arc<P2pClient>, store: Arc<dyn RateStore>) -> Self {
        Self {
            state: web::Data::new(AppState { cache, p2p, store }),
        }
    }

    pub async fn start(&self, host: &str, port: u16) -> std::io::Result<()> {
        info!("Starting web server on {}:{}", host, port);

        let state = self.state.clone();
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(state.clone())
                .route("/health", web::get().to(api::health))
                .route("/tasas", web::get().to(api::get_rates))
                .route("/tasas/refresh", web::post().to(api::force_refresh))
                .route("/api/rates", web::get().to(api::get_persisted_rates))
                .route("/p2p/average", web::get().to(api::get_p2p_average))
        })
        .bind((host, port))?
        .run()
        .await
    }
}
