use actix_web::{web, HttpResponse, Responder};
use log::{error, warn};

use crate::cache::RateQuote;
use crate::error::Result;

use super::server::AppState;

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Cache-governed read: fresh, cached or degraded values, with the status
/// tag telling the client which it got.
pub async fn get_rates(state: web::Data<AppState>) -> impl Responder {
    rate_response(state.cache.get_rates(false).await)
}

/// Bypasses the freshness checks and always attempts a scrape.
pub async fn force_refresh(state: web::Data<AppState>) -> impl Responder {
    rate_response(state.cache.get_rates(true).await)
}

fn rate_response(result: Result<RateQuote>) -> HttpResponse {
    match result {
        Ok(quote) => HttpResponse::Ok().json(quote),
        Err(e) if e.is_unavailable() => {
            error!("rate acquisition failed with nothing to fall back on: {}", e);
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": "exchange rates are temporarily unavailable, try again later",
                "detail": e.to_string(),
            }))
        }
        Err(e) => {
            error!("unexpected failure serving rates: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "internal error while serving rates",
            }))
        }
    }
}

/// Multi-device read: the latest persisted record, falling back to the live
/// cache path when nothing has been stored yet.
pub async fn get_persisted_rates(state: web::Data<AppState>) -> impl Responder {
    match state.store.read_latest().await {
        Ok(Some(record)) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": {
                "usd_official": record.usd_official,
                "eur_official": record.eur_official,
                "usdt_buy": record.usdt_buy,
                "usdt_sell": record.usdt_sell,
                "timestamp": record.last_updated,
            },
            "source": "database",
        })),
        Ok(None) => {
            warn!("no persisted rates yet, answering from the scraper");
            match state.cache.get_rates(false).await {
                Ok(quote) => HttpResponse::Ok().json(serde_json::json!({
                    "success": true,
                    "data": {
                        "usd_official": quote.usd,
                        "eur_official": quote.eur,
                        "usdt_buy": null,
                        "usdt_sell": null,
                        "timestamp": quote.timestamp,
                    },
                    "source": "scraper_fallback",
                })),
                Err(e) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "success": false,
                    "error": format!("could not obtain rates: {}", e),
                })),
            }
        }
        Err(e) => {
            error!("failed to read persisted rates: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "error": "failed to read persisted rates",
            }))
        }
    }
}

/// Live P2P market averages for both trade directions.
pub async fn get_p2p_average(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.p2p.fetch_averages().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn health_reports_ok() {
        let app =
            test::init_service(App::new().route("/health", web::get().to(health))).await;
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/health").to_request(),
        )
        .await;
        assert!(resp.status().is_success());
    }
}
