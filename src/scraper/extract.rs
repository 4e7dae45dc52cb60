use log::debug;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};

use super::numeric::{parse_embedded, parse_grouped};

const USD_MARKERS: &[&str] = &["Dólar", "USD"];
const EUR_MARKERS: &[&str] = &["Euro", "EUR"];

/// Rates pulled from one render of the central-bank page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedRates {
    pub usd: Option<Decimal>,
    pub eur: Option<Decimal>,
}

impl ExtractedRates {
    pub fn is_empty(&self) -> bool {
        self.usd.is_none() && self.eur.is_none()
    }
}

type Strategy = fn(&Html) -> Option<Decimal>;

/// Ordered fallback chains; the first strategy to produce a value wins.
/// Each entry is independent of the others so a heuristic can be added or
/// retired without touching its neighbors.
const USD_STRATEGIES: &[(&str, Strategy)] = &[
    ("usd-container-id", usd_by_container_id),
    ("usd-marker-scan", usd_by_marker_scan),
];

const EUR_STRATEGIES: &[(&str, Strategy)] = &[
    ("eur-container-id", eur_by_container_id),
    ("eur-marker-scan", eur_by_marker_scan),
    ("eur-row-scan", eur_by_row_scan),
];

/// Extract whatever official rates the markup yields. Malformed input is
/// never an error here: unresolvable fields simply come back `None` and
/// the caller decides whether a partial result is acceptable.
pub fn extract(markup: &str) -> ExtractedRates {
    let doc = Html::parse_document(markup);
    ExtractedRates {
        usd: run_strategies(&doc, USD_STRATEGIES),
        eur: run_strategies(&doc, EUR_STRATEGIES),
    }
}

fn run_strategies(doc: &Html, strategies: &[(&str, Strategy)]) -> Option<Decimal> {
    for (name, strategy) in strategies {
        if let Some(value) = strategy(doc) {
            debug!("rate resolved by {}: {}", name, value);
            return Some(value);
        }
    }
    None
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn first_strong_text(element: ElementRef<'_>) -> Option<String> {
    let strong = selector("strong");
    element
        .select(&strong)
        .next()
        .map(|s| s.text().collect::<String>())
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// The page carries the main USD card under a stable id.
fn usd_by_container_id(doc: &Html) -> Option<Decimal> {
    for css in ["#dolar", "#rate"] {
        if let Some(element) = doc.select(&selector(css)).next() {
            if let Some(value) = first_strong_text(element)
                .as_deref()
                .and_then(parse_grouped)
            {
                return Some(value);
            }
        }
    }
    None
}

fn eur_by_container_id(doc: &Html) -> Option<Decimal> {
    let element = doc.select(&selector("#euro")).next()?;
    first_strong_text(element).as_deref().and_then(parse_grouped)
}

/// Id containers gone (site redesign): fall back to any block whose text
/// mentions the currency, taking its first emphasized value.
fn marker_scan(doc: &Html, markers: &[&str]) -> Option<Decimal> {
    let div = selector("div");
    for element in doc.select(&div) {
        let text = element_text(element);
        if !markers.iter().any(|m| text.contains(m)) {
            continue;
        }
        if let Some(value) = first_strong_text(element)
            .as_deref()
            .and_then(parse_embedded)
        {
            return Some(value);
        }
    }
    None
}

fn usd_by_marker_scan(doc: &Html) -> Option<Decimal> {
    marker_scan(doc, USD_MARKERS)
}

fn eur_by_marker_scan(doc: &Html) -> Option<Decimal> {
    marker_scan(doc, EUR_MARKERS)
}

/// Last resort for EUR: rate tables render as rows. A combined row listing
/// both currencies must be skipped, otherwise the USD value would be read
/// as the EUR rate.
fn eur_by_row_scan(doc: &Html) -> Option<Decimal> {
    let row = selector("div.row");
    let strong = selector("strong");
    let right_aligned = selector("span.text-right");
    for element in doc.select(&row) {
        let text = element_text(element);
        let mentions_eur = EUR_MARKERS.iter().any(|m| text.contains(m));
        let mentions_usd = USD_MARKERS.iter().any(|m| text.contains(m));
        if !mentions_eur || mentions_usd {
            continue;
        }
        let candidate = element
            .select(&strong)
            .last()
            .or_else(|| element.select(&right_aligned).last())?;
        return parse_grouped(&element_text(candidate));
    }
    None
}
