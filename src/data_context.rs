//! Read-only daily price data for the engine, loaded from a local JSON
//! snapshot. Remote retrieval is a collaborator's concern; whatever arrives
//! here is normalized so the numeric core can rely on ascending,
//! per-day-unique, positive prices.

use crate::models::PricePoint;
use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
struct PriceSnapshot {
    tickers: HashMap<String, Vec<PricePoint>>,
}

pub struct MarketData {
    symbols: Vec<String>,
    series_by_symbol: HashMap<String, Vec<PricePoint>>,
}

impl MarketData {
    /// Loads a snapshot file of shape
    /// `{"tickers": {"VOO": [{"date": "2020-01-02", "price": 300.1}, ...]}}`.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read price snapshot {}", path.display()))?;
        let market = Self::from_json_str(&raw)
            .with_context(|| format!("Failed to parse price snapshot {}", path.display()))?;
        info!(
            "Loaded daily prices for {} symbol(s) from {}",
            market.symbols.len(),
            path.display()
        );
        Ok(market)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let snapshot: PriceSnapshot = serde_json::from_str(raw)?;
        Ok(Self::from_series(snapshot.tickers))
    }

    /// Builds market data from already-decoded series, normalizing each one.
    pub fn from_series(series_by_symbol: HashMap<String, Vec<PricePoint>>) -> Self {
        let mut normalized: HashMap<String, Vec<PricePoint>> = HashMap::new();
        for (symbol, raw_series) in series_by_symbol {
            let series = normalize_series(&symbol, raw_series);
            if series.is_empty() {
                warn!("Skipping {}: no usable daily prices", symbol);
                continue;
            }
            normalized.insert(symbol, series);
        }

        let mut symbols: Vec<String> = normalized.keys().cloned().collect();
        symbols.sort();
        Self {
            symbols,
            series_by_symbol: normalized,
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn series(&self, symbol: &str) -> Option<&[PricePoint]> {
        self.series_by_symbol.get(symbol).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

fn normalize_series(symbol: &str, mut series: Vec<PricePoint>) -> Vec<PricePoint> {
    let before = series.len();
    series.retain(|p| p.price.is_finite() && p.price > 0.0);
    if series.len() < before {
        warn!(
            "Dropped {} non-positive price point(s) for {}",
            before - series.len(),
            symbol
        );
    }

    series.sort_by_key(|p| p.date);
    let before = series.len();
    series.dedup_by_key(|p| p.date);
    if series.len() < before {
        warn!(
            "Dropped {} duplicate day(s) for {}",
            before - series.len(),
            symbol
        );
    }

    series
}
