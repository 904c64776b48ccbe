//! Blends per-asset backtests into one portfolio trajectory.

use crate::backtester::run_backtest;
use crate::config::RunConfig;
use crate::data_context::MarketData;
use crate::models::{BacktestSummary, SimulationOutcome, TrajectoryPoint};
use crate::performance::{compute_max_drawdown, estimate_annualized_volatility};
use serde::Serialize;

/// One holding in a portfolio. Allocations are relative weights; they are
/// normalized against the portfolio total, so they need not sum to 100.
#[derive(Debug, Clone)]
pub struct PortfolioEntry {
    pub symbol: String,
    pub allocation: f64,
}

#[derive(Debug, Clone)]
pub struct AssetReport {
    pub symbol: String,
    pub allocation: f64,
    pub outcome: SimulationOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub total_invested: f64,
    pub final_value: f64,
    pub profit: f64,
    pub return_percent: f64,
    pub max_drawdown: f64,
    pub volatility: f64,
    pub trajectory: Vec<TrajectoryPoint>,
    #[serde(skip)]
    pub per_asset: Vec<AssetReport>,
}

#[derive(Debug, Clone)]
pub enum PortfolioOutcome {
    Completed(PortfolioSummary),
    /// Every asset with usable data was signal-driven and never triggered.
    NoSignals(Vec<AssetReport>),
    /// No asset produced usable data for the window.
    InsufficientData,
}

/// Backtests each holding at its allocation share of `config.amount` and
/// aggregates the results.
pub fn run_portfolio_backtest(
    market: &MarketData,
    entries: &[PortfolioEntry],
    config: &RunConfig,
) -> PortfolioOutcome {
    let total_allocation: f64 = entries.iter().map(|e| e.allocation).sum();
    if entries.is_empty() || total_allocation <= 0.0 {
        return PortfolioOutcome::InsufficientData;
    }

    let mut reports = Vec::with_capacity(entries.len());
    for entry in entries {
        let per_asset_config = RunConfig {
            amount: config.amount * entry.allocation / total_allocation,
            ..*config
        };
        let outcome = match market.series(&entry.symbol) {
            Some(series) => run_backtest(series, &per_asset_config),
            None => SimulationOutcome::InsufficientData,
        };
        reports.push(AssetReport {
            symbol: entry.symbol.clone(),
            allocation: entry.allocation,
            outcome,
        });
    }

    aggregate(reports)
}

/// Combines per-asset results (already scaled to their dollar amounts) into
/// one blended trajectory, truncated to the shortest contributing timeline.
/// Invested/final totals take each asset's own full-window totals, so an
/// asset with longer history keeps full credit.
pub fn aggregate(reports: Vec<AssetReport>) -> PortfolioOutcome {
    let contributing: Vec<&BacktestSummary> =
        reports.iter().filter_map(|r| r.outcome.summary()).collect();

    if contributing.is_empty() {
        if reports.iter().any(|r| r.outcome.is_no_signals()) {
            return PortfolioOutcome::NoSignals(reports);
        }
        return PortfolioOutcome::InsufficientData;
    }

    let min_len = contributing
        .iter()
        .map(|s| s.trajectory.len())
        .min()
        .unwrap_or(0);
    if min_len == 0 {
        return PortfolioOutcome::InsufficientData;
    }

    let mut trajectory = Vec::with_capacity(min_len);
    for i in 0..min_len {
        let mut value = 0.0;
        let mut invested = 0.0;
        for summary in &contributing {
            value += summary.trajectory[i].value;
            invested += summary.trajectory[i].invested;
        }
        trajectory.push(TrajectoryPoint {
            date: contributing[0].trajectory[i].date,
            value,
            invested,
        });
    }

    let total_invested: f64 = contributing.iter().map(|s| s.total_invested).sum();
    let final_value: f64 = contributing.iter().map(|s| s.final_value).sum();
    let profit = final_value - total_invested;
    let return_percent = if total_invested > 0.0 {
        profit / total_invested * 100.0
    } else {
        0.0
    };
    let max_drawdown = compute_max_drawdown(&trajectory);
    let values: Vec<f64> = trajectory.iter().map(|p| p.value).collect();
    let volatility = estimate_annualized_volatility(&values);

    PortfolioOutcome::Completed(PortfolioSummary {
        total_invested,
        final_value,
        profit,
        return_percent,
        max_drawdown,
        volatility,
        trajectory,
        per_asset: reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuySignal, PricePoint};
    use crate::strategy::StrategyKind;
    use chrono::{Duration, NaiveDate};
    use std::collections::HashMap;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn summary_with_values(values: &[f64], invested: f64, total_invested: f64) -> BacktestSummary {
        let trajectory: Vec<TrajectoryPoint> = values
            .iter()
            .enumerate()
            .map(|(i, &value)| TrajectoryPoint {
                date: date(2024, 1, 1) + Duration::days(i as i64),
                value,
                invested,
            })
            .collect();
        let final_value = values.last().copied().unwrap_or(0.0);
        BacktestSummary {
            total_invested,
            final_value,
            profit: final_value - total_invested,
            return_percent: (final_value - total_invested) / total_invested * 100.0,
            total_shares: 1.0,
            avg_cost_per_share: total_invested,
            max_drawdown: 0.0,
            trajectory,
            buy_count: 1,
            buy_signals: vec![BuySignal {
                date: date(2024, 1, 1),
                price: 1.0,
            }],
        }
    }

    fn report(symbol: &str, outcome: SimulationOutcome) -> AssetReport {
        AssetReport {
            symbol: symbol.to_string(),
            allocation: 50.0,
            outcome,
        }
    }

    #[test]
    fn aggregate_truncates_to_shortest_timeline() {
        let long = summary_with_values(&[100.0, 110.0, 120.0, 130.0], 100.0, 100.0);
        let short = summary_with_values(&[200.0, 210.0], 200.0, 200.0);
        let outcome = aggregate(vec![
            report("AAA", SimulationOutcome::Completed(long)),
            report("BBB", SimulationOutcome::Completed(short)),
        ]);
        let PortfolioOutcome::Completed(summary) = outcome else {
            panic!("expected completed aggregate");
        };
        assert_eq!(summary.trajectory.len(), 2);
        assert!((summary.trajectory[1].value - (110.0 + 210.0)).abs() < 1e-12);
        // Totals keep full credit for the longer asset.
        assert!((summary.total_invested - 300.0).abs() < 1e-12);
        assert!((summary.final_value - (130.0 + 210.0)).abs() < 1e-12);
    }

    #[test]
    fn no_signal_assets_do_not_contribute_to_the_blend() {
        let active = summary_with_values(&[100.0, 105.0, 110.0], 100.0, 100.0);
        let outcome = aggregate(vec![
            report("AAA", SimulationOutcome::Completed(active)),
            report("BBB", SimulationOutcome::NoSignals),
        ]);
        let PortfolioOutcome::Completed(summary) = outcome else {
            panic!("expected completed aggregate");
        };
        assert_eq!(summary.trajectory.len(), 3);
        assert!((summary.final_value - 110.0).abs() < 1e-12);
    }

    #[test]
    fn all_no_signals_aggregates_to_no_signals() {
        let outcome = aggregate(vec![
            report("AAA", SimulationOutcome::NoSignals),
            report("BBB", SimulationOutcome::NoSignals),
        ]);
        assert!(matches!(outcome, PortfolioOutcome::NoSignals(reports) if reports.len() == 2));
    }

    #[test]
    fn nothing_usable_aggregates_to_absence() {
        let outcome = aggregate(vec![
            report("AAA", SimulationOutcome::InsufficientData),
            report("BBB", SimulationOutcome::InsufficientData),
        ]);
        assert!(matches!(outcome, PortfolioOutcome::InsufficientData));
    }

    #[test]
    fn portfolio_run_scales_amount_by_relative_allocation() {
        let prices: Vec<f64> = (0..120).map(|i| 100.0 + i as f64 * 0.1).collect();
        let series: Vec<PricePoint> = prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint {
                date: date(2024, 1, 1) + Duration::days(i as i64),
                price,
            })
            .collect();
        let mut by_symbol = HashMap::new();
        by_symbol.insert("AAA".to_string(), series.clone());
        by_symbol.insert("BBB".to_string(), series);
        let market = MarketData::from_series(by_symbol);

        let config = RunConfig {
            strategy: StrategyKind::LumpSum,
            amount: 1000.0,
            years: 1,
            as_of: date(2024, 4, 29),
        };
        // Weights 30/10 normalize to 75% / 25%.
        let entries = vec![
            PortfolioEntry {
                symbol: "AAA".to_string(),
                allocation: 30.0,
            },
            PortfolioEntry {
                symbol: "BBB".to_string(),
                allocation: 10.0,
            },
        ];
        let PortfolioOutcome::Completed(summary) = run_portfolio_backtest(&market, &entries, &config)
        else {
            panic!("expected completed portfolio");
        };
        assert!((summary.total_invested - 1000.0).abs() < 1e-9);
        let a = summary.per_asset[0].outcome.summary().unwrap();
        let b = summary.per_asset[1].outcome.summary().unwrap();
        assert!((a.total_invested - 750.0).abs() < 1e-9);
        assert!((b.total_invested - 250.0).abs() < 1e-9);
    }
}
