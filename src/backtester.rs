//! Strategy simulators over daily price series.
//!
//! Every simulator restricts the series to a lookback window anchored at the
//! run's `as_of` date, accumulates shares on its buy triggers, and records
//! one trajectory point per day in the window whether or not it bought.
//! Indicator-driven strategies additionally prefetch history before the
//! window start so the indicator is warm at the window boundary.

use crate::config::RunConfig;
use crate::indicators::{calculate_ema, calculate_macd, calculate_rsi};
use crate::models::{BacktestSummary, BuySignal, PricePoint, SimulationOutcome, TrajectoryPoint};
use crate::performance::compute_max_drawdown;
use crate::strategy::StrategyKind;
use chrono::{Datelike, Duration, NaiveDate};

/// Trading days to wait after an RSI buy before evaluating signals again.
const RSI_COOLDOWN_DAYS: u32 = 5;
/// Extra calendar days of prefetch beyond the indicator period.
const EMA_PREFETCH_MARGIN: i64 = 100;
const OSCILLATOR_PREFETCH_MARGIN: i64 = 50;

pub fn run_backtest(series: &[PricePoint], config: &RunConfig) -> SimulationOutcome {
    let amount = config.amount;
    let years = config.years;
    let as_of = config.as_of;
    match config.strategy {
        StrategyKind::MonthlyDca => backtest_dca(series, amount, years, as_of),
        StrategyKind::LumpSum => backtest_lump_sum(series, amount, years, as_of),
        StrategyKind::EmaTouch { period } => backtest_ema_touch(series, amount, years, as_of, period),
        StrategyKind::EmaCrossover {
            short_period,
            long_period,
        } => backtest_ema_crossover(series, amount, years, as_of, short_period, long_period),
        StrategyKind::RsiReversion { period, threshold } => {
            backtest_rsi_reversion(series, amount, years, as_of, period, threshold)
        }
        StrategyKind::MacdCross { fast, slow, signal } => {
            backtest_macd_cross(series, amount, years, as_of, fast, slow, signal)
        }
    }
}

/// Calendar-year subtraction. Feb 29 anchors roll forward to Mar 1 when the
/// target year is not a leap year.
fn subtract_years(date: NaiveDate, years: u32) -> NaiveDate {
    let target_year = date.year() - years as i32;
    date.with_year(target_year)
        .or_else(|| NaiveDate::from_ymd_opt(target_year, 3, 1))
        .unwrap_or(date)
}

/// The in-window slice: everything from the first point at or after the
/// cutoff. Empty when the whole series predates the window.
fn slice_from_years_ago(series: &[PricePoint], as_of: NaiveDate, years: u32) -> &[PricePoint] {
    let cutoff = subtract_years(as_of, years);
    match series.iter().position(|p| p.date >= cutoff) {
        Some(start) => &series[start..],
        None => &[],
    }
}

/// The prefetch slice for indicator strategies: window plus `prefetch_days`
/// of earlier history, along with the window cutoff date.
fn slice_with_prefetch(
    series: &[PricePoint],
    as_of: NaiveDate,
    years: u32,
    prefetch_days: i64,
) -> (&[PricePoint], NaiveDate) {
    let cutoff = subtract_years(as_of, years);
    let prefetch_date = cutoff - Duration::days(prefetch_days);
    let start = series
        .iter()
        .position(|p| p.date >= prefetch_date)
        .unwrap_or(series.len());
    (&series[start..], cutoff)
}

/// First index of `sliced` inside the window, requiring at least one
/// prefetch point before it so day `i - 1` always exists.
fn window_start_index(sliced: &[PricePoint], cutoff: NaiveDate) -> Option<usize> {
    match sliced.iter().position(|p| p.date >= cutoff) {
        Some(start) if start >= 1 => Some(start),
        _ => None,
    }
}

fn summarize(
    trajectory: Vec<TrajectoryPoint>,
    total_invested: f64,
    total_shares: f64,
    buy_signals: Vec<BuySignal>,
) -> BacktestSummary {
    let final_value = trajectory.last().map(|p| p.value).unwrap_or(0.0);
    let profit = final_value - total_invested;
    let return_percent = if total_invested > 0.0 {
        profit / total_invested * 100.0
    } else {
        0.0
    };
    let avg_cost_per_share = if total_shares > 0.0 {
        total_invested / total_shares
    } else {
        0.0
    };
    let max_drawdown = compute_max_drawdown(&trajectory);
    BacktestSummary {
        total_invested,
        final_value,
        profit,
        return_percent,
        total_shares,
        avg_cost_per_share,
        max_drawdown,
        buy_count: buy_signals.len(),
        buy_signals,
        trajectory,
    }
}

fn backtest_dca(
    series: &[PricePoint],
    monthly_amount: f64,
    years: u32,
    as_of: NaiveDate,
) -> SimulationOutcome {
    let window = slice_from_years_ago(series, as_of, years);
    if window.len() < 2 {
        return SimulationOutcome::InsufficientData;
    }

    let mut total_shares = 0.0f64;
    let mut total_invested = 0.0f64;
    let mut trajectory = Vec::with_capacity(window.len());
    let mut buy_signals = Vec::new();
    let mut last_buy_month: Option<(i32, u32)> = None;

    for point in window {
        let month_stamp = (point.date.year(), point.date.month());
        // Buy on the first trading day of each new calendar month.
        if last_buy_month != Some(month_stamp) {
            total_shares += monthly_amount / point.price;
            total_invested += monthly_amount;
            buy_signals.push(BuySignal {
                date: point.date,
                price: point.price,
            });
            last_buy_month = Some(month_stamp);
        }
        trajectory.push(TrajectoryPoint {
            date: point.date,
            value: total_shares * point.price,
            invested: total_invested,
        });
    }

    SimulationOutcome::Completed(summarize(trajectory, total_invested, total_shares, buy_signals))
}

fn backtest_lump_sum(
    series: &[PricePoint],
    amount: f64,
    years: u32,
    as_of: NaiveDate,
) -> SimulationOutcome {
    let window = slice_from_years_ago(series, as_of, years);
    if window.len() < 2 {
        return SimulationOutcome::InsufficientData;
    }

    let buy_price = window[0].price;
    let shares = amount / buy_price;
    let trajectory: Vec<TrajectoryPoint> = window
        .iter()
        .map(|point| TrajectoryPoint {
            date: point.date,
            value: shares * point.price,
            invested: amount,
        })
        .collect();
    let buy_signals = vec![BuySignal {
        date: window[0].date,
        price: buy_price,
    }];

    SimulationOutcome::Completed(summarize(trajectory, amount, shares, buy_signals))
}

fn backtest_ema_touch(
    series: &[PricePoint],
    buy_amount: f64,
    years: u32,
    as_of: NaiveDate,
    period: usize,
) -> SimulationOutcome {
    if series.len() < period {
        return SimulationOutcome::InsufficientData;
    }

    let prefetch_days = period as i64 + EMA_PREFETCH_MARGIN;
    let (sliced, cutoff) = slice_with_prefetch(series, as_of, years, prefetch_days);
    let prices: Vec<f64> = sliced.iter().map(|p| p.price).collect();
    let ema = calculate_ema(&prices, period);
    if ema.is_empty() {
        return SimulationOutcome::InsufficientData;
    }
    let Some(range_start) = window_start_index(sliced, cutoff) else {
        return SimulationOutcome::InsufficientData;
    };
    if range_start >= ema.len() {
        return SimulationOutcome::InsufficientData;
    }

    let mut total_shares = 0.0f64;
    let mut total_invested = 0.0f64;
    let mut trajectory = Vec::with_capacity(sliced.len() - range_start);
    let mut buy_signals = Vec::new();

    for i in range_start..sliced.len() {
        if let (Some(current_ema), Some(prev_ema)) = (ema[i], ema[i - 1]) {
            let prev_price = sliced[i - 1].price;
            let price = sliced[i].price;
            // Touch/cross-down: yesterday above the EMA, today at or below.
            if prev_price > prev_ema && price <= current_ema {
                total_shares += buy_amount / price;
                total_invested += buy_amount;
                buy_signals.push(BuySignal {
                    date: sliced[i].date,
                    price,
                });
            }
        }
        trajectory.push(TrajectoryPoint {
            date: sliced[i].date,
            value: total_shares * sliced[i].price,
            invested: total_invested,
        });
    }

    if buy_signals.is_empty() {
        return SimulationOutcome::NoSignals;
    }
    SimulationOutcome::Completed(summarize(trajectory, total_invested, total_shares, buy_signals))
}

fn backtest_ema_crossover(
    series: &[PricePoint],
    buy_amount: f64,
    years: u32,
    as_of: NaiveDate,
    short_period: usize,
    long_period: usize,
) -> SimulationOutcome {
    if series.len() < long_period {
        return SimulationOutcome::InsufficientData;
    }

    let prefetch_days = long_period as i64 + EMA_PREFETCH_MARGIN;
    let (sliced, cutoff) = slice_with_prefetch(series, as_of, years, prefetch_days);
    let prices: Vec<f64> = sliced.iter().map(|p| p.price).collect();
    let short_ema = calculate_ema(&prices, short_period);
    let long_ema = calculate_ema(&prices, long_period);
    if short_ema.is_empty() || long_ema.is_empty() {
        return SimulationOutcome::InsufficientData;
    }
    let Some(range_start) = window_start_index(sliced, cutoff) else {
        return SimulationOutcome::InsufficientData;
    };
    if range_start >= short_ema.len() || range_start >= long_ema.len() {
        return SimulationOutcome::InsufficientData;
    }

    let mut total_shares = 0.0f64;
    let mut total_invested = 0.0f64;
    let mut trajectory = Vec::with_capacity(sliced.len() - range_start);
    let mut buy_signals = Vec::new();

    for i in range_start..sliced.len() {
        if let (Some(short), Some(long), Some(prev_short), Some(prev_long)) =
            (short_ema[i], long_ema[i], short_ema[i - 1], long_ema[i - 1])
        {
            // Golden cross: short EMA was at or below the long EMA, now above.
            if prev_short <= prev_long && short > long {
                let price = sliced[i].price;
                total_shares += buy_amount / price;
                total_invested += buy_amount;
                buy_signals.push(BuySignal {
                    date: sliced[i].date,
                    price,
                });
            }
        }
        trajectory.push(TrajectoryPoint {
            date: sliced[i].date,
            value: total_shares * sliced[i].price,
            invested: total_invested,
        });
    }

    if buy_signals.is_empty() {
        return SimulationOutcome::NoSignals;
    }
    SimulationOutcome::Completed(summarize(trajectory, total_invested, total_shares, buy_signals))
}

fn backtest_rsi_reversion(
    series: &[PricePoint],
    buy_amount: f64,
    years: u32,
    as_of: NaiveDate,
    period: usize,
    threshold: f64,
) -> SimulationOutcome {
    if series.len() < period + 1 {
        return SimulationOutcome::InsufficientData;
    }

    let prefetch_days = period as i64 + OSCILLATOR_PREFETCH_MARGIN;
    let (sliced, cutoff) = slice_with_prefetch(series, as_of, years, prefetch_days);
    let prices: Vec<f64> = sliced.iter().map(|p| p.price).collect();
    let rsi = calculate_rsi(&prices, period);
    if rsi.is_empty() {
        return SimulationOutcome::InsufficientData;
    }
    let Some(range_start) = window_start_index(sliced, cutoff) else {
        return SimulationOutcome::InsufficientData;
    };
    if range_start >= rsi.len() {
        return SimulationOutcome::InsufficientData;
    }

    let mut total_shares = 0.0f64;
    let mut total_invested = 0.0f64;
    let mut trajectory = Vec::with_capacity(sliced.len() - range_start);
    let mut buy_signals = Vec::new();
    let mut cooldown = 0u32;

    for i in range_start..sliced.len() {
        if cooldown > 0 {
            cooldown -= 1;
        }
        if cooldown == 0 {
            if let (Some(current_rsi), Some(prev_rsi)) = (rsi[i], rsi[i - 1]) {
                // Buy when RSI first crosses below the oversold threshold.
                if prev_rsi >= threshold && current_rsi < threshold {
                    let price = sliced[i].price;
                    total_shares += buy_amount / price;
                    total_invested += buy_amount;
                    buy_signals.push(BuySignal {
                        date: sliced[i].date,
                        price,
                    });
                    cooldown = RSI_COOLDOWN_DAYS;
                }
            }
        }
        trajectory.push(TrajectoryPoint {
            date: sliced[i].date,
            value: total_shares * sliced[i].price,
            invested: total_invested,
        });
    }

    if buy_signals.is_empty() {
        return SimulationOutcome::NoSignals;
    }
    SimulationOutcome::Completed(summarize(trajectory, total_invested, total_shares, buy_signals))
}

fn backtest_macd_cross(
    series: &[PricePoint],
    buy_amount: f64,
    years: u32,
    as_of: NaiveDate,
    fast: usize,
    slow: usize,
    signal: usize,
) -> SimulationOutcome {
    if series.len() < slow + signal {
        return SimulationOutcome::InsufficientData;
    }

    let prefetch_days = (slow + signal) as i64 + OSCILLATOR_PREFETCH_MARGIN;
    let (sliced, cutoff) = slice_with_prefetch(series, as_of, years, prefetch_days);
    let prices: Vec<f64> = sliced.iter().map(|p| p.price).collect();
    let Some(macd) = calculate_macd(&prices, fast, slow, signal) else {
        return SimulationOutcome::InsufficientData;
    };
    let Some(range_start) = window_start_index(sliced, cutoff) else {
        return SimulationOutcome::InsufficientData;
    };
    if range_start >= macd.macd_line.len() {
        return SimulationOutcome::InsufficientData;
    }

    let mut total_shares = 0.0f64;
    let mut total_invested = 0.0f64;
    let mut trajectory = Vec::with_capacity(sliced.len() - range_start);
    let mut buy_signals = Vec::new();

    for i in range_start..sliced.len() {
        if let (Some(macd_now), Some(signal_now), Some(macd_prev), Some(signal_prev)) = (
            macd.macd_line[i],
            macd.signal_line[i],
            macd.macd_line[i - 1],
            macd.signal_line[i - 1],
        ) {
            // Bullish crossover: MACD line crosses above the signal line.
            if macd_prev <= signal_prev && macd_now > signal_now {
                let price = sliced[i].price;
                total_shares += buy_amount / price;
                total_invested += buy_amount;
                buy_signals.push(BuySignal {
                    date: sliced[i].date,
                    price,
                });
            }
        }
        trajectory.push(TrajectoryPoint {
            date: sliced[i].date,
            value: total_shares * sliced[i].price,
            invested: total_invested,
        });
    }

    if buy_signals.is_empty() {
        return SimulationOutcome::NoSignals;
    }
    SimulationOutcome::Completed(summarize(trajectory, total_invested, total_shares, buy_signals))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily_series(start: NaiveDate, prices: &[f64]) -> Vec<PricePoint> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint {
                date: start + Duration::days(i as i64),
                price,
            })
            .collect()
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn subtract_years_handles_leap_day() {
        assert_eq!(subtract_years(date(2024, 2, 29), 1), date(2023, 3, 1));
        assert_eq!(subtract_years(date(2024, 2, 29), 4), date(2020, 2, 29));
        assert_eq!(subtract_years(date(2025, 6, 15), 5), date(2020, 6, 15));
    }

    #[test]
    fn window_excludes_points_before_cutoff() {
        let series = daily_series(date(2020, 1, 1), &[1.0; 800]);
        let window = slice_from_years_ago(&series, date(2021, 12, 31), 1);
        assert!(window.iter().all(|p| p.date >= date(2020, 12, 31)));
        assert!(!window.is_empty());
    }

    #[test]
    fn stale_series_is_insufficient_data() {
        let series = daily_series(date(2010, 1, 1), &[1.0; 100]);
        let config = RunConfig {
            strategy: StrategyKind::MonthlyDca,
            amount: 100.0,
            years: 2,
            as_of: date(2025, 1, 1),
        };
        assert!(matches!(
            run_backtest(&series, &config),
            SimulationOutcome::InsufficientData
        ));
    }

    #[test]
    fn dca_buys_once_per_calendar_month() {
        // Daily data across three months; first trading day of each month buys.
        let prices: Vec<f64> = (0..90).map(|i| 100.0 + i as f64 * 0.1).collect();
        let series = daily_series(date(2024, 1, 1), &prices);
        let config = RunConfig {
            strategy: StrategyKind::MonthlyDca,
            amount: 100.0,
            years: 1,
            as_of: date(2024, 3, 30),
        };
        let outcome = run_backtest(&series, &config);
        let summary = outcome.summary().expect("dca result");
        assert_eq!(summary.buy_count, 3);
        assert!((summary.total_invested - 300.0).abs() < 1e-9);
        assert_eq!(summary.trajectory.len(), 90);
    }

    #[test]
    fn lump_sum_avg_cost_is_entry_price() {
        let prices = [50.0, 55.0, 60.0, 58.0, 62.0];
        let series = daily_series(date(2024, 6, 3), &prices);
        let config = RunConfig {
            strategy: StrategyKind::LumpSum,
            amount: 1000.0,
            years: 1,
            as_of: date(2024, 6, 9),
        };
        let summary = run_backtest(&series, &config).summary().cloned().expect("lump result");
        assert!((summary.avg_cost_per_share - 50.0).abs() < 1e-9);
        assert!((summary.total_shares - 20.0).abs() < 1e-9);
        assert!((summary.final_value - 20.0 * 62.0).abs() < 1e-9);
        assert!((summary.profit - (summary.final_value - 1000.0)).abs() < 1e-12);
    }

    #[test]
    fn invested_is_non_decreasing_for_every_strategy() {
        let prices: Vec<f64> = (0..900)
            .map(|i| {
                let t = i as f64;
                120.0 + t * 0.05 + 15.0 * (t / 23.0).sin()
            })
            .collect();
        let series = daily_series(date(2022, 1, 1), &prices);
        let as_of = series.last().unwrap().date;
        for strategy in StrategyKind::all() {
            let config = RunConfig {
                strategy,
                amount: 100.0,
                years: 2,
                as_of,
            };
            if let SimulationOutcome::Completed(summary) = run_backtest(&series, &config) {
                for window in summary.trajectory.windows(2) {
                    assert!(
                        window[1].invested >= window[0].invested,
                        "invested decreased for {}",
                        strategy.id()
                    );
                }
                assert!(
                    (summary.profit - (summary.final_value - summary.total_invested)).abs() < 1e-9
                );
            }
        }
    }

    #[test]
    fn ema_touch_without_touches_reports_no_signals() {
        // Strictly rising prices stay above their own EMA: no cross-down.
        let prices: Vec<f64> = (0..700).map(|i| 100.0 + i as f64).collect();
        let series = daily_series(date(2022, 1, 1), &prices);
        let config = RunConfig {
            strategy: StrategyKind::EmaTouch { period: 50 },
            amount: 1000.0,
            years: 1,
            as_of: series.last().unwrap().date,
        };
        assert!(run_backtest(&series, &config).is_no_signals());
    }

    #[test]
    fn rsi_signals_respect_cooldown_spacing() {
        // A sawtooth violent enough to cross the oversold line repeatedly.
        let prices: Vec<f64> = (0..600)
            .map(|i| {
                let t = i as f64;
                100.0 + 40.0 * (t / 4.0).sin() + 5.0 * (t / 17.0).cos()
            })
            .map(|p| p.max(1.0))
            .collect();
        let series = daily_series(date(2023, 1, 1), &prices);
        let config = RunConfig {
            strategy: StrategyKind::RsiReversion {
                period: 14,
                threshold: 30.0,
            },
            amount: 500.0,
            years: 1,
            as_of: series.last().unwrap().date,
        };
        let summary = run_backtest(&series, &config).summary().cloned().expect("rsi signals");
        assert!(summary.buy_count > 1, "test series should fire repeatedly");
        for pair in summary.buy_signals.windows(2) {
            let gap = (pair[1].date - pair[0].date).num_days();
            assert!(gap >= RSI_COOLDOWN_DAYS as i64, "signals {} days apart", gap);
        }
    }

    #[test]
    fn short_series_reports_absence_not_zeroes() {
        let series = daily_series(date(2025, 1, 1), &[100.0]);
        for strategy in StrategyKind::all() {
            let config = RunConfig {
                strategy,
                amount: 100.0,
                years: 1,
                as_of: date(2025, 1, 2),
            };
            assert!(matches!(
                run_backtest(&series, &config),
                SimulationOutcome::InsufficientData
            ));
        }
    }
}
