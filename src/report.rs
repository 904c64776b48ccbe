//! Text formatting for backtest and optimization results.

use crate::models::{OptimizationCandidate, TrajectoryPoint};
use crate::portfolio::{PortfolioOutcome, PortfolioSummary};

/// Chart consumers get at most this many trajectory points.
pub const CHART_SAMPLE_POINTS: usize = 120;

pub fn format_currency(value: f64) -> String {
    if value >= 1_000_000.0 {
        return format!("${:.2}M", value / 1_000_000.0);
    }
    format!("${}", group_thousands(value.round() as i64))
}

pub fn format_percent(value: f64) -> String {
    let sign = if value >= 0.0 { "+" } else { "" };
    format!("{}{:.1}%", sign, value)
}

fn group_thousands(value: i64) -> String {
    let digits = value.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Evenly downsamples a trajectory to `target_points`, always keeping the
/// first and last points.
pub fn sample_for_chart(points: &[TrajectoryPoint], target_points: usize) -> Vec<TrajectoryPoint> {
    if points.len() <= target_points || target_points < 2 {
        return points.to_vec();
    }
    (0..target_points)
        .map(|i| {
            let position = i as f64 / (target_points - 1) as f64;
            let index = (position * (points.len() - 1) as f64).round() as usize;
            points[index]
        })
        .collect()
}

pub fn print_portfolio_report(outcome: &PortfolioOutcome) {
    match outcome {
        PortfolioOutcome::Completed(summary) => print_portfolio_summary(summary),
        PortfolioOutcome::NoSignals(reports) => {
            println!("\nNo buy signals fired inside the window for:");
            for report in reports {
                println!("  {}", report.symbol);
            }
            println!("Nothing was invested; try a longer window or another strategy.");
        }
        PortfolioOutcome::InsufficientData => {
            println!("\nNot enough price history for this window; no result.");
        }
    }
}

fn print_portfolio_summary(summary: &PortfolioSummary) {
    println!("\n=== PORTFOLIO BACKTEST ===\n");
    println!("  Total Invested: {}", format_currency(summary.total_invested));
    println!("  Final Value: {}", format_currency(summary.final_value));
    println!(
        "  Profit: {} ({})",
        format_currency(summary.profit),
        format_percent(summary.return_percent)
    );
    println!("  Max Drawdown: {:.1}%", summary.max_drawdown);
    println!("  Volatility: {:.1}%", summary.volatility);
    println!();

    for report in &summary.per_asset {
        match report.outcome.summary() {
            Some(asset) => {
                println!(
                    "  {} ({:.0}%): invested {}, final {}, return {}, {} buy(s)",
                    report.symbol,
                    report.allocation,
                    format_currency(asset.total_invested),
                    format_currency(asset.final_value),
                    format_percent(asset.return_percent),
                    asset.buy_count
                );
            }
            None if report.outcome.is_no_signals() => {
                println!("  {} ({:.0}%): no signals", report.symbol, report.allocation);
            }
            None => {
                println!(
                    "  {} ({:.0}%): insufficient data",
                    report.symbol, report.allocation
                );
            }
        }
    }
}

pub fn print_optimization_results(results: &[OptimizationCandidate], target_return: f64) {
    if results.is_empty() {
        println!("\nNo valid portfolios found for this period");
        return;
    }

    println!("\n=== TOP {} PORTFOLIOS ===\n", results.len());
    for (i, result) in results.iter().enumerate() {
        let diff = result.annualized_return - target_return;
        println!(
            "Rank {}: {} ({} from target)",
            i + 1,
            result.strategy,
            format_percent(diff)
        );
        println!(
            "  Annual Return: {}/yr",
            format_percent(result.annualized_return)
        );
        println!("  Risk Score: {:.1}", result.risk_score);
        println!("  Max Drawdown: {:.1}%", result.max_drawdown);
        println!("  Volatility: {:.1}%", result.volatility);
        println!(
            "  Invested {} -> Final {}",
            format_currency(result.total_invested),
            format_currency(result.final_value)
        );
        let allocations = result
            .allocations
            .iter()
            .map(|a| format!("{} {}%", a.symbol, a.weight_percent))
            .collect::<Vec<String>>()
            .join(" | ");
        println!("  Allocation: {}", allocations);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    #[test]
    fn currency_formatting_groups_and_abbreviates() {
        assert_eq!(format_currency(999.4), "$999");
        assert_eq!(format_currency(10_543.0), "$10,543");
        assert_eq!(format_currency(1_250_000.0), "$1.25M");
    }

    #[test]
    fn percent_formatting_keeps_the_sign() {
        assert_eq!(format_percent(12.34), "+12.3%");
        assert_eq!(format_percent(-3.21), "-3.2%");
        assert_eq!(format_percent(0.0), "+0.0%");
    }

    #[test]
    fn chart_sampling_bounds_length_and_keeps_endpoints() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points: Vec<TrajectoryPoint> = (0..500)
            .map(|i| TrajectoryPoint {
                date: start + Duration::days(i as i64),
                value: i as f64,
                invested: 100.0,
            })
            .collect();
        let sampled = sample_for_chart(&points, CHART_SAMPLE_POINTS);
        assert_eq!(sampled.len(), CHART_SAMPLE_POINTS);
        assert_eq!(sampled[0].value, 0.0);
        assert_eq!(sampled.last().unwrap().value, 499.0);

        let short = sample_for_chart(&points[..50], CHART_SAMPLE_POINTS);
        assert_eq!(short.len(), 50);
    }
}
