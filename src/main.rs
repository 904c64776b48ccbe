use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use folio::config::{CombinationSize, OptimizeConfig, RunConfig};
use folio::data_context::MarketData;
use folio::optimizer::Optimizer;
use folio::optimizer_status::OptimizerStatus;
use folio::portfolio::{run_portfolio_backtest, PortfolioEntry};
use folio::report::{print_optimization_results, print_portfolio_report};
use folio::strategy::StrategyKind;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;

const DEFAULT_PRICE_DATA_FILE: &str = "data/daily-data.json";

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "A portfolio backtesting and allocation search engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest a portfolio with one strategy over a lookback window
    Backtest {
        /// Holdings as SYMBOL or SYMBOL:WEIGHT (weights are relative)
        #[arg(required = true, value_name = "SYMBOL[:WEIGHT]")]
        holdings: Vec<String>,
        /// Strategy id: dca, lump, ema50, ema100, ema200, ema_cross, rsi, macd
        #[arg(long, default_value = "dca")]
        strategy: String,
        /// Dollar amount per trigger; defaults to the strategy's usual amount
        #[arg(long)]
        amount: Option<f64>,
        /// Lookback window in years
        #[arg(long, default_value_t = 5)]
        years: u32,
        /// Backtest anchor date (defaults to today)
        #[arg(long = "as-of", value_name = "YYYY-MM-DD")]
        as_of: Option<NaiveDate>,
        /// Path to the daily price snapshot file
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
    },
    /// Search strategy/allocation combinations for a target annual return
    Optimize {
        /// Target annualized return, percent per year
        #[arg(long, default_value_t = 15.0)]
        target: f64,
        /// Lookback window in years
        #[arg(long, default_value_t = 5)]
        years: u32,
        /// Assets per combination (1, 2 or 3)
        #[arg(long, default_value_t = 1)]
        assets: u32,
        /// Backtest anchor date (defaults to today)
        #[arg(long = "as-of", value_name = "YYYY-MM-DD")]
        as_of: Option<NaiveDate>,
        /// Path to the daily price snapshot file
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    info!("Starting folio. Historical performance does not predict future returns.");

    match cli.command {
        Commands::Backtest {
            holdings,
            strategy,
            amount,
            years,
            as_of,
            data_file,
        } => {
            let market = load_market_data(data_file)?;
            let strategy: StrategyKind = strategy.parse()?;
            let amount = amount.unwrap_or_else(|| strategy.default_amount());
            let config = RunConfig::new(strategy, amount, years, resolve_as_of(as_of))?;
            let entries = parse_holdings(&holdings)?;
            info!(
                "Backtesting {} holding(s) with {} over {} year(s)",
                entries.len(),
                strategy,
                years
            );
            let outcome = run_portfolio_backtest(&market, &entries, &config);
            print_portfolio_report(&outcome);
        }
        Commands::Optimize {
            target,
            years,
            assets,
            as_of,
            data_file,
        } => {
            let market = load_market_data(data_file)?;
            let combination_size = CombinationSize::parse(assets)?;
            let config = OptimizeConfig::new(target, years, combination_size, resolve_as_of(as_of))?;
            info!(
                "Searching {}-asset combinations for {}%/yr over {} year(s)",
                combination_size.asset_count(),
                target,
                years
            );

            let status = OptimizerStatus::new();
            let optimizer = Optimizer::new(&market, config, status.clone());
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                    )
                    .unwrap()
                    .progress_chars("#>-"),
            );
            let results = optimizer.run(&mut |completed, total| {
                bar.set_length(total as u64);
                bar.set_position(completed as u64);
            });
            bar.finish_with_message("Search complete");
            print_optimization_results(&results, target);
        }
    }

    Ok(())
}

fn resolve_as_of(cli_value: Option<NaiveDate>) -> NaiveDate {
    cli_value.unwrap_or_else(|| Utc::now().date_naive())
}

fn load_market_data(cli_value: Option<PathBuf>) -> Result<MarketData> {
    let path = cli_value.unwrap_or_else(|| PathBuf::from(DEFAULT_PRICE_DATA_FILE));
    let market = MarketData::load_from_file(&path)
        .with_context(|| format!("Could not load daily prices from {}", path.display()))?;
    if market.is_empty() {
        return Err(anyhow!(
            "Price snapshot {} contains no usable series",
            path.display()
        ));
    }
    Ok(market)
}

/// Parses `SYMBOL` or `SYMBOL:WEIGHT` holding specs; bare symbols weigh 1.
fn parse_holdings(raw: &[String]) -> Result<Vec<PortfolioEntry>> {
    raw.iter()
        .map(|spec| {
            let (symbol, weight) = match spec.split_once(':') {
                Some((symbol, weight)) => {
                    let weight: f64 = weight
                        .trim()
                        .parse()
                        .map_err(|_| anyhow!("Invalid weight in holding '{}'", spec))?;
                    if !weight.is_finite() || weight <= 0.0 {
                        return Err(anyhow!("Weight must be positive in holding '{}'", spec));
                    }
                    (symbol, weight)
                }
                None => (spec.as_str(), 1.0),
            };
            let symbol = symbol.trim().to_uppercase();
            if symbol.is_empty() {
                return Err(anyhow!("Empty symbol in holding '{}'", spec));
            }
            Ok(PortfolioEntry {
                symbol,
                allocation: weight,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holdings_parse_symbols_and_weights() {
        let entries =
            parse_holdings(&["voo:60".to_string(), "gld:40".to_string(), "BTC".to_string()])
                .expect("holdings parse");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].symbol, "VOO");
        assert_eq!(entries[0].allocation, 60.0);
        assert_eq!(entries[2].symbol, "BTC");
        assert_eq!(entries[2].allocation, 1.0);
    }

    #[test]
    fn bad_holdings_are_rejected() {
        assert!(parse_holdings(&["VOO:abc".to_string()]).is_err());
        assert!(parse_holdings(&["VOO:-5".to_string()]).is_err());
        assert!(parse_holdings(&[":10".to_string()]).is_err());
    }
}
