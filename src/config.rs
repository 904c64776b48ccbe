use crate::strategy::StrategyKind;
use anyhow::{anyhow, Result};
use chrono::NaiveDate;

/// Dollar notional each optimizer candidate is scaled to for reporting.
pub const DEFAULT_OPTIMIZE_NOTIONAL: f64 = 1000.0;

/// How many assets an optimizer combination holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationSize {
    Single,
    Pair,
    Triple,
}

impl CombinationSize {
    pub fn parse(raw: u32) -> Result<Self> {
        match raw {
            1 => Ok(CombinationSize::Single),
            2 => Ok(CombinationSize::Pair),
            3 => Ok(CombinationSize::Triple),
            other => Err(anyhow!(
                "Combination size must be 1, 2 or 3 assets (value: {})",
                other
            )),
        }
    }

    pub fn asset_count(self) -> usize {
        match self {
            CombinationSize::Single => 1,
            CombinationSize::Pair => 2,
            CombinationSize::Triple => 3,
        }
    }
}

/// Immutable inputs for one backtest run. The engine reads everything it
/// needs from here; in particular the window anchor `as_of` is always
/// explicit so runs are reproducible.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub strategy: StrategyKind,
    /// Dollar amount per trigger (monthly amount for DCA, one-time amount
    /// for lump sum, per-signal amount otherwise).
    pub amount: f64,
    /// Lookback window in calendar years before `as_of`.
    pub years: u32,
    pub as_of: NaiveDate,
}

impl RunConfig {
    pub fn new(strategy: StrategyKind, amount: f64, years: u32, as_of: NaiveDate) -> Result<Self> {
        let amount = require_positive("amount", amount)?;
        let years = require_years(years)?;
        Ok(Self {
            strategy,
            amount,
            years,
            as_of,
        })
    }
}

/// Immutable inputs for one optimization run.
#[derive(Debug, Clone, Copy)]
pub struct OptimizeConfig {
    /// Target annualized return, in percent per year.
    pub target_return: f64,
    pub years: u32,
    pub combination_size: CombinationSize,
    /// Dollar scale applied to the per-unit backtests when reporting
    /// invested/final totals.
    pub default_notional: f64,
    pub as_of: NaiveDate,
    /// Branch-and-bound pruning of pairs/triplets that cannot beat the
    /// current worst retained candidate. Disabling it only costs time; the
    /// results are identical.
    pub pruning_enabled: bool,
}

impl OptimizeConfig {
    pub fn new(
        target_return: f64,
        years: u32,
        combination_size: CombinationSize,
        as_of: NaiveDate,
    ) -> Result<Self> {
        if !target_return.is_finite() {
            return Err(anyhow!(
                "Target return must be finite (value: {})",
                target_return
            ));
        }
        let years = require_years(years)?;
        Ok(Self {
            target_return,
            years,
            combination_size,
            default_notional: DEFAULT_OPTIMIZE_NOTIONAL,
            as_of,
            pruning_enabled: true,
        })
    }
}

fn require_positive(name: &str, value: f64) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(anyhow!("{} must be a positive number (value: {})", name, value));
    }
    Ok(value)
}

fn require_years(years: u32) -> Result<u32> {
    if years == 0 {
        return Err(anyhow!("Lookback must be at least 1 year"));
    }
    Ok(years)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    #[test]
    fn run_config_rejects_bad_amounts() {
        assert!(RunConfig::new(StrategyKind::MonthlyDca, 0.0, 5, as_of()).is_err());
        assert!(RunConfig::new(StrategyKind::MonthlyDca, f64::NAN, 5, as_of()).is_err());
        assert!(RunConfig::new(StrategyKind::MonthlyDca, 500.0, 0, as_of()).is_err());
        assert!(RunConfig::new(StrategyKind::MonthlyDca, 500.0, 5, as_of()).is_ok());
    }

    #[test]
    fn combination_size_parses_only_supported_counts() {
        assert_eq!(CombinationSize::parse(1).unwrap().asset_count(), 1);
        assert_eq!(CombinationSize::parse(3).unwrap().asset_count(), 3);
        assert!(CombinationSize::parse(0).is_err());
        assert!(CombinationSize::parse(4).is_err());
    }

    #[test]
    fn optimize_config_rejects_non_finite_target() {
        assert!(OptimizeConfig::new(f64::INFINITY, 5, CombinationSize::Pair, as_of()).is_err());
        let config = OptimizeConfig::new(15.0, 5, CombinationSize::Pair, as_of()).unwrap();
        assert!(config.pruning_enabled);
        assert_eq!(config.default_notional, DEFAULT_OPTIMIZE_NOTIONAL);
    }
}
