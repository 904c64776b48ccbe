use crate::strategy::StrategyKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily closing price for an asset. Series are date-ascending and hold
/// at most one point per calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// One mark-to-market observation of a simulated position. `invested` never
/// decreases along a trajectory; capital is only added.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub invested: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BuySignal {
    pub date: NaiveDate,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestSummary {
    pub total_invested: f64,
    pub final_value: f64,
    pub profit: f64,
    pub return_percent: f64,
    pub total_shares: f64,
    pub avg_cost_per_share: f64,
    /// Worst peak-to-trough decline over the window, in percent (<= 0).
    pub max_drawdown: f64,
    pub trajectory: Vec<TrajectoryPoint>,
    pub buy_count: usize,
    pub buy_signals: Vec<BuySignal>,
}

/// Outcome of one strategy simulation. The numeric core never errors:
/// too little history is `InsufficientData`, a well-defined run whose
/// signal never fired is `NoSignals`.
#[derive(Debug, Clone)]
pub enum SimulationOutcome {
    Completed(BacktestSummary),
    NoSignals,
    InsufficientData,
}

impl SimulationOutcome {
    pub fn summary(&self) -> Option<&BacktestSummary> {
        match self {
            SimulationOutcome::Completed(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn is_no_signals(&self) -> bool {
        matches!(self, SimulationOutcome::NoSignals)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSlice {
    pub symbol: String,
    pub weight_percent: u32,
}

/// One ranked portfolio produced by the optimizer. Weights sum to 100.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationCandidate {
    pub strategy: StrategyKind,
    pub allocations: Vec<AllocationSlice>,
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub volatility: f64,
    pub risk_score: f64,
    pub total_invested: f64,
    pub final_value: f64,
}
