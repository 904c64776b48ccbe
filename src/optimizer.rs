//! Brute-force search for allocation mixes closest to a target annualized
//! return.
//!
//! Phase one backtests every (symbol, strategy) pair once at a $1 unit
//! amount and keeps the trajectory as flat value/invested buffers. Phase two
//! walks 1-, 2- or 3-asset combinations: for each allocation split the
//! blended value series is folded in a single pass through per-split
//! accumulators (TWR chaining, peak/drawdown, return moments), so the inner
//! loop stays allocation-free. A bounded top-10 list ranked by distance to
//! the target return doubles as the branch-and-bound threshold: a pair or
//! triplet whose best possible blended return cannot beat the current worst
//! retained distance is skipped outright.

use crate::backtester::run_backtest;
use crate::config::{CombinationSize, OptimizeConfig, RunConfig};
use crate::data_context::MarketData;
use crate::models::{AllocationSlice, OptimizationCandidate, SimulationOutcome};
use crate::optimizer_status::{OptimizerPhase, OptimizerStatus};
use crate::performance::{
    calculate_risk_score, calculate_twr, compute_risk_from_values, TRADING_DAYS_PER_YEAR,
};
use crate::strategy::StrategyKind;
use log::info;

/// Unit amount used for the precomputed backtests; candidates are scaled to
/// the configured notional afterwards.
const UNIT_AMOUNT: f64 = 1.0;
pub const MAX_RESULTS: usize = 10;
/// Pairs/triplets between progress reports and cancellation checks.
const PROGRESS_BATCH: usize = 10;
/// First-asset weights for two-asset splits; the second asset takes the rest.
const PAIR_ALLOCATION_STEPS: [u32; 9] = [90, 80, 70, 60, 50, 40, 30, 20, 10];

/// A per-unit-amount backtest of one (symbol, strategy) pair, flattened for
/// the search inner loop.
struct UnitBacktest {
    total_invested: f64,
    final_value: f64,
    twr_percent: f64,
    values: Vec<f64>,
    invested: Vec<f64>,
}

/// Precomputed universe: `runs[asset][strategy]` holds the unit backtest
/// when that combination produced a usable result.
struct AssetUniverse {
    symbols: Vec<String>,
    runs: Vec<Vec<Option<UnitBacktest>>>,
}

struct RankedCandidate {
    distance: f64,
    candidate: OptimizationCandidate,
}

/// Top-N candidates sorted ascending by distance to the target return. The
/// worst retained distance only tightens as the search proceeds, which keeps
/// the pruning tests sound.
struct RankedList {
    target_return: f64,
    entries: Vec<RankedCandidate>,
}

impl RankedList {
    fn new(target_return: f64) -> Self {
        Self {
            target_return,
            entries: Vec::with_capacity(MAX_RESULTS + 1),
        }
    }

    fn is_full(&self) -> bool {
        self.entries.len() >= MAX_RESULTS
    }

    fn worst_distance(&self) -> f64 {
        if self.is_full() {
            self.entries.last().map(|e| e.distance).unwrap_or(f64::INFINITY)
        } else {
            f64::INFINITY
        }
    }

    fn try_insert(&mut self, candidate: OptimizationCandidate) {
        let distance = (candidate.annualized_return - self.target_return).abs();
        if !distance.is_finite() {
            return;
        }
        if self.is_full() && distance >= self.worst_distance() {
            return;
        }
        let position = self.entries.partition_point(|e| e.distance <= distance);
        self.entries.insert(position, RankedCandidate { distance, candidate });
        self.entries.truncate(MAX_RESULTS);
    }

    fn into_candidates(self) -> Vec<OptimizationCandidate> {
        self.entries.into_iter().map(|e| e.candidate).collect()
    }
}

/// Flat per-split accumulators advanced once per time step. Indexed by split
/// so the blend loop touches contiguous buffers only.
struct SplitAccumulator {
    twrs: Vec<f64>,
    peaks: Vec<f64>,
    max_drawdowns: Vec<f64>,
    prev_values: Vec<f64>,
    prev_invested: Vec<f64>,
    sum_returns: Vec<f64>,
    sum_return_squares: Vec<f64>,
    steps_with_return: usize,
}

struct SplitMetrics {
    annualized_return: f64,
    max_drawdown: f64,
    volatility: f64,
}

impl SplitAccumulator {
    fn new(num_splits: usize) -> Self {
        Self {
            twrs: vec![1.0; num_splits],
            peaks: vec![0.0; num_splits],
            max_drawdowns: vec![0.0; num_splits],
            prev_values: vec![0.0; num_splits],
            prev_invested: vec![0.0; num_splits],
            sum_returns: vec![0.0; num_splits],
            sum_return_squares: vec![0.0; num_splits],
            steps_with_return: 0,
        }
    }

    fn observe(&mut self, split: usize, step: usize, value: f64, invested: f64) {
        if step > 0 {
            let cash_flow = invested - self.prev_invested[split];
            let start_value = self.prev_values[split] + cash_flow;
            if start_value > 0.0 {
                self.twrs[split] *= value / start_value;
            }
        }
        if value > self.peaks[split] {
            self.peaks[split] = value;
        }
        if self.peaks[split] > 0.0 {
            let drawdown = (value - self.peaks[split]) / self.peaks[split];
            if drawdown < self.max_drawdowns[split] {
                self.max_drawdowns[split] = drawdown;
            }
        }
        if step > 0 && self.prev_values[split] > 0.0 {
            let r = (value - self.prev_values[split]) / self.prev_values[split];
            self.sum_returns[split] += r;
            self.sum_return_squares[split] += r * r;
        }
        self.prev_values[split] = value;
        self.prev_invested[split] = invested;
    }

    fn finish_step(&mut self, step: usize) {
        if step > 0 {
            self.steps_with_return += 1;
        }
    }

    fn metrics(&self, split: usize, years: f64) -> SplitMetrics {
        let annualized_return = (self.twrs[split] - 1.0) * 100.0 / years;
        let max_drawdown = self.max_drawdowns[split] * 100.0;
        let variance = if self.steps_with_return > 0 {
            let count = self.steps_with_return as f64;
            let mean = self.sum_returns[split] / count;
            self.sum_return_squares[split] / count - mean * mean
        } else {
            0.0
        };
        let volatility = variance.max(0.0).sqrt() * TRADING_DAYS_PER_YEAR.sqrt() * 100.0;
        SplitMetrics {
            annualized_return,
            max_drawdown,
            volatility,
        }
    }
}

/// Best-case distance to the target for any convex blend of the given
/// per-asset annualized returns: the target clamped into their range.
fn closest_blend_distance(target_return: f64, returns: &[f64]) -> f64 {
    let mut blend_min = f64::INFINITY;
    let mut blend_max = f64::NEG_INFINITY;
    for &r in returns {
        blend_min = blend_min.min(r);
        blend_max = blend_max.max(r);
    }
    if target_return < blend_min {
        blend_min - target_return
    } else if target_return > blend_max {
        target_return - blend_max
    } else {
        0.0
    }
}

/// Three-way splits where every weight is a multiple of 10, at least 10, and
/// the triple sums to 100, enumerated in canonical descending order.
fn triple_allocation_splits() -> Vec<[u32; 3]> {
    let mut splits = Vec::new();
    let mut outer = 60u32;
    while outer >= 20 {
        let mut middle = (80 - outer).min(outer);
        while middle >= 10 {
            let remainder = 100 - outer - middle;
            if remainder >= 10 && remainder <= middle {
                splits.push([outer, middle, remainder]);
            }
            middle -= 10;
        }
        outer -= 10;
    }
    splits
}

pub struct Optimizer<'a> {
    market: &'a MarketData,
    config: OptimizeConfig,
    status: OptimizerStatus,
}

impl<'a> Optimizer<'a> {
    pub fn new(market: &'a MarketData, config: OptimizeConfig, status: OptimizerStatus) -> Self {
        Self {
            market,
            config,
            status,
        }
    }

    /// Runs the full search. `progress` receives `(completed, total)` search
    /// units at a fixed cadence; cancelling through the status handle ends
    /// the search early with the candidates retained so far.
    pub fn run(&self, progress: &mut dyn FnMut(usize, usize)) -> Vec<OptimizationCandidate> {
        self.status.set_phase(OptimizerPhase::Precomputing);
        let universe = self.precompute();
        if universe.symbols.is_empty() {
            info!("No symbol produced a usable unit backtest; nothing to search");
            progress(1, 1);
            self.status.set_phase(OptimizerPhase::Done);
            return Vec::new();
        }

        let mut results = RankedList::new(self.config.target_return);
        self.status
            .set_phase(OptimizerPhase::Searching(self.config.combination_size));
        match self.config.combination_size {
            CombinationSize::Single => self.search_single(&universe, &mut results, progress),
            CombinationSize::Pair => self.search_pairs(&universe, &mut results, progress),
            CombinationSize::Triple => self.search_triplets(&universe, &mut results, progress),
        }
        self.status.set_phase(OptimizerPhase::Done);
        results.into_candidates()
    }

    /// Backtests every (symbol, strategy) pair once at unit amount. Pairs
    /// yielding absence, no signals, an empty trajectory or zero invested
    /// are excluded; symbols with no usable pair drop out of the universe.
    fn precompute(&self) -> AssetUniverse {
        let strategies = StrategyKind::all();
        let mut symbols = Vec::new();
        let mut runs = Vec::new();

        for symbol in self.market.symbols() {
            let Some(series) = self.market.series(symbol) else {
                continue;
            };
            let mut per_strategy: Vec<Option<UnitBacktest>> = Vec::with_capacity(strategies.len());
            let mut has_any = false;
            for strategy in strategies {
                let config = RunConfig {
                    strategy,
                    amount: UNIT_AMOUNT,
                    years: self.config.years,
                    as_of: self.config.as_of,
                };
                let unit = match run_backtest(series, &config) {
                    SimulationOutcome::Completed(summary)
                        if !summary.trajectory.is_empty() && summary.total_invested > 0.0 =>
                    {
                        let twr_percent = calculate_twr(&summary.trajectory);
                        Some(UnitBacktest {
                            total_invested: summary.total_invested,
                            final_value: summary.final_value,
                            twr_percent,
                            values: summary.trajectory.iter().map(|p| p.value).collect(),
                            invested: summary.trajectory.iter().map(|p| p.invested).collect(),
                        })
                    }
                    _ => None,
                };
                has_any |= unit.is_some();
                per_strategy.push(unit);
            }
            if has_any {
                symbols.push(symbol.clone());
                runs.push(per_strategy);
            }
        }

        info!(
            "Precomputed unit backtests: {} of {} symbol(s) usable",
            symbols.len(),
            self.market.symbols().len()
        );
        AssetUniverse { symbols, runs }
    }

    /// Reports progress, mirrors it into the status handle, and returns
    /// whether the search should stop.
    fn yield_point(
        &self,
        done: usize,
        total: usize,
        progress: &mut dyn FnMut(usize, usize),
    ) -> bool {
        progress(done, total);
        self.status.set_progress(done, total);
        if self.status.is_cancel_requested() {
            info!("Optimization cancelled after {} of {} unit(s)", done, total);
            return true;
        }
        false
    }

    fn search_single(
        &self,
        universe: &AssetUniverse,
        results: &mut RankedList,
        progress: &mut dyn FnMut(usize, usize),
    ) {
        let strategies = StrategyKind::all();
        let years = self.config.years as f64;
        let notional = self.config.default_notional;
        let total = universe.symbols.len() * strategies.len();

        for (asset, per_strategy) in universe.runs.iter().enumerate() {
            for (strategy_index, strategy) in strategies.iter().enumerate() {
                let Some(unit) = per_strategy[strategy_index].as_ref() else {
                    continue;
                };
                let risk = compute_risk_from_values(&unit.values);
                results.try_insert(OptimizationCandidate {
                    strategy: *strategy,
                    allocations: vec![AllocationSlice {
                        symbol: universe.symbols[asset].clone(),
                        weight_percent: 100,
                    }],
                    annualized_return: unit.twr_percent / years,
                    max_drawdown: risk.max_drawdown,
                    volatility: risk.volatility,
                    risk_score: calculate_risk_score(risk.max_drawdown, risk.volatility),
                    total_invested: unit.total_invested * notional,
                    final_value: unit.final_value * notional,
                });
            }
        }

        progress(total, total);
        self.status.set_progress(total, total);
    }

    fn search_pairs(
        &self,
        universe: &AssetUniverse,
        results: &mut RankedList,
        progress: &mut dyn FnMut(usize, usize),
    ) {
        let strategies = StrategyKind::all();
        let years = self.config.years as f64;
        let notional = self.config.default_notional;
        let scales: Vec<(f64, f64)> = PAIR_ALLOCATION_STEPS
            .iter()
            .map(|&weight| {
                (
                    notional * weight as f64 / 100.0,
                    notional * (100 - weight) as f64 / 100.0,
                )
            })
            .collect();
        let asset_count = universe.symbols.len();
        let total_pairs = asset_count * asset_count.saturating_sub(1) / 2;
        let mut pairs_done = 0usize;

        for i in 0..asset_count {
            for j in (i + 1)..asset_count {
                pairs_done += 1;
                for (strategy_index, strategy) in strategies.iter().enumerate() {
                    let (Some(unit_a), Some(unit_b)) = (
                        universe.runs[i][strategy_index].as_ref(),
                        universe.runs[j][strategy_index].as_ref(),
                    ) else {
                        continue;
                    };

                    let return_a = unit_a.twr_percent / years;
                    let return_b = unit_b.twr_percent / years;
                    if self.config.pruning_enabled
                        && results.is_full()
                        && closest_blend_distance(self.config.target_return, &[return_a, return_b])
                            >= results.worst_distance()
                    {
                        continue;
                    }

                    let min_len = unit_a.values.len().min(unit_b.values.len());
                    let mut accumulator = SplitAccumulator::new(scales.len());
                    for step in 0..min_len {
                        let value_a = unit_a.values[step];
                        let value_b = unit_b.values[step];
                        let invested_a = unit_a.invested[step];
                        let invested_b = unit_b.invested[step];
                        for (split, &(scale_a, scale_b)) in scales.iter().enumerate() {
                            accumulator.observe(
                                split,
                                step,
                                value_a * scale_a + value_b * scale_b,
                                invested_a * scale_a + invested_b * scale_b,
                            );
                        }
                        accumulator.finish_step(step);
                    }

                    for (split, &(scale_a, scale_b)) in scales.iter().enumerate() {
                        let metrics = accumulator.metrics(split, years);
                        let weight_a = PAIR_ALLOCATION_STEPS[split];
                        results.try_insert(OptimizationCandidate {
                            strategy: *strategy,
                            allocations: vec![
                                AllocationSlice {
                                    symbol: universe.symbols[i].clone(),
                                    weight_percent: weight_a,
                                },
                                AllocationSlice {
                                    symbol: universe.symbols[j].clone(),
                                    weight_percent: 100 - weight_a,
                                },
                            ],
                            annualized_return: metrics.annualized_return,
                            max_drawdown: metrics.max_drawdown,
                            volatility: metrics.volatility,
                            risk_score: calculate_risk_score(
                                metrics.max_drawdown,
                                metrics.volatility,
                            ),
                            total_invested: unit_a.total_invested * scale_a
                                + unit_b.total_invested * scale_b,
                            final_value: unit_a.final_value * scale_a
                                + unit_b.final_value * scale_b,
                        });
                    }
                }

                if pairs_done % PROGRESS_BATCH == 0
                    && self.yield_point(pairs_done, total_pairs, progress)
                {
                    return;
                }
            }
        }

        progress(total_pairs, total_pairs);
        self.status.set_progress(total_pairs, total_pairs);
    }

    fn search_triplets(
        &self,
        universe: &AssetUniverse,
        results: &mut RankedList,
        progress: &mut dyn FnMut(usize, usize),
    ) {
        let strategies = StrategyKind::all();
        let years = self.config.years as f64;
        let notional = self.config.default_notional;
        let splits = triple_allocation_splits();
        let scales: Vec<[f64; 3]> = splits
            .iter()
            .map(|weights| {
                [
                    notional * weights[0] as f64 / 100.0,
                    notional * weights[1] as f64 / 100.0,
                    notional * weights[2] as f64 / 100.0,
                ]
            })
            .collect();
        let asset_count = universe.symbols.len();
        let total_triplets = if asset_count >= 3 {
            asset_count * (asset_count - 1) * (asset_count - 2) / 6
        } else {
            0
        };
        let mut triplets_done = 0usize;

        for i in 0..asset_count {
            for j in (i + 1)..asset_count {
                for k in (j + 1)..asset_count {
                    triplets_done += 1;
                    for (strategy_index, strategy) in strategies.iter().enumerate() {
                        let (Some(unit_a), Some(unit_b), Some(unit_c)) = (
                            universe.runs[i][strategy_index].as_ref(),
                            universe.runs[j][strategy_index].as_ref(),
                            universe.runs[k][strategy_index].as_ref(),
                        ) else {
                            continue;
                        };

                        let blend_returns = [
                            unit_a.twr_percent / years,
                            unit_b.twr_percent / years,
                            unit_c.twr_percent / years,
                        ];
                        if self.config.pruning_enabled
                            && results.is_full()
                            && closest_blend_distance(self.config.target_return, &blend_returns)
                                >= results.worst_distance()
                        {
                            continue;
                        }

                        let min_len = unit_a
                            .values
                            .len()
                            .min(unit_b.values.len())
                            .min(unit_c.values.len());
                        let mut accumulator = SplitAccumulator::new(scales.len());
                        for step in 0..min_len {
                            let value_a = unit_a.values[step];
                            let value_b = unit_b.values[step];
                            let value_c = unit_c.values[step];
                            let invested_a = unit_a.invested[step];
                            let invested_b = unit_b.invested[step];
                            let invested_c = unit_c.invested[step];
                            for (split, scale) in scales.iter().enumerate() {
                                accumulator.observe(
                                    split,
                                    step,
                                    value_a * scale[0] + value_b * scale[1] + value_c * scale[2],
                                    invested_a * scale[0]
                                        + invested_b * scale[1]
                                        + invested_c * scale[2],
                                );
                            }
                            accumulator.finish_step(step);
                        }

                        for (split, scale) in scales.iter().enumerate() {
                            let metrics = accumulator.metrics(split, years);
                            // Three-asset search only keeps candidates at or
                            // above the target.
                            if metrics.annualized_return < self.config.target_return {
                                continue;
                            }
                            let weights = splits[split];
                            results.try_insert(OptimizationCandidate {
                                strategy: *strategy,
                                allocations: vec![
                                    AllocationSlice {
                                        symbol: universe.symbols[i].clone(),
                                        weight_percent: weights[0],
                                    },
                                    AllocationSlice {
                                        symbol: universe.symbols[j].clone(),
                                        weight_percent: weights[1],
                                    },
                                    AllocationSlice {
                                        symbol: universe.symbols[k].clone(),
                                        weight_percent: weights[2],
                                    },
                                ],
                                annualized_return: metrics.annualized_return,
                                max_drawdown: metrics.max_drawdown,
                                volatility: metrics.volatility,
                                risk_score: calculate_risk_score(
                                    metrics.max_drawdown,
                                    metrics.volatility,
                                ),
                                total_invested: unit_a.total_invested * scale[0]
                                    + unit_b.total_invested * scale[1]
                                    + unit_c.total_invested * scale[2],
                                final_value: unit_a.final_value * scale[0]
                                    + unit_b.final_value * scale[1]
                                    + unit_c.final_value * scale[2],
                            });
                        }
                    }

                    if triplets_done % PROGRESS_BATCH == 0
                        && self.yield_point(triplets_done, total_triplets, progress)
                    {
                        return;
                    }
                }
            }
        }

        progress(total_triplets, total_triplets);
        self.status.set_progress(total_triplets, total_triplets);
    }
}
