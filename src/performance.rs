use crate::models::TrajectoryPoint;
use statrs::statistics::Statistics;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Max drawdown and annualized volatility produced in one pass over a flat
/// value buffer (see [`compute_risk_from_values`]).
#[derive(Debug, Clone, Copy)]
pub struct RiskProfile {
    pub max_drawdown: f64,
    pub volatility: f64,
}

/// Worst peak-to-trough decline over a trajectory, in percent (<= 0).
pub fn compute_max_drawdown(trajectory: &[TrajectoryPoint]) -> f64 {
    let mut peak = 0.0f64;
    let mut max_drawdown = 0.0f64;
    for point in trajectory {
        if point.value > peak {
            peak = point.value;
        }
        if peak > 0.0 {
            let drawdown = (point.value - peak) / peak;
            if drawdown < max_drawdown {
                max_drawdown = drawdown;
            }
        }
    }
    max_drawdown * 100.0
}

/// Time-weighted return over the whole trajectory, in percent.
///
/// Chain-links sub-period returns between cash flows so that contribution
/// timing does not distort the comparison between lump-sum and periodic-buy
/// strategies. Sub-periods whose start value is non-positive are skipped.
pub fn calculate_twr(trajectory: &[TrajectoryPoint]) -> f64 {
    if trajectory.len() < 2 {
        return 0.0;
    }
    let mut twr = 1.0f64;
    for window in trajectory.windows(2) {
        let cash_flow = window[1].invested - window[0].invested;
        let start_value = window[0].value + cash_flow;
        if start_value > 0.0 {
            twr *= window[1].value / start_value;
        }
    }
    (twr - 1.0) * 100.0
}

/// Annualized population standard deviation of day-over-day simple returns,
/// in percent. Steps with a non-positive starting value are skipped.
pub fn estimate_annualized_volatility(values: &[f64]) -> f64 {
    let returns: Vec<f64> = values
        .windows(2)
        .filter(|window| window[0] > 0.0)
        .map(|window| (window[1] - window[0]) / window[0])
        .collect();
    if returns.is_empty() {
        return 0.0;
    }
    returns.population_std_dev() * TRADING_DAYS_PER_YEAR.sqrt() * 100.0
}

/// Linear blend of drawdown magnitude and volatility. A ranking heuristic,
/// not a risk-adjusted-return measure.
pub fn calculate_risk_score(max_drawdown: f64, volatility: f64) -> f64 {
    max_drawdown.abs() * 0.6 + volatility * 0.4
}

/// Drawdown and volatility from a flat value buffer in a single pass, using
/// running peak and return-moment accumulators. This is the form the
/// optimizer inner loop relies on; it matches [`compute_max_drawdown`] and
/// [`estimate_annualized_volatility`] applied separately.
pub fn compute_risk_from_values(values: &[f64]) -> RiskProfile {
    let mut peak = 0.0f64;
    let mut max_dd = 0.0f64;
    let mut prev_value = 0.0f64;
    let mut sum_ret = 0.0f64;
    let mut sum_ret_sq = 0.0f64;
    let mut ret_count = 0usize;

    for (i, &value) in values.iter().enumerate() {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let drawdown = (value - peak) / peak;
            if drawdown < max_dd {
                max_dd = drawdown;
            }
        }
        if i > 0 && prev_value > 0.0 {
            let r = (value - prev_value) / prev_value;
            sum_ret += r;
            sum_ret_sq += r * r;
            ret_count += 1;
        }
        prev_value = value;
    }

    let mean_ret = if ret_count > 0 {
        sum_ret / ret_count as f64
    } else {
        0.0
    };
    let variance = if ret_count > 0 {
        sum_ret_sq / ret_count as f64 - mean_ret * mean_ret
    } else {
        0.0
    };

    RiskProfile {
        max_drawdown: max_dd * 100.0,
        volatility: variance.max(0.0).sqrt() * TRADING_DAYS_PER_YEAR.sqrt() * 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn trajectory_from_values(values: &[f64]) -> Vec<TrajectoryPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| TrajectoryPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                value,
                invested: 100.0,
            })
            .collect()
    }

    #[test]
    fn drawdown_is_zero_on_rising_values() {
        let trajectory = trajectory_from_values(&[100.0, 110.0, 125.0, 140.0]);
        assert_eq!(compute_max_drawdown(&trajectory), 0.0);
    }

    #[test]
    fn drawdown_halving_is_minus_fifty() {
        let trajectory = trajectory_from_values(&[100.0, 50.0]);
        assert!((compute_max_drawdown(&trajectory) + 50.0).abs() < 1e-12);
    }

    #[test]
    fn twr_without_cash_flows_matches_price_return() {
        let trajectory = trajectory_from_values(&[100.0, 120.0, 90.0, 135.0]);
        let expected = (135.0 / 100.0 - 1.0) * 100.0;
        assert!((calculate_twr(&trajectory) - expected).abs() < 1e-9);
    }

    #[test]
    fn twr_neutralizes_contribution_timing() {
        // Same per-period growth, very different contribution schedules.
        let lump = vec![
            TrajectoryPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                value: 1000.0,
                invested: 1000.0,
            },
            TrajectoryPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                value: 1100.0,
                invested: 1000.0,
            },
            TrajectoryPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                value: 1210.0,
                invested: 1000.0,
            },
        ];
        let periodic = vec![
            TrajectoryPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                value: 500.0,
                invested: 500.0,
            },
            TrajectoryPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                value: 1100.0,
                invested: 1000.0,
            },
            TrajectoryPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                value: 1210.0,
                invested: 1000.0,
            },
        ];
        let twr_lump = calculate_twr(&lump);
        let twr_periodic = calculate_twr(&periodic);
        assert!((twr_lump - 21.0).abs() < 1e-9);
        assert!((twr_lump - twr_periodic).abs() < 1e-9);
    }

    #[test]
    fn risk_score_blends_drawdown_and_volatility() {
        assert!((calculate_risk_score(-20.0, 10.0) - 16.0).abs() < 1e-12);
        assert_eq!(calculate_risk_score(0.0, 0.0), 0.0);
    }

    #[test]
    fn single_pass_risk_matches_separate_computations() {
        let values = [100.0, 104.0, 98.0, 103.0, 95.0, 110.0, 108.0];
        let risk = compute_risk_from_values(&values);
        let trajectory = trajectory_from_values(&values);
        assert!((risk.max_drawdown - compute_max_drawdown(&trajectory)).abs() < 1e-9);
        assert!((risk.volatility - estimate_annualized_volatility(&values)).abs() < 1e-9);
    }

    #[test]
    fn empty_buffer_reports_no_risk() {
        let risk = compute_risk_from_values(&[]);
        assert_eq!(risk.max_drawdown, 0.0);
        assert_eq!(risk.volatility, 0.0);
    }
}
