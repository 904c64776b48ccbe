//! Indicator math over daily closing prices. Every function returns a series
//! aligned index-for-index with its input; `None` marks the warm-up period
//! before enough history exists.

pub fn calculate_ema(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_values: Vec<Option<f64>> = vec![None; period - 1];
    let mut ema = prices[..period].iter().sum::<f64>() / period as f64;
    ema_values.push(Some(ema));

    for &price in &prices[period..] {
        ema = (price - ema) * multiplier + ema;
        ema_values.push(Some(ema));
    }

    ema_values
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    // Zero average loss means pure gains over the lookback: pin RSI at 100
    // instead of dividing by zero.
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Wilder-smoothed RSI. The first `period` entries are warm-up.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || prices.len() < period + 1 {
        return Vec::new();
    }

    let mut rsi_values: Vec<Option<f64>> = vec![None; period];
    let mut avg_gain = 0.0f64;
    let mut avg_loss = 0.0f64;
    for i in 1..=period {
        let change = prices[i] - prices[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    rsi_values.push(Some(rsi_from_averages(avg_gain, avg_loss)));

    for i in (period + 1)..prices.len() {
        let change = prices[i] - prices[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        rsi_values.push(Some(rsi_from_averages(avg_gain, avg_loss)));
    }

    rsi_values
}

pub struct MacdOutput {
    pub macd_line: Vec<Option<f64>>,
    pub signal_line: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

pub fn calculate_macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Option<MacdOutput> {
    let fast_ema = calculate_ema(prices, fast_period);
    let slow_ema = calculate_ema(prices, slow_period);
    if fast_ema.is_empty() || slow_ema.is_empty() {
        return None;
    }

    let macd_line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|pair| match pair {
            (Some(fast), Some(slow)) => Some(fast - slow),
            _ => None,
        })
        .collect();

    // The defined region of the MACD line is a contiguous suffix; the signal
    // line is an EMA over that region scattered back into full alignment.
    let first_defined = macd_line.iter().position(Option::is_some);
    let mut signal_line: Vec<Option<f64>> = vec![None; prices.len()];
    if let Some(offset) = first_defined {
        let defined: Vec<f64> = macd_line[offset..].iter().filter_map(|v| *v).collect();
        for (i, value) in calculate_ema(&defined, signal_period)
            .into_iter()
            .enumerate()
        {
            signal_line[offset + i] = value;
        }
    }

    let histogram: Vec<Option<f64>> = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|pair| match pair {
            (Some(macd), Some(signal)) => Some(macd - signal),
            _ => None,
        })
        .collect();

    Some(MacdOutput {
        macd_line,
        signal_line,
        histogram,
    })
}
