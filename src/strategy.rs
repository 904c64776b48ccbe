use anyhow::anyhow;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_RSI_PERIOD: usize = 14;
pub const DEFAULT_RSI_THRESHOLD: f64 = 30.0;
pub const DEFAULT_MACD_FAST: usize = 12;
pub const DEFAULT_MACD_SLOW: usize = 26;
pub const DEFAULT_MACD_SIGNAL: usize = 9;
pub const DEFAULT_CROSSOVER_SHORT: usize = 50;
pub const DEFAULT_CROSSOVER_LONG: usize = 200;

/// One of the supported buy strategies, carrying its own parameters.
/// All strategies are buy-only: positions are held to the end of the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrategyKind {
    /// Fixed amount on the first trading day of each calendar month.
    MonthlyDca,
    /// Entire amount on the first day of the window.
    LumpSum,
    /// Fixed amount whenever the price crosses down onto its EMA.
    EmaTouch { period: usize },
    /// Fixed amount on each golden cross of the short EMA over the long EMA.
    EmaCrossover {
        short_period: usize,
        long_period: usize,
    },
    /// Fixed amount when RSI drops below the oversold threshold, with a
    /// five-trading-day cooldown between signals.
    RsiReversion { period: usize, threshold: f64 },
    /// Fixed amount on each bullish MACD/signal-line crossover.
    MacdCross {
        fast: usize,
        slow: usize,
        signal: usize,
    },
}

impl StrategyKind {
    /// The default lineup evaluated by the optimizer: the eight strategies
    /// at their standard parameters.
    pub fn all() -> [StrategyKind; 8] {
        [
            StrategyKind::MonthlyDca,
            StrategyKind::LumpSum,
            StrategyKind::EmaTouch { period: 50 },
            StrategyKind::EmaTouch { period: 100 },
            StrategyKind::EmaTouch { period: 200 },
            StrategyKind::EmaCrossover {
                short_period: DEFAULT_CROSSOVER_SHORT,
                long_period: DEFAULT_CROSSOVER_LONG,
            },
            StrategyKind::RsiReversion {
                period: DEFAULT_RSI_PERIOD,
                threshold: DEFAULT_RSI_THRESHOLD,
            },
            StrategyKind::MacdCross {
                fast: DEFAULT_MACD_FAST,
                slow: DEFAULT_MACD_SLOW,
                signal: DEFAULT_MACD_SIGNAL,
            },
        ]
    }

    pub fn id(&self) -> String {
        match self {
            StrategyKind::MonthlyDca => "dca".to_string(),
            StrategyKind::LumpSum => "lump".to_string(),
            StrategyKind::EmaTouch { period } => format!("ema{}", period),
            StrategyKind::EmaCrossover { .. } => "ema_cross".to_string(),
            StrategyKind::RsiReversion { .. } => "rsi".to_string(),
            StrategyKind::MacdCross { .. } => "macd".to_string(),
        }
    }

    /// Sensible per-signal (or per-month / one-time) dollar amount used when
    /// the caller does not specify one.
    pub fn default_amount(&self) -> f64 {
        match self {
            StrategyKind::MonthlyDca => 500.0,
            StrategyKind::LumpSum => 10_000.0,
            StrategyKind::EmaTouch { .. } => 1_000.0,
            StrategyKind::EmaCrossover { .. } => 5_000.0,
            StrategyKind::RsiReversion { .. } => 1_000.0,
            StrategyKind::MacdCross { .. } => 1_000.0,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::MonthlyDca => write!(f, "Monthly DCA"),
            StrategyKind::LumpSum => write!(f, "Lump Sum"),
            StrategyKind::EmaTouch { period } => write!(f, "{} EMA Touch", period),
            StrategyKind::EmaCrossover { .. } => write!(f, "EMA Crossover"),
            StrategyKind::RsiReversion { .. } => write!(f, "RSI Mean Reversion"),
            StrategyKind::MacdCross { .. } => write!(f, "MACD Divergence"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dca" => Ok(StrategyKind::MonthlyDca),
            "lump" => Ok(StrategyKind::LumpSum),
            "ema50" => Ok(StrategyKind::EmaTouch { period: 50 }),
            "ema100" => Ok(StrategyKind::EmaTouch { period: 100 }),
            "ema200" => Ok(StrategyKind::EmaTouch { period: 200 }),
            "ema_cross" => Ok(StrategyKind::EmaCrossover {
                short_period: DEFAULT_CROSSOVER_SHORT,
                long_period: DEFAULT_CROSSOVER_LONG,
            }),
            "rsi" => Ok(StrategyKind::RsiReversion {
                period: DEFAULT_RSI_PERIOD,
                threshold: DEFAULT_RSI_THRESHOLD,
            }),
            "macd" => Ok(StrategyKind::MacdCross {
                fast: DEFAULT_MACD_FAST,
                slow: DEFAULT_MACD_SLOW,
                signal: DEFAULT_MACD_SIGNAL,
            }),
            other => Err(anyhow!("Unknown strategy '{}'", other)),
        }
    }
}

impl Serialize for StrategyKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.id())
    }
}
