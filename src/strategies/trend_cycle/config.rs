//! Trend Cycle Configuration

use serde::{Deserialize, Serialize};

use crate::strategies::Sizing;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendCycleConfig {
    pub id: Option<String>,

    /// Fast EMA period (default: 12)
    pub fast: usize,

    /// Slow EMA period (default: 26)
    pub slow: usize,

    /// Signal line EMA period (default: 9)
    pub signal: usize,

    pub top_k: usize,

    pub sizing: Sizing,
}

impl Default for TrendCycleConfig {
    fn default() -> Self {
        Self {
            id: None,
            fast: 12,
            slow: 26,
            signal: 9,
            top_k: 10,
            sizing: Sizing::Proportional,
        }
    }
}

impl TrendCycleConfig {
    pub fn variant_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| {
            format!(
                "trend_cycle_macd{}_{}_{}_top{}",
                self.fast, self.slow, self.signal, self.top_k
            )
        })
    }

    /// Bars fed to the MACD; a bounded tail keeps per-day cost flat
    pub fn window_len(&self) -> usize {
        self.slow * 4 + self.signal
    }
}
