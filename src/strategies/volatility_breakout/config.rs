//! Volatility Breakout Configuration

use serde::{Deserialize, Serialize};

use crate::strategies::Sizing;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityBreakoutConfig {
    pub id: Option<String>,

    /// Lookback for the high/low channel, current bar excluded (default: 20)
    pub lookback: usize,

    /// ATR period used to normalize the breakout (default: 14)
    pub atr_period: usize,

    pub top_k: usize,

    pub sizing: Sizing,
}

impl Default for VolatilityBreakoutConfig {
    fn default() -> Self {
        Self {
            id: None,
            lookback: 20,
            atr_period: 14,
            top_k: 10,
            sizing: Sizing::Proportional,
        }
    }
}

impl VolatilityBreakoutConfig {
    pub fn variant_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| {
            format!(
                "volatility_breakout_dc{}_atr{}_top{}",
                self.lookback, self.atr_period, self.top_k
            )
        })
    }
}
