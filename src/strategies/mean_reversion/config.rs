//! Mean Reversion Configuration

use serde::{Deserialize, Serialize};

use crate::strategies::Sizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversionMode {
    Rsi,
    Bollinger,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanReversionConfig {
    pub id: Option<String>,

    /// Oversold detector (default: RSI)
    pub mode: ReversionMode,

    /// RSI period (default: 14)
    pub rsi_period: usize,

    /// RSI below this is oversold (default: 30)
    pub oversold: f64,

    /// RSI above this is overbought (default: 70)
    pub overbought: f64,

    /// Bollinger window (default: 20)
    pub bb_period: usize,

    /// Bollinger band width in standard deviations (default: 2.0)
    pub bb_std: f64,

    pub top_k: usize,

    /// Default: equal weight
    pub sizing: Sizing,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            id: None,
            mode: ReversionMode::Rsi,
            rsi_period: 14,
            oversold: 30.0,
            overbought: 70.0,
            bb_period: 20,
            bb_std: 2.0,
            top_k: 10,
            sizing: Sizing::Equal,
        }
    }
}

impl MeanReversionConfig {
    pub fn variant_id(&self) -> String {
        if let Some(id) = &self.id {
            return id.clone();
        }
        match self.mode {
            ReversionMode::Rsi => format!(
                "mean_reversion_rsi{}_os{}_top{}",
                self.rsi_period, self.oversold, self.top_k
            ),
            ReversionMode::Bollinger => format!(
                "mean_reversion_bb{}_std{}_top{}",
                self.bb_period, self.bb_std, self.top_k
            ),
        }
    }
}
