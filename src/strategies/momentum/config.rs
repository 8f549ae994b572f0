//! Momentum Configuration

use serde::{Deserialize, Serialize};

use crate::strategies::Sizing;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    /// Variant id override; derived from the parameters when absent
    pub id: Option<String>,

    /// Trend line SMA period (default: 20)
    pub sma_period: usize,

    /// Number of stocks held (default: 10)
    pub top_k: usize,

    /// Weighting of the selected stocks (default: proportional)
    pub sizing: Sizing,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            id: None,
            sma_period: 20,
            top_k: 10,
            sizing: Sizing::Proportional,
        }
    }
}

impl MomentumConfig {
    pub fn variant_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| {
            format!(
                "momentum_sma{}_top{}_{}",
                self.sma_period,
                self.top_k,
                self.sizing.label()
            )
        })
    }
}
