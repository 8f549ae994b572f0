//! Safe Haven Configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeHavenConfig {
    pub id: Option<String>,

    /// Bars used for the volatility estimate (default: 60)
    pub volatility_lookback: usize,

    /// Trend filter SMA period, 0 = disabled (default: 50)
    pub trend_period: usize,

    /// Number of stocks held (default: 10)
    pub top_k: usize,
}

impl Default for SafeHavenConfig {
    fn default() -> Self {
        Self {
            id: None,
            volatility_lookback: 60,
            trend_period: 50,
            top_k: 10,
        }
    }
}

impl SafeHavenConfig {
    pub fn variant_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| {
            format!(
                "safe_haven_vol{}_sma{}_top{}",
                self.volatility_lookback, self.trend_period, self.top_k
            )
        })
    }
}
