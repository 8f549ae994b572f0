//! Multi-Factor ML Configuration

use serde::{Deserialize, Serialize};

use crate::config::MlConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiFactorMlConfig {
    pub id: Option<String>,

    /// Number of stocks held (default: 10)
    pub top_k: usize,

    /// Predicted return must exceed the round-trip cost drag (default: 0.004)
    pub breakeven_return: f64,

    /// Worker threads for feature extraction + inference (default: 8)
    pub max_concurrency: usize,

    /// How long a cached fundamentals entry stays fresh (default: 1 day)
    pub fundamentals_ttl_secs: i64,
}

impl Default for MultiFactorMlConfig {
    fn default() -> Self {
        Self::from_ml(&MlConfig::default())
    }
}

impl MultiFactorMlConfig {
    pub fn from_ml(ml: &MlConfig) -> Self {
        Self {
            id: None,
            top_k: ml.top_k,
            breakeven_return: ml.breakeven_return,
            max_concurrency: ml.max_concurrency,
            fundamentals_ttl_secs: ml.fundamentals_ttl_secs,
        }
    }

    pub fn variant_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| "multi_factor_ml".to_string())
    }
}
