//! Cash Strategy
//!
//! All-cash baseline. Always returns an empty allocation so the tournament
//! has a zero-risk reference point.

use super::{parse_params, HistoryView, Strategy, StrategyDeps, StrategyError, StrategyFamily};
use crate::{Allocation, PriceBar, Signal, Symbol};
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CashConfig {
    pub id: Option<String>,
}

pub struct CashStrategy {
    id: String,
}

impl CashStrategy {
    pub fn new(config: CashConfig) -> Self {
        Self {
            id: config.id.unwrap_or_else(|| "cash".to_string()),
        }
    }
}

impl Strategy for CashStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::Cash
    }

    fn calculate_allocation(
        &self,
        _candidates: &[Symbol],
        _history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError> {
        Ok(Allocation::new())
    }

    fn get_signal(&self, _symbol: &Symbol, _history: &[PriceBar], _index: usize) -> Signal {
        Signal::Hold
    }
}

/// Create strategy from parameters (called by registry)
pub fn create(params: &serde_json::Value, _deps: &StrategyDeps) -> Result<Box<dyn Strategy>> {
    let config: CashConfig = parse_params(params).map_err(|e| anyhow::anyhow!("cash: {}", e))?;
    Ok(Box::new(CashStrategy::new(config)))
}
