//! Tournament roster
//!
//! Expands per-family parameter grids into named variants using itertools.

use anyhow::Result;
use itertools::iproduct;
use serde_json::json;

use super::{create_strategy, Strategy, StrategyDeps};

/// One roster slot: registry family name + JSON parameters
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub family: &'static str,
    pub params: serde_json::Value,
}

impl RosterEntry {
    fn new(family: &'static str, params: serde_json::Value) -> Self {
        Self { family, params }
    }
}

/// Parameter grid of the default roster
pub fn roster_entries() -> Vec<RosterEntry> {
    let mut entries = Vec::new();

    // Momentum: trend line x breadth x sizing
    entries.extend(
        iproduct!([20usize, 50, 100, 200], [10usize, 20], ["proportional", "equal"]).map(
            |(sma_period, top_k, sizing)| {
                RosterEntry::new(
                    "momentum",
                    json!({ "sma_period": sma_period, "top_k": top_k, "sizing": sizing }),
                )
            },
        ),
    );

    entries.extend(iproduct!([14usize], [25.0f64, 30.0]).map(|(rsi_period, oversold)| {
        RosterEntry::new(
            "mean_reversion",
            json!({ "mode": "rsi", "rsi_period": rsi_period, "oversold": oversold }),
        )
    }));
    entries.extend(iproduct!([20usize], [2.0f64, 2.5]).map(|(bb_period, bb_std)| {
        RosterEntry::new(
            "mean_reversion",
            json!({ "mode": "bollinger", "bb_period": bb_period, "bb_std": bb_std }),
        )
    }));

    entries.extend([20usize, 55].into_iter().map(|lookback| {
        RosterEntry::new("volatility_breakout", json!({ "lookback": lookback }))
    }));

    entries.extend([20usize, 50].into_iter().map(|period| {
        RosterEntry::new("volume_confirmation", json!({ "mode": "vpt", "period": period }))
    }));
    entries.extend([1.5f64, 2.0].into_iter().map(|multiple| {
        RosterEntry::new(
            "volume_confirmation",
            json!({ "mode": "relative_volume", "volume_multiple": multiple }),
        )
    }));

    entries.extend([(12usize, 26usize, 9usize), (8, 21, 5)].into_iter().map(
        |(fast, slow, signal)| {
            RosterEntry::new(
                "trend_cycle",
                json!({ "fast": fast, "slow": slow, "signal": signal }),
            )
        },
    ));

    entries.extend([60usize, 120].into_iter().map(|lookback| {
        RosterEntry::new("safe_haven", json!({ "volatility_lookback": lookback }))
    }));

    entries.push(RosterEntry::new("multi_factor_ml", serde_json::Value::Null));
    entries.push(RosterEntry::new("cash", serde_json::Value::Null));

    entries
}

/// Build the default roster.
///
/// The ML variant is left out when its dependencies are not wired.
pub fn default_roster(deps: &StrategyDeps) -> Result<Vec<Box<dyn Strategy>>> {
    let ml_ready = deps.fundamentals.is_some() && deps.forecaster.is_some();

    let mut roster = Vec::new();
    for entry in roster_entries() {
        if entry.family == "multi_factor_ml" && !ml_ready {
            tracing::info!("No fundamentals/forecaster configured, ML variant left out of roster");
            continue;
        }
        roster.push(create_strategy(entry.family, &entry.params, deps)?);
    }
    Ok(roster)
}
