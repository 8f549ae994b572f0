//! Execution slippage modeling
//!
//! Buys always fill at or above the quoted price and sells at or below it.
//! Tournament runs use the fixed rate so rankings are reproducible; single
//! simulations draw a uniform rate per fill.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ExecutionConfig;

#[derive(Debug, Clone)]
enum SlippageMode {
    Fixed { rate: f64 },
    Stochastic { min: f64, max: f64, rng: StdRng },
}

/// Converts a quoted price into a realistic fill price
#[derive(Debug, Clone)]
pub struct SlippageModel {
    mode: SlippageMode,
}

impl SlippageModel {
    /// Deterministic model applying `rate` to every fill
    pub fn fixed(rate: f64) -> Self {
        Self {
            mode: SlippageMode::Fixed { rate },
        }
    }

    /// Stochastic model drawing a rate from U(min, max) per fill
    pub fn stochastic(min: f64, max: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            mode: SlippageMode::Stochastic { min, max, rng },
        }
    }

    pub fn from_config(config: &ExecutionConfig, deterministic: bool) -> Self {
        if deterministic {
            Self::fixed(config.fixed_slippage_pct)
        } else {
            Self::stochastic(
                config.min_slippage_pct,
                config.max_slippage_pct,
                config.slippage_seed,
            )
        }
    }

    /// `price * (1 ± rate)` with the model's fixed rate
    pub fn apply_fixed_slippage(&self, price: f64, is_buy: bool) -> f64 {
        let rate = match self.mode {
            SlippageMode::Fixed { rate } => rate,
            SlippageMode::Stochastic { min, max, .. } => (min + max) / 2.0,
        };
        adjust(price, rate, is_buy)
    }

    pub fn apply_buy_slippage(&mut self, price: f64) -> f64 {
        let rate = self.next_rate();
        adjust(price, rate, true)
    }

    pub fn apply_sell_slippage(&mut self, price: f64) -> f64 {
        let rate = self.next_rate();
        adjust(price, rate, false)
    }

    fn next_rate(&mut self) -> f64 {
        match &mut self.mode {
            SlippageMode::Fixed { rate } => *rate,
            SlippageMode::Stochastic { min, max, rng } => {
                if max > min {
                    rng.gen_range(*min..=*max)
                } else {
                    *min
                }
            }
        }
    }
}

impl Default for SlippageModel {
    fn default() -> Self {
        Self::fixed(ExecutionConfig::default().fixed_slippage_pct)
    }
}

fn adjust(price: f64, rate: f64, is_buy: bool) -> f64 {
    let rate = rate.max(0.0);
    if is_buy {
        price * (1.0 + rate)
    } else {
        price * (1.0 - rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fixed_slippage_values() {
        let model = SlippageModel::fixed(0.002);
        assert!((model.apply_fixed_slippage(1000.0, true) - 1002.0).abs() < 1e-9);
        assert!((model.apply_fixed_slippage(1000.0, false) - 998.0).abs() < 1e-9);
    }

    #[test]
    fn test_stochastic_slippage_within_bounds() {
        let mut model = SlippageModel::stochastic(0.001, 0.003, Some(7));
        for _ in 0..500 {
            let buy = model.apply_buy_slippage(100.0);
            assert!((100.1 - 1e-9..=100.3 + 1e-9).contains(&buy));
            let sell = model.apply_sell_slippage(100.0);
            assert!((99.7 - 1e-9..=99.9 + 1e-9).contains(&sell));
        }
    }

    #[test]
    fn test_seeded_stochastic_is_reproducible() {
        let mut a = SlippageModel::stochastic(0.001, 0.003, Some(42));
        let mut b = SlippageModel::stochastic(0.001, 0.003, Some(42));
        for _ in 0..20 {
            assert_eq!(a.apply_buy_slippage(250.0), b.apply_buy_slippage(250.0));
        }
    }

    proptest! {
        #[test]
        fn prop_fixed_slippage_direction(price in 0.01f64..1_000_000.0) {
            let model = SlippageModel::fixed(0.002);
            prop_assert!(model.apply_fixed_slippage(price, true) > price);
            prop_assert!(price > model.apply_fixed_slippage(price, false));
        }
    }
}
