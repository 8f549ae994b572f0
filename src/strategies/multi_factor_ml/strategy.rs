//! Multi-Factor ML Strategy
//!
//! Per candidate: fundamentals -> feature vector -> prediction. A prediction
//! is eligible only above the breakeven return; the top K eligible stocks
//! are held at equal weight.
//!
//! Fundamentals go through a TTL cache owned by this strategy and cleared at
//! the start of every backtest. They are fetched on the calling thread; only
//! feature extraction and inference fan out on the private bounded rayon
//! pool. `par_iter().collect()` keeps input order and the final ranking
//! sorts by prediction then symbol, so completion order never leaks into
//! the result.

use std::sync::Arc;

use chrono::Duration;
use rayon::prelude::*;

use crate::forecast::{extract_features, Forecaster};
use crate::fundamentals::{CachedFundamentals, Clock, Fundamentals, FundamentalsProvider};
use crate::strategies::{
    allocate, signal_window, HistoryView, ScoredCandidate, Sizing, Strategy, StrategyError,
    StrategyFamily,
};
use crate::{Allocation, PriceBar, Signal, Symbol};

use super::config::MultiFactorMlConfig;

pub struct MultiFactorMlStrategy {
    id: String,
    config: MultiFactorMlConfig,
    fundamentals: CachedFundamentals<Arc<dyn FundamentalsProvider>>,
    forecaster: Arc<dyn Forecaster>,
    pool: rayon::ThreadPool,
}

impl MultiFactorMlStrategy {
    pub fn new(
        config: MultiFactorMlConfig,
        fundamentals: Arc<dyn FundamentalsProvider>,
        forecaster: Arc<dyn Forecaster>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StrategyError> {
        if config.top_k == 0 || !config.breakeven_return.is_finite() {
            return Err(StrategyError::InvalidParams(
                "multi_factor_ml needs top_k > 0 and a finite breakeven".to_string(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrency.max(1))
            .thread_name(|i| format!("ml-inference-{i}"))
            .build()
            .map_err(|e| StrategyError::WorkerPool(e.to_string()))?;
        let ttl = Duration::seconds(config.fundamentals_ttl_secs.max(0));

        Ok(Self {
            id: config.variant_id(),
            config,
            fundamentals: CachedFundamentals::new(fundamentals, ttl, clock),
            forecaster,
            pool,
        })
    }

    /// Predicted forward return, `None` when features or the forecast are unavailable
    fn predict(&self, symbol: &Symbol, bars: &[PriceBar], fundamentals: &Fundamentals) -> Option<f64> {
        let features = extract_features(bars, fundamentals)?;
        let prediction = self.forecaster.predict(&features);
        if prediction.is_nan() {
            tracing::debug!(symbol = %symbol, "Forecaster returned no prediction");
            return None;
        }
        Some(prediction)
    }
}

impl Strategy for MultiFactorMlStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::MultiFactorMl
    }

    fn calculate_allocation(
        &self,
        candidates: &[Symbol],
        history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError> {
        let inputs: Vec<(&Symbol, Fundamentals)> = candidates
            .iter()
            .filter_map(|symbol| Some((symbol, self.fundamentals.fundamentals(symbol)?)))
            .collect();

        let breakeven = self.config.breakeven_return;
        let scored: Vec<ScoredCandidate> = self.pool.install(|| {
            inputs
                .par_iter()
                .filter_map(|(symbol, fundamentals)| {
                    let prediction = self.predict(symbol, history.window(symbol), fundamentals)?;
                    (prediction > breakeven)
                        .then(|| ScoredCandidate::new((*symbol).clone(), prediction))
                })
                .collect()
        });

        Ok(allocate(scored, self.config.top_k, Sizing::Equal))
    }

    fn get_signal(&self, symbol: &Symbol, history: &[PriceBar], index: usize) -> Signal {
        let breakeven = self.config.breakeven_return;
        let prediction = self
            .fundamentals
            .fundamentals(symbol)
            .and_then(|f| self.predict(symbol, signal_window(history, index), &f));
        match prediction {
            Some(p) if p > breakeven => Signal::Buy,
            Some(p) if p < -breakeven => Signal::Sell,
            _ => Signal::Hold,
        }
    }

    fn begin_run(&self) {
        self.fundamentals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::FeatureVector;
    use crate::fundamentals::{ManualClock, StaticFundamentals, SystemClock};
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::strategies::cursors_at_end;
    use crate::MarketData;
    use chrono::{NaiveDate, Utc};

    fn series(symbol: &str, slope: f64, n: usize) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let c = 100.0 + slope * i as f64;
                PriceBar::new_unchecked(
                    Symbol::new(symbol),
                    start + Duration::days(i as i64),
                    c,
                    c + 1.0,
                    c - 1.0,
                    c,
                    1000.0,
                )
            })
            .collect()
    }

    fn fundamentals() -> Fundamentals {
        Fundamentals {
            return_on_equity: 0.2,
            debt_to_equity: 0.3,
            market_cap: 1e11,
            trailing_pe: 25.0,
            book_value: 100.0,
        }
    }

    fn universe() -> MarketData {
        [
            (Symbol::new("AAA"), series("AAA", 0.5, 220)),
            (Symbol::new("BBB"), series("BBB", 0.01, 220)),
            (Symbol::new("CCC"), series("CCC", 0.5, 220)),
            (Symbol::new("NOFUND"), series("NOFUND", 1.0, 220)),
            (Symbol::new("SHORT"), series("SHORT", 1.0, 50)),
        ]
        .into_iter()
        .collect()
    }

    fn strategy(top_k: usize) -> MultiFactorMlStrategy {
        let mut provider = StaticFundamentals::default();
        for name in ["AAA", "BBB", "CCC", "SHORT"] {
            provider.insert(Symbol::new(name), fundamentals());
        }
        // Prediction grows with the trend ratio
        let forecaster = |f: &FeatureVector| (f.sma_ratio - 1.0) / 10.0;
        MultiFactorMlStrategy::new(
            MultiFactorMlConfig {
                top_k,
                max_concurrency: 3,
                ..Default::default()
            },
            Arc::new(provider),
            Arc::new(forecaster),
            Arc::new(SystemClock),
        )
        .unwrap()
    }

    #[test]
    fn test_skips_missing_inputs_and_weights_equally() {
        let data = universe();
        let cursors = cursors_at_end(&data);
        let view = HistoryView::new(&data, &cursors);
        let candidates: Vec<Symbol> = data.keys().cloned().collect();

        let allocation = strategy(10).calculate_allocation(&candidates, &view).unwrap();

        // NOFUND has no fundamentals, SHORT has too little history,
        // BBB's prediction sits below breakeven
        let held: Vec<_> = allocation.keys().map(|s| s.as_str()).collect();
        assert_eq!(held, vec!["AAA", "CCC"]);
        assert!(allocation.values().all(|w| (w - 0.5).abs() < 1e-9));
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let data = universe();
        let cursors = cursors_at_end(&data);
        let view = HistoryView::new(&data, &cursors);
        let candidates: Vec<Symbol> = data.keys().rev().cloned().collect();

        let strategy = strategy(1);
        let first = strategy.calculate_allocation(&candidates, &view).unwrap();
        for _ in 0..5 {
            assert_eq!(strategy.calculate_allocation(&candidates, &view).unwrap(), first);
        }
        // AAA and CCC tie, symbol order breaks it
        assert_eq!(first.keys().collect::<Vec<_>>(), vec![&Symbol::new("AAA")]);
    }

    #[test]
    fn test_nan_prediction_is_skipped() {
        let mut provider = StaticFundamentals::default();
        provider.insert(Symbol::new("AAA"), fundamentals());
        let strategy = MultiFactorMlStrategy::new(
            MultiFactorMlConfig::default(),
            Arc::new(provider),
            Arc::new(|_: &FeatureVector| f64::NAN),
            Arc::new(SystemClock),
        )
        .unwrap();
        let data = universe();
        let cursors = cursors_at_end(&data);
        let view = HistoryView::new(&data, &cursors);

        let allocation = strategy
            .calculate_allocation(&[Symbol::new("AAA")], &view)
            .unwrap();
        assert!(allocation.is_empty());
        let bars = &data[&Symbol::new("AAA")];
        assert_eq!(strategy.get_signal(&Symbol::new("AAA"), bars, 219), Signal::Hold);
    }

    /// Source that can go offline mid-run
    struct FlakyFundamentals {
        online: AtomicBool,
    }

    impl FundamentalsProvider for FlakyFundamentals {
        fn fundamentals(&self, _symbol: &Symbol) -> Option<Fundamentals> {
            self.online.load(Ordering::SeqCst).then(fundamentals)
        }
    }

    #[test]
    fn test_stale_fundamentals_served_within_run_and_dropped_between_runs() {
        let source = Arc::new(FlakyFundamentals {
            online: AtomicBool::new(true),
        });
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let strategy = MultiFactorMlStrategy::new(
            MultiFactorMlConfig {
                fundamentals_ttl_secs: 3600,
                ..Default::default()
            },
            source.clone(),
            Arc::new(|f: &FeatureVector| (f.sma_ratio - 1.0) / 10.0),
            clock.clone(),
        )
        .unwrap();
        let data = universe();
        let cursors = cursors_at_end(&data);
        let view = HistoryView::new(&data, &cursors);
        let candidates = vec![Symbol::new("AAA")];

        strategy.begin_run();
        assert_eq!(strategy.calculate_allocation(&candidates, &view).unwrap().len(), 1);

        // Source drops out after the entry expired: the stale entry still counts
        source.online.store(false, Ordering::SeqCst);
        clock.advance(Duration::hours(2));
        assert_eq!(strategy.calculate_allocation(&candidates, &view).unwrap().len(), 1);

        // A new run starts with an empty cache, so nothing is left to fall back on
        strategy.begin_run();
        assert!(strategy.calculate_allocation(&candidates, &view).unwrap().is_empty());
    }

    #[test]
    fn test_registry_requires_dependencies() {
        let result = crate::strategies::create_strategy(
            "multi_factor_ml",
            &serde_json::Value::Null,
            &crate::strategies::StrategyDeps::default(),
        );
        assert!(result.is_err());
    }
}
