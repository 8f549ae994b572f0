//! Walk-forward strategy tournament
//!
//! Every candidate is backtested over the trailing test slice of the
//! calendar (strategies still see the whole training prefix as history),
//! scored by fee-adjusted risk-adjusted alpha and ranked. A sticky anchor
//! then keeps an active ML strategy in control unless a challenger beats it
//! by a clear margin.
//!
//! Candidates run on a bounded rayon pool. A candidate that errors or panics
//! is dropped from the ranking and reported; the rest still complete.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use indicatif::ProgressBar;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::{trading_calendar, Backtester};
use crate::config::{Config, TournamentConfig};
use crate::strategies::{Strategy, StrategyFamily};
use crate::{BacktestResult, MarketData, PriceBar, SectorMap};

#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("no candidates to evaluate")]
    NoCandidates,

    #[error("calendar has {days} trading days, need at least 2 for a train/test split")]
    NotEnoughDays { days: usize },

    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),
}

/// Tournament score components
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    /// Alpha drag per trade, in percentage points
    pub fee_per_trade_pct: f64,
    pub sharpe_cap: f64,
    pub sharpe_weight: f64,
    pub target_bonus: f64,
    pub target_return_pct: f64,
}

impl ScoringPolicy {
    pub fn new(config: &TournamentConfig, target_return_pct: f64) -> Self {
        Self {
            fee_per_trade_pct: config.fee_per_trade_pct,
            sharpe_cap: config.sharpe_cap,
            sharpe_weight: config.sharpe_weight,
            target_bonus: config.target_bonus,
            target_return_pct,
        }
    }

    pub fn fee_adjusted_alpha(&self, result: &BacktestResult) -> f64 {
        result.alpha - result.total_trades as f64 * self.fee_per_trade_pct
    }

    /// `fee_adjusted_alpha + min(sharpe, cap) * weight + bonus if target met`
    pub fn score(&self, result: &BacktestResult) -> f64 {
        let bonus = if result.return_pct >= self.target_return_pct {
            self.target_bonus
        } else {
            0.0
        };
        self.fee_adjusted_alpha(result)
            + result.sharpe_ratio.min(self.sharpe_cap) * self.sharpe_weight
            + bonus
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    /// 1-based
    pub rank: usize,
    pub strategy_id: String,
    pub family: StrategyFamily,
    pub score: f64,
    pub fee_adjusted_alpha: f64,
    pub result: BacktestResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub strategy_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TournamentOutcome {
    /// First day of the test window
    pub split_date: Option<NaiveDate>,
    /// Best first
    pub ranked: Vec<RankedResult>,
    /// Strategy that should control the portfolio
    pub selected: Option<String>,
    /// True when the sticky anchor kept the ML strategy over a higher-ranked
    /// challenger
    pub anchor_retained: bool,
    pub failures: Vec<CandidateFailure>,
    /// True when the run was cancelled before every candidate was evaluated
    pub cancelled: bool,
}

enum Evaluation {
    Completed(BacktestResult),
    Failed(String),
    Skipped,
}

pub struct Tournament {
    config: TournamentConfig,
    policy: ScoringPolicy,
    backtester: Backtester,
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressBar>,
}

impl Tournament {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.tournament.clone(),
            policy: ScoringPolicy::new(&config.tournament, config.trading.target_return_pct),
            backtester: Backtester::new(config).with_deterministic_slippage(true),
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    pub fn with_initial_cash(mut self, initial_cash: f64) -> Self {
        self.backtester = self.backtester.with_initial_cash(initial_cash);
        self
    }

    pub fn with_target_return(mut self, target_return_pct: f64) -> Self {
        self.policy.target_return_pct = target_return_pct;
        self
    }

    pub fn with_sectors(mut self, sectors: SectorMap) -> Self {
        self.backtester = self.backtester.with_sectors(sectors);
        self
    }

    /// Strategy currently controlling the portfolio, for the sticky anchor
    pub fn with_active_strategy(mut self, active: Option<String>) -> Self {
        self.config.active_strategy = active;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Flag that stops the tournament before the next candidate starts.
    /// The evaluation that observes it clears it again.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// First date of the test slice, `None` if the calendar cannot be split
    pub fn split_date(calendar: &[NaiveDate], train_ratio: f64) -> Option<NaiveDate> {
        if calendar.len() < 2 {
            return None;
        }
        let ratio = if train_ratio.is_finite() {
            train_ratio.clamp(0.0, 1.0)
        } else {
            0.8
        };
        let index = ((calendar.len() as f64 * ratio).floor() as usize).clamp(1, calendar.len() - 1);
        calendar.get(index).copied()
    }

    /// Backtest, score and rank every candidate
    pub fn evaluate(
        &self,
        candidates: &[Box<dyn Strategy>],
        data: &MarketData,
        benchmark: Option<&[PriceBar]>,
    ) -> Result<TournamentOutcome, TournamentError> {
        if candidates.is_empty() {
            return Err(TournamentError::NoCandidates);
        }
        let calendar = trading_calendar(data);
        let split = Self::split_date(&calendar, self.config.train_ratio)
            .ok_or(TournamentError::NotEnoughDays {
                days: calendar.len(),
            })?;

        tracing::info!(
            candidates = candidates.len(),
            %split,
            workers = self.config.max_workers,
            "Starting tournament"
        );

        let backtester = self.backtester.clone().with_window(Some(split), None);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_workers.max(1))
            .thread_name(|i| format!("tournament-{i}"))
            .build()
            .map_err(|e| TournamentError::WorkerPool(e.to_string()))?;

        let evaluations: Vec<Evaluation> = pool.install(|| {
            candidates
                .par_iter()
                .map(|strategy| {
                    if self.cancel.load(Ordering::SeqCst) {
                        return Evaluation::Skipped;
                    }
                    let run = catch_unwind(AssertUnwindSafe(|| {
                        backtester.run(strategy.as_ref(), data, benchmark)
                    }));
                    if let Some(pb) = &self.progress {
                        pb.inc(1);
                    }
                    match run {
                        Ok(Ok(report)) => Evaluation::Completed(report.result),
                        Ok(Err(e)) => Evaluation::Failed(e.to_string()),
                        Err(panic) => Evaluation::Failed(panic_message(panic.as_ref())),
                    }
                })
                .collect()
        });

        let mut outcome = TournamentOutcome {
            split_date: Some(split),
            ..Default::default()
        };

        for (strategy, evaluation) in candidates.iter().zip(evaluations) {
            match evaluation {
                Evaluation::Completed(result) => outcome.ranked.push(RankedResult {
                    rank: 0,
                    strategy_id: strategy.id().to_string(),
                    family: strategy.family(),
                    score: self.policy.score(&result),
                    fee_adjusted_alpha: self.policy.fee_adjusted_alpha(&result),
                    result,
                }),
                Evaluation::Failed(reason) => {
                    tracing::warn!(strategy = strategy.id(), %reason, "Candidate failed, dropped from ranking");
                    outcome.failures.push(CandidateFailure {
                        strategy_id: strategy.id().to_string(),
                        reason,
                    });
                }
                Evaluation::Skipped => outcome.cancelled = true,
            }
        }

        // One-shot: the cancel request is consumed by the run that honoured it
        if outcome.cancelled {
            self.cancel.store(false, Ordering::SeqCst);
        }

        rank(&mut outcome.ranked);
        let (selected, anchor_retained) = self.select(&outcome.ranked);
        outcome.selected = selected;
        outcome.anchor_retained = anchor_retained;

        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
        tracing::info!(
            ranked = outcome.ranked.len(),
            failures = outcome.failures.len(),
            cancelled = outcome.cancelled,
            selected = outcome.selected.as_deref().unwrap_or("-"),
            anchor_retained = outcome.anchor_retained,
            "Tournament complete"
        );

        Ok(outcome)
    }

    /// Pick the winner, applying the sticky ML anchor.
    ///
    /// When the active strategy is an ML variant that completed, it stays
    /// selected unless the best non-cash, non-ML challenger's alpha exceeds
    /// `ml_alpha * multiplier` (positive ML alpha) or `ml_alpha + margin`
    /// (otherwise).
    pub fn select(&self, ranked: &[RankedResult]) -> (Option<String>, bool) {
        let top = ranked.first().map(|r| r.strategy_id.clone());

        let Some(active) = self.config.active_strategy.as_deref() else {
            return (top, false);
        };
        let Some(ml) = ranked
            .iter()
            .find(|r| r.strategy_id == active && r.family == StrategyFamily::MultiFactorMl)
        else {
            return (top, false);
        };

        let ml_alpha = ml.result.alpha;
        let threshold = if ml_alpha > 0.0 {
            ml_alpha * self.config.sticky_alpha_multiplier
        } else {
            ml_alpha + self.config.sticky_alpha_margin
        };
        let challenger = ranked.iter().find(|r| {
            r.family != StrategyFamily::Cash && r.family != StrategyFamily::MultiFactorMl
        });

        let retain = match challenger {
            None => true,
            Some(c) => c.result.alpha <= threshold,
        };
        if retain {
            let overrode = ml.rank != 1;
            if overrode {
                tracing::info!(
                    strategy = %ml.strategy_id,
                    ml_alpha,
                    threshold,
                    "Sticky anchor keeps ML strategy over higher-ranked challenger"
                );
            }
            (Some(ml.strategy_id.clone()), overrode)
        } else {
            (top, false)
        }
    }
}

/// Sort by score descending (ties by id) and number the ranks
fn rank(results: &mut [RankedResult]) {
    results.sort_by(|a, b| {
        OrderedFloat(b.score)
            .cmp(&OrderedFloat(a.score))
            .then_with(|| a.strategy_id.cmp(&b.strategy_id))
    });
    for (i, r) in results.iter_mut().enumerate() {
        r.rank = i + 1;
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}
