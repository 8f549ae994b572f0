//! Integration tests for the equity-strategies engine
//!
//! These tests drive the backtester, rebalancer and tournament together
//! through the public API.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate};
use serde_json::json;

use equity_strategies::backtest::{trading_calendar, Backtester, STOP_LOSS_REASON};
use equity_strategies::rebalancer::{
    Holdings, PortfolioRebalancer, RebalanceParams, REBALANCE_REASON,
};
use equity_strategies::slippage::SlippageModel;
use equity_strategies::strategies::{
    create_strategy, HistoryView, Strategy, StrategyDeps, StrategyError, StrategyFamily,
};
use equity_strategies::tournament::{Tournament, TournamentError};
use equity_strategies::{
    Allocation, Config, MarketData, PriceBar, RegimeSignal, SectorMap, Side, Signal, Symbol,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + Duration::days(i as i64)
}

/// Bars from a close series with a fixed high/low spread
fn series(symbol: &str, closes: &[f64]) -> Vec<PriceBar> {
    let symbol = Symbol::new(symbol);
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            PriceBar::new(symbol.clone(), day(i), c, c + 1.0, c - 1.0, c, 100_000.0).unwrap()
        })
        .collect()
}

fn linear(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

fn market(entries: Vec<(&str, Vec<f64>)>) -> MarketData {
    entries
        .into_iter()
        .map(|(name, closes)| (Symbol::new(name), series(name, &closes)))
        .collect()
}

fn momentum(sma_period: usize) -> Box<dyn Strategy> {
    create_strategy(
        "momentum",
        &json!({ "sma_period": sma_period }),
        &StrategyDeps::default(),
    )
    .unwrap()
}

fn zero_slippage_config() -> Config {
    let mut config = Config::default();
    config.execution.fixed_slippage_pct = 0.0;
    config
}

/// Equal-weights every candidate
struct HoldAll {
    id: &'static str,
}

impl Strategy for HoldAll {
    fn id(&self) -> &str {
        self.id
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::Momentum
    }

    fn calculate_allocation(
        &self,
        candidates: &[Symbol],
        _history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError> {
        let weight = 1.0 / candidates.len().max(1) as f64;
        Ok(candidates.iter().map(|s| (s.clone(), weight)).collect())
    }

    fn get_signal(&self, _symbol: &Symbol, _history: &[PriceBar], _index: usize) -> Signal {
        Signal::Buy
    }
}

/// Remembers the last visible date of every window it is shown
struct Recorder {
    seen: Mutex<Vec<Vec<(Symbol, Option<NaiveDate>)>>>,
}

impl Strategy for Recorder {
    fn id(&self) -> &str {
        "recorder"
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::Cash
    }

    fn calculate_allocation(
        &self,
        candidates: &[Symbol],
        history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError> {
        let snapshot = candidates
            .iter()
            .map(|s| (s.clone(), history.window(s).last().map(|b| b.date)))
            .collect();
        self.seen.lock().unwrap().push(snapshot);
        Ok(Allocation::new())
    }

    fn get_signal(&self, _symbol: &Symbol, _history: &[PriceBar], _index: usize) -> Signal {
        Signal::Hold
    }
}

struct Failing;

impl Strategy for Failing {
    fn id(&self) -> &str {
        "failing"
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::MeanReversion
    }

    fn calculate_allocation(
        &self,
        _candidates: &[Symbol],
        _history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError> {
        Err(StrategyError::Failed {
            strategy: "failing".to_string(),
            reason: "model offline".to_string(),
        })
    }

    fn get_signal(&self, _symbol: &Symbol, _history: &[PriceBar], _index: usize) -> Signal {
        Signal::Hold
    }
}

struct Panicking;

impl Strategy for Panicking {
    fn id(&self) -> &str {
        "panicking"
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::TrendCycle
    }

    fn calculate_allocation(
        &self,
        _candidates: &[Symbol],
        _history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError> {
        panic!("index out of range in feature extraction");
    }

    fn get_signal(&self, _symbol: &Symbol, _history: &[PriceBar], _index: usize) -> Signal {
        Signal::Hold
    }
}

// =============================================================================
// Backtest Scenarios
// =============================================================================

#[test]
fn test_flat_market_never_trades() {
    let data = market(vec![("FLAT", vec![100.0; 250])]);
    let backtester = Backtester::new(&Config::default()).with_initial_cash(100_000.0);

    let report = backtester.run(momentum(20).as_ref(), &data, None).unwrap();

    assert_eq!(report.result.total_trades, 0);
    assert_relative_eq!(report.result.final_value, 100_000.0);
    assert_relative_eq!(report.result.return_pct, 0.0);
    assert!(report.trades.is_empty());
}

#[test]
fn test_uptrend_beats_zero_and_alpha_matches() {
    let data = market(vec![
        ("INFY", linear(100.0, 0.5, 300)),
        ("TCS", linear(120.0, 0.5, 300)),
    ]);
    let benchmark = series("NIFTY50", &linear(10_000.0, 10.0, 300));
    let backtester = Backtester::new(&Config::default()).with_deterministic_slippage(true);

    let report = backtester
        .run(momentum(20).as_ref(), &data, Some(&benchmark))
        .unwrap();
    let result = &report.result;

    assert!(result.total_trades > 0);
    assert!(result.return_pct > 0.0, "return was {}", result.return_pct);
    assert!(result.benchmark_return > 0.0);
    assert!((result.alpha - (result.return_pct - result.benchmark_return)).abs() < 0.1);
    // Warm-up of 200 days with a benchmark
    assert_eq!(report.equity_curve.first().map(|p| p.date), Some(day(200)));
}

#[test]
fn test_crash_forces_stop_loss_exit() {
    let mut closes = linear(100.0, 1.0, 60);
    // -20% on day 50, then the climb resumes from the lower level
    for (i, close) in closes.iter_mut().enumerate().skip(50) {
        *close = (100.0 + i as f64) * 0.8;
    }
    let data = market(vec![("HDFC", closes)]);
    let backtester = Backtester::new(&Config::default()).with_deterministic_slippage(true);

    let report = backtester.run(momentum(20).as_ref(), &data, None).unwrap();

    let crash_trades: Vec<_> = report
        .trades
        .iter()
        .filter(|t| t.date == Some(day(50)))
        .collect();
    assert_eq!(crash_trades.len(), 1);
    assert_eq!(crash_trades[0].side, Side::Sell);
    assert_eq!(crash_trades[0].reason, STOP_LOSS_REASON);
    // Strategy still wanted the stock (yesterday's close was above its SMA)
    assert!(report
        .trades
        .iter()
        .any(|t| t.side == Side::Buy && t.date < Some(day(50))));
}

#[test]
fn test_scenario_buy_cannot_overspend() {
    let rebalancer = PortfolioRebalancer::new(RebalanceParams::default());
    let mut slippage = SlippageModel::fixed(0.002);
    let targets: Allocation = [(Symbol::new("X"), 1.0)].into_iter().collect();
    let prices: BTreeMap<Symbol, f64> = [(Symbol::new("X"), 1000.0)].into_iter().collect();

    let outcome = rebalancer.calculate_trades(
        30_000.0,
        &Holdings::new(),
        &targets,
        30_000.0,
        &prices,
        &mut slippage,
    );

    let outlay: f64 = outcome
        .trades
        .iter()
        .filter(|t| t.side == Side::Buy)
        .map(|t| t.net_amount)
        .sum();
    assert!(outlay <= 30_000.0 + 1e-6);
    assert!(outcome.new_cash >= -0.01);
    assert_eq!(outcome.trades.len(), 1);
}

// =============================================================================
// Engine Invariants
// =============================================================================

#[test]
fn test_equity_only_moves_by_fees_on_trade() {
    let data = market(vec![
        ("AAA", linear(100.0, 0.7, 120)),
        ("BBB", linear(300.0, -0.4, 120)),
        ("CCC", (0..120).map(|i| 200.0 + 15.0 * ((i as f64) / 6.0).sin()).collect()),
    ]);
    let backtester = Backtester::new(&zero_slippage_config()).with_deterministic_slippage(true);

    let report = backtester.run(&HoldAll { id: "hold_all" }, &data, None).unwrap();

    assert!(!report.trades.is_empty());
    for point in &report.equity_curve {
        assert_relative_eq!(
            point.equity,
            point.pre_trade_equity - point.fees,
            max_relative = 1e-9
        );
        assert!(point.cash >= -0.01);
    }
}

#[test]
fn test_strategy_never_sees_todays_bar() {
    let data = market(vec![
        ("AAA", linear(100.0, 1.0, 40)),
        ("BBB", linear(200.0, 1.0, 40)),
    ]);
    let recorder = Recorder {
        seen: Mutex::new(Vec::new()),
    };
    let backtester = Backtester::new(&Config::default());

    backtester.run(&recorder, &data, None).unwrap();

    let calendar = trading_calendar(&data);
    let seen = recorder.seen.into_inner().unwrap();
    // Warm-up of 20 days without a benchmark
    assert_eq!(seen.len(), calendar.len() - 20);
    for (offset, snapshot) in seen.iter().enumerate() {
        let today = calendar[20 + offset];
        for (_, last) in snapshot {
            assert_eq!(*last, Some(calendar[20 + offset - 1]));
            assert!(last.is_some_and(|d| d < today));
        }
    }
}

#[test]
fn test_deterministic_runs_repeat_exactly() {
    let data = market(vec![
        ("AAA", linear(100.0, 0.3, 150)),
        ("BBB", (0..150).map(|i| 150.0 + 10.0 * ((i as f64) / 9.0).cos()).collect()),
    ]);
    let backtester = Backtester::new(&Config::default()).with_deterministic_slippage(true);
    let strategy = momentum(20);

    let first = backtester.run(strategy.as_ref(), &data, None).unwrap();
    let second = backtester.run(strategy.as_ref(), &data, None).unwrap();

    assert_eq!(first.result.total_trades, second.result.total_trades);
    assert_eq!(first.result.final_value, second.result.final_value);
    assert_eq!(first.result.sharpe_ratio, second.result.sharpe_ratio);
}

#[test]
fn test_penny_stocks_are_never_bought() {
    let data = market(vec![
        ("PENNY", linear(20.0, 0.1, 60)),
        ("BLUE", linear(500.0, 1.0, 60)),
    ]);
    let backtester = Backtester::new(&Config::default()).with_deterministic_slippage(true);

    let report = backtester.run(&HoldAll { id: "hold_all" }, &data, None).unwrap();

    assert!(report.trades.iter().all(|t| t.symbol.as_str() != "PENNY"));
    assert!(report.trades.iter().any(|t| t.symbol.as_str() == "BLUE"));
}

#[test]
fn test_sector_cap_limits_same_sector_buys() {
    let data = market(vec![
        ("HDFCBANK", linear(1500.0, 1.0, 60)),
        ("ICICIBANK", linear(900.0, 1.0, 60)),
        ("KOTAKBANK", linear(1800.0, 1.0, 60)),
        ("INFY", linear(1400.0, 1.0, 60)),
    ]);
    let mut sectors = SectorMap::new();
    for bank in ["HDFCBANK", "ICICIBANK", "KOTAKBANK"] {
        sectors.insert(Symbol::new(bank), "BANK");
    }
    sectors.insert(Symbol::new("INFY"), "IT");
    let backtester = Backtester::new(&zero_slippage_config())
        .with_initial_cash(100_000.0)
        .with_deterministic_slippage(true)
        .with_sectors(sectors);

    let report = backtester.run(&HoldAll { id: "hold_all" }, &data, None).unwrap();

    let first_day = day(20);
    let bought = |sector: &[&str]| -> f64 {
        report
            .trades
            .iter()
            .filter(|t| t.date == Some(first_day) && t.side == Side::Buy)
            .filter(|t| sector.contains(&t.symbol.as_str()))
            .map(|t| t.gross_amount)
            .sum()
    };
    // 0.75 wanted in banks, scaled down to the 0.30 cap; IT's 0.25 is untouched
    assert_relative_eq!(
        bought(&["HDFCBANK", "ICICIBANK", "KOTAKBANK"]),
        30_000.0,
        max_relative = 1e-9
    );
    assert_relative_eq!(bought(&["INFY"]), 25_000.0, max_relative = 1e-9);
    assert!(report
        .trades
        .iter()
        .filter(|t| t.date == Some(first_day) && t.symbol.as_str() != "INFY")
        .all(|t| (t.gross_amount - 10_000.0).abs() < 1e-6));
}

/// Falls on trend while swinging 3% either way every day
fn volatile_decline(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let swing = if i % 2 == 0 { 1.03 } else { 0.97 };
            (10_000.0 - 10.0 * i as f64) * swing
        })
        .collect()
}

#[test]
fn test_bearish_benchmark_keeps_portfolio_in_cash() {
    let data = market(vec![
        ("INFY", linear(100.0, 0.5, 300)),
        ("TCS", linear(120.0, 0.5, 300)),
    ]);
    let benchmark = series("NIFTY50", &volatile_decline(300));
    let backtester = Backtester::new(&Config::default())
        .with_initial_cash(100_000.0)
        .with_deterministic_slippage(true);

    let report = backtester
        .run(&HoldAll { id: "hold_all" }, &data, Some(&benchmark))
        .unwrap();

    assert!(report.trades.is_empty());
    assert_eq!(report.result.total_trades, 0);
    assert_relative_eq!(report.result.final_value, 100_000.0);
    assert_eq!(report.equity_curve.len(), 100);
    assert!(report
        .equity_curve
        .iter()
        .all(|p| p.regime == RegimeSignal::Bearish));
}

#[test]
fn test_regime_turn_liquidates_held_positions() {
    let data = market(vec![
        ("INFY", linear(100.0, 0.5, 260)),
        ("TCS", linear(200.0, 0.5, 260)),
    ]);
    // Smooth climb, then a crash on day 230 that the regime sees from day 231
    let bench_closes: Vec<f64> = (0..260)
        .map(|i| if i < 230 { 10_000.0 + 10.0 * i as f64 } else { 8_000.0 })
        .collect();
    let benchmark = series("NIFTY50", &bench_closes);
    let backtester = Backtester::new(&zero_slippage_config())
        .with_initial_cash(100_000.0)
        .with_deterministic_slippage(true);

    let report = backtester
        .run(&HoldAll { id: "hold_all" }, &data, Some(&benchmark))
        .unwrap();

    let turn = day(231);
    assert!(report
        .trades
        .iter()
        .any(|t| t.side == Side::Buy && t.date < Some(turn)));

    let exits: Vec<_> = report.trades.iter().filter(|t| t.date == Some(turn)).collect();
    let mut sold: Vec<&str> = exits.iter().map(|t| t.symbol.as_str()).collect();
    sold.sort_unstable();
    assert_eq!(sold, vec!["INFY", "TCS"]);
    assert!(exits
        .iter()
        .all(|t| t.side == Side::Sell && t.reason == REBALANCE_REASON));
    assert!(report.trades.iter().all(|t| t.date <= Some(turn)));

    for point in report.equity_curve.iter().filter(|p| p.date >= turn) {
        assert_ne!(point.regime, RegimeSignal::Bullish);
        assert_relative_eq!(point.cash, point.equity, max_relative = 1e-9);
    }
    assert!(report
        .equity_curve
        .iter()
        .filter(|p| p.date < turn)
        .all(|p| p.regime == RegimeSignal::Bullish));
}

/// Counts how many runs it has been part of
struct RunCounter {
    runs: AtomicUsize,
}

impl Strategy for RunCounter {
    fn id(&self) -> &str {
        "run_counter"
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

    fn begin_run(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_each_backtest_starts_a_fresh_run() {
    let data = market(vec![("AAA", linear(100.0, 1.0, 40))]);
    let counter = RunCounter {
        runs: AtomicUsize::new(0),
    };
    let backtester = Backtester::new(&Config::default());

    backtester.run(&counter, &data, None).unwrap();
    backtester.run(&counter, &data, None).unwrap();

    assert_eq!(counter.runs.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Tournament
// =============================================================================

fn tournament_market() -> MarketData {
    market(vec![
        ("AAA", linear(100.0, 0.5, 200)),
        ("BBB", linear(400.0, -0.5, 200)),
        ("CCC", (0..200).map(|i| 250.0 + 20.0 * ((i as f64) / 10.0).sin()).collect()),
    ])
}

#[test]
fn test_tournament_isolates_failures() {
    let data = tournament_market();
    let roster: Vec<Box<dyn Strategy>> = vec![
        momentum(20),
        Box::new(Failing),
        create_strategy("cash", &json!(null), &StrategyDeps::default()).unwrap(),
        Box::new(Panicking),
        Box::new(HoldAll { id: "hold_all" }),
    ];

    let outcome = Tournament::new(&Config::default())
        .evaluate(&roster, &data, None)
        .unwrap();

    assert_eq!(outcome.ranked.len(), 3);
    let mut failed: Vec<_> = outcome.failures.iter().map(|f| f.strategy_id.as_str()).collect();
    failed.sort_unstable();
    assert_eq!(failed, vec!["failing", "panicking"]);
    assert!(!outcome.cancelled);

    let ranks: Vec<_> = outcome.ranked.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
    assert!(outcome
        .ranked
        .windows(2)
        .all(|w| w[0].score >= w[1].score));
    assert_eq!(outcome.selected.as_deref(), Some(outcome.ranked[0].strategy_id.as_str()));
    assert_eq!(outcome.split_date, Some(day(160)));
}

#[test]
fn test_tournament_cash_scores_zero_alpha() {
    let data = tournament_market();
    let roster = vec![create_strategy("cash", &json!(null), &StrategyDeps::default()).unwrap()];

    let outcome = Tournament::new(&Config::default())
        .evaluate(&roster, &data, None)
        .unwrap();

    let cash = &outcome.ranked[0];
    assert_eq!(cash.result.total_trades, 0);
    assert_relative_eq!(cash.result.alpha, 0.0);
    assert_relative_eq!(cash.score, 0.0);
}

#[test]
fn test_tournament_cancellation() {
    let data = tournament_market();
    let roster: Vec<Box<dyn Strategy>> = vec![momentum(20), momentum(50)];
    let tournament = Tournament::new(&Config::default());
    tournament
        .cancel_handle()
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let outcome = tournament.evaluate(&roster, &data, None).unwrap();

    assert!(outcome.cancelled);
    assert!(outcome.ranked.is_empty());
    assert!(outcome.selected.is_none());

    // The request was consumed; the next evaluation runs to completion
    let rerun = tournament.evaluate(&roster, &data, None).unwrap();
    assert!(!rerun.cancelled);
    assert_eq!(rerun.ranked.len(), 2);
}

#[test]
fn test_tournament_rejects_empty_inputs() {
    let data = tournament_market();
    let tournament = Tournament::new(&Config::default());

    assert!(matches!(
        tournament.evaluate(&[], &data, None),
        Err(TournamentError::NoCandidates)
    ));

    let single_day = market(vec![("AAA", vec![100.0])]);
    assert!(matches!(
        tournament.evaluate(&[momentum(20)], &single_day, None),
        Err(TournamentError::NotEnoughDays { days: 1 })
    ));
}

#[test]
fn test_non_ml_active_strategy_does_not_anchor() {
    let data = tournament_market();
    let roster: Vec<Box<dyn Strategy>> = vec![
        create_strategy("cash", &json!(null), &StrategyDeps::default()).unwrap(),
        Box::new(HoldAll { id: "hold_all" }),
    ];

    let outcome = Tournament::new(&Config::default())
        .with_active_strategy(Some("cash".to_string()))
        .evaluate(&roster, &data, None)
        .unwrap();

    assert!(!outcome.anchor_retained);
    assert_eq!(outcome.selected.as_deref(), Some(outcome.ranked[0].strategy_id.as_str()));
}
