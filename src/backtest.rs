//! Backtesting engine
//!
//! Day-by-day simulation over the union calendar of the universe. Each day
//! runs in a fixed order:
//!
//! 1. advance every symbol's cursor to the bars strictly before today
//! 2. classify the regime from the benchmark's visible window
//! 3. ask the strategy for target weights (bullish days inside the window)
//! 4. drop targets priced at or below the price floor
//! 5. trailing stops on holdings force exits the strategy cannot override
//! 6. scale sectors down to the sector cap
//! 7. rebalance at today's prices and commit
//! 8. win/loss bookkeeping per sell
//! 9. equity, drawdown and daily return tracking
//!
//! A single run is strictly sequential; runs share nothing mutable, so the
//! tournament can drive many of them in parallel from one `Backtester`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

use crate::config::{BacktestConfig, Config, ExecutionConfig};
use crate::indicators::TRADING_DAYS;
use crate::rebalancer::{Holdings, PortfolioRebalancer, Prices, RebalanceParams};
use crate::regime::RegimeFilter;
use crate::risk::RiskEngine;
use crate::slippage::SlippageModel;
use crate::strategies::{Cursors, HistoryView, Strategy, StrategyError};
use crate::{
    Allocation, BacktestResult, MarketData, PriceBar, RegimeSignal, SectorMap, Side, Symbol,
    TradeIntent,
};

pub const STOP_LOSS_REASON: &str = "Stop-Loss";

/// Daily return standard deviation below which Sharpe is reported as 0
const MIN_RETURN_STD_DEV: f64 = 1e-4;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("strategy {strategy} failed on {date}: {source}")]
    Strategy {
        strategy: String,
        date: NaiveDate,
        #[source]
        source: StrategyError,
    },

    #[error("evaluation window starts ({start}) after it ends ({end})")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },
}

/// End-of-day portfolio snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    /// Portfolio value at today's prices before any trade
    pub pre_trade_equity: f64,
    pub equity: f64,
    pub cash: f64,
    /// Commission paid today
    pub fees: f64,
    pub regime: RegimeSignal,
}

/// Full output of one run
#[derive(Debug, Clone, Default)]
pub struct BacktestReport {
    pub result: BacktestResult,
    pub equity_curve: Vec<EquityPoint>,
    /// Every executed trade in order, dated
    pub trades: Vec<TradeIntent>,
}

/// Backtest engine
#[derive(Debug, Clone)]
pub struct Backtester {
    initial_cash: f64,
    execution: ExecutionConfig,
    backtest: BacktestConfig,
    risk: RiskEngine,
    regime: RegimeFilter,
    rebalancer: PortfolioRebalancer,
    sectors: SectorMap,
    window_start: Option<NaiveDate>,
    window_end: Option<NaiveDate>,
    deterministic_slippage: bool,
}

impl Backtester {
    pub fn new(config: &Config) -> Self {
        Backtester {
            initial_cash: config.trading.initial_cash,
            execution: config.execution.clone(),
            backtest: config.backtest.clone(),
            risk: RiskEngine::new(config.risk.clone()),
            regime: RegimeFilter::new(config.regime.clone()),
            rebalancer: PortfolioRebalancer::new(RebalanceParams::from(&config.execution)),
            sectors: SectorMap::new(),
            window_start: None,
            window_end: None,
            deterministic_slippage: false,
        }
    }

    pub fn with_initial_cash(mut self, initial_cash: f64) -> Self {
        self.initial_cash = initial_cash;
        self
    }

    pub fn with_sectors(mut self, sectors: SectorMap) -> Self {
        self.sectors = sectors;
        self
    }

    /// Restrict trading and scoring to `[start, end]`; history before
    /// `start` is still visible to strategies
    pub fn with_window(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.window_start = start;
        self.window_end = end;
        self
    }

    pub fn with_deterministic_slippage(mut self, deterministic: bool) -> Self {
        self.deterministic_slippage = deterministic;
        self
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    fn in_window(&self, date: NaiveDate) -> bool {
        self.window_start.map_or(true, |start| date >= start)
            && self.window_end.map_or(true, |end| date <= end)
    }

    /// Run `strategy` over `data`, gated by `benchmark` when supplied
    pub fn run(
        &self,
        strategy: &dyn Strategy,
        data: &MarketData,
        benchmark: Option<&[PriceBar]>,
    ) -> Result<BacktestReport, BacktestError> {
        if let (Some(start), Some(end)) = (self.window_start, self.window_end) {
            if start > end {
                return Err(BacktestError::InvalidWindow { start, end });
            }
        }

        let benchmark = benchmark.filter(|b| !b.is_empty());
        let calendar = trading_calendar(data);
        let warmup = if benchmark.is_some() {
            self.backtest.warmup_with_benchmark
        } else {
            self.backtest.warmup_without_benchmark
        };

        if calendar.len() <= warmup {
            tracing::info!(
                strategy = strategy.id(),
                days = calendar.len(),
                warmup,
                "Not enough history, returning neutral result"
            );
            return Ok(BacktestReport {
                result: BacktestResult::neutral(strategy.id(), self.initial_cash),
                ..Default::default()
            });
        }

        tracing::debug!(
            strategy = strategy.id(),
            days = calendar.len() - warmup,
            symbols = data.len(),
            "Starting backtest"
        );

        strategy.begin_run();
        let mut slippage = SlippageModel::from_config(&self.execution, self.deterministic_slippage);
        let mut state = RunState::new(self.initial_cash);

        // Bars strictly before today (visible) and up to today (priced)
        let mut cursors: Cursors = data.keys().map(|s| (s.clone(), 0)).collect();
        let mut priced: HashMap<Symbol, usize> = data.keys().map(|s| (s.clone(), 0)).collect();
        let mut benchmark_cursor = 0usize;

        for &date in &calendar[warmup..] {
            // 1. Causality boundary
            for (symbol, bars) in data {
                if let Some(cursor) = cursors.get_mut(symbol) {
                    while *cursor < bars.len() && bars[*cursor].date < date {
                        *cursor += 1;
                    }
                }
                if let Some(count) = priced.get_mut(symbol) {
                    while *count < bars.len() && bars[*count].date <= date {
                        *count += 1;
                    }
                }
            }
            if let Some(bench) = benchmark {
                while benchmark_cursor < bench.len() && bench[benchmark_cursor].date < date {
                    benchmark_cursor += 1;
                }
            }

            if self.window_end.is_some_and(|end| date > end) {
                break;
            }
            if !self.in_window(date) {
                continue;
            }

            let prices = day_prices(data, &priced);

            // 2. Regime from the benchmark's visible window
            let regime = match benchmark {
                Some(bench) => self.regime.current_regime(&bench[..benchmark_cursor]),
                None => RegimeSignal::Bullish,
            };

            // 3. Strategy targets
            let mut targets = if regime == RegimeSignal::Bullish {
                let view = HistoryView::new(data, &cursors);
                let candidates: Vec<Symbol> = cursors
                    .iter()
                    .filter(|(_, cursor)| **cursor > 0)
                    .map(|(s, _)| s.clone())
                    .collect();
                strategy
                    .calculate_allocation(&candidates, &view)
                    .map_err(|source| BacktestError::Strategy {
                        strategy: strategy.id().to_string(),
                        date,
                        source,
                    })?
            } else {
                Allocation::new()
            };

            // 4. Price floor
            let min_price = self.risk.config().min_price;
            targets.retain(|symbol, weight| {
                *weight > 0.0
                    && weight.is_finite()
                    && prices.get(symbol).is_some_and(|&p| p > min_price && p.is_finite())
            });

            // 5. Trailing stops, before the sector cap so exits stay exits
            let stopped = self.apply_stops(&mut state.holdings, &mut targets, data, &cursors, &prices, date);

            // 6. Sector cap
            let targets = self
                .risk
                .cap_sector_exposure(&targets, &self.sectors, self.risk.config().sector_cap);

            // 7. Rebalance
            let pre_trade_equity = state.equity(&prices);
            if state.baseline.is_none() {
                state.baseline = Some(pre_trade_equity);
                state.prev_equity = pre_trade_equity;
                state.peak_equity = pre_trade_equity;
            }

            let outcome = self.rebalancer.calculate_trades(
                state.cash,
                &state.holdings,
                &targets,
                pre_trade_equity,
                &prices,
                &mut slippage,
            );
            state.cash = outcome.new_cash;
            state.holdings = outcome.holdings;

            // 8. Trade bookkeeping
            let mut fees = 0.0;
            for mut trade in outcome.trades {
                trade.date = Some(date);
                if trade.side == Side::Sell && stopped.contains(&trade.symbol) {
                    trade.reason = STOP_LOSS_REASON.to_string();
                }
                fees += trade.commission;
                state.record_trade(&trade);
                state.trades.push(trade);
            }

            // 9. Equity tracking
            let equity = state.equity(&prices);
            state.close_day(EquityPoint {
                date,
                pre_trade_equity,
                equity,
                cash: state.cash,
                fees,
                regime,
            });
        }

        let result = self.finalize(strategy.id(), &state, benchmark);
        tracing::debug!(
            strategy = strategy.id(),
            return_pct = result.return_pct,
            alpha = result.alpha,
            trades = result.total_trades,
            "Backtest complete"
        );

        Ok(BacktestReport {
            result,
            equity_curve: state.curve,
            trades: state.trades,
        })
    }

    /// Update peaks and drop stopped-out holdings from `targets`
    fn apply_stops(
        &self,
        holdings: &mut Holdings,
        targets: &mut Allocation,
        data: &MarketData,
        cursors: &Cursors,
        prices: &Prices,
        date: NaiveDate,
    ) -> HashSet<Symbol> {
        let mut stopped = HashSet::new();
        for (symbol, holding) in holdings.iter_mut() {
            let Some(&price) = prices.get(symbol) else {
                continue;
            };
            holding.highest_price = holding.highest_price.max(price);

            let visible = match (data.get(symbol), cursors.get(symbol)) {
                (Some(bars), Some(&cursor)) => &bars[..cursor.min(bars.len())],
                _ => &[][..],
            };
            let stop = self.risk.assess_stop(visible, holding.highest_price);
            if price < stop.stop_price {
                tracing::debug!(
                    symbol = %symbol,
                    %date,
                    price,
                    stop_price = stop.stop_price,
                    peak = holding.highest_price,
                    volatile = stop.is_volatile,
                    "Stop-loss triggered"
                );
                targets.remove(symbol);
                stopped.insert(symbol.clone());
            }
        }
        stopped
    }

    fn finalize(
        &self,
        strategy_id: &str,
        state: &RunState,
        benchmark: Option<&[PriceBar]>,
    ) -> BacktestResult {
        let (Some(baseline), Some(first), Some(last)) =
            (state.baseline, state.curve.first(), state.curve.last())
        else {
            return BacktestResult::neutral(strategy_id, self.initial_cash);
        };

        let final_value = last.equity;
        let return_pct = if baseline > 0.0 {
            (final_value - baseline) / baseline * 100.0
        } else {
            0.0
        };

        let win_rate = if state.total_trades > 0 {
            state.wins as f64 / state.total_trades as f64
        } else {
            0.0
        };

        let benchmark_return = benchmark
            .and_then(|bench| benchmark_return(bench, first.date, last.date))
            .unwrap_or(0.0);

        BacktestResult {
            strategy_id: strategy_id.to_string(),
            return_pct,
            win_rate,
            final_value,
            benchmark_return,
            alpha: return_pct - benchmark_return,
            max_drawdown: state.max_drawdown,
            sharpe_ratio: sharpe_ratio(&state.returns),
            total_trades: state.total_trades,
        }
    }
}

/// Mutable state of one run
struct RunState {
    cash: f64,
    holdings: Holdings,
    entry_prices: HashMap<Symbol, f64>,
    wins: usize,
    total_trades: usize,
    baseline: Option<f64>,
    prev_equity: f64,
    peak_equity: f64,
    max_drawdown: f64,
    returns: Vec<f64>,
    curve: Vec<EquityPoint>,
    trades: Vec<TradeIntent>,
}

impl RunState {
    fn new(cash: f64) -> Self {
        Self {
            cash,
            holdings: Holdings::new(),
            entry_prices: HashMap::new(),
            wins: 0,
            total_trades: 0,
            baseline: None,
            prev_equity: cash,
            peak_equity: cash,
            max_drawdown: 0.0,
            returns: Vec::new(),
            curve: Vec::new(),
            trades: Vec::new(),
        }
    }

    /// Cash plus holdings at `prices`; unpriced holdings count at cost
    fn equity(&self, prices: &Prices) -> f64 {
        self.cash
            + self
                .holdings
                .values()
                .map(|h| {
                    let price = prices.get(&h.symbol).copied().unwrap_or(h.average_price);
                    h.market_value(price)
                })
                .sum::<f64>()
    }

    fn record_trade(&mut self, trade: &TradeIntent) {
        self.total_trades += 1;
        match trade.side {
            Side::Buy => {
                let entry = self
                    .holdings
                    .get(&trade.symbol)
                    .map(|h| h.average_price)
                    .unwrap_or(trade.executed_price);
                self.entry_prices.insert(trade.symbol.clone(), entry);
            }
            Side::Sell => {
                if let Some(&entry) = self.entry_prices.get(&trade.symbol) {
                    if trade.executed_price >= entry {
                        self.wins += 1;
                    }
                }
                if !self.holdings.contains_key(&trade.symbol) {
                    self.entry_prices.remove(&trade.symbol);
                }
            }
        }
    }

    fn close_day(&mut self, point: EquityPoint) {
        let equity = point.equity;
        if self.prev_equity > 0.0 {
            self.returns.push((equity - self.prev_equity) / self.prev_equity);
        }
        self.prev_equity = equity;

        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        if self.peak_equity > 0.0 {
            let drawdown = (self.peak_equity - equity) / self.peak_equity * 100.0;
            self.max_drawdown = self.max_drawdown.max(drawdown);
        }
        self.curve.push(point);
    }
}

/// Sorted union of every trading date in the universe
pub fn trading_calendar(data: &MarketData) -> Vec<NaiveDate> {
    data.values()
        .flat_map(|bars| bars.iter().map(|b| b.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Last close at or before today for every symbol that has one
fn day_prices(data: &MarketData, priced: &HashMap<Symbol, usize>) -> Prices {
    data.iter()
        .filter_map(|(symbol, bars)| {
            let count = *priced.get(symbol)?;
            let bar = bars.get(count.checked_sub(1)?)?;
            Some((symbol.clone(), bar.close))
        })
        .collect::<BTreeMap<_, _>>()
}

/// Benchmark return in percent from the first close at/after `start` to the
/// last close at/before `end`
pub fn benchmark_return(benchmark: &[PriceBar], start: NaiveDate, end: NaiveDate) -> Option<f64> {
    let first = benchmark.iter().find(|b| b.date >= start)?;
    let last = benchmark.iter().rev().find(|b| b.date <= end)?;
    if first.close <= 0.0 || last.date < first.date {
        return None;
    }
    Some((last.close - first.close) / first.close * 100.0)
}

/// Annualized Sharpe ratio of daily returns (zero risk-free rate)
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().mean();
    let std_dev = returns.iter().population_std_dev();
    if std_dev > MIN_RETURN_STD_DEV && mean.is_finite() {
        mean / std_dev * TRADING_DAYS.sqrt()
    } else {
        0.0
    }
}
