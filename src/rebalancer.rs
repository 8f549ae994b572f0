//! Portfolio rebalancer
//!
//! Turns target weights, holdings and cash into an ordered list of trades.
//! All sells run before any buy, and buys are scaled down to the cash on
//! hand, so a rebalance can never take cash below zero.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ExecutionConfig;
use crate::slippage::SlippageModel;
use crate::{Allocation, Holding, Side, Symbol, TradeIntent};

/// Open positions by symbol
pub type Holdings = BTreeMap<Symbol, Holding>;

/// Quoted prices for the trading day
pub type Prices = BTreeMap<Symbol, f64>;

pub const REBALANCE_REASON: &str = "Rebalance";

/// Trade thresholds and costs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebalanceParams {
    pub commission_pct: f64,
    pub min_trade_value: f64,
    pub min_alloc_change_pct: f64,
}

impl Default for RebalanceParams {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for RebalanceParams {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            commission_pct: config.commission_pct,
            min_trade_value: config.min_trade_value,
            min_alloc_change_pct: config.min_alloc_change_pct,
        }
    }
}

/// Result of one rebalance; the caller commits it
#[derive(Debug, Clone, Default)]
pub struct RebalanceOutcome {
    pub new_cash: f64,
    pub holdings: Holdings,
    pub trades: Vec<TradeIntent>,
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioRebalancer {
    params: RebalanceParams,
}

impl PortfolioRebalancer {
    pub fn new(params: RebalanceParams) -> Self {
        Self { params }
    }

    fn worth_trading(&self, value_change: f64, total_value: f64) -> bool {
        value_change > self.params.min_trade_value
            && total_value > 0.0
            && value_change / total_value > self.params.min_alloc_change_pct
    }

    /// Compute the trades moving `holdings` towards `targets`.
    ///
    /// A held symbol whose target is zero or absent is sold in full,
    /// regardless of the trade thresholds. Symbols without a positive
    /// finite price are left untouched.
    pub fn calculate_trades(
        &self,
        cash: f64,
        holdings: &Holdings,
        targets: &Allocation,
        total_value: f64,
        prices: &Prices,
        slippage: &mut SlippageModel,
    ) -> RebalanceOutcome {
        let mut cash = cash.max(0.0);
        let mut holdings = holdings.clone();
        let mut trades = Vec::new();

        let symbols: BTreeSet<Symbol> = targets.keys().chain(holdings.keys()).cloned().collect();
        let priced: Vec<(Symbol, f64)> = symbols
            .into_iter()
            .filter_map(|symbol| match prices.get(&symbol) {
                Some(&p) if p > 0.0 && p.is_finite() => Some((symbol, p)),
                _ => None,
            })
            .collect();

        let target_value = |symbol: &Symbol| {
            let weight = targets.get(symbol).copied().unwrap_or(0.0);
            if weight.is_finite() {
                weight.max(0.0) * total_value
            } else {
                0.0
            }
        };

        // Pass 1: sells
        for (symbol, price) in &priced {
            let Some(holding) = holdings.get_mut(symbol) else {
                continue;
            };
            let target = target_value(symbol);
            let current = holding.market_value(*price);
            let full_exit = target <= 0.0;

            let quantity = if full_exit {
                holding.quantity
            } else {
                let excess = current - target;
                if !self.worth_trading(excess, total_value) {
                    continue;
                }
                (excess / price).min(holding.quantity)
            };
            if quantity <= 0.0 {
                continue;
            }

            let executed = slippage.apply_sell_slippage(*price);
            let gross = quantity * executed;
            let commission = gross * self.params.commission_pct;
            let net = gross - commission;
            cash += net;

            holding.quantity -= quantity;
            if holding.is_closed() {
                holdings.remove(symbol);
            }

            tracing::debug!(symbol = %symbol, quantity, executed, full_exit, "Sell");
            trades.push(TradeIntent {
                date: None,
                symbol: symbol.clone(),
                side: Side::Sell,
                quantity,
                quoted_price: *price,
                executed_price: executed,
                gross_amount: gross,
                commission,
                net_amount: net,
                reason: REBALANCE_REASON.to_string(),
            });
        }

        // Pass 2: buys
        for (symbol, price) in &priced {
            let target = target_value(symbol);
            let current = holdings
                .get(symbol)
                .map(|h| h.market_value(*price))
                .unwrap_or(0.0);
            let shortfall = target - current;
            if !self.worth_trading(shortfall, total_value) {
                continue;
            }

            let executed = slippage.apply_buy_slippage(*price);
            let mut gross = shortfall;
            if gross * (1.0 + self.params.commission_pct) > cash {
                gross = cash / (1.0 + self.params.commission_pct);
            }
            if gross < self.params.min_trade_value || gross <= 0.0 {
                tracing::debug!(symbol = %symbol, gross, cash, "Buy too small after cash scaling");
                continue;
            }

            let quantity = gross / executed;
            let commission = gross * self.params.commission_pct;
            let net = gross + commission;
            cash = (cash - net).max(0.0);

            holdings
                .entry(symbol.clone())
                .and_modify(|h| h.add(quantity, executed))
                .or_insert_with(|| Holding::new(symbol.clone(), quantity, executed));

            tracing::debug!(symbol = %symbol, quantity, executed, "Buy");
            trades.push(TradeIntent {
                date: None,
                symbol: symbol.clone(),
                side: Side::Buy,
                quantity,
                quoted_price: *price,
                executed_price: executed,
                gross_amount: gross,
                commission,
                net_amount: net,
                reason: REBALANCE_REASON.to_string(),
            });
        }

        RebalanceOutcome {
            new_cash: cash,
            holdings,
            trades,
        }
    }
}

/// Current portfolio weights at `prices`
pub fn current_weights(holdings: &Holdings, prices: &Prices, total_value: f64) -> Allocation {
    if total_value <= 0.0 {
        return Allocation::new();
    }
    holdings
        .iter()
        .filter_map(|(symbol, holding)| {
            let price = *prices.get(symbol)?;
            Some((symbol.clone(), holding.market_value(price) / total_value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    fn prices(pairs: &[(&str, f64)]) -> Prices {
        pairs.iter().map(|(s, p)| (sym(s), *p)).collect()
    }

    #[test]
    fn test_buy_is_scaled_to_available_cash() {
        let rebalancer = PortfolioRebalancer::default();
        let mut slippage = SlippageModel::fixed(0.002);
        let targets: Allocation = [(sym("X"), 1.0)].into_iter().collect();

        let outcome = rebalancer.calculate_trades(
            30_000.0,
            &Holdings::new(),
            &targets,
            30_000.0,
            &prices(&[("X", 1000.0)]),
            &mut slippage,
        );

        assert_eq!(outcome.trades.len(), 1);
        let buy = &outcome.trades[0];
        assert_eq!(buy.side, Side::Buy);
        assert!(buy.net_amount <= 30_000.0 + 1e-6);
        assert!(outcome.new_cash >= -0.01);
        assert_relative_eq!(buy.executed_price, 1002.0);
    }

    #[test]
    fn test_matching_targets_produce_no_trades() {
        let rebalancer = PortfolioRebalancer::default();
        let mut slippage = SlippageModel::fixed(0.002);
        let mut holdings = Holdings::new();
        holdings.insert(sym("A"), Holding::new(sym("A"), 100.0, 200.0));
        holdings.insert(sym("B"), Holding::new(sym("B"), 50.0, 400.0));
        let px = prices(&[("A", 210.0), ("B", 380.0)]);
        let total = 10_000.0 + 100.0 * 210.0 + 50.0 * 380.0;
        let targets = current_weights(&holdings, &px, total);

        let outcome =
            rebalancer.calculate_trades(10_000.0, &holdings, &targets, total, &px, &mut slippage);

        assert!(outcome.trades.is_empty());
        assert_relative_eq!(outcome.new_cash, 10_000.0);
        assert_eq!(outcome.holdings, holdings);
    }

    #[test]
    fn test_sells_fund_buys() {
        let rebalancer = PortfolioRebalancer::default();
        let mut slippage = SlippageModel::fixed(0.0);
        let mut holdings = Holdings::new();
        holdings.insert(sym("OLD"), Holding::new(sym("OLD"), 100.0, 100.0));
        let targets: Allocation = [(sym("NEW"), 1.0)].into_iter().collect();

        let outcome = rebalancer.calculate_trades(
            0.0,
            &holdings,
            &targets,
            10_000.0,
            &prices(&[("OLD", 100.0), ("NEW", 50.0)]),
            &mut slippage,
        );

        let sides: Vec<_> = outcome.trades.iter().map(|t| (t.symbol.as_str().to_string(), t.side)).collect();
        assert_eq!(
            sides,
            vec![("OLD".to_string(), Side::Sell), ("NEW".to_string(), Side::Buy)]
        );
        assert!(!outcome.holdings.contains_key(&sym("OLD")));
        assert!(outcome.new_cash >= 0.0);
        // Sell nets 9990, the buy consumes all of it commission-inclusive
        assert_relative_eq!(outcome.new_cash, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_full_exit_ignores_thresholds() {
        let rebalancer = PortfolioRebalancer::default();
        let mut slippage = SlippageModel::fixed(0.0);
        let mut holdings = Holdings::new();
        // Position worth 300, below the 500 minimum trade value
        holdings.insert(sym("TINY"), Holding::new(sym("TINY"), 3.0, 100.0));

        let outcome = rebalancer.calculate_trades(
            99_700.0,
            &holdings,
            &Allocation::new(),
            100_000.0,
            &prices(&[("TINY", 100.0)]),
            &mut slippage,
        );

        assert_eq!(outcome.trades.len(), 1);
        assert!(outcome.holdings.is_empty());
    }

    #[test]
    fn test_small_changes_are_skipped() {
        let rebalancer = PortfolioRebalancer::default();
        let mut slippage = SlippageModel::fixed(0.0);
        let mut holdings = Holdings::new();
        holdings.insert(sym("A"), Holding::new(sym("A"), 100.0, 100.0));
        // Current weight 0.10, target 0.103: change of 300 is below 500
        let targets: Allocation = [(sym("A"), 0.103)].into_iter().collect();

        let outcome = rebalancer.calculate_trades(
            90_000.0,
            &holdings,
            &targets,
            100_000.0,
            &prices(&[("A", 100.0)]),
            &mut slippage,
        );
        assert!(outcome.trades.is_empty());
    }

    #[test]
    fn test_bad_prices_are_skipped() {
        let rebalancer = PortfolioRebalancer::default();
        let mut slippage = SlippageModel::fixed(0.002);
        let mut holdings = Holdings::new();
        holdings.insert(sym("ZERO"), Holding::new(sym("ZERO"), 10.0, 100.0));
        let targets: Allocation = [(sym("NAN"), 0.5)].into_iter().collect();

        let outcome = rebalancer.calculate_trades(
            50_000.0,
            &holdings,
            &targets,
            51_000.0,
            &prices(&[("ZERO", 0.0), ("NAN", f64::NAN)]),
            &mut slippage,
        );

        assert!(outcome.trades.is_empty());
        assert!(outcome.holdings.contains_key(&sym("ZERO")));
    }
}
