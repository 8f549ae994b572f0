//! Technical indicators
//!
//! Series functions return one `Option<f64>` per input value (`None` during
//! warm-up). Callers pass only the window they are allowed to observe.

use statrs::statistics::Statistics;

use crate::PriceBar;

/// Trading days per year used for annualization
pub const TRADING_DAYS: f64 = 252.0;

pub fn closes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

pub fn volumes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume).collect()
}

/// Last `n` elements of a slice (or the whole slice if shorter)
pub fn tail<T>(values: &[T], n: usize) -> &[T] {
    &values[values.len().saturating_sub(n)..]
}

/// Latest defined value of an indicator series
pub fn latest(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());
    if period == 0 {
        result.resize(values.len(), None);
        return result;
    }

    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 < period {
            result.push(None);
        } else {
            result.push(Some(sum / period as f64));
        }
    }

    result
}

/// Mean of the trailing `period` values, `None` if not enough data
pub fn sma_last(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(tail(values, period).iter().sum::<f64>() / period as f64)
}

/// Calculate Exponential Moving Average (seeded with the SMA)
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    if values.is_empty() || period == 0 {
        result.resize(values.len(), None);
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_value: Option<f64> = None;

    for (i, &value) in values.iter().enumerate() {
        if i + 1 < period {
            result.push(None);
        } else if i + 1 == period {
            let sum: f64 = values[0..period].iter().sum();
            ema_value = Some(sum / period as f64);
            result.push(ema_value);
        } else if let Some(prev_ema) = ema_value {
            let new_ema = (value - prev_ema) * multiplier + prev_ema;
            ema_value = Some(new_ema);
            result.push(Some(new_ema));
        }
    }

    result
}

/// Calculate True Range; the first bar has no previous close and uses high - low
pub fn true_range(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let hl = bar.high - bar.low;
            if i == 0 {
                hl
            } else {
                let prev_close = bars[i - 1].close;
                hl.max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs())
            }
        })
        .collect()
}

/// Calculate RSI (Relative Strength Index) with simple-average gains and losses
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut gains = Vec::with_capacity(values.len());
    let mut losses = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        let change = if i == 0 { 0.0 } else { values[i] - values[i - 1] };
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let avg_gains = sma(&gains, period);
    let avg_losses = sma(&losses, period);

    avg_gains
        .iter()
        .zip(avg_losses.iter())
        .enumerate()
        .map(|(i, (gain, loss))| match (gain, loss) {
            // first window includes the synthetic zero change of bar 0
            _ if i < period => None,
            (Some(_), Some(loss)) if *loss == 0.0 => Some(100.0),
            (Some(gain), Some(loss)) => Some(100.0 - 100.0 / (1.0 + gain / loss)),
            _ => None,
        })
        .collect()
}

/// Bollinger Bands of the trailing window: (upper, middle, lower)
pub fn bollinger_last(values: &[f64], period: usize, num_std: f64) -> Option<(f64, f64, f64)> {
    let middle = sma_last(values, period)?;
    let window = tail(values, period);
    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();
    Some((middle + num_std * std_dev, middle, middle - num_std * std_dev))
}

/// MACD line and signal line series
pub fn macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);

    let macd_line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    // Signal EMA only runs over the defined part of the MACD line
    let first_defined = macd_line.iter().position(Option::is_some);
    let mut signal_line = vec![None; macd_line.len()];
    if let Some(start) = first_defined {
        let defined: Vec<f64> = macd_line[start..].iter().map(|v| v.unwrap_or(0.0)).collect();
        for (offset, value) in ema(&defined, signal).into_iter().enumerate() {
            signal_line[start + offset] = value;
        }
    }

    (macd_line, signal_line)
}

/// Cumulative Volume Price Trend
pub fn volume_price_trend(bars: &[PriceBar]) -> Vec<f64> {
    let mut vpt = Vec::with_capacity(bars.len());
    let mut acc = 0.0;
    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            let prev_close = bars[i - 1].close;
            if prev_close > 0.0 {
                acc += bar.volume * (bar.close - prev_close) / prev_close;
            }
        }
        vpt.push(acc);
    }
    vpt
}

/// Daily log returns; non-positive prices are skipped
pub fn log_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect()
}

/// Annualized volatility of daily log returns (sample standard deviation)
pub fn annualized_volatility(values: &[f64]) -> Option<f64> {
    let returns = log_returns(values);
    if returns.len() < 2 {
        return None;
    }
    let std_dev = returns.iter().std_dev();
    if std_dev.is_finite() {
        Some(std_dev * TRADING_DAYS.sqrt())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;
    use chrono::NaiveDate;

    fn bar(day: u32, high: f64, low: f64, close: f64) -> PriceBar {
        PriceBar::new_unchecked(
            Symbol::new("T"),
            NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            close,
            high,
            low,
            close,
            1000.0,
        )
    }

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(2.0));
        assert_eq!(result[3], Some(3.0));
        assert_eq!(result[4], Some(4.0));
        assert_eq!(sma_last(&values, 5), Some(3.0));
        assert_eq!(sma_last(&values, 6), None);
    }

    #[test]
    fn test_ema() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = ema(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(2.0));
        assert_eq!(result[3], Some(3.0));
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let bars = vec![bar(1, 11.0, 9.0, 10.0), bar(2, 10.5, 9.5, 10.0), bar(3, 15.0, 12.0, 14.0)];
        let tr = true_range(&bars);

        assert_eq!(tr, vec![2.0, 1.0, 5.0]);
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(latest(&rsi(&rising, 14)), Some(100.0));

        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert_eq!(latest(&rsi(&falling, 14)), Some(0.0));
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let values: Vec<f64> = (0..80).map(|i| 100.0 + i as f64 * (1.0 + i as f64 * 0.01)).collect();
        let (line, signal) = macd(&values, 12, 26, 9);

        assert!(latest(&line).unwrap() > 0.0);
        assert!(latest(&line).unwrap() > latest(&signal).unwrap());
    }

    #[test]
    fn test_volatility_of_flat_series_is_zero() {
        let values = vec![100.0; 50];
        assert_eq!(annualized_volatility(&values), Some(0.0));
        assert_eq!(annualized_volatility(&[100.0]), None);
    }
}
