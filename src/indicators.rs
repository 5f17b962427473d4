//! Pure price indicators
//!
//! Stateless functions over finite ordered sequences of closing prices.
//! Degenerate inputs yield `None` rather than errors so strategy code can
//! fall through to a Hold decision.

/// Simple moving average over the trailing `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Population standard deviation
pub fn stddev(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Relative Strength Index with Wilder's smoothing
///
/// Between 3 and `period` samples a neutral heuristic is used: 65 when the
/// last close sits above the mean of the rest, 35 otherwise. With more than
/// `period` samples, gains/losses are seeded with simple averages over the
/// first `period` deltas and smoothed as `(prev * (p-1) + new) / p`.
/// Zero average loss yields 100.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < 3 {
        return None;
    }

    if closes.len() <= period {
        let (last, rest) = closes.split_last()?;
        let rest_mean = rest.iter().sum::<f64>() / rest.len() as f64;
        return Some(if *last > rest_mean { 65.0 } else { 35.0 });
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // Seed with simple averages over the first `period` deltas
    let mut avg_gain = deltas[..period]
        .iter()
        .map(|d| d.max(0.0))
        .sum::<f64>()
        / period as f64;
    let mut avg_loss = deltas[..period]
        .iter()
        .map(|d| (-d).max(0.0))
        .sum::<f64>()
        / period as f64;

    for d in &deltas[period..] {
        let gain = d.max(0.0);
        let loss = (-d).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Bollinger band levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub mid: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Bollinger bands: mid = SMA, upper/lower = mid +/- k * population stddev
pub fn bollinger(closes: &[f64], period: usize, k: f64) -> Option<BollingerBands> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let mid = sma(closes, period)?;
    let sd = stddev(window)?;
    Some(BollingerBands {
        mid,
        upper: mid + k * sd,
        lower: mid - k * sd,
    })
}

/// Highest value in the trailing `lookback` window
pub fn donchian_high(values: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || values.len() < lookback {
        return None;
    }
    values[values.len() - lookback..]
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.max(v)))
        })
}

/// Lowest value in the trailing `lookback` window
pub fn donchian_low(values: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || values.len() < lookback {
        return None;
    }
    values[values.len() - lookback..]
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.min(v)))
        })
}

/// Rate of change over `period` steps back from the last close
pub fn roc(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }
    let last = *closes.last()?;
    let prior = closes[closes.len() - 1 - period];
    if prior == 0.0 {
        return None;
    }
    Some((last - prior) / prior)
}

/// Population stddev of log-returns over the trailing `lookback` samples
///
/// Used by the position manager as its volatility measure. Non-positive
/// prices in the window yield `None`.
pub fn log_return_volatility(prices: &[f64], lookback: usize) -> Option<f64> {
    if prices.len() < 2 {
        return None;
    }
    let start = prices.len().saturating_sub(lookback.max(2));
    let window = &prices[start..];
    if window.iter().any(|p| *p <= 0.0) {
        return None;
    }
    let returns: Vec<f64> = window.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    stddev(&returns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_basic() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&values, 5), Some(3.0));
        assert_eq!(sma(&values, 2), Some(4.5));
        assert_eq!(sma(&values, 6), None);
        assert_eq!(sma(&[], 1), None);
    }

    #[test]
    fn test_rsi_bounds() {
        // Non-zero variance, length > period: rsi stays in [0, 100]
        let closes: Vec<f64> = (0..40)
            .map(|i| 1.0 + 0.05 * ((i as f64) * 0.7).sin())
            .collect();
        let value = rsi(&closes, 14).unwrap();
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn test_rsi_monotone_rising() {
        let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let value = rsi(&closes, 14).unwrap();
        assert_eq!(value, 100.0); // no losses at all
    }

    #[test]
    fn test_rsi_monotone_falling() {
        let closes: Vec<f64> = (1..=30).rev().map(|i| i as f64).collect();
        let value = rsi(&closes, 14).unwrap();
        assert!(value < 1.0);
    }

    #[test]
    fn test_rsi_short_history_heuristic() {
        // 3..=period samples: last above mean of rest -> 65
        assert_eq!(rsi(&[1.0, 1.0, 2.0], 14), Some(65.0));
        // last below mean of rest -> 35
        assert_eq!(rsi(&[2.0, 2.0, 1.0], 14), Some(35.0));
        // under 3 samples -> None
        assert_eq!(rsi(&[1.0, 2.0], 14), None);
    }

    #[test]
    fn test_bollinger_flat_series() {
        let closes = [2.0; 20];
        let bands = bollinger(&closes, 20, 2.0).unwrap();
        assert_eq!(bands.mid, 2.0);
        assert_eq!(bands.upper, 2.0);
        assert_eq!(bands.lower, 2.0);
    }

    #[test]
    fn test_bollinger_symmetry() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        let bands = bollinger(&closes, 5, 2.0).unwrap();
        assert!((bands.upper - bands.mid - (bands.mid - bands.lower)).abs() < 1e-12);
        assert!(bands.upper > bands.mid && bands.mid > bands.lower);
    }

    #[test]
    fn test_donchian() {
        let values = [3.0, 9.0, 1.0, 7.0];
        assert_eq!(donchian_high(&values, 3), Some(9.0));
        assert_eq!(donchian_low(&values, 3), Some(1.0));
        assert_eq!(donchian_high(&values, 2), Some(7.0));
        assert_eq!(donchian_high(&values, 5), None);
    }

    #[test]
    fn test_roc() {
        let closes = [1.0, 1.1, 1.21];
        let value = roc(&closes, 2).unwrap();
        assert!((value - 0.21).abs() < 1e-12);
        // prior price of zero -> None
        assert_eq!(roc(&[0.0, 1.0], 1), None);
        // not enough data -> None
        assert_eq!(roc(&closes, 3), None);
    }

    #[test]
    fn test_log_return_volatility() {
        // Constant price means zero volatility
        let flat = [1.0; 10];
        assert_eq!(log_return_volatility(&flat, 8), Some(0.0));

        let moving = [1.0, 1.2, 0.9, 1.4, 1.1];
        let vol = log_return_volatility(&moving, 5).unwrap();
        assert!(vol > 0.0);

        assert_eq!(log_return_volatility(&[1.0], 5), None);
        assert_eq!(log_return_volatility(&[1.0, -1.0], 5), None);
    }
}
