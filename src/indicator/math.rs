//! Moving-average family, true range and trailing-window helpers.
//!
//! Every function returns one slot per input sample; `None` marks samples
//! whose lookback is not yet satisfied. Non-finite inputs are skipped rather
//! than folded in, so a single bad candle cannot turn the rest of a series
//! into NaN.

use crate::model::Candle;

/// Simple moving average over a trailing window of `period` samples.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }

    let mut sum = 0.0;
    let mut count = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v.is_finite() {
            sum += v;
            count += 1;
        }
        if i >= period {
            let leaving = values[i - period];
            if leaving.is_finite() {
                sum -= leaving;
                count -= 1;
            }
        }
        if count == 0 {
            sum = 0.0;
        } else if i + 1 >= period {
            out[i] = Some(sum / count as f64);
        }
    }
    out
}

/// Exponential moving average with `k = 2 / (period + 1)`.
///
/// The recurrence starts at the first sample, but values are only surfaced
/// from index `period - 1` onward.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut prev: Option<f64> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_finite() {
            prev = Some(match prev {
                None => v,
                Some(p) => (v - p) * k + p,
            });
        }
        if i + 1 >= period {
            out[i] = prev;
        }
    }
    out
}

/// Smoothed (Wilder) moving average.
///
/// Seeded with the simple mean of the first `period` samples at index
/// `period - 1`, then `(prev * (period - 1) + v) / period`. A series shorter
/// than `period` yields no values at all.
pub fn smma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let n = period as f64;
    let mut state = mean_finite(&values[..period]);
    out[period - 1] = state;
    for (i, &v) in values.iter().enumerate().skip(period) {
        if v.is_finite() {
            state = Some(match state {
                Some(p) => (p * (n - 1.0) + v) / n,
                None => v,
            });
        }
        out[i] = state;
    }
    out
}

/// True range of candle `i`. The first candle has no previous close, so its
/// range is just `high - low`.
pub fn true_range(candles: &[Candle], i: usize) -> Option<f64> {
    let candle = candles.get(i)?;
    let range = candle.high - candle.low;
    if !range.is_finite() {
        return None;
    }
    let Some(prev_close) = i
        .checked_sub(1)
        .map(|p| candles[p].close)
        .filter(|c| c.is_finite())
    else {
        return Some(range);
    };
    Some(
        range
            .max((candle.high - prev_close).abs())
            .max((candle.low - prev_close).abs()),
    )
}

/// Wilder-smoothed average true range.
pub fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let trs: Vec<f64> = (0..candles.len())
        .map(|i| true_range(candles, i).unwrap_or(f64::NAN))
        .collect();
    smma(&trs, period)
}

/// Largest finite value of the slice.
pub fn highest(values: &[f64]) -> Option<f64> {
    let max = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    max.is_finite().then_some(max)
}

/// Smallest finite value of the slice.
pub fn lowest(values: &[f64]) -> Option<f64> {
    let min = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::INFINITY, f64::min);
    min.is_finite().then_some(min)
}

/// Apply `f` to every trailing window of `period` samples, aligned so the
/// result for a window lands on its last index.
pub fn rolling<F>(values: &[f64], period: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for (offset, window) in values.windows(period).enumerate() {
        out[offset + period - 1] = f(window);
    }
    out
}

/// `(highest high + lowest low) / 2` over each trailing window.
pub fn midpoint_channel(highs: &[f64], lows: &[f64], period: usize) -> Vec<Option<f64>> {
    let upper = rolling(highs, period, highest);
    let lower = rolling(lows, period, lowest);
    upper
        .into_iter()
        .zip(lower)
        .map(|(u, l)| Some((u? + l?) / 2.0))
        .collect()
}

/// Population standard deviation of the finite samples in a window.
pub fn population_std_dev(window: &[f64]) -> Option<f64> {
    let mean = mean_finite(window)?;
    let (sum_sq, count) = window
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(acc, n), &v| (acc + (v - mean).powi(2), n + 1));
    Some((sum_sq / count as f64).sqrt())
}

fn mean_finite(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(acc, n), &v| (acc + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}
