use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::math::atr;
use crate::indicator::{
    Indicator, IndicatorKey, OutputLayout, points, require_period, require_positive,
};
use crate::model::{Candle, IndicatorOutput, OutputSeries, SeriesStyle};

const SUPPORT: SeriesStyle = SeriesStyle::line("#22c55e");
const RESISTANCE: SeriesStyle = SeriesStyle::line("#ef4444");

/// ATR trailing stop that flips between a support line (uptrend) and a
/// resistance line (downtrend).
pub struct Supertrend {
    atr_period: usize,
    mult: f64,
}

/// Per-candle state of the trailing bands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPoint {
    pub upper: f64,
    pub lower: f64,
    pub uptrend: bool,
}

impl Supertrend {
    pub fn new(atr_period: usize, mult: f64) -> Result<Self, Report<IndicatorError>> {
        Ok(Self {
            atr_period: require_period("atr_period", atr_period)?,
            mult: require_positive("mult", mult)?,
        })
    }

    /// Final bands and trend direction per candle, `None` until the ATR is defined.
    ///
    /// The trend is re-evaluated first, against the bands in force on the
    /// previous candle. Each band then tightens toward price: the upper band
    /// never rises and the lower band never falls, unless the previous close
    /// went through it, in which case it restarts from the basic band. A band
    /// can therefore only restart on a candle where it is not the active one.
    pub fn trend_points(&self, candles: &[Candle]) -> Vec<Option<TrendPoint>> {
        let ranges = atr(candles, self.atr_period);
        let mut out = vec![None; candles.len()];

        let mut uptrend = true;
        let mut prev: Option<(f64, f64)> = None;
        for (i, candle) in candles.iter().enumerate() {
            let Some(range) = ranges[i] else { continue };
            let hl2 = candle.median_price();
            let basic_upper = hl2 + self.mult * range;
            let basic_lower = hl2 - self.mult * range;
            if !(basic_upper.is_finite() && basic_lower.is_finite()) {
                continue;
            }

            // a malformed previous close neither flips the trend nor resets a band
            let prev_close = i
                .checked_sub(1)
                .map(|p| candles[p].close)
                .filter(|c| c.is_finite());
            let (upper, lower) = match prev {
                None => (basic_upper, basic_lower),
                Some((prev_upper, prev_lower)) => {
                    let closed_below = prev_close.is_some_and(|c| c < prev_lower);
                    let closed_above = prev_close.is_some_and(|c| c > prev_upper);
                    if uptrend && closed_below {
                        uptrend = false;
                    } else if !uptrend && closed_above {
                        uptrend = true;
                    }
                    let upper = if basic_upper < prev_upper || closed_above {
                        basic_upper
                    } else {
                        prev_upper
                    };
                    let lower = if basic_lower > prev_lower || closed_below {
                        basic_lower
                    } else {
                        prev_lower
                    };
                    (upper, lower)
                }
            };

            prev = Some((upper, lower));
            out[i] = Some(TrendPoint {
                upper,
                lower,
                uptrend,
            });
        }
        out
    }
}

impl Indicator for Supertrend {
    fn key(&self) -> IndicatorKey {
        IndicatorKey::Supertrend
    }

    fn required_candles(&self) -> usize {
        self.atr_period
    }

    fn layout(&self) -> OutputLayout {
        OutputLayout::Series(vec![SUPPORT, RESISTANCE])
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _interval_secs: i64,
    ) -> Result<IndicatorOutput, Report<IndicatorError>> {
        let trend = self.trend_points(candles);
        let support: Vec<Option<f64>> = trend
            .iter()
            .map(|p| p.filter(|p| p.uptrend).map(|p| p.lower))
            .collect();
        let resistance: Vec<Option<f64>> = trend
            .iter()
            .map(|p| p.filter(|p| !p.uptrend).map(|p| p.upper))
            .collect();

        Ok(IndicatorOutput::Series(vec![
            OutputSeries {
                style: SUPPORT,
                points: points(candles, &support),
            },
            OutputSeries {
                style: RESISTANCE,
                points: points(candles, &resistance),
            },
        ]))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::indicator::compute;
    use crate::indicator::testing::*;

    #[test]
    fn invalid_params_rejected() {
        assert!(Supertrend::new(0, 3.0).is_err());
        assert!(Supertrend::new(10, 0.0).is_err());
    }

    #[test]
    fn support_and_resistance_never_overlap() {
        let st = Supertrend::new(10, 3.0).unwrap();
        for spread in [0.2, 1.0, 3.0] {
            let candles = candles_with_spread(&zigzag_closes(400), spread);
            let output = compute(&st, &candles, STEP).unwrap();
            let lines = series(&output);
            let support: HashSet<i64> = lines[0].points.iter().map(|p| p.time).collect();
            assert!(lines[1].points.iter().all(|p| !support.contains(&p.time)));
        }
    }

    #[test]
    fn active_band_only_tightens_while_trend_holds() {
        for (period, mult) in [(10, 3.0), (5, 1.0), (3, 0.5)] {
            let st = Supertrend::new(period, mult).unwrap();
            let candles = candles_with_spread(&zigzag_closes(500), 0.7);
            let trend = st.trend_points(&candles);
            for pair in trend.windows(2) {
                let (Some(a), Some(b)) = (pair[0], pair[1]) else {
                    continue;
                };
                if a.uptrend && b.uptrend {
                    assert!(b.lower >= a.lower, "support fell: {a:?} -> {b:?}");
                }
                if !a.uptrend && !b.uptrend {
                    assert!(b.upper <= a.upper, "resistance rose: {a:?} -> {b:?}");
                }
            }
        }
    }

    #[test]
    fn reversal_flips_trend() {
        let st = Supertrend::new(3, 1.0).unwrap();
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        closes.extend((0..20).map(|i| 119.0 - i as f64 * 3.0));
        let candles = candles_with_spread(&closes, 0.5);
        let output = compute(&st, &candles, STEP).unwrap();
        let lines = series(&output);
        assert!(!lines[0].points.is_empty());
        assert!(!lines[1].points.is_empty());
        // the sell-off ends in a downtrend
        assert_eq!(lines[1].points.last().unwrap().time, candles.last().unwrap().time);
    }

    #[test]
    fn every_index_after_lookback_has_one_line() {
        let st = Supertrend::new(4, 2.0).unwrap();
        let candles = candles_with_spread(&zigzag_closes(120), 0.5);
        let output = compute(&st, &candles, STEP).unwrap();
        let lines = series(&output);
        assert_eq!(lines[0].points.len() + lines[1].points.len(), candles.len() - 3);
    }

    #[test]
    fn infinite_close_does_not_flip_downtrend() {
        let st = Supertrend::new(3, 1.0).unwrap();
        let closes: Vec<f64> = (0..40).map(|i| 140.0 - i as f64).collect();
        let mut candles = candles_with_spread(&closes, 0.5);
        candles[20].close = f64::INFINITY;
        let trend = st.trend_points(&candles);
        for (i, point) in trend.iter().enumerate().skip(8) {
            assert!(!point.unwrap().uptrend, "trend flipped at {i}");
        }
    }
}
