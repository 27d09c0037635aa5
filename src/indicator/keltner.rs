use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::math::{atr, ema};
use crate::indicator::{
    Indicator, IndicatorKey, OutputLayout, points, require_period, require_positive,
};
use crate::model::{Candle, IndicatorOutput, OutputSeries, SeriesStyle};

const STYLE: SeriesStyle = SeriesStyle::line("#f59e0b");

/// EMA of typical price with bands `mult` ATRs away. Emits center, upper, lower.
pub struct KeltnerChannel {
    period: usize,
    atr_period: usize,
    mult: f64,
}

impl KeltnerChannel {
    pub fn new(period: usize, atr_period: usize, mult: f64) -> Result<Self, Report<IndicatorError>> {
        Ok(Self {
            period: require_period("period", period)?,
            atr_period: require_period("atr_period", atr_period)?,
            mult: require_positive("mult", mult)?,
        })
    }
}

impl Indicator for KeltnerChannel {
    fn key(&self) -> IndicatorKey {
        IndicatorKey::Keltner
    }

    fn required_candles(&self) -> usize {
        self.period.max(self.atr_period)
    }

    fn layout(&self) -> OutputLayout {
        OutputLayout::Series(vec![STYLE; 3])
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _interval_secs: i64,
    ) -> Result<IndicatorOutput, Report<IndicatorError>> {
        let typical: Vec<f64> = candles.iter().map(Candle::typical_price).collect();
        let center = ema(&typical, self.period);
        let ranges = atr(candles, self.atr_period);

        let band = |sign: f64| -> Vec<Option<f64>> {
            center
                .iter()
                .zip(&ranges)
                .map(|(c, r)| Some(c.as_ref()? + sign * self.mult * r.as_ref()?))
                .collect()
        };

        Ok(IndicatorOutput::Series(vec![
            OutputSeries {
                style: STYLE,
                points: points(candles, &center),
            },
            OutputSeries {
                style: STYLE,
                points: points(candles, &band(1.0)),
            },
            OutputSeries {
                style: STYLE,
                points: points(candles, &band(-1.0)),
            },
        ]))
    }
}
