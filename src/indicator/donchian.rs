use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::math::{highest, lowest, rolling};
use crate::indicator::{
    Indicator, IndicatorKey, OutputLayout, highs, lows, points, require_period,
};
use crate::model::{Candle, IndicatorOutput, OutputSeries, SeriesStyle};

const UPPER: SeriesStyle = SeriesStyle::line("#22c55e");
const LOWER: SeriesStyle = SeriesStyle::line("#ef4444");
const MIDDLE: SeriesStyle = SeriesStyle::line("#9ca3af");

/// Highest high / lowest low channel. Emits upper, lower, middle.
pub struct DonchianChannel {
    period: usize,
}

impl DonchianChannel {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        Ok(Self {
            period: require_period("period", period)?,
        })
    }
}

impl Indicator for DonchianChannel {
    fn key(&self) -> IndicatorKey {
        IndicatorKey::Donchian
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    fn layout(&self) -> OutputLayout {
        OutputLayout::Series(vec![UPPER, LOWER, MIDDLE])
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _interval_secs: i64,
    ) -> Result<IndicatorOutput, Report<IndicatorError>> {
        let upper = rolling(&highs(candles), self.period, highest);
        let lower = rolling(&lows(candles), self.period, lowest);
        let middle: Vec<Option<f64>> = upper
            .iter()
            .zip(&lower)
            .map(|(u, l)| Some((u.as_ref()? + l.as_ref()?) / 2.0))
            .collect();

        Ok(IndicatorOutput::Series(vec![
            OutputSeries {
                style: UPPER,
                points: points(candles, &upper),
            },
            OutputSeries {
                style: LOWER,
                points: points(candles, &lower),
            },
            OutputSeries {
                style: MIDDLE,
                points: points(candles, &middle),
            },
        ]))
    }
}
