use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::math::sma;
use crate::indicator::{
    Indicator, IndicatorKey, OutputLayout, close_prices, points, require_period,
};
use crate::model::{Candle, IndicatorOutput, OutputSeries, SeriesStyle};

const STYLE: SeriesStyle = SeriesStyle::line("#f59e0b");

/// Simple moving average of close prices.
pub struct MovingAverage {
    period: usize,
}

impl MovingAverage {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        Ok(Self {
            period: require_period("period", period)?,
        })
    }
}

impl Indicator for MovingAverage {
    fn key(&self) -> IndicatorKey {
        IndicatorKey::Sma
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    fn layout(&self) -> OutputLayout {
        OutputLayout::Series(vec![STYLE])
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _interval_secs: i64,
    ) -> Result<IndicatorOutput, Report<IndicatorError>> {
        let values = sma(&close_prices(candles), self.period);
        Ok(IndicatorOutput::Series(vec![OutputSeries {
            style: STYLE,
            points: points(candles, &values),
        }]))
    }
}
