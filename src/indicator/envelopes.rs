use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::math::sma;
use crate::indicator::{
    Indicator, IndicatorKey, OutputLayout, close_prices, points, require_period, require_positive,
};
use crate::model::{Candle, IndicatorOutput, OutputSeries, SeriesStyle};

const STYLE: SeriesStyle = SeriesStyle::line("#a78bfa");

/// SMA with bands a fixed percentage above and below. Emits upper, middle, lower.
pub struct Envelopes {
    period: usize,
    percent: f64,
}

impl Envelopes {
    pub fn new(period: usize, percent: f64) -> Result<Self, Report<IndicatorError>> {
        Ok(Self {
            period: require_period("period", period)?,
            percent: require_positive("percent", percent)?,
        })
    }
}

impl Indicator for Envelopes {
    fn key(&self) -> IndicatorKey {
        IndicatorKey::Envelopes
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    fn layout(&self) -> OutputLayout {
        OutputLayout::Series(vec![STYLE; 3])
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _interval_secs: i64,
    ) -> Result<IndicatorOutput, Report<IndicatorError>> {
        let middle = sma(&close_prices(candles), self.period);
        let scaled = |factor: f64| -> Vec<Option<f64>> {
            middle.iter().map(|m| m.map(|m| m * factor)).collect()
        };
        let ratio = self.percent / 100.0;

        Ok(IndicatorOutput::Series(vec![
            OutputSeries {
                style: STYLE,
                points: points(candles, &scaled(1.0 + ratio)),
            },
            OutputSeries {
                style: STYLE,
                points: points(candles, &middle),
            },
            OutputSeries {
                style: STYLE,
                points: points(candles, &scaled(1.0 - ratio)),
            },
        ]))
    }
}
