use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::math::{population_std_dev, rolling, sma};
use crate::indicator::{
    Indicator, IndicatorKey, OutputLayout, close_prices, points, require_period, require_positive,
};
use crate::model::{Candle, IndicatorOutput, OutputSeries, SeriesStyle};

const STYLE: SeriesStyle = SeriesStyle::line("#60a5fa");

/// SMA middle band with upper/lower bands `mult` population standard
/// deviations away. Emits upper, middle, lower.
pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: f64,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev_multiplier: f64) -> Result<Self, Report<IndicatorError>> {
        Ok(Self {
            period: require_period("period", period)?,
            std_dev_multiplier: require_positive("mult", std_dev_multiplier)?,
        })
    }

    /// Returns `(upper, middle, lower)` per candle.
    pub fn calculate_bands(&self, candles: &[Candle]) -> Vec<Option<(f64, f64, f64)>> {
        let prices = close_prices(candles);
        let middle = sma(&prices, self.period);
        let std_dev = rolling(&prices, self.period, population_std_dev);

        middle
            .into_iter()
            .zip(std_dev)
            .map(|(m, sd)| {
                let (m, sd) = (m?, sd?);
                let width = self.std_dev_multiplier * sd;
                Some((m + width, m, m - width))
            })
            .collect()
    }
}

impl Indicator for BollingerBands {
    fn key(&self) -> IndicatorKey {
        IndicatorKey::Bollinger
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
        let bands = self.calculate_bands(candles);
        let pick = |f: fn(&(f64, f64, f64)) -> f64| -> Vec<Option<f64>> {
            bands.iter().map(|b| b.as_ref().map(f)).collect()
        };

        Ok(IndicatorOutput::Series(vec![
            OutputSeries {
                style: STYLE,
                points: points(candles, &pick(|b| b.0)),
            },
            OutputSeries {
                style: STYLE,
                points: points(candles, &pick(|b| b.1)),
            },
            OutputSeries {
                style: STYLE,
                points: points(candles, &pick(|b| b.2)),
            },
        ]))
    }
}
