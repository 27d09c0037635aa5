use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::math::smma;
use crate::indicator::{
    Indicator, IndicatorKey, OutputLayout, require_period, shift_seconds, shifted_points,
};
use crate::model::{Candle, IndicatorOutput, OutputSeries, SeriesStyle};

const STYLES: [SeriesStyle; 3] = [
    // jaw
    SeriesStyle::line("#2563eb"),
    // teeth
    SeriesStyle::line("#dc2626"),
    // lips
    SeriesStyle::line("#16a34a"),
];

/// Bill Williams Alligator: three smoothed averages of the median price,
/// each drawn `shift` bars into the future.
pub struct Alligator {
    periods: [usize; 3],
    shifts: [usize; 3],
}

impl Alligator {
    /// `periods` and `shifts` are ordered jaw, teeth, lips.
    pub fn new(periods: [usize; 3], shifts: [usize; 3]) -> Result<Self, Report<IndicatorError>> {
        for (name, period) in ["jaw", "teeth", "lips"].into_iter().zip(periods) {
            require_period(name, period)?;
        }
        Ok(Self { periods, shifts })
    }
}

impl Indicator for Alligator {
    fn key(&self) -> IndicatorKey {
        IndicatorKey::Alligator
    }

    fn required_candles(&self) -> usize {
        self.periods.into_iter().max().unwrap_or(1)
    }

    fn layout(&self) -> OutputLayout {
        OutputLayout::Series(STYLES.to_vec())
    }

    fn calculate(
        &self,
        candles: &[Candle],
        interval_secs: i64,
    ) -> Result<IndicatorOutput, Report<IndicatorError>> {
        let median: Vec<f64> = candles.iter().map(Candle::median_price).collect();

        let mut lines = Vec::with_capacity(3);
        for ((period, bars), style) in self.periods.into_iter().zip(self.shifts).zip(STYLES) {
            let shift = shift_seconds(interval_secs, bars)?;
            lines.push(OutputSeries {
                style,
                points: shifted_points(candles, &smma(&median, period), shift)?,
            });
        }
        Ok(IndicatorOutput::Series(lines))
    }
}
