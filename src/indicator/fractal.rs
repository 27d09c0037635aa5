use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::{Indicator, IndicatorKey, OutputLayout, require_period};
use crate::model::{Candle, IndicatorOutput, Marker, MarkerPosition, MarkerShape};

/// Bill Williams fractals: a candle whose high (low) is the extreme of the
/// window reaching `wing` candles to each side.
pub struct Fractals {
    wing: usize,
}

impl Fractals {
    pub fn new(wing: usize) -> Result<Self, Report<IndicatorError>> {
        Ok(Self {
            wing: require_period("window", wing)?,
        })
    }

    // non-finite neighbours neither confirm nor veto the centre
    fn is_high(&self, window: &[Candle], center: &Candle) -> bool {
        center.high.is_finite()
            && window
                .iter()
                .filter(|c| c.high.is_finite())
                .all(|c| center.high >= c.high)
    }

    fn is_low(&self, window: &[Candle], center: &Candle) -> bool {
        center.low.is_finite()
            && window
                .iter()
                .filter(|c| c.low.is_finite())
                .all(|c| center.low <= c.low)
    }
}

impl Indicator for Fractals {
    fn key(&self) -> IndicatorKey {
        IndicatorKey::Fractal
    }

    fn required_candles(&self) -> usize {
        self.wing * 2 + 1
    }

    fn layout(&self) -> OutputLayout {
        OutputLayout::Markers
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _interval_secs: i64,
    ) -> Result<IndicatorOutput, Report<IndicatorError>> {
        let mut markers = Vec::new();
        for window in candles.windows(self.required_candles()) {
            let center = &window[self.wing];
            // high and low checks are independent; an outside bar can be both
            if self.is_high(window, center) {
                markers.push(Marker {
                    time: center.time,
                    position: MarkerPosition::AboveBar,
                    shape: MarkerShape::ArrowDown,
                    color: "#ef4444",
                    size: 1.0,
                });
            }
            if self.is_low(window, center) {
                markers.push(Marker {
                    time: center.time,
                    position: MarkerPosition::BelowBar,
                    shape: MarkerShape::ArrowUp,
                    color: "#22c55e",
                    size: 1.0,
                });
            }
        }
        Ok(IndicatorOutput::Markers(markers))
    }
}
