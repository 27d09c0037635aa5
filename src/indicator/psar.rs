use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, IndicatorKey, OutputLayout, require_positive};
use crate::model::{Candle, IndicatorOutput, Marker, MarkerPosition, MarkerShape};

/// Wilder's parabolic stop-and-reverse, drawn as one dot per candle below
/// the bar in an uptrend and above it in a downtrend.
pub struct ParabolicSar {
    step: f64,
    max_step: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SarPoint {
    pub time: i64,
    pub sar: f64,
    pub bullish: bool,
}

impl ParabolicSar {
    pub fn new(step: f64, max_step: f64) -> Result<Self, Report<IndicatorError>> {
        let step = require_positive("step", step)?;
        let max_step = require_positive("max_step", max_step)?;
        if max_step < step {
            bail!(IndicatorError::InvalidParameter {
                name: "max_step must be >= step".into(),
            });
        }
        Ok(Self { step, max_step })
    }

    /// SAR value and direction for every candle after the first usable one.
    pub fn sar_points(&self, candles: &[Candle]) -> Vec<SarPoint> {
        let usable = |c: &Candle| c.high.is_finite() && c.low.is_finite();
        let Some(seed) = candles.iter().position(usable) else {
            return Vec::new();
        };

        let mut sar = candles[seed].low;
        let mut ep = candles[seed].high;
        let mut af = self.step;
        let mut bullish = true;
        // the two most recent usable candles, newest first
        let mut recent: [Option<&Candle>; 2] = [Some(&candles[seed]), None];

        let mut out = Vec::with_capacity(candles.len() - seed);
        for candle in &candles[seed + 1..] {
            if !usable(candle) {
                out.push(SarPoint {
                    time: candle.time,
                    sar,
                    bullish,
                });
                continue;
            }

            sar += af * (ep - sar);
            // SAR may not move into the range of the two prior candles
            for prior in recent.iter().flatten() {
                sar = if bullish {
                    sar.min(prior.low)
                } else {
                    sar.max(prior.high)
                };
            }

            if bullish {
                if candle.low < sar {
                    bullish = false;
                    sar = ep;
                    ep = candle.low;
                    af = self.step;
                } else if candle.high > ep {
                    ep = candle.high;
                    af = (af + self.step).min(self.max_step);
                }
            } else if candle.high > sar {
                bullish = true;
                sar = ep;
                ep = candle.high;
                af = self.step;
            } else if candle.low < ep {
                ep = candle.low;
                af = (af + self.step).min(self.max_step);
            }

            recent = [Some(candle), recent[0]];
            out.push(SarPoint {
                time: candle.time,
                sar,
                bullish,
            });
        }
        out
    }
}

impl Indicator for ParabolicSar {
    fn key(&self) -> IndicatorKey {
        IndicatorKey::Psar
    }

    fn required_candles(&self) -> usize {
        2
    }

    fn layout(&self) -> OutputLayout {
        OutputLayout::Markers
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _interval_secs: i64,
    ) -> Result<IndicatorOutput, Report<IndicatorError>> {
        let markers = self
            .sar_points(candles)
            .into_iter()
            .map(|p| Marker {
                time: p.time,
                position: if p.bullish {
                    MarkerPosition::BelowBar
                } else {
                    MarkerPosition::AboveBar
                },
                shape: MarkerShape::Circle,
                color: "#eab308",
                size: 0.5,
            })
            .collect();
        Ok(IndicatorOutput::Markers(markers))
    }
}
