use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::{Indicator, IndicatorKey, OutputLayout, require_positive};
use crate::model::{Candle, IndicatorOutput, OutputPoint, OutputSeries, SeriesStyle};

const STYLE: SeriesStyle = SeriesStyle::line("#ff6b35").with_width(3);

/// Line through swing highs and lows, where a swing only counts once price
/// has reversed from it by at least `deviation_pct` percent.
pub struct ZigZag {
    deviation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Swing {
    High,
    Low,
}

#[derive(Debug, Clone, Copy)]
struct Pivot {
    index: usize,
    price: f64,
}

fn usable(candle: &Candle) -> bool {
    candle.high.is_finite() && candle.low.is_finite()
}

impl ZigZag {
    pub fn new(deviation_pct: f64) -> Result<Self, Report<IndicatorError>> {
        Ok(Self {
            deviation: require_positive("deviation_pct", deviation_pct)? / 100.0,
        })
    }

    fn rose_from(&self, base: f64, price: f64) -> bool {
        price >= base * (1.0 + self.deviation)
    }

    fn fell_from(&self, base: f64, price: f64) -> bool {
        price <= base * (1.0 - self.deviation)
    }

    /// Locate the first reversal. Returns the pivots found so far, the kind
    /// of the last one, the extreme of the leg in progress and the index to
    /// continue scanning from.
    fn first_swing(&self, candles: &[Candle]) -> Option<(Vec<Pivot>, Swing, Pivot, usize)> {
        let seed = candles.iter().position(usable)?;
        let mut hi = Pivot {
            index: seed,
            price: candles[seed].high,
        };
        let mut lo = Pivot {
            index: seed,
            price: candles[seed].low,
        };

        for (i, candle) in candles.iter().enumerate().skip(seed + 1) {
            if !usable(candle) {
                continue;
            }
            if candle.high > hi.price {
                hi = Pivot {
                    index: i,
                    price: candle.high,
                };
            }
            if candle.low < lo.price {
                lo = Pivot {
                    index: i,
                    price: candle.low,
                };
            }

            // an extreme on the seed candle was not reached by a reversal
            let dropped = hi.index > seed && hi.index < i && self.fell_from(hi.price, candle.low);
            let rallied = lo.index > seed && lo.index < i && self.rose_from(lo.price, candle.high);

            if dropped && (!rallied || hi.index > lo.index) {
                let mut pivots = Vec::with_capacity(2);
                if lo.index < hi.index && self.rose_from(lo.price, hi.price) {
                    pivots.push(lo);
                }
                pivots.push(hi);
                let extreme = Pivot {
                    index: i,
                    price: candle.low,
                };
                return Some((pivots, Swing::High, extreme, i + 1));
            }
            if rallied {
                let mut pivots = Vec::with_capacity(2);
                if hi.index < lo.index && self.fell_from(hi.price, lo.price) {
                    pivots.push(hi);
                }
                pivots.push(lo);
                let extreme = Pivot {
                    index: i,
                    price: candle.high,
                };
                return Some((pivots, Swing::Low, extreme, i + 1));
            }
        }
        None
    }

    fn pivots(&self, candles: &[Candle]) -> Vec<Pivot> {
        let Some((mut pivots, mut last, mut extreme, start)) = self.first_swing(candles) else {
            return Vec::new();
        };

        for (i, candle) in candles.iter().enumerate().skip(start) {
            if !usable(candle) {
                continue;
            }
            match last {
                // hunting the next low
                Swing::High => {
                    if candle.low < extreme.price {
                        extreme = Pivot {
                            index: i,
                            price: candle.low,
                        };
                    }
                    if self.rose_from(extreme.price, candle.high) {
                        pivots.push(extreme);
                        last = Swing::Low;
                        extreme = Pivot {
                            index: i,
                            price: candle.high,
                        };
                    }
                }
                // hunting the next high
                Swing::Low => {
                    if candle.high > extreme.price {
                        extreme = Pivot {
                            index: i,
                            price: candle.high,
                        };
                    }
                    if self.fell_from(extreme.price, candle.low) {
                        pivots.push(extreme);
                        last = Swing::High;
                        extreme = Pivot {
                            index: i,
                            price: candle.low,
                        };
                    }
                }
            }
        }

        // the unconfirmed leg still in progress
        if pivots.last().is_some_and(|p| extreme.index > p.index) {
            pivots.push(extreme);
        }
        pivots
    }
}

impl Indicator for ZigZag {
    fn key(&self) -> IndicatorKey {
        IndicatorKey::ZigZag
    }

    fn required_candles(&self) -> usize {
        3
    }

    fn layout(&self) -> OutputLayout {
        OutputLayout::Series(vec![STYLE])
    }

    fn calculate(
        &self,
        candles: &[Candle],
        _interval_secs: i64,
    ) -> Result<IndicatorOutput, Report<IndicatorError>> {
        let pivots = self.pivots(candles);
        if pivots.len() < 2 {
            return Ok(IndicatorOutput::Series(Vec::new()));
        }

        let mut points: Vec<OutputPoint> = Vec::with_capacity(pivots.len());
        for pivot in pivots {
            let time = candles[pivot.index].time;
            if !pivot.price.is_finite() || points.iter().any(|p| p.time == time) {
                continue;
            }
            points.push(OutputPoint {
                time,
                value: pivot.price,
            });
        }
        points.sort_by_key(|p| p.time);

        Ok(IndicatorOutput::Series(vec![OutputSeries {
            style: STYLE,
            points,
        }]))
    }
}
