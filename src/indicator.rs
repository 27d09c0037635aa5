pub mod alligator;
pub mod bollinger;
pub mod donchian;
pub mod envelopes;
pub mod fractal;
pub mod ichimoku;
pub mod keltner;
pub mod ma;
pub mod math;
pub mod psar;
pub mod supertrend;
pub mod zigzag;

use std::fmt;

use error_stack::{Report, bail};
use serde::Serialize;

use crate::error::IndicatorError;
use crate::model::{Candle, IndicatorOutput, OutputPoint, SeriesStyle};

/// Identifier of a chart overlay. String forms match the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKey {
    Sma,
    #[serde(rename = "bb")]
    Bollinger,
    Envelopes,
    Fractal,
    Ichimoku,
    Keltner,
    Donchian,
    Supertrend,
    Psar,
    #[serde(rename = "zigzag")]
    ZigZag,
    Alligator,
}

impl IndicatorKey {
    pub const ALL: [IndicatorKey; 11] = [
        Self::Sma,
        Self::Bollinger,
        Self::Envelopes,
        Self::Fractal,
        Self::Ichimoku,
        Self::Keltner,
        Self::Donchian,
        Self::Supertrend,
        Self::Psar,
        Self::ZigZag,
        Self::Alligator,
    ];

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sma => "sma",
            Self::Bollinger => "bb",
            Self::Envelopes => "envelopes",
            Self::Fractal => "fractal",
            Self::Ichimoku => "ichimoku",
            Self::Keltner => "keltner",
            Self::Donchian => "donchian",
            Self::Supertrend => "supertrend",
            Self::Psar => "psar",
            Self::ZigZag => "zigzag",
            Self::Alligator => "alligator",
        }
    }

    /// Human-readable name shown in indicator pickers.
    pub fn label(self) -> &'static str {
        match self {
            Self::Sma => "Moving Average",
            Self::Bollinger => "Bollinger Bands",
            Self::Envelopes => "Envelopes",
            Self::Fractal => "Fractal",
            Self::Ichimoku => "Ichimoku Cloud",
            Self::Keltner => "Keltner channel",
            Self::Donchian => "Donchian channel",
            Self::Supertrend => "Supertrend",
            Self::Psar => "Parabolic SAR",
            Self::ZigZag => "Zig Zag",
            Self::Alligator => "Alligator",
        }
    }
}

impl fmt::Display for IndicatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shape of what an indicator emits: a fixed list of series, or one marker set.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLayout {
    Series(Vec<SeriesStyle>),
    Markers,
}

impl OutputLayout {
    /// Output with nothing in it, used when the lookback is not satisfied.
    pub fn empty_output(&self) -> IndicatorOutput {
        match self {
            Self::Series(_) => IndicatorOutput::Series(Vec::new()),
            Self::Markers => IndicatorOutput::Markers(Vec::new()),
        }
    }
}

/// A chart overlay computed from a candle series.
///
/// Candles must be in ascending chronological order (oldest first).
/// Implementations are stateless: the same candles always give the same output.
pub trait Indicator: Send {
    fn key(&self) -> IndicatorKey;

    /// Minimum number of candles required to produce any output.
    fn required_candles(&self) -> usize;

    fn layout(&self) -> OutputLayout;

    /// `interval_secs` is the spacing of the candle series; only indicators
    /// that project values forward or backward in time use it.
    fn calculate(
        &self,
        candles: &[Candle],
        interval_secs: i64,
    ) -> Result<IndicatorOutput, Report<IndicatorError>>;
}

/// Optional parameter overrides. Unset fields fall back to each indicator's defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorParams {
    pub period: Option<usize>,
    pub mult: Option<f64>,
    pub percent: Option<f64>,
    pub atr_period: Option<usize>,
    pub step: Option<f64>,
    pub max_step: Option<f64>,
    pub deviation_pct: Option<f64>,
    pub tenkan: Option<usize>,
    pub kijun: Option<usize>,
    pub senkou_b: Option<usize>,
    pub displacement: Option<usize>,
    pub jaw: Option<usize>,
    pub teeth: Option<usize>,
    pub lips: Option<usize>,
    pub jaw_shift: Option<usize>,
    pub teeth_shift: Option<usize>,
    pub lips_shift: Option<usize>,
}

/// Construct the indicator for `key`, applying any overrides in `params`.
pub fn build_indicator(
    key: IndicatorKey,
    params: &IndicatorParams,
) -> Result<Box<dyn Indicator>, Report<IndicatorError>> {
    let indicator: Box<dyn Indicator> = match key {
        IndicatorKey::Sma => Box::new(ma::MovingAverage::new(params.period.unwrap_or(20))?),
        IndicatorKey::Bollinger => Box::new(bollinger::BollingerBands::new(
            params.period.unwrap_or(20),
            params.mult.unwrap_or(2.0),
        )?),
        IndicatorKey::Envelopes => Box::new(envelopes::Envelopes::new(
            params.period.unwrap_or(20),
            params.percent.unwrap_or(2.0),
        )?),
        IndicatorKey::Fractal => Box::new(fractal::Fractals::new(params.period.unwrap_or(2))?),
        IndicatorKey::Ichimoku => Box::new(ichimoku::Ichimoku::new(
            params.tenkan.unwrap_or(9),
            params.kijun.unwrap_or(26),
            params.senkou_b.unwrap_or(52),
            params.displacement.unwrap_or(26),
        )?),
        IndicatorKey::Keltner => Box::new(keltner::KeltnerChannel::new(
            params.period.unwrap_or(20),
            params.atr_period.unwrap_or(10),
            params.mult.unwrap_or(2.0),
        )?),
        IndicatorKey::Donchian => {
            Box::new(donchian::DonchianChannel::new(params.period.unwrap_or(20))?)
        }
        IndicatorKey::Supertrend => Box::new(supertrend::Supertrend::new(
            params.atr_period.unwrap_or(10),
            params.mult.unwrap_or(3.0),
        )?),
        IndicatorKey::Psar => Box::new(psar::ParabolicSar::new(
            params.step.unwrap_or(0.02),
            params.max_step.unwrap_or(0.2),
        )?),
        IndicatorKey::ZigZag => Box::new(zigzag::ZigZag::new(params.deviation_pct.unwrap_or(2.0))?),
        IndicatorKey::Alligator => Box::new(alligator::Alligator::new(
            [
                params.jaw.unwrap_or(13),
                params.teeth.unwrap_or(8),
                params.lips.unwrap_or(5),
            ],
            [
                params.jaw_shift.unwrap_or(8),
                params.teeth_shift.unwrap_or(5),
                params.lips_shift.unwrap_or(3),
            ],
        )?),
    };
    Ok(indicator)
}

/// Run `indicator` over `candles`.
///
/// Too few candles is not an error: the result is an empty output. Candles
/// that are not strictly ascending by time are rejected.
pub fn compute(
    indicator: &dyn Indicator,
    candles: &[Candle],
    interval_secs: i64,
) -> Result<IndicatorOutput, Report<IndicatorError>> {
    check_order(candles)?;
    if candles.len() < indicator.required_candles() {
        return Ok(indicator.layout().empty_output());
    }
    indicator.calculate(candles, interval_secs)
}

/// Reject candles that are not strictly ascending by time, naming the first
/// offending index.
pub fn check_order(candles: &[Candle]) -> Result<(), Report<IndicatorError>> {
    if let Some(index) = candles
        .windows(2)
        .position(|pair| pair[1].time <= pair[0].time)
    {
        bail!(IndicatorError::UnorderedCandles { index: index + 1 });
    }
    Ok(())
}

/// Pair each defined, finite value with its candle's time.
pub fn points(candles: &[Candle], values: &[Option<f64>]) -> Vec<OutputPoint> {
    candles
        .iter()
        .zip(values)
        .filter_map(|(candle, value)| {
            value
                .filter(|v| v.is_finite())
                .map(|value| OutputPoint {
                    time: candle.time,
                    value,
                })
        })
        .collect()
}

/// Like [`points`], with every timestamp moved by `shift_secs`.
pub fn shifted_points(
    candles: &[Candle],
    values: &[Option<f64>],
    shift_secs: i64,
) -> Result<Vec<OutputPoint>, Report<IndicatorError>> {
    let mut out = points(candles, values);
    for point in &mut out {
        point.time = point
            .time
            .checked_add(shift_secs)
            .ok_or_else(|| Report::new(IndicatorError::TimeOverflow))?;
    }
    Ok(out)
}

/// `interval_secs * bars`, rejecting non-positive intervals.
pub fn shift_seconds(interval_secs: i64, bars: usize) -> Result<i64, Report<IndicatorError>> {
    if interval_secs <= 0 {
        bail!(IndicatorError::InvalidParameter {
            name: format!("interval must be > 0 seconds, got {interval_secs}"),
        });
    }
    i64::try_from(bars)
        .ok()
        .and_then(|bars| bars.checked_mul(interval_secs))
        .ok_or_else(|| Report::new(IndicatorError::TimeOverflow))
}

pub(crate) fn require_period(name: &str, value: usize) -> Result<usize, Report<IndicatorError>> {
    if value == 0 {
        bail!(IndicatorError::InvalidParameter {
            name: format!("{name} must be > 0"),
        });
    }
    Ok(value)
}

pub(crate) fn require_positive(name: &str, value: f64) -> Result<f64, Report<IndicatorError>> {
    if !(value.is_finite() && value > 0.0) {
        bail!(IndicatorError::InvalidParameter {
            name: format!("{name} must be a finite number > 0"),
        });
    }
    Ok(value)
}

/// Extract close prices from a slice of candles.
pub fn close_prices(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

pub fn highs(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.high).collect()
}

pub fn lows(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.low).collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::model::{Candle, IndicatorOutput, OutputSeries};

    pub const STEP: i64 = 60;

    pub fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                time: 1_700_000_000 + i as i64 * STEP,
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    /// Candles with `high = close + spread` and `low = close - spread`.
    pub fn candles_with_spread(closes: &[f64], spread: f64) -> Vec<Candle> {
        candles_from_closes(closes)
            .into_iter()
            .map(|c| Candle {
                high: c.close + spread,
                low: c.close - spread,
                ..c
            })
            .collect()
    }

    /// Deterministic oscillating price path with a slow drift.
    pub fn zigzag_closes(n: usize) -> Vec<f64> {
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        (0..n)
            .map(|i| {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                let noise = (seed % 1000) as f64 / 1000.0 - 0.5;
                100.0 + (i as f64 / 6.0).sin() * 8.0 + noise * 3.0 + i as f64 * 0.05
            })
            .collect()
    }

    pub fn series(output: &IndicatorOutput) -> &[OutputSeries] {
        match output {
            IndicatorOutput::Series(series) => series,
            IndicatorOutput::Markers(_) => panic!("expected series output"),
        }
    }

    pub fn assert_all_finite(output: &IndicatorOutput) {
        match output {
            IndicatorOutput::Series(series) => {
                for s in series {
                    assert!(s.points.iter().all(|p| p.value.is_finite()));
                    assert!(s.points.windows(2).all(|w| w[0].time < w[1].time));
                }
            }
            IndicatorOutput::Markers(markers) => {
                assert!(markers.iter().all(|m| m.size.is_finite()));
            }
        }
    }
}
