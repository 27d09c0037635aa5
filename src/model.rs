use std::fmt;

use serde::Serialize;

/// Candle interval supported by the chart.
///
/// String representations match the config file format (e.g. `"1m"`, `"1h"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimeFrame {
    #[serde(rename = "1s")]
    Sec1,
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "3m")]
    Min3,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "2h")]
    Hour2,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "6h")]
    Hour6,
    #[serde(rename = "12h")]
    Hour12,
    #[serde(rename = "1d")]
    Day1,
}

impl TimeFrame {
    /// Parse a config-format string into a `TimeFrame`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1s" => Some(Self::Sec1),
            "1m" => Some(Self::Min1),
            "3m" => Some(Self::Min3),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "30m" => Some(Self::Min30),
            "1h" => Some(Self::Hour1),
            "2h" => Some(Self::Hour2),
            "4h" => Some(Self::Hour4),
            "6h" => Some(Self::Hour6),
            "12h" => Some(Self::Hour12),
            "1d" => Some(Self::Day1),
            _ => None,
        }
    }

    /// Return the config-format string representation.
    ///
    /// Binance kline intervals use the same spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sec1 => "1s",
            Self::Min1 => "1m",
            Self::Min3 => "3m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour2 => "2h",
            Self::Hour4 => "4h",
            Self::Hour6 => "6h",
            Self::Hour12 => "12h",
            Self::Day1 => "1d",
        }
    }

    /// Spacing between consecutive candles, in seconds.
    pub fn seconds(self) -> i64 {
        match self {
            Self::Sec1 => 1,
            Self::Min1 => 60,
            Self::Min3 => 3 * 60,
            Self::Min5 => 5 * 60,
            Self::Min15 => 15 * 60,
            Self::Min30 => 30 * 60,
            Self::Hour1 => 60 * 60,
            Self::Hour2 => 2 * 60 * 60,
            Self::Hour4 => 4 * 60 * 60,
            Self::Hour6 => 6 * 60 * 60,
            Self::Hour12 => 12 * 60 * 60,
            Self::Day1 => 24 * 60 * 60,
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Visible window presets. Each one picks a candle resolution and a fetch size
/// dense enough to fill the window with some slack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewRange {
    Hour1,
    Hour4,
    Day1,
    All,
}

impl ViewRange {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1h" => Some(Self::Hour1),
            "4h" => Some(Self::Hour4),
            "1d" => Some(Self::Day1),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
            Self::All => "all",
        }
    }

    /// Interval and candle count to request for this view.
    pub fn fetch_plan(self) -> (TimeFrame, usize) {
        match self {
            Self::Hour1 => (TimeFrame::Min1, 120),
            Self::Hour4 => (TimeFrame::Min5, 300),
            Self::Day1 => (TimeFrame::Min15, 120),
            // 15 days of 15m bars
            Self::All => (TimeFrame::Min15, 96 * 15),
        }
    }

    /// Length of the visible window in seconds, `None` for "fit everything".
    pub fn window_seconds(self) -> Option<i64> {
        match self {
            Self::Hour1 => Some(60 * 60),
            Self::Hour4 => Some(4 * 60 * 60),
            Self::Day1 => Some(24 * 60 * 60),
            Self::All => None,
        }
    }
}

impl fmt::Display for ViewRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One OHLCV aggregation. `time` is the open time in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// `(high + low) / 2`
    pub fn median_price(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// `(high + low + close) / 3`
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Sort ascending by time and drop repeated timestamps, keeping the last
/// occurrence (the most recent revision of a still-forming candle).
pub fn normalize_candles(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.time);
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match out.last_mut() {
            Some(last) if last.time == candle.time => *last = candle,
            _ => out.push(candle),
        }
    }
    out
}

/// A single emitted indicator value. Never NaN or infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutputPoint {
    pub time: i64,
    pub value: f64,
}

/// Rendering hints attached to an output series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeriesStyle {
    pub color: &'static str,
    pub line_width: u8,
}

impl SeriesStyle {
    pub const fn line(color: &'static str) -> Self {
        Self {
            color,
            line_width: 2,
        }
    }

    pub const fn with_width(self, line_width: u8) -> Self {
        Self { line_width, ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSeries {
    pub style: SeriesStyle,
    pub points: Vec<OutputPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPosition {
    AboveBar,
    BelowBar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerShape {
    ArrowUp,
    ArrowDown,
    Circle,
}

/// Annotation of a discrete event at one candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Marker {
    pub time: i64,
    pub position: MarkerPosition,
    pub shape: MarkerShape,
    pub color: &'static str,
    pub size: f64,
}

/// Result of one indicator computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum IndicatorOutput {
    Series(Vec<OutputSeries>),
    Markers(Vec<Marker>),
}

impl IndicatorOutput {
    /// `true` if no series carries a point and no marker is present.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Series(series) => series.iter().all(|s| s.points.is_empty()),
            Self::Markers(markers) => markers.is_empty(),
        }
    }
}

/// One coin in the market snapshot. Fields the market data provider leaves
/// null stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketTicker {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub market_cap: Option<f64>,
}
