use std::fmt;

use serde::Serialize;

use crate::model::{Candle, OutputPoint};

/// How the main price series is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Candles,
    Bars,
    Line,
    Area,
    Baseline,
    Heikin,
    Hollow,
}

impl ChartType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "candles" => Some(Self::Candles),
            "bars" => Some(Self::Bars),
            "line" => Some(Self::Line),
            "area" => Some(Self::Area),
            "baseline" => Some(Self::Baseline),
            "heikin" => Some(Self::Heikin),
            "hollow" => Some(Self::Hollow),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Candles => "candles",
            Self::Bars => "bars",
            Self::Line => "line",
            Self::Area => "area",
            Self::Baseline => "baseline",
            Self::Heikin => "heikin",
            Self::Hollow => "hollow",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main series data in the shape its chart type needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MainSeries {
    Ohlc {
        candles: Vec<Candle>,
    },
    Line {
        points: Vec<OutputPoint>,
    },
    Baseline {
        base_value: f64,
        points: Vec<OutputPoint>,
    },
}

impl MainSeries {
    pub fn build(chart_type: ChartType, candles: &[Candle]) -> Self {
        match chart_type {
            ChartType::Candles | ChartType::Bars | ChartType::Hollow => Self::Ohlc {
                candles: candles.to_vec(),
            },
            ChartType::Heikin => Self::Ohlc {
                candles: heikin_ashi(candles),
            },
            ChartType::Line | ChartType::Area => Self::Line {
                points: close_points(candles),
            },
            ChartType::Baseline => Self::Baseline {
                base_value: candles.last().map_or(0.0, |c| c.close),
                points: close_points(candles),
            },
        }
    }

    /// Most recent price shown by the series.
    pub fn last_value(&self) -> Option<f64> {
        match self {
            Self::Ohlc { candles } => candles.last().map(|c| c.close),
            Self::Line { points } | Self::Baseline { points, .. } => points.last().map(|p| p.value),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Ohlc { candles } => candles.len(),
            Self::Line { points } | Self::Baseline { points, .. } => points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn close_points(candles: &[Candle]) -> Vec<OutputPoint> {
    candles
        .iter()
        .map(|c| OutputPoint {
            time: c.time,
            value: c.close,
        })
        .collect()
}

/// Convert raw candles to Heikin-Ashi candles. Volume and time carry over.
pub fn heikin_ashi(candles: &[Candle]) -> Vec<Candle> {
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for c in candles {
        let ha_close = (c.open + c.high + c.low + c.close) / 4.0;
        let ha_open = match out.last() {
            Some(prev) => (prev.open + prev.close) / 2.0,
            None => (c.open + c.close) / 2.0,
        };
        out.push(Candle {
            time: c.time,
            open: ha_open,
            high: c.high.max(ha_open).max(ha_close),
            low: c.low.min(ha_open).min(ha_close),
            close: ha_close,
            volume: c.volume,
        });
    }
    out
}
