use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::math::midpoint_channel;
use crate::indicator::{
    Indicator, IndicatorKey, OutputLayout, highs, lows, points, require_period, shift_seconds,
    shifted_points,
};
use crate::model::{Candle, IndicatorOutput, OutputSeries, SeriesStyle};

const TENKAN: SeriesStyle = SeriesStyle::line("#f472b6");
const KIJUN: SeriesStyle = SeriesStyle::line("#22d3ee");
const SPAN_A: SeriesStyle = SeriesStyle::line("#34d399");
const SPAN_B: SeriesStyle = SeriesStyle::line("#fb7185");
const CHIKOU: SeriesStyle = SeriesStyle::line("#9ca3af");

/// Ichimoku Kinko Hyo.
///
/// Emits tenkan-sen, kijun-sen, senkou span A and B (projected forward by
/// `displacement` bars) and chikou span (close projected backward by the
/// same amount).
pub struct Ichimoku {
    tenkan: usize,
    kijun: usize,
    senkou_b: usize,
    displacement: usize,
}

impl Ichimoku {
    pub fn new(
        tenkan: usize,
        kijun: usize,
        senkou_b: usize,
        displacement: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        Ok(Self {
            tenkan: require_period("tenkan", tenkan)?,
            kijun: require_period("kijun", kijun)?,
            senkou_b: require_period("senkou_b", senkou_b)?,
            displacement,
        })
    }
}

impl Indicator for Ichimoku {
    fn key(&self) -> IndicatorKey {
        IndicatorKey::Ichimoku
    }

    fn required_candles(&self) -> usize {
        self.tenkan.max(self.kijun).max(self.senkou_b)
    }

    fn layout(&self) -> OutputLayout {
        OutputLayout::Series(vec![TENKAN, KIJUN, SPAN_A, SPAN_B, CHIKOU])
    }

    fn calculate(
        &self,
        candles: &[Candle],
        interval_secs: i64,
    ) -> Result<IndicatorOutput, Report<IndicatorError>> {
        let shift = shift_seconds(interval_secs, self.displacement)?;
        let (highs, lows) = (highs(candles), lows(candles));

        let tenkan = midpoint_channel(&highs, &lows, self.tenkan);
        let kijun = midpoint_channel(&highs, &lows, self.kijun);
        let span_a: Vec<Option<f64>> = tenkan
            .iter()
            .zip(&kijun)
            .map(|(t, k)| Some((t.as_ref()? + k.as_ref()?) / 2.0))
            .collect();
        let span_b = midpoint_channel(&highs, &lows, self.senkou_b);
        let closes: Vec<Option<f64>> = candles.iter().map(|c| Some(c.close)).collect();

        Ok(IndicatorOutput::Series(vec![
            OutputSeries {
                style: TENKAN,
                points: points(candles, &tenkan),
            },
            OutputSeries {
                style: KIJUN,
                points: points(candles, &kijun),
            },
            OutputSeries {
                style: SPAN_A,
                points: shifted_points(candles, &span_a, shift)?,
            },
            OutputSeries {
                style: SPAN_B,
                points: shifted_points(candles, &span_b, shift)?,
            },
            OutputSeries {
                style: CHIKOU,
                points: shifted_points(candles, &closes, -shift)?,
            },
        ]))
    }
}
