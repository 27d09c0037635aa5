pub mod json;
pub mod terminal;

use error_stack::Report;
use serde::Serialize;

use crate::chart_type::{ChartType, MainSeries};
use crate::drawable::Drawable;
use crate::error::RenderError;
use crate::indicator::IndicatorKey;
use crate::model::{MarketTicker, TimeFrame, ViewRange};
use crate::orchestrator::Orchestrator;

/// One overlay element tagged with the indicator that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Overlay<'a> {
    pub indicator: IndicatorKey,
    #[serde(flatten)]
    pub drawable: &'a Drawable,
}

fn no_markets(markets: &&[MarketTicker]) -> bool {
    markets.is_empty()
}

/// Everything a renderer needs to draw the chart once.
#[derive(Debug, Clone, Serialize)]
pub struct ChartFrame<'a> {
    pub symbol: &'a str,
    pub timeframe: TimeFrame,
    pub chart_type: ChartType,
    /// Left edge of the visible window; `None` fits all data.
    pub visible_from: Option<i64>,
    pub main: MainSeries,
    pub overlays: Vec<Overlay<'a>>,
    /// Market snapshot shown beside the chart, omitted when empty.
    #[serde(skip_serializing_if = "no_markets")]
    pub markets: &'a [MarketTicker],
}

impl<'a> ChartFrame<'a> {
    pub fn build(
        symbol: &'a str,
        timeframe: TimeFrame,
        view: ViewRange,
        chart_type: ChartType,
        orchestrator: &'a Orchestrator,
    ) -> Self {
        let candles = orchestrator.candles();
        let visible_from = view
            .window_seconds()
            .zip(candles.last())
            .map(|(window, last)| last.time.saturating_sub(window));
        Self {
            symbol,
            timeframe,
            chart_type,
            visible_from,
            main: MainSeries::build(chart_type, candles),
            overlays: orchestrator
                .drawables()
                .map(|(indicator, drawable)| Overlay {
                    indicator,
                    drawable,
                })
                .collect(),
            markets: &[],
        }
    }

    pub fn with_markets(self, markets: &'a [MarketTicker]) -> Self {
        Self { markets, ..self }
    }
}

/// Sink for chart frames.
pub trait ChartRenderer: Send {
    fn render(&mut self, frame: &ChartFrame<'_>) -> Result<(), Report<RenderError>>;
}
