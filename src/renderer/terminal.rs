use chrono::DateTime;
use error_stack::Report;

use crate::drawable::Drawable;
use crate::error::RenderError;
use crate::renderer::{ChartFrame, ChartRenderer};

/// Logs a one-line summary of the frame and the latest value of every overlay.
pub struct TerminalRenderer;

fn format_time(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn format_change(pct: Option<f64>) -> String {
    pct.map_or_else(|| "n/a".into(), |p| format!("{p:+.2}%"))
}

impl ChartRenderer for TerminalRenderer {
    fn render(&mut self, frame: &ChartFrame<'_>) -> Result<(), Report<RenderError>> {
        tracing::info!(
            symbol = frame.symbol,
            timeframe = %frame.timeframe,
            chart_type = %frame.chart_type,
            candles = frame.main.len(),
            last = ?frame.main.last_value(),
            overlays = frame.overlays.len(),
            "chart updated",
        );

        for overlay in &frame.overlays {
            match overlay.drawable {
                Drawable::Series { style, points } => match points.last() {
                    Some(p) => tracing::info!(
                        indicator = %overlay.indicator,
                        color = style.color,
                        time = %format_time(p.time),
                        value = p.value,
                        "{}",
                        overlay.indicator.label(),
                    ),
                    None => tracing::debug!(indicator = %overlay.indicator, "no data yet"),
                },
                Drawable::Markers { markers } => {
                    if let Some(m) = markers.last() {
                        tracing::info!(
                            indicator = %overlay.indicator,
                            markers = markers.len(),
                            time = %format_time(m.time),
                            position = ?m.position,
                            "{}",
                            overlay.indicator.label(),
                        );
                    }
                }
            }
        }

        for ticker in frame.markets {
            tracing::info!(
                coin = %ticker.symbol,
                price = ?ticker.current_price,
                change_24h = %format_change(ticker.price_change_percentage_24h),
                market_cap = ?ticker.market_cap,
                "{}",
                ticker.name,
            );
        }
        Ok(())
    }
}
