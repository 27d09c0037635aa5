use std::sync::Arc;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ExchangeError;
use crate::exchange::CandleSource;
use crate::model::{Candle, TimeFrame, normalize_candles};

pub const BINANCE_BASE_URL: &str = "https://api.binance.com";
const MAX_CANDLES_PER_REQUEST: usize = 1000;

/// Binance public kline endpoint (`GET /api/v3/klines`).
pub struct BinanceCandleSource {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl BinanceCandleSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        // kline requests weigh 2; 20/s keeps far below the 6000 weight/min cap
        let quota = Quota::per_second(nonzero!(20u32));
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

impl Default for BinanceCandleSource {
    fn default() -> Self {
        Self::new(BINANCE_BASE_URL)
    }
}

fn request_error() -> ExchangeError {
    ExchangeError::Request {
        exchange: "binance".into(),
    }
}

fn parse_error() -> ExchangeError {
    ExchangeError::ResponseParse {
        exchange: "binance".into(),
    }
}

impl CandleSource for BinanceCandleSource {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<ExchangeError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            self.rate_limiter.until_ready().await;

            let url = format!("{}/api/v3/klines", self.base_url);
            let fetch_limit = limit.clamp(1, MAX_CANDLES_PER_REQUEST);
            if fetch_limit != limit {
                debug!(requested = limit, fetch_limit, "binance kline limit clamped");
            }

            let limit_str = fetch_limit.to_string();
            let params = [
                ("symbol", symbol.as_str()),
                ("interval", timeframe.as_str()),
                ("limit", limit_str.as_str()),
            ];

            let response = self
                .client
                .get(&url)
                .query(&params)
                .send()
                .await
                .change_context(request_error())
                .attach_with(|| format!("url: {url}"))?;

            if !response.status().is_success() {
                return Err(Report::new(request_error())
                    .attach(format!("HTTP status: {}", response.status())));
            }

            let raw: Vec<BinanceKlineRow> = response.json().await.change_context(parse_error())?;

            let candles = raw
                .into_iter()
                .map(BinanceKlineRow::into_candle)
                .collect::<Result<Vec<_>, _>>()?;
            let candles = normalize_candles(candles);

            info!(
                symbol = %symbol,
                timeframe = %timeframe,
                fetched = candles.len(),
                "binance candle fetch complete"
            );
            Ok(candles)
        })
    }
}

// ── REST response types ───────────────────────────────────────────────────────

/// Binance kline row: 12-element array
/// [open_time, open, high, low, close, volume, close_time, ...]
#[derive(Debug, Deserialize)]
struct BinanceKlineRow(
    i64,                                      // 0: open_time (ms)
    String,                                   // 1: open
    String,                                   // 2: high
    String,                                   // 3: low
    String,                                   // 4: close
    String,                                   // 5: volume
    #[allow(dead_code)] i64,                  // 6: close_time
    #[allow(dead_code)] String,               // 7: quote asset volume
    #[allow(dead_code)] i64,                  // 8: number of trades
    #[allow(dead_code)] String,               // 9: taker buy base volume
    #[allow(dead_code)] String,               // 10: taker buy quote volume
    #[allow(dead_code)] serde_json::Value,    // 11: ignore
);

impl BinanceKlineRow {
    fn into_candle(self) -> Result<Candle, Report<ExchangeError>> {
        let parse_f64 = |field: &str, s: &str| -> Result<f64, Report<ExchangeError>> {
            s.parse::<f64>()
                .change_context(parse_error())
                .attach_with(|| format!("{field}: {s:?}"))
        };

        Ok(Candle {
            time: self.0 / 1000,
            open: parse_f64("open", &self.1)?,
            high: parse_f64("high", &self.2)?,
            low: parse_f64("low", &self.3)?,
            close: parse_f64("close", &self.4)?,
            volume: parse_f64("volume", &self.5)?,
        })
    }
}
