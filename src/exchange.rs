pub mod binance;
pub mod coingecko;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::ExchangeError;
use crate::model::{Candle, MarketTicker, TimeFrame};

/// Anything that can serve a candle snapshot for a symbol.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn CandleSource`).
pub trait CandleSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch the most recent `limit` candles, ascending and unique by time.
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<ExchangeError>>>;
}

/// Which coins a market snapshot covers and the currency prices are quoted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketQuery {
    /// Provider coin ids, e.g. `"bitcoin"` or `"avalanche-2"`.
    pub ids: Vec<String>,
    pub vs_currency: String,
    pub per_page: usize,
}

impl Default for MarketQuery {
    fn default() -> Self {
        Self {
            ids: vec!["bitcoin".into(), "ethereum".into()],
            vs_currency: "usd".into(),
            per_page: 250,
        }
    }
}

/// Anything that can serve a price snapshot for a list of coins.
pub trait MarketSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch_markets(
        &self,
        query: &MarketQuery,
    ) -> BoxFuture<'_, Result<Vec<MarketTicker>, Report<ExchangeError>>>;
}
