use std::sync::Arc;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ExchangeError;
use crate::exchange::{MarketQuery, MarketSource};
use crate::model::MarketTicker;

pub const COINGECKO_BASE_URL: &str = "https://api.coingecko.com";
const MAX_PER_PAGE: usize = 250;
const CLIENT_AGENT: &str = concat!("coin-chart/", env!("CARGO_PKG_VERSION"));

/// CoinGecko market snapshot endpoint (`GET /api/v3/coins/markets`).
pub struct CoinGeckoMarketSource {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl CoinGeckoMarketSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        // the public tier answers 429 well before 60 calls a minute
        let quota = Quota::per_minute(nonzero!(30u32));
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

impl Default for CoinGeckoMarketSource {
    fn default() -> Self {
        Self::new(COINGECKO_BASE_URL)
    }
}

fn request_error() -> ExchangeError {
    ExchangeError::Request {
        exchange: "coingecko".into(),
    }
}

fn parse_error() -> ExchangeError {
    ExchangeError::ResponseParse {
        exchange: "coingecko".into(),
    }
}

impl MarketSource for CoinGeckoMarketSource {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    fn fetch_markets(
        &self,
        query: &MarketQuery,
    ) -> BoxFuture<'_, Result<Vec<MarketTicker>, Report<ExchangeError>>> {
        let ids = query.ids.join(",");
        let vs_currency = query.vs_currency.clone();
        let per_page = query.per_page.clamp(1, MAX_PER_PAGE);
        if per_page != query.per_page {
            debug!(requested = query.per_page, per_page, "coingecko page size clamped");
        }

        Box::pin(async move {
            self.rate_limiter.until_ready().await;

            let url = format!("{}/api/v3/coins/markets", self.base_url);
            let per_page_str = per_page.to_string();
            let params = [
                ("vs_currency", vs_currency.as_str()),
                ("ids", ids.as_str()),
                ("per_page", per_page_str.as_str()),
            ];

            let response = self
                .client
                .get(&url)
                .query(&params)
                .header(ACCEPT, "application/json")
                .header(USER_AGENT, CLIENT_AGENT)
                .send()
                .await
                .change_context(request_error())
                .attach_with(|| format!("url: {url}"))?;

            if !response.status().is_success() {
                return Err(Report::new(request_error())
                    .attach(format!("HTTP status: {}", response.status())));
            }

            let rows: Vec<CoinGeckoMarketRow> =
                response.json().await.change_context(parse_error())?;
            let tickers: Vec<MarketTicker> = rows
                .into_iter()
                .map(CoinGeckoMarketRow::into_ticker)
                .collect();

            info!(
                vs_currency = %vs_currency,
                fetched = tickers.len(),
                "coingecko market fetch complete"
            );
            Ok(tickers)
        })
    }
}

// ── REST response types ───────────────────────────────────────────────────────

/// One element of the `/coins/markets` array. Only the fields the snapshot
/// shows are read; numbers may be null for thinly traded coins.
#[derive(Debug, Deserialize)]
struct CoinGeckoMarketRow {
    id: String,
    symbol: String,
    name: String,
    current_price: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    market_cap: Option<f64>,
}

impl CoinGeckoMarketRow {
    fn into_ticker(self) -> MarketTicker {
        MarketTicker {
            id: self.id,
            symbol: self.symbol.to_uppercase(),
            name: self.name,
            current_price: self.current_price,
            price_change_percentage_24h: self.price_change_percentage_24h,
            market_cap: self.market_cap,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn query(ids: &[&str]) -> MarketQuery {
        MarketQuery {
            ids: ids.iter().map(|id| (*id).to_owned()).collect(),
            ..MarketQuery::default()
        }
    }

    #[tokio::test]
    async fn fetch_reads_snapshot_fields() {
        let server = MockServer::start().await;
        let body = json!([
            {
                "id": "bitcoin",
                "symbol": "btc",
                "name": "Bitcoin",
                "image": "https://assets.coingecko.com/coins/images/1/large/bitcoin.png",
                "current_price": 67123.5,
                "market_cap": 1_320_000_000_000.0,
                "price_change_percentage_24h": -1.25
            },
            {
                "id": "avalanche-2",
                "symbol": "avax",
                "name": "Avalanche",
                "current_price": 27.1,
                "market_cap": null,
                "price_change_percentage_24h": null
            }
        ]);
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/markets"))
            .and(query_param("vs_currency", "usd"))
            .and(query_param("ids", "bitcoin,avalanche-2"))
            .and(query_param("per_page", "250"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;

        let source = CoinGeckoMarketSource::new(server.uri());
        let tickers = source
            .fetch_markets(&query(&["bitcoin", "avalanche-2"]))
            .await
            .unwrap();

        assert_eq!(tickers.len(), 2);
        assert_eq!(tickers[0].id, "bitcoin");
        assert_eq!(tickers[0].symbol, "BTC");
        assert_eq!(tickers[0].current_price, Some(67123.5));
        assert_eq!(tickers[0].price_change_percentage_24h, Some(-1.25));
        assert_eq!(tickers[1].name, "Avalanche");
        assert_eq!(tickers[1].market_cap, None);
        assert_eq!(tickers[1].price_change_percentage_24h, None);
    }

    #[tokio::test]
    async fn oversized_page_is_clamped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/markets"))
            .and(query_param("vs_currency", "eur"))
            .and(query_param("per_page", "250"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let source = CoinGeckoMarketSource::new(format!("{}/", server.uri()));
        let market_query = MarketQuery {
            vs_currency: "eur".into(),
            per_page: 1000,
            ..MarketQuery::default()
        };
        let tickers = source.fetch_markets(&market_query).await.unwrap();
        assert!(tickers.is_empty());
    }

    #[tokio::test]
    async fn rate_limited_status_is_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/markets"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let source = CoinGeckoMarketSource::new(server.uri());
        let err = source
            .fetch_markets(&MarketQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            ExchangeError::Request { .. }
        ));
    }

    #[tokio::test]
    async fn error_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/markets"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "error": "coin not found" })),
            )
            .mount(&server)
            .await;

        let source = CoinGeckoMarketSource::new(server.uri());
        let err = source
            .fetch_markets(&MarketQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            ExchangeError::ResponseParse { .. }
        ));
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_markets() {
        let source = CoinGeckoMarketSource::default();
        let tickers = source
            .fetch_markets(&MarketQuery::default())
            .await
            .unwrap();
        assert!(tickers.iter().any(|t| t.id == "bitcoin"));
    }
}
