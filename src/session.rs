use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ChartSettings, MarketSettings};
use crate::exchange::{CandleSource, MarketSource};
use crate::indicator::IndicatorKey;
use crate::model::{Candle, MarketTicker};
use crate::orchestrator::Orchestrator;
use crate::renderer::{ChartFrame, ChartRenderer};

/// What a single refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Updated { candles: usize },
    /// The snapshot was older than the one already held.
    Stale,
    /// The snapshot was not strictly ascending by time.
    Rejected,
    FetchFailed,
}

/// Market snapshot polled alongside the candles, at its own pace.
struct MarketFeed {
    source: Arc<dyn MarketSource>,
    settings: MarketSettings,
    tickers: Vec<MarketTicker>,
    fetched_at: Option<Instant>,
}

impl MarketFeed {
    fn due(&self) -> bool {
        self.fetched_at
            .is_none_or(|at| at.elapsed() >= self.settings.refresh)
    }
}

/// Polling chart: fetch candles, recompute overlays, render.
pub struct ChartSession {
    source: Arc<dyn CandleSource>,
    renderer: Box<dyn ChartRenderer>,
    orchestrator: Orchestrator,
    settings: ChartSettings,
    markets: Option<MarketFeed>,
}

impl ChartSession {
    pub fn new(
        source: Arc<dyn CandleSource>,
        renderer: Box<dyn ChartRenderer>,
        settings: ChartSettings,
    ) -> Self {
        Self {
            source,
            renderer,
            orchestrator: Orchestrator::new(),
            settings,
            markets: None,
        }
    }

    /// Poll `source` for the market snapshot configured in the settings.
    /// Without market settings the session stays chart-only.
    pub fn with_markets(mut self, source: Arc<dyn MarketSource>) -> Self {
        match self.settings.markets.clone() {
            Some(settings) => {
                self.markets = Some(MarketFeed {
                    source,
                    settings,
                    tickers: Vec::new(),
                    fetched_at: None,
                });
            }
            None => debug!("market snapshot disabled, ignoring market source"),
        }
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Latest market snapshot; empty until the first successful fetch.
    pub fn markets(&self) -> &[MarketTicker] {
        self.markets
            .as_ref()
            .map_or(&[][..], |feed| feed.tickers.as_slice())
    }

    /// Activate the configured indicators and perform the first refresh.
    pub async fn start(&mut self) -> TickOutcome {
        let interval_secs = self.settings.timeframe.seconds();
        for (key, params) in &self.settings.indicators {
            // no candles yet: drawables start empty and fill on the first update
            if let Err(e) = self
                .orchestrator
                .add_with_params(*key, params, &[], interval_secs)
            {
                warn!(indicator = %key, error = ?e, "skipping configured indicator");
            }
        }
        info!(
            symbol = %self.settings.symbol,
            timeframe = %self.settings.timeframe,
            source = self.source.name(),
            indicators = self.orchestrator.active().len(),
            markets = self.markets.is_some(),
            "chart session started"
        );
        self.tick().await
    }

    /// One poll: refresh the market snapshot when due, then the candles.
    ///
    /// Takes `&mut self`, so two ticks on the same session can never overlap.
    pub async fn tick(&mut self) -> TickOutcome {
        let markets_changed = self.refresh_markets().await;
        let outcome = self.refresh().await;
        // a candle update already rendered the new snapshot
        if markets_changed && !matches!(outcome, TickOutcome::Updated { .. }) {
            self.render();
        }
        outcome
    }

    async fn refresh(&mut self) -> TickOutcome {
        let settings = &self.settings;
        let candles = match self
            .source
            .fetch_candles(&settings.symbol, settings.timeframe, settings.limit)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!(
                    symbol = %settings.symbol,
                    source = self.source.name(),
                    error = ?e,
                    "candle fetch failed, keeping previous data"
                );
                return TickOutcome::FetchFailed;
            }
        };

        if is_stale(self.orchestrator.candles(), &candles) {
            debug!(symbol = %settings.symbol, "stale candle snapshot ignored");
            return TickOutcome::Stale;
        }

        let count = candles.len();
        if let Err(e) = self
            .orchestrator
            .update(candles, settings.timeframe.seconds())
        {
            warn!(
                symbol = %settings.symbol,
                error = ?e,
                "unordered candle snapshot rejected, keeping previous data"
            );
            return TickOutcome::Rejected;
        }
        self.render();
        debug!(symbol = %self.settings.symbol, candles = count, "tick complete");
        TickOutcome::Updated { candles: count }
    }

    /// Returns `true` when a new snapshot replaced the held one. A failed
    /// fetch keeps the previous snapshot and waits a full refresh period.
    async fn refresh_markets(&mut self) -> bool {
        let Some(feed) = self.markets.as_mut() else {
            return false;
        };
        if !feed.due() {
            return false;
        }
        feed.fetched_at = Some(Instant::now());

        match feed.source.fetch_markets(&feed.settings.query).await {
            Ok(tickers) => {
                debug!(coins = tickers.len(), "market snapshot refreshed");
                feed.tickers = tickers;
                true
            }
            Err(e) => {
                warn!(
                    source = feed.source.name(),
                    error = ?e,
                    "market fetch failed, keeping previous snapshot"
                );
                false
            }
        }
    }

    /// Activate `key` with default parameters against the held candles.
    pub fn add_indicator(&mut self, key: IndicatorKey) -> bool {
        let candles = self.orchestrator.candles().to_vec();
        let added = self
            .orchestrator
            .add(key, &candles, self.settings.timeframe.seconds());
        if added {
            self.render();
        }
        added
    }

    pub fn remove_indicator(&mut self, key: IndicatorKey) -> bool {
        let removed = self.orchestrator.remove(key);
        if removed {
            self.render();
        }
        removed
    }

    pub fn clear_indicators(&mut self) {
        self.orchestrator.clear();
        self.render();
    }

    fn render(&mut self) {
        let markets = self
            .markets
            .as_ref()
            .map_or(&[][..], |feed| feed.tickers.as_slice());
        let frame = ChartFrame::build(
            &self.settings.symbol,
            self.settings.timeframe,
            self.settings.view,
            self.settings.chart_type,
            &self.orchestrator,
        )
        .with_markets(markets);
        if let Err(e) = self.renderer.render(&frame) {
            warn!(error = ?e, "failed to render chart frame");
        }
    }

    /// Refresh every poll interval until `cancel` fires. Ticks that fall
    /// behind are dropped rather than queued.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick fires immediately and start() already refreshed
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(symbol = %self.settings.symbol, "chart session stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    debug!(?outcome, "poll");
                }
            }
        }
    }
}

/// A snapshot is stale when it ends before the held one, or is empty while
/// data is already held.
fn is_stale(held: &[Candle], fresh: &[Candle]) -> bool {
    match (held.last(), fresh.last()) {
        (Some(held), Some(fresh)) => fresh.time < held.time,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use error_stack::Report;
    use futures::future::BoxFuture;

    use super::*;
    use crate::chart_type::ChartType;
    use crate::config::OutputKind;
    use crate::error::{ExchangeError, RenderError};
    use crate::exchange::MarketQuery;
    use crate::indicator::IndicatorParams;
    use crate::indicator::testing::*;
    use crate::model::{TimeFrame, ViewRange};

    /// Replays queued snapshots; an exhausted queue or `None` fails the fetch.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Option<Vec<Candle>>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Option<Vec<Candle>>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    impl CandleSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn fetch_candles(
            &self,
            _symbol: &str,
            _timeframe: TimeFrame,
            _limit: usize,
        ) -> BoxFuture<'_, Result<Vec<Candle>, Report<ExchangeError>>> {
            let next = self.responses.lock().unwrap().pop_front().flatten();
            Box::pin(async move {
                next.ok_or_else(|| {
                    Report::new(ExchangeError::Request {
                        exchange: "scripted".into(),
                    })
                })
            })
        }
    }

    /// Replays queued market snapshots and counts the calls.
    struct ScriptedMarkets {
        responses: Mutex<VecDeque<Option<Vec<MarketTicker>>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedMarkets {
        fn new(responses: Vec<Option<Vec<MarketTicker>>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl MarketSource for ScriptedMarkets {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn fetch_markets(
            &self,
            _query: &MarketQuery,
        ) -> BoxFuture<'_, Result<Vec<MarketTicker>, Report<ExchangeError>>> {
            *self.calls.lock().unwrap() += 1;
            let next = self.responses.lock().unwrap().pop_front().flatten();
            Box::pin(async move {
                next.ok_or_else(|| {
                    Report::new(ExchangeError::Request {
                        exchange: "scripted".into(),
                    })
                })
            })
        }
    }

    fn ticker(id: &str, price: f64) -> MarketTicker {
        MarketTicker {
            id: id.into(),
            symbol: id[..3].to_uppercase(),
            name: id.into(),
            current_price: Some(price),
            price_change_percentage_24h: Some(0.5),
            market_cap: None,
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Rendered {
        main_len: usize,
        overlays: usize,
        filled: usize,
        markets: usize,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Rendered>>>);

    impl Recorder {
        fn frames(&self) -> Vec<Rendered> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ChartRenderer for Recorder {
        fn render(&mut self, frame: &ChartFrame<'_>) -> Result<(), Report<RenderError>> {
            self.0.lock().unwrap().push(Rendered {
                main_len: frame.main.len(),
                overlays: frame.overlays.len(),
                filled: frame
                    .overlays
                    .iter()
                    .filter(|o| !o.drawable.is_empty())
                    .count(),
                markets: frame.markets.len(),
            });
            Ok(())
        }
    }

    fn settings(indicators: &[IndicatorKey]) -> ChartSettings {
        ChartSettings {
            symbol: "BTCUSDT".into(),
            view: ViewRange::All,
            timeframe: TimeFrame::Min1,
            limit: 200,
            chart_type: ChartType::Candles,
            poll_interval: Duration::from_millis(10),
            output: OutputKind::Terminal,
            markets: None,
            indicators: indicators
                .iter()
                .map(|k| (*k, IndicatorParams::default()))
                .collect(),
        }
    }

    fn with_market_refresh(mut settings: ChartSettings, refresh: Duration) -> ChartSettings {
        settings.markets = Some(MarketSettings {
            query: MarketQuery::default(),
            refresh,
        });
        settings
    }

    fn snapshot(n: usize) -> Vec<Candle> {
        candles_with_spread(&zigzag_closes(n), 0.5)
    }

    #[tokio::test]
    async fn start_adds_configured_indicators_and_renders() {
        let source = ScriptedSource::new(vec![Some(snapshot(120))]);
        let recorder = Recorder::default();
        let mut session = ChartSession::new(
            source,
            Box::new(recorder.clone()),
            settings(&[IndicatorKey::Sma, IndicatorKey::Donchian]),
        );

        assert_eq!(session.start().await, TickOutcome::Updated { candles: 120 });
        assert_eq!(
            session.orchestrator().active(),
            &[IndicatorKey::Sma, IndicatorKey::Donchian]
        );
        assert_eq!(
            recorder.frames(),
            vec![Rendered {
                main_len: 120,
                overlays: 4,
                filled: 4,
                markets: 0
            }]
        );
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_state() {
        let source = ScriptedSource::new(vec![Some(snapshot(60)), None]);
        let recorder = Recorder::default();
        let mut session = ChartSession::new(
            source,
            Box::new(recorder.clone()),
            settings(&[IndicatorKey::Bollinger]),
        );
        session.start().await;
        let before = session.orchestrator().output(IndicatorKey::Bollinger).cloned();

        assert_eq!(session.tick().await, TickOutcome::FetchFailed);
        assert_eq!(session.orchestrator().candles().len(), 60);
        assert_eq!(
            session.orchestrator().output(IndicatorKey::Bollinger).cloned(),
            before
        );
        assert_eq!(recorder.frames().len(), 1);
    }

    #[tokio::test]
    async fn failed_first_fetch_keeps_indicators_active() {
        let source = ScriptedSource::new(vec![None, Some(snapshot(60))]);
        let recorder = Recorder::default();
        let mut session = ChartSession::new(
            source,
            Box::new(recorder.clone()),
            settings(&[IndicatorKey::Keltner]),
        );
        assert_eq!(session.start().await, TickOutcome::FetchFailed);
        assert_eq!(session.orchestrator().active(), &[IndicatorKey::Keltner]);

        assert_eq!(session.tick().await, TickOutcome::Updated { candles: 60 });
        assert_eq!(recorder.frames().last().unwrap().filled, 3);
    }

    #[tokio::test]
    async fn stale_snapshot_is_ignored() {
        let full = snapshot(80);
        let older = full[..70].to_vec();
        let source = ScriptedSource::new(vec![Some(full), Some(older), Some(Vec::new())]);
        let recorder = Recorder::default();
        let mut session =
            ChartSession::new(source, Box::new(recorder.clone()), settings(&[IndicatorKey::Sma]));
        session.start().await;

        assert_eq!(session.tick().await, TickOutcome::Stale);
        assert_eq!(session.tick().await, TickOutcome::Stale);
        assert_eq!(session.orchestrator().candles().len(), 80);
        assert_eq!(recorder.frames().len(), 1);
    }

    #[tokio::test]
    async fn unordered_snapshot_is_rejected() {
        let good = snapshot(60);
        let mut broken = snapshot(61);
        broken.swap(20, 21);
        let source = ScriptedSource::new(vec![Some(good.clone()), Some(broken)]);
        let recorder = Recorder::default();
        let mut session = ChartSession::new(
            source,
            Box::new(recorder.clone()),
            settings(&[IndicatorKey::Ema]),
        );
        session.start().await;
        let before = session.orchestrator().output(IndicatorKey::Ema).cloned();

        assert_eq!(session.tick().await, TickOutcome::Rejected);
        assert_eq!(session.orchestrator().candles(), good.as_slice());
        assert_eq!(
            session.orchestrator().output(IndicatorKey::Ema).cloned(),
            before
        );
        assert_eq!(recorder.frames().len(), 1);

        // the held snapshot still backs later additions
        assert!(session.add_indicator(IndicatorKey::Donchian));
        assert_eq!(recorder.frames().last().unwrap().filled, 4);
    }

    #[tokio::test]
    async fn market_snapshot_is_rendered_with_chart() {
        let markets = ScriptedMarkets::new(vec![Some(vec![
            ticker("bitcoin", 67_000.0),
            ticker("ethereum", 3_200.0),
        ])]);
        let source = ScriptedSource::new(vec![Some(snapshot(40)), Some(snapshot(41))]);
        let recorder = Recorder::default();
        let mut session = ChartSession::new(
            source,
            Box::new(recorder.clone()),
            with_market_refresh(settings(&[]), Duration::from_secs(3600)),
        )
        .with_markets(markets.clone());

        assert_eq!(session.start().await, TickOutcome::Updated { candles: 40 });
        assert_eq!(session.markets().len(), 2);
        assert_eq!(recorder.frames()[0].markets, 2);

        // not due yet: the candles refresh, the snapshot is reused
        assert_eq!(session.tick().await, TickOutcome::Updated { candles: 41 });
        assert_eq!(markets.calls(), 1);
        assert_eq!(recorder.frames()[1].markets, 2);
    }

    #[tokio::test]
    async fn market_change_renders_without_new_candles() {
        let markets = ScriptedMarkets::new(vec![
            Some(vec![ticker("bitcoin", 67_000.0)]),
            Some(vec![ticker("bitcoin", 67_100.0), ticker("solana", 150.0)]),
        ]);
        let source = ScriptedSource::new(vec![Some(snapshot(40)), None]);
        let recorder = Recorder::default();
        let mut session = ChartSession::new(
            source,
            Box::new(recorder.clone()),
            with_market_refresh(settings(&[]), Duration::ZERO),
        )
        .with_markets(markets);
        session.start().await;

        assert_eq!(session.tick().await, TickOutcome::FetchFailed);
        let frames = recorder.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].markets, 2);
        assert_eq!(frames[1].main_len, 40);
    }

    #[tokio::test]
    async fn failed_market_fetch_keeps_previous_snapshot() {
        let markets = ScriptedMarkets::new(vec![Some(vec![ticker("cardano", 0.45)]), None]);
        let source = ScriptedSource::new(vec![Some(snapshot(40)), Some(snapshot(40))]);
        let mut session = ChartSession::new(
            source,
            Box::new(Recorder::default()),
            with_market_refresh(settings(&[]), Duration::ZERO),
        )
        .with_markets(markets.clone());
        session.start().await;

        assert_eq!(session.tick().await, TickOutcome::Updated { candles: 40 });
        assert_eq!(markets.calls(), 2);
        assert_eq!(session.markets(), &[ticker("cardano", 0.45)]);
    }

    #[tokio::test]
    async fn market_source_ignored_when_disabled() {
        let markets = ScriptedMarkets::new(vec![Some(vec![ticker("bitcoin", 1.0)])]);
        let source = ScriptedSource::new(vec![Some(snapshot(30))]);
        let mut session =
            ChartSession::new(source, Box::new(Recorder::default()), settings(&[]))
                .with_markets(markets.clone());
        session.start().await;
        assert_eq!(markets.calls(), 0);
        assert!(session.markets().is_empty());
    }

    #[tokio::test]
    async fn runtime_add_remove_and_clear_render() {
        let source = ScriptedSource::new(vec![Some(snapshot(100))]);
        let recorder = Recorder::default();
        let mut session =
            ChartSession::new(source, Box::new(recorder.clone()), settings(&[IndicatorKey::Sma]));
        session.start().await;

        assert!(session.add_indicator(IndicatorKey::Fractal));
        assert!(!session.add_indicator(IndicatorKey::Fractal));
        assert_eq!(recorder.frames().last().unwrap().overlays, 2);

        assert!(session.remove_indicator(IndicatorKey::Sma));
        assert!(!session.remove_indicator(IndicatorKey::Sma));
        assert_eq!(session.orchestrator().active(), &[IndicatorKey::Fractal]);

        session.clear_indicators();
        assert!(session.orchestrator().active().is_empty());
        assert_eq!(recorder.frames().last().unwrap().overlays, 0);
        assert_eq!(recorder.frames().len(), 4);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let source = ScriptedSource::new(vec![Some(snapshot(30)), Some(snapshot(31))]);
        let mut session =
            ChartSession::new(source, Box::new(Recorder::default()), settings(&[]));
        session.start().await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(session.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("session did not stop")
            .unwrap();
    }

    #[test]
    fn staleness_rules() {
        let a = snapshot(10);
        assert!(!is_stale(&[], &a));
        assert!(!is_stale(&[], &[]));
        assert!(!is_stale(&a[..5], &a));
        assert!(!is_stale(&a, &a));
        assert!(is_stale(&a, &a[..5]));
        assert!(is_stale(&a, &[]));
    }
}
