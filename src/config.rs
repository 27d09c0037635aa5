use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use error_stack::{Report, ResultExt, bail};
use serde::Deserialize;

use crate::chart_type::ChartType;
use crate::error::ConfigError;
use crate::exchange::MarketQuery;
use crate::exchange::binance::BINANCE_BASE_URL;
use crate::exchange::coingecko::COINGECKO_BASE_URL;
use crate::indicator::{IndicatorKey, IndicatorParams, build_indicator};
use crate::model::{TimeFrame, ViewRange};

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_output() -> String {
    "terminal".into()
}

fn default_symbol() -> String {
    "BTCUSDT".into()
}

fn default_view() -> String {
    "all".into()
}

fn default_chart_type() -> String {
    "candles".into()
}

fn default_base_url() -> String {
    BINANCE_BASE_URL.into()
}

fn default_markets_enabled() -> bool {
    true
}

fn default_markets_base_url() -> String {
    COINGECKO_BASE_URL.into()
}

fn default_market_ids() -> Vec<String> {
    [
        "bitcoin",
        "ethereum",
        "binancecoin",
        "cardano",
        "solana",
        "polkadot",
        "dogecoin",
        "avalanche-2",
        "chainlink",
        "polygon",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_vs_currency() -> String {
    "usd".into()
}

fn default_per_page() -> usize {
    250
}

fn default_market_refresh_secs() -> u64 {
    10
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub markets: MarketsConfig,
    #[serde(default)]
    pub indicators: Vec<IndicatorConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Accepted values: `"terminal"` | `"json"`
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            poll_interval_secs: default_poll_interval_secs(),
            output: default_output(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_view")]
    pub view: String,
    /// Overrides the interval picked by `view`.
    pub interval: Option<String>,
    /// Overrides the candle count picked by `view`.
    pub limit: Option<usize>,
    #[serde(default = "default_chart_type")]
    pub chart_type: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            view: default_view(),
            interval: None,
            limit: None,
            chart_type: default_chart_type(),
            base_url: default_base_url(),
        }
    }
}

/// Market snapshot shown next to the chart.
#[derive(Debug, Deserialize)]
pub struct MarketsConfig {
    #[serde(default = "default_markets_enabled")]
    pub enabled: bool,
    #[serde(default = "default_markets_base_url")]
    pub base_url: String,
    /// Provider coin ids, not ticker symbols.
    #[serde(default = "default_market_ids")]
    pub ids: Vec<String>,
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default = "default_market_refresh_secs")]
    pub refresh_secs: u64,
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            enabled: default_markets_enabled(),
            base_url: default_markets_base_url(),
            ids: default_market_ids(),
            vs_currency: default_vs_currency(),
            per_page: default_per_page(),
            refresh_secs: default_market_refresh_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IndicatorConfig {
    pub key: String,
    #[serde(default)]
    pub params: toml::Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Terminal,
    Json,
}

/// Typed view of a validated config, ready to drive a chart session.
#[derive(Debug, Clone)]
pub struct ChartSettings {
    pub symbol: String,
    pub view: ViewRange,
    pub timeframe: TimeFrame,
    pub limit: usize,
    pub chart_type: ChartType,
    pub poll_interval: Duration,
    pub output: OutputKind,
    /// `None` when the market snapshot is disabled.
    pub markets: Option<MarketSettings>,
    pub indicators: Vec<(IndicatorKey, IndicatorParams)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketSettings {
    pub query: MarketQuery,
    /// Minimum time between two snapshot fetches.
    pub refresh: Duration,
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

impl AppConfig {
    pub fn settings(&self) -> Result<ChartSettings, Report<ConfigError>> {
        let view = parse_view(&self.chart)?;
        let (preset_timeframe, preset_limit) = view.fetch_plan();
        let timeframe = match &self.chart.interval {
            Some(interval) => parse_interval(interval)?,
            None => preset_timeframe,
        };
        Ok(ChartSettings {
            symbol: self.chart.symbol.trim().to_uppercase(),
            view,
            timeframe,
            limit: self.chart.limit.unwrap_or(preset_limit),
            chart_type: parse_chart_type(&self.chart)?,
            poll_interval: Duration::from_secs(self.general.poll_interval_secs),
            output: parse_output(&self.general)?,
            markets: self.markets.enabled.then(|| MarketSettings {
                query: MarketQuery {
                    ids: self.markets.ids.iter().map(|id| id.trim().to_lowercase()).collect(),
                    vs_currency: self.markets.vs_currency.trim().to_lowercase(),
                    per_page: self.markets.per_page,
                },
                refresh: Duration::from_secs(self.markets.refresh_secs),
            }),
            indicators: parse_indicators(&self.indicators)?,
        })
    }
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(&config.general)?;
    validate_chart(&config.chart)?;
    validate_markets(&config.markets)?;
    validate_indicators(&config.indicators)?;
    Ok(())
}

fn validate_general(general: &GeneralConfig) -> Result<(), Report<ConfigError>> {
    if !matches!(general.log_format.as_str(), "text" | "json") {
        return Err(invalid(format!(
            "general.log_format \"{}\" is not valid",
            general.log_format
        )));
    }
    if general.poll_interval_secs == 0 {
        return Err(invalid("general.poll_interval_secs must be > 0".into()));
    }
    parse_output(general)?;
    Ok(())
}

fn validate_chart(chart: &ChartConfig) -> Result<(), Report<ConfigError>> {
    if chart.symbol.trim().is_empty() {
        return Err(invalid("chart.symbol must not be empty".into()));
    }
    parse_view(chart)?;
    if let Some(interval) = &chart.interval {
        parse_interval(interval)?;
    }
    if chart.limit == Some(0) {
        return Err(invalid("chart.limit must be > 0".into()));
    }
    parse_chart_type(chart)?;
    Ok(())
}

fn validate_markets(markets: &MarketsConfig) -> Result<(), Report<ConfigError>> {
    if !markets.enabled {
        return Ok(());
    }
    if markets.ids.is_empty() || markets.ids.iter().any(|id| id.trim().is_empty()) {
        return Err(invalid("markets.ids must list at least one non-empty id".into()));
    }
    if markets.vs_currency.trim().is_empty() {
        return Err(invalid("markets.vs_currency must not be empty".into()));
    }
    if !(1..=250).contains(&markets.per_page) {
        return Err(invalid("markets.per_page must be within 1..=250".into()));
    }
    if markets.refresh_secs == 0 {
        return Err(invalid("markets.refresh_secs must be > 0".into()));
    }
    Ok(())
}

fn validate_indicators(indicators: &[IndicatorConfig]) -> Result<(), Report<ConfigError>> {
    let mut seen = HashSet::new();
    for indicator in indicators {
        if !seen.insert(indicator.key.as_str()) {
            return Err(invalid(format!(
                "indicators: duplicate key \"{}\"",
                indicator.key
            )));
        }
    }
    parse_indicators(indicators)?;
    Ok(())
}

fn parse_output(general: &GeneralConfig) -> Result<OutputKind, Report<ConfigError>> {
    match general.output.as_str() {
        "terminal" => Ok(OutputKind::Terminal),
        "json" => Ok(OutputKind::Json),
        other => Err(invalid(format!("general.output \"{other}\" is not valid"))),
    }
}

fn parse_view(chart: &ChartConfig) -> Result<ViewRange, Report<ConfigError>> {
    ViewRange::from_str(&chart.view)
        .ok_or_else(|| invalid(format!("chart.view: unknown view \"{}\"", chart.view)))
}

fn parse_interval(interval: &str) -> Result<TimeFrame, Report<ConfigError>> {
    TimeFrame::from_str(interval)
        .ok_or_else(|| invalid(format!("chart.interval: unknown interval \"{interval}\"")))
}

fn parse_chart_type(chart: &ChartConfig) -> Result<ChartType, Report<ConfigError>> {
    ChartType::from_str(&chart.chart_type).ok_or_else(|| {
        invalid(format!(
            "chart.chart_type: unknown chart type \"{}\"",
            chart.chart_type
        ))
    })
}

fn parse_indicators(
    indicators: &[IndicatorConfig],
) -> Result<Vec<(IndicatorKey, IndicatorParams)>, Report<ConfigError>> {
    indicators
        .iter()
        .map(|indicator| -> Result<_, Report<ConfigError>> {
            let key = IndicatorKey::from_str(&indicator.key).ok_or_else(|| {
                invalid(format!(
                    "indicators.key: unknown indicator \"{}\"",
                    indicator.key
                ))
            })?;
            let params = parse_indicator_params(key, &indicator.params)?;
            build_indicator(key, &params).change_context(ConfigError::Validation {
                field: format!("indicators[\"{key}\"].params"),
            })?;
            Ok((key, params))
        })
        .collect()
}

const USIZE_PARAMS: &[&str] = &[
    "period",
    "atr_period",
    "tenkan",
    "kijun",
    "senkou_b",
    "displacement",
    "jaw",
    "teeth",
    "lips",
    "jaw_shift",
    "teeth_shift",
    "lips_shift",
];
const F64_PARAMS: &[&str] = &["mult", "percent", "step", "max_step", "deviation_pct"];

fn parse_indicator_params(
    key: IndicatorKey,
    table: &toml::Table,
) -> Result<IndicatorParams, Report<ConfigError>> {
    let field = |name: &str| format!("indicators[\"{key}\"].params.{name}");

    for name in table.keys() {
        if !USIZE_PARAMS.contains(&name.as_str()) && !F64_PARAMS.contains(&name.as_str()) {
            bail!(ConfigError::Validation {
                field: format!("{}: unknown parameter", field(name)),
            });
        }
    }

    let get_usize = |name: &str| -> Result<Option<usize>, Report<ConfigError>> {
        let Some(value) = table.get(name) else {
            return Ok(None);
        };
        value
            .as_integer()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| invalid(format!("{}: expected a non-negative integer", field(name))))
    };
    let get_f64 = |name: &str| -> Result<Option<f64>, Report<ConfigError>> {
        let Some(value) = table.get(name) else {
            return Ok(None);
        };
        // integers are accepted where a float is expected
        value
            .as_float()
            .or_else(|| value.as_integer().map(|n| n as f64))
            .map(Some)
            .ok_or_else(|| invalid(format!("{}: expected a number", field(name))))
    };

    Ok(IndicatorParams {
        period: get_usize("period")?,
        mult: get_f64("mult")?,
        percent: get_f64("percent")?,
        atr_period: get_usize("atr_period")?,
        step: get_f64("step")?,
        max_step: get_f64("max_step")?,
        deviation_pct: get_f64("deviation_pct")?,
        tenkan: get_usize("tenkan")?,
        kijun: get_usize("kijun")?,
        senkou_b: get_usize("senkou_b")?,
        displacement: get_usize("displacement")?,
        jaw: get_usize("jaw")?,
        teeth: get_usize("teeth")?,
        lips: get_usize("lips")?,
        jaw_shift: get_usize("jaw_shift")?,
        teeth_shift: get_usize("teeth_shift")?,
        lips_shift: get_usize("lips_shift")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"
poll_interval_secs = 5
output = "json"

[chart]
symbol = "ethusdt"
view = "4h"
chart_type = "heikin"
base_url = "http://localhost:8080"

[markets]
ids = ["Bitcoin", "solana"]
vs_currency = "EUR"
per_page = 50
refresh_secs = 30

[[indicators]]
key = "bb"
params = { period = 30, mult = 2.5 }

[[indicators]]
key = "alligator"
params = { jaw = 21, jaw_shift = 13 }

[[indicators]]
key = "psar"
"#;
        let config = parse(toml);
        validate(&config).unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.symbol, "ETHUSDT");
        assert_eq!(settings.view, ViewRange::Hour4);
        assert_eq!(settings.timeframe, TimeFrame::Min5);
        assert_eq!(settings.limit, 300);
        assert_eq!(settings.chart_type, ChartType::Heikin);
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.output, OutputKind::Json);
        assert_eq!(settings.indicators.len(), 3);
        assert_eq!(settings.indicators[0].0, IndicatorKey::Bollinger);
        assert_eq!(settings.indicators[0].1.period, Some(30));
        assert_eq!(settings.indicators[0].1.mult, Some(2.5));
        assert_eq!(settings.indicators[1].1.jaw_shift, Some(13));
        assert_eq!(settings.indicators[2].1, IndicatorParams::default());

        let markets = settings.markets.unwrap();
        assert_eq!(markets.query.ids, vec!["bitcoin", "solana"]);
        assert_eq!(markets.query.vs_currency, "eur");
        assert_eq!(markets.query.per_page, 50);
        assert_eq!(markets.refresh, Duration::from_secs(30));
    }

    #[test]
    fn defaults_applied_when_fields_omitted() {
        let config = parse("");
        validate(&config).unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.general.poll_interval_secs, 10);
        assert_eq!(config.general.output, "terminal");
        assert_eq!(config.chart.base_url, BINANCE_BASE_URL);

        let settings = config.settings().unwrap();
        assert_eq!(settings.symbol, "BTCUSDT");
        assert_eq!(settings.view, ViewRange::All);
        assert_eq!(settings.timeframe, TimeFrame::Min15);
        assert_eq!(settings.limit, 1440);
        assert_eq!(settings.chart_type, ChartType::Candles);
        assert!(settings.indicators.is_empty());

        assert_eq!(config.markets.base_url, COINGECKO_BASE_URL);
        let markets = settings.markets.unwrap();
        assert_eq!(markets.query.ids.len(), 10);
        assert_eq!(markets.query.ids[7], "avalanche-2");
        assert_eq!(markets.query.vs_currency, "usd");
        assert_eq!(markets.query.per_page, 250);
        assert_eq!(markets.refresh, Duration::from_secs(10));
    }

    #[test]
    fn disabled_markets_skip_validation() {
        let config = parse("[markets]\nenabled = false\nids = []");
        validate(&config).unwrap();
        assert_eq!(config.settings().unwrap().markets, None);
    }

    #[test]
    fn interval_and_limit_override_view_preset() {
        let config = parse(
            r#"
[chart]
view = "1h"
interval = "5m"
limit = 50
"#,
        );
        validate(&config).unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.timeframe, TimeFrame::Min5);
        assert_eq!(settings.limit, 50);
    }

    #[test]
    fn integer_accepted_for_float_param() {
        let config = parse(
            r#"
[[indicators]]
key = "supertrend"
params = { mult = 4 }
"#,
        );
        let settings = config.settings().unwrap();
        assert_eq!(settings.indicators[0].1.mult, Some(4.0));
    }

    #[test]
    fn invalid_values_rejected() {
        let cases = [
            "[general]\nlog_format = \"xml\"",
            "[general]\npoll_interval_secs = 0",
            "[general]\noutput = \"svg\"",
            "[chart]\nview = \"1w\"",
            "[chart]\ninterval = \"2m\"",
            "[chart]\nlimit = 0",
            "[chart]\nchart_type = \"renko\"",
            "[chart]\nsymbol = \"  \"",
            "[markets]\nids = []",
            "[markets]\nids = [\"bitcoin\", \" \"]",
            "[markets]\nvs_currency = \"\"",
            "[markets]\nper_page = 0",
            "[markets]\nper_page = 251",
            "[markets]\nrefresh_secs = 0",
            "[[indicators]]\nkey = \"macd\"",
            "[[indicators]]\nkey = \"sma\"\nparams = { period = 0 }",
            "[[indicators]]\nkey = \"sma\"\nparams = { period = -3 }",
            "[[indicators]]\nkey = \"sma\"\nparams = { length = 3 }",
            "[[indicators]]\nkey = \"psar\"\nparams = { step = 0.5, max_step = 0.2 }",
            "[[indicators]]\nkey = \"bb\"\nparams = { mult = \"wide\" }",
        ];
        for case in cases {
            let config = parse(case);
            assert!(validate(&config).is_err(), "accepted: {case}");
        }
    }

    #[test]
    fn duplicate_indicator_keys_rejected() {
        let config = parse(
            r#"
[[indicators]]
key = "sma"

[[indicators]]
key = "sma"
params = { period = 50 }
"#,
        );
        let err = validate(&config).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConfigError::Validation { field } if field.contains("duplicate")
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load(Path::new("/nonexistent/coin-chart.toml")).unwrap_err();
        assert!(matches!(err.current_context(), ConfigError::ReadFile));
    }
}
