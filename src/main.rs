use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use coin_chart::config::{self, AppConfig, OutputKind};
use coin_chart::exchange::binance::BinanceCandleSource;
use coin_chart::exchange::coingecko::CoinGeckoMarketSource;
use coin_chart::exchange::{CandleSource, MarketSource};
use coin_chart::renderer::ChartRenderer;
use coin_chart::renderer::json::JsonRenderer;
use coin_chart::renderer::terminal::TerminalRenderer;
use coin_chart::session::{ChartSession, TickOutcome};

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("exchange error")]
    Exchange,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(name = "coin-chart", about = "Crypto candlestick chart with technical overlays")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Fetch and render once, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    let settings = config.settings().change_context(AppError::Config)?;
    let source: Arc<dyn CandleSource> =
        Arc::new(BinanceCandleSource::new(config.chart.base_url.as_str()));
    let renderer: Box<dyn ChartRenderer> = match settings.output {
        OutputKind::Terminal => Box::new(TerminalRenderer),
        OutputKind::Json => Box::new(JsonRenderer::new(std::io::stdout())),
    };

    let markets: Arc<dyn MarketSource> =
        Arc::new(CoinGeckoMarketSource::new(config.markets.base_url.as_str()));

    let mut session = ChartSession::new(source, renderer, settings).with_markets(markets);
    let outcome = session.start().await;

    if cli.once {
        return match outcome {
            TickOutcome::Updated { .. } => Ok(()),
            other => Err(Report::new(AppError::Exchange)
                .attach(format!("initial refresh did not complete: {other:?}"))),
        };
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .change_context(AppError::Runtime)?;

    info!("ctrl+c received, shutting down");
    cancel.cancel();
    handle.await.change_context(AppError::Runtime)?;

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    // stdout is reserved for the json renderer
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
