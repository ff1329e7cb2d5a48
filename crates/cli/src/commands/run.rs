//! Paper-mode strategy run.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::Args;
use rust_decimal::Decimal;
use tracing::{info, warn};

use ratio_spread_core::{
    Clock, ConfigLoader, ManualClock, NotificationSink, StrategyState, SystemClock,
};
use ratio_spread_engine::{
    Collaborators, FanoutSink, LedgerJournal, PositionLedger, StrategyRunner, TracingSink,
};
use ratio_spread_paper::{
    FyersSymbolResolver, PaperGateway, PaperGatewayConfig, SimulatedFeed, StaticSession,
    WeeklyExpiryCalendar,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/strategy.toml")]
    pub config: String,

    /// Optional log file path (logs to file instead of stderr)
    #[arg(long)]
    pub log_file: Option<String>,

    /// Simulated underlying spot price
    #[arg(long, default_value = "26000")]
    pub spot: Decimal,

    /// Simulated premium quoted for every option symbol
    #[arg(long, default_value = "100")]
    pub premium: Decimal,

    /// Margin the paper broker reports as blocked (estimated when omitted)
    #[arg(long)]
    pub blocked_margin: Option<Decimal>,

    /// Freeze the exchange clock at this local time (YYYY-MM-DDTHH:MM:SS)
    #[arg(long)]
    pub at: Option<NaiveDateTime>,

    /// Square off any open position on Ctrl+C instead of leaving it journaled
    #[arg(long)]
    pub flatten_on_exit: bool,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = ConfigLoader::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config))?;
    let tz = config.tz()?;
    let config = Arc::new(config);

    let clock: Arc<dyn Clock> = match args.at {
        Some(at) => {
            info!(%at, "Using frozen clock");
            Arc::new(ManualClock::new(at))
        }
        None => Arc::new(SystemClock::new(tz)),
    };

    let feed = Arc::new(SimulatedFeed::new());
    feed.set_spot(&config.instrument, args.spot);
    feed.set_default_quote(Some(args.premium));

    let gateway = Arc::new(
        PaperGateway::new(PaperGatewayConfig {
            default_fill_price: args.premium,
            blocked_margin: args.blocked_margin,
            ..PaperGatewayConfig::default()
        })
        .with_feed(feed.clone()),
    );

    let ledger = Arc::new(match &config.journal_path {
        Some(path) => PositionLedger::with_journal(LedgerJournal::new(path))
            .with_context(|| format!("Refusing to start: journal {path:?} is unreadable"))?,
        None => PositionLedger::new(),
    });

    let sink: Arc<dyn NotificationSink> = Arc::new(FanoutSink::new().with(Arc::new(TracingSink)));
    let deps = Collaborators {
        session: Arc::new(StaticSession::default()),
        feed,
        gateway,
        expiries: Arc::new(WeeklyExpiryCalendar::from_config(&config)),
        symbols: Arc::new(FyersSymbolResolver::new()),
        sink,
        clock,
    };

    let (runner, handle) = StrategyRunner::new(config.clone(), deps, ledger);
    info!(
        instrument = %config.instrument,
        state = %runner.state(),
        "Paper strategy starting"
    );
    let mut task = tokio::spawn(runner.run());

    tokio::select! {
        result = &mut task => {
            return result.context("Strategy runner panicked")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    if args.flatten_on_exit {
        match handle.status().await {
            Ok(status) if status.state == StrategyState::Open => {
                if let Err(e) = handle.manual_exit().await {
                    warn!(error = %e, "Manual exit on shutdown failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read strategy status"),
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Runner already stopped");
    }
    task.await.context("Strategy runner panicked")??;
    info!("Paper strategy stopped");
    Ok(())
}
