//! Offline ladder preview. Places no orders.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;

use ratio_spread_core::ConfigLoader;
use ratio_spread_engine::build_ladder;
use ratio_spread_paper::{FyersSymbolResolver, WeeklyExpiryCalendar};

#[derive(Args, Debug)]
pub struct LadderArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/strategy.toml")]
    pub config: String,

    /// Underlying spot price
    #[arg(long)]
    pub spot: Decimal,

    /// Entry date (YYYY-MM-DD)
    #[arg(long)]
    pub date: NaiveDate,
}

pub fn run(args: &LadderArgs) -> Result<()> {
    let config = ConfigLoader::load(&args.config)
        .with_context(|| format!("invalid config {}", args.config))?;
    let ladder = build_ladder(
        args.spot,
        args.date,
        &config,
        &WeeklyExpiryCalendar::from_config(&config),
        &FyersSymbolResolver::new(),
    )?;

    println!(
        "{} spot {} ATM {} expiry {}",
        ladder.instrument, ladder.spot, ladder.atm, ladder.expiry
    );
    println!("{:<20} {:<5} {:>6} {:>8}  SYMBOL", "LABEL", "SIDE", "QTY", "STRIKE");
    for leg in &ladder.legs {
        println!(
            "{:<20} {:<5} {:>6} {:>8}  {}",
            leg.label,
            leg.side.to_string(),
            leg.quantity,
            leg.strike.to_string(),
            leg.symbol
        );
    }
    Ok(())
}
