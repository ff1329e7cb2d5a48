use anyhow::{Context, Result};
use clap::Args;

use ratio_spread_core::ConfigLoader;

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/strategy.toml")]
    pub config: String,
}

pub fn run(args: &CheckConfigArgs) -> Result<()> {
    let config = ConfigLoader::load(&args.config)
        .with_context(|| format!("invalid config {}", args.config))?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!();
    println!(
        "OK: {} legs, quantities {:?}, {} product",
        config.strike_offsets.len(),
        config.quantities(),
        match config.product_type {
            ratio_spread_core::ProductType::Intraday => "INTRADAY",
            ratio_spread_core::ProductType::Margin => "MARGIN",
        }
    );
    Ok(())
}
