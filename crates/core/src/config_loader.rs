use crate::config::StrategyConfig;
use crate::error::StrategyError;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

/// Environment prefix for overrides, e.g. `RATIO_SPREAD_LOT_SIZE=75`.
pub const ENV_PREFIX: &str = "RATIO_SPREAD_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the strategy configuration from a TOML file, then environment overrides.
    ///
    /// The result is validated before it is returned, so no component ever
    /// sees a contradictory configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::Config`] if the file cannot be read or parsed,
    /// or if validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<StrategyConfig, StrategyError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StrategyError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Self::extract(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Loads the strategy configuration from an in-memory TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::Config`] on parse or validation failure.
    pub fn from_toml_str(toml: &str) -> Result<StrategyConfig, StrategyError> {
        Self::extract(Figment::new().merge(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> Result<StrategyConfig, StrategyError> {
        let config: StrategyConfig = figment
            .extract()
            .map_err(|e| StrategyError::config(e.to_string()))?;
        config.validate()?;
        tracing::debug!(instrument = %config.instrument, "Strategy configuration loaded");
        Ok(config)
    }
}
