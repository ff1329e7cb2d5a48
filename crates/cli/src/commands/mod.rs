//! CLI subcommands.

pub mod check_config;
pub mod ladder;
pub mod run;

pub use check_config::CheckConfigArgs;
pub use ladder::LadderArgs;
pub use run::RunArgs;
