use crate::config::{AppConfig, ConfigError};
use thiserror::Error;
use tracing::Level;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::FmtSubscriber;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("setting default subscriber failed: {0}")]
    AlreadySet(#[from] SetGlobalDefaultError),
}

/// Installs a formatting subscriber logging at `level` and above as the global default
pub fn init(level: Level) -> Result<(), LoggingError> {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// [`init`] with the level named in `config`
pub fn init_from_config(config: &AppConfig) -> Result<(), LoggingError> {
    init(config.log_level()?)
}
