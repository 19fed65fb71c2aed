//! Logger installation for the desktop binary.

use crate::config::{ConfigError, ViewerConfig};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode, WriteLogger};
use std::fs::File;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create log file: {0}")]
    File(#[from] std::io::Error),

    #[error("Logger already installed: {0}")]
    AlreadySet(#[from] log::SetLoggerError),
}

/// Install the global logger: a file logger when `log_file` is set,
/// stderr otherwise.
pub fn init(config: &ViewerConfig) -> Result<(), LoggingError> {
    let level = config.level_filter()?;
    match &config.log_file {
        Some(path) => WriteLogger::init(level, Config::default(), File::create(path)?)?,
        None => TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )?,
    }
    Ok(())
}
