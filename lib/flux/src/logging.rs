use sloggers::{Config, LoggerConfig};
use std::error;
use std::fmt;
use std::path::Path;

pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Logger};

/// Logger used when no configuration file is supplied.
const DEFAULT_CONFIG: &str = r#"
type = "terminal"
level = "info"
destination = "stderr"
"#;

#[derive(Debug)]
pub enum LogError {
    Config(serdeconv::Error),
    Build(sloggers::Error),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LogError::Config(err) => write!(f, "invalid logger configuration: {}", err),
            LogError::Build(err) => write!(f, "failed to build logger: {}", err),
        }
    }
}

impl error::Error for LogError {}

impl From<serdeconv::Error> for LogError {
    #[inline]
    fn from(err: serdeconv::Error) -> Self {
        LogError::Config(err)
    }
}

impl From<sloggers::Error> for LogError {
    #[inline]
    fn from(err: sloggers::Error) -> Self {
        LogError::Build(err)
    }
}

/// Builds the root logger from the sloggers TOML file at `path`, or a terminal logger writing to
/// stderr if no path is supplied.
pub fn init<P: AsRef<Path>>(path: Option<P>) -> Result<Logger, LogError> {
    let config: LoggerConfig = match path {
        Some(path) => serdeconv::from_toml_file(path)?,
        None => serdeconv::from_toml_str(DEFAULT_CONFIG)?,
    };

    Ok(config.build_logger()?)
}

/// Logger that swallows everything. Handy for tests and embedded use.
#[inline]
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
