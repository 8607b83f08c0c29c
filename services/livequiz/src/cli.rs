//! Command line plumbing shared by the binaries.

use crate::config::{ConfigError, QuizConfig};
use crate::store::StoreError;
use clap::{value_parser, Arg, ArgMatches, Command};
use flux::logging;
use relay::net::endpoint::{Endpoint, Settings, StopReason};
use relay::net::handler::MessageHandler;
use relay::net::shared::NetworkError;
use std::error;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub config: Option<PathBuf>,
    pub port: Option<u16>,
    pub log_config: Option<PathBuf>,
}

impl Options {
    /// The command line accepted by the server binaries.
    pub fn command(name: &'static str, about: &'static str) -> Command {
        Command::new(name)
            .version(env!("CARGO_PKG_VERSION"))
            .about(about)
            .arg(
                Arg::new("CONFIG_FILE")
                    .help("Path to the config file")
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                Arg::new("port")
                    .long("port")
                    .short('p')
                    .value_name("PORT")
                    .help("Port to listen on, overrides the config file")
                    .value_parser(value_parser!(u16)),
            )
            .arg(
                Arg::new("log-config")
                    .long("log-config")
                    .value_name("FILE")
                    .help("Path to the logger config file")
                    .value_parser(value_parser!(PathBuf)),
            )
    }

    pub fn from_matches(matches: &ArgMatches) -> Options {
        Options {
            config: matches.get_one::<PathBuf>("CONFIG_FILE").cloned(),
            port: matches.get_one::<u16>("port").copied(),
            log_config: matches.get_one::<PathBuf>("log-config").cloned(),
        }
    }

    /// The config file contents, or the defaults if no file was given.
    pub fn load_config(&self) -> Result<QuizConfig, ConfigError> {
        match &self.config {
            Some(path) => QuizConfig::load(path),
            None => Ok(QuizConfig::default()),
        }
    }
}

#[derive(Debug)]
pub enum LaunchError {
    Config(ConfigError),
    Store(StoreError),
    Network(NetworkError),
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LaunchError::Config(err) => write!(f, "{}", err),
            LaunchError::Store(err) => write!(f, "{}", err),
            LaunchError::Network(err) => write!(f, "network failure: {}", err),
        }
    }
}

impl error::Error for LaunchError {}

impl From<ConfigError> for LaunchError {
    #[inline]
    fn from(err: ConfigError) -> Self {
        LaunchError::Config(err)
    }
}

impl From<StoreError> for LaunchError {
    #[inline]
    fn from(err: StoreError) -> Self {
        LaunchError::Store(err)
    }
}

impl From<NetworkError> for LaunchError {
    #[inline]
    fn from(err: NetworkError) -> Self {
        LaunchError::Network(err)
    }
}

/// Binds the endpoint and serves until it stops.
pub fn serve<H: MessageHandler>(
    settings: Settings,
    handler: H,
    log: &logging::Logger,
) -> Result<StopReason, LaunchError> {
    let mut endpoint = Endpoint::new(settings, handler, log)?;
    Ok(endpoint.run()?)
}

/// Parses the command line, sets up logging and runs `launch`. Returns the process exit code.
pub fn main<F>(command: Command, launch: F) -> i32
where
    F: FnOnce(&Options, &logging::Logger) -> Result<StopReason, LaunchError>,
{
    let options = Options::from_matches(&command.get_matches());

    let log = match logging::init(options.log_config.as_ref()) {
        Ok(log) => log,
        Err(err) => {
            eprintln!("Failed to set up logging: {}", err);
            return 1;
        }
    };

    match launch(&options, &log) {
        Ok(reason) => {
            logging::info!(log, "exiting"; "reason" => ?reason);
            0
        }
        Err(err) => {
            logging::crit!(log, "startup failed"; "error" => %err);
            1
        }
    }
}
