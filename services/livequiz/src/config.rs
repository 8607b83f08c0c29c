use relay::net::endpoint::Settings;
use relay::net::frame::MAX_PAYLOAD_SIZE;
use relay::net::handshake::Policy;
use relay::net::transport;
use serde_derive::{Deserialize, Serialize};
use std::error;
use std::fmt;
use std::io;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;

/// Host provided configuration values, read once at startup.
pub trait ConfigStore {
    fn port(&self) -> Option<u16>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Server {
    pub address: String,
    pub port: Option<u16>,
    /// PEM certificate chain. TLS is enabled when both this and `private_key` are set.
    pub certificate: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    /// Accepted `Origin` values, empty to accept any.
    pub allowed_origins: Vec<String>,
    pub max_message_size: usize,
    pub handshake_timeout_secs: u64,
}

impl Default for Server {
    fn default() -> Server {
        Server {
            address: "0.0.0.0".to_string(),
            port: Some(DEFAULT_PORT),
            certificate: None,
            private_key: None,
            allowed_origins: Vec::new(),
            max_message_size: MAX_PAYLOAD_SIZE,
            handshake_timeout_secs: 5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Session {
    pub tick_interval_ms: u64,
    /// Journal of finished sessions. Kept in memory only when absent.
    pub journal: Option<PathBuf>,
}

impl Default for Session {
    fn default() -> Session {
        Session {
            tick_interval_ms: 10,
            journal: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct QuizConfig {
    pub server: Server,
    pub session: Session,
}

impl QuizConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<QuizConfig, ConfigError> {
        Ok(serdeconv::from_toml_file(path)?)
    }

    #[inline]
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(serdeconv::to_toml_string(self)?)
    }

    /// Endpoint settings, with `port` taking precedence over the configured one.
    pub fn settings(&self, port: Option<u16>) -> Result<Settings, ConfigError> {
        let ip: IpAddr = self.server.address.parse()?;
        let port = port.or_else(|| self.port()).unwrap_or(DEFAULT_PORT);

        let tls = match (&self.server.certificate, &self.server.private_key) {
            (Some(certificate), Some(private_key)) => {
                Some(transport::server_config(certificate, private_key).map_err(ConfigError::Tls)?)
            }
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        Ok(Settings {
            address: SocketAddr::new(ip, port),
            tls,
            policy: Policy {
                allowed_origins: self.server.allowed_origins.clone(),
            },
            max_message_size: self.server.max_message_size.min(MAX_PAYLOAD_SIZE),
            handshake_timeout: Duration::from_secs(self.server.handshake_timeout_secs),
            tick_interval: Duration::from_millis(self.session.tick_interval_ms),
        })
    }
}

impl ConfigStore for QuizConfig {
    #[inline]
    fn port(&self) -> Option<u16> {
        self.server.port
    }
}

#[derive(Debug)]
pub enum ConfigError {
    File(serdeconv::Error),
    Address(AddrParseError),
    Tls(io::Error),
    IncompleteTls,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::File(err) => write!(f, "invalid configuration file: {}", err),
            ConfigError::Address(err) => write!(f, "invalid listen address: {}", err),
            ConfigError::Tls(err) => write!(f, "failed to load TLS material: {}", err),
            ConfigError::IncompleteTls => write!(f, "certificate and private_key must be set together"),
        }
    }
}

impl error::Error for ConfigError {}

impl From<serdeconv::Error> for ConfigError {
    #[inline]
    fn from(err: serdeconv::Error) -> Self {
        ConfigError::File(err)
    }
}

impl From<AddrParseError> for ConfigError {
    #[inline]
    fn from(err: AddrParseError) -> Self {
        ConfigError::Address(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_round_trip() {
        let config = QuizConfig::default();
        let text = config.to_toml().unwrap();

        assert_eq!(serdeconv::from_toml_str::<QuizConfig>(&text).unwrap(), config);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9001\nallowed_origins = [\"https://moodle.example.org\"]").unwrap();

        let config = QuizConfig::load(file.path()).unwrap();

        assert_eq!(config.port(), Some(9001));
        assert_eq!(config.server.address, "0.0.0.0");
        assert_eq!(config.session, Session::default());

        let settings = config.settings(None).unwrap();
        assert_eq!(settings.address, "0.0.0.0:9001".parse::<SocketAddr>().unwrap());
        assert_eq!(settings.policy.allowed_origins, vec!["https://moodle.example.org".to_string()]);
        assert!(settings.tls.is_none());
    }

    #[test]
    fn test_port_override_and_fallback() {
        let mut config = QuizConfig::default();
        assert_eq!(config.settings(Some(9100)).unwrap().address.port(), 9100);

        config.server.port = None;
        assert_eq!(config.settings(None).unwrap().address.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = QuizConfig::default();
        config.server.address = "not an address".to_string();

        match config.settings(None) {
            Err(ConfigError::Address(_)) => (),
            other => panic!("unexpected {:?}", other.map(|settings| settings.address)),
        }

        let mut config = QuizConfig::default();
        config.server.certificate = Some(PathBuf::from("cert.pem"));

        match config.settings(None) {
            Err(ConfigError::IncompleteTls) => (),
            other => panic!("unexpected {:?}", other.map(|settings| settings.address)),
        }

        let mut config = QuizConfig::default();
        config.server.certificate = Some(PathBuf::from("/nonexistent/cert.pem"));
        config.server.private_key = Some(PathBuf::from("/nonexistent/key.pem"));

        match config.settings(None) {
            Err(ConfigError::Tls(_)) => (),
            other => panic!("unexpected {:?}", other.map(|settings| settings.address)),
        }
    }

    #[test]
    fn test_tls_material_is_loaded() {
        let data = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../lib/relay/tests/data");

        let mut config = QuizConfig::default();
        config.server.certificate = Some(data.join("localhost.crt"));
        config.server.private_key = Some(data.join("localhost.key"));

        assert!(config.settings(None).unwrap().tls.is_some());
    }
}
