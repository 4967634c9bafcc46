use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use common::broadcast::DEFAULT_SUBSCRIBER_BUFFER;
use common::engine::EngineConfig;
use common::tail::{TailCommand, DEFAULT_STOP_TIMEOUT};

pub const DEFAULT_LISTEN_ADDR: &str = ":8080";
pub const DEFAULT_BASE: &str = "/";
pub const DEFAULT_LOG_LEVEL: tracing::Level = tracing::Level::INFO;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid listen address: {0:?}")]
    InvalidListenAddr(String),
    #[error("invalid log level: {0:?}")]
    InvalidLogLevel(String),
    #[error("subscriber buffer must be greater than zero")]
    InvalidSubscriberBuffer,
}

/// Resolved daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Base path; volumes live under `<base>/volumes`
    pub base: PathBuf,
    pub log_level: tracing::Level,
    /// Directory for daily rolling log files, stdout only when unset
    pub log_dir: Option<PathBuf>,
    pub tail_program: PathBuf,
    pub tail_args: Vec<String>,
    pub stop_timeout: Duration,
    pub subscriber_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        let tail = TailCommand::default();
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080),
            base: PathBuf::from(DEFAULT_BASE),
            log_level: DEFAULT_LOG_LEVEL,
            log_dir: None,
            tail_program: tail.program().to_path_buf(),
            tail_args: tail.args().to_vec(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

impl Config {
    /// Apply `layer` on top of the defaults
    pub fn resolve(layer: ConfigLayer) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(listen) = layer.listen {
            config.listen_addr = parse_listen_addr(&listen)?;
        }
        if let Some(base) = layer.base {
            config.base = base;
        }
        if let Some(level) = layer.log_level {
            config.log_level = tracing::Level::from_str(&level)
                .map_err(|_| ConfigError::InvalidLogLevel(level.clone()))?;
        }
        if layer.log_dir.is_some() {
            config.log_dir = layer.log_dir;
        }
        if let Some(program) = layer.tail_program {
            config.tail_program = program;
        }
        if let Some(args) = layer.tail_args {
            config.tail_args = args;
        }
        if let Some(secs) = layer.stop_timeout_secs {
            config.stop_timeout = Duration::from_secs(secs);
        }
        if let Some(buffer) = layer.subscriber_buffer {
            if buffer == 0 {
                return Err(ConfigError::InvalidSubscriberBuffer);
            }
            config.subscriber_buffer = buffer;
        }

        Ok(config)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::new(&self.base);
        engine.tail_command = TailCommand::new(&self.tail_program, self.tail_args.clone());
        engine.stop_timeout = self.stop_timeout;
        engine.subscriber_buffer = self.subscriber_buffer;
        engine
    }
}

/// One source of settings. Unset fields fall through to lower layers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub listen: Option<String>,
    pub base: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub tail_program: Option<PathBuf>,
    pub tail_args: Option<Vec<String>>,
    pub stop_timeout_secs: Option<u64>,
    pub subscriber_buffer: Option<usize>,
}

impl ConfigLayer {
    /// Read a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Overlay `higher` on top of `self`
    pub fn merge(self, higher: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            listen: higher.listen.or(self.listen),
            base: higher.base.or(self.base),
            log_level: higher.log_level.or(self.log_level),
            log_dir: higher.log_dir.or(self.log_dir),
            tail_program: higher.tail_program.or(self.tail_program),
            tail_args: higher.tail_args.or(self.tail_args),
            stop_timeout_secs: higher.stop_timeout_secs.or(self.stop_timeout_secs),
            subscriber_buffer: higher.subscriber_buffer.or(self.subscriber_buffer),
        }
    }
}

/// Parse a listen address. Accepts `host:port`, a bare port, or `:port`
/// meaning every interface.
pub fn parse_listen_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    let value = value.trim();
    let invalid = || ConfigError::InvalidListenAddr(value.to_string());

    if let Some(port) = value.strip_prefix(':') {
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    if let Ok(port) = value.parse::<u16>() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    if let Some(port) = value.strip_prefix("localhost:") {
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port));
    }
    value.parse::<SocketAddr>().map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listen_addr_forms() {
        assert_eq!(
            parse_listen_addr(":8080").unwrap(),
            "0.0.0.0:8080".parse().unwrap()
        );
        assert_eq!(
            parse_listen_addr("9000").unwrap(),
            "0.0.0.0:9000".parse().unwrap()
        );
        assert_eq!(
            parse_listen_addr("127.0.0.1:7000").unwrap(),
            "127.0.0.1:7000".parse().unwrap()
        );
        assert_eq!(
            parse_listen_addr("localhost:7001").unwrap(),
            "127.0.0.1:7001".parse().unwrap()
        );
        assert_eq!(
            parse_listen_addr("[::1]:7002").unwrap(),
            "[::1]:7002".parse().unwrap()
        );
    }

    #[test]
    fn test_parse_listen_addr_rejects_garbage() {
        for bad in ["", ":", ":http", "example.com", "1.2.3.4:99999"] {
            assert!(
                matches!(parse_listen_addr(bad), Err(ConfigError::InvalidListenAddr(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(ConfigLayer::default()).unwrap();
        assert_eq!(config.listen_addr, parse_listen_addr(DEFAULT_LISTEN_ADDR).unwrap());
        assert_eq!(config.base, PathBuf::from("/"));
        assert_eq!(config.log_level, tracing::Level::INFO);
        assert_eq!(config.tail_program, PathBuf::from("tail"));
        assert_eq!(config.tail_args, vec!["-F"]);
        assert_eq!(config.stop_timeout, DEFAULT_STOP_TIMEOUT);
        assert_eq!(config.subscriber_buffer, DEFAULT_SUBSCRIBER_BUFFER);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_toml_layer() {
        let layer = ConfigLayer::from_toml(
            r#"
            listen = "127.0.0.1:9100"
            base = "/var/lib/docker"
            log_level = "debug"
            tail_args = ["-F", "-s", "0.5"]
            stop_timeout_secs = 2
            "#,
        )
        .unwrap();
        let config = Config::resolve(layer).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9100".parse().unwrap());
        assert_eq!(config.base, PathBuf::from("/var/lib/docker"));
        assert_eq!(config.log_level, tracing::Level::DEBUG);
        assert_eq!(config.tail_args, vec!["-F", "-s", "0.5"]);
        assert_eq!(config.stop_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_unknown_toml_key_is_rejected() {
        let err = ConfigLayer::from_toml("listne = \":8080\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_higher_layer_wins() {
        let file = ConfigLayer {
            listen: Some(":7000".into()),
            base: Some("/from/file".into()),
            log_level: Some("warn".into()),
            ..Default::default()
        };
        let flags = ConfigLayer {
            listen: Some(":7001".into()),
            ..Default::default()
        };
        let config = Config::resolve(file.merge(flags)).unwrap();
        assert_eq!(config.listen_addr.port(), 7001);
        assert_eq!(config.base, PathBuf::from("/from/file"));
        assert_eq!(config.log_level, tracing::Level::WARN);
    }

    #[test]
    fn test_invalid_values() {
        let layer = ConfigLayer {
            log_level: Some("loud".into()),
            ..Default::default()
        };
        assert!(matches!(
            Config::resolve(layer),
            Err(ConfigError::InvalidLogLevel(_))
        ));

        let layer = ConfigLayer {
            subscriber_buffer: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            Config::resolve(layer),
            Err(ConfigError::InvalidSubscriberBuffer)
        ));
    }

    #[test]
    fn test_engine_config_carries_settings() {
        let layer = ConfigLayer {
            base: Some("/srv".into()),
            tail_program: Some("/usr/bin/tail".into()),
            subscriber_buffer: Some(8),
            ..Default::default()
        };
        let engine = Config::resolve(layer).unwrap().engine_config();
        assert_eq!(engine.base, PathBuf::from("/srv"));
        assert_eq!(engine.tail_command.program(), Path::new("/usr/bin/tail"));
        assert_eq!(engine.subscriber_buffer, 8);
    }
}
