//! Configuration management for remote-hal.
//!
//! Configuration comes from a TOML file, with environment variables taking
//! precedence over it. Every field has a default, so a missing file is not an
//! error.
//!
//! ```toml
//! [setup]
//! port = 7000
//! marker = "Arduino-Emulator"
//! retry_delay_secs = 10
//! # max_attempts = 30
//! reply_timeout_ms = 1000
//!
//! [serial]
//! path = "/dev/ttyACM0"
//! baud_rate = 115200
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::handshake::{RetryPolicy, DEFAULT_RETRY_DELAY, IDENTIFICATION_MARKER};
use crate::peripheral::DEFAULT_REPLY_TIMEOUT;
use crate::tracing::prelude::*;
use crate::transport::serial::DEFAULT_BAUD_RATE;
use crate::transport::DEFAULT_PORT;

/// Names a configuration file to use instead of the default location.
pub const CONFIG_PATH_ENV: &str = "REMOTE_HAL_CONFIG";

/// Overrides `setup.port`.
pub const PORT_ENV: &str = "REMOTE_HAL_PORT";

/// Overrides `setup.retry_delay_secs`.
pub const RETRY_DELAY_ENV: &str = "REMOTE_HAL_RETRY_DELAY_SECS";

/// Overrides `serial.path`, enabling the serial transport.
pub const SERIAL_PORT_ENV: &str = "REMOTE_HAL_SERIAL_PORT";

const DEFAULT_CONFIG_PATH: &str = "/etc/remote-hal/remote-hal.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Transport setup and handshake
    pub setup: SetupConfig,

    /// Serial transport; when present it is used instead of UDP
    pub serial: Option<SerialConfig>,
}

/// Transport setup and handshake configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SetupConfig {
    /// Listening port of the default UDP transport
    pub port: u16,

    /// Identification the remote controller sends
    pub marker: String,

    /// Pause between handshake polls
    pub retry_delay_secs: u64,

    /// Give up after this many polls; unset waits forever
    pub max_attempts: Option<u32>,

    /// How long proxies wait for a reply
    pub reply_timeout_ms: u64,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            marker: String::from_utf8_lossy(IDENTIFICATION_MARKER).into_owned(),
            retry_delay_secs: DEFAULT_RETRY_DELAY.as_secs(),
            max_attempts: None,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT.as_millis() as u64,
        }
    }
}

impl SetupConfig {
    /// Setup on `port` with every other field at its default.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let delay = Duration::from_secs(self.retry_delay_secs);
        match self.max_attempts {
            Some(max) => RetryPolicy::limited(delay, max),
            None => RetryPolicy::forever(delay),
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.marker.is_empty() {
            return Err(Error::Config("setup.marker must not be empty".to_string()));
        }
        if self.max_attempts == Some(0) {
            return Err(Error::Config("setup.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Serial transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Device path, e.g. /dev/ttyACM0
    pub path: String,

    /// Line speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Config {
    /// Load configuration from `$REMOTE_HAL_CONFIG`, or from the default
    /// location if that file exists, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load_from(Path::new(&path))?,
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::load_from(&path)?
                } else {
                    debug!("No configuration file, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(port) = env_parse::<u16>(PORT_ENV)? {
            self.setup.port = port;
        }
        if let Some(secs) = env_parse::<u64>(RETRY_DELAY_ENV)? {
            self.setup.retry_delay_secs = secs;
        }
        if let Ok(path) = env::var(SERIAL_PORT_ENV) {
            let baud_rate = self
                .serial
                .as_ref()
                .map_or(DEFAULT_BAUD_RATE, |serial| serial.baud_rate);
            self.serial = Some(SerialConfig { path, baud_rate });
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.setup.validate()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has invalid value '{}'", name, value))),
        Err(_) => Ok(None),
    }
}
