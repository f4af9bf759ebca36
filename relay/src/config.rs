//! Relay configuration: the servers to link, the handlers to install and the
//! timing of the polling, delivery and probe loops.
//!
//! The configuration is stored as JSON. Field names follow the camelCase
//! layout of existing config files (`filepath`, `rconPassword`).

use crate::error::RelayError;
use crate::handlers::SendTo;
use protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One game server taking part in the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Hostname or IP, optionally carrying its own `:port`
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Console log written by the game server
    #[serde(alias = "logPath", alias = "log")]
    pub filepath: PathBuf,
    pub rcon_password: String,
}

impl ServerConfig {
    /// Host and port to talk to. A port embedded in `host` wins over `port`.
    pub fn address(&self) -> (String, u16) {
        match self.host.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => match port.parse() {
                Ok(port) => (host.to_string(), port),
                Err(_) => (self.host.clone(), self.port),
            },
            _ => (self.host.clone(), self.port),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// A handler to install, either by bare name or with a `sendTo` override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandlerSpec {
    Name(String),
    Detailed {
        name: String,
        #[serde(rename = "sendTo", default, skip_serializing_if = "Option::is_none")]
        send_to: Option<SendTo>,
    },
}

impl HandlerSpec {
    pub fn name(&self) -> &str {
        match self {
            HandlerSpec::Name(name) | HandlerSpec::Detailed { name, .. } => name,
        }
    }

    pub fn send_to(&self) -> Option<SendTo> {
        match self {
            HandlerSpec::Name(_) => None,
            HandlerSpec::Detailed { send_to, .. } => *send_to,
        }
    }
}

/// Loop intervals in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timing {
    pub poll_interval_ms: u64,
    pub send_interval_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            send_interval_ms: 550,
            probe_timeout_ms: 3000,
        }
    }
}

impl Timing {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub handlers: Vec<HandlerSpec>,
    #[serde(default)]
    pub timing: Timing,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            handlers: vec![HandlerSpec::Name("say".to_string())],
            timing: Timing::default(),
        }
    }
}

impl RelayConfig {
    pub fn from_json(path: &Path, json: &str) -> Result<Self, RelayError> {
        serde_json::from_str(json).map_err(|e| RelayError::ConfigParse(path.to_path_buf(), e))
    }

    pub async fn load(path: &Path) -> Result<Self, RelayError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RelayError::ConfigRead(path.to_path_buf(), e))?;
        Self::from_json(path, &json)
    }

    /// Loads `path`, or starts from the default config if the file is absent.
    pub async fn load_or_default(path: &Path) -> Result<Self, RelayError> {
        match tokio::fs::try_exists(path).await {
            Ok(true) => Self::load(path).await,
            Ok(false) => Ok(Self::default()),
            Err(e) => Err(RelayError::ConfigRead(path.to_path_buf(), e)),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), RelayError> {
        let json = serde_json::to_string_pretty(self).map_err(RelayError::ConfigSerialize)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| RelayError::ConfigWrite(path.to_path_buf(), e))
    }

    /// Appends a server, refusing a second entry for the same address.
    pub fn add_server(&mut self, server: ServerConfig) -> Result<(), RelayError> {
        let address = server.address();
        if self.servers.iter().any(|s| s.address() == address) {
            return Err(RelayError::InvalidConfig(format!(
                "a server with address {}:{} already exists",
                address.0, address.1
            )));
        }
        self.servers.push(server);
        Ok(())
    }

    /// Checks everything that must hold before the relay can start.
    /// Handler names are checked when the handlers are built.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.servers.is_empty() {
            return Err(RelayError::InvalidConfig(
                "add servers before starting the relay".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            let (host, port) = server.address();
            if host.is_empty() {
                return Err(RelayError::InvalidConfig("server host is empty".to_string()));
            }
            if !seen.insert((host.clone(), port)) {
                return Err(RelayError::InvalidConfig(format!(
                    "server {}:{} is configured twice",
                    host, port
                )));
            }
        }

        let timing = &self.timing;
        if timing.poll_interval_ms == 0 || timing.send_interval_ms == 0 || timing.probe_timeout_ms == 0 {
            return Err(RelayError::InvalidConfig(
                "timing intervals must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
