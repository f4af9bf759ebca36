//! Table of the game servers taking part in the relay.
//!
//! Each configured server becomes a [`ServerEndpoint`] identified by its
//! position in the config. The table is shared between tasks behind a
//! `tokio::sync::RwLock`:
//! - the status prober is the only writer, and only for its own endpoint
//! - the dispatch loop reads it to resolve the source endpoint and the
//!   number of destinations
//! - each outbound sender reads its endpoint's liveness and password
//!
//! An endpoint starts inactive and only becomes active after a successful
//! status probe. Inactive endpoints may still be tailed but never receive
//! messages.

use crate::config::ServerConfig;
use protocol::ServerStatus;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Index of an endpoint in the [`EndpointRegistry`].
pub type EndpointId = usize;

pub type SharedRegistry = Arc<RwLock<EndpointRegistry>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub id: EndpointId,
    pub host: String,
    pub port: u16,
    pub log_path: PathBuf,
    pub rcon_password: String,
    /// `sv_hostname` once probed, `host:port` until then
    pub display_name: String,
    /// Set only by a successful status probe
    pub active: bool,
    /// Players connected at probe time
    pub players: Vec<String>,
}

impl ServerEndpoint {
    pub fn new(id: EndpointId, config: &ServerConfig) -> Self {
        let (host, port) = config.address();
        Self {
            id,
            display_name: format!("{}:{}", host, port),
            host,
            port,
            log_path: config.filepath.clone(),
            rcon_password: config.rcon_password.clone(),
            active: false,
            players: Vec::new(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Records a status response and marks the endpoint reachable. A response
    /// without `sv_hostname` keeps the current display name.
    pub fn apply_status(&mut self, status: &ServerStatus) {
        if let Some(hostname) = status.hostname() {
            self.display_name = hostname.to_string();
        }
        self.players = status.players.clone();
        self.active = true;
    }
}

#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: Vec<ServerEndpoint>,
}

impl EndpointRegistry {
    pub fn from_configs(configs: &[ServerConfig]) -> Self {
        Self {
            endpoints: configs
                .iter()
                .enumerate()
                .map(|(id, config)| ServerEndpoint::new(id, config))
                .collect(),
        }
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn ids(&self) -> Range<EndpointId> {
        0..self.endpoints.len()
    }

    pub fn get(&self, id: EndpointId) -> Option<&ServerEndpoint> {
        self.endpoints.get(id)
    }

    pub fn get_mut(&mut self, id: EndpointId) -> Option<&mut ServerEndpoint> {
        self.endpoints.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerEndpoint> {
        self.endpoints.iter()
    }

    pub fn is_active(&self, id: EndpointId) -> bool {
        self.get(id).is_some_and(|endpoint| endpoint.active)
    }

    pub fn active_count(&self) -> usize {
        self.endpoints.iter().filter(|endpoint| endpoint.active).count()
    }
}
