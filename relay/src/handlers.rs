//! Line handlers and the registry they are installed from.
//!
//! A handler looks at one log line and returns the messages it wants relayed,
//! together with a fixed [`SendTo`] policy naming the destinations. Handlers
//! are resolved by name from a [`HandlerRegistry`] once at startup and never
//! change afterwards.

use crate::config::HandlerSpec;
use crate::endpoint::ServerEndpoint;
use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which servers receive a handler's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SendTo {
    None,
    OriginalServer,
    OtherServers,
    AllServers,
}

pub trait Handler: Send + Sync {
    /// Messages to relay for `line`, in order. Empty when the line is not
    /// of interest.
    fn handle(&self, line: &str, source: &ServerEndpoint) -> Vec<String>;

    fn send_to(&self) -> SendTo;
}

/// Relays `say: <player>: <text>` chat as `<server>@<player>: <text>`.
#[derive(Debug, Clone)]
pub struct SayHandler {
    send_to: SendTo,
}

impl SayHandler {
    pub fn new(send_to: SendTo) -> Self {
        Self { send_to }
    }
}

impl Handler for SayHandler {
    fn handle(&self, line: &str, source: &ServerEndpoint) -> Vec<String> {
        let Some(rest) = line.strip_prefix("say: ") else {
            return Vec::new();
        };

        // The player name may itself contain ": ", so split on the last
        // separator that leaves non-empty text on both sides.
        let chat = rest.rmatch_indices(": ").find_map(|(idx, _)| {
            let (player, text) = (&rest[..idx], &rest[idx + 2..]);
            (!player.is_empty() && !text.is_empty()).then_some((player, text))
        });

        match chat {
            Some((player, text)) => vec![format!("{}@{}: {}", source.display_name, player, text)],
            None => Vec::new(),
        }
    }

    fn send_to(&self) -> SendTo {
        self.send_to
    }
}

/// Relays every line verbatim.
#[derive(Debug, Clone)]
pub struct EchoHandler {
    send_to: SendTo,
}

impl EchoHandler {
    pub fn new(send_to: SendTo) -> Self {
        Self { send_to }
    }
}

impl Handler for EchoHandler {
    fn handle(&self, line: &str, _source: &ServerEndpoint) -> Vec<String> {
        vec![line.to_string()]
    }

    fn send_to(&self) -> SendTo {
        self.send_to
    }
}

pub type HandlerFactory = fn(SendTo) -> Box<dyn Handler>;

struct Registration {
    default_send_to: SendTo,
    factory: HandlerFactory,
}

/// Maps stable handler names to factories.
pub struct HandlerRegistry {
    registrations: BTreeMap<String, Registration>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self {
            registrations: BTreeMap::new(),
        }
    }

    /// The built-in `say` and `echo` handlers.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("say", SendTo::OtherServers, |send_to| {
            Box::new(SayHandler::new(send_to))
        });
        registry.register("echo", SendTo::OtherServers, |send_to| {
            Box::new(EchoHandler::new(send_to))
        });
        registry
    }

    /// Registers `factory` under `name`, replacing an earlier registration.
    pub fn register(&mut self, name: &str, default_send_to: SendTo, factory: HandlerFactory) {
        self.registrations.insert(
            name.to_string(),
            Registration {
                default_send_to,
                factory,
            },
        );
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.registrations.keys().map(String::as_str)
    }

    /// Instantiates `specs` in order. Unknown names are a config error.
    pub fn build(&self, specs: &[HandlerSpec]) -> Result<Vec<Box<dyn Handler>>, RelayError> {
        specs
            .iter()
            .map(|spec| {
                let registration = self
                    .registrations
                    .get(spec.name())
                    .ok_or_else(|| RelayError::UnknownHandler(spec.name().to_string()))?;
                let send_to = spec.send_to().unwrap_or(registration.default_send_to);
                Ok((registration.factory)(send_to))
            })
            .collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
