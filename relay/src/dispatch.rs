//! Turns tailed lines into queued deliveries.
//!
//! Every non-blank line is offered to every installed handler, in the order
//! they were registered. Each non-empty result becomes a [`Delivery`] whose
//! messages are queued, in order, for each endpoint named by the handler's
//! [`SendTo`]. Handlers never suppress one another and nothing is
//! deduplicated, so one line can fan out to several queues several times.

use crate::endpoint::{EndpointId, ServerEndpoint};
use crate::handlers::{Handler, SendTo};
use crate::outbound::OutboundQueues;
use log::debug;

/// The output of one handler for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub source: EndpointId,
    pub messages: Vec<String>,
    pub send_to: SendTo,
}

impl Delivery {
    pub fn destinations(&self, endpoint_count: usize) -> Vec<EndpointId> {
        destinations(self.send_to, self.source, endpoint_count)
    }
}

/// Endpoints selected by `send_to` for a line read from `source`.
pub fn destinations(send_to: SendTo, source: EndpointId, endpoint_count: usize) -> Vec<EndpointId> {
    match send_to {
        SendTo::None => Vec::new(),
        SendTo::OriginalServer if source < endpoint_count => vec![source],
        SendTo::OriginalServer => Vec::new(),
        SendTo::OtherServers => (0..endpoint_count).filter(|&id| id != source).collect(),
        SendTo::AllServers => (0..endpoint_count).collect(),
    }
}

pub struct Dispatcher {
    handlers: Vec<Box<dyn Handler>>,
}

impl Dispatcher {
    pub fn new(handlers: Vec<Box<dyn Handler>>) -> Self {
        Self { handlers }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Runs every handler on `line`. Blank lines reach no handler.
    pub fn parse_line(&self, line: &str, source: &ServerEndpoint) -> Vec<Delivery> {
        if line.trim().is_empty() {
            return Vec::new();
        }

        self.handlers
            .iter()
            .filter_map(|handler| {
                let messages = handler.handle(line, source);
                (!messages.is_empty()).then(|| Delivery {
                    source: source.id,
                    messages,
                    send_to: handler.send_to(),
                })
            })
            .collect()
    }

    /// Routes `lines` from `source` onto `queues`. Returns the number of
    /// messages queued across all destinations.
    pub async fn dispatch(
        &self,
        source: &ServerEndpoint,
        lines: &[String],
        queues: &OutboundQueues,
    ) -> usize {
        let mut queued = 0;

        for line in lines {
            for delivery in self.parse_line(line, source) {
                for destination in delivery.destinations(queues.len()) {
                    queued += queues.enqueue(destination, &delivery.messages).await;
                }
            }
        }

        if queued > 0 {
            debug!("Queued {} messages from {}", queued, source.display_name);
        }

        queued
    }
}
