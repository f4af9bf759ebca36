//! Wires the relay together.
//!
//! For every configured server the [`Relay`] spawns:
//! - a one-shot status probe
//! - a log tailer feeding the shared dispatch channel
//! - an outbound sender ticking over the endpoint's queue
//!
//! plus one dispatch loop draining the channel into the queues. All task
//! handles are kept in the returned [`RelayHandle`] so shutdown can stop
//! every loop.

use crate::config::RelayConfig;
use crate::dispatch::Dispatcher;
use crate::endpoint::{EndpointRegistry, SharedRegistry};
use crate::error::RelayError;
use crate::handlers::{Handler, HandlerRegistry};
use crate::outbound::{OutboundQueues, OutboundSender};
use crate::prober::probe_endpoint;
use crate::tailer::{run_tailer, LogTailer, TailEvent};
use log::{error, info};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct Relay {
    config: RelayConfig,
    registry: SharedRegistry,
    queues: OutboundQueues,
    dispatcher: Arc<Dispatcher>,
}

impl Relay {
    pub fn new(config: RelayConfig, handlers: Vec<Box<dyn Handler>>) -> Result<Self, RelayError> {
        config.validate()?;

        let registry = EndpointRegistry::from_configs(&config.servers);
        let queues = OutboundQueues::new(registry.len());

        Ok(Self {
            config,
            registry: registry.into_shared(),
            queues,
            dispatcher: Arc::new(Dispatcher::new(handlers)),
        })
    }

    /// Builds the configured handlers from `handlers` and creates the relay.
    pub fn from_config(config: RelayConfig, handlers: &HandlerRegistry) -> Result<Self, RelayError> {
        let handlers = handlers.build(&config.handlers)?;
        Self::new(config, handlers)
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    pub fn queues(&self) -> &OutboundQueues {
        &self.queues
    }

    /// Spawns every probe, tailer, sender and the dispatch loop.
    ///
    /// A log that cannot be opened or a server that cannot be resolved only
    /// disables that endpoint's tailing or delivery.
    pub async fn start(&self) -> RelayHandle {
        let timing = self.config.timing;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut tasks = Vec::new();

        let endpoints: Vec<_> = {
            let registry = self.registry.read().await;
            registry.iter().cloned().collect()
        };

        for endpoint in endpoints {
            let id = endpoint.id;

            let registry = self.registry();
            tasks.push(tokio::spawn(async move {
                probe_endpoint(&registry, id, timing.probe_timeout()).await;
            }));

            match LogTailer::open(&endpoint.log_path).await {
                Ok(tailer) => {
                    info!(
                        "Watching server {} log file: {}",
                        endpoint.address(),
                        endpoint.log_path.display()
                    );
                    tasks.push(tokio::spawn(run_tailer(
                        id,
                        tailer,
                        timing.poll_interval(),
                        events_tx.clone(),
                    )));
                }
                Err(e) => error!("Not tailing server {}: {}", endpoint.address(), e),
            }

            let Some(queue) = self.queues.get(id).cloned() else {
                continue;
            };
            match OutboundSender::new(id, self.registry(), queue).await {
                Ok(sender) => tasks.push(tokio::spawn(sender.run(timing.send_interval()))),
                Err(e) => error!("No delivery to server {}: {}", endpoint.address(), e),
            }
        }

        drop(events_tx);

        tasks.push(tokio::spawn(run_dispatch(
            Arc::clone(&self.dispatcher),
            self.registry(),
            self.queues.clone(),
            events_rx,
        )));

        info!(
            "Relaying between {} servers with {} handlers",
            self.queues.len(),
            self.dispatcher.handler_count()
        );

        RelayHandle { tasks }
    }
}

/// Drains tailer events into the outbound queues until every tailer is gone.
async fn run_dispatch(
    dispatcher: Arc<Dispatcher>,
    registry: SharedRegistry,
    queues: OutboundQueues,
    mut events: mpsc::UnboundedReceiver<TailEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TailEvent::Lines { source, lines } => {
                let endpoint = {
                    let registry = registry.read().await;
                    registry.get(source).cloned()
                };
                if let Some(endpoint) = endpoint {
                    dispatcher.dispatch(&endpoint, &lines, &queues).await;
                }
            }
            TailEvent::Failed { source, error } => {
                let address = {
                    let registry = registry.read().await;
                    registry.get(source).map(|endpoint| endpoint.address())
                };
                error!(
                    "Stopped tailing server {}: {}",
                    address.unwrap_or_else(|| source.to_string()),
                    error
                );
            }
        }
    }

    info!("All log tailers stopped");
}

/// Owns the relay's tasks.
pub struct RelayHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl RelayHandle {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Aborts every task and waits for them to finish.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
