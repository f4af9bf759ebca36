//! Per-endpoint outbound queues and the senders draining them.
//!
//! Every endpoint owns one FIFO [`OutboundQueue`]. The dispatch loop pushes
//! onto it and the endpoint's [`OutboundSender`] pops at most one message per
//! tick, turns it into an `rcon <password> qsay "<text>"` packet and sends it
//! over the endpoint's own UDP socket.
//!
//! Nothing is dropped: while an endpoint is inactive its queue keeps growing.
//! A failed send is logged and the message counts as delivered.

use crate::endpoint::{EndpointId, SharedRegistry};
use crate::error::RelayError;
use crate::prober::{bind_for, resolve};
use log::{debug, error};
use protocol::Packet;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};

/// FIFO of messages waiting for one endpoint. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct OutboundQueue {
    messages: Arc<Mutex<VecDeque<String>>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, message: String) {
        self.messages.lock().await.push_back(message);
    }

    pub async fn pop(&self) -> Option<String> {
        self.messages.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    /// Pending messages, oldest first, without removing them.
    pub async fn snapshot(&self) -> Vec<String> {
        self.messages.lock().await.iter().cloned().collect()
    }
}

/// One queue per endpoint, indexed by [`EndpointId`].
#[derive(Debug, Clone, Default)]
pub struct OutboundQueues {
    queues: Vec<OutboundQueue>,
}

impl OutboundQueues {
    pub fn new(count: usize) -> Self {
        Self {
            queues: (0..count).map(|_| OutboundQueue::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn get(&self, id: EndpointId) -> Option<&OutboundQueue> {
        self.queues.get(id)
    }

    /// Appends `messages` in order to the queue of `id`. Returns how many
    /// were queued; zero for an unknown endpoint.
    pub async fn enqueue(&self, id: EndpointId, messages: &[String]) -> usize {
        let Some(queue) = self.queues.get(id) else {
            return 0;
        };
        let mut pending = queue.messages.lock().await;
        pending.extend(messages.iter().cloned());
        messages.len()
    }
}

/// Drains one endpoint's queue onto the wire.
pub struct OutboundSender {
    id: EndpointId,
    registry: SharedRegistry,
    queue: OutboundQueue,
    socket: UdpSocket,
    target: SocketAddr,
}

impl OutboundSender {
    /// Resolves the endpoint's address and binds its dedicated socket.
    pub async fn new(
        id: EndpointId,
        registry: SharedRegistry,
        queue: OutboundQueue,
    ) -> Result<Self, RelayError> {
        let (host, port) = {
            let registry = registry.read().await;
            let endpoint = registry
                .get(id)
                .ok_or_else(|| RelayError::InvalidConfig(format!("no endpoint with id {}", id)))?;
            (endpoint.host.clone(), endpoint.port)
        };

        let target = resolve(&host, port).await?;
        let socket = bind_for(target).await?;

        Ok(Self {
            id,
            registry,
            queue,
            socket,
            target,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Runs a single scheduling tick.
    ///
    /// Does nothing while the endpoint is inactive or the queue is empty.
    /// Otherwise sends exactly one message and returns it.
    pub async fn deliver_next(&self) -> Option<String> {
        let password = {
            let registry = self.registry.read().await;
            match registry.get(self.id) {
                Some(endpoint) if endpoint.active => endpoint.rcon_password.clone(),
                _ => return None,
            }
        };

        let message = self.queue.pop().await?;
        let packet = Packet::qsay(&password, &message);

        match self.socket.send_to(&packet.encode(), self.target).await {
            Ok(_) => debug!("Relayed to {}: {}", self.target, message),
            Err(e) => error!("Failed to send message to {}: {}", self.target, e),
        }

        Some(message)
    }

    /// Ticks every `send_interval` until the task is aborted.
    pub async fn run(self, send_interval: Duration) {
        let mut ticker = interval(send_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.deliver_next().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::endpoint::EndpointRegistry;
    use protocol::ServerStatus;
    use std::path::PathBuf;

    async fn game_server() -> (UdpSocket, SharedRegistry) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let registry = EndpointRegistry::from_configs(&[ServerConfig {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            filepath: PathBuf::from("games.log"),
            rcon_password: "secret".to_string(),
        }])
        .into_shared();
        (socket, registry)
    }

    async fn activate(registry: &SharedRegistry) {
        registry.write().await.get_mut(0).unwrap().apply_status(&ServerStatus::default());
    }

    async fn receive(socket: &UdpSocket) -> Packet {
        let mut buffer = [0u8; 2048];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("no packet received")
            .unwrap();
        Packet::decode(&buffer[..len]).unwrap()
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let queue = OutboundQueue::new();
        queue.push("one".to_string()).await;
        queue.push("two".to_string()).await;

        assert_eq!(queue.len().await, 2);
        assert_eq!(queue.snapshot().await, vec!["one", "two"]);
        assert_eq!(queue.pop().await.as_deref(), Some("one"));
        assert_eq!(queue.pop().await.as_deref(), Some("two"));
        assert_eq!(queue.pop().await, None);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_enqueue_targets_one_queue() {
        let queues = OutboundQueues::new(2);
        let messages = vec!["a".to_string(), "b".to_string()];

        assert_eq!(queues.enqueue(1, &messages).await, 2);
        assert_eq!(queues.enqueue(9, &messages).await, 0);

        assert!(queues.get(0).unwrap().is_empty().await);
        assert_eq!(queues.get(1).unwrap().snapshot().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_inactive_endpoint_keeps_its_backlog() {
        let (_server, registry) = game_server().await;
        let queue = OutboundQueue::new();
        queue.push("waiting".to_string()).await;

        let sender = OutboundSender::new(0, registry, queue.clone()).await.unwrap();

        assert_eq!(sender.deliver_next().await, None);
        assert_eq!(sender.deliver_next().await, None);
        assert_eq!(queue.snapshot().await, vec!["waiting"]);
    }

    #[tokio::test]
    async fn test_one_message_per_tick() {
        let (server, registry) = game_server().await;
        activate(&registry).await;

        let queue = OutboundQueue::new();
        for message in ["first", "second", "third"] {
            queue.push(message.to_string()).await;
        }

        let sender = OutboundSender::new(0, registry, queue.clone()).await.unwrap();

        assert_eq!(sender.deliver_next().await.as_deref(), Some("first"));
        assert_eq!(queue.len().await, 2);
        assert_eq!(
            receive(&server).await,
            Packet::Rcon {
                password: "secret".to_string(),
                command: "qsay \"first\"".to_string(),
            }
        );

        assert_eq!(sender.deliver_next().await.as_deref(), Some("second"));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_sent_text_is_escaped() {
        let (server, registry) = game_server().await;
        activate(&registry).await;

        let queue = OutboundQueue::new();
        queue.push("bye\"; quit".to_string()).await;

        let sender = OutboundSender::new(0, registry, queue).await.unwrap();
        sender.deliver_next().await;

        match receive(&server).await {
            Packet::Rcon { command, .. } => assert_eq!(command, "qsay \"bye quit\""),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_drains_in_order() {
        let (server, registry) = game_server().await;
        activate(&registry).await;

        let queue = OutboundQueue::new();
        for message in ["1", "2", "3"] {
            queue.push(message.to_string()).await;
        }

        let sender = OutboundSender::new(0, registry, queue.clone()).await.unwrap();
        let task = tokio::spawn(sender.run(Duration::from_millis(10)));

        for expected in ["1", "2", "3"] {
            match receive(&server).await {
                Packet::Rcon { command, .. } => assert_eq!(command, format!("qsay \"{}\"", expected)),
                other => panic!("unexpected packet {:?}", other),
            }
        }

        task.abort();
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_sender_for_unknown_endpoint() {
        let registry = EndpointRegistry::default().into_shared();
        let result = OutboundSender::new(0, registry, OutboundQueue::new()).await;
        assert!(matches!(result, Err(RelayError::InvalidConfig(_))));
    }
}
