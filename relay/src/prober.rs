//! One-shot `getstatus` probe run once per endpoint at startup.

use crate::endpoint::{EndpointId, SharedRegistry};
use crate::error::RelayError;
use log::{info, warn};
use protocol::{Packet, ServerStatus, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};

/// Resolves `host:port` to the first address the resolver returns.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, RelayError> {
    let address = format!("{}:{}", host, port);
    lookup_host((host, port))
        .await
        .map_err(|_| RelayError::Resolve(address.clone()))?
        .next()
        .ok_or(RelayError::Resolve(address))
}

/// Binds an ephemeral UDP socket in the same address family as `target`.
pub async fn bind_for(target: SocketAddr) -> Result<UdpSocket, RelayError> {
    let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    Ok(UdpSocket::bind(local).await?)
}

/// Sends `getstatus` over a fresh socket and waits up to `timeout` for the
/// answer. The socket is dropped, and so closed, on every path.
pub async fn query_status(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<ServerStatus, RelayError> {
    let target = resolve(host, port).await?;
    let socket = bind_for(target).await?;
    socket.connect(target).await?;
    socket.send(&Packet::GetStatus.encode()).await?;

    let mut buffer = vec![0u8; MAX_PACKET_SIZE];
    let len = match tokio::time::timeout(timeout, socket.recv(&mut buffer)).await {
        Ok(received) => received?,
        Err(_) => return Err(RelayError::ProbeTimeout(target.to_string(), timeout)),
    };

    Ok(ServerStatus::decode(&buffer[..len])?)
}

/// Probes endpoint `id` and records the outcome in the registry.
///
/// On success the endpoint becomes active and takes the server's hostname.
/// Any failure (timeout, refused, malformed response) leaves it inactive for
/// the rest of the process; the probe is not retried.
pub async fn probe_endpoint(registry: &SharedRegistry, id: EndpointId, timeout: Duration) -> bool {
    let (host, port) = {
        let registry = registry.read().await;
        match registry.get(id) {
            Some(endpoint) => (endpoint.host.clone(), endpoint.port),
            None => return false,
        }
    };

    match query_status(&host, port, timeout).await {
        Ok(status) => {
            let mut registry = registry.write().await;
            if let Some(endpoint) = registry.get_mut(id) {
                endpoint.apply_status(&status);
                info!(
                    "Server {}:{} is \"{}\" with {} players",
                    host,
                    port,
                    endpoint.display_name,
                    endpoint.players.len()
                );
            }
            true
        }
        Err(e) => {
            warn!("Server {}:{} is unreachable, ignoring server: {}", host, port, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::endpoint::EndpointRegistry;
    use std::path::PathBuf;

    /// Answers a single `getstatus` with `response`.
    async fn fake_server(response: Vec<u8>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];
            if let Ok((len, from)) = socket.recv_from(&mut buffer).await {
                if Packet::decode(&buffer[..len]) == Ok(Packet::GetStatus) {
                    let _ = socket.send_to(&response, from).await;
                }
            }
        });

        addr
    }

    /// Receives but never answers.
    async fn silent_server() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn registry_for(addr: SocketAddr) -> SharedRegistry {
        EndpointRegistry::from_configs(&[ServerConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            filepath: PathBuf::from("games.log"),
            rcon_password: "pw".to_string(),
        }])
        .into_shared()
    }

    #[tokio::test]
    async fn test_query_status() {
        let addr = fake_server(
            b"\xff\xff\xff\xffstatusResponse\n\\sv_hostname\\Blue\n5 20 \"Alice\"\n".to_vec(),
        )
        .await;

        let status = query_status("127.0.0.1", addr.port(), Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(status.hostname(), Some("Blue"));
        assert_eq!(status.players, vec!["Alice"]);
    }

    #[tokio::test]
    async fn test_query_status_times_out() {
        let (_socket, addr) = silent_server().await;

        let result = query_status("127.0.0.1", addr.port(), Duration::from_millis(100)).await;
        assert!(matches!(result, Err(RelayError::ProbeTimeout(_, _))));
    }

    #[tokio::test]
    async fn test_probe_marks_endpoint_active() {
        let addr = fake_server(b"\xff\xff\xff\xffstatusResponse\n\\sv_hostname\\Red\n".to_vec()).await;
        let registry = registry_for(addr);

        assert!(probe_endpoint(&registry, 0, Duration::from_secs(2)).await);

        let registry = registry.read().await;
        let endpoint = registry.get(0).unwrap();
        assert!(endpoint.active);
        assert_eq!(endpoint.display_name, "Red");
    }

    #[tokio::test]
    async fn test_unanswered_probe_leaves_endpoint_inactive() {
        let (_socket, addr) = silent_server().await;
        let registry = registry_for(addr);

        assert!(!probe_endpoint(&registry, 0, Duration::from_millis(100)).await);
        assert!(!registry.read().await.is_active(0));
    }

    #[tokio::test]
    async fn test_malformed_response_leaves_endpoint_inactive() {
        let addr = fake_server(b"\xff\xff\xff\xffstatusResponse".to_vec()).await;
        let registry = registry_for(addr);

        assert!(!probe_endpoint(&registry, 0, Duration::from_secs(2)).await);
        assert!(!registry.read().await.is_active(0));
    }

    #[tokio::test]
    async fn test_probe_unknown_endpoint() {
        let registry = EndpointRegistry::default().into_shared();
        assert!(!probe_endpoint(&registry, 4, Duration::from_millis(10)).await);
    }
}
