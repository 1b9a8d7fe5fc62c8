//! UDP transport
//!
//! Two sockets, as the peers are symmetric: one bound to the local listening
//! port for receiving, one ephemeral socket that sends to the peer.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::network::Transport;

/// Create a blocking UDP socket bound to `addr`
pub fn create_socket(
    addr: SocketAddr,
    recv_buffer_size: Option<usize>,
    read_timeout: Option<Duration>,
) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    if let Some(size) = recv_buffer_size {
        // Best effort, the OS may clamp it
        if let Err(e) = socket.set_recv_buffer_size(size) {
            tracing::warn!("Failed to set receive buffer size to {}: {}", size, e);
        }
    }

    socket
        .set_read_timeout(read_timeout)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .bind(&addr.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;

    Ok(socket.into())
}

/// Resolve `host:port`, preferring IPv4
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, NetworkError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| NetworkError::Resolve(format!("{}: {}", host, e)))?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| NetworkError::Resolve(format!("{}: no addresses", host)))
}

/// Point-to-point UDP transport
pub struct UdpTransport {
    recv_socket: UdpSocket,
    send_socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpTransport {
    /// Bind the listening port and resolve the peer from configuration
    pub fn from_config(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let destination = resolve(&config.destination_address, config.destination_port)?;
        let listen = match destination {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.listening_port)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, config.listening_port)),
        };
        Self::bind(
            listen,
            destination,
            config.recv_buffer_size,
            config.receive_timeout_ms.map(Duration::from_millis),
        )
    }

    pub fn bind(
        listen: SocketAddr,
        destination: SocketAddr,
        recv_buffer_size: Option<usize>,
        read_timeout: Option<Duration>,
    ) -> Result<Self, NetworkError> {
        let recv_socket = create_socket(listen, recv_buffer_size, read_timeout)?;

        let ephemeral = match destination {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let send_socket = create_socket(ephemeral, None, None)?;

        tracing::info!(
            "UDP transport listening on {} and sending to {}",
            recv_socket.local_addr().map_err(|e| NetworkError::BindFailed(e.to_string()))?,
            destination
        );

        Ok(Self {
            recv_socket,
            send_socket,
            destination,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.recv_socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

impl Transport for UdpTransport {
    fn send(&self, packet: &[u8]) -> Result<(), NetworkError> {
        self.send_socket
            .send_to(packet, self.destination)
            .map(|_| ())
            .map_err(|e| NetworkError::SendFailed(e.to_string()))
    }

    fn receive(&self, buf: &mut [u8]) -> Result<usize, NetworkError> {
        match self.recv_socket.recv_from(buf) {
            Ok((len, _)) => Ok(len),
            Err(e) => Err(match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => NetworkError::Timeout,
                ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused => {
                    NetworkError::PeerUnreachable
                }
                _ => NetworkError::ReceiveFailed(e.to_string()),
            }),
        }
    }
}
