//! Network subsystem: packet transports, the chunk sender and the receive loop

pub mod loopback;
pub mod receiver;
pub mod sender;
pub mod udp;

use std::sync::Arc;

use crate::error::NetworkError;

pub use loopback::ChannelTransport;
pub use receiver::ReceiverLoop;
pub use sender::ChunkSender;
pub use udp::{create_socket, UdpTransport};

/// Unreliable, unordered datagram transport between the two peers
///
/// `send` is fire-and-forget. `receive` blocks until one packet is available
/// and copies it into `buf`; packets may arrive out of order, duplicated, or
/// not at all.
pub trait Transport: Send + Sync {
    fn send(&self, packet: &[u8]) -> Result<(), NetworkError>;

    /// Returns the number of bytes written into `buf`
    fn receive(&self, buf: &mut [u8]) -> Result<usize, NetworkError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, packet: &[u8]) -> Result<(), NetworkError> {
        (**self).send(packet)
    }

    fn receive(&self, buf: &mut [u8]) -> Result<usize, NetworkError> {
        (**self).receive(buf)
    }
}
