//! In-process transport over crossbeam channels
//!
//! A connected pair of endpoints with the same contract as UDP minus the
//! network. Used for local loopback runs and for exercising the receive path
//! deterministically.

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::error::NetworkError;
use crate::network::Transport;

/// One end of an in-process packet pipe
pub struct ChannelTransport {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
    read_timeout: Option<Duration>,
}

impl ChannelTransport {
    /// Two endpoints wired to each other
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (
            Self {
                tx: a_tx,
                rx: a_rx,
                read_timeout: None,
            },
            Self {
                tx: b_tx,
                rx: b_rx,
                read_timeout: None,
            },
        )
    }

    /// Make `receive` give up with [`NetworkError::Timeout`] after `timeout`
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

impl Transport for ChannelTransport {
    fn send(&self, packet: &[u8]) -> Result<(), NetworkError> {
        // A vanished peer is just packet loss
        let _ = self.tx.send(Bytes::copy_from_slice(packet));
        Ok(())
    }

    fn receive(&self, buf: &mut [u8]) -> Result<usize, NetworkError> {
        let packet = match self.read_timeout {
            Some(timeout) => self.rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => NetworkError::Timeout,
                RecvTimeoutError::Disconnected => NetworkError::Closed,
            })?,
            None => self.rx.recv().map_err(|_| NetworkError::Closed)?,
        };

        if packet.len() > buf.len() {
            return Err(NetworkError::PacketTooLarge(packet.len()));
        }
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(packet.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_cross_wired() {
        let (a, b) = ChannelTransport::pair();
        a.send(b"ping").unwrap();
        b.send(b"pong").unwrap();

        let mut buf = [0u8; 8];
        let len = b.receive(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"ping");
        let len = a.receive(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"pong");
    }

    #[test]
    fn test_closed_peer() {
        let (a, b) = ChannelTransport::pair();
        drop(b);

        assert!(a.send(b"lost").is_ok());
        let mut buf = [0u8; 8];
        assert!(matches!(a.receive(&mut buf), Err(NetworkError::Closed)));
    }

    #[test]
    fn test_timeout_and_oversized_packet() {
        let (a, b) = ChannelTransport::pair();
        let b = b.with_read_timeout(Duration::from_millis(10));

        let mut small = [0u8; 2];
        assert!(matches!(b.receive(&mut small), Err(NetworkError::Timeout)));

        a.send(&[0; 4]).unwrap();
        assert!(matches!(
            b.receive(&mut small),
            Err(NetworkError::PacketTooLarge(4))
        ));
    }
}
