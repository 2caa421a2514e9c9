//! UDP transport, the default channel to the remote controller.
//!
//! The controller announces itself by sending a datagram to the host's
//! listening port. Until then the host does not know where to send anything;
//! after it, the source address of the most recent datagram is the peer
//! address. Writes accumulate in a buffer and leave as a single datagram on
//! flush.
//!
//! Received datagrams are queued whole. A read never returns bytes from two
//! datagrams, so a stray datagram cannot shift the ones behind it.

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket;

use super::{Connector, Transport};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Largest datagram payload accepted in one receive.
const MAX_DATAGRAM: usize = 1472;

/// Datagrams held before the oldest are dropped.
const MAX_QUEUED_DATAGRAMS: usize = 64;

// Received datagrams, oldest first.
struct RxQueue {
    datagrams: VecDeque<Bytes>,
    len: usize,
    limit: usize,
}

impl RxQueue {
    fn new(limit: usize) -> Self {
        Self {
            datagrams: VecDeque::new(),
            len: 0,
            limit,
        }
    }

    // Queue a datagram. Returns the oldest one if it had to make room.
    fn push(&mut self, datagram: Bytes) -> Option<Bytes> {
        if datagram.is_empty() {
            return None;
        }
        self.len += datagram.len();
        self.datagrams.push_back(datagram);

        if self.datagrams.len() <= self.limit {
            return None;
        }
        let oldest = self.datagrams.pop_front()?;
        self.len -= oldest.len();
        Some(oldest)
    }

    // Copy from the front datagram only. What does not fit stays queued.
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let Some(front) = self.datagrams.front_mut() else {
            return 0;
        };
        let len = buf.len().min(front.len());
        buf[..len].copy_from_slice(&front.split_to(len));
        if front.is_empty() {
            self.datagrams.pop_front();
        }
        self.len -= len;
        len
    }

    fn clear(&mut self) -> usize {
        let len = self.len;
        self.datagrams.clear();
        self.len = 0;
        len
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Datagram channel bound to a local UDP port.
pub struct UdpTransport {
    socket: UdpSocket,
    rx: RxQueue,
    tx: BytesMut,
    peer: Option<SocketAddr>,
    target: Option<SocketAddr>,
}

impl UdpTransport {
    /// Bind to `port` on all interfaces. Port 0 picks a free port.
    pub async fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await?;
        debug!(local = %socket.local_addr()?, "UDP transport bound");

        Ok(Self {
            socket,
            rx: RxQueue::new(MAX_QUEUED_DATAGRAMS),
            tx: BytesMut::new(),
            peer: None,
            target: None,
        })
    }

    // Move every datagram the socket has ready into the receive queue.
    fn receive_pending(&mut self) -> Result<()> {
        loop {
            let mut datagram = BytesMut::with_capacity(MAX_DATAGRAM);
            match self.socket.try_recv_buf_from(&mut datagram) {
                Ok((len, from)) => {
                    trace!(peer = %from, len, "Datagram received");
                    self.peer = Some(from);
                    if let Some(dropped) = self.rx.push(datagram.freeze()) {
                        debug!(len = dropped.len(), "Receive queue full, dropped oldest datagram");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn available(&mut self) -> Result<usize> {
        self.receive_pending()?;
        Ok(self.rx.len())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.receive_pending()?;
        Ok(self.rx.read(buf))
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.tx.extend_from_slice(data);
        Ok(data.len())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.tx.is_empty() {
            return Ok(());
        }

        let target = self
            .target
            .or(self.peer)
            .ok_or_else(|| Error::Transport("no peer to send to yet".to_string()))?;
        let datagram = self.tx.split();
        self.socket.send_to(&datagram, target).await?;
        trace!(peer = %target, len = datagram.len(), "Datagram sent");
        Ok(())
    }

    async fn discard_input(&mut self) -> Result<usize> {
        self.receive_pending()?;
        Ok(self.rx.clear())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn set_target(&mut self, peer: SocketAddr) -> Result<()> {
        self.target = Some(peer);
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

/// Opens [`UdpTransport`]s; the connector used by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpConnector;

#[async_trait]
impl Connector for UdpConnector {
    async fn open(&self, port: u16) -> Result<Box<dyn Transport>> {
        Ok(Box::new(UdpTransport::bind(port).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time;

    async fn loopback() -> (UdpTransport, UdpSocket, SocketAddr) {
        let transport = UdpTransport::bind(0).await.unwrap();
        let port = transport.local_addr().unwrap().port();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (transport, peer, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    async fn wait_for(transport: &mut UdpTransport, len: usize) {
        for _ in 0..200 {
            if transport.available().await.unwrap() >= len {
                return;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        panic!("datagram never arrived");
    }

    #[tokio::test]
    async fn test_receive_records_peer() {
        let (mut transport, peer, host) = loopback().await;
        assert!(transport.peer_addr().is_none());

        peer.send_to(b"Arduino-Emulator", host).await.unwrap();
        wait_for(&mut transport, 16).await;

        let mut buf = [0u8; 32];
        let len = transport.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"Arduino-Emulator");
        assert_eq!(transport.peer_addr(), Some(peer.local_addr().unwrap()));
    }

    #[tokio::test]
    async fn test_partial_reads_keep_order() {
        let (mut transport, peer, host) = loopback().await;
        peer.send_to(b"abcdef", host).await.unwrap();
        wait_for(&mut transport, 6).await;

        let mut buf = [0u8; 4];
        assert_eq!(transport.read(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(transport.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(transport.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reads_stop_at_datagram_boundary() {
        let (mut transport, peer, host) = loopback().await;
        peer.send_to(b"Hello-Controller", host).await.unwrap();
        peer.send_to(b"Arduino-Emulator\r\n", host).await.unwrap();
        wait_for(&mut transport, 34).await;

        let mut buf = [0u8; 18];
        assert_eq!(transport.read(&mut buf).await.unwrap(), 16);
        assert_eq!(&buf[..16], b"Hello-Controller");
        assert_eq!(transport.read(&mut buf).await.unwrap(), 18);
        assert_eq!(&buf, b"Arduino-Emulator\r\n");
    }

    #[tokio::test]
    async fn test_discard_input_empties_queue() {
        let (mut transport, peer, host) = loopback().await;
        peer.send_to(b"Arduino-Emulator\r\n", host).await.unwrap();
        wait_for(&mut transport, 18).await;

        assert_eq!(transport.discard_input().await.unwrap(), 18);
        assert_eq!(transport.available().await.unwrap(), 0);
        assert_eq!(transport.peer_addr(), Some(peer.local_addr().unwrap()));
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let mut queue = RxQueue::new(3);
        for n in 0u8..5 {
            let dropped = queue.push(Bytes::from(vec![n; 2]));
            assert_eq!(dropped.is_some(), n >= 3);
        }
        assert_eq!(queue.len(), 6);

        let mut buf = [0u8; 8];
        assert_eq!(queue.read(&mut buf), 2);
        assert_eq!(&buf[..2], &[2, 2]);
    }

    #[test]
    fn test_queue_ignores_empty_datagrams() {
        let mut queue = RxQueue::new(1);
        queue.push(Bytes::from_static(b"abc"));
        assert!(queue.push(Bytes::new()).is_none());

        let mut buf = [0u8; 2];
        assert_eq!(queue.read(&mut buf), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.clear(), 1);
        assert_eq!(queue.read(&mut buf), 0);
    }

    #[tokio::test]
    async fn test_flush_sends_one_datagram_to_target() {
        let (mut transport, peer, _) = loopback().await;
        transport.set_target(peer.local_addr().unwrap()).unwrap();

        transport.write(b"O").await.unwrap();
        transport.write(b"K").await.unwrap();
        transport.flush().await.unwrap();

        let mut buf = [0u8; 8];
        let (len, _) = time::timeout(Duration::from_secs(1), peer.recv_from(&mut buf))
            .await
            .expect("no datagram")
            .unwrap();
        assert_eq!(&buf[..len], b"OK");
    }

    #[tokio::test]
    async fn test_flush_without_peer_fails() {
        let (mut transport, _, _) = loopback().await;
        transport.write(b"OK").await.unwrap();
        assert!(matches!(transport.flush().await, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let (mut transport, _, _) = loopback().await;
        transport.flush().await.unwrap();
    }
}
