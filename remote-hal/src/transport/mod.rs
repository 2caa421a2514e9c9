//! Physical transport layer to the remote controller.
//!
//! A transport is a raw duplex byte stream without any protocol knowledge.
//! The handshake and the peripheral proxies are written against the
//! [`Transport`] trait; [`UdpTransport`] and [`SerialTransport`] are the two
//! concrete channels shipped with the crate.
//!
//! Several proxies talk over the same transport, so the active transport is
//! held through a [`SharedTransport`] handle. The channel closes when its last
//! handle is dropped.

use std::fmt;
use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

pub mod serial;
pub mod udp;

#[cfg(test)]
pub(crate) mod mock;

pub use serial::SerialTransport;
pub use udp::{UdpConnector, UdpTransport};

/// Listening port of the default transport.
pub const DEFAULT_PORT: u16 = 7000;

/// Duplex byte channel to the remote controller.
#[async_trait]
pub trait Transport: Send {
    /// Number of bytes that can be read without waiting.
    async fn available(&mut self) -> Result<usize>;

    /// Read up to `buf.len()` already received bytes into `buf`.
    ///
    /// Returns the number of bytes copied, which is 0 when nothing is
    /// pending.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Queue `data` for sending. Returns the number of bytes accepted.
    async fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Push out everything queued by [`Transport::write`].
    async fn flush(&mut self) -> Result<()>;

    /// Drop everything received so far. Returns the number of bytes dropped.
    async fn discard_input(&mut self) -> Result<usize> {
        let mut scratch = [0u8; 64];
        let mut discarded = 0;
        while self.available().await? > 0 {
            let len = self.read(&mut scratch).await?;
            if len == 0 {
                break;
            }
            discarded += len;
        }
        Ok(discarded)
    }

    /// Address of the peer, known only after it has sent something.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Direct subsequent writes to `peer`.
    fn set_target(&mut self, peer: SocketAddr) -> Result<()> {
        Err(Error::Transport(format!(
            "transport cannot be retargeted to {}",
            peer
        )))
    }

    /// Local address the transport is bound to, if it has one.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// An open transport and the call sequence of everything talking over it.
///
/// Dereferences to the transport itself.
pub struct Channel {
    transport: Box<dyn Transport>,
    next_seq: u16,
}

impl Channel {
    fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            next_seq: 0,
        }
    }

    /// Sequence number for the next call on this channel. Wraps around.
    pub fn next_seq(&mut self) -> u16 {
        let seq = self.next_seq;
        self.next_seq = seq.wrapping_add(1);
        seq
    }
}

impl Deref for Channel {
    type Target = dyn Transport;

    fn deref(&self) -> &Self::Target {
        &*self.transport
    }
}

impl DerefMut for Channel {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.transport
    }
}

/// Reference-counted handle to one open transport.
///
/// Cloning the handle does not open a new channel; every clone talks over
/// the same one.
#[derive(Clone)]
pub struct SharedTransport {
    inner: Arc<Mutex<Channel>>,
}

impl SharedTransport {
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self::from_boxed(Box::new(transport))
    }

    pub fn from_boxed(transport: Box<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Channel::new(transport))),
        }
    }

    /// Take exclusive access to the channel for one exchange.
    pub async fn lock(&self) -> MutexGuard<'_, Channel> {
        self.inner.lock().await
    }

    /// Whether both handles refer to the same channel.
    pub fn same_channel(&self, other: &SharedTransport) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles to this channel, this one included.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for SharedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTransport")
            .field("channel", &Arc::as_ptr(&self.inner))
            .field("handles", &self.handle_count())
            .finish()
    }
}

/// Opens the default transport for a port.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, port: u16) -> Result<Box<dyn Transport>>;
}
