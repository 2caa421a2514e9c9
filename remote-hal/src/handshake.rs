//! Identification handshake with the remote controller.
//!
//! No proxy is bound to a transport until the peer on the other end has
//! identified itself. The controller does so by sending the ASCII marker
//! `Arduino-Emulator`, usually followed by a two-byte line ending. The host
//! polls the transport at a fixed interval until the marker shows up.
//!
//! On the default UDP path the host then completes a rendezvous: it learns
//! the peer's address from the identification datagram, points the transport
//! at it and answers `OK`. Only after that does the controller expect
//! peripheral traffic. Identifications the controller repeated while waiting
//! are dropped first, so no proxy ever reads them as a reply.
//!
//! Each poll is a single [`HandshakeStep`], so callers and tests can drive
//! the protocol one step at a time. [`HandshakeSession::run`] loops over
//! steps according to a [`RetryPolicy`]. Transport faults are logged and
//! retried; they never end the session.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time;

use crate::error::{Error, Result};
use crate::tracing::prelude::*;
use crate::transport::{Channel, SharedTransport};

/// Identification sent by the remote controller.
pub const IDENTIFICATION_MARKER: &[u8] = b"Arduino-Emulator";

/// Reply sent to the controller once it has been identified.
pub const ACKNOWLEDGEMENT: &[u8] = b"OK";

/// Bytes read past the marker in one attempt (the line ending).
const TRAILING_BYTES: usize = 2;

/// Pause between two polls.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// How long and how often to poll for the identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Poll until the device shows up, however long that takes.
    pub fn forever(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up after `max_attempts` polls.
    pub fn limited(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::forever(DEFAULT_RETRY_DELAY)
    }
}

/// Outcome of a single poll.
#[derive(Debug)]
pub enum HandshakeStep {
    /// The marker arrived.
    Resolved,
    /// Not enough bytes yet to hold a marker.
    StillWaiting { available: usize },
    /// Something other than the marker arrived and was consumed.
    Unrecognized(Vec<u8>),
    /// The transport failed while checking or reading.
    TransportFault(Error),
}

/// One attempt at identifying the device on a transport.
pub struct HandshakeSession<'a> {
    transport: &'a SharedTransport,
    marker: &'a [u8],
    policy: RetryPolicy,
}

impl<'a> HandshakeSession<'a> {
    /// Fails if `marker` is empty, since every input would match it.
    pub fn new(
        transport: &'a SharedTransport,
        marker: &'a [u8],
        policy: RetryPolicy,
    ) -> Result<Self> {
        if marker.is_empty() {
            return Err(Error::Handshake("identification marker is empty".to_string()));
        }
        Ok(Self {
            transport,
            marker,
            policy,
        })
    }

    /// Check the transport once.
    ///
    /// Reads only when a whole marker is available, and then at most the
    /// marker plus its line ending. Only the leading bytes are compared.
    pub async fn poll(&self) -> HandshakeStep {
        let mut transport = self.transport.lock().await;

        let available = match transport.available().await {
            Ok(available) => available,
            Err(e) => return HandshakeStep::TransportFault(e),
        };
        if available < self.marker.len() {
            return HandshakeStep::StillWaiting { available };
        }

        let mut received = vec![0u8; self.marker.len() + TRAILING_BYTES];
        match transport.read(&mut received).await {
            Ok(len) => {
                received.truncate(len);
                if received.starts_with(self.marker) {
                    HandshakeStep::Resolved
                } else {
                    HandshakeStep::Unrecognized(received)
                }
            }
            Err(e) => HandshakeStep::TransportFault(e),
        }
    }

    /// Poll until the marker arrives or the policy runs out.
    ///
    /// With the default policy this only returns once the device has been
    /// found.
    pub async fn run(&self) -> Result<()> {
        let mut attempts = 0u32;

        loop {
            info!("Waiting for device...");
            attempts += 1;

            match self.poll().await {
                HandshakeStep::Resolved => {
                    info!(attempts, "Device found!");
                    return Ok(());
                }
                HandshakeStep::StillWaiting { available } => {
                    trace!(available, "No identification yet");
                }
                HandshakeStep::Unrecognized(received) => {
                    warn!(
                        received = %String::from_utf8_lossy(&received),
                        hex = %hex::encode(&received),
                        "Unknown command"
                    );
                }
                HandshakeStep::TransportFault(e) => {
                    error!(error = %e, "Transport fault while waiting for device");
                }
            }

            if self.policy.exhausted(attempts) {
                return Err(Error::HandshakeExhausted { attempts });
            }
            time::sleep(self.policy.delay).await;
        }
    }
}

/// Wait for the device on `transport` to send `marker`.
pub async fn await_identification(
    transport: &SharedTransport,
    marker: &[u8],
    policy: RetryPolicy,
) -> Result<()> {
    HandshakeSession::new(transport, marker, policy)?.run().await
}

/// Drop whatever the controller sent after its identification.
pub async fn discard_leftovers(transport: &SharedTransport) -> Result<usize> {
    let mut channel = transport.lock().await;
    discard(&mut channel).await
}

async fn discard(channel: &mut Channel) -> Result<usize> {
    let discarded = channel.discard_input().await?;
    if discarded > 0 {
        debug!(discarded, "Dropped input left over from identification");
    }
    Ok(discarded)
}

/// Finish the rendezvous after identification.
///
/// Points the transport at the peer that sent the marker, drops anything
/// still pending and answers `OK`. Returns the peer address.
pub async fn acknowledge(transport: &SharedTransport) -> Result<SocketAddr> {
    let mut transport = transport.lock().await;

    let peer = transport.peer_addr().ok_or_else(|| {
        Error::Handshake("peer address unknown after identification".to_string())
    })?;
    transport.set_target(peer)?;
    discard(&mut transport).await?;
    transport.write(ACKNOWLEDGEMENT).await?;
    transport.flush().await?;

    info!(peer = %peer, "Acknowledged device");
    Ok(peer)
}
