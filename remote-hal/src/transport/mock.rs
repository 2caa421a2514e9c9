//! Scripted in-memory transport for tests.
//!
//! Each queued arrival becomes readable on the next `available()` call, one
//! arrival per call, which models datagrams showing up between polls. Like
//! the UDP transport, a read never spans two arrivals.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Connector, Transport};
use crate::error::{Error, Result};

#[derive(Default)]
struct State {
    arrivals: VecDeque<Vec<u8>>,
    rx: VecDeque<Vec<u8>>,
    read_faults: u32,
    reads: u32,
    pending_tx: Vec<u8>,
    sent: Vec<Vec<u8>>,
    peer: Option<SocketAddr>,
    target: Option<SocketAddr>,
    dropped: bool,
}

pub(crate) struct MockTransport {
    state: Arc<Mutex<State>>,
}

/// Test-side view of a [`MockTransport`].
#[derive(Clone)]
pub(crate) struct MockHandle {
    state: Arc<Mutex<State>>,
}

pub(crate) fn pair() -> (MockTransport, MockHandle) {
    let state = Arc::new(Mutex::new(State::default()));
    (
        MockTransport {
            state: state.clone(),
        },
        MockHandle { state },
    )
}

impl MockHandle {
    pub(crate) fn arrive(&self, data: &[u8]) {
        self.state.lock().arrivals.push_back(data.to_vec());
    }

    pub(crate) fn fail_reads(&self, count: u32) {
        self.state.lock().read_faults = count;
    }

    pub(crate) fn set_peer(&self, peer: SocketAddr) {
        self.state.lock().peer = Some(peer);
    }

    /// Frames pushed out by `flush`, oldest first.
    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    pub(crate) fn target(&self) -> Option<SocketAddr> {
        self.state.lock().target
    }

    pub(crate) fn reads(&self) -> u32 {
        self.state.lock().reads
    }

    pub(crate) fn is_dropped(&self) -> bool {
        self.state.lock().dropped
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.state.lock().dropped = true;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn available(&mut self) -> Result<usize> {
        let mut state = self.state.lock();
        if let Some(arrival) = state.arrivals.pop_front() {
            if !arrival.is_empty() {
                state.rx.push_back(arrival);
            }
        }
        Ok(state.rx.iter().map(Vec::len).sum())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();
        state.reads += 1;
        if state.read_faults > 0 {
            state.read_faults -= 1;
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "simulated link drop",
            )));
        }

        let Some(front) = state.rx.front_mut() else {
            return Ok(0);
        };
        let len = buf.len().min(front.len());
        buf[..len].copy_from_slice(&front[..len]);
        front.drain(..len);
        if front.is_empty() {
            state.rx.pop_front();
        }
        Ok(len)
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.state.lock().pending_tx.extend_from_slice(data);
        Ok(data.len())
    }

    async fn flush(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.pending_tx.is_empty() {
            let frame = std::mem::take(&mut state.pending_tx);
            state.sent.push(frame);
        }
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.state.lock().peer
    }

    fn set_target(&mut self, peer: SocketAddr) -> Result<()> {
        self.state.lock().target = Some(peer);
        Ok(())
    }
}

/// Hands out prepared mock transports in order and counts how many were
/// opened.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    queue: Arc<Mutex<VecDeque<MockTransport>>>,
    opened: Arc<AtomicU32>,
    last_port: Arc<Mutex<Option<u16>>>,
}

impl MockConnector {
    /// Queue a fresh transport and return its handle.
    pub(crate) fn prepare(&self) -> MockHandle {
        let (transport, handle) = pair();
        self.queue.lock().push_back(transport);
        handle
    }

    pub(crate) fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn last_port(&self) -> Option<u16> {
        *self.last_port.lock()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, port: u16) -> Result<Box<dyn Transport>> {
        let transport = self
            .queue
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Transport(format!("no mock transport for port {}", port)))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.last_port.lock() = Some(port);
        Ok(Box::new(transport))
    }
}
