//! Request/reply exchange over a shared transport.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::time;
use tokio_util::codec::{Decoder, Encoder};

use super::call::{CallCodec, RemoteCall, Request};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;
use crate::transport::{Channel, SharedTransport};

const REPLY_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// One proxy's binding to its transport.
///
/// The transport stays locked for the whole exchange so that a reply is
/// never picked up by another proxy sharing the channel. Replies carrying
/// another sequence number are answers to calls that already timed out and
/// are dropped.
pub(crate) struct Link {
    transport: SharedTransport,
    reply_timeout: Duration,
}

impl Link {
    pub(crate) fn new(transport: SharedTransport, reply_timeout: Duration) -> Self {
        Self {
            transport,
            reply_timeout,
        }
    }

    pub(crate) fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    /// Send `call` and wait for its reply, if it has one.
    pub(crate) async fn call(&self, call: RemoteCall) -> Result<Bytes> {
        let id = call.id();
        let reply_len = call.reply_len();

        let mut channel = self.transport.lock().await;
        let seq = channel.next_seq();

        let mut frame = BytesMut::new();
        CallCodec.encode(Request { seq, call }, &mut frame)?;

        trace!(call = ?id, seq, len = frame.len(), "Sending remote call");
        channel.write(&frame).await?;
        channel.flush().await?;

        if reply_len == 0 {
            return Ok(Bytes::new());
        }

        let payload = time::timeout(self.reply_timeout, receive_reply(&mut channel, seq))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "no reply to {:?} (seq {}) within {:?}",
                    id, seq, self.reply_timeout
                ))
            })??;

        if payload.len() != reply_len {
            return Err(Error::Hardware(format!(
                "reply to {:?} carries {} bytes, expected {}",
                id,
                payload.len(),
                reply_len
            )));
        }
        Ok(payload)
    }
}

async fn receive_reply(channel: &mut Channel, seq: u16) -> Result<Bytes> {
    let mut received = BytesMut::new();
    let mut chunk = [0u8; 256];

    loop {
        while let Some(reply) = CallCodec.decode(&mut received)? {
            if reply.seq == seq {
                return Ok(reply.payload);
            }
            debug!(expected = seq, got = reply.seq, "Dropping stale reply");
        }

        if channel.available().await? == 0 {
            time::sleep(REPLY_POLL_INTERVAL).await;
            continue;
        }
        let len = channel.read(&mut chunk).await?;
        received.extend_from_slice(&chunk[..len]);
    }
}
