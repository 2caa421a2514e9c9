//! SPI proxy.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::call::RemoteCall;
use super::link::Link;
use super::{Capability, Peripheral};
use crate::error::Result;
use crate::hw_trait::{Spi, SpiSettings};
use crate::transport::SharedTransport;

/// SPI bus master of the remote controller.
pub struct RemoteSpi {
    link: Link,
}

impl RemoteSpi {
    pub fn new(transport: SharedTransport, reply_timeout: Duration) -> Self {
        Self {
            link: Link::new(transport, reply_timeout),
        }
    }
}

impl Peripheral for RemoteSpi {
    fn capability(&self) -> Capability {
        Capability::Spi
    }

    fn transport(&self) -> &SharedTransport {
        self.link.transport()
    }
}

#[async_trait]
impl Spi for RemoteSpi {
    async fn configure(&mut self, settings: SpiSettings) -> Result<()> {
        self.link.call(RemoteCall::SpiConfigure(settings)).await?;
        Ok(())
    }

    async fn transfer(&mut self, data: &mut [u8]) -> Result<()> {
        let outgoing = Bytes::copy_from_slice(data);
        let reply = self
            .link
            .call(RemoteCall::SpiTransfer { data: outgoing })
            .await?;
        data.copy_from_slice(&reply);
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let data = Bytes::copy_from_slice(data);
        self.link.call(RemoteCall::SpiWrite { data }).await?;
        Ok(())
    }
}
