//! Digital I/O proxy.

use std::time::Duration;

use async_trait::async_trait;

use super::call::RemoteCall;
use super::link::Link;
use super::{Capability, Peripheral};
use crate::error::Result;
use crate::hw_trait::{Gpio, PinMode, PinState};
use crate::transport::SharedTransport;

/// GPIO pins of the remote controller.
pub struct RemoteGpio {
    link: Link,
}

impl RemoteGpio {
    pub fn new(transport: SharedTransport, reply_timeout: Duration) -> Self {
        Self {
            link: Link::new(transport, reply_timeout),
        }
    }
}

impl Peripheral for RemoteGpio {
    fn capability(&self) -> Capability {
        Capability::DigitalIo
    }

    fn transport(&self) -> &SharedTransport {
        self.link.transport()
    }
}

#[async_trait]
impl Gpio for RemoteGpio {
    async fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        self.link.call(RemoteCall::PinMode { pin, mode }).await?;
        Ok(())
    }

    async fn write(&mut self, pin: u8, state: PinState) -> Result<()> {
        self.link.call(RemoteCall::DigitalWrite { pin, state }).await?;
        Ok(())
    }

    async fn read(&mut self, pin: u8) -> Result<PinState> {
        let reply = self.link.call(RemoteCall::DigitalRead { pin }).await?;
        Ok(PinState::from(reply[0] != 0))
    }

    async fn analog_read(&mut self, pin: u8) -> Result<u16> {
        let reply = self.link.call(RemoteCall::AnalogRead { pin }).await?;
        Ok(u16::from_le_bytes([reply[0], reply[1]]))
    }

    async fn analog_write(&mut self, pin: u8, value: u16) -> Result<()> {
        self.link.call(RemoteCall::AnalogWrite { pin, value }).await?;
        Ok(())
    }
}
