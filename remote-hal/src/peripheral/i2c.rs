//! I2C proxy.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::call::RemoteCall;
use super::link::Link;
use super::{Capability, Peripheral};
use crate::error::{Error, Result};
use crate::hw_trait::I2c;
use crate::transport::SharedTransport;

/// I2C bus master of the remote controller.
pub struct RemoteI2c {
    link: Link,
}

impl RemoteI2c {
    pub fn new(transport: SharedTransport, reply_timeout: Duration) -> Self {
        Self {
            link: Link::new(transport, reply_timeout),
        }
    }
}

fn read_len(buffer: &[u8]) -> Result<u16> {
    u16::try_from(buffer.len())
        .map_err(|_| Error::Hardware(format!("I2C read of {} bytes is too long", buffer.len())))
}

impl Peripheral for RemoteI2c {
    fn capability(&self) -> Capability {
        Capability::I2c
    }

    fn transport(&self) -> &SharedTransport {
        self.link.transport()
    }
}

#[async_trait]
impl I2c for RemoteI2c {
    async fn set_frequency(&mut self, hz: u32) -> Result<()> {
        self.link.call(RemoteCall::I2cSetClock { hz }).await?;
        Ok(())
    }

    async fn write(&mut self, address: u8, data: &[u8]) -> Result<()> {
        let data = Bytes::copy_from_slice(data);
        self.link.call(RemoteCall::I2cWrite { address, data }).await?;
        Ok(())
    }

    async fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<()> {
        let len = read_len(buffer)?;
        let reply = self.link.call(RemoteCall::I2cRead { address, len }).await?;
        buffer.copy_from_slice(&reply);
        Ok(())
    }

    async fn write_read(&mut self, address: u8, data: &[u8], buffer: &mut [u8]) -> Result<()> {
        let len = read_len(buffer)?;
        let data = Bytes::copy_from_slice(data);
        let reply = self
            .link
            .call(RemoteCall::I2cWriteRead { address, data, len })
            .await?;
        buffer.copy_from_slice(&reply);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::call::reply_frame;
    use crate::peripheral::DEFAULT_REPLY_TIMEOUT;
    use crate::transport::mock::{self, MockHandle};

    fn i2c() -> (RemoteI2c, MockHandle) {
        let (transport, handle) = mock::pair();
        let i2c = RemoteI2c::new(SharedTransport::new(transport), DEFAULT_REPLY_TIMEOUT);
        (i2c, handle)
    }

    #[tokio::test]
    async fn test_write_read_register() {
        let (mut i2c, handle) = i2c();
        handle.arrive(&reply_frame(0, &[0x00, 0x42]));

        let mut word = [0u8; 2];
        i2c.write_read(0x24, &[0x79], &mut word).await.unwrap();

        assert_eq!(word, [0x00, 0x42]);
        assert_eq!(
            handle.sent(),
            vec![vec![0, 0, 0x03, 0x01, 0x24, 0x01, 0x00, 0x79, 0x02, 0x00]]
        );
    }

    #[tokio::test]
    async fn test_reply_split_across_arrivals() {
        let (mut i2c, handle) = i2c();
        let frame = reply_frame(0, &[1, 2, 3]);
        handle.arrive(&frame[..5]);
        handle.arrive(&frame[5..]);

        let mut buffer = [0u8; 3];
        i2c.read(0x50, &mut buffer).await.unwrap();
        assert_eq!(buffer, [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_write_and_clock() {
        let (mut i2c, handle) = i2c();
        i2c.set_frequency(400_000).await.unwrap();
        i2c.write(0x24, &[0x03]).await.unwrap();

        assert_eq!(
            handle.sent(),
            vec![
                vec![0, 0, 0x00, 0x01, 0x80, 0x1A, 0x06, 0x00],
                vec![1, 0, 0x01, 0x01, 0x24, 0x01, 0x00, 0x03],
            ]
        );
    }
}
