//! Serial transport for controllers wired to the host directly.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

use super::Transport;
use crate::error::Result;
use crate::tracing::prelude::*;

/// Default line speed for serial-attached controllers.
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Byte stream over a serial device such as `/dev/ttyACM0`.
pub struct SerialTransport {
    port: SerialStream,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = tokio_serial::new(path, baud_rate).open_native_async()?;
        debug!(path, baud_rate, "Serial transport opened");
        Ok(Self { port })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn available(&mut self) -> Result<usize> {
        Ok(SerialPort::bytes_to_read(&self.port)? as usize)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pending = self.available().await?;
        if pending == 0 {
            return Ok(0);
        }
        let len = buf.len().min(pending);
        Ok(AsyncReadExt::read(&mut self.port, &mut buf[..len]).await?)
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        AsyncWriteExt::write_all(&mut self.port, data).await?;
        Ok(data.len())
    }

    async fn flush(&mut self) -> Result<()> {
        AsyncWriteExt::flush(&mut self.port).await?;
        Ok(())
    }

    async fn discard_input(&mut self) -> Result<usize> {
        let pending = self.available().await?;
        SerialPort::clear(&self.port, ClearBuffer::Input)?;
        Ok(pending)
    }
}
