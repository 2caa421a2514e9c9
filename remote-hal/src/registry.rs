//! The set of currently active peripheral proxies.
//!
//! [`Hardware`] is the access point application code uses to reach the
//! remote peripherals. It holds at most one proxy per [`Capability`], and
//! every proxy it holds is bound to the transport that is currently active.
//! Only [`crate::setup::HardwareSetup`] installs or removes proxies; everyone
//! else gets shared or exclusive borrows of the proxies themselves.

use crate::peripheral::{Capability, Peripheral, Proxy, RemoteGpio, RemoteI2c, RemoteSpi};

#[derive(Default)]
pub struct Hardware {
    gpio: Option<RemoteGpio>,
    i2c: Option<RemoteI2c>,
    spi: Option<RemoteSpi>,
}

impl Hardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// The installed proxy for `capability`, if any.
    pub fn capability(&self, capability: Capability) -> Option<&dyn Peripheral> {
        match capability {
            Capability::DigitalIo => self.gpio.as_ref().map(|p| p as &dyn Peripheral),
            Capability::I2c => self.i2c.as_ref().map(|p| p as &dyn Peripheral),
            Capability::Spi => self.spi.as_ref().map(|p| p as &dyn Peripheral),
        }
    }

    pub fn gpio(&self) -> Option<&RemoteGpio> {
        self.gpio.as_ref()
    }

    pub fn gpio_mut(&mut self) -> Option<&mut RemoteGpio> {
        self.gpio.as_mut()
    }

    pub fn i2c(&self) -> Option<&RemoteI2c> {
        self.i2c.as_ref()
    }

    pub fn i2c_mut(&mut self) -> Option<&mut RemoteI2c> {
        self.i2c.as_mut()
    }

    pub fn spi(&self) -> Option<&RemoteSpi> {
        self.spi.as_ref()
    }

    pub fn spi_mut(&mut self) -> Option<&mut RemoteSpi> {
        self.spi.as_mut()
    }

    /// Whether no capability is installed.
    pub fn is_empty(&self) -> bool {
        self.gpio.is_none() && self.i2c.is_none() && self.spi.is_none()
    }

    /// Put `proxy` into its slot.
    ///
    /// The previous occupant is dropped before the new proxy goes in, so the
    /// slot never refers to two transports at once.
    pub(crate) fn install(&mut self, proxy: Proxy) {
        self.uninstall(proxy.capability());
        match proxy {
            Proxy::DigitalIo(gpio) => self.gpio = Some(gpio),
            Proxy::I2c(i2c) => self.i2c = Some(i2c),
            Proxy::Spi(spi) => self.spi = Some(spi),
        }
    }

    /// Empty the slot for `capability`. Returns whether it held a proxy.
    pub(crate) fn uninstall(&mut self, capability: Capability) -> bool {
        match capability {
            Capability::DigitalIo => self.gpio.take().is_some(),
            Capability::I2c => self.i2c.take().is_some(),
            Capability::Spi => self.spi.take().is_some(),
        }
    }

    /// Empty every slot.
    pub(crate) fn clear(&mut self) {
        self.gpio = None;
        self.i2c = None;
        self.spi = None;
    }
}
