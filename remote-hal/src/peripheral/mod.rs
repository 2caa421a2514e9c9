//! Peripheral proxies for the remote controller.
//!
//! Each proxy implements one capability trait from [`crate::hw_trait`] by
//! forwarding calls over the transport it was bound to at construction. A
//! proxy is never rebound: when the transport changes, the setup controller
//! drops the old proxies and binds new ones. Proxies are deliberately not
//! `Clone`, so the registry slot holding a proxy is its only owner.

use std::time::Duration;

use strum::{Display, EnumIter, IntoStaticStr};

use crate::transport::SharedTransport;

pub mod call;
pub mod gpio;
pub mod i2c;
mod link;
pub mod spi;

pub use gpio::RemoteGpio;
pub use i2c::RemoteI2c;
pub use spi::RemoteSpi;

/// How long a proxy waits for the controller to answer a call.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// The peripheral capabilities provided by the remote controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    DigitalIo,
    I2c,
    Spi,
}

/// Common view of every proxy, whatever its capability.
pub trait Peripheral: Send {
    fn capability(&self) -> Capability;

    /// Transport this proxy forwards over.
    fn transport(&self) -> &SharedTransport;

    fn is_bound_to(&self, transport: &SharedTransport) -> bool {
        self.transport().same_channel(transport)
    }
}

/// A proxy of any capability, as held by a registry slot.
pub(crate) enum Proxy {
    DigitalIo(RemoteGpio),
    I2c(RemoteI2c),
    Spi(RemoteSpi),
}

impl Proxy {
    /// Construct the proxy for `capability` on `transport`.
    pub(crate) fn bind(
        capability: Capability,
        transport: SharedTransport,
        reply_timeout: Duration,
    ) -> Self {
        match capability {
            Capability::DigitalIo => Proxy::DigitalIo(RemoteGpio::new(transport, reply_timeout)),
            Capability::I2c => Proxy::I2c(RemoteI2c::new(transport, reply_timeout)),
            Capability::Spi => Proxy::Spi(RemoteSpi::new(transport, reply_timeout)),
        }
    }

    pub(crate) fn capability(&self) -> Capability {
        self.as_peripheral().capability()
    }

    pub(crate) fn as_peripheral(&self) -> &dyn Peripheral {
        match self {
            Proxy::DigitalIo(gpio) => gpio,
            Proxy::I2c(i2c) => i2c,
            Proxy::Spi(spi) => spi,
        }
    }
}
