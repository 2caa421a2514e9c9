//! Hardware abstraction for code whose peripherals live on a remote
//! controller.
//!
//! Application code talks to GPIO, I2C and SPI through the traits in
//! [`hw_trait`]. The implementations forward every call over a byte-stream
//! [`transport`] to a controller that owns the real pins. [`setup`] decides
//! which transport is live: it waits for the controller to identify itself
//! ([`handshake`]) and swaps freshly bound proxies into the [`registry`].

pub mod config;
pub mod error;
pub mod handshake;
pub mod hw_trait;
pub mod peripheral;
pub mod registry;
pub mod setup;
pub mod tracing;
pub mod transport;

pub use error::{Error, Result};
pub use registry::Hardware;
pub use setup::HardwareSetup;
