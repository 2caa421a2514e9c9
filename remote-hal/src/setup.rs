//! Setup of the remote hardware.
//!
//! [`HardwareSetup`] is the single authority over which transport is live
//! and which proxies talk over it. It owns the default UDP transport and the
//! [`Hardware`] registry; all changes to either go through it.
//!
//! Two ways in:
//!
//! - [`HardwareSetup::begin_with`] takes a transport the caller opened
//!   (a serial port, say), optionally handshakes on it, and swaps a fresh
//!   proxy per capability into the registry.
//! - [`HardwareSetup::begin`] completes the rendezvous on the default
//!   transport: wait for the controller to identify itself, then answer `OK`
//!   to it. [`HardwareSetup::attach_default`] additionally binds the proxies
//!   to the default transport.
//!
//! [`HardwareSetup::stop`] drops the default transport and every proxy.
//! Dropping the controller does the same.

use strum::IntoEnumIterator;

use crate::config::SetupConfig;
use crate::error::Result;
use crate::handshake::{self, HandshakeSession};
use crate::peripheral::{Capability, Proxy};
use crate::registry::Hardware;
use crate::tracing::prelude::*;
use crate::transport::{Connector, SharedTransport, UdpConnector};

// The controller's own transport and whether its peer has been answered.
struct DefaultTransport {
    transport: SharedTransport,
    acknowledged: bool,
}

pub struct HardwareSetup<C: Connector = UdpConnector> {
    config: SetupConfig,
    connector: C,
    default_transport: Option<DefaultTransport>,
    hardware: Hardware,
}

impl HardwareSetup {
    /// Open the default UDP transport on `port`.
    pub async fn new(port: u16) -> Result<Self> {
        Self::with_config(SetupConfig::with_port(port)).await
    }

    pub async fn with_config(config: SetupConfig) -> Result<Self> {
        Self::with_connector(config, UdpConnector).await
    }
}

impl<C: Connector> HardwareSetup<C> {
    /// Open the default transport through `connector`. No handshake yet.
    pub async fn with_connector(config: SetupConfig, connector: C) -> Result<Self> {
        config.validate()?;
        let mut setup = Self {
            config,
            connector,
            default_transport: None,
            hardware: Hardware::new(),
        };
        setup.open_default().await?;
        Ok(setup)
    }

    /// Bind the proxies to `transport`, handshaking on it first if asked to.
    ///
    /// The controller's own default transport is always released, whether
    /// or not it is the one passed in. Every capability ends up with exactly
    /// one proxy, bound to `transport`; previous proxies are dropped. If the
    /// handshake fails the registry is left as it was.
    pub async fn begin_with(&mut self, transport: SharedTransport, handshake: bool) -> Result<()> {
        self.cleanup();

        if handshake {
            let policy = self.config.retry_policy();
            HandshakeSession::new(&transport, self.config.marker.as_bytes(), policy)?
                .run()
                .await?;
            handshake::discard_leftovers(&transport).await?;
        }

        self.bind_proxies(&transport);
        Ok(())
    }

    /// Complete the rendezvous on the default transport.
    ///
    /// Opens the default transport if there is none, waits for the
    /// controller to identify itself and answers it. Once the rendezvous has
    /// happened, further calls do nothing. The registry is not touched.
    pub async fn begin(&mut self) -> Result<()> {
        if self.default_transport.is_none() {
            self.open_default().await?;
        }

        let policy = self.config.retry_policy();
        let Some(default) = self.default_transport.as_mut() else {
            return Ok(());
        };
        if default.acknowledged {
            debug!("Default transport already established");
            return Ok(());
        }

        HandshakeSession::new(&default.transport, self.config.marker.as_bytes(), policy)?
            .run()
            .await?;
        handshake::acknowledge(&default.transport).await?;
        default.acknowledged = true;
        Ok(())
    }

    /// [`HardwareSetup::begin`], then bind the proxies to the default
    /// transport.
    pub async fn attach_default(&mut self) -> Result<()> {
        self.begin().await?;
        if let Some(transport) = self.default_transport().cloned() {
            self.bind_proxies(&transport);
        }
        Ok(())
    }

    /// Release the default transport and every proxy. Safe to call when
    /// nothing is live.
    pub fn stop(&mut self) {
        self.cleanup();
        if !self.hardware.is_empty() {
            debug!("Removing peripheral proxies");
            self.hardware.clear();
        }
    }

    /// The active proxies.
    pub fn hardware(&self) -> &Hardware {
        &self.hardware
    }

    /// The active proxies, for issuing calls.
    pub fn hardware_mut(&mut self) -> &mut Hardware {
        &mut self.hardware
    }

    /// The default transport, while the controller holds one.
    pub fn default_transport(&self) -> Option<&SharedTransport> {
        self.default_transport.as_ref().map(|d| &d.transport)
    }

    /// Whether the controller on the default transport has been answered.
    pub fn is_established(&self) -> bool {
        self.default_transport
            .as_ref()
            .is_some_and(|d| d.acknowledged)
    }

    pub fn config(&self) -> &SetupConfig {
        &self.config
    }

    async fn open_default(&mut self) -> Result<()> {
        let transport = self.connector.open(self.config.port).await?;
        info!(port = self.config.port, "Default transport open");
        self.default_transport = Some(DefaultTransport {
            transport: SharedTransport::from_boxed(transport),
            acknowledged: false,
        });
        Ok(())
    }

    fn bind_proxies(&mut self, transport: &SharedTransport) {
        let reply_timeout = self.config.reply_timeout();
        for capability in Capability::iter() {
            if self.hardware.capability(capability).is_some() {
                debug!(%capability, "Replacing proxy");
            }
            self.hardware
                .install(Proxy::bind(capability, transport.clone(), reply_timeout));
        }
        info!("Peripheral proxies bound");
    }

    // Release the default transport. Proxies bound to it keep it open until
    // they are replaced.
    fn cleanup(&mut self) {
        if self.default_transport.take().is_some() {
            debug!("Default transport released");
        }
    }
}
