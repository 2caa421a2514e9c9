use tokio::signal::unix::{self, SignalKind};

use remote_hal::config::Config;
use remote_hal::setup::HardwareSetup;
use remote_hal::tracing::{self, prelude::*};
use remote_hal::transport::{SerialTransport, SharedTransport};

// Bind the proxies over the configured transport. Waits for as long as the
// controller takes to show up.
async fn attach(setup: &mut HardwareSetup, config: &Config) -> remote_hal::Result<()> {
    match &config.serial {
        Some(serial) => {
            info!(path = %serial.path, "Using serial transport");
            let transport = SerialTransport::open(&serial.path, serial.baud_rate)?;
            setup.begin_with(SharedTransport::new(transport), true).await
        }
        None => {
            info!(port = setup.config().port, "Using UDP transport");
            setup.attach_default().await
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let config = Config::load()?;
    let mut setup = HardwareSetup::with_config(config.setup.clone()).await?;
    info!("Started.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;

    let attached = tokio::select! {
        result = attach(&mut setup, &config) => {
            result?;
            true
        }
        _ = sigint.recv() => false,
        _ = sigterm.recv() => false,
    };

    if attached {
        info!("Remote hardware attached.");
        tokio::select! {
            _ = sigint.recv() => {},
            _ = sigterm.recv() => {},
        }
    }

    trace!("Shutting down.");
    setup.stop();
    info!("Exiting.");
    Ok(())
}
