//! Hardware abstraction layer traits.
//!
//! This module defines the capability traits (digital I/O, I2C, SPI) that
//! application code is written against. In this crate every implementation
//! is tunneled to the remote controller, but nothing in the traits knows
//! about that.

use async_trait::async_trait;

use crate::error::Result;

/// Electrical configuration of a GPIO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PinMode {
    Input = 0,
    Output = 1,
    InputPullup = 2,
    InputPulldown = 3,
}

/// Logic level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Low,
    High,
}

impl From<bool> for PinState {
    fn from(high: bool) -> Self {
        if high {
            PinState::High
        } else {
            PinState::Low
        }
    }
}

impl From<PinState> for bool {
    fn from(state: PinState) -> Self {
        state == PinState::High
    }
}

/// Digital and analog pin access.
#[async_trait]
pub trait Gpio: Send {
    async fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<()>;

    async fn write(&mut self, pin: u8, state: PinState) -> Result<()>;

    async fn read(&mut self, pin: u8) -> Result<PinState>;

    /// Raw ADC reading.
    async fn analog_read(&mut self, pin: u8) -> Result<u16>;

    /// PWM duty cycle.
    async fn analog_write(&mut self, pin: u8, value: u16) -> Result<()>;
}

/// I2C bus master.
#[async_trait]
pub trait I2c: Send {
    async fn set_frequency(&mut self, hz: u32) -> Result<()>;

    async fn write(&mut self, address: u8, data: &[u8]) -> Result<()>;

    async fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<()>;

    /// Write then read with a repeated start in between.
    async fn write_read(&mut self, address: u8, data: &[u8], buffer: &mut [u8]) -> Result<()>;
}

/// SPI clock polarity and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpiMode {
    Mode0 = 0,
    Mode1 = 1,
    Mode2 = 2,
    Mode3 = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BitOrder {
    LsbFirst = 0,
    MsbFirst = 1,
}

/// Bus settings applied before a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiSettings {
    pub clock_hz: u32,
    pub mode: SpiMode,
    pub bit_order: BitOrder,
}

impl Default for SpiSettings {
    fn default() -> Self {
        Self {
            clock_hz: 4_000_000,
            mode: SpiMode::Mode0,
            bit_order: BitOrder::MsbFirst,
        }
    }
}

/// SPI bus master.
#[async_trait]
pub trait Spi: Send {
    async fn configure(&mut self, settings: SpiSettings) -> Result<()>;

    /// Full-duplex transfer; `data` is replaced with the bytes clocked in.
    async fn transfer(&mut self, data: &mut [u8]) -> Result<()>;

    async fn write(&mut self, data: &[u8]) -> Result<()>;
}
