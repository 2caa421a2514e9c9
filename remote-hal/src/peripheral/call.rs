//! Framing of peripheral calls exchanged with the remote controller.
//!
//! A request frame is the call's sequence number and call id, both
//! little-endian u16, followed by the call's arguments. Byte payloads carry a
//! little-endian u16 length prefix.
//!
//! Calls that return something are answered with a reply frame:
//!
//! ```text
//! A5 5A | seq (u16 LE) | len (u16 LE) | payload
//! ```
//!
//! The sequence number ties a reply to its request. The preamble lets the
//! decoder find the next frame after bytes it cannot use.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::hw_trait::{PinMode, PinState, SpiSettings};
use crate::tracing::prelude::*;

/// Marks the start of every reply frame.
pub const REPLY_PREAMBLE: [u8; 2] = [0xA5, 0x5A];

/// Preamble, sequence number and payload length.
const REPLY_HEADER_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CallId {
    I2cSetClock = 0x0100,
    I2cWrite = 0x0101,
    I2cRead = 0x0102,
    I2cWriteRead = 0x0103,
    SpiConfigure = 0x0200,
    SpiTransfer = 0x0201,
    SpiWrite = 0x0202,
    GpioPinMode = 0x0300,
    GpioDigitalWrite = 0x0301,
    GpioDigitalRead = 0x0302,
    GpioAnalogRead = 0x0303,
    GpioAnalogWrite = 0x0304,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    PinMode { pin: u8, mode: PinMode },
    DigitalWrite { pin: u8, state: PinState },
    DigitalRead { pin: u8 },
    AnalogRead { pin: u8 },
    AnalogWrite { pin: u8, value: u16 },
    I2cSetClock { hz: u32 },
    I2cWrite { address: u8, data: Bytes },
    I2cRead { address: u8, len: u16 },
    I2cWriteRead { address: u8, data: Bytes, len: u16 },
    SpiConfigure(SpiSettings),
    SpiTransfer { data: Bytes },
    SpiWrite { data: Bytes },
}

impl RemoteCall {
    pub fn id(&self) -> CallId {
        match self {
            RemoteCall::PinMode { .. } => CallId::GpioPinMode,
            RemoteCall::DigitalWrite { .. } => CallId::GpioDigitalWrite,
            RemoteCall::DigitalRead { .. } => CallId::GpioDigitalRead,
            RemoteCall::AnalogRead { .. } => CallId::GpioAnalogRead,
            RemoteCall::AnalogWrite { .. } => CallId::GpioAnalogWrite,
            RemoteCall::I2cSetClock { .. } => CallId::I2cSetClock,
            RemoteCall::I2cWrite { .. } => CallId::I2cWrite,
            RemoteCall::I2cRead { .. } => CallId::I2cRead,
            RemoteCall::I2cWriteRead { .. } => CallId::I2cWriteRead,
            RemoteCall::SpiConfigure(_) => CallId::SpiConfigure,
            RemoteCall::SpiTransfer { .. } => CallId::SpiTransfer,
            RemoteCall::SpiWrite { .. } => CallId::SpiWrite,
        }
    }

    /// Size of the reply the controller sends back; 0 for fire-and-forget
    /// calls.
    pub fn reply_len(&self) -> usize {
        match self {
            RemoteCall::DigitalRead { .. } => 1,
            RemoteCall::AnalogRead { .. } => 2,
            RemoteCall::I2cRead { len, .. } | RemoteCall::I2cWriteRead { len, .. } => {
                *len as usize
            }
            RemoteCall::SpiTransfer { data } => data.len(),
            _ => 0,
        }
    }
}

/// A call tagged with its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub seq: u16,
    pub call: RemoteCall,
}

/// The controller's answer to the request with the same `seq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub seq: u16,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallCodec;

impl Encoder<Request> for CallCodec {
    type Error = io::Error;

    fn encode(&mut self, request: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let Request { seq, call } = request;
        dst.put_u16_le(seq);
        dst.put_u16_le(call.id() as u16);

        match call {
            RemoteCall::PinMode { pin, mode } => {
                dst.put_u8(pin);
                dst.put_u8(mode as u8);
            }
            RemoteCall::DigitalWrite { pin, state } => {
                dst.put_u8(pin);
                dst.put_u8(bool::from(state) as u8);
            }
            RemoteCall::DigitalRead { pin } | RemoteCall::AnalogRead { pin } => {
                dst.put_u8(pin);
            }
            RemoteCall::AnalogWrite { pin, value } => {
                dst.put_u8(pin);
                dst.put_u16_le(value);
            }
            RemoteCall::I2cSetClock { hz } => {
                dst.put_u32_le(hz);
            }
            RemoteCall::I2cWrite { address, data } => {
                dst.put_u8(address);
                put_payload(dst, &data)?;
            }
            RemoteCall::I2cRead { address, len } => {
                dst.put_u8(address);
                dst.put_u16_le(len);
            }
            RemoteCall::I2cWriteRead { address, data, len } => {
                dst.put_u8(address);
                put_payload(dst, &data)?;
                dst.put_u16_le(len);
            }
            RemoteCall::SpiConfigure(settings) => {
                dst.put_u32_le(settings.clock_hz);
                dst.put_u8(settings.mode as u8);
                dst.put_u8(settings.bit_order as u8);
            }
            RemoteCall::SpiTransfer { data } | RemoteCall::SpiWrite { data } => {
                put_payload(dst, &data)?;
            }
        }

        Ok(())
    }
}

impl Decoder for CallCodec {
    type Item = Reply;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.windows(2).position(|pair| pair == REPLY_PREAMBLE) {
            Some(0) => {}
            Some(skip) => {
                trace!(skip, "Skipping bytes before reply preamble");
                src.advance(skip);
            }
            None => {
                // A trailing first preamble byte may be completed by the next read.
                let keep = usize::from(src.last() == Some(&REPLY_PREAMBLE[0]));
                src.advance(src.len() - keep);
                return Ok(None);
            }
        }

        if src.len() < REPLY_HEADER_LEN {
            return Ok(None);
        }
        let len = u16::from_le_bytes([src[4], src[5]]) as usize;
        if src.len() < REPLY_HEADER_LEN + len {
            src.reserve(REPLY_HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(REPLY_PREAMBLE.len());
        let seq = src.get_u16_le();
        src.advance(2);
        let payload = src.split_to(len).freeze();
        Ok(Some(Reply { seq, payload }))
    }
}

fn put_payload(dst: &mut BytesMut, data: &[u8]) -> io::Result<()> {
    let len = u16::try_from(data.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes does not fit in one call", data.len()),
        )
    })?;
    dst.put_u16_le(len);
    dst.put_slice(data);
    Ok(())
}

/// Reply frame as the controller sends it.
#[cfg(test)]
pub(crate) fn reply_frame(seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = REPLY_PREAMBLE.to_vec();
    frame.extend_from_slice(&seq.to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_trait::{BitOrder, SpiMode};

    fn encode(call: RemoteCall) -> Vec<u8> {
        let mut dst = BytesMut::new();
        CallCodec.encode(Request { seq: 0, call }, &mut dst).unwrap();
        dst.to_vec()
    }

    #[test]
    fn test_digital_write_frame() {
        let frame = encode(RemoteCall::DigitalWrite {
            pin: 13,
            state: PinState::High,
        });
        assert_eq!(frame, vec![0x00, 0x00, 0x01, 0x03, 13, 1]);
    }

    #[test]
    fn test_sequence_leads_frame() {
        let mut dst = BytesMut::new();
        let call = RemoteCall::DigitalRead { pin: 4 };
        CallCodec.encode(Request { seq: 0x1234, call }, &mut dst).unwrap();
        assert_eq!(&dst[..], &[0x34, 0x12, 0x02, 0x03, 4]);
    }

    #[test]
    fn test_i2c_write_read_frame() {
        let frame = encode(RemoteCall::I2cWriteRead {
            address: 0x24,
            data: Bytes::from_static(&[0xAD]),
            len: 7,
        });
        assert_eq!(
            frame,
            vec![0x00, 0x00, 0x03, 0x01, 0x24, 0x01, 0x00, 0xAD, 0x07, 0x00]
        );
    }

    #[test]
    fn test_spi_configure_frame() {
        let frame = encode(RemoteCall::SpiConfigure(SpiSettings {
            clock_hz: 1_000_000,
            mode: SpiMode::Mode3,
            bit_order: BitOrder::LsbFirst,
        }));
        assert_eq!(frame, vec![0x00, 0x00, 0x00, 0x02, 0x40, 0x42, 0x0F, 0x00, 3, 0]);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut dst = BytesMut::new();
        let data = Bytes::from(vec![0u8; 70_000]);
        let err = CallCodec
            .encode(
                Request {
                    seq: 0,
                    call: RemoteCall::SpiWrite { data },
                },
                &mut dst,
            )
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_reply_lengths() {
        assert_eq!(RemoteCall::DigitalRead { pin: 2 }.reply_len(), 1);
        assert_eq!(RemoteCall::AnalogRead { pin: 2 }.reply_len(), 2);
        assert_eq!(RemoteCall::I2cRead { address: 0x40, len: 6 }.reply_len(), 6);
        assert_eq!(
            RemoteCall::SpiTransfer {
                data: Bytes::from_static(b"abc")
            }
            .reply_len(),
            3
        );
        assert_eq!(RemoteCall::AnalogWrite { pin: 3, value: 128 }.reply_len(), 0);
    }

    #[test]
    fn test_decode_reply() {
        let mut src = BytesMut::from(&reply_frame(7, &[0xFF, 0x03])[..]);
        let reply = CallCodec.decode(&mut src).unwrap().unwrap();
        assert_eq!(reply.seq, 7);
        assert_eq!(&reply.payload[..], &[0xFF, 0x03]);
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_waits_for_whole_frame() {
        let frame = reply_frame(1, b"abc");
        let mut src = BytesMut::from(&frame[..4]);
        assert!(CallCodec.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(&frame[4..]);
        let reply = CallCodec.decode(&mut src).unwrap().unwrap();
        assert_eq!(&reply.payload[..], b"abc");
    }

    #[test]
    fn test_decode_skips_noise_before_preamble() {
        let mut src = BytesMut::from(&b"Arduino-Emulator\r\n"[..]);
        src.extend_from_slice(&reply_frame(3, &[1]));

        let reply = CallCodec.decode(&mut src).unwrap().unwrap();
        assert_eq!(reply.seq, 3);
        assert_eq!(&reply.payload[..], &[1]);
    }

    #[test]
    fn test_decode_keeps_split_preamble() {
        let frame = reply_frame(9, &[0]);
        let mut src = BytesMut::from(&b"noise"[..]);
        src.extend_from_slice(&frame[..1]);
        assert!(CallCodec.decode(&mut src).unwrap().is_none());
        assert_eq!(&src[..], &[0xA5]);

        src.extend_from_slice(&frame[1..]);
        assert_eq!(CallCodec.decode(&mut src).unwrap().unwrap().seq, 9);
    }
}
