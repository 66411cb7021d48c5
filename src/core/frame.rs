use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::MAX_FRAME_SIZE;
use crate::error::{ProtocolError, Result};

/// Length prefix plus kind byte.
pub const HEADER_SIZE: usize = 5;

/// What a frame's payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Serialized server configuration, server to client
    Config,
    /// One decoded radio record, client to server
    Packet,
    /// A kind this build does not understand
    Unknown(u8),
}

impl FrameKind {
    pub fn as_byte(self) -> u8 {
        match self {
            FrameKind::Config => 0x01,
            FrameKind::Packet => 0x02,
            FrameKind::Unknown(b) => b,
        }
    }

    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => FrameKind::Config,
            0x02 => FrameKind::Packet,
            other => FrameKind::Unknown(other),
        }
    }
}

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Append the encoded frame to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) -> Result<()> {
        let len = u32::try_from(self.payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
            size: self.payload.len(),
            max: u32::MAX as usize,
        })?;
        dst.reserve(HEADER_SIZE + self.payload.len());
        dst.put_u32(len);
        dst.put_u8(self.kind.as_byte());
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Encode into a standalone buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        self.write_to(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode exactly one complete frame using the default size limit.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with_limit(data, MAX_FRAME_SIZE)
    }

    /// Decode exactly one complete frame, rejecting payloads over `max`.
    pub fn from_bytes_with_limit(data: &[u8], max: usize) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::FrameMalformed(format!(
                "truncated header: {} of {HEADER_SIZE} bytes",
                data.len()
            )));
        }

        let mut header = &data[..HEADER_SIZE];
        let len = header.get_u32() as usize;
        let kind = FrameKind::from_byte(header.get_u8());

        if len > max {
            return Err(ProtocolError::FrameTooLarge { size: len, max });
        }

        let body = &data[HEADER_SIZE..];
        if body.len() != len {
            return Err(ProtocolError::FrameMalformed(format!(
                "declared {len} payload bytes, found {}",
                body.len()
            )));
        }

        Ok(Self {
            kind,
            payload: Bytes::copy_from_slice(body),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_kind_bytes() {
        assert_eq!(FrameKind::from_byte(0x01), FrameKind::Config);
        assert_eq!(FrameKind::from_byte(0x02), FrameKind::Packet);
        assert_eq!(FrameKind::from_byte(0x7F), FrameKind::Unknown(0x7F));
        assert_eq!(FrameKind::Unknown(0x7F).as_byte(), 0x7F);
    }

    #[test]
    fn test_header_layout() {
        let bytes = Frame::new(FrameKind::Packet, &b"{}"[..]).to_bytes().unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0, 2, 0x02, b'{', b'}']);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = Frame::new(FrameKind::Config, &b"{}"[..])
            .to_bytes()
            .unwrap()
            .to_vec();
        bytes.push(0);
        assert!(matches!(
            Frame::from_bytes(&bytes),
            Err(ProtocolError::FrameMalformed(_))
        ));
    }
}
