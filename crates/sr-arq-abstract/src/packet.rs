use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// One discriminant byte followed by a big-endian `u32` sequence number.
pub const HEADER_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PacketKind {
    Data = 0,
    Ack = 1,
}

impl TryFrom<u8> for PacketKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PacketKind::Data),
            1 => Ok(PacketKind::Ack),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub seq: u32,
    /// Opaque bytes after the header. Empty for everything the engine emits.
    pub payload: Bytes,
}

impl Packet {
    pub fn data(seq: u32) -> Self {
        Self {
            kind: PacketKind::Data,
            seq,
            payload: Bytes::new(),
        }
    }

    pub fn ack(seq: u32) -> Self {
        Self {
            kind: PacketKind::Ack,
            seq,
            payload: Bytes::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn is_data(&self) -> bool {
        self.kind == PacketKind::Data
    }

    pub fn is_ack(&self) -> bool {
        self.kind == PacketKind::Ack
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u8(self.kind as u8);
        buf.put_u32(self.seq);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub fn decode(mut datagram: &[u8]) -> Result<Self, WireError> {
        if datagram.len() < HEADER_LEN {
            return Err(WireError::Truncated {
                len: datagram.len(),
            });
        }
        let kind = PacketKind::try_from(datagram.get_u8())?;
        let seq = datagram.get_u32();
        Ok(Self {
            kind,
            seq,
            payload: Bytes::copy_from_slice(datagram),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_big_endian() {
        let bytes = Packet::ack(0x0102_0304).encode();
        assert_eq!(&bytes[..], &[1, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn decode_keeps_trailing_payload() {
        let wire = Packet::data(7).with_payload(&b"hi"[..]).encode();
        let packet = Packet::decode(&wire).unwrap();
        assert!(packet.is_data());
        assert_eq!(packet.seq, 7);
        assert_eq!(&packet.payload[..], b"hi");
    }

    #[test]
    fn rejects_short_and_unknown() {
        assert_eq!(
            Packet::decode(&[0, 0, 0]),
            Err(WireError::Truncated { len: 3 })
        );
        assert_eq!(
            Packet::decode(&[9, 0, 0, 0, 1]),
            Err(WireError::UnknownKind(9))
        );
    }
}
