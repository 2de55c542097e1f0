use crate::Error;

/// Maximum segment size the datagram is built to fit inside (RFC 879 default).
pub const MSS: usize = 1500;
pub const UDP_HDR: usize = 8;
pub const IP_HDR: usize = 20;
/// Four `u32` header fields: seqno, ackno, flags, data_size.
pub const TCP_HDR: usize = 16;
/// Largest payload a DATA segment may carry after subtracting header overhead from MSS.
pub const PAYLOAD_MAX: usize = MSS - UDP_HDR - IP_HDR - TCP_HDR;

pub const MAX_WINDOW: u32 = 100;
pub const INITIAL_SSTHRESH: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Data,
    Ack,
    Fin,
}

impl Flag {
    fn to_u32(self) -> u32 {
        match self {
            Flag::Data => 0,
            Flag::Ack => 1,
            Flag::Fin => 2,
        }
    }

    fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Flag::Data),
            1 => Some(Flag::Ack),
            2 => Some(Flag::Fin),
            _ => None,
        }
    }
}

/// A single datagram: fixed header followed by up to `PAYLOAD_MAX` bytes of payload.
///
/// Wire format is four little-endian `u32`s (seqno, ackno, flags, data_size) followed
/// by `data_size` payload bytes. Bit-exact framing is shared between the wire and the
/// in-memory retransmission buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seqno: u32,
    pub ackno: u32,
    pub flags: Flag,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn data(seqno: u32, payload: Vec<u8>) -> Self {
        debug_assert!(!payload.is_empty() && payload.len() <= PAYLOAD_MAX);
        Packet {
            seqno,
            ackno: 0,
            flags: Flag::Data,
            payload,
        }
    }

    /// The terminal segment. Its seqno is not meaningful; receivers distinguish FIN
    /// by the flag, never by seqno (see §9 of the design notes).
    pub fn fin() -> Self {
        Packet {
            seqno: 0,
            ackno: 0,
            flags: Flag::Fin,
            payload: Vec::new(),
        }
    }

    pub fn data_size(&self) -> u32 {
        self.payload.len() as u32
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(TCP_HDR + self.payload.len());
        buf.extend_from_slice(&self.seqno.to_le_bytes());
        buf.extend_from_slice(&self.ackno.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_u32().to_le_bytes());
        buf.extend_from_slice(&self.data_size().to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < TCP_HDR {
            return Err(Error::InvalidPacket(format!(
                "datagram of {} bytes shorter than header ({TCP_HDR})",
                buf.len()
            )));
        }

        let seqno = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let ackno = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let flags = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let data_size = u32::from_le_bytes(buf[12..16].try_into().unwrap());

        let flags = Flag::from_u32(flags)
            .ok_or_else(|| Error::InvalidPacket(format!("unknown flag value {flags}")))?;

        let data_size = data_size as usize;
        if data_size > PAYLOAD_MAX || TCP_HDR + data_size != buf.len() {
            return Err(Error::InvalidPacket(format!(
                "data_size {data_size} inconsistent with datagram length {}",
                buf.len()
            )));
        }

        Ok(Packet {
            seqno,
            ackno,
            flags,
            payload: buf[TCP_HDR..TCP_HDR + data_size].to_vec(),
        })
    }
}

/// RFC 1323-style wraparound comparisons on the `u32` seqno/ackno space.
pub fn wrapping_lt(lhs: u32, rhs: u32) -> bool {
    lhs.wrapping_sub(rhs) > (1 << 31)
}

pub fn wrapping_le(lhs: u32, rhs: u32) -> bool {
    lhs == rhs || wrapping_lt(lhs, rhs)
}
