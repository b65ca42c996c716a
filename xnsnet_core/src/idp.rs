//! Internet Datagram Protocol header codec.
//!
//! Wire layout (big-endian):
//!
//! ```text
//!  0 checksum        2 length          4 transport control   5 packet type
//!  6 dst network    10 dst host       16 dst socket
//! 18 src network    22 src host       28 src socket         30 payload...
//! ```
//!
//! `Idp` is a typed view over a [`PacketBuffer`]; the payload is a sub-view
//! starting at byte 30, so envelopes built on top of it write straight into
//! the packet.

use crate::addr::{Endpoint, HostAddr};
use crate::buffer::{MAX_PACKET_SIZE, PacketBuffer};
use bytes::Bytes;
use std::fmt::{Display, Formatter};

pub const IDP_HEADER_LENGTH: usize = 30;
pub const MAX_IDP_PAYLOAD: usize = MAX_PACKET_SIZE - IDP_HEADER_LENGTH;
pub const NO_CHECKSUM: u16 = 0xFFFF;

const CHECKSUM: usize = 0;
const LENGTH: usize = 2;
const TRANSPORT_CONTROL: usize = 4;
const PACKET_TYPE: usize = 5;
const DESTINATION: usize = 6;
const SOURCE: usize = 18;

/// Well-known socket numbers.
pub mod socket {
    pub const ROUTING: u16 = 1;
    pub const ECHO: u16 = 2;
    pub const ERROR: u16 = 3;
    pub const ENVOY: u16 = 4;
    pub const COURIER: u16 = 5;
    pub const CLEARINGHOUSE_OLD: u16 = 7;
    pub const TIME: u16 = 8;
    pub const BOOT: u16 = 10;
    pub const DIAG: u16 = 19;
    pub const CLEARINGHOUSE: u16 = 20;
    pub const AUTH: u16 = 21;
    pub const MAIL: u16 = 22;
    pub const NET_EXEC: u16 = 23;
    pub const WS_INFO: u16 = 24;
    pub const BINDING: u16 = 28;
    pub const GERM: u16 = 35;
    pub const TELE_DEBUG: u16 = 48;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Rip,
    Echo,
    Error,
    Pex,
    Spp,
    BootServerPacket,
    Pup,
    PupHostLookup,
    Unknown(u8),
}

impl From<u8> for PacketType {
    fn from(value: u8) -> Self {
        match value {
            1 => PacketType::Rip,
            2 => PacketType::Echo,
            3 => PacketType::Error,
            4 => PacketType::Pex,
            5 => PacketType::Spp,
            9 => PacketType::BootServerPacket,
            12 => PacketType::Pup,
            128 => PacketType::PupHostLookup,
            other => PacketType::Unknown(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        match value {
            PacketType::Rip => 1,
            PacketType::Echo => 2,
            PacketType::Error => 3,
            PacketType::Pex => 4,
            PacketType::Spp => 5,
            PacketType::BootServerPacket => 9,
            PacketType::Pup => 12,
            PacketType::PupHostLookup => 128,
            PacketType::Unknown(other) => other,
        }
    }
}

/// Folds 16-bit words into the XNS checksum: each word is added with
/// end-around carry, then the sum is rotated left by one bit. A final value
/// of `0xFFFF` would read as "no checksum" and is stored as zero instead.
pub fn checksum_words<I>(words: I) -> u16
where
    I: IntoIterator<Item = u16>,
{
    let mut sum: u32 = 0;
    for word in words {
        sum += u32::from(word);
        if sum > 0xFFFF {
            sum = (sum & 0xFFFF) + 1;
        }
        sum <<= 1;
        if sum > 0xFFFF {
            sum = (sum & 0xFFFF) | 1;
        }
    }
    if sum == 0xFFFF { 0 } else { sum as u16 }
}

#[derive(Clone, Debug)]
pub struct Idp {
    packet: PacketBuffer,
    payload: PacketBuffer,
}

impl Idp {
    /// Interprets the first 30 bytes of `packet` as an IDP header. The payload
    /// view covers `length - 30` bytes, clamped to what the buffer can hold.
    pub fn parse(packet: PacketBuffer) -> Self {
        let length = usize::from(packet.read_u16(LENGTH));
        let payload = packet.sub_view(
            IDP_HEADER_LENGTH,
            length.saturating_sub(IDP_HEADER_LENGTH),
        );
        Self { packet, payload }
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        Self::parse(PacketBuffer::from_bytes(data))
    }

    /// A fresh packet: no checksum, zero length, zeroed addressing.
    pub fn build() -> Self {
        let packet = PacketBuffer::new(MAX_PACKET_SIZE);
        packet.set_length(IDP_HEADER_LENGTH);
        packet.write_u16(CHECKSUM, NO_CHECKSUM);
        let payload = packet.sub_view(IDP_HEADER_LENGTH, 0);
        Self { packet, payload }
    }

    /// A fresh packet addressed back to the sender of `other`.
    pub fn reply_to(other: &Idp) -> Self {
        let reply = Self::build();
        reply.as_reply_to(other);
        reply
    }

    pub fn packet(&self) -> &PacketBuffer {
        &self.packet
    }

    pub fn payload(&self) -> &PacketBuffer {
        &self.payload
    }

    pub fn checksum(&self) -> u16 {
        self.packet.read_u16(CHECKSUM)
    }

    pub fn length(&self) -> u16 {
        self.packet.read_u16(LENGTH)
    }

    pub fn transport_control(&self) -> u8 {
        self.packet.read_u8(TRANSPORT_CONTROL)
    }

    pub fn set_transport_control(&self, value: u8) {
        self.packet.write_u8(TRANSPORT_CONTROL, value);
    }

    pub fn packet_type(&self) -> PacketType {
        PacketType::from(self.packet.read_u8(PACKET_TYPE))
    }

    pub fn set_packet_type(&self, packet_type: PacketType) {
        self.packet.write_u8(PACKET_TYPE, packet_type.into());
    }

    fn read_endpoint(&self, at: usize) -> Endpoint {
        Endpoint {
            network: self.packet.read_u32(at),
            host: HostAddr(self.packet.read_u48(at + 4)),
            socket: self.packet.read_u16(at + 10),
        }
    }

    fn write_endpoint(&self, at: usize, endpoint: &Endpoint) {
        self.packet.write_u32(at, endpoint.network);
        self.packet.write_u48(at + 4, endpoint.host.0);
        self.packet.write_u16(at + 10, endpoint.socket);
    }

    pub fn destination(&self) -> Endpoint {
        self.read_endpoint(DESTINATION)
    }

    pub fn set_destination(&self, endpoint: &Endpoint) {
        self.write_endpoint(DESTINATION, endpoint);
    }

    pub fn source(&self) -> Endpoint {
        self.read_endpoint(SOURCE)
    }

    pub fn set_source(&self, endpoint: &Endpoint) {
        self.write_endpoint(SOURCE, endpoint);
    }

    /// Addresses this packet back to whoever sent `other`.
    pub fn as_reply_to(&self, other: &Idp) {
        self.set_destination(&other.source());
        self.set_source(&other.destination());
    }

    pub fn payload_length(&self) -> usize {
        self.payload.length()
    }

    /// Sets the payload length and the header `length` field together. The
    /// header length is rounded up to an even byte count and the pad byte is
    /// zeroed. Returns the payload length actually set.
    pub fn set_payload_length(&self, length: usize) -> usize {
        let length = self.payload.set_length(length);
        let total = IDP_HEADER_LENGTH + length;
        let padded = (total + 1) & !1;
        if padded != total {
            self.payload.write_u8(length, 0);
            self.packet.set_length(padded);
        }
        self.packet.write_u16(LENGTH, padded as u16);
        length
    }

    pub fn set_packet_length(&self, length: usize) -> usize {
        IDP_HEADER_LENGTH + self.set_payload_length(length.saturating_sub(IDP_HEADER_LENGTH))
    }

    pub fn compute_checksum(&self) -> u16 {
        let words = (usize::from(self.length()) + 1) / 2;
        checksum_words((1..words).map(|word| self.packet.read_u16(word * 2)))
    }

    pub fn update_checksum(&self) {
        self.packet.write_u16(CHECKSUM, self.compute_checksum());
    }

    pub fn reset_checksum(&self) {
        self.packet.write_u16(CHECKSUM, NO_CHECKSUM);
    }

    pub fn verify_checksum(&self) -> bool {
        let stored = self.checksum();
        stored == NO_CHECKSUM || stored == self.compute_checksum()
    }

    /// Wire bytes of the whole packet, header included.
    pub fn to_bytes(&self) -> Bytes {
        self.packet.to_bytes()
    }
}

impl Display for Idp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IDP {:?} {} -> {} ({} bytes)",
            self.packet_type(),
            self.source(),
            self.destination(),
            self.length()
        )
    }
}
