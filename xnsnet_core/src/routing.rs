//! Routing Information Protocol envelope.
//!
//! Body: operation (u16), then `(network u32, hop count u16)` tuples. A hop
//! count of [`INFINITY_HOPS`] marks a network as unreachable.

use crate::idp::{Idp, PacketType};

pub const RIP_REQUEST: u16 = 1;
pub const RIP_RESPONSE: u16 = 2;
pub const INFINITY_HOPS: u16 = 16;
const TUPLE_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteEntry {
    pub network: u32,
    pub hops: u16,
}

#[derive(Clone, Debug)]
pub struct RoutingPacket {
    idp: Idp,
}

impl RoutingPacket {
    pub fn parse(idp: Idp) -> Option<Self> {
        if idp.packet_type() != PacketType::Rip || idp.payload_length() < 2 {
            return None;
        }
        Some(Self { idp })
    }

    /// Wraps `idp` (already addressed) as a routing packet with `entries`.
    pub fn build(idp: Idp, operation: u16, entries: &[RouteEntry]) -> Self {
        idp.set_packet_type(PacketType::Rip);
        let payload = idp.payload();
        payload.write_u16(0, operation);
        let capacity = (payload.max_length() - 2) / TUPLE_LENGTH;
        let count = entries.len().min(capacity);
        for (index, entry) in entries.iter().take(count).enumerate() {
            let at = 2 + index * TUPLE_LENGTH;
            payload.write_u32(at, entry.network);
            payload.write_u16(at + 4, entry.hops);
        }
        idp.set_payload_length(2 + count * TUPLE_LENGTH);
        Self { idp }
    }

    pub fn operation(&self) -> u16 {
        self.idp.payload().read_u16(0)
    }

    pub fn entries(&self) -> Vec<RouteEntry> {
        let payload = self.idp.payload();
        let count = (payload.length() - 2) / TUPLE_LENGTH;
        (0..count)
            .map(|index| {
                let at = 2 + index * TUPLE_LENGTH;
                RouteEntry {
                    network: payload.read_u32(at),
                    hops: payload.read_u16(at + 4),
                }
            })
            .collect()
    }

    pub fn idp(&self) -> &Idp {
        &self.idp
    }

    pub fn into_idp(self) -> Idp {
        self.idp
    }
}
