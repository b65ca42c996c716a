//! Sequenced Packet Protocol.
//!
//! Header layout inside the IDP payload:
//!
//! ```text
//! 0 connection control   1 datastream type (SST)
//! 2 source connection id 4 destination connection id
//! 6 sequence number      8 acknowledge number   10 allocation number
//! 12 data...
//! ```

pub mod connection;

use crate::buffer::PacketBuffer;
use crate::idp::{Idp, MAX_IDP_PAYLOAD, PacketType};

pub const SPP_HEADER_LENGTH: usize = 12;
pub const MAX_SPP_DATA: usize = MAX_IDP_PAYLOAD - SPP_HEADER_LENGTH;

/// Connection control bits (byte 0).
pub mod control {
    pub const SYSTEM: u8 = 0x80;
    pub const SEND_ACK: u8 = 0x40;
    pub const ATTENTION: u8 = 0x20;
    pub const END_OF_MESSAGE: u8 = 0x10;
}

/// Datastream types with a protocol meaning.
pub mod sst {
    pub const DATA: u8 = 0;
    pub const BULK: u8 = 1;
    pub const CLOSE_REQUEST: u8 = 0xFE;
    pub const CLOSE_CONFIRM: u8 = 0xFF;
}

#[derive(Clone, Debug)]
pub struct SppPacket {
    idp: Idp,
    data: PacketBuffer,
}

impl SppPacket {
    pub fn parse(idp: Idp) -> Option<Self> {
        if idp.packet_type() != PacketType::Spp || idp.payload_length() < SPP_HEADER_LENGTH {
            return None;
        }
        let data = idp
            .payload()
            .sub_view(SPP_HEADER_LENGTH, idp.payload_length() - SPP_HEADER_LENGTH);
        Some(Self { idp, data })
    }

    /// Wraps an addressed `idp` as an SPP packet with an empty data part.
    pub fn build(idp: Idp) -> Self {
        idp.set_packet_type(PacketType::Spp);
        idp.set_payload_length(SPP_HEADER_LENGTH);
        let data = idp.payload().sub_view(SPP_HEADER_LENGTH, 0);
        Self { idp, data }
    }

    pub fn connection_control(&self) -> u8 {
        self.idp.payload().read_u8(0)
    }

    pub fn set_connection_control(&self, value: u8) {
        self.idp.payload().write_u8(0, value);
    }

    pub fn is_system(&self) -> bool {
        self.connection_control() & control::SYSTEM != 0
    }

    pub fn is_send_ack(&self) -> bool {
        self.connection_control() & control::SEND_ACK != 0
    }

    pub fn is_attention(&self) -> bool {
        self.connection_control() & control::ATTENTION != 0
    }

    pub fn is_end_of_message(&self) -> bool {
        self.connection_control() & control::END_OF_MESSAGE != 0
    }

    pub fn sst(&self) -> u8 {
        self.idp.payload().read_u8(1)
    }

    pub fn set_sst(&self, value: u8) {
        self.idp.payload().write_u8(1, value);
    }

    pub fn source_connection_id(&self) -> u16 {
        self.idp.payload().read_u16(2)
    }

    pub fn set_source_connection_id(&self, value: u16) {
        self.idp.payload().write_u16(2, value);
    }

    pub fn destination_connection_id(&self) -> u16 {
        self.idp.payload().read_u16(4)
    }

    pub fn set_destination_connection_id(&self, value: u16) {
        self.idp.payload().write_u16(4, value);
    }

    pub fn sequence_number(&self) -> u16 {
        self.idp.payload().read_u16(6)
    }

    pub fn set_sequence_number(&self, value: u16) {
        self.idp.payload().write_u16(6, value);
    }

    pub fn acknowledge_number(&self) -> u16 {
        self.idp.payload().read_u16(8)
    }

    pub fn set_acknowledge_number(&self, value: u16) {
        self.idp.payload().write_u16(8, value);
    }

    pub fn allocation_number(&self) -> u16 {
        self.idp.payload().read_u16(10)
    }

    pub fn set_allocation_number(&self, value: u16) {
        self.idp.payload().write_u16(10, value);
    }

    pub fn data(&self) -> &PacketBuffer {
        &self.data
    }

    pub fn set_data_length(&self, length: usize) -> usize {
        let length = self.data.set_length(length);
        self.idp.set_payload_length(SPP_HEADER_LENGTH + length);
        length
    }

    pub fn set_data(&self, data: &[u8]) -> usize {
        let copied = self.data.copy_bytes_in(0, data, 0, data.len());
        self.set_data_length(copied)
    }

    pub fn idp(&self) -> &Idp {
        &self.idp
    }

    pub fn into_idp(self) -> Idp {
        self.idp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields() {
        let spp = SppPacket::build(Idp::build());
        spp.set_connection_control(control::SYSTEM | control::SEND_ACK);
        spp.set_sst(sst::CLOSE_REQUEST);
        spp.set_source_connection_id(0x1234);
        spp.set_destination_connection_id(0x5678);
        spp.set_sequence_number(3);
        spp.set_acknowledge_number(4);
        spp.set_allocation_number(9);
        spp.set_data(b"abcd");

        let parsed = SppPacket::parse(Idp::from_bytes(&spp.idp().to_bytes())).unwrap();
        assert!(parsed.is_system());
        assert!(parsed.is_send_ack());
        assert!(!parsed.is_end_of_message());
        assert_eq!(parsed.sst(), sst::CLOSE_REQUEST);
        assert_eq!(parsed.source_connection_id(), 0x1234);
        assert_eq!(parsed.destination_connection_id(), 0x5678);
        assert_eq!(parsed.sequence_number(), 3);
        assert_eq!(parsed.acknowledge_number(), 4);
        assert_eq!(parsed.allocation_number(), 9);
        assert_eq!(parsed.data().to_vec(), b"abcd".to_vec());
    }
}
