//! Packet Exchange envelope: identifier (u32), client type (u16), body.

use crate::buffer::PacketBuffer;
use crate::idp::{Idp, MAX_IDP_PAYLOAD, PacketType};

pub const PEX_HEADER_LENGTH: usize = 6;
pub const MAX_PEX_BODY: usize = MAX_IDP_PAYLOAD - PEX_HEADER_LENGTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientType {
    Unspecified,
    Time,
    Clearinghouse,
    Teledebug,
    Unknown(u16),
}

impl From<u16> for ClientType {
    fn from(value: u16) -> Self {
        match value {
            0 => ClientType::Unspecified,
            1 => ClientType::Time,
            2 => ClientType::Clearinghouse,
            8 => ClientType::Teledebug,
            other => ClientType::Unknown(other),
        }
    }
}

impl From<ClientType> for u16 {
    fn from(value: ClientType) -> Self {
        match value {
            ClientType::Unspecified => 0,
            ClientType::Time => 1,
            ClientType::Clearinghouse => 2,
            ClientType::Teledebug => 8,
            ClientType::Unknown(other) => other,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Pex {
    idp: Idp,
    body: PacketBuffer,
}

impl Pex {
    pub fn parse(idp: Idp) -> Option<Self> {
        if idp.packet_type() != PacketType::Pex || idp.payload_length() < PEX_HEADER_LENGTH {
            return None;
        }
        let body_length = idp.payload_length() - PEX_HEADER_LENGTH;
        let body = idp.payload().sub_view(PEX_HEADER_LENGTH, body_length);
        Some(Self { idp, body })
    }

    fn wrap(idp: Idp, identifier: u32, client_type: ClientType) -> Self {
        idp.set_packet_type(PacketType::Pex);
        idp.payload().write_u32(0, identifier);
        idp.payload().write_u16(4, client_type.into());
        idp.set_payload_length(PEX_HEADER_LENGTH);
        let body = idp.payload().sub_view(PEX_HEADER_LENGTH, 0);
        Self { idp, body }
    }

    pub fn build(identifier: u32, client_type: ClientType) -> Self {
        Self::wrap(Idp::build(), identifier, client_type)
    }

    /// A response carrying the request's identifier and client type.
    pub fn reply_to(request: &Pex) -> Self {
        Self::wrap(
            Idp::reply_to(&request.idp),
            request.identifier(),
            request.client_type(),
        )
    }

    pub fn identifier(&self) -> u32 {
        self.idp.payload().read_u32(0)
    }

    pub fn client_type(&self) -> ClientType {
        ClientType::from(self.idp.payload().read_u16(4))
    }

    pub fn body(&self) -> &PacketBuffer {
        &self.body
    }

    pub fn set_body_length(&self, length: usize) -> usize {
        let length = self.body.set_length(length);
        self.idp.set_payload_length(PEX_HEADER_LENGTH + length);
        length
    }

    /// Copies `data` into the body and sizes the packet to fit it.
    pub fn set_body(&self, data: &[u8]) -> usize {
        let copied = self.body.copy_bytes_in(0, data, 0, data.len());
        self.set_body_length(copied)
    }

    pub fn idp(&self) -> &Idp {
        &self.idp
    }

    pub fn into_idp(self) -> Idp {
        self.idp
    }
}
