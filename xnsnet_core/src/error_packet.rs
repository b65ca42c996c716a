//! Error protocol envelope.
//!
//! Body layout: error code (u16), error parameter (u16), then the first 42
//! bytes of the offending packet (its IDP header and 12 payload bytes).

use crate::idp::{IDP_HEADER_LENGTH, Idp, PacketType};

pub const ERROR_HEADER_LENGTH: usize = 4;
pub const OFFENDING_PACKET_BYTES: usize = IDP_HEADER_LENGTH + 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unspecified,
    BadChecksum,
    NoSocket,
    ResourceLimit,
    ListenReject,
    InvalidPacketType,
    ProtocolViolation,
    UnspecifiedInRoute,
    Inconsistent,
    CantGetThere,
    ExcessHops,
    TooBig,
    CongestionWarning,
    CongestionDiscard,
    Unknown(u16),
}

impl From<u16> for ErrorCode {
    fn from(value: u16) -> Self {
        match value {
            0 => ErrorCode::Unspecified,
            1 => ErrorCode::BadChecksum,
            2 => ErrorCode::NoSocket,
            3 => ErrorCode::ResourceLimit,
            4 => ErrorCode::ListenReject,
            5 => ErrorCode::InvalidPacketType,
            6 => ErrorCode::ProtocolViolation,
            0o1000 => ErrorCode::UnspecifiedInRoute,
            0o1001 => ErrorCode::Inconsistent,
            0o1002 => ErrorCode::CantGetThere,
            0o1003 => ErrorCode::ExcessHops,
            0o1004 => ErrorCode::TooBig,
            0o1005 => ErrorCode::CongestionWarning,
            0o1006 => ErrorCode::CongestionDiscard,
            other => ErrorCode::Unknown(other),
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(value: ErrorCode) -> Self {
        match value {
            ErrorCode::Unspecified => 0,
            ErrorCode::BadChecksum => 1,
            ErrorCode::NoSocket => 2,
            ErrorCode::ResourceLimit => 3,
            ErrorCode::ListenReject => 4,
            ErrorCode::InvalidPacketType => 5,
            ErrorCode::ProtocolViolation => 6,
            ErrorCode::UnspecifiedInRoute => 0o1000,
            ErrorCode::Inconsistent => 0o1001,
            ErrorCode::CantGetThere => 0o1002,
            ErrorCode::ExcessHops => 0o1003,
            ErrorCode::TooBig => 0o1004,
            ErrorCode::CongestionWarning => 0o1005,
            ErrorCode::CongestionDiscard => 0o1006,
            ErrorCode::Unknown(other) => other,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ErrorPacket {
    idp: Idp,
}

impl ErrorPacket {
    pub fn parse(idp: Idp) -> Option<Self> {
        if idp.packet_type() != PacketType::Error || idp.payload_length() < ERROR_HEADER_LENGTH {
            return None;
        }
        Some(Self { idp })
    }

    /// Builds an error report addressed to the sender of `offending`.
    pub fn reply_to(offending: &Idp, code: ErrorCode, parameter: u16) -> Self {
        let idp = Idp::reply_to(offending);
        idp.set_packet_type(PacketType::Error);
        let payload = idp.payload();
        payload.write_u16(0, code.into());
        payload.write_u16(2, parameter);

        let original = offending.to_bytes();
        let copied = payload.copy_bytes_in(
            ERROR_HEADER_LENGTH,
            &original,
            0,
            OFFENDING_PACKET_BYTES,
        );
        idp.set_payload_length(ERROR_HEADER_LENGTH + copied);
        Self { idp }
    }

    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from(self.idp.payload().read_u16(0))
    }

    pub fn parameter(&self) -> u16 {
        self.idp.payload().read_u16(2)
    }

    /// The offending packet's header as echoed back by the reporter.
    pub fn offending_packet(&self) -> Idp {
        let payload = self.idp.payload();
        let length = payload.length().saturating_sub(ERROR_HEADER_LENGTH);
        let mut raw = vec![0u8; length];
        payload.copy_bytes_out(ERROR_HEADER_LENGTH, &mut raw, 0, length);
        Idp::from_bytes(&raw)
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
    use crate::addr::{Endpoint, HostAddr};
    use crate::idp::socket;

    #[test]
    fn error_reply_echoes_offending_header() {
        let offending = Idp::build();
        offending.set_packet_type(PacketType::Pex);
        offending.set_source(&Endpoint::new(7, HostAddr(0x1111), 0x4000));
        offending.set_destination(&Endpoint::new(7, HostAddr(0x2222), 0x0999));
        offending.set_payload_length(20);

        let error = ErrorPacket::reply_to(&offending, ErrorCode::NoSocket, 0);
        assert_eq!(error.idp().packet_type(), PacketType::Error);
        assert_eq!(error.idp().destination().socket, 0x4000);
        assert_eq!(error.idp().payload_length(), ERROR_HEADER_LENGTH + OFFENDING_PACKET_BYTES);

        let parsed = ErrorPacket::parse(Idp::from_bytes(&error.idp().to_bytes())).unwrap();
        assert_eq!(parsed.error_code(), ErrorCode::NoSocket);
        let original = parsed.offending_packet();
        assert_eq!(original.source().socket, 0x4000);
        assert_eq!(original.destination().socket, 0x0999);
    }

    #[test]
    fn short_offending_packet_is_copied_whole() {
        let offending = Idp::build();
        offending.set_destination(&Endpoint::new(0, HostAddr(1), socket::ECHO));
        offending.set_payload_length(0);
        let error = ErrorPacket::reply_to(&offending, ErrorCode::BadChecksum, 9);
        assert_eq!(error.idp().payload_length(), ERROR_HEADER_LENGTH + IDP_HEADER_LENGTH);
        assert_eq!(error.parameter(), 9);
        assert_eq!(ErrorCode::from(0o1004u16), ErrorCode::TooBig);
    }
}
