//! Echo protocol envelope: operation (u16) followed by opaque data.

use crate::idp::{Idp, PacketType};

pub const ECHO_REQUEST: u16 = 1;
pub const ECHO_REPLY: u16 = 2;

#[derive(Clone, Debug)]
pub struct Echo {
    idp: Idp,
}

impl Echo {
    pub fn parse(idp: Idp) -> Option<Self> {
        if idp.packet_type() != PacketType::Echo || idp.payload_length() < 2 {
            return None;
        }
        Some(Self { idp })
    }

    pub fn operation(&self) -> u16 {
        self.idp.payload().read_u16(0)
    }

    pub fn data(&self) -> Vec<u8> {
        self.idp.payload().sub_view(2, self.idp.payload_length() - 2).to_vec()
    }

    /// The reply carries the request's data verbatim.
    pub fn reply_to(request: &Echo) -> Self {
        let idp = Idp::reply_to(&request.idp);
        idp.set_packet_type(PacketType::Echo);
        idp.payload().write_u16(0, ECHO_REPLY);
        let data = request.data();
        let copied = idp.payload().copy_bytes_in(2, &data, 0, data.len());
        idp.set_payload_length(2 + copied);
        Self { idp }
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
    fn reply_echoes_data() {
        let request = Idp::build();
        request.set_packet_type(PacketType::Echo);
        request.payload().write_u16(0, ECHO_REQUEST);
        request.payload().copy_bytes_in(2, b"hello", 0, 5);
        request.set_payload_length(7);

        let request = Echo::parse(request).unwrap();
        let reply = Echo::reply_to(&request);
        assert_eq!(reply.operation(), ECHO_REPLY);
        assert_eq!(reply.data(), b"hello".to_vec());
        assert_eq!(reply.idp().length(), 38);
    }
}
