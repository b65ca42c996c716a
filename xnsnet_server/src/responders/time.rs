//! Time of day service: PEX client type TIME on the TIME socket.

use crate::config::TimeConfig;
use crate::error::ServerError;
use crate::responders::Binding;
use log::{debug, warn};
use std::sync::Arc;
use time::{OffsetDateTime, UtcOffset};
use xnsnet_core::addr::Endpoint;
use xnsnet_core::error_packet::ErrorPacket;
use xnsnet_core::idp::Idp;
use xnsnet_core::pex::{ClientType, Pex};
use xnsnet_core::receiver::{IdpReceiver, IdpSender};
use xnsnet_courier::types::to_wire;
use xnsnet_courier::wire::WireReader;
use xnsnet_courier::{CourierType, courier_enum, courier_record};

pub const TIME_VERSION: u16 = 2;
pub const TIME_REQUEST: u16 = 1;
pub const TIME_RESPONSE: u16 = 2;
/// Seconds from 1901-01-01 to 1970-01-01, both GMT.
pub const EPOCH_OFFSET: i64 = 2_177_452_800;

courier_enum! {
    pub enum OffsetDirection { West = 0, East = 1 }
}

courier_enum! {
    pub enum ToleranceType { Unknown = 0, Known = 1 }
}

courier_record! {
    pub struct TimeRequest {
        pub version: u16,
        pub request_type: u16,
    }
}

courier_record! {
    pub struct TimeReply {
        pub version: u16,
        pub reply_type: u16,
        pub time: u32,
        pub offset_direction: OffsetDirection,
        pub offset_hours: u16,
        pub offset_minutes: u16,
        pub dst_start: u16,
        pub dst_end: u16,
        pub tolerance: ToleranceType,
        pub tolerance_value: u32,
    }
}

pub struct TimeResponder {
    offset: UtcOffset,
    dst_start: u16,
    dst_end: u16,
    binding: Option<Binding>,
}

impl TimeResponder {
    pub fn new(config: &TimeConfig) -> Result<Self, ServerError> {
        let offset = UtcOffset::from_whole_seconds(config.offset_minutes.saturating_mul(60))?;
        Ok(Self {
            offset,
            dst_start: config.dst_start,
            dst_end: config.dst_end,
            binding: None,
        })
    }

    pub fn reply_for(&self, now: OffsetDateTime) -> TimeReply {
        let offset_direction = if self.offset.is_negative() {
            OffsetDirection::West
        } else {
            OffsetDirection::East
        };
        TimeReply {
            version: TIME_VERSION,
            reply_type: TIME_RESPONSE,
            time: (now.unix_timestamp() + EPOCH_OFFSET) as u32,
            offset_direction,
            offset_hours: u16::from(self.offset.whole_hours().unsigned_abs()),
            offset_minutes: u16::from(self.offset.minutes_past_hour().unsigned_abs()),
            dst_start: self.dst_start,
            dst_end: self.dst_end,
            tolerance: ToleranceType::Unknown,
            tolerance_value: 0,
        }
    }

    fn answer(&self, request: &Pex) -> Result<Option<Pex>, ServerError> {
        let mut reader = WireReader::new(request.body().to_bytes());
        let body = TimeRequest::deserialize(&mut reader)?;
        if body.version != TIME_VERSION || body.request_type != TIME_REQUEST {
            debug!(
                "Time request version {} type {} ignored",
                body.version, body.request_type
            );
            return Ok(None);
        }
        let reply = Pex::reply_to(request);
        reply.set_body(&to_wire(&self.reply_for(OffsetDateTime::now_utc()))?);
        Ok(Some(reply))
    }
}

impl IdpReceiver for TimeResponder {
    fn start(&mut self, local: Endpoint, sender: Arc<dyn IdpSender>) {
        self.binding = Some(Binding::new(local, sender));
    }

    fn accept(&mut self, idp: Idp) {
        let Some(binding) = &self.binding else {
            return;
        };
        let source = idp.source();
        let Some(request) = Pex::parse(idp) else {
            debug!("Non-PEX packet from {source} on the time socket");
            return;
        };
        if request.client_type() != ClientType::Time {
            debug!(
                "PEX client type {:?} from {source} on the time socket",
                request.client_type()
            );
            return;
        }
        match self.answer(&request) {
            Ok(Some(reply)) => binding.reply(reply.into_idp()),
            Ok(None) => {}
            Err(e) => warn!("Time request from {source} failed: {e}"),
        }
    }

    fn accept_error(&mut self, error: ErrorPacket) {
        debug!("Time reply rejected: {:?}", error.error_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xnsnet_courier::types::from_wire;

    fn responder(offset_minutes: i32) -> TimeResponder {
        TimeResponder::new(&TimeConfig {
            offset_minutes,
            dst_start: 90,
            dst_end: 300,
        })
        .unwrap()
    }

    #[test]
    fn counts_from_1901() {
        let now = OffsetDateTime::from_unix_timestamp(0).unwrap();
        let reply = responder(0).reply_for(now);
        assert_eq!(reply.time, 2_177_452_800);
        assert_eq!(reply.version, 2);
        assert_eq!(reply.reply_type, 2);
    }

    #[test]
    fn offset_west_of_greenwich() {
        let now = OffsetDateTime::from_unix_timestamp(1_000).unwrap();
        let reply = responder(-330).reply_for(now);
        assert_eq!(reply.offset_direction, OffsetDirection::West);
        assert_eq!(reply.offset_hours, 5);
        assert_eq!(reply.offset_minutes, 30);
        assert_eq!(reply.dst_start, 90);
        assert_eq!(reply.dst_end, 300);

        let reply = responder(60).reply_for(now);
        assert_eq!(reply.offset_direction, OffsetDirection::East);
        assert_eq!(reply.offset_hours, 1);
    }

    #[test]
    fn offset_out_of_range() {
        assert!(
            TimeResponder::new(&TimeConfig {
                offset_minutes: 26 * 60,
                ..TimeConfig::default()
            })
            .is_err()
        );
    }

    #[test]
    fn reply_wire_layout() {
        let now = OffsetDateTime::from_unix_timestamp(0).unwrap();
        let data = to_wire(&responder(-480).reply_for(now)).unwrap();
        assert_eq!(
            data.as_ref(),
            &[
                0, 2, 0, 2, 0x81, 0xC9, 0x4B, 0x00, 0, 0, 0, 8, 0, 0, 0, 90, 1, 44, 0, 0, 0, 0,
                0, 0
            ]
        );
        let decoded: TimeReply = from_wire(&data).unwrap();
        assert_eq!(decoded.offset_hours, 8);
    }

    #[test]
    fn answers_only_time_requests() {
        let responder = responder(0);
        let request = Pex::build(7, ClientType::Time);
        request.set_body(&[0, 2, 0, 1]);
        let reply = responder.answer(&request).unwrap().unwrap();
        assert_eq!(reply.identifier(), 7);
        assert_eq!(reply.client_type(), ClientType::Time);
        assert_eq!(reply.body().length(), 24);

        let wrong_version = Pex::build(8, ClientType::Time);
        wrong_version.set_body(&[0, 1, 0, 1]);
        assert!(responder.answer(&wrong_version).unwrap().is_none());

        let short = Pex::build(9, ClientType::Time);
        short.set_body(&[0, 2]);
        assert!(responder.answer(&short).is_err());
    }
}
