//! Per-connection SPP state machine.
//!
//! The machine is free of I/O: `handle` consumes one inbound packet and
//! returns the packets to transmit in reply. Sending is paced by the caller.
//!
//! At most one data page is in flight. Its wire bytes are retained until the
//! peer acknowledges it; any inbound packet whose acknowledge number is not the
//! next expected value gets those exact bytes again instead of advancing the
//! stream. There is no retransmission timer: a silent peer simply stalls the
//! connection until its next packet arrives or the hub link drops.

use crate::addr::Endpoint;
use crate::idp::Idp;
use crate::spp::{SppPacket, control, sst};
use bytes::Bytes;
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SppState {
    Idle,
    Opening,
    Established,
    Closing,
    Closed,
}

/// One unit of outbound data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SppPage {
    pub sst: u8,
    pub end_of_message: bool,
    pub data: Vec<u8>,
}

impl SppPage {
    pub fn new(sst: u8, data: Vec<u8>) -> Self {
        Self {
            sst,
            end_of_message: false,
            data,
        }
    }

    pub fn with_end_of_message(mut self) -> Self {
        self.end_of_message = true;
        self
    }
}

/// The stream endpoint an [`SppConnection`] talks for.
pub trait SppService: Send {
    /// Data from the peer, in sequence and without duplicates.
    fn accept_data(&mut self, sst: u8, end_of_message: bool, data: &[u8]);

    /// The next page to transmit, if one is ready now.
    fn next_page(&mut self) -> Option<SppPage>;

    /// Whether the service is done and the connection should be closed.
    fn is_exhausted(&self) -> bool {
        false
    }
}

struct InFlight {
    sequence: u16,
    raw: Bytes,
}

pub struct SppConnection<S> {
    state: SppState,
    local: Endpoint,
    remote: Endpoint,
    local_id: u16,
    remote_id: u16,
    send_sequence: u16,
    receive_sequence: u16,
    remote_allocation: u16,
    window: u16,
    last_sst: u8,
    in_flight: Option<InFlight>,
    close_initiated: bool,
    service: S,
}

impl<S> SppConnection<S>
where
    S: SppService,
{
    pub fn new(local: Endpoint, remote: Endpoint, local_id: u16, window: u16, service: S) -> Self {
        Self {
            state: SppState::Idle,
            local,
            remote,
            local_id,
            remote_id: 0,
            send_sequence: 0,
            receive_sequence: 0,
            remote_allocation: 0,
            window: window.max(1),
            last_sst: sst::DATA,
            in_flight: None,
            close_initiated: false,
            service,
        }
    }

    pub fn state(&self) -> SppState {
        self.state
    }

    pub fn local_id(&self) -> u16 {
        self.local_id
    }

    pub fn remote_id(&self) -> u16 {
        self.remote_id
    }

    pub fn remote(&self) -> Endpoint {
        self.remote
    }

    pub fn send_sequence(&self) -> u16 {
        self.send_sequence
    }

    pub fn receive_sequence(&self) -> u16 {
        self.receive_sequence
    }

    pub fn last_sst(&self) -> u8 {
        self.last_sst
    }

    pub fn has_page_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// Active open: asks the peer to acknowledge our connection id.
    pub fn connect(&mut self) -> Option<Idp> {
        if self.state != SppState::Idle {
            return None;
        }
        self.state = SppState::Opening;
        Some(self.system_packet(true))
    }

    /// Starts the close handshake from our side once nothing is in flight.
    pub fn close(&mut self) -> Vec<Idp> {
        if self.state != SppState::Established || self.in_flight.is_some() {
            return Vec::new();
        }
        vec![self.begin_close()]
    }

    pub fn handle(&mut self, packet: &SppPacket) -> Vec<Idp> {
        match self.state {
            SppState::Closed => Vec::new(),
            SppState::Idle => self.handle_open(packet),
            _ => self.handle_connected(packet),
        }
    }

    fn handle_open(&mut self, packet: &SppPacket) -> Vec<Idp> {
        let destination_id = packet.destination_connection_id();
        if !(packet.is_system() && packet.is_send_ack())
            || (destination_id != 0 && destination_id != self.local_id)
        {
            debug!(
                "Ignoring SPP packet from {} before connection establishment",
                self.remote
            );
            return Vec::new();
        }
        self.remote_id = packet.source_connection_id();
        self.receive_sequence = packet.sequence_number();
        self.remote_allocation = packet.allocation_number();
        self.state = SppState::Established;
        info!(
            "SPP connection {:04X} <-> {:04X} established with {}",
            self.local_id, self.remote_id, self.remote
        );

        let mut out = vec![self.system_packet(false)];
        out.extend(self.pump());
        out
    }

    fn handle_connected(&mut self, packet: &SppPacket) -> Vec<Idp> {
        if packet.destination_connection_id() != self.local_id {
            warn!(
                "SPP packet for connection {:04X} arrived at {:04X}",
                packet.destination_connection_id(),
                self.local_id
            );
            return Vec::new();
        }
        if self.state == SppState::Opening {
            if !packet.is_system() {
                return Vec::new();
            }
            self.remote_id = packet.source_connection_id();
            self.receive_sequence = packet.sequence_number();
            self.state = SppState::Established;
            info!(
                "SPP connection {:04X} <-> {:04X} opened to {}",
                self.local_id, self.remote_id, self.remote
            );
        } else if packet.source_connection_id() != self.remote_id {
            warn!(
                "SPP packet from foreign connection {:04X} on {:04X}",
                packet.source_connection_id(),
                self.local_id
            );
            return Vec::new();
        }

        self.remote_allocation = packet.allocation_number();

        if let Some(in_flight) = &self.in_flight {
            if packet.acknowledge_number() == in_flight.sequence.wrapping_add(1) {
                self.in_flight = None;
            } else {
                debug!(
                    "Acknowledge {} does not match; resending page {} to {}",
                    packet.acknowledge_number(),
                    in_flight.sequence,
                    self.remote
                );
                return vec![Idp::from_bytes(&in_flight.raw)];
            }
        }

        let mut acknowledge = packet.is_send_ack();
        if !packet.is_system() {
            if packet.sequence_number() != self.receive_sequence {
                debug!(
                    "Duplicate SPP packet {} (expected {}) from {}",
                    packet.sequence_number(),
                    self.receive_sequence,
                    self.remote
                );
                acknowledge = true;
            } else {
                self.receive_sequence = self.receive_sequence.wrapping_add(1);
                self.last_sst = packet.sst();
                match packet.sst() {
                    sst::CLOSE_REQUEST => {
                        self.state = SppState::Closing;
                        debug!("Close requested by {}", self.remote);
                        return vec![self.send_page(SppPage::new(sst::CLOSE_CONFIRM, Vec::new()))];
                    }
                    sst::CLOSE_CONFIRM => {
                        self.state = SppState::Closed;
                        info!("SPP connection {:04X} closed", self.local_id);
                        if self.close_initiated {
                            return vec![self.final_confirm()];
                        }
                        return Vec::new();
                    }
                    stream_type => {
                        let data = packet.data().to_vec();
                        self.service
                            .accept_data(stream_type, packet.is_end_of_message(), &data);
                    }
                }
            }
        }

        let out = self.pump();
        if out.is_empty() && acknowledge {
            return vec![self.system_packet(false)];
        }
        out
    }

    fn window_open(&self) -> bool {
        self.remote_allocation.wrapping_sub(self.send_sequence) as i16 >= 0
    }

    fn pump(&mut self) -> Vec<Idp> {
        if self.state != SppState::Established || self.in_flight.is_some() || !self.window_open() {
            return Vec::new();
        }
        if let Some(page) = self.service.next_page() {
            return vec![self.send_page(page)];
        }
        if self.service.is_exhausted() {
            return vec![self.begin_close()];
        }
        Vec::new()
    }

    fn begin_close(&mut self) -> Idp {
        self.close_initiated = true;
        self.state = SppState::Closing;
        self.send_page(SppPage::new(sst::CLOSE_REQUEST, Vec::new()))
    }

    fn header(&self, connection_control: u8, stream_type: u8, sequence: u16) -> SppPacket {
        let idp = Idp::build();
        idp.set_source(&self.local);
        idp.set_destination(&self.remote);
        let spp = SppPacket::build(idp);
        spp.set_connection_control(connection_control);
        spp.set_sst(stream_type);
        spp.set_source_connection_id(self.local_id);
        spp.set_destination_connection_id(self.remote_id);
        spp.set_sequence_number(sequence);
        spp.set_acknowledge_number(self.receive_sequence);
        spp.set_allocation_number(
            self.receive_sequence
                .wrapping_add(self.window)
                .wrapping_sub(1),
        );
        spp
    }

    fn system_packet(&self, send_ack: bool) -> Idp {
        let connection_control = if send_ack {
            control::SYSTEM | control::SEND_ACK
        } else {
            control::SYSTEM
        };
        let spp = self.header(connection_control, self.last_sst, self.send_sequence);
        spp.idp().update_checksum();
        spp.into_idp()
    }

    fn send_page(&mut self, page: SppPage) -> Idp {
        let mut connection_control = control::SEND_ACK;
        if page.end_of_message {
            connection_control |= control::END_OF_MESSAGE;
        }
        let sequence = self.send_sequence;
        let spp = self.header(connection_control, page.sst, sequence);
        spp.set_data(&page.data);
        spp.idp().update_checksum();

        self.in_flight = Some(InFlight {
            sequence,
            raw: spp.idp().to_bytes(),
        });
        self.send_sequence = self.send_sequence.wrapping_add(1);
        spp.into_idp()
    }

    fn final_confirm(&mut self) -> Idp {
        let spp = self.header(0, sst::CLOSE_CONFIRM, self.send_sequence);
        self.send_sequence = self.send_sequence.wrapping_add(1);
        spp.idp().update_checksum();
        spp.into_idp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::HostAddr;
    use crate::idp::socket;
    use std::collections::VecDeque;

    const LOCAL_ID: u16 = 0x5001;
    const REMOTE_ID: u16 = 0x7A7A;

    #[derive(Default)]
    struct PageSource {
        pages: VecDeque<SppPage>,
        received: Vec<(u8, Vec<u8>)>,
        finish_when_empty: bool,
    }

    impl SppService for PageSource {
        fn accept_data(&mut self, sst: u8, _end_of_message: bool, data: &[u8]) {
            self.received.push((sst, data.to_vec()));
        }

        fn next_page(&mut self) -> Option<SppPage> {
            self.pages.pop_front()
        }

        fn is_exhausted(&self) -> bool {
            self.finish_when_empty && self.pages.is_empty()
        }
    }

    fn local() -> Endpoint {
        Endpoint::new(0x401, HostAddr(0x0200_0000_0001), socket::BOOT)
    }

    fn remote() -> Endpoint {
        Endpoint::new(0x401, HostAddr(0x0200_0000_0099), 0x0C01)
    }

    fn source(pages: usize, finish_when_empty: bool) -> PageSource {
        PageSource {
            pages: (0..pages)
                .map(|n| SppPage::new(sst::DATA, vec![n as u8; 8]))
                .collect(),
            received: Vec::new(),
            finish_when_empty,
        }
    }

    fn inbound(
        connection_control: u8,
        stream_type: u8,
        destination_id: u16,
        sequence: u16,
        acknowledge: u16,
        data: &[u8],
    ) -> SppPacket {
        let idp = Idp::build();
        idp.set_source(&remote());
        idp.set_destination(&local());
        let spp = SppPacket::build(idp);
        spp.set_connection_control(connection_control);
        spp.set_sst(stream_type);
        spp.set_source_connection_id(REMOTE_ID);
        spp.set_destination_connection_id(destination_id);
        spp.set_sequence_number(sequence);
        spp.set_acknowledge_number(acknowledge);
        spp.set_allocation_number(acknowledge.wrapping_add(4));
        spp.set_data(data);
        SppPacket::parse(Idp::from_bytes(&spp.idp().to_bytes())).unwrap()
    }

    fn open(pages: usize, finish_when_empty: bool) -> SppConnection<PageSource> {
        let mut connection =
            SppConnection::new(local(), remote(), LOCAL_ID, 4, source(pages, finish_when_empty));
        let out = connection.handle(&inbound(
            control::SYSTEM | control::SEND_ACK,
            sst::DATA,
            0,
            0,
            0,
            &[],
        ));
        assert_eq!(connection.state(), SppState::Established);
        assert!(!out.is_empty());
        connection
    }

    fn parse(idp: &Idp) -> SppPacket {
        SppPacket::parse(Idp::from_bytes(&idp.to_bytes())).unwrap()
    }

    #[test]
    fn system_packet_establishes_and_is_acknowledged() {
        let mut connection = SppConnection::new(local(), remote(), LOCAL_ID, 4, source(0, false));
        let out = connection.handle(&inbound(
            control::SYSTEM | control::SEND_ACK,
            sst::DATA,
            0,
            0,
            0,
            &[],
        ));
        assert_eq!(connection.state(), SppState::Established);
        assert_eq!(out.len(), 1);
        let reply = parse(&out[0]);
        assert!(reply.is_system());
        assert_eq!(reply.source_connection_id(), LOCAL_ID);
        assert_eq!(reply.destination_connection_id(), REMOTE_ID);
        assert_eq!(reply.acknowledge_number(), 0);
        assert_eq!(reply.allocation_number(), 3);
        assert_eq!(out[0].destination(), remote());
        assert!(out[0].verify_checksum());
    }

    #[test]
    fn non_system_packet_does_not_open() {
        let mut connection = SppConnection::new(local(), remote(), LOCAL_ID, 4, source(1, false));
        let out = connection.handle(&inbound(0, sst::DATA, 0, 0, 0, b"xx"));
        assert!(out.is_empty());
        assert_eq!(connection.state(), SppState::Idle);
    }

    #[test]
    fn data_pulls_one_page_at_a_time() {
        let mut connection = open(0, false);
        connection.service_mut().pages.extend([
            SppPage::new(sst::DATA, b"page-0".to_vec()),
            SppPage::new(sst::DATA, b"page-1".to_vec()).with_end_of_message(),
        ]);

        let out = connection.handle(&inbound(control::SEND_ACK, sst::DATA, LOCAL_ID, 0, 0, b"go"));
        assert_eq!(connection.service().received, vec![(sst::DATA, b"go".to_vec())]);
        assert_eq!(out.len(), 1);
        let page = parse(&out[0]);
        assert_eq!(page.sequence_number(), 0);
        assert_eq!(page.acknowledge_number(), 1);
        assert_eq!(page.data().to_vec(), b"page-0".to_vec());
        assert!(connection.has_page_in_flight());

        let out = connection.handle(&inbound(control::SYSTEM, sst::DATA, LOCAL_ID, 1, 1, &[]));
        let page = parse(&out[0]);
        assert_eq!(page.sequence_number(), 1);
        assert!(page.is_end_of_message());
        assert_eq!(page.data().to_vec(), b"page-1".to_vec());
    }

    #[test]
    fn mismatched_ack_resends_identical_bytes() {
        let mut connection = open(3, false);
        let first = connection.handle(&inbound(control::SEND_ACK, sst::DATA, LOCAL_ID, 0, 0, b"go"));
        let sent = first[0].to_bytes();

        let again = connection.handle(&inbound(control::SYSTEM | control::SEND_ACK, sst::DATA, LOCAL_ID, 1, 0, &[]));
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].to_bytes(), sent);
        assert_eq!(connection.send_sequence(), 1);

        let next = connection.handle(&inbound(control::SYSTEM, sst::DATA, LOCAL_ID, 1, 1, &[]));
        assert_ne!(next[0].to_bytes(), sent);
        assert_eq!(parse(&next[0]).sequence_number(), 1);
    }

    #[test]
    fn duplicate_data_is_acknowledged_not_delivered() {
        let mut connection = open(0, false);
        connection.handle(&inbound(0, sst::DATA, LOCAL_ID, 0, 0, b"one"));
        let out = connection.handle(&inbound(0, sst::DATA, LOCAL_ID, 0, 0, b"one"));
        assert_eq!(connection.service().received.len(), 1);
        assert_eq!(out.len(), 1);
        let ack = parse(&out[0]);
        assert!(ack.is_system());
        assert_eq!(ack.acknowledge_number(), 1);
    }

    #[test]
    fn close_request_is_confirmed() {
        let mut connection = open(0, false);
        let out = connection.handle(&inbound(0, sst::CLOSE_REQUEST, LOCAL_ID, 0, 0, &[]));
        assert_eq!(connection.state(), SppState::Closing);
        let confirm = parse(&out[0]);
        assert_eq!(confirm.sst(), sst::CLOSE_CONFIRM);

        let out = connection.handle(&inbound(0, sst::CLOSE_CONFIRM, LOCAL_ID, 1, 1, &[]));
        assert!(out.is_empty());
        assert_eq!(connection.state(), SppState::Closed);
        assert!(connection.handle(&inbound(0, sst::DATA, LOCAL_ID, 2, 1, &[])).is_empty());
    }

    #[test]
    fn exhausted_service_initiates_close() {
        let mut connection = open(1, true);
        let out = connection.handle(&inbound(control::SEND_ACK, sst::DATA, LOCAL_ID, 0, 0, b"go"));
        assert_eq!(parse(&out[0]).sst(), sst::DATA);

        let out = connection.handle(&inbound(control::SYSTEM, sst::DATA, LOCAL_ID, 1, 1, &[]));
        assert_eq!(connection.state(), SppState::Closing);
        assert_eq!(parse(&out[0]).sst(), sst::CLOSE_REQUEST);

        let out = connection.handle(&inbound(0, sst::CLOSE_CONFIRM, LOCAL_ID, 1, 2, &[]));
        assert_eq!(connection.state(), SppState::Closed);
        assert_eq!(parse(&out[0]).sst(), sst::CLOSE_CONFIRM);
    }

    #[test]
    fn active_close_handshake() {
        let mut connection = open(0, false);
        connection
            .service_mut()
            .pages
            .push_back(SppPage::new(sst::DATA, b"last".to_vec()));
        connection.handle(&inbound(control::SEND_ACK, sst::DATA, LOCAL_ID, 0, 0, b"go"));
        assert!(connection.has_page_in_flight());
        assert!(connection.close().is_empty());

        connection.handle(&inbound(control::SYSTEM, sst::DATA, LOCAL_ID, 1, 1, &[]));
        let out = connection.close();
        assert_eq!(connection.state(), SppState::Closing);
        assert_eq!(out.len(), 1);
        let request = parse(&out[0]);
        assert_eq!(request.sst(), sst::CLOSE_REQUEST);
        assert!(request.is_send_ack());
        assert_eq!(request.sequence_number(), 1);

        let out = connection.handle(&inbound(0, sst::CLOSE_CONFIRM, LOCAL_ID, 1, 2, &[]));
        assert_eq!(connection.state(), SppState::Closed);
        assert_eq!(out.len(), 1);
        let confirm = parse(&out[0]);
        assert_eq!(confirm.sst(), sst::CLOSE_CONFIRM);
        assert!(!confirm.is_send_ack());
        assert_eq!(confirm.sequence_number(), 2);
        assert!(connection.close().is_empty());
    }

    #[test]
    fn closed_window_holds_pages_back() {
        let mut connection = open(2, false);
        let packet = inbound(control::SEND_ACK, sst::DATA, LOCAL_ID, 0, 0, b"go");
        packet.set_allocation_number(0xFFFF);
        let out = connection.handle(&packet);
        assert_eq!(out.len(), 1);
        assert!(parse(&out[0]).is_system());
        assert!(!connection.has_page_in_flight());
    }

    #[test]
    fn active_open() {
        let mut connection = SppConnection::new(local(), remote(), LOCAL_ID, 4, source(0, false));
        let request = connection.connect().unwrap();
        let request = parse(&request);
        assert!(request.is_system() && request.is_send_ack());
        assert_eq!(request.destination_connection_id(), 0);
        assert_eq!(connection.state(), SppState::Opening);

        connection.handle(&inbound(control::SYSTEM, sst::DATA, LOCAL_ID, 0, 0, &[]));
        assert_eq!(connection.state(), SppState::Established);
        assert_eq!(connection.remote_id(), REMOTE_ID);
    }

    #[test]
    fn foreign_connection_ids_are_ignored() {
        let mut connection = open(1, false);
        assert!(connection.handle(&inbound(control::SEND_ACK, sst::DATA, 0x1111, 0, 0, b"go")).is_empty());
        assert_eq!(connection.receive_sequence(), 0);
    }
}
