//! IDP demultiplexing: one receiver per local socket.
//!
//! Inbound packets are checked in this order: checksum, destination host and
//! network, Error packets routed back to the socket that caused them, then
//! delivery by destination socket. Broadcasts never provoke an Error reply.

use crate::error::ServerError;
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;
use xnsnet_core::addr::{ANY_NETWORK, Endpoint, HostAddr};
use xnsnet_core::error_packet::{ErrorCode, ErrorPacket};
use xnsnet_core::idp::{Idp, PacketType, socket};
use xnsnet_core::receiver::{IdpReceiver, IdpSender};

pub struct NetworkStack {
    local: Endpoint,
    sender: Arc<dyn IdpSender>,
    receivers: HashMap<u16, Box<dyn IdpReceiver>>,
}

impl NetworkStack {
    pub fn new(network: u32, host: HostAddr, sender: Arc<dyn IdpSender>) -> Self {
        Self {
            local: Endpoint::new(network, host, 0),
            sender,
            receivers: HashMap::new(),
        }
    }

    pub fn local(&self) -> Endpoint {
        self.local
    }

    pub fn sender(&self) -> Arc<dyn IdpSender> {
        self.sender.clone()
    }

    pub fn is_bound(&self, socket: u16) -> bool {
        self.receivers.contains_key(&socket)
    }

    pub fn bind(
        &mut self,
        socket: u16,
        mut receiver: Box<dyn IdpReceiver>,
    ) -> Result<(), ServerError> {
        if self.receivers.contains_key(&socket) {
            return Err(ServerError::SocketInUse(socket));
        }
        receiver.start(self.local.with_socket(socket), self.sender.clone());
        self.receivers.insert(socket, receiver);
        info!("Bound socket {socket} on {}", self.local.host);
        Ok(())
    }

    pub fn unbind(&mut self, socket: u16) -> bool {
        match self.receivers.remove(&socket) {
            Some(mut receiver) => {
                receiver.stopped();
                debug!("Unbound socket {socket}");
                true
            }
            None => false,
        }
    }

    /// Unbinds every socket.
    pub fn stop(&mut self) {
        for (socket, mut receiver) in self.receivers.drain() {
            receiver.stopped();
            debug!("Stopped receiver on socket {socket}");
        }
        info!("Network stack on {} stopped", self.local.host);
    }

    pub fn handle(&mut self, idp: Idp) {
        let destination = idp.destination();
        trace!("Inbound {idp}");

        if !idp.verify_checksum() {
            debug!(
                "Bad checksum {:04X} on packet from {}",
                idp.checksum(),
                idp.source()
            );
            if !destination.host.is_broadcast() {
                self.send_error(&idp, ErrorCode::BadChecksum);
            }
            return;
        }

        if destination.host != self.local.host && !destination.host.is_broadcast() {
            trace!("Packet for host {} is not ours", destination.host);
            return;
        }
        if destination.network != self.local.network && destination.network != ANY_NETWORK {
            trace!("Packet for network {:X} is not ours", destination.network);
            return;
        }

        if idp.packet_type() == PacketType::Error {
            self.deliver_error(idp);
            return;
        }

        match self.receivers.get_mut(&destination.socket) {
            Some(receiver) => receiver.accept(idp),
            None => {
                debug!(
                    "No receiver on socket {} for packet from {}",
                    destination.socket,
                    idp.source()
                );
                if !destination.host.is_broadcast() {
                    self.send_error(&idp, ErrorCode::NoSocket);
                }
            }
        }
    }

    fn deliver_error(&mut self, idp: Idp) {
        let Some(error) = ErrorPacket::parse(idp) else {
            debug!("Truncated Error packet dropped");
            return;
        };
        let offending = error.offending_packet();
        let socket = offending.source().socket;
        debug!(
            "Error {:?} ({}) about our packet from socket {socket} to {}",
            error.error_code(),
            error.parameter(),
            offending.destination()
        );
        match self.receivers.get_mut(&socket) {
            Some(receiver) => receiver.accept_error(error),
            None => debug!("No receiver on socket {socket} for Error packet"),
        }
    }

    fn send_error(&self, offending: &Idp, code: ErrorCode) {
        if offending.packet_type() == PacketType::Error {
            return;
        }
        let reply = ErrorPacket::reply_to(offending, code, 0).into_idp();
        reply.set_source(&self.local.with_socket(socket::ERROR));
        reply.update_checksum();
        if let Err(e) = self.sender.send(&reply) {
            warn!("Could not report {code:?} to {}: {e}", offending.source());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use xnsnet_core::addr::BROADCAST_HOST;
    use xnsnet_core::error::CoreError;

    const NETWORK: u32 = 0x0401;
    const HOST: HostAddr = HostAddr(0x0200_0000_0001);

    #[derive(Default)]
    struct Outbox(Mutex<Vec<Idp>>);

    impl IdpSender for Outbox {
        fn send(&self, idp: &Idp) -> Result<(), CoreError> {
            self.0.lock().unwrap().push(idp.clone());
            Ok(())
        }
    }

    impl Outbox {
        fn take(&self) -> Vec<Idp> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    #[derive(Default, Clone)]
    struct Recorder {
        accepted: Arc<Mutex<Vec<Idp>>>,
        errors: Arc<Mutex<Vec<ErrorCode>>>,
        local: Arc<Mutex<Option<Endpoint>>>,
    }

    impl IdpReceiver for Recorder {
        fn start(&mut self, local: Endpoint, _sender: Arc<dyn IdpSender>) {
            *self.local.lock().unwrap() = Some(local);
        }

        fn accept(&mut self, idp: Idp) {
            self.accepted.lock().unwrap().push(idp);
        }

        fn accept_error(&mut self, error: ErrorPacket) {
            self.errors.lock().unwrap().push(error.error_code());
        }
    }

    fn stack() -> (NetworkStack, Arc<Outbox>) {
        let outbox = Arc::new(Outbox::default());
        (NetworkStack::new(NETWORK, HOST, outbox.clone()), outbox)
    }

    fn packet(host: HostAddr, socket: u16) -> Idp {
        let idp = Idp::build();
        idp.set_packet_type(PacketType::Pex);
        idp.set_destination(&Endpoint::new(NETWORK, host, socket));
        idp.set_source(&Endpoint::new(NETWORK, HostAddr(0x0200_0000_0099), 0x4000));
        idp.set_payload_length(6);
        idp.update_checksum();
        idp
    }

    #[test]
    fn delivers_by_socket() {
        let (mut stack, outbox) = stack();
        let recorder = Recorder::default();
        stack.bind(socket::TIME, Box::new(recorder.clone())).unwrap();
        let local = *recorder.local.lock().unwrap();
        assert_eq!(local, Some(Endpoint::new(NETWORK, HOST, socket::TIME)));

        stack.handle(packet(HOST, socket::TIME));
        stack.handle(packet(BROADCAST_HOST, socket::TIME));
        assert_eq!(recorder.accepted.lock().unwrap().len(), 2);
        assert!(outbox.take().is_empty());
    }

    #[test]
    fn double_bind_fails() {
        let (mut stack, _) = stack();
        stack.bind(socket::ECHO, Box::new(Recorder::default())).unwrap();
        assert!(matches!(
            stack.bind(socket::ECHO, Box::new(Recorder::default())),
            Err(ServerError::SocketInUse(2))
        ));
        assert!(stack.unbind(socket::ECHO));
        assert!(!stack.unbind(socket::ECHO));
        assert!(stack.bind(socket::ECHO, Box::new(Recorder::default())).is_ok());
    }

    #[test]
    fn unknown_socket_reports_no_socket() {
        let (mut stack, outbox) = stack();
        stack.handle(packet(HOST, 0x3333));
        let sent = outbox.take();
        assert_eq!(sent.len(), 1);
        let error = ErrorPacket::parse(sent[0].clone()).unwrap();
        assert_eq!(error.error_code(), ErrorCode::NoSocket);
        assert_eq!(error.offending_packet().destination().socket, 0x3333);
        assert_eq!(sent[0].source(), Endpoint::new(NETWORK, HOST, socket::ERROR));
        assert_eq!(sent[0].destination().host, HostAddr(0x0200_0000_0099));
        assert!(sent[0].verify_checksum());

        stack.handle(packet(BROADCAST_HOST, 0x3333));
        assert!(outbox.take().is_empty());
    }

    #[test]
    fn bad_checksum_reported_unless_broadcast() {
        let (mut stack, outbox) = stack();
        let recorder = Recorder::default();
        stack.bind(socket::TIME, Box::new(recorder.clone())).unwrap();

        let damaged = packet(HOST, socket::TIME);
        damaged.payload().write_u8(0, 0x55);
        stack.handle(damaged);
        let sent = outbox.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            ErrorPacket::parse(sent[0].clone()).unwrap().error_code(),
            ErrorCode::BadChecksum
        );

        let damaged = packet(BROADCAST_HOST, socket::TIME);
        damaged.payload().write_u8(0, 0x55);
        stack.handle(damaged);
        assert!(outbox.take().is_empty());
        assert!(recorder.accepted.lock().unwrap().is_empty());
    }

    #[test]
    fn foreign_destinations_are_dropped() {
        let (mut stack, outbox) = stack();
        let recorder = Recorder::default();
        stack.bind(socket::TIME, Box::new(recorder.clone())).unwrap();

        stack.handle(packet(HostAddr(0x0200_0000_0002), socket::TIME));
        let other_network = packet(HOST, socket::TIME);
        other_network.set_destination(&Endpoint::new(0x0999, HOST, socket::TIME));
        other_network.update_checksum();
        stack.handle(other_network);
        let any_network = packet(HOST, socket::TIME);
        any_network.set_destination(&Endpoint::new(ANY_NETWORK, HOST, socket::TIME));
        any_network.update_checksum();
        stack.handle(any_network);

        assert_eq!(recorder.accepted.lock().unwrap().len(), 1);
        assert!(outbox.take().is_empty());
    }

    #[test]
    fn error_packets_reach_the_offending_socket() {
        let (mut stack, outbox) = stack();
        let recorder = Recorder::default();
        stack.bind(0x0C01, Box::new(recorder.clone())).unwrap();

        let ours = packet(HostAddr(0x0200_0000_0099), 0x4000);
        ours.set_source(&Endpoint::new(NETWORK, HOST, 0x0C01));
        ours.update_checksum();
        let report = ErrorPacket::reply_to(&ours, ErrorCode::NoSocket, 0).into_idp();
        report.set_destination(&Endpoint::new(NETWORK, HOST, socket::ERROR));
        report.update_checksum();

        stack.handle(report);
        assert_eq!(*recorder.errors.lock().unwrap(), vec![ErrorCode::NoSocket]);
        assert!(recorder.accepted.lock().unwrap().is_empty());
        assert!(outbox.take().is_empty());
    }
}
