//! Courier over SPP: one worker task per stream.
//!
//! The receiver keys workers by the peer's endpoint and connection id. Each
//! worker owns its [`SppConnection`] outright and is fed packets over a
//! channel, so the state machine is only ever touched from one task.

use crate::config::SppConfig;
use crate::responders::Binding;
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use xnsnet_core::addr::Endpoint;
use xnsnet_core::error_packet::ErrorPacket;
use xnsnet_core::idp::Idp;
use xnsnet_core::receiver::{IdpReceiver, IdpSender};
use xnsnet_core::spp::connection::{SppConnection, SppPage, SppService, SppState};
use xnsnet_core::spp::{MAX_SPP_DATA, SppPacket, sst};
use xnsnet_courier::dispatch::{CourierRegistry, CourierSession};

const CONNECTION_QUEUE: usize = 32;
const FIRST_CONNECTION_ID: u16 = 0x1000;
/// Largest Courier message reassembled from one stream.
pub const MAX_COURIER_MESSAGE: usize = 64 * 1024;

/// Reassembles Courier messages from a stream and pages the replies out.
pub struct CourierSppService {
    session: CourierSession,
    inbound: Vec<u8>,
    outbound: VecDeque<SppPage>,
    failed: bool,
}

impl CourierSppService {
    pub fn new(registry: Arc<CourierRegistry>) -> Self {
        Self {
            session: CourierSession::new(registry),
            inbound: Vec::new(),
            outbound: VecDeque::new(),
            failed: false,
        }
    }

    pub fn pending_pages(&self) -> usize {
        self.outbound.len()
    }

    fn queue_reply(&mut self, reply: &[u8]) {
        let mut pages = reply
            .chunks(MAX_SPP_DATA)
            .map(|chunk| SppPage::new(sst::DATA, chunk.to_vec()))
            .collect::<Vec<_>>();
        if let Some(last) = pages.pop() {
            pages.push(last.with_end_of_message());
        }
        self.outbound.extend(pages);
    }
}

impl SppService for CourierSppService {
    fn accept_data(&mut self, stream_type: u8, end_of_message: bool, data: &[u8]) {
        if self.failed {
            return;
        }
        if stream_type != sst::DATA {
            debug!("Ignoring {} bytes on stream type {stream_type}", data.len());
            return;
        }
        if self.inbound.len() + data.len() > MAX_COURIER_MESSAGE {
            warn!("Courier message exceeds {MAX_COURIER_MESSAGE} bytes; closing the stream");
            self.inbound = Vec::new();
            self.failed = true;
            return;
        }
        self.inbound.extend_from_slice(data);
        if !end_of_message {
            return;
        }
        let message = std::mem::take(&mut self.inbound);
        match self.session.handle(&message) {
            Ok(Some(reply)) => self.queue_reply(&reply),
            Ok(None) => {}
            Err(e) => {
                warn!("Courier stream failed: {e}");
                self.failed = true;
            }
        }
    }

    fn next_page(&mut self) -> Option<SppPage> {
        self.outbound.pop_front()
    }

    fn is_exhausted(&self) -> bool {
        self.failed && self.outbound.is_empty()
    }
}

struct SppWorker {
    connection: SppConnection<CourierSppService>,
    receiver: mpsc::Receiver<SppPacket>,
    binding: Binding,
    page_delay: Duration,
    idle_timeout: Duration,
}

impl SppWorker {
    async fn run(mut self) {
        loop {
            let next = if self.idle_timeout.is_zero() {
                Ok(self.receiver.recv().await)
            } else {
                timeout(self.idle_timeout, self.receiver.recv()).await
            };
            let packet = match next {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(_) => {
                    info!(
                        "SPP connection {:04X} with {} idle; dropping it",
                        self.connection.local_id(),
                        self.connection.remote()
                    );
                    break;
                }
            };
            for idp in self.connection.handle(&packet) {
                if !self.page_delay.is_zero() {
                    tokio::time::sleep(self.page_delay).await;
                }
                self.binding.send(idp);
            }
            if self.connection.state() == SppState::Closed {
                break;
            }
        }
        debug!(
            "SPP worker {:04X} finished in state {:?}",
            self.connection.local_id(),
            self.connection.state()
        );
    }
}

pub struct CourierSppResponder {
    registry: Arc<CourierRegistry>,
    allocation: u16,
    page_delay: Duration,
    idle_timeout: Duration,
    binding: Option<Binding>,
    connections: HashMap<(Endpoint, u16), mpsc::Sender<SppPacket>>,
    next_id: u16,
}

impl CourierSppResponder {
    pub fn new(registry: Arc<CourierRegistry>, config: &SppConfig) -> Self {
        Self {
            registry,
            allocation: config.allocation,
            page_delay: config.page_delay,
            idle_timeout: config.idle_timeout,
            binding: None,
            connections: HashMap::new(),
            next_id: FIRST_CONNECTION_ID,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn allocate_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = match self.next_id.wrapping_add(1) {
            0 => FIRST_CONNECTION_ID,
            next => next,
        };
        id
    }

    fn open(&mut self, remote: Endpoint, packet: &SppPacket) -> Option<mpsc::Sender<SppPacket>> {
        let binding = self.binding.clone()?;
        if !(packet.is_system() && packet.is_send_ack()) || packet.destination_connection_id() != 0
        {
            debug!(
                "SPP packet for unknown connection {:04X} from {remote}",
                packet.destination_connection_id()
            );
            return None;
        }
        let local_id = self.allocate_id();
        let service = CourierSppService::new(self.registry.clone());
        let connection =
            SppConnection::new(binding.local(), remote, local_id, self.allocation, service);
        let (tx, receiver) = mpsc::channel(CONNECTION_QUEUE);
        let worker = SppWorker {
            connection,
            receiver,
            binding,
            page_delay: self.page_delay,
            idle_timeout: self.idle_timeout,
        };
        tokio::spawn(worker.run());
        info!(
            "Courier connection {local_id:04X} opened for {remote} ({:04X})",
            packet.source_connection_id()
        );
        Some(tx)
    }
}

impl IdpReceiver for CourierSppResponder {
    fn start(&mut self, local: Endpoint, sender: Arc<dyn IdpSender>) {
        self.binding = Some(Binding::new(local, sender));
    }

    fn accept(&mut self, idp: Idp) {
        let remote = idp.source();
        let Some(packet) = SppPacket::parse(idp) else {
            debug!("Non-SPP packet from {remote} on the Courier socket");
            return;
        };
        self.connections.retain(|_, worker| !worker.is_closed());

        let key = (remote, packet.source_connection_id());
        let worker = match self.connections.get(&key) {
            Some(worker) => worker.clone(),
            None => match self.open(remote, &packet) {
                Some(worker) => {
                    self.connections.insert(key, worker.clone());
                    worker
                }
                None => return,
            },
        };
        if let Err(e) = worker.try_send(packet) {
            warn!("SPP packet from {remote} dropped: {e}");
        }
    }

    fn accept_error(&mut self, error: ErrorPacket) {
        let offending = error.offending_packet();
        debug!(
            "Courier stream to {} rejected: {:?}",
            offending.destination(),
            error.error_code()
        );
    }

    fn stopped(&mut self) {
        self.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xnsnet_courier::dispatch::CourierProgram;
    use xnsnet_courier::types::Empty;

    fn registry() -> Arc<CourierRegistry> {
        let mut registry = CourierRegistry::new();
        registry.register(
            CourierProgram::new("Big", 9, 1).procedure(0, "Fill", &[], |_: Empty| {
                Ok(xnsnet_courier::types::Sequence::<u16>(vec![7; 600]))
            }),
        );
        Arc::new(registry)
    }

    fn call() -> Vec<u8> {
        vec![0, 3, 0, 3, 0, 0, 0, 1, 0, 0, 0, 9, 0, 1, 0, 0]
    }

    #[test]
    fn waits_for_end_of_message() {
        let mut service = CourierSppService::new(registry());
        let call = call();
        service.accept_data(sst::DATA, false, &call[..4]);
        assert!(service.next_page().is_none());
        service.accept_data(sst::DATA, true, &call[4..]);
        assert!(service.pending_pages() > 0);
    }

    #[test]
    fn long_replies_are_paged() {
        let mut service = CourierSppService::new(registry());
        service.accept_data(sst::DATA, true, &call());

        let pages: Vec<SppPage> = std::iter::from_fn(|| service.next_page()).collect();
        let total: usize = pages.iter().map(|page| page.data.len()).sum();
        assert_eq!(total, 4 + 4 + 2 + 1200);
        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|page| page.data.len() <= MAX_SPP_DATA));
        assert!(!pages[0].end_of_message);
        assert!(!pages[1].end_of_message);
        assert!(pages[2].end_of_message);
        assert_eq!(&pages[0].data[..10], &[0, 3, 0, 3, 0, 2, 0, 1, 2, 0x58]);
    }

    #[test]
    fn bad_version_exhausts_the_service() {
        let mut service = CourierSppService::new(registry());
        service.accept_data(sst::DATA, true, &[0, 1, 0, 1]);
        assert!(service.is_exhausted());
        assert!(service.next_page().is_none());
    }

    #[test]
    fn unterminated_message_is_capped() {
        let mut service = CourierSppService::new(registry());
        let page = vec![0u8; MAX_SPP_DATA];
        for _ in 0..MAX_COURIER_MESSAGE / MAX_SPP_DATA {
            service.accept_data(sst::DATA, false, &page);
        }
        assert!(!service.is_exhausted());

        service.accept_data(sst::DATA, false, &page);
        assert!(service.is_exhausted());
        assert!(service.inbound.is_empty());

        service.accept_data(sst::DATA, true, &call());
        assert_eq!(service.pending_pages(), 0);
    }

    #[test]
    fn other_stream_types_are_ignored() {
        let mut service = CourierSppService::new(registry());
        service.accept_data(sst::BULK, true, &call());
        assert_eq!(service.pending_pages(), 0);
        assert!(!service.is_exhausted());
    }
}
