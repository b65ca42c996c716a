//! Courier over PEX, used by Broadcast for Servers.
//!
//! Every request is a whole conversation: the version pair and one CALL in,
//! the version pair and the reply out.

use crate::responders::Binding;
use log::{debug, warn};
use std::sync::Arc;
use xnsnet_core::addr::Endpoint;
use xnsnet_core::error_packet::ErrorPacket;
use xnsnet_core::idp::Idp;
use xnsnet_core::pex::{ClientType, MAX_PEX_BODY, Pex};
use xnsnet_core::receiver::{IdpReceiver, IdpSender};
use xnsnet_courier::dispatch::{CourierRegistry, CourierSession};

pub struct CourierPexResponder {
    registry: Arc<CourierRegistry>,
    binding: Option<Binding>,
}

impl CourierPexResponder {
    pub fn new(registry: Arc<CourierRegistry>) -> Self {
        Self {
            registry,
            binding: None,
        }
    }
}

impl IdpReceiver for CourierPexResponder {
    fn start(&mut self, local: Endpoint, sender: Arc<dyn IdpSender>) {
        self.binding = Some(Binding::new(local, sender));
    }

    fn accept(&mut self, idp: Idp) {
        let Some(binding) = &self.binding else {
            return;
        };
        let source = idp.source();
        let Some(request) = Pex::parse(idp) else {
            debug!("Non-PEX packet from {source} on the Clearinghouse socket");
            return;
        };
        if request.client_type() != ClientType::Clearinghouse {
            debug!(
                "PEX client type {:?} from {source} on the Clearinghouse socket",
                request.client_type()
            );
            return;
        }

        let mut session = CourierSession::new(self.registry.clone());
        let reply = match session.handle(&request.body().to_vec()) {
            Ok(Some(reply)) => reply,
            Ok(None) => return,
            Err(e) => {
                debug!("Courier request from {source} failed: {e}");
                return;
            }
        };
        if reply.len() > MAX_PEX_BODY {
            warn!(
                "Courier reply of {} bytes to {source} does not fit a PEX packet",
                reply.len()
            );
            return;
        }
        let response = Pex::reply_to(&request);
        response.set_body(&reply);
        binding.reply(response.into_idp());
    }

    fn accept_error(&mut self, error: ErrorPacket) {
        debug!("Clearinghouse reply rejected: {:?}", error.error_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responders::clearinghouse;
    use std::sync::Mutex;
    use xnsnet_core::addr::HostAddr;
    use xnsnet_core::error::CoreError;
    use xnsnet_core::idp::socket;

    #[derive(Default)]
    struct Outbox(Mutex<Vec<Idp>>);

    impl IdpSender for Outbox {
        fn send(&self, idp: &Idp) -> Result<(), CoreError> {
            self.0.lock().unwrap().push(idp.clone());
            Ok(())
        }
    }

    fn responder() -> (CourierPexResponder, Arc<Outbox>) {
        let local = Endpoint::new(0x0401, HostAddr(0x0200_0000_0001), socket::CLEARINGHOUSE);
        let mut responder = CourierPexResponder::new(Arc::new(clearinghouse::registry(local)));
        let outbox = Arc::new(Outbox::default());
        responder.start(local, outbox.clone());
        (responder, outbox)
    }

    fn request(client_type: ClientType, body: &[u8]) -> Idp {
        let pex = Pex::build(0x1234_5678, client_type);
        pex.set_body(body);
        pex.idp()
            .set_source(&Endpoint::new(0x0401, HostAddr(0x0200_0000_0099), 0x4020));
        pex.into_idp()
    }

    #[test]
    fn broadcast_for_servers() {
        let (mut responder, outbox) = responder();
        responder.accept(request(
            ClientType::Clearinghouse,
            &[0, 3, 0, 3, 0, 0, 0, 9, 0, 0, 0, 2, 0, 3, 0, 0],
        ));

        let sent = outbox.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let reply = Pex::parse(sent[0].clone()).unwrap();
        assert_eq!(reply.identifier(), 0x1234_5678);
        assert_eq!(reply.client_type(), ClientType::Clearinghouse);
        assert_eq!(
            reply.idp().destination(),
            Endpoint::new(0x0401, HostAddr(0x0200_0000_0099), 0x4020)
        );
        assert!(reply.idp().verify_checksum());
        assert_eq!(
            reply.body().to_vec(),
            vec![
                0, 3, 0, 3, 0, 2, 0, 9, 0, 1, 0, 0, 0x04, 0x01, 0x02, 0, 0, 0, 0, 0x01, 0, 5
            ]
        );
    }

    #[test]
    fn ignores_other_client_types() {
        let (mut responder, outbox) = responder();
        responder.accept(request(ClientType::Time, &[0, 2, 0, 1]));
        responder.accept(request(ClientType::Clearinghouse, &[0, 1, 0, 1]));
        assert!(outbox.0.lock().unwrap().is_empty());
    }
}
