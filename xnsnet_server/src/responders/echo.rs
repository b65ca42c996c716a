use crate::responders::Binding;
use log::debug;
use std::sync::Arc;
use xnsnet_core::addr::Endpoint;
use xnsnet_core::echo::{ECHO_REQUEST, Echo};
use xnsnet_core::error_packet::ErrorPacket;
use xnsnet_core::idp::Idp;
use xnsnet_core::receiver::{IdpReceiver, IdpSender};

/// Answers Echo requests with the request data.
#[derive(Default)]
pub struct EchoResponder {
    binding: Option<Binding>,
}

impl IdpReceiver for EchoResponder {
    fn start(&mut self, local: Endpoint, sender: Arc<dyn IdpSender>) {
        self.binding = Some(Binding::new(local, sender));
    }

    fn accept(&mut self, idp: Idp) {
        let Some(binding) = &self.binding else {
            return;
        };
        let source = idp.source();
        let Some(echo) = Echo::parse(idp) else {
            debug!("Non-echo packet from {source} on the echo socket");
            return;
        };
        if echo.operation() != ECHO_REQUEST {
            debug!("Echo operation {} from {source} ignored", echo.operation());
            return;
        }
        binding.reply(Echo::reply_to(&echo).into_idp());
    }

    fn accept_error(&mut self, error: ErrorPacket) {
        debug!("Echo reply rejected: {:?}", error.error_code());
    }
}
