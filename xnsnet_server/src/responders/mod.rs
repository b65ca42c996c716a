//! Protocol responders bound to well-known sockets.

pub mod clearinghouse;
pub mod courier_pex;
pub mod courier_spp;
pub mod echo;
pub mod routing;
pub mod time;

use log::warn;
use std::sync::Arc;
use xnsnet_core::addr::Endpoint;
use xnsnet_core::idp::Idp;
use xnsnet_core::receiver::IdpSender;

/// What a receiver learns when it is bound: its own endpoint and the way out.
#[derive(Clone)]
pub(crate) struct Binding {
    local: Endpoint,
    sender: Arc<dyn IdpSender>,
}

impl Binding {
    pub(crate) fn new(local: Endpoint, sender: Arc<dyn IdpSender>) -> Self {
        Self { local, sender }
    }

    pub(crate) fn local(&self) -> Endpoint {
        self.local
    }

    /// Stamps our endpoint as the source, checksums and queues `idp`.
    pub(crate) fn reply(&self, idp: Idp) {
        idp.set_source(&self.local);
        self.send(idp);
    }

    /// Checksums and queues an already addressed `idp`.
    pub(crate) fn send(&self, idp: Idp) {
        idp.update_checksum();
        if let Err(e) = self.sender.send(&idp) {
            warn!("Dropped packet to {}: {e}", idp.destination());
        }
    }
}
