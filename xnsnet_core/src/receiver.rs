//! Seams between the network stack and the protocol responders.

use crate::addr::Endpoint;
use crate::error::CoreError;
use crate::error_packet::ErrorPacket;
use crate::idp::Idp;
use std::sync::Arc;

/// Transmits finished packets. Implementations queue and never block.
pub trait IdpSender: Send + Sync {
    fn send(&self, idp: &Idp) -> Result<(), CoreError>;
}

/// A responder bound to one local socket.
pub trait IdpReceiver: Send {
    /// Called once when the receiver is bound; `local` carries its socket.
    fn start(&mut self, local: Endpoint, sender: Arc<dyn IdpSender>);

    fn accept(&mut self, idp: Idp);

    /// An Error packet whose offending packet came from our socket.
    fn accept_error(&mut self, error: ErrorPacket);

    fn stopped(&mut self) {}
}
