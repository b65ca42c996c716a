//! Routing Information Protocol responder.
//!
//! A single broadcaster task owns the broadcast schedule and the per-requester
//! inhibit map. The receiver only forwards commands to it, so nothing here is
//! shared between tasks.

use crate::config::RoutingConfig;
use crate::responders::Binding;
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use xnsnet_core::addr::{BROADCAST_HOST, Endpoint};
use xnsnet_core::error_packet::ErrorPacket;
use xnsnet_core::idp::{Idp, socket};
use xnsnet_core::receiver::{IdpReceiver, IdpSender};
use xnsnet_core::routing::{RIP_REQUEST, RIP_RESPONSE, RouteEntry, RoutingPacket};

/// Network number a requester uses to ask for every known route.
pub const ALL_NETWORKS: u32 = 0xFFFF_FFFF;
/// Answers to the same requester closer together than this are suppressed.
pub const REQUEST_INHIBIT: Duration = Duration::from_secs(1);
/// Delay of a broadcast asked for with [`RoutingCommand::BroadcastSoon`].
pub const BROADCAST_SOON: Duration = Duration::from_millis(500);
const COMMAND_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingCommand {
    Request { requester: Endpoint },
    BroadcastSoon,
}

struct RoutingBroadcaster {
    binding: Binding,
    receiver: mpsc::Receiver<RoutingCommand>,
    interval: Duration,
    next_broadcast: Instant,
    inhibit: HashMap<Endpoint, Instant>,
}

impl RoutingBroadcaster {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = sleep_until(self.next_broadcast) => {
                    let destination = Endpoint::new(
                        self.binding.local().network,
                        BROADCAST_HOST,
                        socket::ROUTING,
                    );
                    self.send_routes(destination);
                    self.next_broadcast = Instant::now() + self.interval;
                }
            }
        }
        debug!("Routing broadcaster stopped");
    }

    fn handle_command(&mut self, command: RoutingCommand) {
        match command {
            RoutingCommand::Request { requester } => {
                let now = Instant::now();
                self.inhibit
                    .retain(|_, answered| now.duration_since(*answered) < REQUEST_INHIBIT);
                if self.inhibit.contains_key(&requester) {
                    trace!("Routing request from {requester} inhibited");
                    return;
                }
                self.inhibit.insert(requester, now);
                self.send_routes(requester);
            }
            RoutingCommand::BroadcastSoon => {
                self.next_broadcast = self.next_broadcast.min(Instant::now() + BROADCAST_SOON);
            }
        }
    }

    fn send_routes(&self, destination: Endpoint) {
        let idp = Idp::build();
        idp.set_destination(&destination);
        let routes = [RouteEntry {
            network: self.binding.local().network,
            hops: 0,
        }];
        let packet = RoutingPacket::build(idp, RIP_RESPONSE, &routes);
        debug!("Routing response to {destination}");
        self.binding.reply(packet.into_idp());
    }
}

pub struct RoutingResponder {
    interval: Duration,
    network: u32,
    commands: Option<mpsc::Sender<RoutingCommand>>,
}

impl RoutingResponder {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            interval: config.broadcast_interval.max(Duration::from_secs(1)),
            network: 0,
            commands: None,
        }
    }

    /// A handle for other tasks to schedule broadcasts; `None` before start.
    pub fn commands(&self) -> Option<mpsc::Sender<RoutingCommand>> {
        self.commands.clone()
    }

    fn wants_our_network(&self, request: &RoutingPacket) -> bool {
        let entries = request.entries();
        entries.is_empty()
            || entries
                .iter()
                .any(|entry| entry.network == self.network || entry.network == ALL_NETWORKS)
    }
}

impl IdpReceiver for RoutingResponder {
    fn start(&mut self, local: Endpoint, sender: Arc<dyn IdpSender>) {
        let (tx, receiver) = mpsc::channel(COMMAND_CAPACITY);
        self.network = local.network;
        let broadcaster = RoutingBroadcaster {
            binding: Binding::new(local, sender),
            receiver,
            interval: self.interval,
            next_broadcast: Instant::now(),
            inhibit: HashMap::new(),
        };
        tokio::spawn(broadcaster.run());
        self.commands = Some(tx);
        info!("Routing broadcasts every {:?}", self.interval);
    }

    fn accept(&mut self, idp: Idp) {
        let requester = idp.source();
        let Some(packet) = RoutingPacket::parse(idp) else {
            debug!("Non-routing packet from {requester} on the routing socket");
            return;
        };
        if packet.operation() != RIP_REQUEST {
            trace!("Routing response from {requester} ignored");
            return;
        }
        if !self.wants_our_network(&packet) {
            return;
        }
        let Some(commands) = &self.commands else {
            return;
        };
        if let Err(e) = commands.try_send(RoutingCommand::Request { requester }) {
            warn!("Routing request from {requester} dropped: {e}");
        }
    }

    fn accept_error(&mut self, error: ErrorPacket) {
        debug!("Routing packet rejected: {:?}", error.error_code());
    }

    fn stopped(&mut self) {
        self.commands = None;
    }
}
