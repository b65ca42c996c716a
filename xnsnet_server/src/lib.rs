use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::responders::clearinghouse;
use crate::responders::courier_pex::CourierPexResponder;
use crate::responders::courier_spp::CourierSppResponder;
use crate::responders::echo::EchoResponder;
use crate::responders::routing::RoutingResponder;
use crate::responders::time::TimeResponder;
use crate::stack::NetworkStack;
use log::{error, info};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use xnsnet_core::connection::{HubConnectionHandle, HubReader};
use xnsnet_core::idp::socket;
use xnsnet_core::receiver::IdpSender;
use xnsnet_core::retry;

pub mod config;
pub mod error;
pub mod responders;
pub mod stack;

/// A stack for the configured machine with every responder bound.
pub fn build_stack(
    config: &ServerConfig,
    sender: Arc<dyn IdpSender>,
) -> Result<NetworkStack, ServerError> {
    let mut stack = NetworkStack::new(config.machine.network, config.machine.host, sender);
    let registry = Arc::new(clearinghouse::registry(stack.local()));

    stack.bind(socket::ECHO, Box::new(EchoResponder::default()))?;
    stack.bind(socket::TIME, Box::new(TimeResponder::new(&config.time)?))?;
    if config.routing.enabled {
        stack.bind(socket::ROUTING, Box::new(RoutingResponder::new(&config.routing)))?;
    }
    stack.bind(
        socket::COURIER,
        Box::new(CourierSppResponder::new(registry.clone(), &config.spp)),
    )?;
    stack.bind(
        socket::CLEARINGHOUSE,
        Box::new(CourierPexResponder::new(registry)),
    )?;
    Ok(stack)
}

/// Feeds packets from the hub into `stack` until the link closes.
pub async fn serve<T>(mut stack: NetworkStack, mut reader: HubReader<T>) -> Result<(), ServerError>
where
    T: AsyncRead + AsyncWrite,
{
    let result = loop {
        match reader.receive_next().await {
            Ok(Some(idp)) => stack.handle(idp),
            Ok(None) => break Ok(()),
            Err(e) => {
                error!("Hub link failed: {e}");
                break Err(ServerError::from(e));
            }
        }
    };
    stack.stop();
    result
}

pub async fn server_init(config: ServerConfig) -> Result<(), ServerError> {
    let hub = &config.hub;
    let (handle, reader) = retry!(
        HubConnectionHandle::connect(
            &hub.address,
            hub.qemu_mode,
            hub.global_timeout,
            hub.channel_buffer_capacity,
        )
        .await,
        hub.max_retries,
        hub.retry_interval
    )?;
    info!(
        "Machine {} on network {:X} attached to hub {}",
        config.machine.host,
        config.machine.network,
        handle.peer()
    );
    let stack = build_stack(&config, Arc::new(handle))?;
    serve(stack, reader).await
}
