//! Small utilities and macros shared by the workspace.
//!
//! - `retry!` retries an async fallible expression, logging each failure
//! - `Cancellable` for handles that can be stopped cooperatively
//! - `lookup_hub` resolves a `host:port` hub address
use crate::error::CoreError;
use std::net::SocketAddr;
use tokio::net::lookup_host;

#[macro_export]
macro_rules! retry {
    ($f:expr, $count:expr, $interval:expr) => {{
        let mut retries = 1;
        let result = loop {
            let result = $f;
            match &result {
                Ok(_) => break result,
                Err(e) if retries > $count => {
                    log::error!("Failed: {}; giving up after {} attempts", e, $count);
                    break result;
                }
                Err(e) => {
                    log::error!("Failed: {}", e);
                    log::warn!("Attempt {} out of {}", retries, $count);
                    retries += 1;
                    tokio::time::sleep($interval).await;
                }
            }
        };
        result
    }};
    ($f:expr) => {
        $crate::retry!($f, 5, std::time::Duration::from_secs(1))
    };
}

pub trait Cancellable {
    fn cancel(&mut self);
    fn is_cancelled(&self) -> bool;
}

pub async fn lookup_hub(address: &str) -> Result<Vec<SocketAddr>, CoreError> {
    let addresses: Vec<SocketAddr> = lookup_host(address).await?.collect();
    if addresses.is_empty() {
        return Err(CoreError::ConnectionError(format!(
            "hub address {address} did not resolve"
        )));
    }
    Ok(addresses)
}
