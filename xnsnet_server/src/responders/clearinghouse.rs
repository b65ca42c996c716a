//! The Clearinghouse Courier program, as far as Broadcast for Servers needs
//! it: clients ask where a Clearinghouse lives and we name ourselves.

use xnsnet_core::addr::Endpoint;
use xnsnet_core::idp::socket;
use xnsnet_courier::courier_record;
use xnsnet_courier::dispatch::{CourierAbort, CourierProgram, CourierRegistry};
use xnsnet_courier::types::{Empty, Sequence, Unspecified, Unspecified2, Unspecified3};

pub const CLEARINGHOUSE_PROGRAM: u32 = 2;
pub const CLEARINGHOUSE_VERSION: u16 = 3;
pub const RETRIEVE_ADDRESSES: u16 = 0;
pub const MAX_ADDRESSES: usize = 40;

courier_record! {
    pub struct NetworkAddress {
        pub network: Unspecified2,
        pub host: Unspecified3,
        pub socket: Unspecified,
    }
}

impl From<Endpoint> for NetworkAddress {
    fn from(value: Endpoint) -> Self {
        Self {
            network: Unspecified2(value.network),
            host: Unspecified3(value.host.0),
            socket: Unspecified(value.socket),
        }
    }
}

pub type NetworkAddressList = Sequence<NetworkAddress, MAX_ADDRESSES>;

/// The Clearinghouse program answering for the Courier server at `local`.
pub fn clearinghouse_program(local: Endpoint) -> CourierProgram {
    let address = NetworkAddress::from(local.with_socket(socket::COURIER));
    CourierProgram::new("Clearinghouse", CLEARINGHOUSE_PROGRAM, CLEARINGHOUSE_VERSION).procedure(
        RETRIEVE_ADDRESSES,
        "RetrieveAddresses",
        &[],
        move |_: Empty| -> Result<NetworkAddressList, CourierAbort> {
            Ok(Sequence(vec![address.clone()]))
        },
    )
}

/// Every Courier program this machine serves.
pub fn registry(local: Endpoint) -> CourierRegistry {
    let mut registry = CourierRegistry::new();
    registry.register(clearinghouse_program(local));
    registry
}
