pub mod addr;
pub mod buffer;
pub mod connection;
pub mod echo;
pub mod error;
pub mod error_packet;
pub mod hub;
pub mod idp;
pub mod pex;
pub mod receiver;
pub mod routing;
pub mod spp;
pub mod utils;
