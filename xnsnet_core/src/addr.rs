//! XNS addressing: 48-bit host numbers and network/host/socket endpoints.
//!
//! `HostAddr` serializes as the dash separated hex form used in configuration
//! files (`02-00-0A-00-00-01`), mirroring how MAC addresses are written.

use crate::error::CoreError;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const BROADCAST_HOST: HostAddr = HostAddr(0xFFFF_FFFF_FFFF);
pub const ANY_NETWORK: u32 = 0;
const HOST_MASK: u64 = 0xFFFF_FFFF_FFFF;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostAddr(pub u64);

impl HostAddr {
    pub fn new(value: u64) -> Self {
        Self(value & HOST_MASK)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == BROADCAST_HOST
    }

    pub fn to_octets(&self) -> [u8; 6] {
        let bytes = self.0.to_be_bytes();
        [bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
    }

    pub fn from_octets(octets: [u8; 6]) -> Self {
        Self(
            octets
                .iter()
                .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)),
        )
    }
}

impl Display for HostAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let o = self.to_octets();
        write!(
            f,
            "{:02X}-{:02X}-{:02X}-{:02X}-{:02X}-{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for HostAddr {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(['-', ':']).collect();
        if parts.len() != 6 {
            return Err(CoreError::ParseAddrError(format!(
                "host address {s} must have six octets"
            )));
        }
        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            *octet = u8::from_str_radix(part, 16)?;
        }
        Ok(Self::from_octets(octets))
    }
}

impl Serialize for HostAddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

struct HostAddrVisitor;

impl<'de> Visitor<'de> for HostAddrVisitor {
    type Value = HostAddr;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a 48-bit host address such as 02-00-00-00-00-01")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse::<HostAddr>()
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(HostAddr::new(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        u64::try_from(v)
            .map(HostAddr::new)
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

impl<'de> Deserialize<'de> for HostAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(HostAddrVisitor)
    }
}

/// One side of an IDP exchange.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub network: u32,
    pub host: HostAddr,
    pub socket: u16,
}

impl Endpoint {
    pub fn new(network: u32, host: HostAddr, socket: u16) -> Self {
        Self {
            network,
            host,
            socket,
        }
    }

    pub fn with_socket(self, socket: u16) -> Self {
        Self { socket, ..self }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:X}#{}#{}", self.network, self.host, self.socket)
    }
}
