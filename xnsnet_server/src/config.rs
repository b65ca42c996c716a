use serde::{Deserialize, Serialize};
use std::time::Duration;
use xnsnet_core::addr::HostAddr;

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub hub: HubConfig,
    pub machine: MachineConfig,
    pub time: TimeConfig,
    pub routing: RoutingConfig,
    pub spp: SppConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    pub address: String,
    #[serde(deserialize_with = "duration_from_secs", serialize_with = "duration_to_secs")]
    pub global_timeout: Duration,
    pub channel_buffer_capacity: usize,
    pub max_retries: usize,
    #[serde(deserialize_with = "duration_from_millis", serialize_with = "duration_to_millis")]
    pub retry_interval: Duration,
    /// Send the 14-byte handshake and use 4-byte framing from the start.
    pub qemu_mode: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3333".to_string(),
            global_timeout: Duration::from_secs(10),
            channel_buffer_capacity: 1000,
            max_retries: 5,
            retry_interval: Duration::from_millis(1000),
            qemu_mode: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
#[serde(default)]
pub struct MachineConfig {
    pub network: u32,
    pub host: HostAddr,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            network: 0x0401,
            host: HostAddr(0x0200_0000_0001),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq, Default)]
#[serde(default)]
pub struct TimeConfig {
    /// Local offset from GMT; negative is west.
    pub offset_minutes: i32,
    /// Day of the year daylight saving starts, 0 for none.
    pub dst_start: u16,
    pub dst_end: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
#[serde(default)]
pub struct RoutingConfig {
    pub enabled: bool,
    #[serde(deserialize_with = "duration_from_secs", serialize_with = "duration_to_secs")]
    pub broadcast_interval: Duration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broadcast_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
#[serde(default)]
pub struct SppConfig {
    #[serde(deserialize_with = "duration_from_millis", serialize_with = "duration_to_millis")]
    pub page_delay: Duration,
    pub allocation: u16,
    /// Streams silent for this long are dropped; zero keeps them until the
    /// hub link goes down.
    #[serde(deserialize_with = "duration_from_secs", serialize_with = "duration_to_secs")]
    pub idle_timeout: Duration,
}

impl Default for SppConfig {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(20),
            allocation: 4,
            idle_timeout: Duration::ZERO,
        }
    }
}

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

fn duration_from_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

fn duration_to_secs<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

fn duration_to_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}
