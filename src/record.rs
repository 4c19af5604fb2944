use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_xml_rs::from_str;

use crate::error::DecodeError;
use crate::protocol::Function;
use crate::units::{fahrenheit_to_celsius, parse_duration};

pub const OPER_STATE_OK: &str = "OPERATIONAL";
pub const NETWORK_ACCESS_ALLOWED: &str = "Allowed";

/// A getter response shape.
///
/// Decoding happens in two steps: the XML is mapped onto `Raw` as-is, then
/// `from_raw` applies unit conversions and validation.
pub trait Record: Sized {
    const FUNCTION: Function;
    type Raw: DeserializeOwned;

    fn from_raw(raw: Self::Raw) -> Result<Self, DecodeError>;
}

pub fn decode<R: Record>(xml: &str) -> Result<R, DecodeError> {
    let raw = from_str::<R::Raw>(xml)?;

    R::from_raw(raw)
}

/// Cable modem system information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub docsis_mode: String,
    pub hardware_version: String,
    pub mac_addr: String,
    pub serial_number: String,
    /// Seconds since boot.
    pub uptime: u64,
    pub network_access: String,
}

impl SystemInfo {
    pub fn network_access_allowed(&self) -> bool {
        self.network_access == NETWORK_ACCESS_ALLOWED
    }
}

#[derive(Debug, Deserialize)]
pub struct RawSystemInfo {
    #[serde(rename = "cm_docsis_mode")]
    docsis_mode: String,
    #[serde(rename = "cm_hardware_version")]
    hardware_version: String,
    #[serde(rename = "cm_mac_addr")]
    mac_addr: String,
    #[serde(rename = "cm_serial_number")]
    serial_number: String,
    #[serde(rename = "cm_system_uptime")]
    system_uptime: String,
    #[serde(rename = "cm_network_access")]
    network_access: String,
}

impl Record for SystemInfo {
    const FUNCTION: Function = Function::SystemInfo;
    type Raw = RawSystemInfo;

    fn from_raw(raw: RawSystemInfo) -> Result<SystemInfo, DecodeError> {
        Ok(SystemInfo {
            uptime: parse_duration(&raw.system_uptime)?,
            docsis_mode: raw.docsis_mode,
            hardware_version: raw.hardware_version,
            mac_addr: raw.mac_addr,
            serial_number: raw.serial_number,
            network_access: raw.network_access,
        })
    }
}

/// Cable modem state. Temperatures are in degrees Celsius.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub tuner_temperature: i32,
    pub temperature: i32,
    pub oper_state: String,
    pub wan_ipv4_addr: String,
    /// In document order, duplicates included.
    pub wan_ipv6_addrs: Vec<String>,
}

impl State {
    pub fn is_operational(&self) -> bool {
        self.oper_state == OPER_STATE_OK
    }
}

#[derive(Debug, Deserialize)]
pub struct RawState {
    #[serde(rename = "TunnerTemperature")]
    tuner_temperature: i32,
    #[serde(rename = "Temperature")]
    temperature: i32,
    #[serde(rename = "OperState")]
    oper_state: String,
    #[serde(rename = "wan_ipv4_addr")]
    wan_ipv4_addr: String,
    #[serde(rename = "wan_ipv6_addr", default)]
    wan_ipv6_addr: RawIpv6Addrs,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawIpv6Addrs {
    #[serde(rename = "wan_ipv6_addr_entry", default)]
    entries: Vec<String>,
}

impl Record for State {
    const FUNCTION: Function = Function::State;
    type Raw = RawState;

    fn from_raw(raw: RawState) -> Result<State, DecodeError> {
        Ok(State {
            tuner_temperature: fahrenheit_to_celsius(raw.tuner_temperature),
            temperature: fahrenheit_to_celsius(raw.temperature),
            oper_state: raw.oper_state,
            wan_ipv4_addr: raw.wan_ipv4_addr,
            wan_ipv6_addrs: raw.wan_ipv6_addr.entries,
        })
    }
}

/// A device known to the router's DHCP server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientInfo {
    #[serde(rename = "interface", default)]
    pub interface: String,
    #[serde(rename = "IPv4Addr", default)]
    pub ipv4_addr: String,
    #[serde(rename = "index", default)]
    pub index: String,
    #[serde(rename = "interfaceid", default)]
    pub interface_id: String,
    #[serde(rename = "hostname", default)]
    pub hostname: String,
    #[serde(rename = "MACAddr", default)]
    pub mac_addr: String,
    #[serde(rename = "method", default)]
    pub method: String,
    #[serde(rename = "leaseTime", default)]
    pub lease_time: String,
    #[serde(rename = "speed", default)]
    pub speed: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Ethernet,
    Wifi,
}

impl Connection {
    pub fn as_str(self) -> &'static str {
        match self {
            Connection::Ethernet => "ethernet",
            Connection::Wifi => "wifi",
        }
    }
}

/// Wired and wireless LAN clients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanUserTable {
    pub ethernet: Vec<ClientInfo>,
    pub wifi: Vec<ClientInfo>,
}

impl LanUserTable {
    pub fn clients(&self) -> impl Iterator<Item = (Connection, &ClientInfo)> {
        self.ethernet
            .iter()
            .map(|c| (Connection::Ethernet, c))
            .chain(self.wifi.iter().map(|c| (Connection::Wifi, c)))
    }
}

#[derive(Debug, Deserialize)]
pub struct RawLanUserTable {
    #[serde(rename = "Ethernet", default)]
    ethernet: RawClientGroup,
    #[serde(rename = "WIFI", default)]
    wifi: RawClientGroup,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawClientGroup {
    #[serde(rename = "clientinfo", default)]
    clients: Vec<ClientInfo>,
}

impl Record for LanUserTable {
    const FUNCTION: Function = Function::LanUserTable;
    type Raw = RawLanUserTable;

    fn from_raw(raw: RawLanUserTable) -> Result<LanUserTable, DecodeError> {
        Ok(LanUserTable {
            ethernet: raw.ethernet.clients,
            wifi: raw.wifi.clients,
        })
    }
}
