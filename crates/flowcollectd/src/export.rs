//! Decoded export packet model
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-3: Content of Audit Records - Flow records carry full address/port detail
//! - SI-4: System Monitoring - Network flow visibility

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Export protocol versions understood by the default decoder
pub const NETFLOW_V1: u16 = 1;
pub const NETFLOW_V5: u16 = 5;
pub const NETFLOW_V9: u16 = 9;
pub const IPFIX: u16 = 10;

/// MAC address representation
///
/// # NIST Controls
/// - IA-3: Device Identification - MAC addresses for device identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 6] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Unsigned(u64),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Mac(MacAddress),
    Text(String),
    /// Fields wider than 8 bytes or of unknown semantics
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Address carried by an IPv4 or IPv6 field
    pub fn as_ip_addr(&self) -> Option<IpAddr> {
        match self {
            Self::Ipv4(addr) => Some(IpAddr::V4(*addr)),
            Self::Ipv6(addr) => Some(IpAddr::V6(*addr)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Ipv4(addr) => write!(f, "{addr}"),
            Self::Ipv6(addr) => write!(f, "{addr}"),
            Self::Mac(mac) => write!(f, "{mac}"),
            Self::Text(text) => f.write_str(text),
            Self::Bytes(bytes) => bytes.iter().try_for_each(|b| write!(f, "{b:02x}")),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unsigned(v) => serializer.serialize_u64(*v),
            _ => serializer.collect_str(self),
        }
    }
}

/// One flow (or options) record: field name to value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FlowRecord {
    pub fields: BTreeMap<String, FieldValue>,
}

impl FlowRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Export packet header, normalized across protocol versions
///
/// `count` is the record count for v1/v5, the flowset count for v9 and
/// zero for IPFIX, whose header carries the message `length` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportHeader {
    pub version: u16,
    pub count: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sys_uptime: Option<u32>,
    /// Export time in seconds since the epoch
    pub export_time: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    /// v9 source id or IPFIX observation domain id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<u32>,
}

/// A fully decoded export packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportPacket {
    pub header: ExportHeader,
    pub flows: Vec<FlowRecord>,
    /// Records decoded through options templates (v9/IPFIX only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub option_records: Vec<FlowRecord>,
    /// True when decoding this packet added or changed a template
    #[serde(skip)]
    pub contains_new_templates: bool,
}

impl ExportPacket {
    pub fn new(header: ExportHeader) -> Self {
        Self {
            header,
            flows: Vec::new(),
            option_records: Vec::new(),
            contains_new_templates: false,
        }
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.header.version
    }

    /// Template-based formats (v9, IPFIX) can introduce templates
    #[inline]
    pub fn is_template_based(&self) -> bool {
        matches!(self.header.version, NETFLOW_V9 | IPFIX)
    }
}
