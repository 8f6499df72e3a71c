//! CIDR filtering of decoded flows
//!
//! A flow is kept when its source or destination address falls inside any
//! configured block. NetFlow v9/v1/v5 and IPFIX name the address fields
//! differently; both spellings are checked for IPv4 and IPv6.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AC-4: Information Flow Enforcement - Only flows for monitored networks are kept
//! - SI-4: System Monitoring - Scope collection to configured address ranges

use crate::export::{ExportPacket, FlowRecord};
use ipnet::IpNet;
use std::net::IpAddr;

/// Source and destination address field names across export formats
const ADDRESS_FIELDS: &[&str] = &[
    "IPV4_SRC_ADDR",
    "IPV4_DST_ADDR",
    "IPV6_SRC_ADDR",
    "IPV6_DST_ADDR",
    "sourceIPv4Address",
    "destinationIPv4Address",
    "sourceIPv6Address",
    "destinationIPv6Address",
];

/// Set of address blocks flows are matched against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CidrFilter {
    blocks: Vec<IpNet>,
}

impl CidrFilter {
    pub fn new(blocks: Vec<IpNet>) -> Self {
        Self { blocks }
    }

    /// No blocks configured; every flow passes
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        self.blocks.iter().any(|block| block.contains(&addr))
    }

    /// Whether the flow's source or destination is inside a block
    ///
    /// Flows without any address field never match a non-empty filter.
    pub fn matches(&self, flow: &FlowRecord) -> bool {
        if self.is_empty() {
            return true;
        }
        ADDRESS_FIELDS
            .iter()
            .filter_map(|name| flow.get(name).and_then(|value| value.as_ip_addr()))
            .any(|addr| self.contains(addr))
    }

    /// Drop non-matching flows in place, returning how many remain
    pub fn retain(&self, export: &mut ExportPacket) -> usize {
        if !self.is_empty() {
            export.flows.retain(|flow| self.matches(flow));
        }
        export.flows.len()
    }
}
