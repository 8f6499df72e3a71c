//! Field type names and value interpretation for template-based records
//!
//! NetFlow v9 records are keyed by the Cisco field names (RFC 3954 §8) and
//! IPFIX records by the IANA information element names (RFC 7012), matching
//! what downstream flow tooling expects.

use crate::export::{FieldValue, MacAddress};
use crate::templates::{TemplateFamily, TemplateField};
use std::net::{Ipv4Addr, Ipv6Addr};

/// NetFlow v9 field names (RFC 3954)
const V9_FIELD_NAMES: &[(u16, &str)] = &[
    (1, "IN_BYTES"),
    (2, "IN_PKTS"),
    (3, "FLOWS"),
    (4, "PROTOCOL"),
    (5, "SRC_TOS"),
    (6, "TCP_FLAGS"),
    (7, "L4_SRC_PORT"),
    (8, "IPV4_SRC_ADDR"),
    (9, "SRC_MASK"),
    (10, "INPUT_SNMP"),
    (11, "L4_DST_PORT"),
    (12, "IPV4_DST_ADDR"),
    (13, "DST_MASK"),
    (14, "OUTPUT_SNMP"),
    (15, "IPV4_NEXT_HOP"),
    (16, "SRC_AS"),
    (17, "DST_AS"),
    (18, "BGP_IPV4_NEXT_HOP"),
    (19, "MUL_DST_PKTS"),
    (20, "MUL_DST_BYTES"),
    (21, "LAST_SWITCHED"),
    (22, "FIRST_SWITCHED"),
    (23, "OUT_BYTES"),
    (24, "OUT_PKTS"),
    (25, "MIN_PKT_LNGTH"),
    (26, "MAX_PKT_LNGTH"),
    (27, "IPV6_SRC_ADDR"),
    (28, "IPV6_DST_ADDR"),
    (29, "IPV6_SRC_MASK"),
    (30, "IPV6_DST_MASK"),
    (31, "IPV6_FLOW_LABEL"),
    (32, "ICMP_TYPE"),
    (33, "MUL_IGMP_TYPE"),
    (34, "SAMPLING_INTERVAL"),
    (35, "SAMPLING_ALGORITHM"),
    (36, "FLOW_ACTIVE_TIMEOUT"),
    (37, "FLOW_INACTIVE_TIMEOUT"),
    (38, "ENGINE_TYPE"),
    (39, "ENGINE_ID"),
    (40, "TOTAL_BYTES_EXP"),
    (41, "TOTAL_PKTS_EXP"),
    (42, "TOTAL_FLOWS_EXP"),
    (44, "IPV4_SRC_PREFIX"),
    (45, "IPV4_DST_PREFIX"),
    (46, "MPLS_TOP_LABEL_TYPE"),
    (47, "MPLS_TOP_LABEL_IP_ADDR"),
    (48, "FLOW_SAMPLER_ID"),
    (49, "FLOW_SAMPLER_MODE"),
    (50, "FLOW_SAMPLER_RANDOM_INTERVAL"),
    (52, "MIN_TTL"),
    (53, "MAX_TTL"),
    (54, "IPV4_IDENT"),
    (55, "DST_TOS"),
    (56, "IN_SRC_MAC"),
    (57, "OUT_DST_MAC"),
    (58, "SRC_VLAN"),
    (59, "DST_VLAN"),
    (60, "IP_PROTOCOL_VERSION"),
    (61, "DIRECTION"),
    (62, "IPV6_NEXT_HOP"),
    (63, "BPG_IPV6_NEXT_HOP"),
    (64, "IPV6_OPTION_HEADERS"),
    (70, "MPLS_LABEL_1"),
    (71, "MPLS_LABEL_2"),
    (72, "MPLS_LABEL_3"),
    (80, "IN_DST_MAC"),
    (81, "OUT_SRC_MAC"),
    (82, "IF_NAME"),
    (83, "IF_DESC"),
    (84, "SAMPLER_NAME"),
    (85, "IN_PERMANENT_BYTES"),
    (86, "IN_PERMANENT_PKTS"),
    (89, "FORWARDING_STATUS"),
    (150, "FLOW_START_SECONDS"),
    (151, "FLOW_END_SECONDS"),
    (152, "FLOW_START_MILLISECONDS"),
    (153, "FLOW_END_MILLISECONDS"),
];

/// IPFIX information element names (IANA registry)
const IPFIX_FIELD_NAMES: &[(u16, &str)] = &[
    (1, "octetDeltaCount"),
    (2, "packetDeltaCount"),
    (3, "deltaFlowCount"),
    (4, "protocolIdentifier"),
    (5, "ipClassOfService"),
    (6, "tcpControlBits"),
    (7, "sourceTransportPort"),
    (8, "sourceIPv4Address"),
    (9, "sourceIPv4PrefixLength"),
    (10, "ingressInterface"),
    (11, "destinationTransportPort"),
    (12, "destinationIPv4Address"),
    (13, "destinationIPv4PrefixLength"),
    (14, "egressInterface"),
    (15, "ipNextHopIPv4Address"),
    (16, "bgpSourceAsNumber"),
    (17, "bgpDestinationAsNumber"),
    (18, "bgpNextHopIPv4Address"),
    (21, "flowEndSysUpTime"),
    (22, "flowStartSysUpTime"),
    (23, "postOctetDeltaCount"),
    (24, "postPacketDeltaCount"),
    (27, "sourceIPv6Address"),
    (28, "destinationIPv6Address"),
    (29, "sourceIPv6PrefixLength"),
    (30, "destinationIPv6PrefixLength"),
    (31, "flowLabelIPv6"),
    (32, "icmpTypeCodeIPv4"),
    (56, "sourceMacAddress"),
    (57, "postDestinationMacAddress"),
    (58, "vlanId"),
    (59, "postVlanId"),
    (60, "ipVersion"),
    (61, "flowDirection"),
    (62, "ipNextHopIPv6Address"),
    (63, "bgpNextHopIPv6Address"),
    (80, "destinationMacAddress"),
    (81, "postSourceMacAddress"),
    (82, "interfaceName"),
    (83, "interfaceDescription"),
    (85, "octetTotalCount"),
    (86, "packetTotalCount"),
    (89, "forwardingStatus"),
    (130, "exporterIPv4Address"),
    (131, "exporterIPv6Address"),
    (136, "flowEndReason"),
    (139, "icmpTypeCodeIPv6"),
    (148, "flowId"),
    (150, "flowStartSeconds"),
    (151, "flowEndSeconds"),
    (152, "flowStartMilliseconds"),
    (153, "flowEndMilliseconds"),
    (176, "icmpTypeIPv4"),
    (177, "icmpCodeIPv4"),
    (225, "postNATSourceIPv4Address"),
    (226, "postNATDestinationIPv4Address"),
    (227, "postNAPTSourceTransportPort"),
    (228, "postNAPTDestinationTransportPort"),
];

const IPV4_FIELDS: &[u16] = &[8, 12, 15, 18, 44, 45, 47, 130, 225, 226];
const IPV6_FIELDS: &[u16] = &[27, 28, 62, 63, 131];
const MAC_FIELDS: &[u16] = &[56, 57, 80, 81];
const TEXT_FIELDS: &[u16] = &[82, 83, 84];

/// Name of a field type within a protocol family
///
/// Unknown types render as `FIELD_<id>`; enterprise-specific IPFIX elements
/// as `ENTERPRISE_<pen>_<id>`.
pub fn field_name(family: TemplateFamily, field: &TemplateField) -> String {
    if let Some(pen) = field.enterprise {
        return format!("ENTERPRISE_{}_{}", pen, field.field_type);
    }

    let table = match family {
        TemplateFamily::NetflowV9 => V9_FIELD_NAMES,
        TemplateFamily::Ipfix => IPFIX_FIELD_NAMES,
    };
    table
        .iter()
        .find(|(id, _)| *id == field.field_type)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| format!("FIELD_{}", field.field_type))
}

/// Interpret raw field bytes
pub(crate) fn field_value(field: &TemplateField, raw: &[u8]) -> FieldValue {
    if field.enterprise.is_none() {
        let id = field.field_type;
        if IPV4_FIELDS.contains(&id) {
            if let Ok(octets) = <[u8; 4]>::try_from(raw) {
                return FieldValue::Ipv4(Ipv4Addr::from(octets));
            }
        }
        if IPV6_FIELDS.contains(&id) {
            if let Ok(octets) = <[u8; 16]>::try_from(raw) {
                return FieldValue::Ipv6(Ipv6Addr::from(octets));
            }
        }
        if MAC_FIELDS.contains(&id) {
            if let Some(mac) = MacAddress::from_slice(raw) {
                return FieldValue::Mac(mac);
            }
        }
        if TEXT_FIELDS.contains(&id) {
            let text = String::from_utf8_lossy(raw);
            return FieldValue::Text(text.trim_end_matches('\0').to_string());
        }
    }

    unsigned_value(raw)
}

/// Big-endian unsigned integer for widths up to 8 bytes, raw bytes beyond
pub(crate) fn unsigned_value(raw: &[u8]) -> FieldValue {
    if raw.len() > 8 {
        return FieldValue::Bytes(raw.to_vec());
    }
    FieldValue::Unsigned(raw.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}
