//! Export packet builders shared by the integration tests

#![allow(dead_code)]

use flowcollectd::{CollectorConfig, NetflowListener, ParsedPacket};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

/// Flow fields used by the v9 templates: IPV4_SRC_ADDR, IPV4_DST_ADDR, IN_BYTES
pub const V9_FIELDS: &[(u16, u16)] = &[(8, 4), (12, 4), (1, 4)];

pub fn loopback_config() -> CollectorConfig {
    CollectorConfig::new("127.0.0.1", 0)
}

pub fn started_listener(config: CollectorConfig) -> NetflowListener {
    let mut listener = NetflowListener::bind(config).unwrap();
    listener.start().unwrap();
    listener
}

/// UDP exporter stand-in
pub struct Exporter {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Exporter {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").unwrap(),
            target,
        }
    }

    pub fn send(&self, payload: &[u8]) {
        self.socket.send_to(payload, self.target).unwrap();
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }
}

pub async fn next_packet(listener: &NetflowListener) -> ParsedPacket {
    listener
        .get(true, Some(WAIT))
        .await
        .expect("expected a decoded packet")
}

pub async fn assert_no_packet(listener: &NetflowListener) {
    assert!(
        listener
            .get(true, Some(Duration::from_millis(300)))
            .await
            .is_err()
    );
}

/// NetFlow v5 packet with one record per (src, dst, octets); `sequence`
/// lands in the header's flow_sequence
pub fn v5_packet(sequence: u32, records: &[([u8; 4], [u8; 4], u32)]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&5u16.to_be_bytes());
    buf.extend_from_slice(&(records.len() as u16).to_be_bytes());
    buf.extend_from_slice(&1000u32.to_be_bytes());
    buf.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(&[0, 0, 0, 0]);
    for (src, dst, octets) in records {
        buf.extend_from_slice(src);
        buf.extend_from_slice(dst);
        buf.extend_from_slice(&[0; 4]);
        buf.extend_from_slice(&[0, 1, 0, 2]);
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&octets.to_be_bytes());
        buf.extend_from_slice(&[0; 8]);
        buf.extend_from_slice(&443u16.to_be_bytes());
        buf.extend_from_slice(&51000u16.to_be_bytes());
        buf.extend_from_slice(&[0, 0x10, 6, 0]);
        buf.extend_from_slice(&[0; 8]);
    }
    buf
}

fn v9_header(sequence: u32, flowsets: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&9u16.to_be_bytes());
    buf.extend_from_slice(&flowsets.to_be_bytes());
    buf.extend_from_slice(&5000u32.to_be_bytes());
    buf.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf
}

/// NetFlow v9 packet carrying one template flowset
pub fn v9_template(sequence: u32, template_id: u16, fields: &[(u16, u16)]) -> Vec<u8> {
    let mut buf = v9_header(sequence, 1);
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&((8 + fields.len() * 4) as u16).to_be_bytes());
    buf.extend_from_slice(&template_id.to_be_bytes());
    buf.extend_from_slice(&(fields.len() as u16).to_be_bytes());
    for (ty, len) in fields {
        buf.extend_from_slice(&ty.to_be_bytes());
        buf.extend_from_slice(&len.to_be_bytes());
    }
    buf
}

/// NetFlow v9 data flowset for a [`V9_FIELDS`] template
pub fn v9_data(sequence: u32, template_id: u16, src: [u8; 4], dst: [u8; 4], bytes: u32) -> Vec<u8> {
    let mut record = Vec::new();
    record.extend_from_slice(&src);
    record.extend_from_slice(&dst);
    record.extend_from_slice(&bytes.to_be_bytes());

    let mut buf = v9_header(sequence, 1);
    buf.extend_from_slice(&template_id.to_be_bytes());
    buf.extend_from_slice(&((4 + record.len()) as u16).to_be_bytes());
    buf.extend(record);
    buf
}

/// NetFlow v9 packet announcing `template_id` and carrying a data flowset
/// for `data_template_id`, which the collector has never seen
pub fn v9_template_and_unknown_data(sequence: u32, template_id: u16, data_template_id: u16) -> Vec<u8> {
    let template = v9_template(sequence, template_id, V9_FIELDS);
    let data = v9_data(sequence, data_template_id, [10, 9, 9, 9], [10, 8, 8, 8], 7);

    let mut buf = v9_header(sequence, 2);
    buf.extend_from_slice(&template[20..]);
    buf.extend_from_slice(&data[20..]);
    buf
}

/// IPFIX message with a template set and a matching data set:
/// sourceIPv4Address, destinationIPv4Address, octetDeltaCount (8 bytes)
pub fn ipfix_template_and_data(sequence: u32, template_id: u16, octets: u64) -> Vec<u8> {
    let mut template = Vec::new();
    template.extend_from_slice(&2u16.to_be_bytes());
    template.extend_from_slice(&20u16.to_be_bytes());
    template.extend_from_slice(&template_id.to_be_bytes());
    template.extend_from_slice(&3u16.to_be_bytes());
    template.extend_from_slice(&[0, 8, 0, 4, 0, 12, 0, 4, 0, 1, 0, 8]);

    let mut data = Vec::new();
    data.extend_from_slice(&template_id.to_be_bytes());
    data.extend_from_slice(&20u16.to_be_bytes());
    data.extend_from_slice(&[172, 16, 0, 1, 172, 16, 0, 2]);
    data.extend_from_slice(&octets.to_be_bytes());

    let length = 16 + template.len() + data.len();
    let mut buf = Vec::new();
    buf.extend_from_slice(&10u16.to_be_bytes());
    buf.extend_from_slice(&(length as u16).to_be_bytes());
    buf.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(&7u32.to_be_bytes());
    buf.extend(template);
    buf.extend(data);
    buf
}

/// Datagram whose version field is 99
pub fn unsupported_version_packet() -> Vec<u8> {
    let mut buf = vec![0, 99, 0, 1];
    buf.extend_from_slice(&[0; 20]);
    buf
}
