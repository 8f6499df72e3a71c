//! Fixed-layout NetFlow v1 and v5 decoding
//!
//! Both versions carry 48-byte records behind a fixed header and never
//! depend on templates, so they cannot produce a template miss.

use super::ByteReader;
use crate::error::DecodeError;
use crate::export::{ExportHeader, ExportPacket, FieldValue, FlowRecord, NETFLOW_V1, NETFLOW_V5};
use std::net::Ipv4Addr;

const V1_HEADER_LEN: usize = 16;
const V5_HEADER_LEN: usize = 24;
const RECORD_LEN: usize = 48;

/// Upper bound on the header record count (v1: 24, v5: 30 per Cisco)
const MAX_RECORDS: u16 = 30;

/// Address and counter fields shared by the v1 and v5 record layouts
fn read_common(reader: &mut ByteReader<'_>, record: &mut FlowRecord) -> Result<(), DecodeError> {
    let ipv4 = |v: u32| FieldValue::Ipv4(Ipv4Addr::from(v));
    let unsigned = |v: u32| FieldValue::Unsigned(u64::from(v));

    record.insert("IPV4_SRC_ADDR", ipv4(reader.u32()?));
    record.insert("IPV4_DST_ADDR", ipv4(reader.u32()?));
    record.insert("NEXT_HOP", ipv4(reader.u32()?));
    record.insert("INPUT", unsigned(u32::from(reader.u16()?)));
    record.insert("OUTPUT", unsigned(u32::from(reader.u16()?)));
    record.insert("IN_PACKETS", unsigned(reader.u32()?));
    record.insert("IN_OCTETS", unsigned(reader.u32()?));
    record.insert("FIRST_SWITCHED", unsigned(reader.u32()?));
    record.insert("LAST_SWITCHED", unsigned(reader.u32()?));
    record.insert("SRC_PORT", unsigned(u32::from(reader.u16()?)));
    record.insert("DST_PORT", unsigned(u32::from(reader.u16()?)));
    Ok(())
}

fn check_count(version: u16, count: u16, body_len: usize) -> Result<(), DecodeError> {
    if count > MAX_RECORDS {
        return Err(DecodeError::malformed(
            "fixed export header",
            format!("v{} record count {} exceeds {}", version, count, MAX_RECORDS),
        ));
    }
    let needed = count as usize * RECORD_LEN;
    if body_len < needed {
        return Err(DecodeError::malformed(
            "fixed export records",
            format!(
                "v{} header announces {} records ({} bytes), {} available",
                version, count, needed, body_len
            ),
        ));
    }
    Ok(())
}

pub(super) fn decode_v1(payload: &[u8]) -> Result<ExportPacket, DecodeError> {
    let mut reader = ByteReader::new(payload, "NetFlow v1 header");
    let version = reader.u16()?;
    let count = reader.u16()?;
    let sys_uptime = reader.u32()?;
    let unix_secs = reader.u32()?;
    let _unix_nsecs = reader.u32()?;
    debug_assert_eq!(reader.position(), V1_HEADER_LEN);

    check_count(version, count, reader.remaining())?;

    let mut export = ExportPacket::new(ExportHeader {
        version: NETFLOW_V1,
        count,
        sys_uptime: Some(sys_uptime),
        export_time: unix_secs,
        ..Default::default()
    });

    for _ in 0..count {
        let mut record = FlowRecord::new();
        read_common(&mut reader, &mut record)?;
        reader.skip(2)?;
        record.insert("PROTO", FieldValue::Unsigned(u64::from(reader.u8()?)));
        record.insert("TOS", FieldValue::Unsigned(u64::from(reader.u8()?)));
        record.insert("TCP_FLAGS", FieldValue::Unsigned(u64::from(reader.u8()?)));
        reader.skip(7)?;
        export.flows.push(record);
    }

    Ok(export)
}

pub(super) fn decode_v5(payload: &[u8]) -> Result<ExportPacket, DecodeError> {
    let mut reader = ByteReader::new(payload, "NetFlow v5 header");
    let version = reader.u16()?;
    let count = reader.u16()?;
    let sys_uptime = reader.u32()?;
    let unix_secs = reader.u32()?;
    let _unix_nsecs = reader.u32()?;
    let flow_sequence = reader.u32()?;
    let _engine_type = reader.u8()?;
    let engine_id = reader.u8()?;
    let _sampling_interval = reader.u16()?;
    debug_assert_eq!(reader.position(), V5_HEADER_LEN);

    check_count(version, count, reader.remaining())?;

    let mut export = ExportPacket::new(ExportHeader {
        version: NETFLOW_V5,
        count,
        sys_uptime: Some(sys_uptime),
        export_time: unix_secs,
        sequence: Some(flow_sequence),
        domain_id: Some(u32::from(engine_id)),
        ..Default::default()
    });

    for _ in 0..count {
        let mut record = FlowRecord::new();
        read_common(&mut reader, &mut record)?;
        reader.skip(1)?;
        let unsigned = |v: u16| FieldValue::Unsigned(u64::from(v));
        record.insert("TCP_FLAGS", unsigned(u16::from(reader.u8()?)));
        record.insert("PROTO", unsigned(u16::from(reader.u8()?)));
        record.insert("TOS", unsigned(u16::from(reader.u8()?)));
        record.insert("SRC_AS", unsigned(reader.u16()?));
        record.insert("DST_AS", unsigned(reader.u16()?));
        record.insert("SRC_MASK", unsigned(u16::from(reader.u8()?)));
        record.insert("DST_MASK", unsigned(u16::from(reader.u8()?)));
        reader.skip(2)?;
        export.flows.push(record);
    }

    Ok(export)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v5_packet(records: &[([u8; 4], [u8; 4], u32)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u16.to_be_bytes());
        buf.extend_from_slice(&(records.len() as u16).to_be_bytes());
        buf.extend_from_slice(&1000u32.to_be_bytes());
        buf.extend_from_slice(&1_700_000_000u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&42u32.to_be_bytes());
        buf.extend_from_slice(&[0, 1, 0, 0]);
        for (src, dst, octets) in records {
            buf.extend_from_slice(src);
            buf.extend_from_slice(dst);
            buf.extend_from_slice(&[0; 4]);
            buf.extend_from_slice(&[0, 1, 0, 2]);
            buf.extend_from_slice(&10u32.to_be_bytes());
            buf.extend_from_slice(&octets.to_be_bytes());
            buf.extend_from_slice(&[0; 8]);
            buf.extend_from_slice(&443u16.to_be_bytes());
            buf.extend_from_slice(&51000u16.to_be_bytes());
            buf.extend_from_slice(&[0, 0x12, 6, 0]);
            buf.extend_from_slice(&[0, 100, 0, 200, 24, 16, 0, 0]);
        }
        buf
    }

    #[test]
    fn test_decode_v5_records() {
        let payload = v5_packet(&[([10, 0, 0, 1], [10, 0, 0, 2], 1500), ([10, 0, 0, 3], [10, 0, 0, 4], 64)]);
        let export = decode_v5(&payload).unwrap();

        assert_eq!(export.header.version, 5);
        assert_eq!(export.header.count, 2);
        assert_eq!(export.header.sequence, Some(42));
        assert_eq!(export.header.domain_id, Some(1));
        assert_eq!(export.flows.len(), 2);
        assert!(!export.contains_new_templates);

        let flow = &export.flows[0];
        assert_eq!(
            flow.get("IPV4_SRC_ADDR"),
            Some(&FieldValue::Ipv4(Ipv4Addr::new(10, 0, 0, 1)))
        );
        assert_eq!(flow.get("IN_OCTETS"), Some(&FieldValue::Unsigned(1500)));
        assert_eq!(flow.get("SRC_PORT"), Some(&FieldValue::Unsigned(443)));
        assert_eq!(flow.get("TCP_FLAGS"), Some(&FieldValue::Unsigned(0x12)));
        assert_eq!(flow.get("PROTO"), Some(&FieldValue::Unsigned(6)));
        assert_eq!(flow.get("SRC_AS"), Some(&FieldValue::Unsigned(100)));
        assert_eq!(flow.get("DST_MASK"), Some(&FieldValue::Unsigned(16)));
    }

    #[test]
    fn test_decode_v5_truncated_records() {
        let mut payload = v5_packet(&[([10, 0, 0, 1], [10, 0, 0, 2], 1500)]);
        payload.truncate(payload.len() - 10);
        assert!(matches!(
            decode_v5(&payload),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_v1_record() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&[0; 12]);
        buf.extend_from_slice(&[192, 168, 1, 1, 192, 168, 1, 2, 0, 0, 0, 0]);
        buf.extend_from_slice(&[0; 4]);
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(&180u32.to_be_bytes());
        buf.extend_from_slice(&[0; 8]);
        buf.extend_from_slice(&53u16.to_be_bytes());
        buf.extend_from_slice(&5353u16.to_be_bytes());
        buf.extend_from_slice(&[0, 0, 17, 0, 0]);
        buf.extend_from_slice(&[0; 7]);
        assert_eq!(buf.len(), V1_HEADER_LEN + RECORD_LEN);

        let export = decode_v1(&buf).unwrap();
        let flow = &export.flows[0];
        assert_eq!(flow.get("PROTO"), Some(&FieldValue::Unsigned(17)));
        assert_eq!(flow.get("DST_PORT"), Some(&FieldValue::Unsigned(5353)));
        assert_eq!(flow.get("IN_PACKETS"), Some(&FieldValue::Unsigned(3)));
    }

    #[test]
    fn test_excessive_count_rejected() {
        let mut payload = v5_packet(&[]);
        payload[2..4].copy_from_slice(&500u16.to_be_bytes());
        assert!(decode_v5(&payload).is_err());
    }
}
