//! NetFlow v9 decoding (RFC 3954)
//!
//! Template flowsets are registered before any data flowset is decoded, so
//! a packet carrying both a template and data for it decodes in one pass
//! regardless of flowset order.

use super::fields::{field_name, field_value};
use super::{ByteReader, RawSet, decode_records, split_sets};
use crate::error::DecodeError;
use crate::export::{ExportHeader, ExportPacket, NETFLOW_V9};
use crate::templates::{Template, TemplateFamily, TemplateField, TemplateStore};
use tracing::trace;

const HEADER_LEN: usize = 20;
const TEMPLATE_FLOWSET_ID: u16 = 0;
const OPTIONS_TEMPLATE_FLOWSET_ID: u16 = 1;
const MIN_DATA_FLOWSET_ID: u16 = 256;

pub(super) fn decode(
    payload: &[u8],
    templates: &mut TemplateStore,
) -> Result<ExportPacket, DecodeError> {
    let mut reader = ByteReader::new(payload, "NetFlow v9 header");
    let header = ExportHeader {
        version: reader.u16()?,
        count: reader.u16()?,
        sys_uptime: Some(reader.u32()?),
        export_time: reader.u32()?,
        sequence: Some(reader.u32()?),
        domain_id: Some(reader.u32()?),
        ..Default::default()
    };
    debug_assert_eq!(header.version, NETFLOW_V9);

    let sets = split_sets(&payload[HEADER_LEN..], "NetFlow v9 flowset")?;
    let mut export = ExportPacket::new(header);

    for set in &sets {
        let announced = match set.id {
            TEMPLATE_FLOWSET_ID => parse_templates(set)?,
            OPTIONS_TEMPLATE_FLOWSET_ID => parse_options_templates(set)?,
            _ => continue,
        };
        for template in announced {
            trace!(
                template_id = template.id,
                fields = template.fields.len(),
                "NetFlow v9 template"
            );
            if templates.insert(TemplateFamily::NetflowV9, template) {
                export.contains_new_templates = true;
            }
        }
    }

    for set in sets.iter().filter(|s| s.id >= MIN_DATA_FLOWSET_ID) {
        let template = templates
            .get(TemplateFamily::NetflowV9, set.id)
            .ok_or(DecodeError::TemplateNotRecognized {
                family: TemplateFamily::NetflowV9,
                template_id: set.id,
            })?;

        let records = decode_records(set.body, template, "NetFlow v9 data flowset", |field, raw| {
            (field_name(TemplateFamily::NetflowV9, field), field_value(field, raw))
        })?;

        if template.is_options() {
            export.option_records.extend(records);
        } else {
            export.flows.extend(records);
        }
    }

    Ok(export)
}

fn parse_templates(set: &RawSet<'_>) -> Result<Vec<Template>, DecodeError> {
    let mut reader = ByteReader::new(set.body, "NetFlow v9 template flowset");
    let mut templates = Vec::new();

    while reader.remaining() >= 4 {
        let id = reader.u16()?;
        let field_count = reader.u16()?;
        let fields = (0..field_count)
            .map(|_| -> Result<TemplateField, DecodeError> {
                Ok(TemplateField::new(reader.u16()?, reader.u16()?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        check_template_id(id)?;
        templates.push(Template::new(id, fields));
    }

    Ok(templates)
}

fn parse_options_templates(set: &RawSet<'_>) -> Result<Vec<Template>, DecodeError> {
    let mut reader = ByteReader::new(set.body, "NetFlow v9 options template flowset");
    let mut templates = Vec::new();

    // Options template flowsets are padded to a 4-byte boundary
    while reader.remaining() >= 6 {
        let id = reader.u16()?;
        let scope_len = reader.u16()? as usize;
        let option_len = reader.u16()? as usize;
        if scope_len % 4 != 0 || option_len % 4 != 0 {
            return Err(DecodeError::malformed(
                "NetFlow v9 options template",
                format!(
                    "template {} scope/option lengths {}/{} not multiples of 4",
                    id, scope_len, option_len
                ),
            ));
        }

        let field_count = (scope_len + option_len) / 4;
        let fields = (0..field_count)
            .map(|_| -> Result<TemplateField, DecodeError> {
                Ok(TemplateField::new(reader.u16()?, reader.u16()?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        check_template_id(id)?;
        templates.push(Template::options(id, fields, (scope_len / 4) as u16));
    }

    Ok(templates)
}

fn check_template_id(id: u16) -> Result<(), DecodeError> {
    if id < MIN_DATA_FLOWSET_ID {
        return Err(DecodeError::malformed(
            "NetFlow v9 template",
            format!("template id {} below {}", id, MIN_DATA_FLOWSET_ID),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::FieldValue;
    use std::net::Ipv4Addr;

    fn header(flowsets: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&9u16.to_be_bytes());
        buf.extend_from_slice(&flowsets.to_be_bytes());
        buf.extend_from_slice(&5000u32.to_be_bytes());
        buf.extend_from_slice(&1_700_000_000u32.to_be_bytes());
        buf.extend_from_slice(&7u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf
    }

    fn template_flowset(id: u16, fields: &[(u16, u16)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&((8 + fields.len() * 4) as u16).to_be_bytes());
        buf.extend_from_slice(&id.to_be_bytes());
        buf.extend_from_slice(&(fields.len() as u16).to_be_bytes());
        for (ty, len) in fields {
            buf.extend_from_slice(&ty.to_be_bytes());
            buf.extend_from_slice(&len.to_be_bytes());
        }
        buf
    }

    fn data_flowset(id: u16, body: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&id.to_be_bytes());
        buf.extend_from_slice(&((4 + body.len()) as u16).to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    const FIELDS: &[(u16, u16)] = &[(8, 4), (12, 4), (1, 4)];
    const RECORD: &[u8] = &[10, 0, 0, 1, 10, 0, 0, 2, 0, 0, 0x05, 0xdc];

    #[test]
    fn test_data_before_template_is_a_miss() {
        let mut store = TemplateStore::new();
        let mut packet = header(1);
        packet.extend(data_flowset(256, RECORD));

        assert_eq!(
            decode(&packet, &mut store),
            Err(DecodeError::TemplateNotRecognized {
                family: TemplateFamily::NetflowV9,
                template_id: 256,
            })
        );
    }

    #[test]
    fn test_template_then_data() {
        let mut store = TemplateStore::new();

        let mut tpl = header(1);
        tpl.extend(template_flowset(256, FIELDS));
        let export = decode(&tpl, &mut store).unwrap();
        assert!(export.contains_new_templates);
        assert!(export.flows.is_empty());
        assert!(store.contains(TemplateFamily::NetflowV9, 256));

        let mut data = header(1);
        data.extend(data_flowset(256, RECORD));
        let export = decode(&data, &mut store).unwrap();
        assert!(!export.contains_new_templates);
        assert_eq!(export.flows.len(), 1);
        assert_eq!(
            export.flows[0].get("IPV4_DST_ADDR"),
            Some(&FieldValue::Ipv4(Ipv4Addr::new(10, 0, 0, 2)))
        );
        assert_eq!(export.flows[0].get("IN_BYTES"), Some(&FieldValue::Unsigned(1500)));
    }

    #[test]
    fn test_same_packet_data_before_template() {
        let mut store = TemplateStore::new();
        let mut packet = header(2);
        packet.extend(data_flowset(256, RECORD));
        packet.extend(template_flowset(256, FIELDS));

        let export = decode(&packet, &mut store).unwrap();
        assert!(export.contains_new_templates);
        assert_eq!(export.flows.len(), 1);
    }

    #[test]
    fn test_reannounced_template_is_not_new() {
        let mut store = TemplateStore::new();
        let mut tpl = header(1);
        tpl.extend(template_flowset(256, FIELDS));

        assert!(decode(&tpl, &mut store).unwrap().contains_new_templates);
        assert!(!decode(&tpl, &mut store).unwrap().contains_new_templates);
    }

    #[test]
    fn test_data_flowset_padding_ignored() {
        let mut store = TemplateStore::new();
        let mut packet = header(2);
        packet.extend(template_flowset(256, FIELDS));
        let mut body = RECORD.to_vec();
        body.extend_from_slice(&[0, 0, 0, 0]);
        packet.extend(data_flowset(256, &body));

        assert_eq!(decode(&packet, &mut store).unwrap().flows.len(), 1);
    }

    #[test]
    fn test_options_template_records() {
        let mut store = TemplateStore::new();
        let mut packet = header(2);

        // options template 257: scope SYSTEM(1, 4), option SAMPLING_INTERVAL(34, 4)
        let mut opts = Vec::new();
        opts.extend_from_slice(&1u16.to_be_bytes());
        opts.extend_from_slice(&20u16.to_be_bytes());
        opts.extend_from_slice(&257u16.to_be_bytes());
        opts.extend_from_slice(&4u16.to_be_bytes());
        opts.extend_from_slice(&4u16.to_be_bytes());
        opts.extend_from_slice(&[0, 1, 0, 4, 0, 34, 0, 4]);
        opts.extend_from_slice(&[0, 0]);
        packet.extend(opts);
        packet.extend(data_flowset(257, &[0, 0, 0, 1, 0, 0, 0, 100]));

        let export = decode(&packet, &mut store).unwrap();
        assert!(export.flows.is_empty());
        assert_eq!(export.option_records.len(), 1);
        assert_eq!(
            export.option_records[0].get("SAMPLING_INTERVAL"),
            Some(&FieldValue::Unsigned(100))
        );
        assert!(store.get(TemplateFamily::NetflowV9, 257).unwrap().is_options());
    }

    #[test]
    fn test_truncated_header() {
        let mut store = TemplateStore::new();
        assert!(matches!(
            decode(&[0, 9, 0, 1, 0, 0], &mut store),
            Err(DecodeError::Malformed { .. })
        ));
    }
}
