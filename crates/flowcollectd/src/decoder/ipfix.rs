//! IPFIX decoding (RFC 7011)

use super::fields::{field_name, field_value};
use super::{ByteReader, RawSet, decode_records, split_sets};
use crate::error::DecodeError;
use crate::export::{ExportHeader, ExportPacket};
use crate::templates::{Template, TemplateFamily, TemplateField, TemplateStore};
use tracing::{debug, trace};

const HEADER_LEN: usize = 16;
const TEMPLATE_SET_ID: u16 = 2;
const OPTIONS_TEMPLATE_SET_ID: u16 = 3;
const MIN_DATA_SET_ID: u16 = 256;
const ENTERPRISE_BIT: u16 = 0x8000;

/// Announcement parsed from a template set
enum Announcement {
    Define(Template),
    /// Template record with zero fields withdraws the id
    Withdraw(u16),
}

pub(super) fn decode(
    payload: &[u8],
    templates: &mut TemplateStore,
) -> Result<ExportPacket, DecodeError> {
    let mut reader = ByteReader::new(payload, "IPFIX header");
    let header = ExportHeader {
        version: reader.u16()?,
        length: Some(reader.u16()?),
        export_time: reader.u32()?,
        sequence: Some(reader.u32()?),
        domain_id: Some(reader.u32()?),
        ..Default::default()
    };

    // The message length bounds the sets; anything past it is ignored
    let declared = header.length.unwrap_or_default() as usize;
    if declared < HEADER_LEN || declared > payload.len() {
        return Err(DecodeError::malformed(
            "IPFIX header",
            format!(
                "message length {} outside {}..={}",
                declared,
                HEADER_LEN,
                payload.len()
            ),
        ));
    }

    let sets = split_sets(&payload[HEADER_LEN..declared], "IPFIX set")?;
    let mut export = ExportPacket::new(header);

    for set in &sets {
        let announcements = match set.id {
            TEMPLATE_SET_ID => parse_templates(set, false)?,
            OPTIONS_TEMPLATE_SET_ID => parse_templates(set, true)?,
            _ => continue,
        };
        for announcement in announcements {
            match announcement {
                Announcement::Define(template) => {
                    trace!(
                        template_id = template.id,
                        fields = template.fields.len(),
                        "IPFIX template"
                    );
                    if templates.insert(TemplateFamily::Ipfix, template) {
                        export.contains_new_templates = true;
                    }
                }
                Announcement::Withdraw(id) => {
                    debug!(template_id = id, "IPFIX template withdrawn");
                    templates.remove(TemplateFamily::Ipfix, id);
                }
            }
        }
    }

    for set in sets.iter().filter(|s| s.id >= MIN_DATA_SET_ID) {
        let template = templates
            .get(TemplateFamily::Ipfix, set.id)
            .ok_or(DecodeError::TemplateNotRecognized {
                family: TemplateFamily::Ipfix,
                template_id: set.id,
            })?;

        let records = decode_records(set.body, template, "IPFIX data set", |field, raw| {
            (field_name(TemplateFamily::Ipfix, field), field_value(field, raw))
        })?;

        if template.is_options() {
            export.option_records.extend(records);
        } else {
            export.flows.extend(records);
        }
    }

    Ok(export)
}

fn parse_templates(set: &RawSet<'_>, options: bool) -> Result<Vec<Announcement>, DecodeError> {
    let context = if options {
        "IPFIX options template set"
    } else {
        "IPFIX template set"
    };
    let mut reader = ByteReader::new(set.body, context);
    let mut announcements = Vec::new();

    while reader.remaining() >= 4 {
        let id = reader.u16()?;
        let field_count = reader.u16()?;
        if id < MIN_DATA_SET_ID {
            return Err(DecodeError::malformed(
                context,
                format!("template id {} below {}", id, MIN_DATA_SET_ID),
            ));
        }
        if field_count == 0 {
            announcements.push(Announcement::Withdraw(id));
            continue;
        }

        let scope_field_count = if options { reader.u16()? } else { 0 };
        if scope_field_count > field_count {
            return Err(DecodeError::malformed(
                context,
                format!(
                    "template {} scope count {} exceeds field count {}",
                    id, scope_field_count, field_count
                ),
            ));
        }

        let fields = (0..field_count)
            .map(|_| read_field_specifier(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;

        let template = if options {
            Template::options(id, fields, scope_field_count)
        } else {
            Template::new(id, fields)
        };
        announcements.push(Announcement::Define(template));
    }

    Ok(announcements)
}

fn read_field_specifier(reader: &mut ByteReader<'_>) -> Result<TemplateField, DecodeError> {
    let raw_id = reader.u16()?;
    let length = reader.u16()?;
    let enterprise = if raw_id & ENTERPRISE_BIT != 0 {
        Some(reader.u32()?)
    } else {
        None
    };
    Ok(TemplateField {
        field_type: raw_id & !ENTERPRISE_BIT,
        length,
        enterprise,
    })
}
