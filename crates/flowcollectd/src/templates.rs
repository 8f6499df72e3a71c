//! Exporter-announced template registry
//!
//! NetFlow v9 and IPFIX data records carry no layout of their own; exporters
//! announce templates periodically and data sets refer to them by id. The
//! [`TemplateStore`] keeps the most recent announcement per family and id.
//!
//! The store is owned by the decode loop and never shared across tasks, so
//! it carries no synchronization.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// IPFIX variable-length field marker
pub const VARIABLE_LENGTH: u16 = 0xffff;

/// Protocol family a template belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateFamily {
    /// NetFlow version 9 (RFC 3954)
    NetflowV9,
    /// IPFIX (RFC 7011)
    Ipfix,
}

impl fmt::Display for TemplateFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetflowV9 => f.write_str("NetFlow v9"),
            Self::Ipfix => f.write_str("IPFIX"),
        }
    }
}

/// A single field specifier inside a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemplateField {
    /// Field type (IPFIX information element id, enterprise bit stripped)
    pub field_type: u16,
    /// Encoded length in bytes, or [`VARIABLE_LENGTH`]
    pub length: u16,
    /// Private enterprise number for IPFIX enterprise-specific elements
    pub enterprise: Option<u32>,
}

impl TemplateField {
    pub fn new(field_type: u16, length: u16) -> Self {
        Self {
            field_type,
            length,
            enterprise: None,
        }
    }

    #[inline]
    pub fn is_variable_length(&self) -> bool {
        self.length == VARIABLE_LENGTH
    }
}

/// Template definition as announced by an exporter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    pub id: u16,
    pub fields: Vec<TemplateField>,
    /// Number of leading scope fields; non-zero only for options templates
    pub scope_field_count: u16,
}

impl Template {
    pub fn new(id: u16, fields: Vec<TemplateField>) -> Self {
        Self {
            id,
            fields,
            scope_field_count: 0,
        }
    }

    pub fn options(id: u16, fields: Vec<TemplateField>, scope_field_count: u16) -> Self {
        Self {
            id,
            fields,
            scope_field_count,
        }
    }

    #[inline]
    pub fn is_options(&self) -> bool {
        self.scope_field_count > 0
    }

    /// Smallest possible encoded record, counting one length byte per
    /// variable-length field
    pub fn min_record_length(&self) -> usize {
        self.fields
            .iter()
            .map(|f| {
                if f.is_variable_length() {
                    1
                } else {
                    f.length as usize
                }
            })
            .sum()
    }
}

/// Template registry keyed by protocol family and template id
#[derive(Debug, Default)]
pub struct TemplateStore {
    netflow_v9: HashMap<u16, Template>,
    ipfix: HashMap<u16, Template>,
    /// Bumped whenever a template is added or redefined
    generation: u64,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn family(&self, family: TemplateFamily) -> &HashMap<u16, Template> {
        match family {
            TemplateFamily::NetflowV9 => &self.netflow_v9,
            TemplateFamily::Ipfix => &self.ipfix,
        }
    }

    fn family_mut(&mut self, family: TemplateFamily) -> &mut HashMap<u16, Template> {
        match family {
            TemplateFamily::NetflowV9 => &mut self.netflow_v9,
            TemplateFamily::Ipfix => &mut self.ipfix,
        }
    }

    /// Look up a template by id
    pub fn get(&self, family: TemplateFamily, id: u16) -> Option<&Template> {
        self.family(family).get(&id)
    }

    pub fn contains(&self, family: TemplateFamily, id: u16) -> bool {
        self.family(family).contains_key(&id)
    }

    /// Store a template announcement
    ///
    /// Returns true when the id was unknown or its definition changed;
    /// repeated identical announcements (the common case, since exporters
    /// re-send templates periodically) return false.
    pub fn insert(&mut self, family: TemplateFamily, template: Template) -> bool {
        let templates = self.family_mut(family);
        if templates.get(&template.id) == Some(&template) {
            return false;
        }
        templates.insert(template.id, template);
        self.generation += 1;
        true
    }

    /// Forget a template (IPFIX template withdrawal)
    pub fn remove(&mut self, family: TemplateFamily, id: u16) -> Option<Template> {
        self.family_mut(family).remove(&id)
    }

    /// Changes whenever [`insert`](Self::insert) returns true
    ///
    /// Comparing generations before and after a decode tells whether the
    /// packet taught the store anything, even when the decode itself failed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self, family: TemplateFamily) -> usize {
        self.family(family).len()
    }

    pub fn is_empty(&self) -> bool {
        self.netflow_v9.is_empty() && self.ipfix.is_empty()
    }
}
