//! Host records that own composite field values.

use crate::fingerprint::{Fingerprintable, KeyPart};
use crate::plugin::SharedItemList;
use crate::types::CompositeValue;

/// Identity of the record an item list is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordRef {
    pub entity_type: String,
    pub id: Option<String>,
    pub revision_id: Option<String>,
    /// True when this is the pre-change shadow copy.
    pub original: bool,
}

/// A record carrying composite field values, as exposed by the host.
pub trait Record {
    fn entity_type_id(&self) -> &str;

    fn id(&self) -> Option<String>;

    fn revision_id(&self) -> Option<String>;

    /// Extra identity for records that have no id yet.
    fn uuid(&self) -> Option<String> {
        None
    }

    /// The composite row stored for `field` at `delta`, if any.
    fn field_value(&self, field: &str, delta: usize) -> Option<CompositeValue>;

    /// Number of deltas stored for `field`.
    fn field_len(&self, field: &str) -> usize;

    /// The unmodified copy kept alongside an in-progress edit.
    fn original(&self) -> Option<&dyn Record> {
        None
    }

    /// Whether this record is itself a shadow copy.
    fn is_original(&self) -> bool {
        false
    }

    /// Attach a materialized subfield item list to this record.
    fn attach_subfield_items(&self, subfield_name: &str, delta: usize, items: SharedItemList);

    fn typed_data(&self) -> RecordRef {
        RecordRef {
            entity_type: self.entity_type_id().to_string(),
            id: self.id(),
            revision_id: self.revision_id(),
            original: self.is_original(),
        }
    }
}

/// Explicit values handed to item-list materialization.
#[derive(Debug, Clone, PartialEq)]
pub enum ExplicitValues {
    /// Use this row instead of reading the record.
    Row(CompositeValue),
    /// Materializing against the shadow copy; read the record as usual.
    Original,
}

impl Fingerprintable for ExplicitValues {
    fn key_part(&self) -> KeyPart {
        match self {
            ExplicitValues::Row(row) => row.key_part(),
            ExplicitValues::Original => KeyPart::Token("original".into()),
        }
    }
}

impl Fingerprintable for dyn Record + '_ {
    fn key_part(&self) -> KeyPart {
        KeyPart::map([
            ("type", self.entity_type_id().key_part()),
            ("id", self.id().key_part()),
            ("revision", self.revision_id().key_part()),
            ("uuid", self.uuid().key_part()),
        ])
    }
}
