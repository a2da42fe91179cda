//! Composite field virtualization
//!
//! `swissarmyhammer-subfields` lets one storable composite field present itself
//! as an ordered set of independently typed subfields. Each subfield is handed
//! to the host's field-type, widget, and formatter plugins as if it were a
//! standalone, single-value field.
//!
//! # Architecture
//!
//! - **Session-scoped memoization**: a [`SubfieldSession`] owns every memo table
//!   for one request; fingerprint-equal requests construct at most once
//! - **Fingerprints**: cache keys are MD5 digests of recursively normalized inputs
//! - **Synthetic definitions**: immutable, named `{parent}:{subfield}`, cardinality 1
//! - **Capability interfaces**: the host supplies [`FieldTypeRegistry`],
//!   [`WidgetRegistry`], [`FormatterRegistry`] and [`Record`] implementations
//! - **Flat storage**: composite rows are keyed `{subfield}_{column}`

pub mod composite;
pub mod config;
pub mod definition;
pub mod error;
pub mod fingerprint;
pub mod form_state;
pub mod mapper;
pub mod merge;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod plugin;
pub mod preset;
pub mod record;
pub mod registry;
pub mod session;
pub mod types;

pub use composite::{DisplaySettings, SubfieldDisplay};
pub use config::SubfieldsConfig;
pub use definition::{SubfieldDefinition, SubfieldStorageDefinition};
pub use error::{Result, SubfieldError};
pub use fingerprint::{fingerprint, Fingerprint, Fingerprintable, KeyBuilder, KeyPart};
pub use form_state::{EditTarget, FieldEditTarget, FormState};
pub use plugin::{
    FormatterPlugin, ItemList, ItemSeed, SharedFormatter, SharedItemList, SharedStorage,
    SharedWidget, StoragePlugin, WidgetPlugin,
};
pub use record::{ExplicitValues, Record, RecordRef};
pub use registry::{
    FieldTypeRegistry, FormatterArgs, FormatterRegistry, ItemListArgs, StorageArgs, WidgetArgs,
    WidgetRegistry,
};
pub use session::{SessionStats, SubfieldSession, SubfieldSessionBuilder};
pub use types::{
    ColumnSpec, CompositeFieldConfig, CompositeFieldStorage, CompositeValue, ConstraintSet,
    FieldTypeDefinition, PresetOption, PropertyDefinition, Schema, Settings, SubfieldFieldConfig,
    SubfieldSpec, SubfieldValue,
};
