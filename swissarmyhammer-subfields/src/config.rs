//! Session configuration loaded through figment.
//!
//! Sources, later overriding earlier:
//! 1. [`SubfieldsConfig::default`]
//! 2. an optional YAML, TOML, or JSON file
//! 3. `SUBFIELDS_`-prefixed environment variables

use std::path::Path;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::types::{CompositeFieldStorage, SubfieldFieldConfig, SubfieldSpec};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "SUBFIELDS_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubfieldsConfig {
    /// Optional namespace in front of preconfigured compound ids (`field_ui:list_string:colors`).
    pub preset_prefix: String,
    /// When the registry declares `{prefix}{type}`, subfields of `type` are instantiated as it.
    pub type_override_prefix: String,
    /// Field-level defaults merged under every subfield's field config.
    pub fields_default: SubfieldFieldConfig,
    /// Spec given to newly added subfields.
    pub storage_default: SubfieldSpec,
}

impl Default for SubfieldsConfig {
    fn default() -> Self {
        Self {
            preset_prefix: "field_ui".into(),
            type_override_prefix: "composite_".into(),
            fields_default: SubfieldFieldConfig::required(),
            storage_default: SubfieldSpec::default(),
        }
    }
}

impl SubfieldsConfig {
    /// Load defaults, then `path` (format by extension) if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            debug!(path = %path.display(), "loading subfields config file");
            figment = match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Yaml::file(path)),
            };
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract::<Self>()?;
        Ok(config)
    }

    /// A fresh composite storage whose only subfield, and every later
    /// added one, uses the configured `storage_default`.
    pub fn new_storage(
        &self,
        name: impl Into<String>,
        target_entity_type: impl Into<String>,
    ) -> CompositeFieldStorage {
        let mut storage = CompositeFieldStorage::new(name, target_entity_type);
        storage.storage_default = self.storage_default.clone();
        storage.storage.clear();
        storage.add_subfield();
        storage
    }
}
