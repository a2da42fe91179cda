//! Settings merging with one documented precedence.
//!
//! Subfield settings come from up to three layers: the field type's declared
//! defaults, a preconfigured option's settings, and the settings the site
//! builder set explicitly. Precedence is always
//! `explicit > preset > type default`.
//!
//! Merging is recursive for nested maps only. Any other value, including
//! lists, is replaced wholesale by the higher layer, so an explicit
//! `allowed_values: [x]` is never unioned with a preset's list.

use serde_json::Value;

use crate::types::Settings;

/// Overlay `overlay` on `base`, recursing into maps present in both.
pub fn merge_deep(base: &Settings, overlay: &Settings) -> Settings {
    let mut merged = base.clone();
    for (key, value) in overlay {
        match (merged.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                *existing = merge_deep(existing, incoming);
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Resolve a subfield's storage settings from its three layers.
pub fn resolve_storage_settings(
    type_defaults: &Settings,
    preset: Option<&Settings>,
    explicit: &Settings,
) -> Settings {
    let layered = match preset {
        Some(preset) => merge_deep(type_defaults, preset),
        None => type_defaults.clone(),
    };
    merge_deep(&layered, explicit)
}
