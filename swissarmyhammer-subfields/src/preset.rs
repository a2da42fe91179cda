//! Preconfigured compound type ids.
//!
//! A subfield type may name a preset of a base type, either as
//! `base:preset` or with a leading namespace, `field_ui:base:preset`.

use crate::error::{Result, SubfieldError};
use crate::registry::FieldTypeRegistry;
use crate::types::Settings;

/// A type id split into its base type and optional preset key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRef<'a> {
    pub base_type: &'a str,
    pub preset: Option<&'a str>,
}

impl<'a> TypeRef<'a> {
    /// Split `type_id`, ignoring a leading `{namespace}:`.
    pub fn parse(type_id: &'a str, namespace: &str) -> Self {
        let unprefixed = type_id
            .strip_prefix(namespace)
            .and_then(|rest| rest.strip_prefix(':'))
            .filter(|_| !namespace.is_empty())
            .unwrap_or(type_id);
        match unprefixed.split_once(':') {
            Some((base_type, preset)) => Self {
                base_type,
                preset: Some(preset),
            },
            None => Self {
                base_type: unprefixed,
                preset: None,
            },
        }
    }
}

/// A type id resolved against the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedType {
    pub base_type: String,
    pub preset_settings: Option<Settings>,
    pub default_settings: Settings,
}

/// Resolve `type_id` into its base type, preset settings, and type defaults.
///
/// Unknown base types and unknown presets propagate as errors.
pub fn expand(
    registry: &dyn FieldTypeRegistry,
    type_id: &str,
    namespace: &str,
) -> Result<ExpandedType> {
    let type_ref = TypeRef::parse(type_id, namespace);
    let definition = registry.definition(type_ref.base_type)?;
    let preset_settings = match type_ref.preset {
        Some(preset) => {
            let option = definition.preconfigured_options.get(preset).ok_or_else(|| {
                SubfieldError::UnknownPreset {
                    type_id: type_ref.base_type.to_string(),
                    preset: preset.to_string(),
                }
            })?;
            Some(option.storage_settings.clone())
        }
        None => None,
    };
    Ok(ExpandedType {
        base_type: type_ref.base_type.to_string(),
        preset_settings,
        default_settings: definition.default_storage_settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFieldTypes;
    use serde_json::json;

    #[test]
    fn parse_plain_type() {
        let t = TypeRef::parse("string", "field_ui");
        assert_eq!(t.base_type, "string");
        assert_eq!(t.preset, None);
    }

    #[test]
    fn parse_preset_with_and_without_namespace() {
        let short = TypeRef::parse("list_string:preset_a", "field_ui");
        let long = TypeRef::parse("field_ui:list_string:preset_a", "field_ui");
        assert_eq!(short, long);
        assert_eq!(short.base_type, "list_string");
        assert_eq!(short.preset, Some("preset_a"));
    }

    #[test]
    fn empty_namespace_is_not_stripped() {
        let t = TypeRef::parse(":string", "");
        assert_eq!(t.base_type, "");
        assert_eq!(t.preset, Some("string"));
    }

    #[test]
    fn expand_returns_preset_settings() {
        let registry = MockFieldTypes::standard();
        let expanded = expand(&registry, "list_string:preset_a", "field_ui").unwrap();
        assert_eq!(expanded.base_type, "list_string");
        assert_eq!(
            expanded.preset_settings.unwrap().get("allowed_values"),
            Some(&json!(["a", "b"]))
        );
    }

    #[test]
    fn expand_unknown_type_propagates() {
        let registry = MockFieldTypes::standard();
        let err = expand(&registry, "geofield", "field_ui").unwrap_err();
        assert!(matches!(err, SubfieldError::UnknownFieldType { .. }));
    }

    #[test]
    fn expand_unknown_preset_errors() {
        let registry = MockFieldTypes::standard();
        let err = expand(&registry, "list_string:missing", "field_ui").unwrap_err();
        assert!(matches!(err, SubfieldError::UnknownPreset { .. }));
    }
}
