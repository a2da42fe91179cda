//! Error types for subfield virtualization

use thiserror::Error;

/// Result type for subfield operations
pub type Result<T> = std::result::Result<T, SubfieldError>;

/// Errors that can occur while synthesizing or resolving subfields
#[derive(Debug, Error)]
pub enum SubfieldError {
    /// The field-type registry has no definition for this id
    #[error("unknown field type: {type_id}")]
    UnknownFieldType { type_id: String },

    /// A preconfigured compound id names a preset the base type does not declare
    #[error("unknown preconfigured option '{preset}' for field type {type_id}")]
    UnknownPreset { type_id: String, preset: String },

    /// The widget registry has no plugin with this id
    #[error("unknown widget: {widget_id}")]
    UnknownWidget { widget_id: String },

    /// The formatter registry has no plugin with this id
    #[error("unknown formatter: {formatter_id}")]
    UnknownFormatter { formatter_id: String },

    /// A host plugin refused to construct (incompatible settings and the like)
    #[error("failed to construct plugin '{plugin_id}': {message}")]
    PluginConstruction { plugin_id: String, message: String },

    /// A composite field does not declare the requested subfield
    #[error("field '{field}' has no subfield '{subfield}'")]
    UnknownSubfield { field: String, subfield: String },

    /// Form state has nothing to fork
    #[error("form state carries no edit target")]
    MissingEditTarget,

    /// Configuration could not be extracted
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SubfieldError {
    /// Shorthand for a plugin construction failure.
    pub fn construction(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginConstruction {
            plugin_id: plugin_id.into(),
            message: message.into(),
        }
    }
}

impl From<figment::Error> for SubfieldError {
    fn from(error: figment::Error) -> Self {
        Self::Config(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SubfieldError::UnknownFieldType {
            type_id: "geofield".into(),
        };
        assert_eq!(err.to_string(), "unknown field type: geofield");
    }

    #[test]
    fn test_construction_error() {
        let err = SubfieldError::construction("string_textfield", "size must be positive");
        assert!(err.to_string().contains("string_textfield"));
        assert!(err.to_string().contains("size must be positive"));
    }

    #[test]
    fn test_unknown_preset_names_both_ids() {
        let err = SubfieldError::UnknownPreset {
            type_id: "list_string".into(),
            preset: "colors".into(),
        };
        assert!(err.to_string().contains("list_string"));
        assert!(err.to_string().contains("colors"));
    }
}
