use std::path::PathBuf;
use thiserror::Error;

/// A malformed schema. These are programmer errors: they are raised while
/// the field tree is built, never during resolution.
#[derive(Debug, Error, PartialEq)]
#[cfg_attr(feature = "rich-errors", derive(miette::Diagnostic))]
pub enum SchemaError {
    #[error("Record '{name}' has no settable fields")]
    EmptyRecord { name: String },

    #[error("Value for 'required' tag on '{path}' can only be \"true\", got {value:?}")]
    InvalidRequiredTag { path: String, value: String },

    #[error("Field '{second}' duplicates {kind} key '{key}' of field '{first}'")]
    DuplicateField {
        kind: String,
        key: String,
        first: String,
        second: String,
    },

    #[error("Invalid schema file: {0}")]
    InvalidSchemaFile(String),

    #[error("Unknown type '{ty}' for field '{field}' in schema file")]
    UnknownType { field: String, ty: String },
}

/// Failure of a file decoder.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[cfg(feature = "yaml")]
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[cfg(feature = "dotenv")]
    #[error(transparent)]
    Dotenv(#[from] dotenvy::Error),

    #[error("top-level value must be a table of keys")]
    NotATable,

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Error)]
#[cfg_attr(feature = "rich-errors", derive(miette::Diagnostic))]
pub enum LayerfigError {
    #[error("File format '{ext}' of {path} isn't supported")]
    UnsupportedFormat { path: PathBuf, ext: String },

    #[error("Config file {path} not found")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    ParseError { path: PathBuf, source: DecodeError },

    #[error("Invalid value {literal:?} for '{path}': {reason}")]
    Coercion {
        path: String,
        literal: String,
        reason: String,
    },

    #[error("Unknown field '{key}' in {path} (see allow_unknown_fields)")]
    UnknownField { key: String, path: PathBuf },

    #[error("Unknown environment variable {key}={value} (see allow_unknown_envs)")]
    UnknownEnv { key: String, value: String },

    #[error("Unknown flag {key}={value} (see allow_unknown_flags)")]
    UnknownFlag { key: String, value: String },

    #[error("Fields required but not set: {}", fields.join(","))]
    MissingRequired { fields: Vec<String> },

    #[error("Failed to parse flags: {0}")]
    Flags(#[from] clap::Error),

    #[error("Flag '{flag}' was given an empty config file path")]
    EmptyFileFlag { flag: String },

    #[error("Resolved values do not fit the settings type: {0}")]
    Deserialize(#[source] serde_json::Error),
}

impl LayerfigError {
    pub(crate) fn coercion(
        path: &str,
        literal: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        LayerfigError::Coercion {
            path: path.to_string(),
            literal: literal.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_field_formats_correctly() {
        let err = LayerfigError::UnknownField {
            key: "typo_key".into(),
            path: "/etc/myapp/config.json".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("typo_key"));
        assert!(msg.contains("config.json"));
        assert!(msg.contains("allow_unknown_fields"));
    }

    #[test]
    fn missing_required_names_every_field() {
        let err = LayerfigError::MissingRequired {
            fields: vec!["Field1".into(), "Field2".into()],
        };
        assert_eq!(err.to_string(), "Fields required but not set: Field1,Field2");
    }

    #[test]
    fn coercion_names_path_and_literal() {
        let err = LayerfigError::coercion("server.port", "80x", "invalid digit");
        let msg = err.to_string();
        assert!(msg.contains("server.port"));
        assert!(msg.contains("\"80x\""));
    }

    #[test]
    fn duplicate_field_formats() {
        let err = SchemaError::DuplicateField {
            kind: "env".into(),
            key: "FOO_BAR".into(),
            first: "foo_bar".into(),
            second: "FooBar".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("FOO_BAR"));
        assert!(msg.contains("FooBar"));
    }
}
