//! File decoders and config file loading.
//!
//! A decoder turns the text of one config file into a [`RawMap`]: the file's
//! top-level keys mapped to loosely-typed values. Decoders are picked by file
//! extension, case-insensitively:
//!
//! | Extension | Format | Crate |
//! |-----------|--------|-------|
//! | `json` | `json` | `serde_json` |
//! | `toml` | `toml` | `toml` |
//! | `yaml`, `yml` | `yaml` | `serde_yaml` (feature `yaml`) |
//! | `env` | `env` | `dotenvy` (feature `dotenv`) |
//!
//! Callers can register more with
//! [`LoaderBuilder::file_decoder`](crate::LoaderBuilder::file_decoder). The
//! decoder's [`format`](FileDecoder::format) names the key kind fields are
//! looked up by, so a custom `ini` decoder gets `ini` keys.
//!
//! Missing files are skipped silently by [`read_config_file`]; only actual I/O
//! errors (permissions, etc.) are propagated.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::error::{DecodeError, LayerfigError};
use crate::types;

/// The decoded top-level table of a config file.
pub type RawMap = serde_json::Map<String, Value>;

/// Decodes the text of one config file.
pub trait FileDecoder: Send + Sync {
    /// The key kind used to look fields up in the decoded map.
    fn format(&self) -> &str;

    fn decode(&self, content: &str) -> Result<RawMap, DecodeError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl FileDecoder for JsonDecoder {
    fn format(&self) -> &str {
        types::JSON
    }

    fn decode(&self, content: &str) -> Result<RawMap, DecodeError> {
        match serde_json::from_str::<Value>(content)? {
            Value::Object(map) => Ok(map),
            _ => Err(DecodeError::NotATable),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TomlDecoder;

impl FileDecoder for TomlDecoder {
    fn format(&self) -> &str {
        types::TOML
    }

    fn decode(&self, content: &str) -> Result<RawMap, DecodeError> {
        let table: toml::Table = toml::from_str(content)?;
        Ok(table.into_iter().map(|(k, v)| (k, toml_to_json(v))).collect())
    }
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(feature = "yaml")]
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlDecoder;

#[cfg(feature = "yaml")]
impl FileDecoder for YamlDecoder {
    fn format(&self) -> &str {
        types::YAML
    }

    fn decode(&self, content: &str) -> Result<RawMap, DecodeError> {
        match yaml_to_json(serde_yaml::from_str(content)?) {
            Value::Object(map) => Ok(map),
            // An empty document.
            Value::Null => Ok(RawMap::new()),
            _ => Err(DecodeError::NotATable),
        }
    }
}

#[cfg(feature = "yaml")]
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        Yaml::Mapping(mapping) => Value::Object(
            mapping
                .into_iter()
                .map(|(k, v)| (yaml_key(k), yaml_to_json(v)))
                .collect(),
        ),
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

/// YAML allows non-string keys; they are addressed by their text form.
#[cfg(feature = "yaml")]
fn yaml_key(key: serde_yaml::Value) -> String {
    match yaml_to_json(key) {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(feature = "dotenv")]
#[derive(Debug, Clone, Copy, Default)]
pub struct DotenvDecoder;

#[cfg(feature = "dotenv")]
impl FileDecoder for DotenvDecoder {
    fn format(&self) -> &str {
        types::ENV
    }

    fn decode(&self, content: &str) -> Result<RawMap, DecodeError> {
        let mut map = RawMap::new();
        for item in dotenvy::from_read_iter(content.as_bytes()) {
            let (key, value) = item?;
            map.insert(key, Value::String(value));
        }
        Ok(map)
    }
}

/// Decoders keyed by lowercased file extension.
#[derive(Clone)]
pub struct Decoders {
    by_ext: BTreeMap<String, Arc<dyn FileDecoder>>,
}

impl Decoders {
    /// The decoders enabled by cargo features.
    pub fn builtin() -> Self {
        let mut decoders = Self {
            by_ext: BTreeMap::new(),
        };
        decoders.register("json", Arc::new(JsonDecoder));
        decoders.register("toml", Arc::new(TomlDecoder));
        #[cfg(feature = "yaml")]
        {
            decoders.register("yaml", Arc::new(YamlDecoder));
            decoders.register("yml", Arc::new(YamlDecoder));
        }
        #[cfg(feature = "dotenv")]
        decoders.register("env", Arc::new(DotenvDecoder));
        decoders
    }

    /// Register (or replace) the decoder for an extension; a leading `.` is
    /// ignored.
    pub fn register(&mut self, ext: &str, decoder: Arc<dyn FileDecoder>) {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.by_ext.insert(ext, decoder);
    }

    /// The decoder for `path`, or `UnsupportedFormat`.
    pub fn for_path(&self, path: &Path) -> Result<&dyn FileDecoder, LayerfigError> {
        let ext = extension(path);
        self.by_ext
            .get(&ext)
            .map(|d| d.as_ref())
            .ok_or_else(|| LayerfigError::UnsupportedFormat {
                path: path.to_path_buf(),
                ext,
            })
    }

    /// Distinct formats of the registered decoders.
    pub fn formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self
            .by_ext
            .values()
            .map(|d| d.format().to_string())
            .collect();
        formats.sort();
        formats.dedup();
        formats
    }
}

impl std::fmt::Debug for Decoders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.by_ext.iter().map(|(ext, d)| (ext, d.format())))
            .finish()
    }
}

/// Lowercased extension without the dot. A dotfile such as `.env` counts as
/// all extension.
fn extension(path: &Path) -> String {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext,
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix('.'))
            .unwrap_or(""),
    };
    ext.to_ascii_lowercase()
}

/// Read a config file. Returns `Ok(None)` if it does not exist.
pub fn read_config_file(path: &Path) -> Result<Option<String>, LayerfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LayerfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Read files in order, keeping missing ones as `None`. With `first_only`,
/// reading stops after the first file that exists.
pub fn read_config_files(
    paths: &[PathBuf],
    first_only: bool,
) -> Result<Vec<(PathBuf, Option<String>)>, LayerfigError> {
    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
        let content = read_config_file(path)?;
        let found = content.is_some();
        results.push((path.clone(), content));
        if found && first_only {
            break;
        }
    }
    Ok(results)
}

/// Decode `content` with `decoder`, attributing failures to `path`.
pub fn decode(
    decoder: &dyn FileDecoder,
    path: &Path,
    content: &str,
) -> Result<RawMap, LayerfigError> {
    decoder.decode(content).map_err(|source| LayerfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}
